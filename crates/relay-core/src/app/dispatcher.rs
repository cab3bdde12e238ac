//! Dispatcher - バックグラウンド実行
//!
//! # 設計
//! - `dispatch()` はジョブをチャネルに積むだけ（ブロックしない）
//! - 固定数のワーカーが共有レシーバからジョブを 1 つずつ受け取る
//! - ジョブ本体は個別の tokio task で実行し、panic も失敗として扱う
//! - shutdown は新規ジョブの受け付けを止め、受け付け済みのジョブは最後まで実行する

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, PoisonError};

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

use super::delivery::ResultDelivery;
use crate::domain::{ContentKind, RelayError, RetryPolicy, TaskEvent, TaskId, TaskState};
use crate::format::is_markdown;
use crate::ports::{EventSink, TaskStore};

/// Background work for one task. Yields the text to push to the user.
pub type Work = Pin<Box<dyn Future<Output = Result<String, RelayError>> + Send + 'static>>;

pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_FAILURE_TEXT: &str = "任务处理失败: {error}";

struct Job {
    task_id: TaskId,
    work: Work,
}

#[derive(Debug, Clone)]
pub struct DispatcherOptions {
    pub workers: usize,
    /// Per-fragment retry for result pushes.
    pub push_retry: RetryPolicy,
    /// Push Markdown-looking results as Markdown messages.
    pub markdown_results: bool,
    /// Failure notice; `{error}` is replaced by the failure message.
    pub failure_text: String,
}

impl Default for DispatcherOptions {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            push_retry: RetryPolicy::default(),
            markdown_results: true,
            failure_text: DEFAULT_FAILURE_TEXT.into(),
        }
    }
}

/// Everything a worker needs to run a job to the end.
struct JobContext {
    store: Arc<dyn TaskStore>,
    delivery: Arc<ResultDelivery>,
    events: Arc<dyn EventSink>,
    options: DispatcherOptions,
}

/// Fixed set of workers sharing one job receiver.
/// - 送信側が閉じられると、キューに残ったジョブを処理し切ってから終了する
/// - `join()` で全ワーカーの終了を待てる
struct WorkerPool {
    joins: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    fn spawn(n: usize, jobs: mpsc::UnboundedReceiver<Job>, ctx: Arc<JobContext>) -> Self {
        let jobs = Arc::new(Mutex::new(jobs));

        let joins = (0..n)
            .map(|worker_id| {
                let jobs = Arc::clone(&jobs);
                let ctx = Arc::clone(&ctx);
                tokio::spawn(async move {
                    worker_loop(worker_id, jobs, ctx).await;
                })
            })
            .collect();

        Self {
            joins: std::sync::Mutex::new(joins),
        }
    }

    async fn join(&self) {
        let joins = std::mem::take(
            &mut *self.joins.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for j in joins {
            let _ = j.await;
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    jobs: Arc<Mutex<mpsc::UnboundedReceiver<Job>>>,
    ctx: Arc<JobContext>,
) {
    tracing::debug!(worker_id, "worker started");
    loop {
        // One worker waits on the receiver at a time; the rest wait on the lock.
        let job = jobs.lock().await.recv().await;
        let Some(job) = job else {
            // closed and drained
            break;
        };
        run_job(worker_id, &ctx, job).await;
    }
    tracing::debug!(worker_id, "worker stopped");
}

async fn run_job(worker_id: usize, ctx: &JobContext, job: Job) {
    let task_id = job.task_id;

    // Pending -> Processing succeeds once per task, which keeps a task from
    // ever running twice.
    if !ctx.store.update_status(task_id, TaskState::Processing).await {
        tracing::warn!(worker_id, %task_id, "task not runnable, skipping");
        return;
    }
    ctx.events.emit(TaskEvent::Started { task_id });
    tracing::info!(worker_id, %task_id, "task started");

    let outcome = match tokio::spawn(job.work).await {
        Ok(result) => result,
        Err(join_err) => Err(RelayError::dispatch(format!("task aborted: {join_err}"))),
    };

    let (content, kind) = match outcome {
        Ok(result) => {
            ctx.store.complete(task_id, result.clone()).await;
            ctx.events.emit(TaskEvent::Completed { task_id });
            tracing::info!(worker_id, %task_id, chars = result.chars().count(), "task completed");

            let kind = if ctx.options.markdown_results && is_markdown(&result) {
                ContentKind::Markdown
            } else {
                ContentKind::Text
            };
            (result, kind)
        }
        Err(e) => {
            let error = e.to_string();
            ctx.store.fail(task_id, error.clone()).await;
            ctx.events.emit(TaskEvent::Failed {
                task_id,
                error: error.clone(),
            });
            tracing::error!(worker_id, %task_id, %error, "task failed");
            (ctx.options.failure_text.replace("{error}", &error), ContentKind::Text)
        }
    };

    push_result(ctx, task_id, &content, kind).await;
}

async fn push_result(ctx: &JobContext, task_id: TaskId, content: &str, kind: ContentKind) {
    let Some(record) = ctx.store.get(task_id).await else {
        let error = "task record disappeared before delivery".to_owned();
        tracing::error!(%task_id, %error);
        ctx.events.emit(TaskEvent::DeliveryFailed { task_id, error });
        return;
    };

    let target = record.push_target();
    match ctx
        .delivery
        .deliver_with_retry(&target, content, kind, &ctx.options.push_retry)
        .await
    {
        Ok(fragments) => {
            tracing::info!(%task_id, user_id = %record.user_id, fragments, "result pushed");
            ctx.events.emit(TaskEvent::Delivered {
                task_id,
                fragments,
            });
        }
        Err(e) => {
            tracing::error!(%task_id, user_id = %record.user_id, error = %e, "result push failed");
            ctx.events.emit(TaskEvent::DeliveryFailed {
                task_id,
                error: e.to_string(),
            });
        }
    }
}

/// Runs slow-path work off the request path on a bounded worker pool.
pub struct Dispatcher {
    /// `None` once shut down.
    tx: std::sync::Mutex<Option<mpsc::UnboundedSender<Job>>>,
    pool: WorkerPool,
}

impl Dispatcher {
    /// Spawn the worker pool. Must be called inside a tokio runtime.
    pub fn start(
        store: Arc<dyn TaskStore>,
        delivery: Arc<ResultDelivery>,
        events: Arc<dyn EventSink>,
        options: DispatcherOptions,
    ) -> Self {
        let workers = options.workers.max(1);
        let (tx, rx) = mpsc::unbounded_channel();
        let ctx = Arc::new(JobContext {
            store,
            delivery,
            events,
            options,
        });
        tracing::info!(workers, "dispatcher started");

        Self {
            tx: std::sync::Mutex::new(Some(tx)),
            pool: WorkerPool::spawn(workers, rx, ctx),
        }
    }

    /// Queue `work` for `task_id`. Never waits.
    pub fn dispatch(&self, task_id: TaskId, work: Work) -> Result<(), RelayError> {
        let tx = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = tx.as_ref() else {
            return Err(RelayError::dispatch("dispatcher is shut down"));
        };
        tx.send(Job { task_id, work })
            .map_err(|_| RelayError::dispatch("worker pool is gone"))?;
        tracing::debug!(%task_id, "task queued");
        Ok(())
    }

    /// Stop taking new jobs and wait for the workers. Every job accepted
    /// before this call still runs to completion or failure.
    pub async fn shutdown(&self) {
        let closed = self
            .tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(closed);
        self.pool.join().await;
        tracing::info!("dispatcher stopped");
    }
}

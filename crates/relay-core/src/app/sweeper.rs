//! SweepLoop - 期限切れタスクの定期削除
//!
//! # フロー
//! 1. `interval` ごとに起きる
//! 2. `created_at` が `max_age` より古いタスクを状態に関係なく削除
//! 3. 画像ディレクトリがあれば、更新時刻が `max_age` より古いファイルも削除
//! 4. shutdown シグナルで終了

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::ports::TaskStore;

pub struct SweepLoop {
    store: Arc<dyn TaskStore>,
    interval: Duration,
    max_age: Duration,
    image_dir: Option<PathBuf>,
}

impl SweepLoop {
    pub fn new(store: Arc<dyn TaskStore>, interval: Duration, max_age: Duration) -> Self {
        Self {
            store,
            interval: interval.max(Duration::from_millis(1)),
            max_age,
            image_dir: None,
        }
    }

    /// Also prune downloaded images under `dir`.
    pub fn with_image_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.image_dir = Some(dir.into());
        self
    }

    /// One pass. Returns how many task records were removed.
    pub async fn sweep_once(&self) -> usize {
        let removed = self.store.sweep(self.max_age).await;
        let pruned = self.prune_images().await;
        let counts = self.store.counts().await;
        tracing::debug!(removed, pruned, remaining = counts.total(), "sweep finished");
        removed
    }

    /// Delete regular files in the image directory last modified more than
    /// `max_age` ago. Returns how many were deleted.
    pub async fn prune_images(&self) -> usize {
        let Some(dir) = &self.image_dir else {
            return 0;
        };
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "image dir not readable");
                return 0;
            }
        };

        let now = SystemTime::now();
        let mut pruned = 0;
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(dir = %dir.display(), error = %e, "image dir listing failed");
                    break;
                }
            };
            let path = entry.path();
            let modified = match entry.metadata().await {
                Ok(meta) if meta.is_file() => meta.modified(),
                Ok(_) => continue,
                Err(e) => Err(e),
            };
            let age = match modified {
                // mtime in the future counts as fresh
                Ok(at) => now.duration_since(at).unwrap_or_default(),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "image mtime unavailable");
                    continue;
                }
            };
            if age <= self.max_age {
                continue;
            }
            match tokio::fs::remove_file(&path).await {
                Ok(()) => pruned += 1,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "image not removed");
                }
            }
        }
        if pruned > 0 {
            tracing::info!(pruned, dir = %dir.display(), "old images removed");
        }
        pruned
    }

    /// Run until `shutdown_rx` turns true or its sender is dropped.
    /// The first pass happens one interval after start.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        tracing::info!(
            interval_secs = self.interval.as_secs(),
            max_age_secs = self.max_age.as_secs(),
            "sweep loop started"
        );
        loop {
            if *shutdown_rx.borrow() {
                break;
            }
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    self.sweep_once().await;
                }
            }
        }
        tracing::info!("sweep loop stopped");
    }

    pub fn spawn(self, shutdown_rx: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown_rx))
    }
}

//! Test doubles for the ports.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{OutboundMessage, RelayError, ReplyTarget, TaskEvent};
use crate::ports::{AgentClient, ImageResolution, ImageResolver, MessageSender};

/// Records every message and can be told to fail.
#[derive(Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<(ReplyTarget, OutboundMessage)>>,
    /// Results for upcoming sends; `Ok` once exhausted.
    script: Mutex<VecDeque<Result<(), RelayError>>>,
    attempts: Mutex<usize>,
}

impl RecordingSender {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue the outcome of the next send attempt.
    pub fn then(&self, result: Result<(), RelayError>) -> &Self {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(result);
        self
    }

    /// Successfully sent messages, in order.
    pub fn sent(&self) -> Vec<(ReplyTarget, OutboundMessage)> {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn sent_to(&self, mode: &str) -> Vec<OutboundMessage> {
        self.sent()
            .into_iter()
            .filter(|(t, _)| t.mode() == mode)
            .map(|(_, m)| m)
            .collect()
    }

    pub fn attempts(&self) -> usize {
        *self.attempts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl MessageSender for RecordingSender {
    async fn send(&self, target: &ReplyTarget, message: &OutboundMessage) -> Result<(), RelayError> {
        *self.attempts.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        let next = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or(Ok(()));
        next?;
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((target.clone(), message.clone()));
        Ok(())
    }
}

/// Answers with a fixed reply and records the prompts it saw.
pub struct ScriptedAgent {
    reply: String,
    delay: Duration,
    calls: Mutex<Vec<(String, Option<PathBuf>)>>,
}

impl ScriptedAgent {
    pub fn replying(reply: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.into(),
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn slow(reply: impl Into<String>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.into(),
            delay,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<(String, Option<PathBuf>)> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl AgentClient for ScriptedAgent {
    async fn chat(&self, prompt: &str, image_path: Option<&Path>) -> String {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((prompt.to_owned(), image_path.map(Path::to_path_buf)));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.reply.clone()
    }
}

/// Resolves every download code to the same outcome.
pub struct StaticImageResolver {
    resolution: ImageResolution,
}

impl StaticImageResolver {
    pub fn available(path: impl Into<PathBuf>) -> Arc<Self> {
        Arc::new(Self {
            resolution: ImageResolution::Available(path.into()),
        })
    }

    pub fn unavailable() -> Arc<Self> {
        Arc::new(Self {
            resolution: ImageResolution::Unavailable,
        })
    }
}

#[async_trait]
impl ImageResolver for StaticImageResolver {
    async fn resolve(&self, _download_code: &str) -> ImageResolution {
        self.resolution.clone()
    }
}

/// Wait until the task's final event arrives, collecting everything seen.
pub async fn events_until_final(
    rx: &mut tokio::sync::broadcast::Receiver<TaskEvent>,
) -> Vec<TaskEvent> {
    let mut seen = Vec::new();
    loop {
        match tokio::time::timeout(Duration::from_secs(5), rx.recv()).await {
            Ok(Ok(event)) => {
                let done = event.is_final();
                seen.push(event);
                if done {
                    return seen;
                }
            }
            Ok(Err(tokio::sync::broadcast::error::RecvError::Lagged(_))) => continue,
            _ => panic!("no final event within 5s; saw {seen:?}"),
        }
    }
}

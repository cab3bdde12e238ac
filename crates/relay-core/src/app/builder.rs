//! RelayBuilder - Relay の構築とワイヤリング
//!
//! # Fail-fast 設計
//! - agent / sender / images は必須。欠けていれば build() が
//!   `BuildError::MissingComponents` を返す
//! - 数値オプションは build() 時に検証する
//! - それ以外はインメモリ実装がデフォルト

use std::sync::Arc;
use std::time::Duration;

use super::delivery::ResultDelivery;
use super::dispatcher::{Dispatcher, DispatcherOptions};
use super::relay::{Relay, RelayOptions};
use crate::config::RelayConfig;
use crate::domain::RetryPolicy;
use crate::format::MAX_MESSAGE_LENGTH;
use crate::impls::{InMemoryDedupFilter, InMemoryTaskStore, KeywordRoutingPolicy};
use crate::ports::{
    AgentClient, DedupFilter, EventSink, ImageResolver, MessageSender, NoopEventSink,
    RoutingPolicy, TaskStore,
};

/// Wires ports into a running [`Relay`].
///
/// ```ignore
/// let relay = RelayBuilder::new()
///     .config(&config)
///     .agent(Arc::new(codebuddy))
///     .sender(dingtalk.clone())
///     .images(dingtalk)
///     .build()?;
/// ```
pub struct RelayBuilder {
    dedup: Option<Arc<dyn DedupFilter>>,
    routing: Option<Arc<dyn RoutingPolicy>>,
    agent: Option<Arc<dyn AgentClient>>,
    images: Option<Arc<dyn ImageResolver>>,
    sender: Option<Arc<dyn MessageSender>>,
    store: Option<Arc<dyn TaskStore>>,
    events: Option<Arc<dyn EventSink>>,
    options: RelayOptions,
    dispatcher: DispatcherOptions,
    max_message_length: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Missing components: {0:?}. These must be provided before build().")]
    MissingComponents(Vec<&'static str>),

    #[error("Invalid option: {0}")]
    InvalidOption(String),
}

impl RelayBuilder {
    pub fn new() -> Self {
        Self {
            dedup: None,
            routing: None,
            agent: None,
            images: None,
            sender: None,
            store: None,
            events: None,
            options: RelayOptions::default(),
            dispatcher: DispatcherOptions::default(),
            max_message_length: MAX_MESSAGE_LENGTH,
        }
    }

    /// Take routing keywords, dedup capacity and every tunable from `config`.
    /// Components already set are kept.
    pub fn config(mut self, config: &RelayConfig) -> Self {
        if self.dedup.is_none() {
            self.dedup = Some(Arc::new(InMemoryDedupFilter::new(config.dedup.capacity)));
        }
        if self.routing.is_none() {
            self.routing = Some(Arc::new(KeywordRoutingPolicy::new(
                &config.routing.slow_keywords,
            )));
        }
        self.options = config.relay_options();
        self.dispatcher = config.dispatcher_options();
        self.max_message_length = config.delivery.max_message_length;
        self
    }

    pub fn dedup(mut self, dedup: Arc<dyn DedupFilter>) -> Self {
        self.dedup = Some(dedup);
        self
    }

    pub fn routing(mut self, routing: Arc<dyn RoutingPolicy>) -> Self {
        self.routing = Some(routing);
        self
    }

    pub fn agent(mut self, agent: Arc<dyn AgentClient>) -> Self {
        self.agent = Some(agent);
        self
    }

    pub fn images(mut self, images: Arc<dyn ImageResolver>) -> Self {
        self.images = Some(images);
        self
    }

    pub fn sender(mut self, sender: Arc<dyn MessageSender>) -> Self {
        self.sender = Some(sender);
        self
    }

    pub fn store(mut self, store: Arc<dyn TaskStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn options(mut self, options: RelayOptions) -> Self {
        self.options = options;
        self
    }

    pub fn dispatcher_options(mut self, options: DispatcherOptions) -> Self {
        self.dispatcher = options;
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.dispatcher.workers = workers;
        self
    }

    pub fn push_retry(mut self, retry: RetryPolicy) -> Self {
        self.dispatcher.push_retry = retry;
        self
    }

    pub fn max_message_length(mut self, max_len: usize) -> Self {
        self.max_message_length = max_len;
        self
    }

    /// Validate and start the dispatcher. Must be called inside a tokio runtime.
    pub fn build(self) -> Result<Relay, BuildError> {
        let mut missing = Vec::new();
        if self.agent.is_none() {
            missing.push("agent");
        }
        if self.sender.is_none() {
            missing.push("sender");
        }
        if self.images.is_none() {
            missing.push("images");
        }
        let (Some(agent), Some(sender), Some(images)) = (self.agent, self.sender, self.images)
        else {
            return Err(BuildError::MissingComponents(missing));
        };

        if self.dispatcher.workers == 0 {
            return Err(BuildError::InvalidOption("workers must be at least 1".into()));
        }
        if self.max_message_length == 0 {
            return Err(BuildError::InvalidOption(
                "max_message_length must be positive".into(),
            ));
        }
        if self.dispatcher.push_retry.base_delay > Duration::from_secs(600) {
            return Err(BuildError::InvalidOption(
                "push retry delay is unreasonably long".into(),
            ));
        }

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryTaskStore::default()));
        let events = self.events.unwrap_or_else(|| Arc::new(NoopEventSink));
        let delivery = Arc::new(ResultDelivery::new(sender).with_max_len(self.max_message_length));
        let dispatcher = Dispatcher::start(
            Arc::clone(&store),
            Arc::clone(&delivery),
            Arc::clone(&events),
            self.dispatcher,
        );

        Ok(Relay {
            dedup: self
                .dedup
                .unwrap_or_else(|| Arc::new(InMemoryDedupFilter::default())),
            routing: self
                .routing
                .unwrap_or_else(|| Arc::new(KeywordRoutingPolicy::default())),
            agent,
            images,
            store,
            events,
            delivery,
            dispatcher,
            options: self.options,
        })
    }
}

impl Default for RelayBuilder {
    fn default() -> Self {
        Self::new()
    }
}

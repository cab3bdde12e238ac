//! Config - TOML 設定と環境変数による上書き
//!
//! 読み込み順: デフォルト → TOML ファイル → 環境変数。最後に `validate()`。

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::app::{DEFAULT_ACK_TEXT, DEFAULT_FAILURE_TEXT, DEFAULT_WORKERS, DispatcherOptions, RelayOptions};
use crate::domain::{RelayError, RetryPolicy};
use crate::format::MAX_MESSAGE_LENGTH;
use crate::impls::codebuddy::{DEFAULT_AGENT_MODEL, DEFAULT_AGENT_URL};
use crate::impls::dingtalk::DEFAULT_API_BASE;
use crate::impls::inmem_dedup::DEFAULT_DEDUP_CAPACITY;
use crate::impls::{CodeBuddyOptions, DEFAULT_SLOW_KEYWORDS, DingTalkOptions};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub server: ServerConfig,
    pub dingtalk: DingTalkConfig,
    pub agent: AgentConfig,
    pub routing: RoutingConfig,
    pub dedup: DedupConfig,
    pub tasks: TasksConfig,
    pub delivery: DeliveryConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub callback_path: String,
    /// URL prefix under which `image_dir` is served.
    pub image_route: String,
    pub image_dir: PathBuf,
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".into(),
            callback_path: "/dingtalk/callback".into(),
            image_route: "/images".into(),
            image_dir: PathBuf::from("images"),
            log_level: "info".into(),
        }
    }
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DingTalkConfig {
    pub client_id: String,
    pub client_secret: String,
    pub app_id: String,
    pub api_base: String,
    /// Secret for callback signatures; falls back to `client_secret`.
    pub app_secret: Option<String>,
    pub verify_signature: bool,
    pub http_timeout_secs: u64,
}

impl std::fmt::Debug for DingTalkConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DingTalkConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("app_id", &self.app_id)
            .field("api_base", &self.api_base)
            .field("verify_signature", &self.verify_signature)
            .finish_non_exhaustive()
    }
}

impl Default for DingTalkConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            app_id: String::new(),
            api_base: DEFAULT_API_BASE.into(),
            app_secret: None,
            verify_signature: false,
            http_timeout_secs: 30,
        }
    }
}

impl DingTalkConfig {
    pub fn signing_secret(&self) -> &str {
        self.app_secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.client_secret)
    }
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub api_url: String,
    pub api_token: String,
    pub timeout_secs: u64,
    pub retry_count: u32,
    pub retry_delay_ms: u64,
    pub model: String,
    pub print: bool,
    pub skip_permissions: bool,
    pub continue_session: bool,
    pub add_dirs: Vec<String>,
}

impl std::fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentConfig")
            .field("api_url", &self.api_url)
            .field("api_token", &"[REDACTED]")
            .field("timeout_secs", &self.timeout_secs)
            .field("retry_count", &self.retry_count)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_AGENT_URL.into(),
            api_token: String::new(),
            timeout_secs: 300,
            retry_count: 2,
            retry_delay_ms: 2000,
            model: DEFAULT_AGENT_MODEL.into(),
            print: true,
            skip_permissions: true,
            continue_session: false,
            add_dirs: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    pub slow_keywords: Vec<String>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            slow_keywords: DEFAULT_SLOW_KEYWORDS.iter().map(|k| k.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    pub capacity: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_DEDUP_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TasksConfig {
    pub max_age_hours: u64,
    pub sweep_interval_secs: u64,
    pub workers: usize,
    /// Total attempts per pushed fragment.
    pub push_retry_attempts: u32,
    pub push_retry_delay_ms: u64,
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            max_age_hours: 24,
            sweep_interval_secs: 3600,
            workers: DEFAULT_WORKERS,
            push_retry_attempts: 3,
            push_retry_delay_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    pub max_message_length: usize,
    pub enable_markdown: bool,
    pub use_markdown_for_async: bool,
    pub ack_text: String,
    pub failure_text: String,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_message_length: MAX_MESSAGE_LENGTH,
            enable_markdown: true,
            use_markdown_for_async: true,
            ack_text: DEFAULT_ACK_TEXT.into(),
            failure_text: DEFAULT_FAILURE_TEXT.into(),
        }
    }
}

impl RelayConfig {
    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml(raw: &str) -> Result<Self, RelayError> {
        toml::from_str(raw).map_err(|e| RelayError::config(format!("parse: {e}")))
    }

    /// Load from `path`, or start from defaults when no path is given.
    /// Environment overrides are applied either way; validation is not.
    pub fn load(path: Option<&Path>) -> Result<Self, RelayError> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|e| {
                    RelayError::config(format!("failed to read {}: {e}", path.display()))
                })?;
                tracing::debug!(path = %path.display(), "loading config");
                Self::from_toml(&raw)?
            }
            None => {
                tracing::debug!("no config file given, using defaults");
                Self::default()
            }
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Override fields from environment-style variables.
    ///
    /// Unparseable numbers are ignored with a warning.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("DINGTALK_CLIENT_ID") {
            self.dingtalk.client_id = v;
        }
        if let Some(v) = get("DINGTALK_CLIENT_SECRET") {
            self.dingtalk.client_secret = v;
        }
        if let Some(v) = get("DINGTALK_APP_ID") {
            self.dingtalk.app_id = v;
        }
        if let Some(v) = get("CODEBUDDY_API_URL") {
            self.agent.api_url = v;
        }
        if let Some(v) = get("CODEBUDDY_API_TOKEN") {
            self.agent.api_token = v;
        }
        if let Some(v) = get("CODEBUDDY_MODEL") {
            self.agent.model = v;
        }
        if let Some(v) = get("CODEBUDDY_TIMEOUT") {
            match v.trim().parse() {
                Ok(secs) => self.agent.timeout_secs = secs,
                Err(_) => tracing::warn!(value = %v, "ignoring invalid CODEBUDDY_TIMEOUT"),
            }
        }
        if let Some(v) = get("CODEBUDDY_RETRY_COUNT") {
            match v.trim().parse() {
                Ok(n) => self.agent.retry_count = n,
                Err(_) => tracing::warn!(value = %v, "ignoring invalid CODEBUDDY_RETRY_COUNT"),
            }
        }
        if let Some(v) = get("CODEBUDDY_ADD_DIR") {
            self.agent.add_dirs = v
                .split(',')
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_owned)
                .collect();
        }
        if let Some(v) = get("LOG_LEVEL") {
            self.server.log_level = v.to_lowercase();
        }
    }

    pub fn validate(&self) -> Result<(), RelayError> {
        if self.dingtalk.client_id.is_empty() || self.dingtalk.client_secret.is_empty() {
            return Err(RelayError::config(
                "dingtalk.client_id and dingtalk.client_secret are required",
            ));
        }
        if self.tasks.workers == 0 {
            return Err(RelayError::config("tasks.workers must be at least 1"));
        }
        if self.delivery.max_message_length == 0 {
            return Err(RelayError::config("delivery.max_message_length must be positive"));
        }
        if self.dedup.capacity == 0 {
            return Err(RelayError::config("dedup.capacity must be positive"));
        }
        if !self.server.callback_path.starts_with('/') || !self.server.image_route.starts_with('/') {
            return Err(RelayError::config("server paths must start with '/'"));
        }
        Ok(())
    }

    pub fn codebuddy_options(&self) -> CodeBuddyOptions {
        let a = &self.agent;
        CodeBuddyOptions {
            api_url: a.api_url.clone(),
            api_token: a.api_token.clone(),
            timeout: Duration::from_secs(a.timeout_secs),
            retry: RetryPolicy::with_retries(a.retry_count, Duration::from_millis(a.retry_delay_ms)),
            model: a.model.clone(),
            print: a.print,
            skip_permissions: a.skip_permissions,
            continue_session: a.continue_session,
            add_dirs: a.add_dirs.clone(),
        }
    }

    pub fn dingtalk_options(&self) -> DingTalkOptions {
        DingTalkOptions {
            client_id: self.dingtalk.client_id.clone(),
            client_secret: self.dingtalk.client_secret.clone(),
            api_base: self.dingtalk.api_base.clone(),
            image_dir: self.server.image_dir.clone(),
            http_timeout: Duration::from_secs(self.dingtalk.http_timeout_secs),
        }
    }

    pub fn dispatcher_options(&self) -> DispatcherOptions {
        DispatcherOptions {
            workers: self.tasks.workers,
            push_retry: RetryPolicy::fixed(
                self.tasks.push_retry_attempts,
                Duration::from_millis(self.tasks.push_retry_delay_ms),
            ),
            markdown_results: self.delivery.enable_markdown && self.delivery.use_markdown_for_async,
            failure_text: self.delivery.failure_text.clone(),
        }
    }

    pub fn relay_options(&self) -> RelayOptions {
        RelayOptions {
            ack_text: self.delivery.ack_text.clone(),
        }
    }

    pub fn task_max_age(&self) -> Duration {
        Duration::from_secs(self.tasks.max_age_hours.saturating_mul(3600))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.tasks.sweep_interval_secs.max(1))
    }
}

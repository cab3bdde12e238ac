//! CodeBuddy agent client.
//!
//! One JSON POST per attempt. Timeouts, connection errors and gateway
//! timeouts (504) are retried with a fixed delay; other statuses are not.
//! Whatever happens, the caller gets a text it can show to the user.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::Value;

use crate::domain::{RelayError, RetryPolicy};
use crate::ports::AgentClient;

pub const DEFAULT_AGENT_URL: &str = "http://127.0.0.1:8000/agent";
pub const DEFAULT_AGENT_MODEL: &str = "default";

const TIMEOUT_TEXT: &str =
    "请求超时,服务器响应时间过长。已尝试多次重试,请稍后再试或联系管理员检查服务器状态。";
const GATEWAY_TIMEOUT_TEXT: &str =
    "网关超时(504)。服务器处理时间过长,请尝试简化您的请求,或稍后再试。";

/// Connection and request-shaping options.
#[derive(Clone)]
pub struct CodeBuddyOptions {
    pub api_url: String,
    pub api_token: String,
    /// Per-attempt HTTP timeout.
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub model: String,
    pub print: bool,
    pub skip_permissions: bool,
    pub continue_session: bool,
    /// Extra working directories exposed to the agent.
    pub add_dirs: Vec<String>,
}

impl std::fmt::Debug for CodeBuddyOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodeBuddyOptions")
            .field("api_url", &self.api_url)
            .field("api_token", &"[REDACTED]")
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl Default for CodeBuddyOptions {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_AGENT_URL.into(),
            api_token: String::new(),
            timeout: Duration::from_secs(300),
            retry: RetryPolicy::default(),
            model: DEFAULT_AGENT_MODEL.into(),
            print: true,
            skip_permissions: true,
            continue_session: false,
            add_dirs: Vec::new(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatPayload<'a> {
    prompt: String,
    print: bool,
    #[serde(rename = "dangerouslySkipPermissions")]
    skip_permissions: bool,
    model: &'a str,
    #[serde(rename = "continue")]
    continue_session: bool,
    #[serde(rename = "addDir", skip_serializing_if = "Option::is_none")]
    add_dirs: Option<&'a [String]>,
}

pub struct CodeBuddyClient {
    client: Client,
    options: CodeBuddyOptions,
}

impl CodeBuddyClient {
    pub fn new(options: CodeBuddyOptions) -> Result<Self, RelayError> {
        let client = Client::builder().timeout(options.timeout).build()?;
        Ok(Self { client, options })
    }

    pub fn options(&self) -> &CodeBuddyOptions {
        &self.options
    }

    fn payload(&self, prompt: &str, image_path: Option<&Path>) -> ChatPayload<'_> {
        ChatPayload {
            prompt: build_prompt(prompt, image_path),
            print: self.options.print,
            skip_permissions: self.options.skip_permissions,
            model: &self.options.model,
            continue_session: self.options.continue_session,
            add_dirs: Some(self.options.add_dirs.as_slice()).filter(|d| !d.is_empty()),
        }
    }

    async fn attempt(&self, payload: &ChatPayload<'_>) -> Result<String, RelayError> {
        let mut request = self.client.post(&self.options.api_url).json(payload);
        if !self.options.api_token.is_empty() {
            request = request.bearer_auth(&self.options.api_token);
        }

        let response = request.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        let body = String::from_utf8_lossy(&bytes);
        tracing::debug!(%status, body = %preview(&body, 500), "agent response");

        if !status.is_success() {
            return Err(RelayError::Platform {
                status: status.as_u16(),
                body: body.into_owned(),
            });
        }
        Ok(extract_reply(&body))
    }
}

#[async_trait]
impl AgentClient for CodeBuddyClient {
    async fn chat(&self, prompt: &str, image_path: Option<&Path>) -> String {
        let payload = self.payload(prompt, image_path);
        let retry = &self.options.retry;
        tracing::info!(
            prompt = %preview(prompt, 50),
            image = ?image_path,
            url = %self.options.api_url,
            "calling agent"
        );

        let mut attempts = 0;
        loop {
            attempts += 1;
            let err = match self.attempt(&payload).await {
                Ok(reply) => {
                    tracing::info!(attempts, reply = %preview(&reply, 100), "agent replied");
                    return reply;
                }
                Err(e) => e,
            };

            if is_retryable(&err) && retry.should_retry(attempts) {
                let delay = retry.next_delay(attempts);
                tracing::warn!(attempts, error = %err, ?delay, "agent call failed, retrying");
                tokio::time::sleep(delay).await;
                continue;
            }

            tracing::error!(attempts, error = %err, "agent call failed");
            return degraded_text(&err);
        }
    }
}

/// Fold an attached image into the prompt as a local path reference.
pub fn build_prompt(text: &str, image_path: Option<&Path>) -> String {
    match image_path {
        Some(path) if text.is_empty() => format!("分析这张图片：{}", path.display()),
        Some(path) => format!("{text} 图片路径：{}", path.display()),
        None => text.to_owned(),
    }
}

/// Pull the reply text out of a response body.
///
/// JSON objects yield the first non-empty of `content`, `response`,
/// `message`, `result` (a nested object contributes its `text`).
/// Anything that is not JSON is returned trimmed.
pub fn extract_reply(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return body.trim().to_owned();
    };

    match value {
        Value::Object(map) => {
            let reply = ["content", "response", "message", "result"]
                .iter()
                .filter_map(|k| map.get(*k))
                .find(|v| is_truthy(v));
            match reply {
                Some(Value::Object(inner)) => inner
                    .get("text")
                    .map(value_text)
                    .unwrap_or_default(),
                Some(v) => value_text(v),
                None => String::new(),
            }
        }
        other => value_text(&other),
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        Value::Number(n) => n.as_f64() != Some(0.0),
    }
}

fn is_retryable(err: &RelayError) -> bool {
    match err {
        RelayError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
        RelayError::Platform { status, .. } => *status == StatusCode::GATEWAY_TIMEOUT.as_u16(),
        _ => false,
    }
}

fn degraded_text(err: &RelayError) -> String {
    match err {
        RelayError::Http(e) if e.is_timeout() => TIMEOUT_TEXT.to_owned(),
        RelayError::Platform { status: 504, .. } => GATEWAY_TIMEOUT_TEXT.to_owned(),
        RelayError::Platform { status, body } => {
            format!("API请求失败(HTTP {status}): {}", preview(body, 200))
        }
        other => format!("调用CodeBuddy失败: {other}"),
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_owned(),
    }
}

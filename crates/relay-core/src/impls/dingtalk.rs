//! DingTalk OpenAPI client.
//!
//! - Session replies go to the per-event webhook and need no credentials.
//! - Active push and file download go through the OpenAPI with a cached
//!   access token.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

use crate::domain::{ConversationKind, OutboundMessage, RelayError, ReplyTarget};
use crate::ports::{ImageResolution, ImageResolver, MessageSender};

pub const DEFAULT_API_BASE: &str = "https://api.dingtalk.com";

const ACCESS_TOKEN_HEADER: &str = "x-acs-dingtalk-access-token";
const DEFAULT_TOKEN_TTL_SECS: u64 = 7200;
const TOKEN_REFRESH_MARGIN_SECS: u64 = 300;

#[derive(Clone)]
pub struct DingTalkOptions {
    /// App key. Also used as the robot code.
    pub client_id: String,
    pub client_secret: String,
    pub api_base: String,
    /// Where downloaded images are written.
    pub image_dir: PathBuf,
    pub http_timeout: Duration,
}

impl std::fmt::Debug for DingTalkOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DingTalkOptions")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .field("image_dir", &self.image_dir)
            .finish_non_exhaustive()
    }
}

impl Default for DingTalkOptions {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            api_base: DEFAULT_API_BASE.into(),
            image_dir: PathBuf::from("images"),
            http_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: Instant,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    access_token: Option<String>,
    expire_in: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DownloadResponse {
    download_url: Option<String>,
}

/// Legacy webhook responses carry an `errcode` even on HTTP 200.
#[derive(Debug, Default, Deserialize)]
struct WebhookResponse {
    #[serde(default)]
    errcode: i64,
    #[serde(default)]
    errmsg: String,
}

pub struct DingTalkClient {
    client: Client,
    options: DingTalkOptions,
    token: RwLock<Option<CachedToken>>,
    /// Serializes refreshes so concurrent callers trigger one exchange.
    refresh: Mutex<()>,
}

impl DingTalkClient {
    pub fn new(options: DingTalkOptions) -> Result<Self, RelayError> {
        let client = Client::builder().timeout(options.http_timeout).build()?;
        Ok(Self {
            client,
            options,
            token: RwLock::new(None),
            refresh: Mutex::new(()),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.options.api_base.trim_end_matches('/'))
    }

    async fn cached_token(&self) -> Option<String> {
        let cache = self.token.read().await;
        cache
            .as_ref()
            .filter(|c| Instant::now() < c.expires_at)
            .map(|c| c.token.clone())
    }

    /// Valid access token, exchanging credentials when the cache is stale.
    pub async fn access_token(&self) -> Result<String, RelayError> {
        if let Some(token) = self.cached_token().await {
            return Ok(token);
        }

        let _guard = self.refresh.lock().await;
        // Another caller may have refreshed while we waited.
        if let Some(token) = self.cached_token().await {
            return Ok(token);
        }

        let (token, ttl) = self.fetch_access_token().await?;
        let lifetime = Duration::from_secs(ttl.saturating_sub(TOKEN_REFRESH_MARGIN_SECS));
        *self.token.write().await = Some(CachedToken {
            token: token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        tracing::info!(ttl_secs = ttl, "access token refreshed");
        Ok(token)
    }

    async fn fetch_access_token(&self) -> Result<(String, u64), RelayError> {
        let response = self
            .client
            .post(self.url("/v1.0/oauth2/accessToken"))
            .json(&json!({
                "appKey": self.options.client_id,
                "appSecret": self.options.client_secret,
            }))
            .send()
            .await?;
        let response = ensure_success(response).await?;
        let body = response.text().await?;
        let parsed: TokenResponse = serde_json::from_str(&body).map_err(|_| {
            RelayError::Platform {
                status: 200,
                body: body.clone(),
            }
        })?;

        match parsed.access_token {
            Some(token) if !token.is_empty() => {
                Ok((token, parsed.expire_in.unwrap_or(DEFAULT_TOKEN_TTL_SECS)))
            }
            _ => Err(RelayError::Platform { status: 200, body }),
        }
    }

    async fn post_openapi(&self, path: &str, body: &Value) -> Result<Value, RelayError> {
        let token = self.access_token().await?;
        let response = self
            .client
            .post(self.url(path))
            .header(ACCESS_TOKEN_HEADER, token)
            .json(body)
            .send()
            .await?;
        let response = ensure_success(response).await?;
        Ok(response.json::<Value>().await.unwrap_or(Value::Null))
    }

    async fn send_session(
        &self,
        webhook: &str,
        at_user_id: Option<&str>,
        message: &OutboundMessage,
    ) -> Result<(), RelayError> {
        let body = session_body(message, at_user_id);
        let response = self.client.post(webhook).json(&body).send().await?;
        let response = ensure_success(response).await?;

        let reply: WebhookResponse = response.json().await.unwrap_or_default();
        if reply.errcode != 0 {
            return Err(RelayError::PlatformCode {
                code: reply.errcode,
                message: reply.errmsg,
            });
        }
        Ok(())
    }

    async fn send_push(
        &self,
        user_id: &str,
        conversation_id: &str,
        kind: ConversationKind,
        message: &OutboundMessage,
    ) -> Result<(), RelayError> {
        let (msg_key, msg_param) = push_param(message);
        let robot_code = &self.options.client_id;

        let (path, body) = match kind {
            ConversationKind::Private => (
                "/v1.0/robot/oToMessages/batchSend",
                json!({
                    "robotCode": robot_code,
                    "userIds": [user_id],
                    "msgKey": msg_key,
                    "msgParam": msg_param,
                }),
            ),
            ConversationKind::Group => (
                "/v1.0/robot/groupMessages/send",
                json!({
                    "robotCode": robot_code,
                    "openConversationId": conversation_id,
                    "msgKey": msg_key,
                    "msgParam": msg_param,
                }),
            ),
        };

        let result = self.post_openapi(path, &body).await?;
        tracing::debug!(%user_id, msg_key, ?result, "push accepted");
        Ok(())
    }

    async fn download(&self, download_code: &str) -> Result<PathBuf, RelayError> {
        let result = self
            .post_openapi(
                "/v1.0/robot/messageFiles/download",
                &json!({
                    "robotCode": self.options.client_id,
                    "downloadCode": download_code,
                }),
            )
            .await?;
        let url = serde_json::from_value::<DownloadResponse>(result.clone())
            .ok()
            .and_then(|r| r.download_url)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| RelayError::Platform {
                status: 200,
                body: result.to_string(),
            })?;

        let response = ensure_success(self.client.get(&url).send().await?).await?;
        let bytes = response.bytes().await?;

        save_image(&self.options.image_dir, &bytes).await
    }
}

#[async_trait]
impl MessageSender for DingTalkClient {
    async fn send(&self, target: &ReplyTarget, message: &OutboundMessage) -> Result<(), RelayError> {
        match target {
            ReplyTarget::Session {
                webhook,
                at_user_id,
            } => self.send_session(webhook, at_user_id.as_deref(), message).await,
            ReplyTarget::Push {
                user_id,
                conversation_id,
                conversation_kind,
            } => {
                self.send_push(user_id, conversation_id, *conversation_kind, message)
                    .await
            }
        }
    }
}

#[async_trait]
impl ImageResolver for DingTalkClient {
    async fn resolve(&self, download_code: &str) -> ImageResolution {
        match self.download(download_code).await {
            Ok(path) => {
                tracing::info!(path = %path.display(), "image downloaded");
                ImageResolution::Available(path)
            }
            Err(e) => {
                tracing::error!(error = %e, "image download failed");
                ImageResolution::Unavailable
            }
        }
    }
}

async fn ensure_success(response: Response) -> Result<Response, RelayError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(RelayError::Platform {
        status: status.as_u16(),
        body,
    })
}

fn session_body(message: &OutboundMessage, at_user_id: Option<&str>) -> Value {
    match message {
        OutboundMessage::Text { content } => {
            let at: Vec<&str> = at_user_id.into_iter().collect();
            json!({
                "msgtype": "text",
                "text": { "content": content },
                "at": { "atUserIds": at },
            })
        }
        OutboundMessage::Markdown { title, text } => json!({
            "msgtype": "markdown",
            "markdown": { "title": title, "text": text },
        }),
    }
}

/// `msgKey` and the JSON-encoded `msgParam` for the push APIs.
fn push_param(message: &OutboundMessage) -> (&'static str, String) {
    match message {
        OutboundMessage::Text { content } => {
            ("sampleText", json!({ "content": content }).to_string())
        }
        OutboundMessage::Markdown { title, text } => (
            "sampleMarkdown",
            json!({ "title": title, "text": text }).to_string(),
        ),
    }
}

async fn save_image(dir: &Path, bytes: &[u8]) -> Result<PathBuf, RelayError> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(format!("{}.jpg", ulid::Ulid::new().to_string().to_lowercase()));
    tokio::fs::write(&path, bytes).await?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer, image_dir: &Path) -> DingTalkClient {
        DingTalkClient::new(DingTalkOptions {
            client_id: "ding-app".into(),
            client_secret: "s3cret".into(),
            api_base: server.uri(),
            image_dir: image_dir.to_path_buf(),
            http_timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    async fn mount_token(server: &MockServer, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path("/v1.0/oauth2/accessToken"))
            .and(body_json(json!({"appKey": "ding-app", "appSecret": "s3cret"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"accessToken": "tok-1", "expireIn": 7200})),
            )
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    fn push_target(kind: ConversationKind) -> ReplyTarget {
        ReplyTarget::Push {
            user_id: "staff-1".into(),
            conversation_id: "cid-1".into(),
            conversation_kind: kind,
        }
    }

    #[tokio::test]
    async fn private_push_uses_batch_send_and_caches_token() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        mount_token(&server, 1).await;
        Mock::given(method("POST"))
            .and(path("/v1.0/robot/oToMessages/batchSend"))
            .and(header(ACCESS_TOKEN_HEADER, "tok-1"))
            .and(body_json(json!({
                "robotCode": "ding-app",
                "userIds": ["staff-1"],
                "msgKey": "sampleText",
                "msgParam": "{\"content\":\"hello\"}",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"processQueryKey": "k"})))
            .expect(2)
            .mount(&server)
            .await;

        let dt = client(&server, dir.path());
        let msg = OutboundMessage::Text {
            content: "hello".into(),
        };
        let target = push_target(ConversationKind::Private);
        dt.send(&target, &msg).await.unwrap();
        dt.send(&target, &msg).await.unwrap();
    }

    #[tokio::test]
    async fn group_push_uses_open_conversation_id() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        mount_token(&server, 1).await;
        Mock::given(method("POST"))
            .and(path("/v1.0/robot/groupMessages/send"))
            .and(body_partial_json(json!({
                "openConversationId": "cid-1",
                "msgKey": "sampleMarkdown",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let msg = OutboundMessage::Markdown {
            title: "报告".into(),
            text: "# 报告\n内容".into(),
        };
        client(&server, dir.path())
            .send(&push_target(ConversationKind::Group), &msg)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_token_exchange() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        mount_token(&server, 1).await;

        let dt = std::sync::Arc::new(client(&server, dir.path()));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let dt = std::sync::Arc::clone(&dt);
            handles.push(tokio::spawn(async move { dt.access_token().await }));
        }
        for h in handles {
            assert_eq!(h.await.unwrap().unwrap(), "tok-1");
        }
    }

    #[tokio::test]
    async fn push_rejection_is_reported() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        mount_token(&server, 1).await;
        Mock::given(method("POST"))
            .and(path("/v1.0/robot/oToMessages/batchSend"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid userIds"))
            .mount(&server)
            .await;

        let err = client(&server, dir.path())
            .send(
                &push_target(ConversationKind::Private),
                &OutboundMessage::Text {
                    content: "x".into(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Platform { status: 400, .. }), "{err}");
    }

    #[tokio::test]
    async fn session_reply_mentions_sender() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        Mock::given(method("POST"))
            .and(path("/robot/sendBySession"))
            .and(body_json(json!({
                "msgtype": "text",
                "text": {"content": "收到"},
                "at": {"atUserIds": ["staff-1"]},
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"errcode": 0, "errmsg": "ok"})))
            .expect(1)
            .mount(&server)
            .await;

        let target = ReplyTarget::session(
            format!("{}/robot/sendBySession", server.uri()),
            Some("staff-1".into()),
        );
        client(&server, dir.path())
            .send(
                &target,
                &OutboundMessage::Text {
                    content: "收到".into(),
                },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn session_errcode_is_an_error() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"errcode": 300001, "errmsg": "session expired"})),
            )
            .mount(&server)
            .await;

        let target = ReplyTarget::session(format!("{}/hook", server.uri()), None);
        let err = client(&server, dir.path())
            .send(
                &target,
                &OutboundMessage::Text {
                    content: "late".into(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::PlatformCode { code: 300001, .. }));
    }

    #[tokio::test]
    async fn image_is_downloaded_into_image_dir() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        mount_token(&server, 1).await;
        Mock::given(method("POST"))
            .and(path("/v1.0/robot/messageFiles/download"))
            .and(body_json(json!({"robotCode": "ding-app", "downloadCode": "dc-1"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"downloadUrl": format!("{}/files/dc-1", server.uri())})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/files/dc-1"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"\xff\xd8jpeg".to_vec()))
            .mount(&server)
            .await;

        let resolution = client(&server, dir.path()).resolve("dc-1").await;

        let ImageResolution::Available(saved) = resolution else {
            panic!("expected a downloaded image, got {resolution:?}");
        };
        assert_eq!(saved.parent(), Some(dir.path()));
        assert_eq!(saved.extension().and_then(|e| e.to_str()), Some("jpg"));
        assert_eq!(std::fs::read(&saved).unwrap(), b"\xff\xd8jpeg");
    }

    #[tokio::test]
    async fn image_failure_is_unavailable() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        Mock::given(method("POST"))
            .and(path("/v1.0/oauth2/accessToken"))
            .respond_with(ResponseTemplate::new(403).set_body_string("bad credentials"))
            .mount(&server)
            .await;

        let resolution = client(&server, dir.path()).resolve("dc-1").await;
        assert_eq!(resolution, ImageResolution::Unavailable);
    }
}

//! HTTP surface: robot callback, task status, health and static images.

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path as UrlPath, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;

use relay_core::app::signature;
use relay_core::app::{HandleOutcome, Relay};
use relay_core::domain::{InboundMessage, TaskId};
use relay_core::ports::Clock;

#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<Relay>,
    /// Callback signing secret. `None` disables verification.
    pub signing_secret: Option<Arc<str>>,
    pub clock: Arc<dyn Clock>,
}

pub struct Routes<'a> {
    pub callback_path: &'a str,
    pub image_route: &'a str,
    pub image_dir: &'a Path,
}

pub fn router(state: AppState, routes: Routes<'_>) -> Router {
    let images = Router::new()
        .fallback_service(ServeDir::new(routes.image_dir))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("public, max-age=86400"),
        ))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any));

    Router::new()
        .route(routes.callback_path, post(handle_callback))
        .route("/tasks/{id}", get(handle_task))
        .route("/healthz", get(handle_health))
        .with_state(state)
        .nest(routes.image_route, images)
}

/// POST {callback_path}
async fn handle_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Some(secret) = &state.signing_secret {
        let now_ms = state.clock.now().timestamp_millis();
        let timestamp = header_str(&headers, "timestamp");
        if !signature::verify(secret, timestamp, header_str(&headers, "sign"), now_ms) {
            tracing::warn!("callback rejected: bad signature");
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({"error": "invalid signature"})),
            )
                .into_response();
        }
    }

    let msg = match InboundMessage::from_callback(&body) {
        Ok(msg) => msg,
        Err(e) => {
            tracing::warn!(error = %e, "callback rejected");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": e.to_string()})),
            )
                .into_response();
        }
    };

    // Detached from the request so a dropped connection cannot cut the
    // handling short after the event id was recorded as seen.
    let relay = Arc::clone(&state.relay);
    let handling = tokio::spawn(async move { relay.handle_event(msg).await });
    let outcome = match handling.await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!(error = %e, "event handling aborted");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "event handling aborted"})),
            )
                .into_response();
        }
    };

    let body = match outcome {
        HandleOutcome::Duplicate => json!({"status": "duplicate"}),
        HandleOutcome::Replied => json!({"status": "replied"}),
        HandleOutcome::Dispatched(task_id) => json!({"status": "dispatched", "task_id": task_id}),
        HandleOutcome::Undeliverable => json!({"status": "undeliverable"}),
    };
    // The platform only needs to know the event arrived.
    Json(body).into_response()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

/// GET /tasks/{id}
async fn handle_task(State(state): State<AppState>, UrlPath(id): UrlPath<String>) -> Response {
    let Ok(task_id) = TaskId::from_str(&id) else {
        return (StatusCode::NOT_FOUND, Json(json!({"error": "unknown task"}))).into_response();
    };
    match state.relay.store().get(task_id).await {
        Some(record) => Json(record).into_response(),
        None => (StatusCode::NOT_FOUND, Json(json!({"error": "unknown task"}))).into_response(),
    }
}

/// GET /healthz
async fn handle_health(State(state): State<AppState>) -> impl IntoResponse {
    let counts = state.relay.store().counts().await;
    Json(json!({
        "status": "ok",
        "tasks": counts,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use relay_core::app::RelayBuilder;
    use relay_core::domain::{OutboundMessage, RelayError, ReplyTarget};
    use relay_core::ports::{
        AgentClient, FixedClock, ImageResolution, ImageResolver, MessageSender,
    };
    use std::sync::Mutex;
    use tower::ServiceExt;

    #[derive(Default)]
    struct EchoAgent {
        delay: std::time::Duration,
    }

    #[async_trait]
    impl AgentClient for EchoAgent {
        async fn chat(&self, prompt: &str, _image_path: Option<&std::path::Path>) -> String {
            tokio::time::sleep(self.delay).await;
            format!("echo: {prompt}")
        }
    }

    #[derive(Default)]
    struct Outbox(Mutex<Vec<OutboundMessage>>);

    #[async_trait]
    impl MessageSender for Outbox {
        async fn send(
            &self,
            _target: &ReplyTarget,
            message: &OutboundMessage,
        ) -> Result<(), RelayError> {
            self.0.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    struct NoImages;

    #[async_trait]
    impl ImageResolver for NoImages {
        async fn resolve(&self, _download_code: &str) -> ImageResolution {
            ImageResolution::Unavailable
        }
    }

    const NOW_MS: i64 = 1_717_228_800_000;

    fn app(secret: Option<&str>, image_dir: &Path) -> (Router, Arc<Outbox>) {
        app_with_agent(EchoAgent::default(), secret, image_dir)
    }

    fn app_with_agent(
        agent: EchoAgent,
        secret: Option<&str>,
        image_dir: &Path,
    ) -> (Router, Arc<Outbox>) {
        let outbox = Arc::new(Outbox::default());
        let relay = RelayBuilder::new()
            .agent(Arc::new(agent))
            .sender(outbox.clone())
            .images(Arc::new(NoImages))
            .build()
            .unwrap();
        let clock = FixedClock::new(chrono::DateTime::from_timestamp_millis(NOW_MS).unwrap());
        let state = AppState {
            relay: Arc::new(relay),
            signing_secret: secret.map(Arc::from),
            clock: Arc::new(clock),
        };
        let router = router(
            state,
            Routes {
                callback_path: "/dingtalk/callback",
                image_route: "/images",
                image_dir,
            },
        );
        (router, outbox)
    }

    fn callback(body: serde_json::Value) -> Request<Body> {
        Request::post("/dingtalk/callback")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn text_event(msg_id: &str, text: &str) -> serde_json::Value {
        json!({
            "msgId": msg_id,
            "msgtype": "text",
            "text": {"content": text},
            "senderStaffId": "staff-1",
            "conversationId": "cid-1",
            "conversationType": "1",
            "sessionWebhook": "https://oapi.example/robot/sendBySession?session=x",
        })
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn callback_replies_inline() {
        let dir = tempfile::tempdir().unwrap();
        let (app, outbox) = app(None, dir.path());

        let response = app.oneshot(callback(text_event("m1", "你好"))).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "replied");
        assert_eq!(outbox.0.lock().unwrap()[0].body(), "echo: 你好");
    }

    #[tokio::test]
    async fn malformed_callback_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _) = app(None, dir.path());

        let response = app.oneshot(callback(json!({"msgId": "m1"}))).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn signature_is_enforced_when_configured() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _) = app(Some("app-secret"), dir.path());

        let unsigned = app
            .clone()
            .oneshot(callback(text_event("m1", "你好")))
            .await
            .unwrap();
        assert_eq!(unsigned.status(), StatusCode::UNAUTHORIZED);

        let ts = NOW_MS.to_string();
        let mut signed = callback(text_event("m2", "你好"));
        signed
            .headers_mut()
            .insert("timestamp", HeaderValue::from_str(&ts).unwrap());
        signed.headers_mut().insert(
            "sign",
            HeaderValue::from_str(&signature::sign("app-secret", &ts).unwrap()).unwrap(),
        );
        let response = app.oneshot(signed).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn dispatched_task_is_visible_on_status_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _) = app(None, dir.path());

        let response = app
            .clone()
            .oneshot(callback(text_event("m1", "生成报告")))
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["status"], "dispatched");
        let task_id = body["task_id"].as_str().unwrap().to_owned();

        let response = app
            .clone()
            .oneshot(
                Request::get(format!("/tasks/{task_id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["prompt"], "生成报告");

        let missing = app
            .oneshot(Request::get("/tasks/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn health_reports_counts() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _) = app(None, dir.path());

        let response = app
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["tasks"]["pending"], 0);
    }

    #[tokio::test]
    async fn images_are_served_with_cache_headers() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.jpg"), b"\xFF\xD8jpeg").unwrap();
        let (app, _) = app(None, dir.path());

        let response = app
            .oneshot(
                Request::get("/images/a.jpg")
                    .header("origin", "https://example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CACHE_CONTROL],
            "public, max-age=86400"
        );
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }

    #[tokio::test]
    async fn handling_outlives_a_dropped_connection() {
        use tokio::io::AsyncWriteExt;

        let dir = tempfile::tempdir().unwrap();
        let agent = EchoAgent {
            delay: std::time::Duration::from_millis(300),
        };
        let (app, outbox) = app_with_agent(agent, None, dir.path());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move { axum::serve(listener, app).await });

        let body = text_event("m-drop", "你好").to_string();
        let request = format!(
            "POST /dingtalk/callback HTTP/1.1\r\nHost: {addr}\r\n\
             Content-Type: application/json\r\nContent-Length: {}\r\n\r\n{body}",
            body.len()
        );
        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream.write_all(request.as_bytes()).await.unwrap();
        stream.flush().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        drop(stream);

        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while outbox.0.lock().unwrap().is_empty() {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("reply is sent after the client went away");
        assert_eq!(outbox.0.lock().unwrap()[0].body(), "echo: 你好");

        server.abort();
    }
}

use std::sync::{Arc, Mutex as StdMutex, OnceLock};

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Map, Value};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tower::ServiceExt;

use crate::api;
use crate::core::{config::Settings, state::AppState};
use crate::services::nim_client::{ChatRequest, GatewayError, LlmGateway};

const TEST_API_KEY: &str = "test-nim-key";
pub(crate) const STUB_CHAT_MODEL: &str = "stub-chat-model";

pub(crate) async fn env_lock() -> OwnedMutexGuard<()> {
    static LOCK: OnceLock<Arc<Mutex<()>>> = OnceLock::new();
    let lock = LOCK.get_or_init(|| Arc::new(Mutex::new(()))).clone();
    lock.lock_owned().await
}

pub(crate) fn set_test_env() {
    std::env::set_var("GRADER_ENV", "test");
    std::env::set_var("GRADER_STRICT_CONFIG", "0");
    std::env::set_var("GRADER_BACKEND_HOST", "127.0.0.1");
    std::env::set_var("NIM_API_KEY", TEST_API_KEY);
    std::env::set_var("PROMETHEUS_ENABLED", "0");
    for key in [
        "GRADER_BACKEND_PORT",
        "GRADER_BACKEND_RELOAD",
        "GRADER_FRONTEND_PORT",
        "GRADER_FRONTEND_DIR",
        "GRADER_CORS_ORIGINS",
        "GRADER_MAX_UPLOAD_SIZE_MB",
        "GRADER_LOG_JSON",
        "NIM_BASE_URL",
        "NIM_CHAT_MODEL",
        "NIM_EMBED_MODEL",
    ] {
        std::env::remove_var(key);
    }
}

#[derive(Debug, Clone)]
pub(crate) enum StubReply {
    Body(Value),
    Fail { status: u16, message: String },
}

/// In-process stand-in for the hosted model API.
pub(crate) struct StubGateway {
    reply: StubReply,
    chat_model: Option<String>,
    requests: StdMutex<Vec<ChatRequest>>,
}

impl StubGateway {
    pub(crate) fn replying_body(body: Value) -> Self {
        Self {
            reply: StubReply::Body(body),
            chat_model: Some(STUB_CHAT_MODEL.to_string()),
            requests: StdMutex::new(Vec::new()),
        }
    }

    pub(crate) fn replying_text(text: &str) -> Self {
        Self::replying_body(json!({
            "id": "chatcmpl-stub",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": text}}]
        }))
    }

    pub(crate) fn failing(status: u16, message: &str) -> Self {
        Self {
            reply: StubReply::Fail { status, message: message.to_string() },
            ..Self::replying_body(Value::Null)
        }
    }

    pub(crate) fn without_chat_model(mut self) -> Self {
        self.chat_model = None;
        self
    }

    pub(crate) fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().expect("stub requests").clone()
    }
}

#[async_trait]
impl LlmGateway for StubGateway {
    fn default_chat_model(&self) -> Option<&str> {
        self.chat_model.as_deref()
    }

    async fn chat_completion(&self, request: ChatRequest) -> Result<Value, GatewayError> {
        self.requests.lock().expect("stub requests").push(request);
        match &self.reply {
            StubReply::Body(body) => Ok(body.clone()),
            StubReply::Fail { status, message } => Err(GatewayError::Api {
                operation: "chat",
                status: *status,
                message: message.clone(),
                body: Some(json!({"error": {"message": message}})),
            }),
        }
    }

    async fn embedding(
        &self,
        texts: &[String],
        _model: Option<&str>,
        _extra: Map<String, Value>,
    ) -> Result<Vec<Vec<f32>>, GatewayError> {
        Ok(texts.iter().map(|text| vec![text.len() as f32]).collect())
    }
}

pub(crate) struct TestApp {
    pub(crate) state: AppState,
    pub(crate) app: Router,
    pub(crate) gateway: Arc<StubGateway>,
}

/// Callers must hold `env_lock` and have called `set_test_env`.
pub(crate) fn build_app(gateway: StubGateway) -> TestApp {
    let settings = Settings::load().expect("settings");
    let gateway = Arc::new(gateway);
    let state = AppState::new(settings, gateway.clone());
    let app = api::router::router(state.clone());
    TestApp { state, app, gateway }
}

pub(crate) async fn post_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request");
    send(app, request).await
}

pub(crate) async fn post_multipart_file(
    app: &Router,
    uri: &str,
    filename: &str,
    contents: &[u8],
) -> (StatusCode, Value) {
    let boundary = "grader-test-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(contents);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={boundary}"))
        .body(Body::from(body))
        .expect("request");
    send(app, request).await
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

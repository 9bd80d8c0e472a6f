use std::time::Instant;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::core::config::Settings;
use crate::core::metrics;

const DEFAULT_TEMPERATURE: f64 = 0.2;
const DEFAULT_MAX_TOKENS: u32 = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum ChatRole {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct ChatMessage {
    pub(crate) role: ChatRole,
    pub(crate) content: String,
}

impl ChatMessage {
    pub(crate) fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: content.into() }
    }

    pub(crate) fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }
}

/// One chat-completion call. `model: None` uses the configured chat model.
#[derive(Debug, Clone)]
pub(crate) struct ChatRequest {
    pub(crate) messages: Vec<ChatMessage>,
    pub(crate) model: Option<String>,
    pub(crate) temperature: f64,
    pub(crate) max_tokens: u32,
    pub(crate) extra: Map<String, Value>,
}

impl ChatRequest {
    pub(crate) fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            model: None,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            extra: Map::new(),
        }
    }

    pub(crate) fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub(crate) fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub(crate) fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Extra payload options are merged last and override the typed fields.
    pub(crate) fn with_option(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

#[derive(Debug, Error)]
pub(crate) enum GatewayError {
    #[error("no {0} model configured; set NIM_CHAT_MODEL / NIM_EMBED_MODEL")]
    MissingModel(&'static str),
    #[error("NIM {operation} failed: {source}")]
    Transport {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("NIM {operation} failed ({status}): {message} - {}", render_body(.body))]
    Api { operation: &'static str, status: u16, message: String, body: Option<Value> },
    #[error("NIM {operation} returned an unusable body: {detail}")]
    InvalidBody { operation: &'static str, detail: String },
}

/// Hosted model API as seen by the request handlers.
#[async_trait]
pub(crate) trait LlmGateway: Send + Sync {
    /// The chat model used when a request does not name one.
    fn default_chat_model(&self) -> Option<&str>;

    /// Returns the upstream response body untouched.
    async fn chat_completion(&self, request: ChatRequest) -> Result<Value, GatewayError>;

    /// One vector per input text, in input order.
    async fn embedding(
        &self,
        texts: &[String],
        model: Option<&str>,
        extra: Map<String, Value>,
    ) -> Result<Vec<Vec<f32>>, GatewayError>;
}

/// Client for an OpenAI-compatible NIM endpoint.
#[derive(Debug, Clone)]
pub(crate) struct NimClient {
    client: Client,
    api_key: String,
    base_url: String,
    chat_model: Option<String>,
    embed_model: Option<String>,
}

impl NimClient {
    pub(crate) fn new(
        base_url: &str,
        api_key: &str,
        chat_model: Option<String>,
        embed_model: Option<String>,
    ) -> anyhow::Result<Self> {
        let client = Client::builder().build().context("Failed to build NIM HTTP client")?;

        if api_key.is_empty() {
            tracing::warn!(
                "NIM_API_KEY is not set. Calls to chat_completion/embedding will fail until a valid key is provided"
            );
        }

        Ok(Self {
            client,
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            chat_model,
            embed_model,
        })
    }

    pub(crate) fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let nim = settings.nim();
        Self::new(&nim.base_url, &nim.api_key, nim.chat_model.clone(), nim.embed_model.clone())
    }

    async fn post_json(
        &self,
        operation: &'static str,
        path: &str,
        payload: &Value,
    ) -> Result<Value, GatewayError> {
        let url = format!("{}/{path}", self.base_url);
        let mut request = self.client.post(&url).json(payload);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }

        let response =
            request.send().await.map_err(|source| GatewayError::Transport { operation, source })?;
        let status = response.status();
        let raw_body =
            response.text().await.map_err(|source| GatewayError::Transport { operation, source })?;
        let parsed = serde_json::from_str::<Value>(&raw_body).ok();

        if !status.is_success() {
            let message = parsed.as_ref().and_then(extract_error_message).unwrap_or_else(|| {
                status.canonical_reason().unwrap_or("unknown upstream error").to_string()
            });
            return Err(GatewayError::Api { operation, status: status.as_u16(), message, body: parsed });
        }

        parsed.ok_or_else(|| GatewayError::InvalidBody {
            operation,
            detail: format!("non-JSON body: {}", truncate_chars(&raw_body, 200)),
        })
    }
}

#[async_trait]
impl LlmGateway for NimClient {
    fn default_chat_model(&self) -> Option<&str> {
        self.chat_model.as_deref()
    }

    async fn chat_completion(&self, request: ChatRequest) -> Result<Value, GatewayError> {
        let model = request
            .model
            .clone()
            .filter(|model| !model.is_empty())
            .or_else(|| self.chat_model.clone())
            .ok_or(GatewayError::MissingModel("chat"))?;

        tracing::info!(
            model = %model,
            messages = request.messages.len(),
            "Calling NIM chat model"
        );

        let mut payload = Map::new();
        payload.insert("model".to_string(), json!(model));
        payload.insert("messages".to_string(), json!(request.messages));
        payload.insert("temperature".to_string(), json!(request.temperature));
        payload.insert("max_tokens".to_string(), json!(request.max_tokens));
        payload.extend(request.extra);

        let timer = Instant::now();
        match self.post_json("chat", "chat/completions", &Value::Object(payload)).await {
            Ok(body) => {
                metrics::record_llm_call("chat", "ok");
                let tokens_used = body.pointer("/usage/total_tokens").and_then(Value::as_u64);
                tracing::info!(
                    model = %model,
                    duration_seconds = timer.elapsed().as_secs_f64(),
                    tokens_used,
                    "NIM chat completed"
                );
                Ok(body)
            }
            Err(err) => {
                metrics::record_llm_call("chat", "error");
                tracing::error!(model = %model, error = %err, "Error calling NIM chat model");
                Err(err)
            }
        }
    }

    async fn embedding(
        &self,
        texts: &[String],
        model: Option<&str>,
        extra: Map<String, Value>,
    ) -> Result<Vec<Vec<f32>>, GatewayError> {
        let model = model
            .filter(|model| !model.is_empty())
            .map(ToString::to_string)
            .or_else(|| self.embed_model.clone())
            .ok_or(GatewayError::MissingModel("embedding"))?;

        tracing::info!(model = %model, texts = texts.len(), "Calling NIM embedding model");

        let mut payload = Map::new();
        payload.insert("model".to_string(), json!(model));
        payload.insert("input".to_string(), json!(texts));
        payload.extend(extra);

        let result = self
            .post_json("embedding", "embeddings", &Value::Object(payload))
            .await
            .and_then(|body| parse_embeddings(&body));

        match result {
            Ok(vectors) => {
                metrics::record_llm_call("embedding", "ok");
                Ok(vectors)
            }
            Err(err) => {
                metrics::record_llm_call("embedding", "error");
                tracing::error!(model = %model, error = %err, "Error calling NIM embedding model");
                Err(err)
            }
        }
    }
}

fn parse_embeddings(body: &Value) -> Result<Vec<Vec<f32>>, GatewayError> {
    let invalid = |detail: &str| GatewayError::InvalidBody {
        operation: "embedding",
        detail: detail.to_string(),
    };

    let mut entries = body
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| invalid("missing 'data' array"))?
        .iter()
        .enumerate()
        .map(|(position, item)| {
            let index = item.get("index").and_then(Value::as_u64).unwrap_or(position as u64);
            let vector = item
                .get("embedding")
                .and_then(Value::as_array)
                .ok_or_else(|| invalid("entry without 'embedding' array"))?
                .iter()
                .map(|value| value.as_f64().map(|number| number as f32))
                .collect::<Option<Vec<f32>>>()
                .ok_or_else(|| invalid("non-numeric embedding component"))?;
            Ok((index, vector))
        })
        .collect::<Result<Vec<_>, GatewayError>>()?;

    entries.sort_by_key(|(index, _)| *index);
    Ok(entries.into_iter().map(|(_, vector)| vector).collect())
}

fn extract_error_message(payload: &Value) -> Option<String> {
    if let Some(error) = payload.get("error") {
        if let Some(message) = error.get("message").and_then(Value::as_str) {
            return Some(message.to_string());
        }
        if let Some(text) = error.as_str() {
            return Some(text.to_string());
        }
    }

    if let Some(detail) = payload.get("detail") {
        if let Some(text) = detail.as_str() {
            return Some(text.to_string());
        }
        if let Some(items) = detail.as_array() {
            let joined = items
                .iter()
                .filter_map(|item| {
                    item.get("msg")
                        .and_then(Value::as_str)
                        .or_else(|| item.get("message").and_then(Value::as_str))
                })
                .collect::<Vec<_>>()
                .join("; ");
            if !joined.is_empty() {
                return Some(joined);
            }
        }
    }

    payload.get("message").and_then(Value::as_str).map(ToString::to_string)
}

fn render_body(body: &Option<Value>) -> String {
    body.as_ref().map(Value::to_string).unwrap_or_else(|| "None".to_string())
}

fn truncate_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use std::collections::HashMap;

use crate::core::metrics;
use crate::core::state::AppState;
use crate::schemas::{HealthResponse, RootResponse};

pub(crate) async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        message: "Grader Agent API".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

pub(crate) async fn healthz(State(state): State<AppState>) -> Json<HealthResponse> {
    let mut status = "healthy".to_string();
    let mut components = HashMap::new();

    let nim = state.settings().nim();
    if nim.api_key.is_empty() {
        components.insert("nim".to_string(), "missing api key".to_string());
        status = "degraded".to_string();
    } else {
        components.insert("nim".to_string(), "configured".to_string());
    }

    match state.llm().default_chat_model() {
        Some(model) => {
            components.insert("chat_model".to_string(), model.to_string());
        }
        None => {
            components.insert("chat_model".to_string(), "unset".to_string());
            status = "degraded".to_string();
        }
    }

    Json(HealthResponse { service: "grader-api".to_string(), status, components })
}

pub(crate) async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    if !state.settings().telemetry().prometheus_enabled {
        return StatusCode::NOT_FOUND.into_response();
    }

    match metrics::render() {
        Some(body) => ([(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")], body)
            .into_response(),
        None => StatusCode::SERVICE_UNAVAILABLE.into_response(),
    }
}

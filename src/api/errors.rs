use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::services::model_output::ModelOutputFailure;
use crate::services::nim_client::GatewayError;

#[derive(Debug, Serialize)]
struct ErrorResponse {
    status: u16,
    detail: String,
}

#[derive(Debug)]
pub(crate) enum ApiError {
    BadRequest(String),
    BadGateway(String),
    Internal(String),
}

impl ApiError {
    pub(crate) fn upstream(err: GatewayError) -> Self {
        Self::BadGateway(err.to_string())
    }

    /// Model output that could not be turned into `what`; the detail keeps the snippet.
    pub(crate) fn model_output(what: &str, failure: ModelOutputFailure) -> Self {
        tracing::error!(
            error = ?failure,
            snippet = %failure.snippet,
            "Failed to parse {what} JSON from model output"
        );
        Self::Internal(format!("Failed to parse {what} JSON from model output: {failure}"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::BadGateway(message) => {
                tracing::error!(error = %message, "Upstream model API failed");
                (StatusCode::BAD_GATEWAY, message)
            }
            ApiError::Internal(message) => {
                tracing::error!(error = %message, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, message)
            }
        };

        (status, Json(ErrorResponse { status: status.as_u16(), detail })).into_response()
    }
}

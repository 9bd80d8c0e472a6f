use axum::{extract::State, routing::post, Json, Router};

use crate::api::errors::ApiError;
use crate::api::log_model_text;
use crate::core::state::AppState;
use crate::schemas::rubric::{RubricGenerateRequest, RubricGenerateResponse};
use crate::services::model_output;
use crate::services::nim_client::ChatRequest;
use crate::services::prompts;

const RUBRIC_TEMPERATURE: f64 = 0.3;
const RUBRIC_MAX_TOKENS: u32 = 2048;

pub(crate) fn router() -> Router<AppState> {
    Router::new().route("/generate", post(generate_rubric))
}

pub(crate) async fn generate_rubric(
    State(state): State<AppState>,
    Json(payload): Json<RubricGenerateRequest>,
) -> Result<Json<RubricGenerateResponse>, ApiError> {
    let messages = prompts::build_rubric_prompt(&payload.objective, &payload.exemplars);
    let request = ChatRequest::new(messages)
        .with_temperature(RUBRIC_TEMPERATURE)
        .with_max_tokens(RUBRIC_MAX_TOKENS);

    tracing::info!(exemplars = payload.exemplars.len(), "Generating rubric");

    let response = state.llm().chat_completion(request).await.map_err(ApiError::upstream)?;

    let text = model_output::extract_response_text(&response)
        .map_err(|failure| ApiError::model_output("rubric", failure))?;
    log_model_text("RUBRIC", &text);

    let rubric = model_output::parse_rubric(&text)
        .map_err(|failure| ApiError::model_output("rubric", failure))?;

    tracing::info!(criteria = rubric.criteria.len(), "Rubric generated");

    Ok(Json(RubricGenerateResponse { rubric, raw_model_output: Some(response) }))
}

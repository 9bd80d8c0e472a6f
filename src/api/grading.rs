use axum::{extract::State, Json};

use crate::api::errors::ApiError;
use crate::api::log_model_text;
use crate::api::validation::validate_payload;
use crate::core::state::AppState;
use crate::schemas::grading::{GradeSubmissionRequest, GradeSubmissionResponse};
use crate::services::model_output;
use crate::services::nim_client::ChatRequest;
use crate::services::prompts;

const GRADING_TEMPERATURE: f64 = 0.2;
const GRADING_MAX_TOKENS: u32 = 2048;

pub(crate) async fn grade_submission(
    State(state): State<AppState>,
    Json(payload): Json<GradeSubmissionRequest>,
) -> Result<Json<GradeSubmissionResponse>, ApiError> {
    validate_payload(&payload)?;

    let model = state
        .llm()
        .default_chat_model()
        .map(ToString::to_string)
        .ok_or_else(|| ApiError::Internal("NIM_CHAT_MODEL env var not set".to_string()))?;

    let messages = prompts::build_grading_prompt(&payload).map_err(|err| {
        tracing::error!(error = %err, "Failed to serialize rubric for the grading prompt");
        ApiError::Internal(format!("Failed to serialize rubric: {err}"))
    })?;
    let request = ChatRequest::new(messages)
        .with_model(model)
        .with_temperature(GRADING_TEMPERATURE)
        .with_max_tokens(GRADING_MAX_TOKENS);

    tracing::info!(
        criteria = payload.rubric.criteria.len(),
        submission_chars = payload.submission_text.chars().count(),
        "Grading submission"
    );

    let response = state.llm().chat_completion(request).await.map_err(ApiError::upstream)?;

    let text = model_output::extract_response_text(&response)
        .map_err(|failure| ApiError::model_output("grading", failure))?;
    log_model_text("GRADE", &text);

    let outcome = model_output::parse_grading(&text)
        .map_err(|failure| ApiError::model_output("grading", failure))?;

    tracing::info!(
        results = outcome.results.len(),
        overall_score = outcome.overall_score,
        "Submission graded"
    );

    Ok(Json(GradeSubmissionResponse::new(outcome, response)))
}

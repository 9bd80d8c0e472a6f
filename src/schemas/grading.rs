use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

use crate::schemas::rubric::Rubric;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct GradeCriterionResult {
    pub(crate) criterion_id: String,
    pub(crate) level_label: String,
    pub(crate) score: f64,
    pub(crate) explanation: String,
}

/// Normalized grading verdict extracted from model output.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct GradeOutcome {
    pub(crate) results: Vec<GradeCriterionResult>,
    pub(crate) overall_score: f64,
    pub(crate) overall_comment: String,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct GradeSubmissionRequest {
    pub(crate) objective: String,
    #[validate(nested)]
    pub(crate) rubric: Rubric,
    pub(crate) submission_text: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct GradeSubmissionResponse {
    pub(crate) results: Vec<GradeCriterionResult>,
    pub(crate) overall_score: f64,
    pub(crate) overall_comment: String,
    pub(crate) raw_model_output: Option<Value>,
}

impl GradeSubmissionResponse {
    pub(crate) fn new(outcome: GradeOutcome, raw_model_output: Value) -> Self {
        Self {
            results: outcome.results,
            overall_score: outcome.overall_score,
            overall_comment: outcome.overall_comment,
            raw_model_output: Some(raw_model_output),
        }
    }
}

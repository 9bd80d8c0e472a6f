use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Exemplar {
    pub(crate) text: String,
    #[serde(default)]
    pub(crate) grade: Option<String>,
    #[serde(default)]
    pub(crate) comments: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct PerformanceLevel {
    pub(crate) label: String,
    pub(crate) descriptor: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub(crate) struct Criterion {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) description: String,
    #[validate(range(min = 0.0, max = 1.0, message = "weight must be between 0 and 1"))]
    pub(crate) weight: f64,
    pub(crate) levels: Vec<PerformanceLevel>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub(crate) struct Rubric {
    pub(crate) title: String,
    #[validate(nested)]
    pub(crate) criteria: Vec<Criterion>,
    #[serde(default)]
    pub(crate) overall_notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RubricGenerateRequest {
    pub(crate) objective: String,
    #[serde(default)]
    pub(crate) exemplars: Vec<Exemplar>,
}

#[derive(Debug, Serialize)]
pub(crate) struct RubricGenerateResponse {
    pub(crate) rubric: Rubric,
    pub(crate) raw_model_output: Option<Value>,
}

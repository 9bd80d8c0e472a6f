//! Turns raw chat-completion responses into typed results.
//!
//! Model backends disagree on how they shape message content, and models
//! wrap JSON in prose or Markdown fences. Everything here is tolerant of
//! that, but never returns a partial result: any failure carries a short
//! snippet of the offending output so callers can see what came back.

use serde_json::{Map, Value};
use thiserror::Error;
use validator::Validate;

use crate::schemas::grading::{GradeCriterionResult, GradeOutcome};
use crate::schemas::rubric::Rubric;

const DIAGNOSTIC_SNIPPET_CHARS: usize = 500;

// Grading field aliases, first non-empty string wins.
const CRITERION_ID_ALIASES: &[&str] = &["criterion_id", "id"];
const LEVEL_LABEL_ALIASES: &[&str] = &["level_label"];
const EXPLANATION_ALIASES: &[&str] = &["explanation", "comment"];

#[derive(Debug, Error)]
pub(crate) enum ModelOutputError {
    #[error("no 'choices' in model response")]
    MissingChoices,
    #[error("LLM response has no usable 'content'")]
    NoContent,
    #[error("invalid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),
    #[error("expected a JSON object but found {0}")]
    NotAnObject(&'static str),
    #[error("field '{field}' has an unusable value: {value}")]
    InvalidField { field: &'static str, value: String },
    #[error("rubric JSON does not match the expected shape: {0}")]
    RubricShape(#[source] serde_json::Error),
    #[error("rubric failed validation: {0}")]
    RubricValidation(#[from] validator::ValidationErrors),
}

#[derive(Debug, Error)]
#[error("{source}. Model output: {snippet}")]
pub(crate) struct ModelOutputFailure {
    #[source]
    pub(crate) source: ModelOutputError,
    pub(crate) snippet: String,
}

impl ModelOutputFailure {
    fn new(source: ModelOutputError, output: &str) -> Self {
        Self { source, snippet: diagnostic_snippet(output) }
    }
}

/// Message content as returned by the chat API.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum MessageContent<'a> {
    PlainText(&'a str),
    PartList(&'a [Value]),
}

impl<'a> MessageContent<'a> {
    pub(crate) fn from_value(value: &'a Value) -> Option<Self> {
        match value {
            Value::String(text) => Some(Self::PlainText(text.as_str())),
            Value::Array(parts) => Some(Self::PartList(parts.as_slice())),
            _ => None,
        }
    }

    /// Trimmed text, `None` when nothing usable remains.
    pub(crate) fn text(self) -> Option<String> {
        let text = match self {
            Self::PlainText(text) => text.trim().to_string(),
            Self::PartList(parts) => {
                parts.iter().filter_map(part_text).collect::<String>().trim().to_string()
            }
        };
        Some(text).filter(|text| !text.is_empty())
    }
}

/// Plain strings, and structured parts carrying a string `text` field
/// (including `{"type": "text" | "output_text", "text": ...}`).
fn part_text(part: &Value) -> Option<&str> {
    match part {
        Value::String(text) => Some(text.as_str()),
        Value::Object(fields) => fields.get("text").and_then(Value::as_str),
        _ => None,
    }
}

/// Text of the first choice's message.
pub(crate) fn extract_response_text(response: &Value) -> Result<String, ModelOutputFailure> {
    let choice = response
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .ok_or_else(|| {
            ModelOutputFailure::new(ModelOutputError::MissingChoices, &response.to_string())
        })?;

    choice
        .get("message")
        .and_then(|message| message.get("content"))
        .and_then(MessageContent::from_value)
        .and_then(MessageContent::text)
        .ok_or_else(|| ModelOutputFailure::new(ModelOutputError::NoContent, &choice.to_string()))
}

/// Removes a surrounding ```` ``` ```` / ```` ```json ```` fence, if any.
pub(crate) fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(mut inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    if inner.get(..4).is_some_and(|tag| tag.eq_ignore_ascii_case("json")) {
        inner = &inner[4..];
    }
    if let Some(end) = inner.rfind("```") {
        inner = &inner[..end];
    }
    inner.trim()
}

/// Parses `text` as JSON, falling back to the span between the first `{`
/// and the last `}`. Without such a span the original error is returned.
pub(crate) fn parse_json_document(text: &str) -> Result<Value, serde_json::Error> {
    match serde_json::from_str(text) {
        Ok(value) => Ok(value),
        Err(err) => match (text.find('{'), text.rfind('}')) {
            (Some(first), Some(last)) if last > first => serde_json::from_str(&text[first..=last]),
            _ => Err(err),
        },
    }
}

fn parse_model_json(text: &str) -> Result<Value, ModelOutputError> {
    parse_json_document(strip_code_fence(text)).map_err(ModelOutputError::InvalidJson)
}

/// Rubric output must use the exact field names; no aliasing.
pub(crate) fn parse_rubric(text: &str) -> Result<Rubric, ModelOutputFailure> {
    let to_failure = |err: ModelOutputError| ModelOutputFailure::new(err, text);

    let value = parse_model_json(text).map_err(to_failure)?;
    let rubric: Rubric = serde_json::from_value(value)
        .map_err(|err| to_failure(ModelOutputError::RubricShape(err)))?;
    rubric.validate().map_err(|err| to_failure(err.into()))?;
    Ok(rubric)
}

pub(crate) fn parse_grading(text: &str) -> Result<GradeOutcome, ModelOutputFailure> {
    let to_failure = |err: ModelOutputError| ModelOutputFailure::new(err, text);

    let value = parse_model_json(text).map_err(to_failure)?;
    let parsed = value.as_object().ok_or_else(|| to_failure(not_an_object(&value)))?;
    normalize_grading(parsed).map_err(to_failure)
}

fn normalize_grading(parsed: &Map<String, Value>) -> Result<GradeOutcome, ModelOutputError> {
    let items = match parsed.get("criterion_results") {
        None | Some(Value::Null) => &[][..],
        Some(Value::Array(items)) => items.as_slice(),
        Some(other) => {
            return Err(ModelOutputError::InvalidField {
                field: "criterion_results",
                value: other.to_string(),
            })
        }
    };

    let results = items.iter().map(normalize_criterion).collect::<Result<Vec<_>, _>>()?;
    let overall_score = coerce_number("overall_score", parsed.get("overall_score"))?;
    let overall_comment = coerce_text(parsed.get("overall_comment"));

    Ok(GradeOutcome { results, overall_score, overall_comment })
}

fn normalize_criterion(item: &Value) -> Result<GradeCriterionResult, ModelOutputError> {
    let fields = item.as_object().ok_or_else(|| ModelOutputError::InvalidField {
        field: "criterion_results",
        value: item.to_string(),
    })?;

    Ok(GradeCriterionResult {
        criterion_id: lookup_alias(fields, "criterion_id", CRITERION_ID_ALIASES)?,
        level_label: lookup_alias(fields, "level_label", LEVEL_LABEL_ALIASES)?,
        score: coerce_number("score", fields.get("score"))?,
        explanation: lookup_alias(fields, "explanation", EXPLANATION_ALIASES)?,
    })
}

fn lookup_alias(
    fields: &Map<String, Value>,
    field: &'static str,
    aliases: &[&str],
) -> Result<String, ModelOutputError> {
    for alias in aliases {
        match fields.get(*alias) {
            Some(Value::String(text)) if !text.is_empty() => return Ok(text.clone()),
            None | Some(Value::Null) | Some(Value::String(_)) => continue,
            Some(other) => {
                return Err(ModelOutputError::InvalidField { field, value: other.to_string() })
            }
        }
    }
    Ok(String::new())
}

/// Numbers and numeric strings; missing or null is zero.
fn coerce_number(field: &'static str, value: Option<&Value>) -> Result<f64, ModelOutputError> {
    let invalid = |value: &Value| ModelOutputError::InvalidField { field, value: value.to_string() };

    match value {
        None | Some(Value::Null) => Ok(0.0),
        Some(value @ Value::Number(number)) => number.as_f64().ok_or_else(|| invalid(value)),
        Some(Value::Bool(flag)) => Ok(if *flag { 1.0 } else { 0.0 }),
        Some(value @ Value::String(text)) => text.trim().parse::<f64>().map_err(|_| invalid(value)),
        Some(other) => Err(invalid(other)),
    }
}

fn coerce_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    }
}

fn not_an_object(value: &Value) -> ModelOutputError {
    let kind = match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    };
    ModelOutputError::NotAnObject(kind)
}

fn diagnostic_snippet(output: &str) -> String {
    output.chars().take(DIAGNOSTIC_SNIPPET_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn response_with_content(content: Value) -> Value {
        json!({"choices": [{"index": 0, "message": {"role": "assistant", "content": content}}]})
    }

    #[test]
    fn plain_string_content_is_used_directly() {
        let response = response_with_content(json!("X"));
        assert_eq!(extract_response_text(&response).unwrap(), "X");
    }

    #[test]
    fn part_list_concatenates_recognized_parts_only() {
        let response = response_with_content(json!([
            {"text": "A"},
            {"type": "output_text", "text": "B"},
            {"type": "unknown"}
        ]));
        assert_eq!(extract_response_text(&response).unwrap(), "AB");
    }

    #[test]
    fn part_list_accepts_bare_strings_and_drops_non_text_values() {
        let response =
            response_with_content(json!(["  {", {"type": "text", "text": "}"}, 42, {"text": 7}]));
        assert_eq!(extract_response_text(&response).unwrap(), "{}");
    }

    #[test]
    fn empty_part_list_is_an_error_not_an_empty_success() {
        let response = response_with_content(json!([]));
        let failure = extract_response_text(&response).unwrap_err();
        assert!(matches!(failure.source, ModelOutputError::NoContent));
        assert!(failure.snippet.contains("\"content\":[]"));
    }

    #[test]
    fn null_or_whitespace_content_is_an_error() {
        for content in [Value::Null, json!("   \n"), json!({"text": "nested"})] {
            let failure = extract_response_text(&response_with_content(content)).unwrap_err();
            assert!(matches!(failure.source, ModelOutputError::NoContent));
        }
    }

    #[test]
    fn missing_or_empty_choices_is_an_error() {
        for response in [json!({}), json!({"choices": []}), json!({"choices": null})] {
            let failure = extract_response_text(&response).unwrap_err();
            assert!(matches!(failure.source, ModelOutputError::MissingChoices));
        }
    }

    #[test]
    fn no_content_snippet_is_truncated() {
        let long = "x".repeat(2_000);
        let response = json!({"choices": [{"message": {"content": null}, "pad": long}]});
        let failure = extract_response_text(&response).unwrap_err();
        assert_eq!(failure.snippet.chars().count(), DIAGNOSTIC_SNIPPET_CHARS);
    }

    #[test]
    fn json_fallback_uses_first_and_last_brace() {
        let parsed = parse_json_document("Here is the result: {\"a\":1} done").unwrap();
        assert_eq!(parsed, json!({"a": 1}));
    }

    #[test]
    fn json_fallback_without_braces_returns_original_error() {
        let err = parse_json_document("no json here").unwrap_err();
        assert!(err.is_syntax());
    }

    #[test]
    fn fenced_json_is_unwrapped() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```JSON\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(parse_model_json("```json\n{\"a\":1}\n```").unwrap(), json!({"a": 1}));
    }

    #[test]
    fn grading_item_aliases_are_coerced() {
        let text = r#"{"criterion_results": [{"id": "c1", "comment": "ok", "score": "7"}]}"#;
        let outcome = parse_grading(text).unwrap();

        assert_eq!(
            outcome.results,
            vec![GradeCriterionResult {
                criterion_id: "c1".to_string(),
                level_label: String::new(),
                score: 7.0,
                explanation: "ok".to_string(),
            }]
        );
        assert_eq!(outcome.overall_score, 0.0);
        assert_eq!(outcome.overall_comment, "");
    }

    #[test]
    fn canonical_names_win_over_aliases_unless_empty() {
        let text = r#"{
            "criterion_results": [
                {"criterion_id": "c1", "id": "ignored", "explanation": "why", "comment": "ignored"},
                {"criterion_id": "", "id": "c2", "explanation": "", "comment": "fallback"}
            ],
            "overall_score": 8.5,
            "overall_comment": "Solid work."
        }"#;
        let outcome = parse_grading(text).unwrap();

        assert_eq!(outcome.results[0].criterion_id, "c1");
        assert_eq!(outcome.results[0].explanation, "why");
        assert_eq!(outcome.results[1].criterion_id, "c2");
        assert_eq!(outcome.results[1].explanation, "fallback");
        assert_eq!(outcome.overall_score, 8.5);
        assert_eq!(outcome.overall_comment, "Solid work.");
    }

    #[test]
    fn grading_accepts_prose_wrapped_output() {
        let text = "Sure! Here is the grade:\n{\"criterion_results\": [], \"overall_score\": \"6.5\", \"overall_comment\": 3}\nThanks.";
        let outcome = parse_grading(text).unwrap();
        assert!(outcome.results.is_empty());
        assert_eq!(outcome.overall_score, 6.5);
        assert_eq!(outcome.overall_comment, "3");
    }

    #[test]
    fn non_numeric_score_fails_whole_result() {
        let text = r#"{"criterion_results": [{"criterion_id": "c1", "score": "high"}]}"#;
        let failure = parse_grading(text).unwrap_err();
        assert!(matches!(failure.source, ModelOutputError::InvalidField { field: "score", .. }));
    }

    #[test]
    fn garbage_text_is_an_error_with_snippet() {
        let failure = parse_grading("I cannot grade this submission.").unwrap_err();
        assert!(matches!(failure.source, ModelOutputError::InvalidJson(_)));
        assert_eq!(failure.snippet, "I cannot grade this submission.");
        assert!(failure.to_string().contains("Model output: I cannot grade"));
    }

    #[test]
    fn grading_requires_an_object() {
        let failure = parse_grading("[1, 2]").unwrap_err();
        assert!(matches!(failure.source, ModelOutputError::NotAnObject("an array")));
    }

    #[test]
    fn rubric_parses_exact_field_names() {
        let text = r#"```json
{
  "title": "Essay rubric",
  "criteria": [
    {"id": "clarity", "name": "Clarity", "description": "Clear prose", "weight": 0.6,
     "levels": [{"label": "Excellent", "descriptor": "Always clear"}]},
    {"id": "evidence", "name": "Evidence", "description": "Cites sources", "weight": 0.4,
     "levels": []}
  ],
  "overall_notes": "Be kind."
}
```"#;
        let rubric = parse_rubric(text).unwrap();
        assert_eq!(rubric.title, "Essay rubric");
        assert_eq!(rubric.criteria.len(), 2);
        assert_eq!(rubric.criteria[0].levels[0].label, "Excellent");
        assert_eq!(rubric.overall_notes.as_deref(), Some("Be kind."));
    }

    #[test]
    fn rubric_does_not_accept_aliases() {
        let text = r#"{"title": "t", "criteria": [
            {"criterion_id": "c1", "name": "n", "description": "d", "weight": 1.0, "levels": []}
        ]}"#;
        let failure = parse_rubric(text).unwrap_err();
        assert!(matches!(failure.source, ModelOutputError::RubricShape(_)));
    }

    #[test]
    fn rubric_weight_outside_unit_range_fails_validation() {
        let text = r#"{"title": "t", "criteria": [
            {"id": "c1", "name": "n", "description": "d", "weight": 1.5, "levels": []}
        ], "overall_notes": null}"#;
        let failure = parse_rubric(text).unwrap_err();
        assert!(matches!(failure.source, ModelOutputError::RubricValidation(_)));
    }

    #[test]
    fn snippet_respects_char_boundaries() {
        let text = "é".repeat(600);
        assert_eq!(diagnostic_snippet(&text).chars().count(), DIAGNOSTIC_SNIPPET_CHARS);
    }
}

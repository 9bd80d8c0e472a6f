use crate::schemas::grading::GradeSubmissionRequest;
use crate::schemas::rubric::Exemplar;
use crate::services::nim_client::ChatMessage;

const RUBRIC_SYSTEM_PROMPT: &str = "You are an expert instructor and assessment designer. \
Given an assignment objective and graded exemplars, design a clear, analytic grading rubric.

The rubric MUST:
- Be analytic (separate criteria like clarity, correctness, structure, citations, etc.).
- Provide 3-5 performance levels with descriptive labels.
- Assign each criterion a weight between 0 and 1. Weights must sum to 1.
Return ONLY a JSON object with fields: title, criteria (array), overall_notes.
Each criterion must have: id, name, description, weight, levels (array of {label, descriptor}).";

const GRADING_SYSTEM_PROMPT: &str = r#"You are a fair, consistent grader. You must strictly apply the provided analytic rubric to the student submission.

Your job:
- Read the assignment objective.
- Read the rubric.
- Read the student submission.
- For EACH criterion in the rubric, assign exactly one performance level and a numeric score.
- Provide a short explanation grounded in quotes or paraphrases from the submission.

Return ONLY a JSON object with fields:
{
  "criterion_results": [
    {
      "criterion_id": "string",  // must match rubric.id
      "level_label": "string",   // one of the rubric's level labels
      "score": number,             // 0-10, where 10 is best
      "explanation": "string"
    }, ...
  ],
  "overall_score": number,         // weighted average 0-10 using rubric weights
  "overall_comment": "string"     // 2-4 sentence summary
}
Score each criterion on a 0-10 scale where 10 is best, then compute overall_score as the weighted average of criterion scores using the rubric weights."#;

const EXEMPLAR_SEPARATOR: &str = "------";

pub(crate) fn build_rubric_prompt(objective: &str, exemplars: &[Exemplar]) -> Vec<ChatMessage> {
    let user = format!(
        "Assignment objective:\n{objective}\n\n{}\n\nReturn the rubric JSON now.",
        render_exemplar_block(exemplars)
    );

    vec![ChatMessage::system(RUBRIC_SYSTEM_PROMPT), ChatMessage::user(user)]
}

pub(crate) fn build_grading_prompt(
    request: &GradeSubmissionRequest,
) -> Result<Vec<ChatMessage>, serde_json::Error> {
    let rubric_json = serde_json::to_string_pretty(&request.rubric)?;

    let user = format!(
        "Assignment objective:\n{}\n\nRubric (JSON):\n{}\n\nStudent submission:\n{}\n\nReturn ONLY the JSON grading result.",
        request.objective, rubric_json, request.submission_text
    );

    Ok(vec![ChatMessage::system(GRADING_SYSTEM_PROMPT), ChatMessage::user(user)])
}

fn render_exemplar_block(exemplars: &[Exemplar]) -> String {
    if exemplars.is_empty() {
        return String::new();
    }

    let sections = exemplars
        .iter()
        .enumerate()
        .map(|(idx, exemplar)| {
            format!(
                "Exemplar {}:\nGrade: {}\nComments: {}\nText:\n{}\n{EXEMPLAR_SEPARATOR}",
                idx + 1,
                or_not_available(exemplar.grade.as_deref()),
                or_not_available(exemplar.comments.as_deref()),
                exemplar.text
            )
        })
        .collect::<Vec<_>>();

    format!("\n\nHere are some graded exemplars:\n{}", sections.join("\n\n"))
}

fn or_not_available(value: Option<&str>) -> &str {
    value.filter(|value| !value.is_empty()).unwrap_or("N/A")
}

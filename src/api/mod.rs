pub(crate) mod documents;
pub(crate) mod errors;
pub(crate) mod grading;
pub(crate) mod handlers;
pub(crate) mod router;
pub(crate) mod rubric;
pub(crate) mod validation;


/// Raw model text goes to the log before parsing so failures can be replayed offline.
pub(crate) fn log_model_text(label: &str, text: &str) {
    tracing::info!("=== RAW LLM {label} TEXT START ===");
    tracing::info!("{text}");
    tracing::info!("=== RAW LLM {label} TEXT END ===");
}

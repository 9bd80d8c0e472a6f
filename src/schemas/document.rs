use serde::Serialize;

#[derive(Debug, Serialize)]
pub(crate) struct ParsedDocumentResponse {
    pub(crate) text: String,
}

use axum::{extract::Multipart, Json};

use crate::api::errors::ApiError;
use crate::api::validation::validate_document_upload;
use crate::schemas::document::ParsedDocumentResponse;
use crate::services::documents;

const FILE_FIELD: &str = "file";

pub(crate) async fn parse_document(
    mut multipart: Multipart,
) -> Result<Json<ParsedDocumentResponse>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::BadRequest(format!("Invalid multipart data: {}", err.body_text())))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        // Reject by extension before the body is read.
        let filename = field.file_name().map(ToString::to_string);
        let kind = validate_document_upload(filename.as_deref())?;

        let data = field.bytes().await.map_err(|err| {
            ApiError::BadRequest(format!("Failed to read uploaded file: {}", err.body_text()))
        })?;

        tracing::info!(
            filename = filename.as_deref().unwrap_or_default(),
            kind = kind.as_str(),
            bytes = data.len(),
            "Extracting document text"
        );

        let text = tokio::task::spawn_blocking(move || documents::extract_text(kind, &data))
            .await
            .map_err(|err| {
                tracing::error!(error = %err, kind = kind.as_str(), "Document extraction aborted");
                ApiError::BadRequest(format!("Failed to extract text from {} file", kind.as_str()))
            })?
            .map_err(|err| {
                tracing::warn!(error = %err, kind = kind.as_str(), "Document extraction failed");
                ApiError::BadRequest(err.to_string())
            })?;

        return Ok(Json(ParsedDocumentResponse { text }));
    }

    Err(ApiError::BadRequest(format!("Missing '{FILE_FIELD}' field in multipart upload")))
}

use validator::Validate;

use crate::api::errors::ApiError;
use crate::services::documents::DocumentKind;

pub(crate) fn validate_document_upload(filename: Option<&str>) -> Result<DocumentKind, ApiError> {
    let filename = filename
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Uploaded file must have a filename".to_string()))?;

    DocumentKind::from_filename(filename).map_err(|err| ApiError::BadRequest(err.to_string()))
}

pub(crate) fn validate_payload(payload: &impl Validate) -> Result<(), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))
}

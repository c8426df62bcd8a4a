use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use common::domain::DomainError;
use serde::Serialize;

/// Rejected submission, never worth retrying unchanged.
pub const ERR_INVALID_JSON: u16 = 1000;
/// The broker did not confirm the message; the vendor may retry.
pub const ERR_QUEUE_UNAVAILABLE: u16 = 2000;

/// Error body, field names kept in the wire format vendors already parse
#[derive(Debug, Clone, PartialEq, Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ErrResponse {
    pub code: u16,
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError(pub DomainError);

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        Self(err)
    }
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, u16) {
        match &self.0 {
            DomainError::InvalidSubmission(_) | DomainError::ValidationError(_) => {
                (StatusCode::BAD_REQUEST, ERR_INVALID_JSON)
            }
            DomainError::PublishError(_) => (StatusCode::SERVICE_UNAVAILABLE, ERR_QUEUE_UNAVAILABLE),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, ERR_QUEUE_UNAVAILABLE),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let body = ErrResponse {
            code,
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

//! HTTP rendering of [`PrintMergeError`].

use axum::Json;
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::error::PrintMergeError;
use crate::intake::UploadLimits;

/// JSON body of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IntoResponse for PrintMergeError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let body = match &self {
            Self::NotFound { name } => {
                tracing::debug!(file = %name, "Download of unknown artifact");
                ErrorBody {
                    message: "File not found".to_string(),
                    error: None,
                }
            }
            e if e.is_client_error() => {
                tracing::warn!(code = e.error_code(), error = %e, "Request rejected");
                ErrorBody {
                    message: e.to_string(),
                    error: Some(e.error_code().to_string()),
                }
            }
            e => {
                tracing::error!(code = e.error_code(), error = %e, "Request failed");
                ErrorBody {
                    message: "Error processing your request".to_string(),
                    error: Some(e.to_string()),
                }
            }
        };

        (status, Json(body)).into_response()
    }
}

/// Translate a multipart parsing failure.
///
/// The body limit layer reports oversized bodies through the multipart
/// stream, so a 413 from it becomes `PayloadTooLarge`.
pub fn from_multipart(err: MultipartError, limits: &UploadLimits) -> PrintMergeError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        PrintMergeError::payload_too_large("request", limits.max_request_bytes)
    } else {
        PrintMergeError::bad_request(format!("Malformed multipart body: {}", err.body_text()))
    }
}

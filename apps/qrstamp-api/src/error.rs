//! Error types for the qrstamp API

use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use qrstamp_core::StampError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Failure while detecting markers (and stamping, for the combined endpoint)
    #[error("Error processing PDF: {0}")]
    Processing(StampError),

    /// Failure while stamping caller-supplied positions
    #[error("Error adding QR codes: {0}")]
    QrInsertion(StampError),

    #[error("No marker '{0}' found in the document")]
    MarkerNotFound(String),

    #[error("{0}")]
    InvalidForm(String),

    #[error("Invalid multipart body: {0}")]
    Multipart(#[from] MultipartError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    fn page_range(&self) -> Option<(usize, usize)> {
        match self {
            ApiError::Processing(StampError::PageOutOfRange { page, page_count })
            | ApiError::QrInsertion(StampError::PageOutOfRange { page, page_count }) => {
                Some((*page, *page_count))
            }
            _ => None,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            _ if self.page_range().is_some() => StatusCode::BAD_REQUEST,
            ApiError::Processing(_) | ApiError::QrInsertion(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::MarkerNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::InvalidForm(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Multipart(e) => e.status(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();
        if status.is_server_error() {
            tracing::error!("{}", message);
        }

        let body = match self.page_range() {
            Some((page, page_count)) => json!({
                "error": message,
                "status": status.as_u16(),
                "page": page,
                "page_count": page_count,
            }),
            None => json!({
                "error": message,
                "status": status.as_u16(),
            }),
        };

        (status, Json(body)).into_response()
    }
}

//! API handlers for the qrstamp server
//!
//! Every endpoint takes a multipart form with the PDF in the `file` field.
//! PDF work is CPU bound and runs on the blocking thread pool.

use axum::{
    extract::{Multipart, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use qrstamp_core::{
    find_marker_positions, load_document, locate_in_document, parse_positions, save_document,
    DEFAULT_MARKER,
};
use tracing::{debug, info};

use crate::error::ApiError;
use crate::models::{FormFields, HealthResponse, MessageResponse, PositionsResponse, Upload};
use crate::AppState;

/// Default pattern accepted by `/detect-with-regex`
pub const DEFAULT_PATTERN: &str = r"\[\[SIGN[_\s]?HERE\]\]";

/// Run CPU-bound PDF work off the async runtime
async fn blocking<T, F>(work: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ApiError::Internal(format!("PDF task failed: {}", e)))?
}

fn pdf_response(upload: &Upload, pdf: Vec<u8>) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::CONTENT_DISPOSITION, upload.signed_disposition()),
        ],
        pdf,
    )
        .into_response()
}

/// Handler: GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "qrstamp-api",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Handler: POST /detect-sign-positions
pub async fn detect_sign_positions(multipart: Multipart) -> Result<Json<PositionsResponse>, ApiError> {
    let mut form = FormFields::read(multipart).await?;
    let upload = form.file()?;
    let marker = form.or_default("marker", DEFAULT_MARKER);

    info!(
        "Detecting {:?} in {} ({} bytes)",
        marker,
        upload.filename.as_deref().unwrap_or("<unnamed>"),
        upload.bytes.len()
    );

    let bytes = upload.bytes.clone();
    let positions = blocking(move || {
        find_marker_positions(&bytes, &marker).map_err(ApiError::Processing)
    })
    .await?;

    debug!("Found {} positions", positions.len());
    Ok(Json(PositionsResponse { positions }))
}

/// Handler: POST /add-qr-codes
pub async fn add_qr_codes(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let mut form = FormFields::read(multipart).await?;
    let upload = form.file()?;
    let positions_json = form.required("positions_json")?;
    let qr_data = form.required("qr_data")?;
    let certificate_id = form.optional("certificate_id");

    let bytes = upload.bytes.clone();
    let compositor = state.compositor.clone();
    let pdf = blocking(move || {
        let positions = parse_positions(&positions_json).map_err(ApiError::QrInsertion)?;
        info!("Stamping {} caller-supplied positions", positions.len());
        compositor
            .compose(&bytes, &positions, &qr_data, certificate_id.as_deref())
            .map_err(ApiError::QrInsertion)
    })
    .await?;

    Ok(pdf_response(&upload, pdf))
}

/// Handler: POST /detect-and-add-qr
pub async fn detect_and_add_qr(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let mut form = FormFields::read(multipart).await?;
    let upload = form.file()?;
    let marker = form.or_default("marker", DEFAULT_MARKER);
    let qr_data = form.required("qr_data")?;
    let certificate_id = form.optional("certificate_id");

    let bytes = upload.bytes.clone();
    let compositor = state.compositor.clone();
    let pdf = blocking(move || {
        let mut doc = load_document(&bytes).map_err(ApiError::Processing)?;
        let positions = locate_in_document(&doc, &marker).map_err(ApiError::Processing)?;
        if positions.is_empty() {
            return Err(ApiError::MarkerNotFound(marker));
        }
        info!("Stamping {} occurrences of {:?}", positions.len(), marker);

        compositor
            .compose_document(&mut doc, &positions, &qr_data, certificate_id.as_deref())
            .and_then(|_| save_document(&mut doc))
            .map_err(ApiError::Processing)
    })
    .await?;

    Ok(pdf_response(&upload, pdf))
}

/// Handler: POST /detect-with-regex
///
/// Accepts the form but pattern-based detection is not available.
pub async fn detect_with_regex(multipart: Multipart) -> Result<Json<MessageResponse>, ApiError> {
    let mut form = FormFields::read(multipart).await?;
    let pattern = form.or_default("pattern", DEFAULT_PATTERN);
    debug!("Regex detection requested with pattern {:?}", pattern);

    Ok(Json(MessageResponse {
        message: "Regex-based detection not implemented yet".to_string(),
    }))
}

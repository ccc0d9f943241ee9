//! Sign-marker detection and QR stamping for PDF documents
//!
//! This crate finds placeholder markers such as `[[SIGN_HERE]]` in the text
//! of a PDF and overlays a QR code (plus an optional certificate caption)
//! at each location, using lopdf.
//!
//! - `find_marker_positions`: locate every occurrence of a marker
//! - `add_qr_codes` / `Compositor::compose`: cover markers and stamp QR codes
//! - `parse_positions`: normalize caller-supplied position JSON

pub mod compositor;
pub mod error;
#[cfg(any(test, feature = "test-fixtures"))]
pub mod fixtures;
pub mod fonts;
pub mod geometry;
pub mod locator;
pub mod position;
pub mod qr;

pub use compositor::{add_qr_codes, save_document, Compositor, CompositorStyle, DEFAULT_LABEL};
pub use error::StampError;
pub use locator::{find_marker_positions, locate_in_document, DEFAULT_MARKER};
pub use position::{parse_positions, PositionRecord, SignPosition};
pub use qr::QrBitmap;

pub use lopdf;

/// Parse PDF bytes into a document
pub fn load_document(bytes: &[u8]) -> Result<lopdf::Document, StampError> {
    lopdf::Document::load_mem(bytes).map_err(|e| StampError::Parse(e.to_string()))
}

/// Parse PDF bytes and return page count
pub fn get_page_count(bytes: &[u8]) -> Result<usize, StampError> {
    Ok(load_document(bytes)?.get_pages().len())
}

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StampError {
    #[error("Failed to parse PDF: {0}")]
    Parse(String),

    #[error("Malformed positions payload: {0}")]
    MalformedInput(String),

    #[error("Page {page} out of range (document has {page_count} pages)")]
    PageOutOfRange { page: usize, page_count: usize },

    #[error("Render failed: {0}")]
    Render(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

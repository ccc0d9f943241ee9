//! Request forms and response bodies

use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::Multipart;
use qrstamp_core::SignPosition;
use serde::Serialize;

use crate::error::ApiError;

/// Name of the multipart field holding the uploaded PDF
pub const FILE_FIELD: &str = "file";

/// Filename used when the upload carries none
pub const FALLBACK_FILENAME: &str = "document.pdf";

/// An uploaded document
#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: Option<String>,
    pub bytes: Bytes,
}

impl Upload {
    /// `Content-Disposition` value for the stamped copy of this upload
    pub fn signed_disposition(&self) -> String {
        let original = self
            .filename
            .as_deref()
            .map(sanitize_filename)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| FALLBACK_FILENAME.to_string());
        format!("attachment; filename=\"signed_{}\"", original)
    }
}

/// Keep a filename safe for a quoted header parameter
fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '"' | '\\' | '/' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect::<String>()
        .trim()
        .to_string()
}

/// All fields of a multipart form, read into memory
#[derive(Debug, Default)]
pub struct FormFields {
    file: Option<Upload>,
    text: HashMap<String, String>,
}

impl FormFields {
    pub async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut fields = FormFields::default();
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            if name == FILE_FIELD {
                let filename = field.file_name().map(str::to_string);
                let bytes = field.bytes().await?;
                fields.file = Some(Upload { filename, bytes });
            } else {
                let value = field.text().await?;
                fields.text.insert(name, value);
            }
        }
        Ok(fields)
    }

    pub fn file(&mut self) -> Result<Upload, ApiError> {
        self.file
            .take()
            .ok_or_else(|| missing(FILE_FIELD))
    }

    /// A text field that must be present and non-empty
    pub fn required(&mut self, name: &str) -> Result<String, ApiError> {
        self.optional(name).ok_or_else(|| missing(name))
    }

    /// A text field, with an empty value treated as absent
    pub fn optional(&mut self, name: &str) -> Option<String> {
        self.text.remove(name).filter(|v| !v.is_empty())
    }

    /// A text field, falling back to `default` when absent or empty
    pub fn or_default(&mut self, name: &str, default: &str) -> String {
        self.optional(name)
            .unwrap_or_else(|| default.to_string())
    }
}

fn missing(name: &str) -> ApiError {
    ApiError::InvalidForm(format!("Missing required field: {}", name))
}

/// Response for `/detect-sign-positions`
#[derive(Debug, Serialize)]
pub struct PositionsResponse {
    pub positions: Vec<SignPosition>,
}

/// Response carrying only a message
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

//! Marker positions
//!
//! [`SignPosition`] is the one position shape used internally. Caller-supplied
//! JSON arrives as loosely-shaped [`PositionRecord`]s and is normalized once,
//! at the input boundary, by [`parse_positions`].

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::StampError;

/// Default box size for a located marker record with no explicit size
pub const DEFAULT_MARKER_SIZE: f64 = 100.0;

/// Default box size for a caller-supplied record with no explicit size
pub const DEFAULT_RECORD_SIZE: f64 = 120.0;

/// Default x/y for a caller-supplied record with no explicit coordinates
pub const DEFAULT_RECORD_COORD: f64 = 50.0;

fn default_marker_size() -> f64 {
    DEFAULT_MARKER_SIZE
}

/// A marker bounding box on a page.
///
/// Coordinates are in PDF points relative to the top-left corner of the
/// page's visible box, with y growing downwards.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignPosition {
    pub x: f64,
    pub y: f64,
    /// Zero-based page index
    pub page: usize,
    #[serde(default = "default_marker_size")]
    pub width: f64,
    #[serde(default = "default_marker_size")]
    pub height: f64,
}

impl SignPosition {
    pub fn new(x: f64, y: f64, page: usize, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            page,
            width,
            height,
        }
    }
}

/// A field that may be left out but, when present, must not be `null`
fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

/// A caller-supplied position with every field optional.
///
/// Missing fields take defaults; explicit `null` values are rejected.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PositionRecord {
    #[serde(default, deserialize_with = "present")]
    pub x: Option<f64>,
    #[serde(default, deserialize_with = "present")]
    pub y: Option<f64>,
    #[serde(default, deserialize_with = "present")]
    pub page: Option<usize>,
    #[serde(default, deserialize_with = "present")]
    pub width: Option<f64>,
    #[serde(default, deserialize_with = "present")]
    pub height: Option<f64>,
}

impl PositionRecord {
    pub fn into_position(self) -> SignPosition {
        SignPosition {
            x: self.x.unwrap_or(DEFAULT_RECORD_COORD),
            y: self.y.unwrap_or(DEFAULT_RECORD_COORD),
            page: self.page.unwrap_or(0),
            width: self.width.unwrap_or(DEFAULT_RECORD_SIZE),
            height: self.height.unwrap_or(DEFAULT_RECORD_SIZE),
        }
    }
}

impl From<PositionRecord> for SignPosition {
    fn from(record: PositionRecord) -> Self {
        record.into_position()
    }
}

/// Parse a JSON array of position records into canonical positions
pub fn parse_positions(json: &str) -> Result<Vec<SignPosition>, StampError> {
    let records: Vec<PositionRecord> =
        serde_json::from_str(json).map_err(|e| StampError::MalformedInput(e.to_string()))?;
    Ok(records
        .into_iter()
        .map(PositionRecord::into_position)
        .collect())
}

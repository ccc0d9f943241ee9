//! QR bitmap generation
//!
//! Encodes a payload at the highest error correction level and rasterizes it
//! into an 8-bit grayscale bitmap that can be embedded as a PDF image.

use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::{dictionary, Stream};
use qrcode::{Color, EcLevel, QrCode};

use crate::error::StampError;

/// Pixels per QR module
pub const MODULE_PIXELS: usize = 10;

/// Quiet zone around the symbol, in modules
pub const BORDER_MODULES: usize = 1;

const DARK: u8 = 0;
const LIGHT: u8 = 255;

/// A square grayscale raster, one byte per pixel, row-major from the top
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrBitmap {
    pub width: usize,
    pub pixels: Vec<u8>,
}

impl QrBitmap {
    /// Encode `data` with error correction level H. The symbol version is
    /// the smallest one that fits.
    pub fn generate(data: &str) -> Result<Self, StampError> {
        let code = QrCode::with_error_correction_level(data.as_bytes(), EcLevel::H)
            .map_err(|e| StampError::Render(format!("QR encoding failed: {e}")))?;

        let modules = code.width();
        let colors = code.to_colors();
        let side = modules + 2 * BORDER_MODULES;
        let width = side * MODULE_PIXELS;

        let mut pixels = vec![LIGHT; width * width];
        for (index, color) in colors.iter().enumerate() {
            if *color != Color::Dark {
                continue;
            }
            let col = index % modules + BORDER_MODULES;
            let row = index / modules + BORDER_MODULES;
            for py in row * MODULE_PIXELS..(row + 1) * MODULE_PIXELS {
                let start = py * width + col * MODULE_PIXELS;
                pixels[start..start + MODULE_PIXELS].fill(DARK);
            }
        }

        Ok(Self { width, pixels })
    }

    /// Whether the pixel at `(x, y)` is dark
    pub fn is_dark(&self, x: usize, y: usize) -> bool {
        self.pixels.get(y * self.width + x) == Some(&DARK)
    }

    /// Build a `/FlateDecode` DeviceGray image XObject holding this bitmap
    pub fn to_image_xobject(&self) -> Result<Stream, StampError> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(&self.pixels)
            .map_err(|e| StampError::Render(format!("image compression failed: {e}")))?;
        let compressed = encoder
            .finish()
            .map_err(|e| StampError::Render(format!("image compression failed: {e}")))?;

        let width = self.width as i64;
        Ok(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width,
                "Height" => width,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
                "Filter" => "FlateDecode",
            },
            compressed,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Read;

    #[test]
    fn test_bitmap_is_square_with_border() {
        let bitmap = QrBitmap::generate("https://example.com/verify/abc").unwrap();
        assert_eq!(bitmap.pixels.len(), bitmap.width * bitmap.width);
        assert_eq!(bitmap.width % MODULE_PIXELS, 0);
        // Version 1 is 21 modules; anything smaller is not a QR symbol
        assert!(bitmap.width >= (21 + 2 * BORDER_MODULES) * MODULE_PIXELS);

        // The border row and column stay light
        assert!((0..bitmap.width).all(|x| !bitmap.is_dark(x, 0)));
        assert!((0..bitmap.width).all(|y| !bitmap.is_dark(0, y)));
    }

    #[test]
    fn test_finder_pattern_corner_is_dark() {
        let bitmap = QrBitmap::generate("hello").unwrap();
        let first = BORDER_MODULES * MODULE_PIXELS;
        assert!(bitmap.is_dark(first, first));
        assert!(bitmap.is_dark(first + MODULE_PIXELS - 1, first + MODULE_PIXELS - 1));
    }

    #[test]
    fn test_pixels_are_binary() {
        let bitmap = QrBitmap::generate("binary").unwrap();
        assert!(bitmap.pixels.iter().all(|p| *p == DARK || *p == LIGHT));
    }

    #[test]
    fn test_generation_is_deterministic() {
        let a = QrBitmap::generate("same payload").unwrap();
        let b = QrBitmap::generate("same payload").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_longer_payload_grows_symbol() {
        let short = QrBitmap::generate("a").unwrap();
        let long = QrBitmap::generate(&"a".repeat(200)).unwrap();
        assert!(long.width > short.width);
    }

    #[test]
    fn test_oversized_payload_is_render_error() {
        let err = QrBitmap::generate(&"x".repeat(5000)).unwrap_err();
        assert!(matches!(err, StampError::Render(_)));
    }

    #[test]
    fn test_image_xobject_round_trips_pixels() {
        let bitmap = QrBitmap::generate("round trip").unwrap();
        let stream = bitmap.to_image_xobject().unwrap();

        assert_eq!(stream.dict.get(b"Subtype").unwrap().as_name().unwrap(), b"Image");
        assert_eq!(
            stream.dict.get(b"Width").unwrap().as_i64().unwrap(),
            bitmap.width as i64
        );
        assert_eq!(
            stream.dict.get(b"ColorSpace").unwrap().as_name().unwrap(),
            b"DeviceGray"
        );

        let mut decoded = Vec::new();
        flate2::read::ZlibDecoder::new(&stream.content[..])
            .read_to_end(&mut decoded)
            .unwrap();
        assert_eq!(decoded, bitmap.pixels);
    }
}

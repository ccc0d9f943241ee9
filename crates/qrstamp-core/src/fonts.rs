//! Font metrics and text decoding for the marker locator
//!
//! Only what is needed to place glyph boxes: advance widths, ascent and
//! descent, and a code-to-Unicode mapping. Widths and vertical metrics are in
//! glyph space (1/1000 of the font size).

use std::collections::HashMap;

use lopdf::{Dictionary, Document, Object};

use crate::geometry::{object_to_f64, resolve};

/// Helvetica advance widths for codes 32..=126
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // 32..47
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, // 0..9
    278, 278, 584, 584, 584, 556, 1015, // 58..64
    667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, // A..M
    722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, // N..Z
    278, 278, 278, 469, 556, 333, // 91..96
    556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, // a..m
    556, 556, 556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, // n..z
    334, 260, 334, 584, // 123..126
];

const HELVETICA_BOLD_WIDTHS: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278, // 32..47
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, // 0..9
    333, 333, 584, 584, 584, 611, 975, // 58..64
    722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, // A..M
    722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, // N..Z
    333, 278, 333, 584, 556, 333, // 91..96
    556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, // a..m
    611, 611, 611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, // n..z
    389, 280, 389, 584, // 123..126
];

const TIMES_ROMAN_WIDTHS: [u16; 95] = [
    250, 333, 408, 500, 500, 833, 778, 180, 333, 333, 500, 564, 250, 333, 250, 278, // 32..47
    500, 500, 500, 500, 500, 500, 500, 500, 500, 500, // 0..9
    278, 278, 564, 564, 564, 444, 921, // 58..64
    722, 667, 667, 722, 611, 556, 722, 722, 333, 389, 722, 611, 889, // A..M
    722, 722, 556, 722, 667, 556, 611, 722, 722, 944, 722, 722, 611, // N..Z
    333, 278, 333, 469, 500, 333, // 91..96
    444, 500, 444, 500, 444, 333, 500, 500, 278, 278, 500, 278, 778, // a..m
    500, 500, 500, 500, 333, 389, 278, 500, 500, 722, 500, 500, 444, // n..z
    480, 200, 480, 541, // 123..126
];

const TIMES_BOLD_WIDTHS: [u16; 95] = [
    250, 333, 555, 500, 500, 1000, 833, 278, 333, 333, 500, 570, 250, 333, 250, 278, // 32..47
    500, 500, 500, 500, 500, 500, 500, 500, 500, 500, // 0..9
    333, 333, 570, 570, 570, 500, 930, // 58..64
    722, 667, 722, 722, 667, 611, 778, 778, 389, 500, 778, 667, 944, // A..M
    722, 778, 611, 778, 722, 556, 667, 722, 722, 1000, 722, 722, 667, // N..Z
    333, 278, 333, 581, 500, 333, // 91..96
    500, 556, 444, 556, 444, 333, 500, 556, 278, 333, 556, 278, 833, // a..m
    556, 500, 556, 556, 444, 389, 333, 556, 500, 722, 500, 500, 444, // n..z
    394, 220, 394, 520, // 123..126
];

/// Standard font families, used when a font carries no metrics of its own.
/// Oblique and italic faces share the upright widths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    Helvetica,
    HelveticaBold,
    Courier,
    Times,
    TimesBold,
    Other,
}

impl Family {
    pub fn from_base_font(name: &[u8]) -> Self {
        let name = String::from_utf8_lossy(name).to_ascii_lowercase();
        let bold = name.contains("bold") || name.contains("black") || name.contains("heavy");
        if name.contains("courier") || name.contains("mono") {
            Family::Courier
        } else if name.contains("times") || (name.contains("serif") && !name.contains("sans")) {
            if bold {
                Family::TimesBold
            } else {
                Family::Times
            }
        } else if name.contains("helvetica") || name.contains("arial") || name.contains("sans") {
            if bold {
                Family::HelveticaBold
            } else {
                Family::Helvetica
            }
        } else {
            Family::Other
        }
    }

    fn width(&self, code: u32) -> f64 {
        let table = match self {
            Family::Courier => return 600.0,
            Family::HelveticaBold => &HELVETICA_BOLD_WIDTHS,
            Family::Times => &TIMES_ROMAN_WIDTHS,
            Family::TimesBold => &TIMES_BOLD_WIDTHS,
            Family::Helvetica | Family::Other => &HELVETICA_WIDTHS,
        };
        match code {
            32..=126 => table[(code - 32) as usize] as f64,
            _ => 556.0,
        }
    }

    fn ascent_descent(&self) -> (f64, f64) {
        match self {
            Family::Helvetica | Family::HelveticaBold => (718.0, -207.0),
            Family::Courier => (629.0, -157.0),
            Family::Times | Family::TimesBold => (683.0, -217.0),
            Family::Other => (750.0, -250.0),
        }
    }
}

#[derive(Debug, Clone)]
enum Widths {
    Simple { first_char: u32, widths: Vec<f64> },
    Cid { default: f64, map: HashMap<u32, f64> },
    Builtin,
}

/// Metrics and decoding tables for one font resource
#[derive(Debug, Clone)]
pub struct FontInfo {
    family: Family,
    widths: Widths,
    missing_width: Option<f64>,
    pub ascent: f64,
    pub descent: f64,
    two_byte: bool,
    to_unicode: Option<HashMap<u32, String>>,
}

impl Default for FontInfo {
    /// Helvetica metrics, used when `Tf` names a font that cannot be resolved
    fn default() -> Self {
        let (ascent, descent) = Family::Helvetica.ascent_descent();
        Self {
            family: Family::Helvetica,
            widths: Widths::Builtin,
            missing_width: None,
            ascent,
            descent,
            two_byte: false,
            to_unicode: None,
        }
    }
}

impl FontInfo {
    pub fn from_dict(doc: &Document, dict: &Dictionary) -> Self {
        let subtype = name_of(doc, dict, b"Subtype").unwrap_or_default();
        let base_font = name_of(doc, dict, b"BaseFont").unwrap_or_default();
        let family = Family::from_base_font(&base_font);
        let to_unicode = dict
            .get(b"ToUnicode")
            .ok()
            .and_then(|obj| resolve(doc, obj).as_stream().ok())
            .and_then(|stream| {
                stream
                    .decompressed_content()
                    .ok()
                    .or_else(|| Some(stream.content.clone()))
            })
            .map(|bytes| parse_to_unicode(&bytes))
            .filter(|map| !map.is_empty());

        if subtype == b"Type0" {
            let descendant = dict
                .get(b"DescendantFonts")
                .ok()
                .and_then(|obj| resolve(doc, obj).as_array().ok())
                .and_then(|arr| arr.first())
                .and_then(|obj| resolve(doc, obj).as_dict().ok());

            let (widths, descriptor) = match descendant {
                Some(cid_font) => (cid_widths(doc, cid_font), descriptor_of(doc, cid_font)),
                None => (
                    Widths::Cid {
                        default: 1000.0,
                        map: HashMap::new(),
                    },
                    None,
                ),
            };
            let (ascent, descent) = vertical_metrics(doc, descriptor, family);
            return Self {
                family,
                widths,
                missing_width: None,
                ascent,
                descent,
                two_byte: true,
                to_unicode,
            };
        }

        let descriptor = descriptor_of(doc, dict);
        let widths = simple_widths(doc, dict).unwrap_or(Widths::Builtin);
        let missing_width = descriptor
            .and_then(|d| d.get(b"MissingWidth").ok())
            .and_then(|obj| object_to_f64(resolve(doc, obj)));
        let (ascent, descent) = vertical_metrics(doc, descriptor, family);

        Self {
            family,
            widths,
            missing_width,
            ascent,
            descent,
            two_byte: false,
            to_unicode,
        }
    }

    /// Advance width of a character code in glyph space units
    pub fn width(&self, code: u32) -> f64 {
        match &self.widths {
            Widths::Simple { first_char, widths } => code
                .checked_sub(*first_char)
                .and_then(|i| widths.get(i as usize).copied())
                .or(self.missing_width)
                .unwrap_or_else(|| self.family.width(code)),
            Widths::Cid { default, map } => map.get(&code).copied().unwrap_or(*default),
            Widths::Builtin => self.family.width(code),
        }
    }

    /// True if the font reads one byte per code (word spacing applies to code 32)
    pub fn is_single_byte(&self) -> bool {
        !self.two_byte
    }

    /// Split a shown string into character codes and their Unicode text
    pub fn decode(&self, bytes: &[u8]) -> Vec<(u32, String)> {
        let codes: Vec<u32> = if self.two_byte {
            bytes
                .chunks(2)
                .map(|chunk| chunk.iter().fold(0u32, |acc, b| (acc << 8) | *b as u32))
                .collect()
        } else {
            bytes.iter().map(|b| *b as u32).collect()
        };

        codes
            .into_iter()
            .map(|code| {
                let text = self
                    .to_unicode
                    .as_ref()
                    .and_then(|map| map.get(&code).cloned())
                    .unwrap_or_else(|| {
                        if self.two_byte {
                            char::REPLACEMENT_CHARACTER.to_string()
                        } else {
                            char::from(code as u8).to_string()
                        }
                    });
                (code, text)
            })
            .collect()
    }
}

fn name_of(doc: &Document, dict: &Dictionary, key: &[u8]) -> Option<Vec<u8>> {
    dict.get(key)
        .ok()
        .and_then(|obj| resolve(doc, obj).as_name().ok())
        .map(|n| n.to_vec())
}

fn descriptor_of<'a>(doc: &'a Document, dict: &'a Dictionary) -> Option<&'a Dictionary> {
    dict.get(b"FontDescriptor")
        .ok()
        .and_then(|obj| resolve(doc, obj).as_dict().ok())
}

fn vertical_metrics(doc: &Document, descriptor: Option<&Dictionary>, family: Family) -> (f64, f64) {
    let (default_ascent, default_descent) = family.ascent_descent();
    let Some(descriptor) = descriptor else {
        return (default_ascent, default_descent);
    };
    let read = |key: &[u8]| {
        descriptor
            .get(key)
            .ok()
            .and_then(|obj| object_to_f64(resolve(doc, obj)))
    };
    let ascent = read(b"Ascent").filter(|a| *a > 0.0).unwrap_or(default_ascent);
    let descent = read(b"Descent")
        .filter(|d| *d < 0.0)
        .unwrap_or(default_descent);
    (ascent, descent)
}

fn simple_widths(doc: &Document, dict: &Dictionary) -> Option<Widths> {
    let first_char = dict
        .get(b"FirstChar")
        .ok()
        .and_then(|obj| object_to_f64(resolve(doc, obj)))?;
    let widths = dict
        .get(b"Widths")
        .ok()
        .and_then(|obj| resolve(doc, obj).as_array().ok())?
        .iter()
        .map(|obj| object_to_f64(resolve(doc, obj)).unwrap_or(0.0))
        .collect();
    Some(Widths::Simple {
        first_char: first_char.max(0.0) as u32,
        widths,
    })
}

fn cid_widths(doc: &Document, cid_font: &Dictionary) -> Widths {
    let default = cid_font
        .get(b"DW")
        .ok()
        .and_then(|obj| object_to_f64(resolve(doc, obj)))
        .unwrap_or(1000.0);
    let mut map = HashMap::new();

    let entries = cid_font
        .get(b"W")
        .ok()
        .and_then(|obj| resolve(doc, obj).as_array().ok());
    if let Some(entries) = entries {
        let mut i = 0;
        while i < entries.len() {
            let Some(first) = object_to_f64(resolve(doc, &entries[i])) else {
                break;
            };
            let first = first as u32;
            match entries.get(i + 1).map(|obj| resolve(doc, obj)) {
                // c [w1 w2 ...]
                Some(Object::Array(list)) => {
                    for (offset, w) in list.iter().enumerate() {
                        if let Some(w) = object_to_f64(resolve(doc, w)) {
                            map.insert(first + offset as u32, w);
                        }
                    }
                    i += 2;
                }
                // c_first c_last w
                Some(last) => {
                    let last = object_to_f64(last).unwrap_or(first as f64) as u32;
                    let w = entries
                        .get(i + 2)
                        .and_then(|obj| object_to_f64(resolve(doc, obj)))
                        .unwrap_or(default);
                    for code in first..=last.min(first.saturating_add(0xFFFF)) {
                        map.insert(code, w);
                    }
                    i += 3;
                }
                None => break,
            }
        }
    }

    Widths::Cid { default, map }
}

#[derive(Debug, PartialEq)]
enum Token {
    Hex(Vec<u8>),
    ArrayStart,
    ArrayEnd,
    Word(String),
}

fn tokenize(data: &[u8]) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < data.len() {
        match data[i] {
            b'<' if data.get(i + 1) == Some(&b'<') => i += 2,
            b'>' if data.get(i + 1) == Some(&b'>') => i += 2,
            b'<' => {
                let end = data[i + 1..]
                    .iter()
                    .position(|b| *b == b'>')
                    .map(|p| i + 1 + p)
                    .unwrap_or(data.len());
                let digits: Vec<u8> = data[i + 1..end]
                    .iter()
                    .copied()
                    .filter(|b| b.is_ascii_hexdigit())
                    .collect();
                tokens.push(Token::Hex(hex_to_bytes(&digits)));
                i = end + 1;
            }
            b'[' => {
                tokens.push(Token::ArrayStart);
                i += 1;
            }
            b']' => {
                tokens.push(Token::ArrayEnd);
                i += 1;
            }
            b'%' => {
                while i < data.len() && data[i] != b'\n' && data[i] != b'\r' {
                    i += 1;
                }
            }
            b if b.is_ascii_whitespace() => i += 1,
            _ => {
                let start = i;
                while i < data.len()
                    && !data[i].is_ascii_whitespace()
                    && !matches!(data[i], b'<' | b'>' | b'[' | b']' | b'%')
                {
                    i += 1;
                }
                tokens.push(Token::Word(
                    String::from_utf8_lossy(&data[start..i]).into_owned(),
                ));
            }
        }
    }
    tokens
}

fn hex_to_bytes(digits: &[u8]) -> Vec<u8> {
    let nibble = |b: u8| (b as char).to_digit(16).unwrap_or(0) as u8;
    digits
        .chunks(2)
        .map(|pair| match pair {
            [hi, lo] => (nibble(*hi) << 4) | nibble(*lo),
            [hi] => nibble(*hi) << 4,
            _ => 0,
        })
        .collect()
}

fn code_of(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |acc, b| (acc << 8) | *b as u32)
}

fn utf16_text(bytes: &[u8]) -> String {
    if bytes.len() == 1 {
        return char::from(bytes[0]).to_string();
    }
    let units: Vec<u16> = bytes
        .chunks(2)
        .map(|c| u16::from_be_bytes([c[0], *c.get(1).unwrap_or(&0)]))
        .collect();
    String::from_utf16_lossy(&units)
}

fn offset_text(bytes: &[u8], offset: u32) -> String {
    let mut bytes = bytes.to_vec();
    let len = bytes.len();
    if len >= 2 {
        let last = u16::from_be_bytes([bytes[len - 2], bytes[len - 1]]).wrapping_add(offset as u16);
        bytes[len - 2..].copy_from_slice(&last.to_be_bytes());
    } else if len == 1 {
        bytes[0] = bytes[0].wrapping_add(offset as u8);
    }
    utf16_text(&bytes)
}

/// Parse the `bfchar` and `bfrange` sections of a ToUnicode CMap
pub fn parse_to_unicode(data: &[u8]) -> HashMap<u32, String> {
    const MAX_RANGE: u32 = 0xFFFF;

    let tokens = tokenize(data);
    let mut map = HashMap::new();
    let mut i = 0;

    while i < tokens.len() {
        match &tokens[i] {
            Token::Word(w) if w == "beginbfchar" => {
                i += 1;
                while let (Some(Token::Hex(src)), Some(Token::Hex(dst))) =
                    (tokens.get(i), tokens.get(i + 1))
                {
                    map.insert(code_of(src), utf16_text(dst));
                    i += 2;
                }
            }
            Token::Word(w) if w == "beginbfrange" => {
                i += 1;
                while let (Some(Token::Hex(lo)), Some(Token::Hex(hi))) =
                    (tokens.get(i), tokens.get(i + 1))
                {
                    let (lo, hi) = (code_of(lo), code_of(hi));
                    let hi = hi.min(lo.saturating_add(MAX_RANGE));
                    match tokens.get(i + 2) {
                        Some(Token::Hex(dst)) => {
                            for code in lo..=hi {
                                map.insert(code, offset_text(dst, code - lo));
                            }
                            i += 3;
                        }
                        Some(Token::ArrayStart) => {
                            let mut j = i + 3;
                            let mut code = lo;
                            while let Some(Token::Hex(dst)) = tokens.get(j) {
                                if code <= hi {
                                    map.insert(code, utf16_text(dst));
                                }
                                code = code.saturating_add(1);
                                j += 1;
                            }
                            if tokens.get(j) == Some(&Token::ArrayEnd) {
                                j += 1;
                            }
                            i = j;
                        }
                        _ => break,
                    }
                }
            }
            _ => i += 1,
        }
    }

    map
}

//! Marker Locator
//!
//! Finds every exact occurrence of a marker string in the text of a PDF and
//! reports its bounding box per page.
//!
//! Each page's content stream is interpreted with lopdf, tracking the
//! graphics and text state to place a box around every shown glyph. The
//! interpreter starts from the page's display transform, so boxes come out
//! in top-left page space as the page is shown, rotation included. Glyphs
//! are then grouped into lines by baseline and the marker is matched against
//! each line's text. Matches never span lines.
//!
//! Glyphs that are fully covered by an opaque rectangle painted later in the
//! stream are invisible on the rendered page and are left out of matching, so
//! a marker erased by the compositor is no longer found.

use std::collections::HashMap;
use std::rc::Rc;

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId};
use tracing::{debug, warn};

use crate::error::StampError;
use crate::fonts::FontInfo;
use crate::geometry::{object_to_f64, resolve, resolve_inherited, Matrix, PageBox, Rect};
use crate::position::SignPosition;

/// Default marker searched for when the caller supplies none
pub const DEFAULT_MARKER: &str = "[[SIGN_HERE]]";

/// Maximum nesting of form XObjects followed by `Do`
const MAX_FORM_DEPTH: usize = 8;

/// Slack allowed when deciding whether a fill covers a glyph
const COVER_TOLERANCE: f64 = 0.01;

/// Find all occurrences of `marker` in a PDF given as raw bytes
pub fn find_marker_positions(pdf: &[u8], marker: &str) -> Result<Vec<SignPosition>, StampError> {
    let doc = crate::load_document(pdf)?;
    locate_in_document(&doc, marker)
}

/// Find all occurrences of `marker` in an already parsed document
pub fn locate_in_document(doc: &Document, marker: &str) -> Result<Vec<SignPosition>, StampError> {
    let mut positions = Vec::new();
    if marker.is_empty() {
        return Ok(positions);
    }

    for (index, (_, page_id)) in doc.get_pages().into_iter().enumerate() {
        let page_box = PageBox::for_page(doc, page_id)?;
        let lines = group_lines(visible_glyphs(doc, page_id, &page_box));

        let before = positions.len();
        for line in &lines {
            for rect in line.find(marker) {
                positions.push(SignPosition::new(
                    rect.x0,
                    rect.y0,
                    index,
                    rect.width(),
                    rect.height(),
                ));
            }
        }
        debug!(
            "Page {}: {} lines, {} matches for {:?}",
            index,
            lines.len(),
            positions.len() - before,
            marker
        );
    }

    Ok(positions)
}

/// Text of each line on a page, in reading order. Hidden glyphs are skipped.
pub fn page_lines(doc: &Document, page_id: ObjectId) -> Vec<String> {
    let page_box = PageBox::for_page(doc, page_id).unwrap_or(PageBox::LETTER);
    group_lines(visible_glyphs(doc, page_id, &page_box))
        .into_iter()
        .map(|line| line.text)
        .collect()
}

/// One shown glyph in display space
#[derive(Debug, Clone)]
struct Glyph {
    text: String,
    bbox: Rect,
    origin: (f64, f64),
    end: (f64, f64),
    size: f64,
    order: usize,
}

fn visible_glyphs(doc: &Document, page_id: ObjectId, page_box: &PageBox) -> Vec<Glyph> {
    let content = match doc.get_page_content(page_id) {
        Ok(content) => content,
        Err(e) => {
            warn!("Skipping page {:?}: cannot read content ({})", page_id, e);
            return Vec::new();
        }
    };
    let resources = resolve_inherited(doc, page_id, b"Resources")
        .ok()
        .flatten()
        .and_then(|obj| resolve(doc, obj).as_dict().ok());

    let mut interpreter = Interpreter::new(doc);
    interpreter.run(&content, resources, page_box.display_matrix(), 0);

    let Interpreter { glyphs, fills, .. } = interpreter;
    glyphs
        .into_iter()
        .filter(|glyph| {
            !fills
                .iter()
                .any(|(order, rect)| *order > glyph.order && rect.contains(&glyph.bbox, COVER_TOLERANCE))
        })
        .collect()
}

#[derive(Debug, Clone)]
struct TextState {
    font: Rc<FontInfo>,
    size: f64,
    char_spacing: f64,
    word_spacing: f64,
    horizontal_scale: f64,
    leading: f64,
    rise: f64,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            font: Rc::new(FontInfo::default()),
            size: 0.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            horizontal_scale: 1.0,
            leading: 0.0,
            rise: 0.0,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct GraphicsState {
    ctm: Matrix,
    text: TextState,
}

struct Interpreter<'a> {
    doc: &'a Document,
    glyphs: Vec<Glyph>,
    /// Filled rectangles with their paint order
    fills: Vec<(usize, Rect)>,
    order: usize,
    font_cache: HashMap<ObjectId, Rc<FontInfo>>,
}

fn number(operands: &[Object], index: usize) -> f64 {
    operands.get(index).and_then(object_to_f64).unwrap_or(0.0)
}

fn stream_bytes(stream: &lopdf::Stream) -> Vec<u8> {
    if stream.dict.get(b"Filter").is_ok() {
        stream.decompressed_content().unwrap_or_default()
    } else {
        stream.content.clone()
    }
}

impl<'a> Interpreter<'a> {
    fn new(doc: &'a Document) -> Self {
        Self {
            doc,
            glyphs: Vec::new(),
            fills: Vec::new(),
            order: 0,
            font_cache: HashMap::new(),
        }
    }

    fn run(&mut self, content: &[u8], resources: Option<&'a Dictionary>, ctm: Matrix, depth: usize) {
        let operations = match Content::decode(content) {
            Ok(content) => content.operations,
            Err(e) => {
                warn!("Skipping undecodable content stream: {}", e);
                return;
            }
        };

        let mut state = GraphicsState {
            ctm,
            ..GraphicsState::default()
        };
        let mut stack: Vec<GraphicsState> = Vec::new();
        let mut tm = Matrix::IDENTITY;
        let mut tlm = Matrix::IDENTITY;
        let mut path: Vec<Rect> = Vec::new();

        for Operation { operator, operands } in &operations {
            match operator.as_str() {
                "q" => stack.push(state.clone()),
                "Q" => {
                    if let Some(saved) = stack.pop() {
                        state = saved;
                    }
                }
                "cm" => {
                    if let Some(m) = Matrix::from_operands(operands) {
                        state.ctm = m.then(&state.ctm);
                    }
                }
                "BT" => {
                    tm = Matrix::IDENTITY;
                    tlm = Matrix::IDENTITY;
                }
                "Tf" => {
                    if let Some(Object::Name(name)) = operands.first() {
                        state.text.font = self.font(resources, name);
                    }
                    state.text.size = number(operands, 1);
                }
                "Tc" => state.text.char_spacing = number(operands, 0),
                "Tw" => state.text.word_spacing = number(operands, 0),
                "Tz" => state.text.horizontal_scale = number(operands, 0) / 100.0,
                "TL" => state.text.leading = number(operands, 0),
                "Ts" => state.text.rise = number(operands, 0),
                "Td" | "TD" => {
                    let (tx, ty) = (number(operands, 0), number(operands, 1));
                    if operator == "TD" {
                        state.text.leading = -ty;
                    }
                    tlm = Matrix::translate(tx, ty).then(&tlm);
                    tm = tlm;
                }
                "Tm" => {
                    if let Some(m) = Matrix::from_operands(operands) {
                        tlm = m;
                        tm = m;
                    }
                }
                "T*" => {
                    tlm = Matrix::translate(0.0, -state.text.leading).then(&tlm);
                    tm = tlm;
                }
                "Tj" => {
                    if let Some(Object::String(bytes, _)) = operands.first() {
                        self.show(bytes, &state, &mut tm);
                    }
                }
                "TJ" => {
                    if let Some(Object::Array(items)) = operands.first() {
                        for item in items {
                            match item {
                                Object::String(bytes, _) => self.show(bytes, &state, &mut tm),
                                other => {
                                    if let Some(adjust) = object_to_f64(other) {
                                        let tx = -adjust / 1000.0
                                            * state.text.size
                                            * state.text.horizontal_scale;
                                        tm = Matrix::translate(tx, 0.0).then(&tm);
                                    }
                                }
                            }
                        }
                    }
                }
                "'" | "\"" => {
                    let text_operand = if operator == "\"" {
                        state.text.word_spacing = number(operands, 0);
                        state.text.char_spacing = number(operands, 1);
                        operands.get(2)
                    } else {
                        operands.first()
                    };
                    tlm = Matrix::translate(0.0, -state.text.leading).then(&tlm);
                    tm = tlm;
                    if let Some(Object::String(bytes, _)) = text_operand {
                        self.show(bytes, &state, &mut tm);
                    }
                }
                "re" => {
                    let (x, y) = (number(operands, 0), number(operands, 1));
                    let (w, h) = (number(operands, 2), number(operands, 3));
                    path.push(state.ctm.apply_rect(&Rect::new(x, y, x + w, y + h)));
                }
                "f" | "F" | "f*" | "B" | "B*" | "b" | "b*" => {
                    for rect in path.drain(..) {
                        self.fills.push((self.order, rect));
                        self.order += 1;
                    }
                }
                "n" | "S" | "s" => path.clear(),
                "Do" => {
                    if depth < MAX_FORM_DEPTH {
                        if let Some(Object::Name(name)) = operands.first() {
                            self.run_form(resources, name, state.ctm, depth);
                        }
                    }
                }
                _ => {}
            }
        }
    }

    fn run_form(
        &mut self,
        resources: Option<&'a Dictionary>,
        name: &[u8],
        ctm: Matrix,
        depth: usize,
    ) {
        let doc = self.doc;
        let Some(stream) = resources
            .and_then(|r| r.get(b"XObject").ok())
            .and_then(|obj| resolve(doc, obj).as_dict().ok())
            .and_then(|xobjects| xobjects.get(name).ok())
            .and_then(|obj| resolve(doc, obj).as_stream().ok())
        else {
            return;
        };
        let is_form = stream
            .dict
            .get(b"Subtype")
            .and_then(|s| s.as_name())
            .map(|s| s == b"Form")
            .unwrap_or(false);
        if !is_form {
            return;
        }

        let matrix = stream
            .dict
            .get(b"Matrix")
            .ok()
            .and_then(|obj| resolve(doc, obj).as_array().ok())
            .and_then(|arr| Matrix::from_operands(arr))
            .unwrap_or_default();
        let form_resources = stream
            .dict
            .get(b"Resources")
            .ok()
            .and_then(|obj| resolve(doc, obj).as_dict().ok())
            .or(resources);

        let content = stream_bytes(stream);
        self.run(&content, form_resources, matrix.then(&ctm), depth + 1);
    }

    fn font(&mut self, resources: Option<&'a Dictionary>, name: &[u8]) -> Rc<FontInfo> {
        let doc = self.doc;
        let entry = resources
            .and_then(|r| r.get(b"Font").ok())
            .and_then(|obj| resolve(doc, obj).as_dict().ok())
            .and_then(|fonts| fonts.get(name).ok());

        match entry {
            Some(Object::Reference(id)) => {
                if let Some(font) = self.font_cache.get(id) {
                    return Rc::clone(font);
                }
                let font = match doc.get_object(*id).and_then(|o| o.as_dict()) {
                    Ok(dict) => Rc::new(FontInfo::from_dict(doc, dict)),
                    Err(_) => Rc::new(FontInfo::default()),
                };
                self.font_cache.insert(*id, Rc::clone(&font));
                font
            }
            Some(Object::Dictionary(dict)) => Rc::new(FontInfo::from_dict(doc, dict)),
            _ => {
                debug!("Font /{} not found, using Helvetica metrics", String::from_utf8_lossy(name));
                Rc::new(FontInfo::default())
            }
        }
    }

    fn show(&mut self, bytes: &[u8], state: &GraphicsState, tm: &mut Matrix) {
        let ts = &state.text;
        let font = Rc::clone(&ts.font);

        for (code, text) in font.decode(bytes) {
            let w0 = font.width(code) / 1000.0;
            let trm = Matrix::new(ts.size * ts.horizontal_scale, 0.0, 0.0, ts.size, 0.0, ts.rise)
                .then(tm)
                .then(&state.ctm);

            let glyph_box = Rect::new(0.0, font.descent / 1000.0, w0, font.ascent / 1000.0);
            self.glyphs.push(Glyph {
                text,
                bbox: trm.apply_rect(&glyph_box),
                origin: trm.apply(0.0, 0.0),
                end: trm.apply(w0, 0.0),
                size: (trm.c * trm.c + trm.d * trm.d).sqrt(),
                order: self.order,
            });
            self.order += 1;

            let word_spacing = if font.is_single_byte() && code == 32 {
                ts.word_spacing
            } else {
                0.0
            };
            let tx = (w0 * ts.size + ts.char_spacing + word_spacing) * ts.horizontal_scale;
            *tm = Matrix::translate(tx, 0.0).then(tm);
        }
    }
}

/// A run of glyphs sharing a baseline
#[derive(Debug, Default)]
struct Line {
    text: String,
    /// Glyph index for every byte of `text`; `None` for synthesized spaces
    byte_glyphs: Vec<Option<usize>>,
    glyphs: Vec<Glyph>,
}

impl Line {
    fn push_glyph(&mut self, glyph: Glyph) {
        let index = self.glyphs.len();
        self.text.push_str(&glyph.text);
        self.byte_glyphs
            .extend(std::iter::repeat(Some(index)).take(glyph.text.len()));
        self.glyphs.push(glyph);
    }

    fn push_space(&mut self) {
        self.text.push(' ');
        self.byte_glyphs.push(None);
    }

    fn ends_with_space(&self) -> bool {
        self.text.ends_with(char::is_whitespace)
    }

    /// Bounding boxes of every non-overlapping occurrence of `needle`
    fn find(&self, needle: &str) -> Vec<Rect> {
        self.text
            .match_indices(needle)
            .filter_map(|(start, matched)| {
                self.byte_glyphs[start..start + matched.len()]
                    .iter()
                    .flatten()
                    .map(|i| self.glyphs[*i].bbox)
                    .reduce(|a, b| a.union(&b))
            })
            .collect()
    }
}

fn group_lines(glyphs: Vec<Glyph>) -> Vec<Line> {
    let mut lines: Vec<Line> = Vec::new();
    let mut current = Line::default();

    for glyph in glyphs {
        if let Some(prev) = current.glyphs.last() {
            let size = prev.size.max(glyph.size).max(1.0);
            let same_baseline = (glyph.origin.1 - prev.origin.1).abs() <= size * 0.5;
            let moves_forward = glyph.origin.0 >= prev.end.0 - size * 0.5;

            if same_baseline && moves_forward {
                let gap = glyph.origin.0 - prev.end.0;
                let starts_with_space = glyph.text.starts_with(char::is_whitespace);
                if gap > size * 0.25 && !current.ends_with_space() && !starts_with_space {
                    current.push_space();
                }
            } else {
                lines.push(std::mem::take(&mut current));
            }
        }
        current.push_glyph(glyph);
    }

    if !current.glyphs.is_empty() {
        lines.push(current);
    }
    lines
}

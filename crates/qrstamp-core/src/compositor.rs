//! QR Compositor
//!
//! Covers each marker with a white box and stamps a QR code next to it,
//! optionally followed by a two-line certificate caption.
//!
//! Placement works in the same top-left page space as [`SignPosition`], as
//! the page is displayed. The QR box is offset from the marker, then clamped
//! so that it (and the caption below it, when present) stays inside the page
//! margins. The image and caption are drawn upright on rotated pages.
//!
//! Each touched page gets its original content wrapped in `q`/`Q` and an
//! overlay stream appended, so the overlay always draws in default user
//! space regardless of what the page left on the graphics stack.

use std::collections::BTreeMap;

use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use tracing::debug;

use crate::error::StampError;
use crate::geometry::{resolve, resolve_inherited, Matrix, PageBox, Rect};
use crate::position::SignPosition;
use crate::qr::QrBitmap;

/// Label printed above the certificate identifier
pub const DEFAULT_LABEL: &str = "Verified Document";

/// Every constant used to lay out a stamp
#[derive(Debug, Clone, PartialEq)]
pub struct CompositorStyle {
    /// Side of the square QR box
    pub qr_size: f64,
    /// Offset of the QR box from the marker's top-left corner
    pub offset_x: f64,
    pub offset_y: f64,
    /// Minimum distance between the QR box and the page edge
    pub margin: f64,
    /// Extra room kept free below the QR box for the caption
    pub caption_reserve: f64,
    pub shadow_spread: f64,
    pub shadow_gray: f64,
    pub label: String,
    pub label_font: String,
    pub label_size: f64,
    pub label_color: [f64; 3],
    /// Gap between the QR box and the top of the label
    pub label_gap: f64,
    pub id_font: String,
    pub id_size: f64,
    /// Baseline distance from the label to the identifier
    pub id_line_gap: f64,
}

impl Default for CompositorStyle {
    fn default() -> Self {
        Self {
            qr_size: 60.0,
            offset_x: 10.0,
            offset_y: -30.0,
            margin: 10.0,
            caption_reserve: 40.0,
            shadow_spread: 2.0,
            shadow_gray: 0.8,
            label: DEFAULT_LABEL.to_string(),
            label_font: "Helvetica-Bold".to_string(),
            label_size: 7.0,
            label_color: [0.0, 0.0, 0.7],
            label_gap: 2.0,
            id_font: "Helvetica".to_string(),
            id_size: 6.0,
            id_line_gap: 10.0,
        }
    }
}

impl CompositorStyle {
    /// Same layout with a different label line
    pub fn with_label(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }
}

/// WinAnsiEncoding byte for a character, `None` if the encoding lacks it
fn win_ansi_byte(c: char) -> Option<u8> {
    let byte = match c {
        ' '..='~' => c as u8,
        '\u{a0}'..='\u{ff}' => c as u8,
        '\u{20ac}' => 0x80,
        '\u{201a}' => 0x82,
        '\u{0192}' => 0x83,
        '\u{201e}' => 0x84,
        '\u{2026}' => 0x85,
        '\u{2020}' => 0x86,
        '\u{2021}' => 0x87,
        '\u{02c6}' => 0x88,
        '\u{2030}' => 0x89,
        '\u{0160}' => 0x8a,
        '\u{2039}' => 0x8b,
        '\u{0152}' => 0x8c,
        '\u{017d}' => 0x8e,
        '\u{2018}' => 0x91,
        '\u{2019}' => 0x92,
        '\u{201c}' => 0x93,
        '\u{201d}' => 0x94,
        '\u{2022}' => 0x95,
        '\u{2013}' => 0x96,
        '\u{2014}' => 0x97,
        '\u{02dc}' => 0x98,
        '\u{2122}' => 0x99,
        '\u{0161}' => 0x9a,
        '\u{203a}' => 0x9b,
        '\u{0153}' => 0x9c,
        '\u{017e}' => 0x9e,
        '\u{0178}' => 0x9f,
        _ => return None,
    };
    Some(byte)
}

/// Escape text for a PDF literal string shown in a WinAnsiEncoding font.
///
/// Bytes above 0x7E are written as octal escapes so the content stream stays
/// ASCII. Characters the encoding cannot show become `?`.
pub fn escape_pdf_string(s: &str) -> String {
    s.chars()
        .map(|c| match (c, win_ansi_byte(c)) {
            ('(', _) => "\\(".to_string(),
            (')', _) => "\\)".to_string(),
            ('\\', _) => "\\\\".to_string(),
            (_, Some(byte)) if byte > 0x7e => format!("\\{byte:03o}"),
            (_, Some(byte)) => char::from(byte).to_string(),
            (_, None) => "?".to_string(),
        })
        .collect()
}

/// Top-left corner of the QR box for a marker, in top-left page space.
///
/// The lower bound wins when a page is too small to honor both bounds.
pub fn qr_origin(
    style: &CompositorStyle,
    page_width: f64,
    page_height: f64,
    position: &SignPosition,
    with_caption: bool,
) -> (f64, f64) {
    let reserve = if with_caption { style.caption_reserve } else { 0.0 };
    let max_x = page_width - style.margin - style.qr_size;
    let max_y = page_height - style.margin - style.qr_size - reserve;

    let x = style.margin.max((position.x + style.offset_x).min(max_x));
    let y = style.margin.max((position.y + style.offset_y).min(max_y));
    (x, y)
}

/// Format a coordinate for a content stream
fn num(value: f64) -> String {
    let formatted = format!("{value:.3}");
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    match trimmed {
        "" | "-0" => "0".to_string(),
        other => other.to_string(),
    }
}

/// `a b c d e f` operands of a `cm` or `Tm` operator
fn matrix_operands(m: &Matrix) -> String {
    [m.a, m.b, m.c, m.d, m.e, m.f]
        .iter()
        .map(|v| num(*v))
        .collect::<Vec<_>>()
        .join(" ")
}

/// `x y w h re f` for a user-space rectangle
fn fill_rect(rect: &Rect) -> String {
    format!(
        "{} {} {} {} re f",
        num(rect.x0),
        num(rect.y0),
        num(rect.width()),
        num(rect.height())
    )
}

/// Resource names registered on one page
struct PageNames {
    image: String,
    fonts: Option<(String, String)>,
}

/// Objects shared by every stamp in one composition
struct SharedObjects {
    image: ObjectId,
    fonts: Option<(ObjectId, ObjectId)>,
}

/// Stamps QR codes onto documents with a fixed [`CompositorStyle`]
#[derive(Debug, Clone, Default)]
pub struct Compositor {
    style: CompositorStyle,
}

impl Compositor {
    pub fn new(style: CompositorStyle) -> Self {
        Self { style }
    }

    pub fn style(&self) -> &CompositorStyle {
        &self.style
    }

    /// Stamp every position of a PDF given as raw bytes and serialize the result
    pub fn compose(
        &self,
        pdf: &[u8],
        positions: &[SignPosition],
        qr_data: &str,
        certificate_id: Option<&str>,
    ) -> Result<Vec<u8>, StampError> {
        let mut doc = crate::load_document(pdf)?;
        self.compose_document(&mut doc, positions, qr_data, certificate_id)?;
        save_document(&mut doc)
    }

    /// Stamp every position of an already parsed document in place.
    ///
    /// All page indices are checked before the document is touched.
    pub fn compose_document(
        &self,
        doc: &mut Document,
        positions: &[SignPosition],
        qr_data: &str,
        certificate_id: Option<&str>,
    ) -> Result<(), StampError> {
        let pages: Vec<ObjectId> = doc.get_pages().into_values().collect();
        let page_count = pages.len();
        if let Some(bad) = positions.iter().find(|p| p.page >= page_count) {
            return Err(StampError::PageOutOfRange {
                page: bad.page,
                page_count,
            });
        }
        if positions.is_empty() {
            return Ok(());
        }

        let certificate_id = certificate_id.filter(|id| !id.is_empty());
        let bitmap = QrBitmap::generate(qr_data)?;
        let shared = SharedObjects {
            image: doc.add_object(bitmap.to_image_xobject()?),
            fonts: certificate_id.map(|_| {
                (
                    doc.add_object(standard_font(&self.style.label_font)),
                    doc.add_object(standard_font(&self.style.id_font)),
                )
            }),
        };

        let mut by_page: BTreeMap<usize, Vec<&SignPosition>> = BTreeMap::new();
        for position in positions {
            by_page.entry(position.page).or_default().push(position);
        }

        for (index, page_positions) in by_page {
            let page_id = pages[index];
            let page_box = PageBox::for_page(doc, page_id)?;
            let names = register_resources(doc, page_id, &shared)?;

            let mut overlay = String::from("\nQ\n");
            for position in page_positions {
                overlay.push_str(&self.draw_stamp(&page_box, position, &names, certificate_id));
            }
            debug!("Page {}: stamped overlay of {} bytes", index, overlay.len());
            wrap_and_append(doc, page_id, overlay)?;
        }

        Ok(())
    }

    fn draw_stamp(
        &self,
        page_box: &PageBox,
        position: &SignPosition,
        names: &PageNames,
        certificate_id: Option<&str>,
    ) -> String {
        let style = &self.style;
        let (qr_x, qr_y) = qr_origin(
            style,
            page_box.width(),
            page_box.height(),
            position,
            certificate_id.is_some(),
        );
        debug!(
            "Marker at ({:.1}, {:.1}) on page {} -> QR at ({:.1}, {:.1})",
            position.x, position.y, position.page, qr_x, qr_y
        );

        let size = style.qr_size;
        let spread = style.shadow_spread;
        let cover = page_box.to_user_space(position.x, position.y, position.width, position.height);
        let shadow = page_box.to_user_space(
            qr_x - spread,
            qr_y - spread,
            size + 2.0 * spread,
            size + 2.0 * spread,
        );
        let background = page_box.to_user_space(qr_x, qr_y, size, size);
        let to_user = page_box.user_matrix();
        // Image row 0 is drawn at the top of the box as displayed
        let image = Matrix::new(size, 0.0, 0.0, -size, qr_x, qr_y + size).then(&to_user);
        let gray = num(style.shadow_gray);

        let mut stamp = format!(
            "q\n\
             1 1 1 rg\n\
             {cover}\n\
             {gray} {gray} {gray} rg\n\
             {shadow}\n\
             1 1 1 rg\n\
             {background}\n\
             q {image} cm /{name} Do Q\n",
            cover = fill_rect(&cover),
            shadow = fill_rect(&shadow),
            background = fill_rect(&background),
            image = matrix_operands(&image),
            name = names.image,
        );

        if let (Some(id), Some((label_font, id_font))) = (certificate_id, &names.fonts) {
            // The label's top edge, not its baseline, sits `label_gap` below the QR box
            let label_baseline = qr_y + size + style.label_gap + style.label_size;
            let id_baseline = label_baseline + style.id_line_gap;
            let upright = |baseline: f64| {
                matrix_operands(&Matrix::new(1.0, 0.0, 0.0, -1.0, qr_x, baseline).then(&to_user))
            };
            let [r, g, b] = style.label_color;

            stamp.push_str(&format!(
                "{r} {g} {b} rg\n\
                 BT /{label_font} {label_size} Tf {label_at} Tm ({label}) Tj ET\n\
                 0 0 0 rg\n\
                 BT /{id_font} {id_size} Tf {id_at} Tm ({id}) Tj ET\n",
                r = num(r),
                g = num(g),
                b = num(b),
                label_size = num(style.label_size),
                label_at = upright(label_baseline),
                label = escape_pdf_string(&style.label),
                id_size = num(style.id_size),
                id_at = upright(id_baseline),
                id = escape_pdf_string(id),
            ));
        }
        stamp.push_str("Q\n");
        stamp
    }
}

/// Stamp with the default style
pub fn add_qr_codes(
    pdf: &[u8],
    positions: &[SignPosition],
    qr_data: &str,
    certificate_id: Option<&str>,
) -> Result<Vec<u8>, StampError> {
    Compositor::default().compose(pdf, positions, qr_data, certificate_id)
}

/// Drop unreachable objects, compress streams and serialize
pub fn save_document(doc: &mut Document) -> Result<Vec<u8>, StampError> {
    doc.prune_objects();
    doc.renumber_objects();
    doc.compress();

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer)
        .map_err(|e| StampError::Serialization(e.to_string()))?;
    Ok(buffer)
}

fn standard_font(base_font: &str) -> Object {
    Object::Dictionary(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => base_font,
        "Encoding" => "WinAnsiEncoding",
    })
}

/// First of `base`, `base1`, `base2`, ... not already used in `entries`
fn unique_name(entries: &Dictionary, base: &str) -> String {
    if !entries.has(base.as_bytes()) {
        return base.to_string();
    }
    (1..)
        .map(|n| format!("{base}{n}"))
        .find(|name| !entries.has(name.as_bytes()))
        .unwrap_or_else(|| base.to_string())
}

fn register(
    doc: &Document,
    resources: &mut Dictionary,
    category: &[u8],
    base: &str,
    target: ObjectId,
) -> String {
    let mut entries = resources
        .get(category)
        .ok()
        .and_then(|obj| resolve(doc, obj).as_dict().ok())
        .cloned()
        .unwrap_or_else(Dictionary::new);
    let name = unique_name(&entries, base);
    entries.set(name.clone(), Object::Reference(target));
    resources.set(category.to_vec(), Object::Dictionary(entries));
    name
}

/// Give the page its own resource dictionary holding the stamp objects
fn register_resources(
    doc: &mut Document,
    page_id: ObjectId,
    shared: &SharedObjects,
) -> Result<PageNames, StampError> {
    let mut resources = resolve_inherited(doc, page_id, b"Resources")?
        .and_then(|obj| resolve(doc, obj).as_dict().ok())
        .cloned()
        .unwrap_or_else(Dictionary::new);

    let image = register(doc, &mut resources, b"XObject", "QrImg", shared.image);
    let fonts = shared.fonts.map(|(label_id, text_id)| {
        (
            register(doc, &mut resources, b"Font", "QrLabel", label_id),
            register(doc, &mut resources, b"Font", "QrText", text_id),
        )
    });

    page_dict_mut(doc, page_id)?.set("Resources", Object::Dictionary(resources));
    Ok(PageNames { image, fonts })
}

fn page_dict_mut(doc: &mut Document, page_id: ObjectId) -> Result<&mut Dictionary, StampError> {
    doc.get_object_mut(page_id)
        .and_then(|obj| obj.as_dict_mut())
        .map_err(|e| StampError::Render(format!("failed to get page dictionary: {e}")))
}

/// Wrap the page's existing content in `q`/`Q` and append `overlay`, which
/// must start with the closing `Q`.
fn wrap_and_append(doc: &mut Document, page_id: ObjectId, overlay: String) -> Result<(), StampError> {
    let existing = {
        let page = doc
            .get_object(page_id)
            .and_then(|obj| obj.as_dict())
            .map_err(|e| StampError::Render(format!("failed to get page dictionary: {e}")))?;
        match page.get(b"Contents") {
            Ok(Object::Reference(id)) => match doc.get_object(*id) {
                Ok(Object::Array(items)) => items.clone(),
                _ => vec![Object::Reference(*id)],
            },
            Ok(Object::Array(items)) => items.clone(),
            _ => Vec::new(),
        }
    };

    let open_id = doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
    let overlay_id = doc.add_object(Stream::new(Dictionary::new(), overlay.into_bytes()));

    let mut contents = Vec::with_capacity(existing.len() + 2);
    contents.push(Object::Reference(open_id));
    contents.extend(existing);
    contents.push(Object::Reference(overlay_id));

    page_dict_mut(doc, page_id)?.set("Contents", Object::Array(contents));
    Ok(())
}

//! Matrices, rectangles and page boxes
//!
//! PDF user space has its origin at the bottom-left of the page. Positions
//! exchanged with callers use the top-left corner of the visible page box as
//! displayed (after `/Rotate`) with y growing downwards; [`PageBox`] converts
//! between the two.

use lopdf::{Document, Object, ObjectId};

use crate::error::StampError;

/// Affine transform in PDF row-vector convention `[a b c d e f]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Matrix {
    pub const IDENTITY: Matrix = Matrix {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    pub fn new(a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> Self {
        Self { a, b, c, d, e, f }
    }

    pub fn translate(tx: f64, ty: f64) -> Self {
        Self::new(1.0, 0.0, 0.0, 1.0, tx, ty)
    }

    /// Build from six numeric operands, `None` if any is missing or not a number
    pub fn from_operands(operands: &[Object]) -> Option<Self> {
        if operands.len() < 6 {
            return None;
        }
        let mut values = [0.0; 6];
        for (slot, obj) in values.iter_mut().zip(operands) {
            *slot = object_to_f64(obj)?;
        }
        let [a, b, c, d, e, f] = values;
        Some(Self::new(a, b, c, d, e, f))
    }

    /// `self` applied first, then `other`
    pub fn then(&self, other: &Matrix) -> Matrix {
        Matrix {
            a: self.a * other.a + self.b * other.c,
            b: self.a * other.b + self.b * other.d,
            c: self.c * other.a + self.d * other.c,
            d: self.c * other.b + self.d * other.d,
            e: self.e * other.a + self.f * other.c + other.e,
            f: self.e * other.b + self.f * other.d + other.f,
        }
    }

    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.a * x + self.c * y + self.e,
            self.b * x + self.d * y + self.f,
        )
    }

    /// Bounding box of a rectangle after transformation
    pub fn apply_rect(&self, rect: &Rect) -> Rect {
        let corners = [
            self.apply(rect.x0, rect.y0),
            self.apply(rect.x1, rect.y0),
            self.apply(rect.x0, rect.y1),
            self.apply(rect.x1, rect.y1),
        ];
        let mut out = Rect::new(corners[0].0, corners[0].1, corners[0].0, corners[0].1);
        for (x, y) in &corners[1..] {
            out.x0 = out.x0.min(*x);
            out.y0 = out.y0.min(*y);
            out.x1 = out.x1.max(*x);
            out.y1 = out.y1.max(*y);
        }
        out
    }
}

impl Default for Matrix {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Axis-aligned rectangle, normalized so that `x0 <= x1` and `y0 <= y1`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl Rect {
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self {
            x0: x0.min(x1),
            y0: y0.min(y1),
            x1: x0.max(x1),
            y1: y0.max(y1),
        }
    }

    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f64 {
        self.y1 - self.y0
    }

    pub fn union(&self, other: &Rect) -> Rect {
        Rect {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    /// True if `other` lies inside `self`, allowing `tolerance` on every edge
    pub fn contains(&self, other: &Rect, tolerance: f64) -> bool {
        other.x0 >= self.x0 - tolerance
            && other.y0 >= self.y0 - tolerance
            && other.x1 <= self.x1 + tolerance
            && other.y1 <= self.y1 + tolerance
    }
}

/// The visible rectangle of a page in PDF user space and its display rotation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageBox {
    pub rect: Rect,
    /// Clockwise rotation applied when displaying: 0, 90, 180 or 270
    pub rotation: u16,
}

impl PageBox {
    /// Default when a page carries no usable box (US Letter)
    pub const LETTER: PageBox = PageBox {
        rect: Rect {
            x0: 0.0,
            y0: 0.0,
            x1: 612.0,
            y1: 792.0,
        },
        rotation: 0,
    };

    pub fn new(rect: Rect) -> Self {
        Self { rect, rotation: 0 }
    }

    /// CropBox if present, else MediaBox, both inheritable from the page
    /// tree, along with the inherited `/Rotate`
    pub fn for_page(doc: &Document, page_id: ObjectId) -> Result<Self, StampError> {
        let rotation = resolve_inherited(doc, page_id, b"Rotate")?
            .and_then(|obj| object_to_f64(resolve(doc, obj)))
            .map(normalize_rotation)
            .unwrap_or(0);

        for key in [&b"CropBox"[..], &b"MediaBox"[..]] {
            if let Some(obj) = resolve_inherited(doc, page_id, key)? {
                if let Some(rect) = rect_from_object(doc, obj) {
                    return Ok(Self { rect, rotation });
                }
            }
        }
        Ok(Self {
            rotation,
            ..Self::LETTER
        })
    }

    fn is_sideways(&self) -> bool {
        self.rotation == 90 || self.rotation == 270
    }

    /// Displayed width
    pub fn width(&self) -> f64 {
        if self.is_sideways() {
            self.rect.height()
        } else {
            self.rect.width()
        }
    }

    /// Displayed height
    pub fn height(&self) -> f64 {
        if self.is_sideways() {
            self.rect.width()
        } else {
            self.rect.height()
        }
    }

    /// Maps user space onto the displayed page, origin top-left and y down
    pub fn display_matrix(&self) -> Matrix {
        let (w, h) = (self.rect.width(), self.rect.height());
        let flip = Matrix::new(1.0, 0.0, 0.0, -1.0, -self.rect.x0, self.rect.y1);
        let turn = match self.rotation {
            90 => Matrix::new(0.0, 1.0, -1.0, 0.0, h, 0.0),
            180 => Matrix::new(-1.0, 0.0, 0.0, -1.0, w, h),
            270 => Matrix::new(0.0, -1.0, 1.0, 0.0, 0.0, w),
            _ => Matrix::IDENTITY,
        };
        flip.then(&turn)
    }

    /// Inverse of [`PageBox::display_matrix`]
    pub fn user_matrix(&self) -> Matrix {
        let (w, h) = (self.rect.width(), self.rect.height());
        let unturn = match self.rotation {
            90 => Matrix::new(0.0, -1.0, 1.0, 0.0, 0.0, h),
            180 => Matrix::new(-1.0, 0.0, 0.0, -1.0, w, h),
            270 => Matrix::new(0.0, 1.0, -1.0, 0.0, w, 0.0),
            _ => Matrix::IDENTITY,
        };
        let unflip = Matrix::new(1.0, 0.0, 0.0, -1.0, self.rect.x0, self.rect.y1);
        unturn.then(&unflip)
    }

    /// Convert a top-left box `(x, y, width, height)` to a user-space rectangle
    pub fn to_user_space(&self, x: f64, y: f64, width: f64, height: f64) -> Rect {
        self.user_matrix()
            .apply_rect(&Rect::new(x, y, x + width, y + height))
    }

    /// Convert a user-space rectangle to a top-left `(x, y, width, height)` box
    pub fn to_page_space(&self, rect: &Rect) -> (f64, f64, f64, f64) {
        let shown = self.display_matrix().apply_rect(rect);
        (shown.x0, shown.y0, shown.width(), shown.height())
    }
}

/// Snap a `/Rotate` value to 0, 90, 180 or 270
fn normalize_rotation(degrees: f64) -> u16 {
    let quarter_turns = (degrees / 90.0).round() as i64;
    (quarter_turns.rem_euclid(4) * 90) as u16
}

/// Convert a lopdf numeric object (Integer or Real) to f64
pub fn object_to_f64(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(*r as f64),
        _ => None,
    }
}

/// Follow a reference to its target, leaving direct objects untouched
pub fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        other => other,
    }
}

fn rect_from_object(doc: &Document, obj: &Object) -> Option<Rect> {
    let arr = resolve(doc, obj).as_array().ok()?;
    if arr.len() != 4 {
        return None;
    }
    let values: Vec<f64> = arr
        .iter()
        .filter_map(|o| object_to_f64(resolve(doc, o)))
        .collect();
    if values.len() != 4 {
        return None;
    }
    Some(Rect::new(values[0], values[1], values[2], values[3]))
}

/// Look up a key on the page dictionary, walking up `/Parent` links.
///
/// The walk is bounded so a cyclic page tree cannot loop forever.
pub fn resolve_inherited<'a>(
    doc: &'a Document,
    page_id: ObjectId,
    key: &[u8],
) -> Result<Option<&'a Object>, StampError> {
    const MAX_DEPTH: usize = 32;

    let mut current_id = page_id;
    for _ in 0..MAX_DEPTH {
        let dict = doc
            .get_object(current_id)
            .and_then(|o| o.as_dict())
            .map_err(|e| StampError::Parse(format!("failed to get page dictionary: {e}")))?;

        if let Ok(value) = dict.get(key) {
            return Ok(Some(value));
        }

        match dict.get(b"Parent").and_then(|p| p.as_reference()) {
            Ok(parent_id) => current_id = parent_id,
            Err(_) => return Ok(None),
        }
    }
    Ok(None)
}

//! In-memory PDF builders for tests
//!
//! Every page shares one resource dictionary with a standard font registered
//! as `/F1` (Helvetica unless stated otherwise), so `text_ops` output can be
//! placed on any page.

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, Stream};

/// One page to build: boxes are `[x0, y0, x1, y1]` in user space
#[derive(Debug, Clone)]
pub struct TestPage {
    pub media_box: [f64; 4],
    pub crop_box: Option<[f64; 4]>,
    /// `/Rotate` entry, omitted when zero
    pub rotate: i64,
    pub operations: Vec<Operation>,
}

fn box_object(rect: [f64; 4]) -> Object {
    Object::Array(rect.iter().map(|v| Object::Real(*v as f32)).collect())
}

impl TestPage {
    /// US Letter page (612 x 792)
    pub fn letter(operations: Vec<Operation>) -> Self {
        Self::sized(612.0, 792.0, operations)
    }

    pub fn sized(width: f64, height: f64, operations: Vec<Operation>) -> Self {
        Self {
            media_box: [0.0, 0.0, width, height],
            crop_box: None,
            rotate: 0,
            operations,
        }
    }

    /// Same page displayed rotated clockwise by `degrees`
    pub fn rotated(self, degrees: i64) -> Self {
        Self {
            rotate: degrees,
            ..self
        }
    }

    /// Serialize a document containing `pages` in order
    pub fn build_document(pages: &[TestPage]) -> Vec<u8> {
        Self::build_document_with_font(pages, "Helvetica")
    }

    /// Like [`TestPage::build_document`] with `/F1` bound to another
    /// standard font, declared without `/Widths`
    pub fn build_document_with_font(pages: &[TestPage], base_font: &str) -> Vec<u8> {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();

        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => base_font,
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids = Vec::new();
        for page in pages {
            let content = Content {
                operations: page.operations.clone(),
            };
            let content_id = doc.add_object(Stream::new(
                Dictionary::new(),
                content.encode().unwrap_or_default(),
            ));
            let mut page_dict = dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => resources_id,
                "MediaBox" => box_object(page.media_box),
            };
            if let Some(crop_box) = page.crop_box {
                page_dict.set("CropBox", box_object(crop_box));
            }
            if page.rotate != 0 {
                page_dict.set("Rotate", page.rotate);
            }
            kids.push(Object::Reference(doc.add_object(page_dict)));
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).unwrap_or_default();
        buffer
    }
}

/// Operations that show `text` in `/F1` at baseline `(x, y)`
pub fn text_ops(x: f64, y: f64, size: f64, text: &str) -> Vec<Operation> {
    vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec!["F1".into(), Object::Real(size as f32)]),
        Operation::new("Td", vec![Object::Real(x as f32), Object::Real(y as f32)]),
        Operation::new("Tj", vec![Object::string_literal(text)]),
        Operation::new("ET", vec![]),
    ]
}

/// Operations that show `text` upright on a Letter page displayed with
/// `/Rotate 90`, baseline at `(x, y)` in top-left display space
pub fn rotated_90_text_ops(x: f64, y: f64, size: f64, text: &str) -> Vec<Operation> {
    let (user_x, user_y) = (y, x);
    vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec!["F1".into(), Object::Real(size as f32)]),
        Operation::new(
            "Tm",
            vec![
                0.into(),
                1.into(),
                (-1).into(),
                0.into(),
                Object::Real(user_x as f32),
                Object::Real(user_y as f32),
            ],
        ),
        Operation::new("Tj", vec![Object::string_literal(text)]),
        Operation::new("ET", vec![]),
    ]
}

/// A single US Letter page with the given content
pub fn single_page_pdf(operations: Vec<Operation>) -> Vec<u8> {
    TestPage::build_document(&[TestPage::letter(operations)])
}

/// A Letter page whose text lives in a form XObject translated by (100, 100)
pub fn form_xobject_pdf(text: &str) -> Vec<u8> {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let form_content = Content {
        operations: text_ops(10.0, 10.0, 12.0, text),
    };
    let form_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Form",
            "BBox" => vec![0.into(), 0.into(), 300.into(), 100.into()],
            "Matrix" => vec![1.into(), 0.into(), 0.into(), 1.into(), 100.into(), 100.into()],
            "Resources" => dictionary! { "Font" => dictionary! { "F1" => font_id } },
        },
        form_content.encode().unwrap_or_default(),
    ));

    let page_content = Content {
        operations: vec![Operation::new("Do", vec!["Fm1".into()])],
    };
    let content_id = doc.add_object(Stream::new(
        Dictionary::new(),
        page_content.encode().unwrap_or_default(),
    ));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => dictionary! { "XObject" => dictionary! { "Fm1" => form_id } },
        "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).unwrap_or_default();
    buffer
}

//! Locate-then-stamp round trips
//!
//! Drives the public API the same way the HTTP handlers do: find markers,
//! feed the positions straight back into the compositor, and inspect the
//! resulting document.

use lopdf::{Document, Object};
use proptest::prelude::*;
use qrstamp_core::fixtures::{single_page_pdf, text_ops, TestPage};
use qrstamp_core::geometry::PageBox;
use qrstamp_core::{
    add_qr_codes, find_marker_positions, get_page_count, parse_positions, QrBitmap,
    DEFAULT_MARKER,
};

const URL: &str = "https://verify.example.com/c/7f3a";

fn embedded_images(pdf: &[u8]) -> Vec<Vec<u8>> {
    let doc = Document::load_mem(pdf).unwrap();
    doc.objects
        .values()
        .filter_map(|obj| match obj {
            Object::Stream(stream) => Some(stream),
            _ => None,
        })
        .filter(|stream| {
            stream
                .dict
                .get(b"Subtype")
                .and_then(|s| s.as_name())
                .map(|s| s == b"Image")
                .unwrap_or(false)
        })
        .map(|stream| stream.decompressed_content().unwrap())
        .collect()
}

#[test]
fn single_marker_end_to_end() {
    let mut ops = text_ops(72.0, 720.0, 14.0, "Purchase Agreement");
    ops.extend(text_ops(90.0, 150.0, 12.0, "Signature: [[SIGN_HERE]]"));
    let pdf = single_page_pdf(ops);

    let positions = find_marker_positions(&pdf, DEFAULT_MARKER).unwrap();
    assert_eq!(positions.len(), 1);
    assert_eq!(positions[0].page, 0);

    let out = add_qr_codes(&pdf, &positions, URL, Some("CERT-2024-0001")).unwrap();
    assert_eq!(get_page_count(&out).unwrap(), 1);
    assert!(find_marker_positions(&out, DEFAULT_MARKER).unwrap().is_empty());

    let images = embedded_images(&out);
    assert_eq!(images.len(), 1);
    assert_eq!(images[0], QrBitmap::generate(URL).unwrap().pixels);

    // Text before the marker on the same line is untouched
    let remaining = find_marker_positions(&out, "Signature:").unwrap();
    assert_eq!(remaining.len(), 1);
}

#[test]
fn positions_survive_json_transport() {
    let pdf = TestPage::build_document(&[
        TestPage::letter(text_ops(100.0, 500.0, 12.0, DEFAULT_MARKER)),
        TestPage::letter(text_ops(300.0, 100.0, 12.0, DEFAULT_MARKER)),
    ]);
    let located = find_marker_positions(&pdf, DEFAULT_MARKER).unwrap();
    let json = serde_json::to_string(&located).unwrap();
    let parsed = parse_positions(&json).unwrap();
    assert_eq!(parsed, located);

    let out = add_qr_codes(&pdf, &parsed, URL, None).unwrap();
    assert_eq!(get_page_count(&out).unwrap(), 2);
    assert!(find_marker_positions(&out, DEFAULT_MARKER).unwrap().is_empty());
}

#[test]
fn marker_near_page_corner_keeps_qr_on_page() {
    let pdf = single_page_pdf(text_ops(560.0, 15.0, 10.0, DEFAULT_MARKER));
    let positions = find_marker_positions(&pdf, DEFAULT_MARKER).unwrap();
    let out = add_qr_codes(&pdf, &positions, URL, Some("ID")).unwrap();

    let doc = Document::load_mem(&out).unwrap();
    let page_id = doc.get_pages().into_values().next().unwrap();
    let page_box = PageBox::for_page(&doc, page_id).unwrap();
    assert_eq!((page_box.width(), page_box.height()), (612.0, 792.0));

    let content = String::from_utf8_lossy(&doc.get_page_content(page_id).unwrap()).into_owned();
    // Image placement: "q 60 0 0 60 <x> <y> cm /QrImg Do Q"
    let line = content
        .lines()
        .find(|line| line.contains("/QrImg Do"))
        .unwrap();
    let fields: Vec<f64> = line
        .split_whitespace()
        .skip(1)
        .take(6)
        .map(|v| v.parse().unwrap())
        .collect();
    let (x, y) = (fields[4], fields[5]);
    assert!((10.0..=542.0).contains(&x));
    assert!((10.0..=722.0).contains(&y));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// N markers in, N positions out, each on an existing page
    #[test]
    fn every_marker_is_found_on_its_page(per_page in proptest::collection::vec(0usize..4, 1..4)) {
        let pages: Vec<TestPage> = per_page
            .iter()
            .map(|count| {
                let ops = (0..*count)
                    .flat_map(|i| text_ops(72.0, 700.0 - 60.0 * i as f64, 12.0, DEFAULT_MARKER))
                    .collect();
                TestPage::letter(ops)
            })
            .collect();
        let pdf = TestPage::build_document(&pages);

        let positions = find_marker_positions(&pdf, DEFAULT_MARKER).unwrap();
        prop_assert_eq!(positions.len(), per_page.iter().sum::<usize>());
        for (index, count) in per_page.iter().enumerate() {
            prop_assert_eq!(positions.iter().filter(|p| p.page == index).count(), *count);
        }
        prop_assert!(positions.iter().all(|p| p.page < per_page.len()));
    }
}

//! HTTP tests for the qrstamp API
//!
//! Fixtures are built in memory with the core crate's PDF builders and sent
//! through the full router, middleware included.

#[cfg(test)]
mod http_endpoint_tests {
    //! HTTP endpoint integration tests using axum-test

    use axum::http::{header, StatusCode};
    use axum_test::multipart::{MultipartForm, Part};
    use axum_test::TestServer;
    use pretty_assertions::assert_eq;
    use qrstamp_core::fixtures::{single_page_pdf, text_ops, TestPage};
    use qrstamp_core::{find_marker_positions, get_page_count, QrBitmap, DEFAULT_MARKER};
    use serde_json::json;

    use crate::config::ServerConfig;
    use crate::{build_router, AppState};

    const URL: &str = "https://verify.example.com/doc/abc123";

    fn create_test_server() -> TestServer {
        create_server_with(ServerConfig::default())
    }

    fn create_server_with(config: ServerConfig) -> TestServer {
        TestServer::new(build_router(AppState::new(config))).unwrap()
    }

    fn marker_pdf() -> Vec<u8> {
        let mut ops = text_ops(72.0, 720.0, 14.0, "Lease Agreement");
        ops.extend(text_ops(100.0, 200.0, 12.0, DEFAULT_MARKER));
        single_page_pdf(ops)
    }

    fn plain_pdf() -> Vec<u8> {
        single_page_pdf(text_ops(72.0, 720.0, 14.0, "Nothing to sign here"))
    }

    fn pdf_part(bytes: Vec<u8>, name: &str) -> Part {
        Part::bytes(bytes).file_name(name).mime_type("application/pdf")
    }

    fn embedded_image_pixels(pdf: &[u8]) -> Vec<u8> {
        let doc = qrstamp_core::load_document(pdf).unwrap();
        doc.objects
            .values()
            .filter_map(|obj| obj.as_stream().ok())
            .find(|s| {
                s.dict
                    .get(b"Subtype")
                    .and_then(|t| t.as_name())
                    .map(|t| t == b"Image")
                    .unwrap_or(false)
            })
            .unwrap()
            .decompressed_content()
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_returns_200() {
        let server = create_test_server();
        let response = server.get("/health").await;
        response.assert_status_ok();

        let json = response.json::<serde_json::Value>();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["service"], "qrstamp-api");
    }

    #[tokio::test]
    async fn test_detect_returns_positions() {
        let server = create_test_server();
        let form = MultipartForm::new().add_part("file", pdf_part(marker_pdf(), "lease.pdf"));

        let response = server.post("/detect-sign-positions").multipart(form).await;
        response.assert_status_ok();

        let json = response.json::<serde_json::Value>();
        let positions = json["positions"].as_array().unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0]["page"], 0);
        let x = positions[0]["x"].as_f64().unwrap();
        assert!((x - 100.0).abs() < 0.01);
        assert!(positions[0]["width"].as_f64().unwrap() > 0.0);
    }

    #[tokio::test]
    async fn test_detect_with_custom_marker() {
        let server = create_test_server();
        let form = MultipartForm::new()
            .add_part("file", pdf_part(marker_pdf(), "lease.pdf"))
            .add_text("marker", "Lease");

        let response = server.post("/detect-sign-positions").multipart(form).await;
        response.assert_status_ok();
        let json = response.json::<serde_json::Value>();
        assert_eq!(json["positions"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_detect_without_marker_returns_empty_list() {
        let server = create_test_server();
        let form = MultipartForm::new().add_part("file", pdf_part(plain_pdf(), "plain.pdf"));

        let response = server.post("/detect-sign-positions").multipart(form).await;
        response.assert_status_ok();
        assert_eq!(response.json::<serde_json::Value>(), json!({"positions": []}));
    }

    #[tokio::test]
    async fn test_detect_invalid_pdf_is_500() {
        let server = create_test_server();
        let form = MultipartForm::new().add_part("file", pdf_part(b"not a pdf".to_vec(), "x.pdf"));

        let response = server.post("/detect-sign-positions").multipart(form).await;
        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        let json = response.json::<serde_json::Value>();
        assert!(json["error"]
            .as_str()
            .unwrap()
            .starts_with("Error processing PDF: "));
    }

    #[tokio::test]
    async fn test_detect_missing_file_is_422() {
        let server = create_test_server();
        let form = MultipartForm::new().add_text("marker", DEFAULT_MARKER);

        let response = server.post("/detect-sign-positions").multipart(form).await;
        response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(response.json::<serde_json::Value>()["status"], 422);
    }

    #[tokio::test]
    async fn test_detect_and_add_end_to_end() {
        let server = create_test_server();
        let form = MultipartForm::new()
            .add_part("file", pdf_part(marker_pdf(), "lease.pdf"))
            .add_text("qr_data", URL)
            .add_text("certificate_id", "CERT-0001");

        let response = server.post("/detect-and-add-qr").multipart(form).await;
        response.assert_status_ok();
        assert_eq!(
            response.header(header::CONTENT_TYPE).to_str().unwrap(),
            "application/pdf"
        );
        assert_eq!(
            response.header(header::CONTENT_DISPOSITION).to_str().unwrap(),
            "attachment; filename=\"signed_lease.pdf\""
        );

        let pdf = response.as_bytes().to_vec();
        assert_eq!(get_page_count(&pdf).unwrap(), 1);
        assert!(find_marker_positions(&pdf, DEFAULT_MARKER).unwrap().is_empty());
        assert_eq!(embedded_image_pixels(&pdf), QrBitmap::generate(URL).unwrap().pixels);
    }

    #[tokio::test]
    async fn test_detect_and_add_marker_not_found_is_404() {
        let server = create_test_server();
        let form = MultipartForm::new()
            .add_part("file", pdf_part(plain_pdf(), "plain.pdf"))
            .add_text("qr_data", URL);

        let response = server.post("/detect-and-add-qr").multipart(form).await;
        response.assert_status(StatusCode::NOT_FOUND);
        let json = response.json::<serde_json::Value>();
        assert_eq!(
            json["error"],
            "No marker '[[SIGN_HERE]]' found in the document"
        );
    }

    #[tokio::test]
    async fn test_detect_and_add_requires_qr_data() {
        let server = create_test_server();
        let form = MultipartForm::new().add_part("file", pdf_part(marker_pdf(), "lease.pdf"));

        let response = server.post("/detect-and-add-qr").multipart(form).await;
        response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
        assert!(response.json::<serde_json::Value>()["error"]
            .as_str()
            .unwrap()
            .contains("qr_data"));
    }

    #[tokio::test]
    async fn test_empty_marker_falls_back_to_default() {
        let server = create_test_server();
        let form = MultipartForm::new()
            .add_part("file", pdf_part(marker_pdf(), "lease.pdf"))
            .add_text("marker", "");

        let response = server.post("/detect-sign-positions").multipart(form).await;
        response.assert_status_ok();
        let json = response.json::<serde_json::Value>();
        assert_eq!(json["positions"].as_array().unwrap().len(), 1);

        let form = MultipartForm::new()
            .add_part("file", pdf_part(marker_pdf(), "lease.pdf"))
            .add_text("marker", "")
            .add_text("qr_data", URL);

        let response = server.post("/detect-and-add-qr").multipart(form).await;
        response.assert_status_ok();
        assert!(find_marker_positions(response.as_bytes(), DEFAULT_MARKER)
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_empty_qr_data_is_422() {
        let server = create_test_server();
        let form = MultipartForm::new()
            .add_part("file", pdf_part(marker_pdf(), "lease.pdf"))
            .add_text("qr_data", "");

        let response = server.post("/detect-and-add-qr").multipart(form).await;
        response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
        assert!(response.json::<serde_json::Value>()["error"]
            .as_str()
            .unwrap()
            .contains("qr_data"));
    }

    #[tokio::test]
    async fn test_empty_positions_json_is_422() {
        let server = create_test_server();
        let form = MultipartForm::new()
            .add_part("file", pdf_part(plain_pdf(), "plain.pdf"))
            .add_text("positions_json", "")
            .add_text("qr_data", URL);

        let response = server.post("/add-qr-codes").multipart(form).await;
        response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
        assert!(response.json::<serde_json::Value>()["error"]
            .as_str()
            .unwrap()
            .contains("positions_json"));
    }

    #[tokio::test]
    async fn test_null_position_field_is_500() {
        let server = create_test_server();
        let form = MultipartForm::new()
            .add_part("file", pdf_part(plain_pdf(), "plain.pdf"))
            .add_text("positions_json", r#"[{"x": null, "y": 10, "page": 0}]"#)
            .add_text("qr_data", URL);

        let response = server.post("/add-qr-codes").multipart(form).await;
        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_add_qr_codes_at_located_positions() {
        let server = create_test_server();
        let pdf = TestPage::build_document(&[
            TestPage::letter(text_ops(100.0, 400.0, 12.0, DEFAULT_MARKER)),
            TestPage::sized(400.0, 500.0, text_ops(50.0, 50.0, 10.0, DEFAULT_MARKER)),
        ]);
        let positions = find_marker_positions(&pdf, DEFAULT_MARKER).unwrap();
        let positions_json = serde_json::to_string(&positions).unwrap();

        let form = MultipartForm::new()
            .add_part("file", pdf_part(pdf, "two-pages.pdf"))
            .add_text("positions_json", positions_json)
            .add_text("qr_data", URL)
            .add_text("certificate_id", "");

        let response = server.post("/add-qr-codes").multipart(form).await;
        response.assert_status_ok();
        assert_eq!(
            response.header(header::CONTENT_DISPOSITION).to_str().unwrap(),
            "attachment; filename=\"signed_two-pages.pdf\""
        );

        let out = response.as_bytes().to_vec();
        assert_eq!(get_page_count(&out).unwrap(), 2);
        assert!(find_marker_positions(&out, DEFAULT_MARKER).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_add_qr_codes_fills_record_defaults() {
        let server = create_test_server();
        let form = MultipartForm::new()
            .add_part("file", pdf_part(plain_pdf(), "plain.pdf"))
            .add_text("positions_json", "[{}]")
            .add_text("qr_data", URL);

        let response = server.post("/add-qr-codes").multipart(form).await;
        response.assert_status_ok();
        assert_eq!(get_page_count(response.as_bytes()).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_add_qr_codes_page_out_of_range_is_400() {
        let server = create_test_server();
        let form = MultipartForm::new()
            .add_part("file", pdf_part(plain_pdf(), "plain.pdf"))
            .add_text("positions_json", r#"[{"x": 10, "y": 10, "page": 5}]"#)
            .add_text("qr_data", URL);

        let response = server.post("/add-qr-codes").multipart(form).await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let json = response.json::<serde_json::Value>();
        assert_eq!(json["page"], 5);
        assert_eq!(json["page_count"], 1);
        assert!(json["error"]
            .as_str()
            .unwrap()
            .starts_with("Error adding QR codes: "));
    }

    #[tokio::test]
    async fn test_add_qr_codes_malformed_json_is_500() {
        let server = create_test_server();
        let form = MultipartForm::new()
            .add_part("file", pdf_part(plain_pdf(), "plain.pdf"))
            .add_text("positions_json", "{not json")
            .add_text("qr_data", URL);

        let response = server.post("/add-qr-codes").multipart(form).await;
        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.json::<serde_json::Value>()["error"]
            .as_str()
            .unwrap()
            .starts_with("Error adding QR codes: "));
    }

    #[tokio::test]
    async fn test_add_qr_codes_without_filename_uses_fallback() {
        let server = create_test_server();
        let form = MultipartForm::new()
            .add_part("file", Part::bytes(plain_pdf()).mime_type("application/pdf"))
            .add_text("positions_json", "[]")
            .add_text("qr_data", URL);

        let response = server.post("/add-qr-codes").multipart(form).await;
        response.assert_status_ok();
        assert_eq!(
            response.header(header::CONTENT_DISPOSITION).to_str().unwrap(),
            "attachment; filename=\"signed_document.pdf\""
        );
    }

    #[tokio::test]
    async fn test_configured_label_is_stamped() {
        let server = create_server_with(ServerConfig {
            certificate_label: "Signed Copy".to_string(),
            ..ServerConfig::default()
        });
        let form = MultipartForm::new()
            .add_part("file", pdf_part(marker_pdf(), "lease.pdf"))
            .add_text("qr_data", URL)
            .add_text("certificate_id", "ABC");

        let response = server.post("/detect-and-add-qr").multipart(form).await;
        response.assert_status_ok();

        let doc = qrstamp_core::load_document(response.as_bytes()).unwrap();
        let page_id = doc.get_pages().into_values().next().unwrap();
        let content = String::from_utf8_lossy(&doc.get_page_content(page_id).unwrap()).into_owned();
        assert!(content.contains("(Signed Copy) Tj"));
        assert!(content.contains("(ABC) Tj"));
    }

    #[tokio::test]
    async fn test_regex_endpoint_is_not_implemented() {
        let server = create_test_server();
        let form = MultipartForm::new()
            .add_part("file", pdf_part(marker_pdf(), "lease.pdf"))
            .add_text("pattern", r"\[\[SIGN.*\]\]");

        let response = server.post("/detect-with-regex").multipart(form).await;
        response.assert_status_ok();
        assert_eq!(
            response.json::<serde_json::Value>(),
            json!({"message": "Regex-based detection not implemented yet"})
        );
    }

    #[tokio::test]
    async fn test_upload_over_limit_is_rejected() {
        let server = create_server_with(ServerConfig {
            max_upload_bytes: 1024,
            ..ServerConfig::default()
        });
        let form = MultipartForm::new()
            .add_part("file", pdf_part(vec![b'%'; 4096], "big.pdf"));

        let response = server.post("/detect-sign-positions").multipart(form).await;
        response.assert_status(StatusCode::PAYLOAD_TOO_LARGE);
    }
}

#[cfg(test)]
mod property_tests {
    use proptest::prelude::*;
    use qrstamp_core::fixtures::{single_page_pdf, text_ops};
    use qrstamp_core::{add_qr_codes, find_marker_positions, get_page_count, DEFAULT_MARKER};

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(12))]

        /// Stamping any located marker keeps a single page and erases the marker
        #[test]
        fn stamped_marker_is_always_erased(
            x in 20.0f64..500.0,
            y in 20.0f64..760.0,
            size in 8.0f64..18.0,
            cert in proptest::option::of("[A-Z0-9-]{1,16}"),
        ) {
            let pdf = single_page_pdf(text_ops(x, y, size, DEFAULT_MARKER));
            let positions = find_marker_positions(&pdf, DEFAULT_MARKER).unwrap();
            prop_assert_eq!(positions.len(), 1);

            let out = add_qr_codes(&pdf, &positions, "https://example.com", cert.as_deref()).unwrap();
            prop_assert_eq!(get_page_count(&out).unwrap(), 1);
            prop_assert!(find_marker_positions(&out, DEFAULT_MARKER).unwrap().is_empty());
        }
    }
}

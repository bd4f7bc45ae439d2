//! End-to-end tests of the HTTP routes.

use axum::http::StatusCode;
use axum_test::multipart::{MultipartForm, Part};
use lopdf::Document;
use serde_json::Value;

use crate::common::{
    TestApp, entry_count, media_boxes, merge_form, page_content, page_text, pdf_part,
    pdf_with_pages,
};

#[tokio::test]
async fn test_merge_then_download() {
    let app = TestApp::new().await;

    let form = merge_form(vec![
        ("a.pdf", pdf_with_pages("a.pdf", &[(600.0, 900.0), (600.0, 900.0)])),
        ("b.pdf", pdf_with_pages("b.pdf", &[(400.0, 600.0)])),
    ])
    .add_text("order", r#"["b.pdf","a.pdf"]"#);

    let response = app.server.post("/merge").multipart(form).await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["pageCount"], 3);
    assert_eq!(body["normalized"], true);
    let file = body["file"].as_str().unwrap();
    assert!(file.starts_with("/download/merged-"));
    assert!(file.ends_with(".pdf"));

    let download = app.server.get(file).await;
    download.assert_status_ok();
    assert_eq!(download.header("content-type"), "application/pdf");
    let disposition = download.header("content-disposition");
    assert!(disposition.to_str().unwrap().starts_with("attachment"));

    let merged = Document::load_mem(download.as_bytes()).unwrap();
    assert_eq!(merged.get_pages().len(), 3);
    assert!(page_content(&merged, 0).contains(&page_text("b.pdf", 0)));
    assert!(page_content(&merged, 1).contains(&page_text("a.pdf", 0)));
    assert!(page_content(&merged, 2).contains(&page_text("a.pdf", 1)));

    let boxes = media_boxes(&merged);
    assert_eq!(boxes[0], [0.0, 0.0, 400.0, 600.0]);
    let scale = (595.0_f32 / 600.0).min(842.0 / 900.0);
    assert!((boxes[1][2] - 600.0 * scale).abs() < 0.01);
    assert!((boxes[1][3] - 842.0).abs() < 0.01);
}

#[tokio::test]
async fn test_routes_are_mounted_under_api() {
    let app = TestApp::new().await;

    app.server.get("/api/health").await.assert_status_ok();

    let form = merge_form(vec![
        ("one.pdf", pdf_with_pages("one", &[(612.0, 792.0)])),
        ("two.pdf", pdf_with_pages("two", &[(612.0, 792.0)])),
    ]);
    let response = app.server.post("/api/merge").multipart(form).await;
    response.assert_status_ok();

    let body: Value = response.json();
    let file = body["file"].as_str().unwrap();
    app.server
        .get(&format!("/api{file}"))
        .await
        .assert_status_ok();
}

#[tokio::test]
async fn test_health() {
    let app = TestApp::new().await;

    let response = app.server.get("/health").await;
    response.assert_status_ok();
    response.assert_json(&serde_json::json!({ "status": "ok" }));
}

#[tokio::test]
async fn test_single_file_is_rejected() {
    let app = TestApp::new().await;

    let form = merge_form(vec![("only.pdf", pdf_with_pages("only", &[(612.0, 792.0)]))]);
    let response = app.server.post("/merge").multipart(form).await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(entry_count(&app.uploads_dir()), 0);
    assert_eq!(entry_count(&app.outputs_dir()), 0);
}

#[tokio::test]
async fn test_request_without_files_is_rejected() {
    let app = TestApp::new().await;

    let form = MultipartForm::new().add_text("order", "[]");
    let response = app.server.post("/merge").multipart(form).await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert!(body["message"].as_str().is_some());
}

#[tokio::test]
async fn test_malformed_order_is_rejected() {
    let app = TestApp::new().await;

    let form = merge_form(vec![
        ("a.pdf", pdf_with_pages("a", &[(612.0, 792.0)])),
        ("b.pdf", pdf_with_pages("b", &[(612.0, 792.0)])),
    ])
    .add_text("order", "b.pdf,a.pdf");
    let response = app.server.post("/merge").multipart(form).await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(entry_count(&app.outputs_dir()), 0);
}

#[tokio::test]
async fn test_unsupported_type_is_rejected() {
    let app = TestApp::new().await;

    let form = MultipartForm::new()
        .add_part("files", pdf_part("a.pdf", pdf_with_pages("a", &[(612.0, 792.0)])))
        .add_part(
            "files",
            Part::bytes(b"plain text".to_vec())
                .file_name("notes.txt")
                .mime_type("text/plain"),
        );
    let response = app.server.post("/merge").multipart(form).await;

    response.assert_status(StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(entry_count(&app.uploads_dir()), 0);
}

#[tokio::test]
async fn test_oversized_file_is_rejected() {
    let app = TestApp::with_config(|config| {
        config.limits.max_file_bytes = 4096;
        config.limits.max_request_bytes = 16 * 1024;
    })
    .await;

    let form = merge_form(vec![
        ("a.pdf", pdf_with_pages("a", &[(612.0, 792.0)])),
        ("big.pdf", vec![b'%'; 8192]),
    ]);
    let response = app.server.post("/merge").multipart(form).await;

    response.assert_status(StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(entry_count(&app.uploads_dir()), 0);
}

#[tokio::test]
async fn test_corrupt_input_fails_cleanly() {
    let app = TestApp::new().await;

    let form = merge_form(vec![
        ("a.pdf", pdf_with_pages("a", &[(612.0, 792.0)])),
        ("broken.pdf", b"this is not a pdf".to_vec()),
    ]);
    let response = app.server.post("/merge").multipart(form).await;

    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json();
    assert_eq!(body["message"], "Error processing your request");
    assert_eq!(entry_count(&app.outputs_dir()), 0);
}

#[tokio::test]
async fn test_unknown_download_is_not_found() {
    let app = TestApp::new().await;

    let response = app.server.get("/download/missing.pdf").await;
    response.assert_status_not_found();
    response.assert_json(&serde_json::json!({ "message": "File not found" }));

    app.server
        .get("/download/..%2Fsecret.pdf")
        .await
        .assert_status_not_found();
}

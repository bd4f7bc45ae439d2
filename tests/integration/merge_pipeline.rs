//! Integration tests for the merge pipeline without the HTTP layer.

use lopdf::Document;
use printmerge::Config;
use printmerge::PrintMergeError;
use printmerge::intake::RawUpload;
use printmerge::order::OrderPolicy;
use printmerge::pipeline::{MergePipeline, MergeRequest};
use printmerge::retention::RetentionQueue;
use std::sync::Arc;
use tempfile::TempDir;

use crate::common::{entry_count, media_boxes, page_content, page_text, pdf_with_pages};

fn upload(name: &str, pages: &[(f32, f32)]) -> RawUpload {
    RawUpload {
        file_name: name.to_string(),
        content_type: Some("application/pdf".to_string()),
        data: pdf_with_pages(name, pages),
    }
}

async fn pipeline(storage: &TempDir, adjust: impl FnOnce(&mut Config)) -> MergePipeline {
    let mut config = Config::new(storage.path().join("uploads"), storage.path().join("outputs"));
    adjust(&mut config);
    let pipeline = MergePipeline::new(&config, Arc::new(RetentionQueue::new()));
    pipeline.ensure_dirs().await.unwrap();
    pipeline
}

#[tokio::test]
async fn test_fitting_pages_are_copied_verbatim() {
    let storage = TempDir::new().unwrap();
    let pipeline = pipeline(&storage, |_| {}).await;

    let artifact = pipeline
        .run(MergeRequest {
            uploads: vec![
                upload("letter.pdf", &[(612.0, 792.0)]),
                upload("small.pdf", &[(300.0, 400.0), (420.0, 595.0)]),
            ],
            order: None,
        })
        .await
        .unwrap();

    let merged = Document::load(&artifact.path).unwrap();
    assert_eq!(merged.get_pages().len(), 3);

    // Letter is wider than A4, only small.pdf fits untouched.
    assert!(!page_content(&merged, 0).starts_with("BT"));
    assert!(page_content(&merged, 1).starts_with("BT"));
    assert!(page_content(&merged, 1).contains(&page_text("small.pdf", 0)));
    assert_eq!(media_boxes(&merged)[2], [0.0, 0.0, 420.0, 595.0]);
}

#[tokio::test]
async fn test_every_page_fits_a4_after_normalization() {
    let storage = TempDir::new().unwrap();
    let pipeline = pipeline(&storage, |_| {}).await;

    let artifact = pipeline
        .run(MergeRequest {
            uploads: vec![
                upload("a3.pdf", &[(842.0, 1191.0)]),
                upload("wide.pdf", &[(1200.0, 400.0), (595.0, 842.0)]),
            ],
            order: None,
        })
        .await
        .unwrap();

    assert!(artifact.normalized);
    for page in &artifact.pages {
        assert!(page.width <= 595.0 + 0.01, "width {}", page.width);
        assert!(page.height <= 842.0 + 0.01, "height {}", page.height);
    }

    let merged = Document::load(&artifact.path).unwrap();
    for [_, _, width, height] in media_boxes(&merged) {
        assert!(width <= 595.01 && height <= 842.01);
    }
}

#[tokio::test]
async fn test_order_hint_with_unknown_and_missing_names() {
    let storage = TempDir::new().unwrap();
    let pipeline = pipeline(&storage, |_| {}).await;

    let artifact = pipeline
        .run(MergeRequest {
            uploads: vec![
                upload("first.pdf", &[(300.0, 300.0)]),
                upload("second.pdf", &[(300.0, 300.0)]),
                upload("third.pdf", &[(300.0, 300.0)]),
            ],
            order: Some(vec!["third.pdf".to_string(), "ghost.pdf".to_string()]),
        })
        .await
        .unwrap();

    let merged = Document::load(&artifact.path).unwrap();
    assert!(page_content(&merged, 0).contains(&page_text("third.pdf", 0)));
    assert!(page_content(&merged, 1).contains(&page_text("first.pdf", 0)));
    assert!(page_content(&merged, 2).contains(&page_text("second.pdf", 0)));
}

#[tokio::test]
async fn test_strict_order_rejects_unlisted_upload() {
    let storage = TempDir::new().unwrap();
    let pipeline = pipeline(&storage, |config| {
        config.order_policy = OrderPolicy::RejectUnknown;
    })
    .await;

    let err = pipeline
        .run(MergeRequest {
            uploads: vec![
                upload("a.pdf", &[(300.0, 300.0)]),
                upload("b.pdf", &[(300.0, 300.0)]),
            ],
            order: Some(vec!["a.pdf".to_string()]),
        })
        .await
        .unwrap_err();

    assert!(matches!(err, PrintMergeError::BadRequest { .. }));
    assert_eq!(entry_count(&storage.path().join("outputs")), 0);
}

#[tokio::test]
async fn test_duplicate_names_are_both_merged() {
    let storage = TempDir::new().unwrap();
    let pipeline = pipeline(&storage, |_| {}).await;

    let mut second = upload("scan.pdf", &[(300.0, 300.0), (300.0, 300.0)]);
    second.data = pdf_with_pages("second scan", &[(300.0, 300.0), (300.0, 300.0)]);

    let artifact = pipeline
        .run(MergeRequest {
            uploads: vec![upload("scan.pdf", &[(300.0, 300.0)]), second],
            order: None,
        })
        .await
        .unwrap();

    assert_eq!(artifact.page_count, 3);
    let merged = Document::load(&artifact.path).unwrap();
    assert!(page_content(&merged, 0).contains(&page_text("scan.pdf", 0)));
    assert!(page_content(&merged, 2).contains(&page_text("second scan", 1)));
}

#[tokio::test]
async fn test_consecutive_requests_produce_distinct_artifacts() {
    let storage = TempDir::new().unwrap();
    let pipeline = pipeline(&storage, |_| {}).await;

    let request = || MergeRequest {
        uploads: vec![
            upload("a.pdf", &[(300.0, 300.0)]),
            upload("b.pdf", &[(300.0, 300.0)]),
        ],
        order: None,
    };

    let first = pipeline.run(request()).await.unwrap();
    let second = pipeline.run(request()).await.unwrap();

    assert_ne!(first.file_name, second.file_name);
    assert_eq!(entry_count(&storage.path().join("outputs")), 2);
    assert_eq!(entry_count(&storage.path().join("uploads")), 2);
}

//! Integration tests for time-based cleanup of sessions and artifacts.

use chrono::{TimeDelta, Utc};
use printmerge::retention::{self, ResourceKind, RetentionPolicy, RetentionQueue};
use serde_json::Value;
use std::time::Duration;
use tempfile::TempDir;

use crate::common::{TestApp, entry_count, merge_form, pdf_with_pages};

async fn merge_two(app: &TestApp) -> String {
    let form = merge_form(vec![
        ("a.pdf", pdf_with_pages("a", &[(612.0, 792.0)])),
        ("b.pdf", pdf_with_pages("b", &[(612.0, 792.0)])),
    ]);
    let response = app.server.post("/merge").multipart(form).await;
    response.assert_status_ok();
    let body: Value = response.json();
    body["file"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_session_expires_before_artifact() {
    let app = TestApp::new().await;
    let file = merge_two(&app).await;
    assert_eq!(entry_count(&app.uploads_dir()), 1);

    let report = app.queue.sweep(Utc::now() + TimeDelta::minutes(6)).await;
    assert_eq!(report.deleted, 1);
    assert_eq!(entry_count(&app.uploads_dir()), 0);

    // Inside its own window the artifact is still served.
    app.server.get(&file).await.assert_status_ok();
}

#[tokio::test]
async fn test_expired_artifact_is_not_found() {
    let app = TestApp::new().await;
    let file = merge_two(&app).await;

    let report = app.queue.sweep(Utc::now() + TimeDelta::minutes(61)).await;
    assert_eq!(report.deleted, 2);
    assert!(app.queue.is_empty().await);
    assert_eq!(entry_count(&app.outputs_dir()), 0);

    app.server.get(&file).await.assert_status_not_found();
}

#[tokio::test]
async fn test_failed_merge_session_is_swept() {
    let app = TestApp::new().await;

    let form = merge_form(vec![
        ("a.pdf", pdf_with_pages("a", &[(612.0, 792.0)])),
        ("broken.pdf", b"garbage".to_vec()),
    ]);
    app.server
        .post("/merge")
        .multipart(form)
        .await
        .assert_status_internal_server_error();

    let pending = app.queue.pending().await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].kind, ResourceKind::SessionDir);

    app.queue.sweep(Utc::now() + TimeDelta::minutes(6)).await;
    assert_eq!(entry_count(&app.uploads_dir()), 0);
}

#[tokio::test]
async fn test_background_sweeper_removes_expired_artifact() {
    let app = TestApp::with_config(|config| {
        config.retention = RetentionPolicy::from_secs(1, 1).unwrap();
    })
    .await;
    let file = merge_two(&app).await;

    let sweeper = retention::spawn_sweeper(app.queue.clone(), Duration::from_millis(50));
    for _ in 0..100 {
        if app.queue.is_empty().await {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    sweeper.abort();

    assert!(app.queue.is_empty().await);
    assert_eq!(entry_count(&app.uploads_dir()), 0);
    app.server.get(&file).await.assert_status_not_found();
}

#[tokio::test]
async fn test_recover_schedules_leftovers_from_previous_run() {
    let storage = TempDir::new().unwrap();
    let uploads = storage.path().join("uploads");
    let outputs = storage.path().join("outputs");
    std::fs::create_dir_all(uploads.join("stale-session")).unwrap();
    std::fs::create_dir_all(&outputs).unwrap();
    std::fs::write(outputs.join("merged-old.pdf"), b"%PDF-1.5").unwrap();

    let queue = RetentionQueue::new();
    let policy = RetentionPolicy::default();
    let scheduled = retention::recover(&queue, &uploads, &outputs, &policy)
        .await
        .unwrap();
    assert_eq!(scheduled, 2);

    let report = queue.sweep(Utc::now() + TimeDelta::hours(2)).await;
    assert_eq!(report.deleted, 2);
    assert_eq!(entry_count(&uploads), 0);
    assert_eq!(entry_count(&outputs), 0);
}

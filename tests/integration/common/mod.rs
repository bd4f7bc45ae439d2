//! Shared helpers for the printmerge integration tests.
//!
//! Fixtures are generated with lopdf instead of being checked in, so each
//! test states exactly which page sizes it merges.

use axum_test::TestServer;
use axum_test::multipart::{MultipartForm, Part};
use lopdf::{Document, Object, ObjectId, Stream, dictionary};
use printmerge::Config;
use printmerge::delivery::Delivery;
use printmerge::pipeline::MergePipeline;
use printmerge::retention::RetentionQueue;
use printmerge::server::{AppState, build_router};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// Text drawn on page `index` (zero based) of a fixture named `marker`.
pub fn page_text(marker: &str, index: usize) -> String {
    format!("{marker} page {}", index + 1)
}

/// Serialize a PDF with one page per `(width, height)` entry.
///
/// Each page carries its own content stream drawing [`page_text`].
pub fn pdf_with_pages(marker: &str, pages: &[(f32, f32)]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });

    let mut kids = Vec::with_capacity(pages.len());
    for (index, (width, height)) in pages.iter().enumerate() {
        let content = format!("BT /F1 12 Tf 72 72 Td ({}) Tj ET", page_text(marker, index));
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), Object::Real(*width), Object::Real(*height)],
            "Contents" => content_id,
        });
        kids.push(Object::Reference(page_id));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => dictionary! { "Font" => dictionary! { "F1" => font_id } },
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("Failed to serialize fixture");
    bytes
}

/// A multipart `files` part holding a PDF.
pub fn pdf_part(file_name: &str, bytes: Vec<u8>) -> Part {
    Part::bytes(bytes)
        .file_name(file_name.to_string())
        .mime_type("application/pdf")
}

/// A form with one PDF part per `(name, bytes)` entry.
pub fn merge_form(files: Vec<(&str, Vec<u8>)>) -> MultipartForm {
    files
        .into_iter()
        .fold(MultipartForm::new(), |form, (name, bytes)| {
            form.add_part("files", pdf_part(name, bytes))
        })
}

/// MediaBox of every page, in page order.
pub fn media_boxes(doc: &Document) -> Vec<[f32; 4]> {
    doc.get_pages()
        .values()
        .map(|id| media_box(doc, *id))
        .collect()
}

fn media_box(doc: &Document, page_id: ObjectId) -> [f32; 4] {
    let page = doc.get_dictionary(page_id).expect("Page dictionary");
    let values = page
        .get(b"MediaBox")
        .and_then(Object::as_array)
        .expect("Page without its own MediaBox");
    let mut rect = [0.0; 4];
    for (slot, value) in rect.iter_mut().zip(values) {
        *slot = value.as_float().expect("Numeric MediaBox entry");
    }
    rect
}

/// Decoded content of page `index` (zero based).
pub fn page_content(doc: &Document, index: usize) -> String {
    let page_id = *doc
        .get_pages()
        .values()
        .nth(index)
        .expect("Page index out of range");
    let content = doc.get_page_content(page_id).expect("Page content");
    String::from_utf8_lossy(&content).into_owned()
}

/// Number of entries directly inside `dir`, 0 if it does not exist.
pub fn entry_count(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}

/// A server instance backed by temporary storage.
pub struct TestApp {
    pub server: TestServer,
    pub queue: Arc<RetentionQueue>,
    pub config: Config,
    _storage: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Start a server after adjusting the default configuration.
    pub async fn with_config(adjust: impl FnOnce(&mut Config)) -> Self {
        let storage = TempDir::new().expect("Failed to create temp dir");
        let mut config = Config::new(storage.path().join("uploads"), storage.path().join("outputs"));
        adjust(&mut config);

        let queue = Arc::new(RetentionQueue::new());
        let pipeline = MergePipeline::new(&config, Arc::clone(&queue));
        pipeline.ensure_dirs().await.expect("Failed to create storage dirs");

        let state = AppState::new(pipeline, Delivery::new(&config.outputs_dir));
        let server = TestServer::new(build_router(state)).expect("Failed to start test server");

        Self {
            server,
            queue,
            config,
            _storage: storage,
        }
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.config.uploads_dir.clone()
    }

    pub fn outputs_dir(&self) -> PathBuf {
        self.config.outputs_dir.clone()
    }
}

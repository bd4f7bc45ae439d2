//! Core PDF merging implementation.
//!
//! Pages are appended verbatim: objects of every later document are
//! renumbered past the current maximum id and moved into the first
//! document, whose page tree receives the new pages.

use chrono::{DateTime, Utc};
use lopdf::{Document, ObjectId};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::task;
use uuid::Uuid;

use crate::error::{PrintMergeError, Result};
use crate::intake::InputFile;
use crate::io::{LoadedPdf, PdfReader, PdfWriter};
use crate::merge::pages::{self, PageSize};

/// Smallest number of documents a merge accepts.
pub const MIN_MERGE_INPUTS: usize = 2;

/// The merged output document.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergedArtifact {
    /// Generated file name, unique across requests.
    pub file_name: String,

    /// Location in the outputs directory.
    #[serde(skip)]
    pub path: PathBuf,

    /// When the merge finished.
    pub created_at: DateTime<Utc>,

    /// Total number of pages.
    pub page_count: usize,

    /// Size of every page, in page order.
    pub pages: Vec<PageSize>,

    /// Whether print normalization succeeded.
    pub normalized: bool,
}

/// PDF merger that combines multiple documents.
#[derive(Debug, Clone)]
pub struct Merger {
    /// Reader for loading PDFs.
    reader: PdfReader,

    /// Writer for the merged output.
    writer: PdfWriter,
}

impl Merger {
    /// Create a merger that loads up to `jobs` inputs concurrently.
    pub fn new(jobs: usize) -> Self {
        Self {
            reader: PdfReader::new(jobs),
            writer: PdfWriter::new(),
        }
    }

    /// Merge `ordered` into a new document in `output_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Fewer than two inputs are given (`InsufficientInput`, before any I/O)
    /// - An input is unparsable, encrypted or empty (`CorruptInput`)
    /// - The output cannot be written (`Storage`)
    #[tracing::instrument(skip_all, fields(inputs = ordered.len()))]
    pub async fn merge(&self, ordered: &[InputFile], output_dir: &Path) -> Result<MergedArtifact> {
        if ordered.len() < MIN_MERGE_INPUTS {
            return Err(PrintMergeError::InsufficientInput {
                count: ordered.len(),
            });
        }

        let start = Instant::now();
        let loaded = self.reader.load_all(ordered).await?;

        let (document, pages) = task::spawn_blocking(move || {
            let document = merge_documents(loaded)?;
            let pages = pages::page_sizes(&document);
            Ok::<_, PrintMergeError>((document, pages))
        })
        .await??;

        let created_at = Utc::now();
        let file_name = artifact_name(created_at);
        let path = output_dir.join(&file_name);

        let stats = self.writer.save(document, &path).await?;

        tracing::info!(
            file = %file_name,
            pages = pages.len(),
            size = %stats.format_file_size(),
            elapsed = ?start.elapsed(),
            "Documents merged"
        );

        Ok(MergedArtifact {
            file_name,
            path,
            created_at,
            page_count: pages.len(),
            pages,
            normalized: false,
        })
    }
}

/// Generate an output file name: UTC timestamp with microseconds plus a
/// random suffix.
pub fn artifact_name(now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("merged-{}-{}.pdf", now.format("%Y%m%dT%H%M%S%6fZ"), &suffix[..12])
}

/// Concatenate loaded documents in order.
///
/// Structural problems are reported as `CorruptInput` against the document
/// being processed.
pub fn merge_documents(loaded: Vec<LoadedPdf>) -> Result<Document> {
    let expected_pages: usize = loaded.iter().map(|l| l.page_count).sum();
    let mut documents = loaded.into_iter();

    let Some(first) = documents.next() else {
        return Err(PrintMergeError::InsufficientInput { count: 0 });
    };
    let base_name = first.name;
    let mut merged = first.document;
    let base_structural =
        |e: lopdf::Error| PrintMergeError::corrupt_input(&base_name, e.to_string());
    pages::materialize_inherited(&mut merged).map_err(base_structural)?;
    let root_id = pages::appendable_root(&merged).map_err(base_structural)?;

    let mut max_id = merged.max_id;

    for loaded in documents {
        let name = loaded.name;
        let mut doc = loaded.document;
        let structural = |e: lopdf::Error| PrintMergeError::corrupt_input(&name, e.to_string());

        pages::materialize_inherited(&mut doc).map_err(structural)?;

        // Renumber objects to avoid ID conflicts
        doc.renumber_objects_with(max_id + 1);
        max_id = doc.max_id;

        let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();

        merged.objects.extend(doc.objects);
        merged.max_id = max_id;

        pages::append_pages(&mut merged, root_id, &page_ids).map_err(structural)?;
    }

    // Catalogs and page tree nodes of the appended documents are now
    // unreachable.
    merged.prune_objects();
    merged.renumber_objects();

    let page_count = merged.get_pages().len();
    if page_count != expected_pages {
        return Err(PrintMergeError::corrupt_input(
            &base_name,
            format!("page tree holds {page_count} pages, expected {expected_pages}"),
        ));
    }

    Ok(merged)
}

//! PDF reading and loading operations.
//!
//! Parsing is CPU bound, so every document is loaded on tokio's blocking
//! pool. Batches are loaded with bounded concurrency while keeping the
//! caller's order.
//!
//! # Examples
//!
//! ```no_run
//! use printmerge::io::reader::PdfReader;
//! use printmerge::intake::InputFile;
//!
//! # async fn example(inputs: Vec<InputFile>) -> Result<(), Box<dyn std::error::Error>> {
//! let reader = PdfReader::new(4);
//! let loaded = reader.load_all(&inputs).await?;
//! println!("Loaded {} documents", loaded.len());
//! # Ok(())
//! # }
//! ```

use futures::stream::{self, StreamExt, TryStreamExt};
use lopdf::Document;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::task;

use crate::error::{PrintMergeError, Result};
use crate::intake::InputFile;

/// A parsed input document.
#[derive(Debug)]
pub struct LoadedPdf {
    /// The PDF document.
    pub document: Document,

    /// Original upload name, used in error messages.
    pub name: String,

    /// Number of pages in the document.
    pub page_count: usize,

    /// Time taken to parse the document.
    pub load_time: Duration,
}

/// Loads uploaded PDFs with bounded concurrency.
#[derive(Debug, Clone)]
pub struct PdfReader {
    jobs: usize,
}

impl PdfReader {
    /// Create a reader that parses at most `jobs` documents at once.
    pub fn new(jobs: usize) -> Self {
        Self { jobs: jobs.max(1) }
    }

    /// Load a single input.
    ///
    /// # Errors
    ///
    /// Returns `CorruptInput` naming the upload if:
    /// - The file cannot be parsed as a PDF
    /// - The PDF is encrypted
    /// - The PDF has no pages
    pub async fn load(&self, input: &InputFile) -> Result<LoadedPdf> {
        let name = input.name.clone();
        let path = input.path.clone();

        task::spawn_blocking(move || load_document(&path, name)).await?
    }

    /// Load every input, preserving order.
    ///
    /// Fails on the first input that cannot be loaded; no partial result is
    /// returned.
    pub async fn load_all(&self, inputs: &[InputFile]) -> Result<Vec<LoadedPdf>> {
        let start = Instant::now();

        // Futures own their reader and input so the stream stays `Send`.
        let futures = inputs.iter().cloned().map(|input| {
            let reader = self.clone();
            async move { reader.load(&input).await }
        });

        let loaded: Vec<LoadedPdf> = stream::iter(futures)
            .buffered(self.jobs)
            .try_collect()
            .await?;

        for pdf in &loaded {
            tracing::debug!(
                file = %pdf.name,
                pages = pdf.page_count,
                elapsed = ?pdf.load_time,
                "Input parsed"
            );
        }
        tracing::debug!(
            documents = loaded.len(),
            pages = loaded.iter().map(|l| l.page_count).sum::<usize>(),
            elapsed = ?start.elapsed(),
            "Inputs loaded"
        );
        Ok(loaded)
    }
}

/// Parse one document synchronously.
fn load_document(path: &Path, name: String) -> Result<LoadedPdf> {
    let start = Instant::now();

    let document = Document::load(path).map_err(|e| {
        tracing::warn!(file = %name, path = %path.display(), error = %e, "Failed to parse input");
        PrintMergeError::corrupt_input(&name, e.to_string())
    })?;

    if document.trailer.get(b"Encrypt").is_ok() {
        return Err(PrintMergeError::corrupt_input(
            &name,
            "encrypted documents are not supported",
        ));
    }

    let page_count = document.get_pages().len();
    if page_count == 0 {
        return Err(PrintMergeError::corrupt_input(&name, "document has no pages"));
    }

    Ok(LoadedPdf {
        document,
        name,
        page_count,
        load_time: start.elapsed(),
    })
}

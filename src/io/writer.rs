//! PDF writing and saving operations.
//!
//! Documents are written to a temporary sibling file first and renamed into
//! place, so a reader never observes a half-written artifact. Streams are
//! written as they are; nothing is recompressed.
//!
//! # Examples
//!
//! ```no_run
//! use printmerge::io::writer::PdfWriter;
//! use lopdf::Document;
//! use std::path::Path;
//!
//! # async fn example(doc: Document) -> Result<(), Box<dyn std::error::Error>> {
//! let writer = PdfWriter::new();
//! let stats = writer.save(doc, Path::new("outputs/merged.pdf")).await?;
//! println!("Wrote {}", stats.format_file_size());
//! # Ok(())
//! # }
//! ```

use lopdf::Document;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::task;

use crate::error::{PrintMergeError, Result};
use crate::utils::format_file_size;

/// Options for writing PDF files.
#[derive(Debug, Clone)]
pub struct WriteOptions {
    /// Buffer size for writing (in bytes).
    pub buffer_size: usize,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            buffer_size: 64 * 1024,
        }
    }
}

/// Statistics about a write operation.
#[derive(Debug, Clone)]
pub struct WriteStatistics {
    /// Time taken to write the file.
    pub write_time: Duration,

    /// Size of the written file in bytes.
    pub file_size: u64,

    /// Path where the file was written.
    pub output_path: PathBuf,
}

impl WriteStatistics {
    /// Format file size as human-readable string.
    pub fn format_file_size(&self) -> String {
        format_file_size(self.file_size)
    }
}

/// Writes documents into place on the blocking pool.
#[derive(Debug, Clone, Default)]
pub struct PdfWriter {
    options: WriteOptions,
}

impl PdfWriter {
    /// Create a new PDF writer with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Save a document on the blocking pool.
    ///
    /// # Errors
    ///
    /// Returns a `Storage` error if the file cannot be created, written or
    /// renamed into place. The temporary file is removed in that case.
    pub async fn save(&self, doc: Document, path: &Path) -> Result<WriteStatistics> {
        let path = path.to_path_buf();
        let options = self.options.clone();

        task::spawn_blocking(move || {
            let mut doc = doc;
            write_document(&mut doc, &path, &options)
        })
        .await?
    }
}

/// Temporary path used while `path` is being written.
pub fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write `doc` to `path` synchronously, through [`temp_path_for`] and a
/// rename.
///
/// Meant to be called from inside a blocking task.
pub fn write_document(
    doc: &mut Document,
    path: &Path,
    options: &WriteOptions,
) -> Result<WriteStatistics> {
    let start = Instant::now();

    let write_path = temp_path_for(path);

    let result = write_to(doc, &write_path, options.buffer_size).and_then(|()| {
        std::fs::rename(&write_path, path)
            .map_err(|e| PrintMergeError::storage("moving the output document into place", e))
    });

    if let Err(e) = result {
        tracing::error!(path = %write_path.display(), error = %e, "Failed to write PDF");
        let _ = std::fs::remove_file(&write_path);
        return Err(e);
    }

    let file_size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
    let stats = WriteStatistics {
        write_time: start.elapsed(),
        file_size,
        output_path: path.to_path_buf(),
    };

    tracing::debug!(
        path = %path.display(),
        size = %stats.format_file_size(),
        elapsed = ?stats.write_time,
        "PDF written"
    );
    Ok(stats)
}

fn write_to(doc: &mut Document, path: &Path, buffer_size: usize) -> Result<()> {
    let file = std::fs::File::create(path)
        .map_err(|e| PrintMergeError::storage("creating the output document", e))?;

    let mut writer = std::io::BufWriter::with_capacity(buffer_size, file);

    doc.save_to(&mut writer)
        .map_err(|e| PrintMergeError::storage("writing the output document", std::io::Error::other(e)))?;

    writer
        .flush()
        .map_err(|e| PrintMergeError::storage("writing the output document", e))
}

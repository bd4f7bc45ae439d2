//! PDF I/O for printmerge.
//!
//! This module handles:
//! - Loading uploaded PDFs on the blocking pool, in order, with bounded
//!   concurrency
//! - Writing documents atomically into the outputs directory
//!
//! # Examples
//!
//! ```no_run
//! use printmerge::io::{PdfReader, PdfWriter};
//! use printmerge::intake::InputFile;
//! use std::path::Path;
//!
//! # async fn example(input: InputFile) -> Result<(), Box<dyn std::error::Error>> {
//! let loaded = PdfReader::new(1).load(&input).await?;
//! PdfWriter::new()
//!     .save(loaded.document, Path::new("outputs/copy.pdf"))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod reader;
pub mod writer;

pub use reader::{LoadedPdf, PdfReader};
pub use writer::{PdfWriter, WriteOptions, WriteStatistics, temp_path_for, write_document};

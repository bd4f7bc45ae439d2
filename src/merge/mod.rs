//! PDF merging operations.
//!
//! This module provides:
//! - Order-preserving concatenation of uploaded PDFs
//! - Page tree helpers (inherited attributes, page boxes, reparenting)
//! - Generation of unique artifact names
//!
//! # Examples
//!
//! ```no_run
//! use printmerge::merge::Merger;
//! use printmerge::intake::InputFile;
//! use std::path::Path;
//!
//! # async fn example(ordered: Vec<InputFile>) -> Result<(), Box<dyn std::error::Error>> {
//! let merger = Merger::new(4);
//! let artifact = merger.merge(&ordered, Path::new("outputs")).await?;
//! println!("Merged {} pages into {}", artifact.page_count, artifact.file_name);
//! # Ok(())
//! # }
//! ```

pub mod merger;
pub mod pages;

pub use merger::{MIN_MERGE_INPUTS, MergedArtifact, Merger, artifact_name, merge_documents};
pub use pages::{PageSize, Rect};

//! Serving finished artifacts by name.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::File;

use crate::error::{PrintMergeError, Result};

/// Resolves download names to files in the outputs directory.
#[derive(Debug, Clone)]
pub struct Delivery {
    outputs_dir: PathBuf,
}

/// An opened artifact, ready to be streamed.
#[derive(Debug)]
pub struct ArtifactHandle {
    /// Open file, positioned at the start.
    pub file: File,
    /// Requested file name.
    pub name: String,
    /// Length in bytes.
    pub size: u64,
}

impl Delivery {
    /// Serve artifacts from `outputs_dir`.
    pub fn new(outputs_dir: impl Into<PathBuf>) -> Self {
        Self {
            outputs_dir: outputs_dir.into(),
        }
    }

    /// Directory artifacts are served from.
    pub fn outputs_dir(&self) -> &Path {
        &self.outputs_dir
    }

    /// Map a requested name to a path inside the outputs directory.
    ///
    /// Only bare `.pdf` file names are served. Anything that could escape
    /// the directory, or name a temporary file, is reported as `NotFound`.
    pub fn resolve(&self, name: &str) -> Result<PathBuf> {
        let is_bare = !name.is_empty()
            && name != "."
            && name != ".."
            && !name.contains(['/', '\\', '\0', '"']);

        if !is_bare || !name.ends_with(".pdf") {
            return Err(PrintMergeError::not_found(name));
        }
        Ok(self.outputs_dir.join(name))
    }

    /// Read a whole artifact into memory.
    pub async fn fetch_artifact(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.resolve(name)?;
        tokio::fs::read(&path).await.map_err(|e| not_found_or_storage(name, e))
    }

    /// Open an artifact for streaming.
    pub async fn open_artifact(&self, name: &str) -> Result<ArtifactHandle> {
        let path = self.resolve(name)?;
        let file = File::open(&path)
            .await
            .map_err(|e| not_found_or_storage(name, e))?;
        let metadata = file
            .metadata()
            .await
            .map_err(|e| PrintMergeError::storage("reading artifact metadata", e))?;

        if !metadata.is_file() {
            return Err(PrintMergeError::not_found(name));
        }

        Ok(ArtifactHandle {
            file,
            name: name.to_string(),
            size: metadata.len(),
        })
    }
}

fn not_found_or_storage(name: &str, e: std::io::Error) -> PrintMergeError {
    if e.kind() == ErrorKind::NotFound {
        PrintMergeError::not_found(name)
    } else {
        PrintMergeError::storage("reading the artifact", e)
    }
}

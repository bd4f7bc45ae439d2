//! Per-request upload sessions.
//!
//! Every merge request gets its own directory under the uploads root, named
//! after a random [`SessionId`]. Concurrent requests never share a session
//! directory, so their inputs cannot collide.

use chrono::{DateTime, Utc};
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{PrintMergeError, Result};
use crate::intake::InputFile;

/// Opaque, globally unique identifier of an upload session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Allocate a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// The filesystem-scoped lifetime of one merge request's raw inputs.
#[derive(Debug, Clone)]
pub struct UploadSession {
    /// Session identifier.
    pub id: SessionId,

    /// Directory holding the session's uploads.
    pub root: PathBuf,

    /// Accepted uploads, in upload order.
    pub files: Vec<InputFile>,

    /// When the session was created.
    pub created_at: DateTime<Utc>,
}

impl UploadSession {
    /// Total bytes accepted into this session so far.
    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }
}

/// Allocates and removes session directories under a common root.
#[derive(Debug, Clone)]
pub struct SessionStore {
    root: PathBuf,
}

impl SessionStore {
    /// Create a store rooted at `root`. No I/O happens until
    /// [`ensure_root`](Self::ensure_root) or
    /// [`create_session`](Self::create_session).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory all session directories live in.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the uploads root if it does not exist yet.
    pub async fn ensure_root(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| PrintMergeError::storage("creating the uploads directory", e))
    }

    /// Allocate a fresh session with an empty directory.
    ///
    /// # Errors
    ///
    /// Returns a `Storage` error if the directory cannot be created
    /// (permissions, disk full).
    #[tracing::instrument(skip(self))]
    pub async fn create_session(&self) -> Result<UploadSession> {
        let id = SessionId::new();
        let root = self.session_path(&id);

        tokio::fs::create_dir_all(&root).await.map_err(|e| {
            tracing::error!(path = %root.display(), error = %e, "Failed to create session directory");
            PrintMergeError::storage("creating the session directory", e)
        })?;

        tracing::debug!(session = %id, "Session created");

        Ok(UploadSession {
            id,
            root,
            files: Vec::new(),
            created_at: Utc::now(),
        })
    }

    /// Directory of the given session. Pure path derivation, no I/O.
    pub fn session_path(&self, id: &SessionId) -> PathBuf {
        self.root.join(id.to_string())
    }

    /// Recursively remove a session directory.
    ///
    /// Removing a session that is already gone is not an error.
    pub async fn destroy_session(&self, id: &SessionId) -> Result<()> {
        let path = self.session_path(id);
        match tokio::fs::remove_dir_all(&path).await {
            Ok(()) => {
                tracing::debug!(session = %id, "Session removed");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PrintMergeError::storage("removing the session directory", e)),
        }
    }
}

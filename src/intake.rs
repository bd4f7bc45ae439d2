//! Upload intake: type and size validation, persistence into a session.
//!
//! Clients are expected to filter file types before uploading, but nothing
//! here relies on that. Every upload is re-checked against the allow-list
//! and the size limits before a single byte reaches the session directory.

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{PrintMergeError, Result};
use crate::session::UploadSession;

const DEFAULT_MAX_FILE_BYTES: u64 = 50 * 1024 * 1024;
const DEFAULT_MAX_REQUEST_BYTES: u64 = 200 * 1024 * 1024;
const MAX_FILE_NAME_LENGTH: usize = 255;

/// Document kinds on the upload allow-list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    /// Portable Document Format.
    Pdf,
    /// JPEG image.
    Jpeg,
    /// PNG image.
    Png,
    /// Office Open XML word-processing document.
    Docx,
}

impl DocumentKind {
    /// Every allow-listed kind.
    pub const ALL: [DocumentKind; 4] = [Self::Pdf, Self::Jpeg, Self::Png, Self::Docx];

    /// Canonical MIME type.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
        }
    }

    /// Match a declared MIME type. Parameters (`; charset=...`) are ignored
    /// and the comparison is case-insensitive.
    pub fn from_mime(content_type: &str) -> Option<Self> {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or(content_type)
            .trim()
            .to_ascii_lowercase();

        match essence.as_str() {
            "image/jpg" => Some(Self::Jpeg),
            _ => Self::ALL.into_iter().find(|k| k.mime_type() == essence),
        }
    }

    /// Match a file name by its extension.
    pub fn from_extension(file_name: &str) -> Option<Self> {
        let extension = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())?
            .to_ascii_lowercase();

        match extension.as_str() {
            "pdf" => Some(Self::Pdf),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "docx" => Some(Self::Docx),
            _ => None,
        }
    }

    /// Whether the merge engine can consume this kind without conversion.
    pub fn is_mergeable(&self) -> bool {
        matches!(self, Self::Pdf)
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pdf => "PDF",
            Self::Jpeg => "JPEG",
            Self::Png => "PNG",
            Self::Docx => "DOCX",
        };
        f.write_str(name)
    }
}

/// Per-file and per-request upload size limits, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadLimits {
    /// Largest accepted single file.
    pub max_file_bytes: u64,
    /// Largest accepted sum of all files in one request.
    pub max_request_bytes: u64,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            max_request_bytes: DEFAULT_MAX_REQUEST_BYTES,
        }
    }
}

impl UploadLimits {
    /// Check a (possibly partial) file size and the running request total.
    ///
    /// Called while a body is still streaming in, so oversized uploads are
    /// refused before anything is persisted.
    pub fn check(&self, file_name: &str, file_bytes: u64, request_bytes: u64) -> Result<()> {
        if file_bytes > self.max_file_bytes {
            return Err(PrintMergeError::payload_too_large(
                file_name,
                self.max_file_bytes,
            ));
        }
        if request_bytes > self.max_request_bytes {
            return Err(PrintMergeError::payload_too_large(
                "request",
                self.max_request_bytes,
            ));
        }
        Ok(())
    }
}

/// A file payload as received from the client.
#[derive(Debug, Clone)]
pub struct RawUpload {
    /// File name declared by the client.
    pub file_name: String,
    /// MIME type declared by the client, if any.
    pub content_type: Option<String>,
    /// File contents.
    pub data: Vec<u8>,
}

/// An upload persisted inside a session directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InputFile {
    /// Original file name; the join key for reordering.
    pub name: String,
    /// Absolute location of the stored copy.
    #[serde(skip)]
    pub path: PathBuf,
    /// Declared document kind.
    pub kind: DocumentKind,
    /// Size in bytes.
    pub size: u64,
}

/// Decide the document kind of an upload and make sure it can be merged.
///
/// The declared MIME type wins; when it is missing or the generic
/// `application/octet-stream`, the file extension decides.
///
/// # Errors
///
/// Returns `UnsupportedType` if the type is not on the allow-list, or if it
/// is allow-listed but needs a format conversion the service does not
/// perform.
pub fn classify(file_name: &str, content_type: Option<&str>) -> Result<DocumentKind> {
    let declared = content_type
        .map(str::trim)
        .filter(|ct| !ct.is_empty() && !ct.eq_ignore_ascii_case("application/octet-stream"));

    let kind = match declared {
        Some(ct) => DocumentKind::from_mime(ct).ok_or_else(|| {
            PrintMergeError::unsupported_type(
                file_name,
                format!("{ct} is not one of PDF, JPEG, PNG or DOCX"),
            )
        })?,
        None => DocumentKind::from_extension(file_name).ok_or_else(|| {
            PrintMergeError::unsupported_type(file_name, "unrecognized file extension")
        })?,
    };

    if !kind.is_mergeable() {
        return Err(PrintMergeError::unsupported_type(
            file_name,
            format!("{kind} files must be converted to PDF before merging"),
        ));
    }

    Ok(kind)
}

/// Reduce a client-supplied name to a safe final path component.
///
/// # Errors
///
/// Returns `BadRequest` for names that are empty or only `.`/`..`.
pub fn sanitize_file_name(file_name: &str) -> Result<String> {
    let last = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(file_name)
        .trim();

    if last.is_empty() || last == "." || last == ".." {
        return Err(PrintMergeError::bad_request(format!(
            "Invalid file name: '{file_name}'"
        )));
    }

    Ok(last
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_FILE_NAME_LENGTH)
        .collect())
}

/// Validate an upload and write it verbatim into the session directory.
///
/// # Errors
///
/// Returns:
/// - `UnsupportedType` if the type is not accepted
/// - `PayloadTooLarge` if the file or the session total exceeds the limits
/// - `BadRequest` if the file name is unusable
/// - `Storage` if the write fails (the partial file is removed)
#[tracing::instrument(skip_all, fields(session = %session.id, file = %raw.file_name))]
pub async fn accept_upload(
    session: &mut UploadSession,
    raw: RawUpload,
    limits: &UploadLimits,
) -> Result<InputFile> {
    let kind = classify(&raw.file_name, raw.content_type.as_deref())?;
    let name = sanitize_file_name(&raw.file_name)?;

    let size = raw.data.len() as u64;
    limits.check(&name, size, session.total_bytes().saturating_add(size))?;

    let path = unique_path(session, &name);
    if let Err(e) = tokio::fs::write(&path, &raw.data).await {
        tracing::error!(path = %path.display(), error = %e, "Failed to persist upload");
        let _ = tokio::fs::remove_file(&path).await;
        return Err(PrintMergeError::storage("saving an upload", e));
    }

    tracing::debug!(size, %kind, "Upload accepted");

    let input = InputFile {
        name: raw.file_name,
        path,
        kind,
        size,
    };
    session.files.push(input.clone());

    Ok(input)
}

/// Pick a storage path for `name` that no earlier upload of the session uses.
fn unique_path(session: &UploadSession, name: &str) -> PathBuf {
    let taken = |candidate: &Path| session.files.iter().any(|f| f.path.as_path() == candidate);

    let first = session.root.join(name);
    if !taken(first.as_path()) {
        return first;
    }

    let as_path = Path::new(name);
    let stem = as_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(name);
    let extension = as_path.extension().and_then(|e| e.to_str());

    (1..)
        .map(|n| {
            let candidate = match extension {
                Some(ext) => format!("{stem} ({n}).{ext}"),
                None => format!("{stem} ({n})"),
            };
            session.root.join(candidate)
        })
        .find(|candidate| !taken(candidate.as_path()))
        .unwrap_or(first)
}

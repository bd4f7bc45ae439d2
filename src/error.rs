//! Error types for printmerge.
//!
//! Every stage of the merge pipeline reports failures through
//! [`PrintMergeError`]. Variants fall into two groups:
//!
//! - **Validation errors**: unsupported type, oversized payload, too few
//!   files, malformed requests. These are caught before any expensive work and
//!   are reported to the client as 4xx responses.
//! - **Engine and storage errors**: unparsable documents, normalization
//!   failures, filesystem failures. These are reported as 500 responses.
//!
//! Display text never contains absolute paths. Paths are attached to log
//! events instead.

use std::io;

/// Result type alias for printmerge operations.
pub type Result<T> = std::result::Result<T, PrintMergeError>;

/// Main error type for printmerge operations.
#[derive(Debug, thiserror::Error)]
pub enum PrintMergeError {
    /// The declared document type is not accepted.
    #[error("Unsupported file type for '{file_name}': {reason}")]
    UnsupportedType {
        /// Original name of the rejected upload.
        file_name: String,
        /// Why the type was rejected.
        reason: String,
    },

    /// A single file or the whole request exceeded its size limit.
    #[error("Payload too large: {subject} exceeds the {limit_mb} MB limit")]
    PayloadTooLarge {
        /// What exceeded the limit (a file name or "request").
        subject: String,
        /// The limit that was exceeded, in megabytes.
        limit_mb: u64,
    },

    /// The request carried no files at all.
    #[error("No files were uploaded")]
    NoFiles,

    /// Fewer than two documents were supplied for merging.
    #[error("At least 2 documents are required for merging, got {count}")]
    InsufficientInput {
        /// Number of documents supplied.
        count: usize,
    },

    /// The request itself was malformed.
    #[error("Bad request: {message}")]
    BadRequest {
        /// Description of what is wrong with the request.
        message: String,
    },

    /// An input could not be parsed as a document of its declared kind.
    #[error("Could not read '{file_name}' as a PDF document: {details}")]
    CorruptInput {
        /// Original name of the offending upload.
        file_name: String,
        /// Parser diagnostics.
        details: String,
    },

    /// Post-merge print normalization failed.
    #[error("Failed to optimize merged document for printing: {reason}")]
    Optimization {
        /// Description of what went wrong.
        reason: String,
    },

    /// A filesystem operation failed.
    #[error("Storage failure while {operation}: {source}")]
    Storage {
        /// What the service was doing when the failure happened.
        operation: &'static str,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The requested artifact does not exist or has expired.
    #[error("File not found: {name}")]
    NotFound {
        /// Requested file name.
        name: String,
    },

    /// Invalid configuration.
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        /// Description of what's wrong with the configuration.
        message: String,
    },

    /// A blocking worker task panicked or was cancelled.
    #[error("Background task failed: {reason}")]
    Task {
        /// Description of the failure.
        reason: String,
    },
}

impl From<tokio::task::JoinError> for PrintMergeError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Task {
            reason: err.to_string(),
        }
    }
}

impl PrintMergeError {
    /// Create an UnsupportedType error.
    pub fn unsupported_type(file_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnsupportedType {
            file_name: file_name.into(),
            reason: reason.into(),
        }
    }

    /// Create a PayloadTooLarge error from a byte limit.
    pub fn payload_too_large(subject: impl Into<String>, limit_bytes: u64) -> Self {
        Self::PayloadTooLarge {
            subject: subject.into(),
            limit_mb: limit_bytes / (1024 * 1024),
        }
    }

    /// Create a BadRequest error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    /// Create a CorruptInput error.
    pub fn corrupt_input(file_name: impl Into<String>, details: impl Into<String>) -> Self {
        Self::CorruptInput {
            file_name: file_name.into(),
            details: details.into(),
        }
    }

    /// Create an Optimization error.
    pub fn optimization(reason: impl Into<String>) -> Self {
        Self::Optimization {
            reason: reason.into(),
        }
    }

    /// Create a Storage error.
    pub fn storage(operation: &'static str, source: io::Error) -> Self {
        Self::Storage { operation, source }
    }

    /// Create a NotFound error.
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }

    /// Create an InvalidConfig error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Check if this error was caused by the client's request.
    ///
    /// Client errors are reported before any expensive work happens and
    /// never indicate a fault in the service.
    pub fn is_client_error(&self) -> bool {
        self.status_code() < 500
    }

    /// HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::UnsupportedType { .. } => 415,
            Self::PayloadTooLarge { .. } => 413,
            Self::NoFiles => 400,
            Self::InsufficientInput { .. } => 400,
            Self::BadRequest { .. } => 400,
            Self::NotFound { .. } => 404,
            Self::CorruptInput { .. } => 500,
            Self::Optimization { .. } => 500,
            Self::Storage { .. } => 500,
            Self::InvalidConfig { .. } => 500,
            Self::Task { .. } => 500,
        }
    }

    /// Stable machine-readable code, used in logs.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::UnsupportedType { .. } => "unsupported_type",
            Self::PayloadTooLarge { .. } => "payload_too_large",
            Self::NoFiles => "no_files",
            Self::InsufficientInput { .. } => "insufficient_input",
            Self::BadRequest { .. } => "bad_request",
            Self::CorruptInput { .. } => "corrupt_input",
            Self::Optimization { .. } => "optimization_failed",
            Self::Storage { .. } => "storage_failure",
            Self::NotFound { .. } => "not_found",
            Self::InvalidConfig { .. } => "invalid_config",
            Self::Task { .. } => "task_failed",
        }
    }
}

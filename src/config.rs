//! Configuration module for printmerge.
//!
//! This module turns CLI arguments (or their environment fallbacks) into a
//! validated [`Config`] that drives the server and the merge pipeline. It
//! handles:
//! - Unit conversion (megabytes, seconds)
//! - Validation of limit and retention combinations
//! - Application of defaults

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::cli::Cli;
use crate::error::{PrintMergeError, Result};
use crate::intake::UploadLimits;
use crate::order::OrderPolicy;
use crate::retention::RetentionPolicy;

const MEGABYTE: u64 = 1024 * 1024;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Single-line human readable output.
    #[default]
    Compact,
    /// One JSON object per event.
    Json,
}

impl FromStr for LogFormat {
    type Err = PrintMergeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            _ => Err(PrintMergeError::invalid_config(format!(
                "Invalid log format: {s}. Must be one of: compact, json"
            ))),
        }
    }
}

/// Complete configuration for a printmerge server.
#[derive(Debug, Clone)]
pub struct Config {
    /// Socket address the HTTP listener binds to.
    pub listen_addr: String,

    /// Root directory for per-session upload directories.
    pub uploads_dir: PathBuf,

    /// Directory merged artifacts are written to.
    pub outputs_dir: PathBuf,

    /// Upload size limits.
    pub limits: UploadLimits,

    /// How long sessions and artifacts are kept.
    pub retention: RetentionPolicy,

    /// Interval between retention sweeps.
    pub sweep_interval: Duration,

    /// Number of inputs parsed concurrently (None = auto-detect).
    pub load_jobs: Option<usize>,

    /// How uploads missing from the order hint are handled.
    pub order_policy: OrderPolicy,

    /// Log output format.
    pub log_format: LogFormat,
}

impl Config {
    /// Create a configuration with default limits and retention windows for
    /// the given storage directories.
    pub fn new(uploads_dir: impl Into<PathBuf>, outputs_dir: impl Into<PathBuf>) -> Self {
        Self {
            listen_addr: "0.0.0.0:5000".to_string(),
            uploads_dir: uploads_dir.into(),
            outputs_dir: outputs_dir.into(),
            limits: UploadLimits::default(),
            retention: RetentionPolicy::default(),
            sweep_interval: Duration::from_secs(15),
            load_jobs: None,
            order_policy: OrderPolicy::default(),
            log_format: LogFormat::default(),
        }
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - A size limit or the sweep interval is zero
    /// - The per-file limit exceeds the per-request limit
    /// - The artifact retention window is shorter than the session window
    /// - The job count is zero
    pub fn validate(&self) -> Result<()> {
        if self.limits.max_file_bytes == 0 || self.limits.max_request_bytes == 0 {
            return Err(PrintMergeError::invalid_config(
                "Upload size limits must be greater than zero",
            ));
        }

        if self.limits.max_file_bytes > self.limits.max_request_bytes {
            return Err(PrintMergeError::invalid_config(
                "Per-file size limit cannot exceed the per-request limit",
            ));
        }

        if self.sweep_interval.is_zero() {
            return Err(PrintMergeError::invalid_config(
                "Sweep interval must be at least one second",
            ));
        }

        if self.retention.artifact < self.retention.session {
            return Err(PrintMergeError::invalid_config(
                "Artifact retention cannot be shorter than session retention",
            ));
        }

        if let Some(jobs) = self.load_jobs
            && jobs == 0
        {
            return Err(PrintMergeError::invalid_config(
                "Number of load jobs must be at least 1",
            ));
        }

        Ok(())
    }

    /// Get the effective number of concurrent document loads.
    ///
    /// Returns the configured job count, or the number of CPU cores if auto-detect.
    pub fn effective_jobs(&self) -> usize {
        self.load_jobs.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }
}

impl TryFrom<&Cli> for Config {
    type Error = PrintMergeError;

    fn try_from(cli: &Cli) -> Result<Self> {
        let retention =
            RetentionPolicy::from_secs(cli.session_retention_secs, cli.artifact_retention_secs)?;

        let order_policy = if cli.strict_order {
            OrderPolicy::RejectUnknown
        } else {
            OrderPolicy::AppendUnknown
        };

        let config = Self {
            listen_addr: format!("{}:{}", cli.host, cli.port),
            uploads_dir: cli.uploads_dir.clone(),
            outputs_dir: cli.outputs_dir.clone(),
            limits: UploadLimits {
                max_file_bytes: cli.max_file_mb.saturating_mul(MEGABYTE),
                max_request_bytes: cli.max_request_mb.saturating_mul(MEGABYTE),
            },
            retention,
            sweep_interval: Duration::from_secs(cli.sweep_interval_secs),
            load_jobs: cli.load_jobs,
            order_policy,
            log_format: LogFormat::from_str(&cli.log_format)?,
        };

        config.validate()?;
        Ok(config)
    }
}

//! Command-line interface for the printmerge server.
//!
//! Every option can also be supplied through an environment variable, which
//! is how the service is usually configured inside a container.
//!
//! # Examples
//!
//! ```no_run
//! use printmerge::cli::Cli;
//! use clap::Parser;
//!
//! let cli = Cli::parse();
//! println!("Listening on port {}", cli.port);
//! ```

use clap::Parser;
use std::path::PathBuf;

/// Merge uploaded documents into a single print-ready PDF.
///
/// printmerge accepts PDF uploads over HTTP, merges them in the order the
/// client asks for, shrinks oversized pages to A4, and serves the result
/// for a limited time before deleting it.
#[derive(Parser, Debug, Clone)]
#[command(name = "printmerge")]
#[command(version)]
#[command(about = "Merge uploaded documents into a single print-ready PDF", long_about = None)]
#[command(author)]
pub struct Cli {
    /// Address to bind the HTTP listener to
    #[arg(long, env = "HOST", default_value = "0.0.0.0", value_name = "ADDR")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = 5000)]
    pub port: u16,

    /// Directory holding one sub-directory per upload session
    #[arg(long, env = "UPLOADS_DIR", default_value = "uploads", value_name = "DIR")]
    pub uploads_dir: PathBuf,

    /// Directory merged documents are written to and served from
    #[arg(long, env = "OUTPUTS_DIR", default_value = "outputs", value_name = "DIR")]
    pub outputs_dir: PathBuf,

    /// Maximum size of a single uploaded file, in megabytes
    #[arg(long, env = "MAX_FILE_MB", default_value_t = 50, value_name = "MB")]
    pub max_file_mb: u64,

    /// Maximum combined size of all files in one merge request, in megabytes
    #[arg(long, env = "MAX_REQUEST_MB", default_value_t = 200, value_name = "MB")]
    pub max_request_mb: u64,

    /// Seconds to keep a session's uploaded inputs after the merge
    #[arg(long, env = "SESSION_RETENTION_SECS", default_value_t = 300, value_name = "SECS")]
    pub session_retention_secs: u64,

    /// Seconds to keep a merged document available for download
    #[arg(long, env = "ARTIFACT_RETENTION_SECS", default_value_t = 3600, value_name = "SECS")]
    pub artifact_retention_secs: u64,

    /// Seconds between two sweeps of the retention queue
    #[arg(long, env = "SWEEP_INTERVAL_SECS", default_value_t = 15, value_name = "SECS")]
    pub sweep_interval_secs: u64,

    /// Number of input documents parsed concurrently (default: CPU count)
    #[arg(short = 'j', long, env = "LOAD_JOBS", value_name = "N")]
    pub load_jobs: Option<usize>,

    /// Reject uploads whose name is missing from the client's order list
    ///
    /// By default such files are appended after the ordered ones, in upload
    /// order.
    #[arg(long, env = "STRICT_ORDER")]
    pub strict_order: bool,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", default_value = "compact", value_name = "FORMAT")]
    #[arg(value_parser = ["compact", "json"])]
    pub log_format: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["printmerge"]).unwrap();
        assert_eq!(cli.max_file_mb, 50);
        assert_eq!(cli.session_retention_secs, 300);
        assert_eq!(cli.artifact_retention_secs, 3600);
        assert!(!cli.strict_order);
        assert_eq!(cli.log_format, "compact");
    }

    #[test]
    fn test_overrides() {
        let cli = Cli::try_parse_from([
            "printmerge",
            "--port",
            "8080",
            "--uploads-dir",
            "/srv/uploads",
            "--strict-order",
            "--log-format",
            "json",
            "-j",
            "2",
        ])
        .unwrap();
        assert_eq!(cli.port, 8080);
        assert_eq!(cli.uploads_dir, PathBuf::from("/srv/uploads"));
        assert!(cli.strict_order);
        assert_eq!(cli.log_format, "json");
        assert_eq!(cli.load_jobs, Some(2));
    }

    #[test]
    fn test_rejects_unknown_log_format() {
        assert!(Cli::try_parse_from(["printmerge", "--log-format", "xml"]).is_err());
    }
}

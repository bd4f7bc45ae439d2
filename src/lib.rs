//! printmerge: an HTTP service that merges uploaded PDF documents into a
//! single print-ready file.
//!
//! A merge request uploads two or more PDFs. They are stored in a private
//! session directory, put into the client's requested order, concatenated,
//! and scaled down page by page so every page fits an A4 sheet. The result
//! is kept in the outputs directory for download until its retention window
//! runs out.

pub mod cli;
pub mod config;
pub mod delivery;
mod error;
pub use error::*;
pub mod intake;
pub mod io;
pub mod merge;
pub mod normalize;
pub mod order;
pub mod pipeline;
pub mod retention;
pub mod server;
pub mod session;
pub mod telemetry;
pub(crate) mod utils;

pub use config::Config;

use anyhow::Context;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::{
    cli::Cli,
    delivery::Delivery,
    pipeline::MergePipeline,
    retention::RetentionQueue,
    server::AppState,
};

/// Crate version, reported at startup.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Start the server and run until shutdown.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::try_from(&cli)?;
    telemetry::init_tracing(config.log_format)?;

    tracing::info!(
        version = VERSION,
        uploads = %config.uploads_dir.display(),
        outputs = %config.outputs_dir.display(),
        max_file = %utils::format_file_size(config.limits.max_file_bytes),
        max_request = %utils::format_file_size(config.limits.max_request_bytes),
        "Starting printmerge"
    );

    let queue = Arc::new(RetentionQueue::new());
    let pipeline = MergePipeline::new(&config, Arc::clone(&queue));
    pipeline.ensure_dirs().await?;

    retention::recover(
        &queue,
        &config.uploads_dir,
        &config.outputs_dir,
        &config.retention,
    )
    .await?;
    let sweeper = retention::spawn_sweeper(Arc::clone(&queue), config.sweep_interval);

    let state = AppState::new(pipeline, Delivery::new(&config.outputs_dir));
    let app = server::build_router(state);

    let listener = TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;

    let served = server::serve(listener, app).await;
    sweeper.abort();
    served.context("Server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

//! HTTP surface of printmerge.
//!
//! Every route is served at the root and again under `/api`:
//!
//! | method | path | handler |
//! |---|---|---|
//! | `POST` | `/merge` | [`handlers::merge`] |
//! | `GET` | `/download/{filename}` | [`handlers::download`] |
//! | `GET` | `/health` | [`handlers::health`] |

pub mod error;
pub mod handlers;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::delivery::Delivery;
use crate::intake::UploadLimits;
use crate::pipeline::MergePipeline;

/// Room for multipart boundaries and part headers on top of the file bytes.
const MULTIPART_OVERHEAD: u64 = 1024 * 1024;

/// Shared handler state.
#[derive(Debug, Clone)]
pub struct AppState {
    pub pipeline: Arc<MergePipeline>,
    pub delivery: Delivery,
}

impl AppState {
    /// Wrap a pipeline and a delivery endpoint for sharing across handlers.
    pub fn new(pipeline: MergePipeline, delivery: Delivery) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            delivery,
        }
    }
}

/// Build the application router.
pub fn build_router(state: AppState) -> Router {
    let body_limit = body_limit(state.pipeline.limits());

    let routes = Router::new()
        .route("/merge", post(handlers::merge))
        .route("/download/{filename}", get(handlers::download))
        .route("/health", get(handlers::health));

    Router::new()
        .merge(routes.clone())
        .nest("/api", routes)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn body_limit(limits: &UploadLimits) -> usize {
    usize::try_from(limits.max_request_bytes.saturating_add(MULTIPART_OVERHEAD))
        .unwrap_or(usize::MAX)
}

/// Serve `app` until Ctrl+C or SIGTERM.
pub async fn serve(listener: TcpListener, app: Router) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "Server ready and accepting connections");
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal");
        },
    }

    tracing::info!("Shutting down gracefully...");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_limit_adds_overhead() {
        let limits = UploadLimits {
            max_file_bytes: 10,
            max_request_bytes: 100,
        };
        assert_eq!(body_limit(&limits), 100 + 1024 * 1024);
    }
}

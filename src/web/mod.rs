mod admin;
pub mod error;
pub mod identity;
mod routes;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::http::Method;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::{Config, PreviewMode};
use crate::db::Database;
use crate::preview::{LocalPreviewService, PreviewService, RemotePreviewService};
use crate::s3::ObjectStore;

const CORS_MAX_AGE_SECS: u64 = 86400;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Arc<Config>,
    /// In-process extractor behind `/preview/extract` and archive inspection.
    pub extractor: Arc<LocalPreviewService>,
    /// What the batch coordinator calls: the local extractor or a remote one.
    pub batch_previews: Arc<dyn PreviewService>,
}

impl AppState {
    /// Wire up preview services according to `config.preview_mode`.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be built or remote mode has
    /// no service URL.
    pub fn new(config: Config, db: Database, store: Arc<dyn ObjectStore>) -> Result<Self> {
        let extractor = Arc::new(LocalPreviewService::from_config(&config, db.clone(), store)?);

        let batch_previews: Arc<dyn PreviewService> = match config.preview_mode {
            PreviewMode::Local => extractor.clone(),
            PreviewMode::Remote => {
                let url = config
                    .preview_service_url
                    .clone()
                    .context("PREVIEW_SERVICE_URL is required in remote preview mode")?;
                info!(url = %url, "Batch previews delegated to remote extractor");
                Arc::new(RemotePreviewService::new(url, config.preview_service_timeout)?)
            }
        };

        Ok(Self {
            db,
            config: Arc::new(config),
            extractor,
            batch_previews,
        })
    }
}

/// Build the application router with CORS and request tracing.
///
/// The CORS layer answers every `OPTIONS` request itself with an empty 200,
/// so handlers never see one.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .max_age(Duration::from_secs(CORS_MAX_AGE_SECS));

    Router::new()
        .merge(routes::router())
        .merge(admin::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the web server and run until a shutdown signal arrives.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn serve(state: AppState) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", state.config.web_host, state.config.web_port)
        .parse()
        .context("Invalid web server address")?;

    let app = router(state);

    info!(addr = %addr, "Starting HTTP web server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind web server")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Web server error")?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
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
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}

//! Application startup and lifecycle management.

use crate::config::DashboardConfig;
use crate::handlers;
use crate::middleware::authenticate;
use crate::services::{
    DashboardService, FileStore, HistoryStore, HttpInferenceClient, InferenceClient,
    LocalFileStore, Stores, TokenService,
};
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use service_core::error::AppError;
use service_core::middleware::{metrics_middleware, request_id_middleware};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Room for multipart boundaries and part headers on top of the file itself.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: DashboardConfig,
    pub tokens: TokenService,
    pub dashboard: Arc<DashboardService>,
    pub history: Arc<dyn HistoryStore>,
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
}

impl Application {
    /// Build the application, connecting the history backend named in `config`.
    pub async fn build(config: DashboardConfig) -> Result<Self, AppError> {
        let stores = Stores::from_config(&config.persistence).await.map_err(|e| {
            tracing::error!("Failed to initialize usage history: {}", e);
            e
        })?;

        Self::build_with_stores(config, stores).await
    }

    /// Build the application on top of already-constructed stores.
    pub async fn build_with_stores(
        config: DashboardConfig,
        stores: Stores,
    ) -> Result<Self, AppError> {
        let files: Arc<dyn FileStore> = Arc::new(
            LocalFileStore::new(&config.storage.upload_dir)
                .await
                .map_err(|e| {
                    tracing::error!(
                        "Failed to initialize upload directory at {}: {}",
                        config.storage.upload_dir.display(),
                        e
                    );
                    e
                })?,
        );

        let inference: Arc<dyn InferenceClient> =
            Arc::new(HttpInferenceClient::new(config.inference.timeout())?);

        tracing::info!(
            image_url = %config.inference.image.url,
            image_host = %config.inference.image.host,
            text_url = %config.inference.text.url,
            text_host = %config.inference.text.host,
            timeout_secs = config.inference.timeout_secs,
            "Initialized inference client"
        );

        let history = stores.history.clone();
        let dashboard = DashboardService::new(config.inference.clone(), inference, files, stores);

        let state = AppState {
            tokens: TokenService::new(&config.auth.jwt_secret),
            config: config.clone(),
            dashboard: Arc::new(dashboard),
            history,
        };

        let router = router(state);

        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind TCP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(
            prefix = %config.route_prefix,
            "Dashboard service listening on port {}",
            port
        );

        Ok(Self {
            port,
            listener,
            router,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        axum::serve(self.listener, self.router).await
    }

    /// Serve until `signal` resolves, then drain in-flight requests.
    pub async fn run_with_shutdown<F>(self, signal: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(signal)
            .await
    }
}

fn router(state: AppState) -> Router {
    let body_limit = state.config.storage.max_upload_bytes + MULTIPART_OVERHEAD_BYTES;

    let dashboard = Router::new()
        .route("/usage-stats", get(handlers::usage_stats))
        .route("/image-class", post(handlers::image_class))
        .route("/text-summary", post(handlers::text_summary))
        .route_layer(axum::middleware::from_fn_with_state(
            state.tokens.clone(),
            authenticate,
        ));

    let operational = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_endpoint));

    let prefix = state.config.route_prefix.trim_end_matches('/').to_string();
    let app = if prefix.is_empty() {
        operational.merge(dashboard)
    } else {
        operational.nest(&prefix, dashboard)
    };

    app.layer(DefaultBodyLimit::max(body_limit))
        .layer(axum::middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(request_id_middleware))
        .with_state(state)
}

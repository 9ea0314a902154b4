//! Read-only HTTP API over the simulator's latest reading.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anomaly_detector::AnomalyScorer;
use anyhow::Context;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json, Router,
};
use reading_store::SharedReadingStore;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use vitals_core::telemetry::init_tracing;
use vitals_core::Settings;

mod vitals_routes;

pub use vitals_routes::{AnomalyResponse, HealthResponse, VersionResponse, VitalsResponse};

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub store: Arc<SharedReadingStore>,
    pub scorer: Arc<AnomalyScorer>,
}

impl AppState {
    pub fn from_settings(settings: Settings) -> Self {
        Self {
            store: Arc::new(SharedReadingStore::from_settings(&settings)),
            scorer: Arc::new(AnomalyScorer::from_settings(&settings)),
            settings: Arc::new(settings),
        }
    }
}

/// Error type for handlers: a status code plus a JSON
/// `{ "success": false, "error": ... }` body.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    error: anyhow::Error,
}

impl AppError {
    pub fn with_status(status: StatusCode, error: anyhow::Error) -> Self {
        Self { status, error }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!("{}", self.error);
        }
        let body = Json(serde_json::json!({
            "success": false,
            "error": self.error.to_string(),
        }));
        (self.status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::with_status(StatusCode::INTERNAL_SERVER_ERROR, err.into())
    }
}

pub fn app(state: AppState) -> Router {
    vitals_routes::vitals_routes()
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods([axum::http::Method::GET])
                .max_age(Duration::from_secs(3600)),
        )
        .with_state(state)
}

pub async fn run_server() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let settings = Settings::from_env().context("Invalid configuration")?;
    init_tracing(settings.tracing_directive());

    let addr: SocketAddr = format!("{}:{}", settings.api_host, settings.api_port)
        .parse()
        .with_context(|| {
            format!("Invalid API address {}:{}", settings.api_host, settings.api_port)
        })?;

    tracing::info!("Starting {} API v{}", settings.project_name, env!("CARGO_PKG_VERSION"));
    tracing::info!("  Shared state: {}", settings.shared_state_path.display());
    tracing::info!("  Detection: {}", settings.anomaly_method);

    let router = app(AppState::from_settings(settings));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("Listening on http://{}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("API server shut down.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }
}

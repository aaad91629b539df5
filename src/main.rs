use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use serde::Serialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

mod app;
mod config_store;
mod control_api;
mod error;
mod paths;
mod subscription;
mod supervisor;

use config_store::ConfigStore;
use control_api::{ControlApi, DEFAULT_CONTROL_API};
use subscription::SubscriptionStore;
use supervisor::ProcessSupervisor;

// Version embedded at compile time
const VERSION: &str = env!("CARGO_PKG_VERSION");

const DEFAULT_PORT: u16 = 3001;
const BODY_LIMIT: usize = 10 * 1024 * 1024;

// ============================================================================
// API Response Types
// ============================================================================

#[derive(Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn success_no_data(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }
}

// ============================================================================
// Application State
// ============================================================================

pub struct AppState {
    pub config_store: ConfigStore,
    pub subscriptions: SubscriptionStore,
    pub supervisor: Arc<ProcessSupervisor>,
    pub control_api: ControlApi,
}

// ============================================================================
// Base Handlers
// ============================================================================

async fn serve_banner() -> Json<ApiResponse<()>> {
    Json(ApiResponse::success_no_data("Mihomo Manager API Server"))
}

/// GET /api/health - Liveness probe.
async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": VERSION,
    }))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to install shutdown handler: {}", e);
    }
    info!("shutdown signal received, stopping gracefully");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mihomo_manager=info,tower_http=info".into()),
        )
        .init();

    let port = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(DEFAULT_PORT);

    let config_dir = paths::resolve_config_dir()?;
    info!("config directory: {}", config_dir.display());

    let state = Arc::new(AppState {
        config_store: ConfigStore::new(config_dir.clone()),
        subscriptions: SubscriptionStore::open(paths::subscriptions_file(&config_dir)),
        supervisor: Arc::new(ProcessSupervisor::with_resolved_binary(config_dir)),
        control_api: ControlApi::new(DEFAULT_CONTROL_API),
    });

    let router = Router::new()
        .route("/", get(serve_banner))
        .route("/api/health", get(health))
        .merge(app::config::routes())
        .merge(app::subscriptions::routes())
        .merge(app::engine::routes())
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!("Mihomo Manager server running on port {}", port);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

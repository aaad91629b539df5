use axum::routing::{get, post, put};
use axum::Router;
use std::sync::Arc;

use super::handlers::*;
use crate::AppState;

// ============================================================================
// Routes
// ============================================================================

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        // Lifecycle
        .route("/api/mihomo/status", get(status))
        .route("/api/mihomo/start", post(start))
        .route("/api/mihomo/stop", post(stop))
        .route("/api/mihomo/restart", post(restart))
        // Control-API forwarding
        .route("/api/mihomo/proxies", get(get_proxies))
        .route("/api/mihomo/proxies/{group}", put(switch_proxy))
        .route("/api/mihomo/proxies/{group}/delay", get(proxy_delay))
        .route("/api/mihomo/group/{group}/delay", post(group_delay))
        .route(
            "/api/mihomo/config",
            get(get_engine_config).patch(patch_engine_config),
        )
        .route("/api/mihomo/tun/{action}", post(toggle_tun))
        .route("/api/mihomo/traffic", get(get_traffic))
        .route("/api/mihomo/logs", get(get_logs))
        // Live streams
        .route("/ws", get(ws_events))
        .route("/api/mihomo/ws/traffic", get(ws_traffic))
        .route("/api/mihomo/ws/logs", get(ws_logs))
}

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::{Json, Response};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_tungstenite::connect_async;
use tracing::warn;

use crate::error::{AppError, AppResult};
use crate::supervisor::EngineEvent;
use crate::{ApiResponse, AppState};

use super::models::*;

const CONTROL_WS_BASE: &str = "ws://127.0.0.1:9090";

// ============================================================================
// Lifecycle Handlers
// ============================================================================

/// GET /api/mihomo/status - Liveness plus a short-timeout control-API
/// probe; an unreachable control API is reflected, not an error.
pub async fn status(State(state): State<Arc<AppState>>) -> Json<ApiResponse<EngineStatusPayload>> {
    let runtime = state.supervisor.runtime_status().await;
    let snapshot = if runtime.is_running {
        state.control_api.probe().await
    } else {
        None
    };

    Json(ApiResponse::success(
        if runtime.is_running { "running" } else { "stopped" },
        EngineStatusPayload {
            is_running: runtime.is_running,
            pid: runtime.pid,
            uptime_secs: runtime.uptime_secs,
            control_api_reachable: snapshot.is_some(),
            control_api_snapshot: snapshot,
            mihomo_path: state
                .supervisor
                .binary_path()
                .map(|p| p.display().to_string()),
            config_path: state.supervisor.config_dir().display().to_string(),
        },
    ))
}

/// POST /api/mihomo/start
pub async fn start(State(state): State<Arc<AppState>>) -> AppResult<Json<ApiResponse<ProcessPayload>>> {
    let pid = state.supervisor.start().await?;
    Ok(Json(ApiResponse::success(
        "Mihomo started successfully",
        ProcessPayload { process_id: pid },
    )))
}

/// POST /api/mihomo/stop
pub async fn stop(State(state): State<Arc<AppState>>) -> AppResult<Json<ApiResponse<()>>> {
    state.supervisor.stop().await?;
    Ok(Json(ApiResponse::success_no_data("Mihomo stopped successfully")))
}

/// POST /api/mihomo/restart
pub async fn restart(
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<ProcessPayload>>> {
    let pid = state.supervisor.restart().await?;
    Ok(Json(ApiResponse::success(
        "Mihomo restarted successfully",
        ProcessPayload { process_id: pid },
    )))
}

// ============================================================================
// Control-API Forwarding
// ============================================================================

/// GET /api/mihomo/proxies
pub async fn get_proxies(State(state): State<Arc<AppState>>) -> AppResult<Json<ApiResponse<Value>>> {
    let proxies = state.control_api.get_proxies().await?;
    Ok(Json(ApiResponse::success("Proxies loaded", proxies)))
}

/// PUT /api/mihomo/proxies/{group} - Select a proxy within a group.
pub async fn switch_proxy(
    State(state): State<Arc<AppState>>,
    Path(group): Path<String>,
    Json(req): Json<SwitchProxyRequest>,
) -> AppResult<Json<ApiResponse<()>>> {
    let name = req
        .name
        .ok_or_else(|| AppError::Validation("Proxy name is required".to_string()))?;
    state.control_api.switch_proxy(&group, &name).await?;
    Ok(Json(ApiResponse::success_no_data(format!(
        "Switched {} to {}",
        group, name
    ))))
}

/// GET /api/mihomo/proxies/{group}/delay - Delay test for a single proxy.
pub async fn proxy_delay(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(query): Query<DelayQuery>,
) -> AppResult<Json<ApiResponse<Value>>> {
    let delay = state
        .control_api
        .proxy_delay(&name, query.url.as_deref(), query.timeout)
        .await?;
    Ok(Json(ApiResponse::success("Delay test completed", delay)))
}

/// POST /api/mihomo/group/{group}/delay - Delay test for a whole group.
pub async fn group_delay(
    State(state): State<Arc<AppState>>,
    Path(group): Path<String>,
) -> AppResult<Json<ApiResponse<()>>> {
    state.control_api.group_delay(&group).await?;
    Ok(Json(ApiResponse::success_no_data(format!(
        "Delay test for {} completed",
        group
    ))))
}

/// GET /api/mihomo/config - Runtime configuration from the engine.
pub async fn get_engine_config(
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<Value>>> {
    let config = state.control_api.get_configs().await?;
    Ok(Json(ApiResponse::success("Engine configuration", config)))
}

/// PATCH /api/mihomo/config - Forward a runtime configuration patch.
pub async fn patch_engine_config(
    State(state): State<Arc<AppState>>,
    Json(patch): Json<Value>,
) -> AppResult<Json<ApiResponse<()>>> {
    state.control_api.patch_configs(&patch).await?;
    Ok(Json(ApiResponse::success_no_data(
        "Configuration updated successfully",
    )))
}

/// POST /api/mihomo/tun/{action} - Toggle TUN mode via the control API.
pub async fn toggle_tun(
    State(state): State<Arc<AppState>>,
    Path(action): Path<String>,
) -> AppResult<Json<ApiResponse<TunPayload>>> {
    let enabled = match action.as_str() {
        "enable" => true,
        "disable" => false,
        _ => {
            return Err(AppError::Validation(
                "Action must be enable or disable".to_string(),
            ))
        }
    };

    state.control_api.toggle_tun(enabled).await?;
    Ok(Json(ApiResponse::success(
        format!("TUN mode {}d successfully", action),
        TunPayload {
            tun_enabled: enabled,
        },
    )))
}

/// GET /api/mihomo/traffic
pub async fn get_traffic(State(state): State<Arc<AppState>>) -> AppResult<Json<ApiResponse<Value>>> {
    let traffic = state.control_api.get_traffic().await?;
    Ok(Json(ApiResponse::success("Traffic statistics", traffic)))
}

/// GET /api/mihomo/logs
pub async fn get_logs(State(state): State<Arc<AppState>>) -> AppResult<Json<ApiResponse<Value>>> {
    let logs = state.control_api.get_logs().await?;
    Ok(Json(ApiResponse::success("Engine logs", logs)))
}

// ============================================================================
// WebSockets
// ============================================================================

/// GET /ws - Supervisor event stream (engine stdout/stderr and exits).
pub async fn ws_events(State(state): State<Arc<AppState>>, ws: WebSocketUpgrade) -> Response {
    let events = state.supervisor.subscribe();
    ws.on_upgrade(move |socket| relay_events(socket, events))
}

async fn relay_events(socket: WebSocket, mut events: broadcast::Receiver<EngineEvent>) {
    let (mut sink, mut stream) = socket.split();
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    let Ok(frame) = serde_json::to_string(&event) else { continue };
                    if sink.send(Message::Text(frame.into())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("event stream lagged, {} frames dropped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            msg = stream.next() => match msg {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                _ => {}
            },
        }
    }
}

/// GET /api/mihomo/ws/traffic - Live traffic relay from the engine.
pub async fn ws_traffic(ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(|socket| proxy_engine_socket(socket, format!("{}/traffic", CONTROL_WS_BASE)))
}

/// GET /api/mihomo/ws/logs - Live log relay from the engine.
pub async fn ws_logs(ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(|socket| proxy_engine_socket(socket, format!("{}/logs", CONTROL_WS_BASE)))
}

/// Bridge a client socket to one of the engine's websocket endpoints.
/// Clients mostly listen; only close and ping frames travel upstream.
async fn proxy_engine_socket(mut client: WebSocket, upstream_url: String) {
    let (upstream, _) = match connect_async(&upstream_url).await {
        Ok(connected) => connected,
        Err(e) => {
            warn!("failed to connect upstream websocket {}: {}", upstream_url, e);
            let _ = client.close().await;
            return;
        }
    };

    let (mut upstream_sink, mut upstream_stream) = upstream.split();
    let (mut client_sink, mut client_stream) = client.split();

    loop {
        tokio::select! {
            msg = upstream_stream.next() => match msg {
                Some(Ok(tokio_tungstenite::tungstenite::Message::Text(t))) => {
                    if client_sink.send(Message::Text(t.into())).await.is_err() {
                        break;
                    }
                }
                Some(Ok(tokio_tungstenite::tungstenite::Message::Binary(b))) => {
                    if client_sink
                        .send(Message::Binary(axum::body::Bytes::from(b)))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Some(Ok(tokio_tungstenite::tungstenite::Message::Ping(p))) => {
                    let _ = client_sink.send(Message::Ping(axum::body::Bytes::from(p))).await;
                }
                Some(Ok(tokio_tungstenite::tungstenite::Message::Close(_))) | None => {
                    let _ = client_sink.send(Message::Close(None)).await;
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("upstream websocket error: {}", e);
                    break;
                }
            },
            msg = client_stream.next() => match msg {
                Some(Ok(Message::Ping(p))) => {
                    let _ = upstream_sink
                        .send(tokio_tungstenite::tungstenite::Message::Ping(p.to_vec()))
                        .await;
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                    let _ = upstream_sink
                        .send(tokio_tungstenite::tungstenite::Message::Close(None))
                        .await;
                    break;
                }
                _ => {}
            },
        }
    }
}

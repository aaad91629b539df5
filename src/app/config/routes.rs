use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;

use super::handlers::*;
use crate::AppState;

// ============================================================================
// Routes
// ============================================================================

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/config",
            get(get_config).post(save_config).patch(patch_config),
        )
        .route("/api/config/reset", post(reset_config))
        .route("/api/config/backup", post(backup_config))
        .route("/api/config/backups", get(list_backups))
        .route("/api/config/restore/{filename}", post(restore_config))
        .route("/api/config/validate", post(validate_config_handler))
}

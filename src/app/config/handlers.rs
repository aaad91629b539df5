use axum::extract::{Path, State};
use axum::response::Json;
use serde_json::Value;
use std::sync::Arc;

use crate::config_store::{validate_config, ValidationReport};
use crate::error::{AppError, AppResult};
use crate::{ApiResponse, AppState};

use super::models::*;

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/config - Current configuration, or the default template when
/// no file exists yet.
pub async fn get_config(
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<ConfigPayload>>> {
    let exists = state.config_store.exists();
    let config = state.config_store.load().await?;
    Ok(Json(ApiResponse::success(
        "Configuration loaded",
        ConfigPayload {
            config,
            config_path: state.config_store.config_path().display().to_string(),
            exists,
        },
    )))
}

/// POST /api/config - Validate required fields and save.
pub async fn save_config(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SaveConfigRequest>,
) -> AppResult<Json<ApiResponse<SavedConfigPayload>>> {
    let config = req
        .config
        .ok_or_else(|| AppError::Validation("Configuration is required".to_string()))?;
    state.config_store.save(&config).await?;
    Ok(Json(ApiResponse::success(
        "Configuration saved successfully",
        SavedConfigPayload {
            config_path: state.config_store.config_path().display().to_string(),
        },
    )))
}

/// PATCH /api/config - Shallow-merge partial fields into the current
/// configuration.
pub async fn patch_config(
    State(state): State<Arc<AppState>>,
    Json(updates): Json<Value>,
) -> AppResult<Json<ApiResponse<UpdatedConfigPayload>>> {
    let config = state.config_store.patch(updates).await?;
    Ok(Json(ApiResponse::success(
        "Configuration updated successfully",
        UpdatedConfigPayload {
            config,
            config_path: state.config_store.config_path().display().to_string(),
        },
    )))
}

/// POST /api/config/reset - Overwrite with the default template.
pub async fn reset_config(
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<UpdatedConfigPayload>>> {
    let config = state.config_store.reset().await?;
    Ok(Json(ApiResponse::success(
        "Configuration reset to default",
        UpdatedConfigPayload {
            config,
            config_path: state.config_store.config_path().display().to_string(),
        },
    )))
}

/// POST /api/config/backup - Timestamped copy of the live config.
pub async fn backup_config(
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<BackupCreatedPayload>>> {
    let backup_path = state.config_store.backup().await?;
    Ok(Json(ApiResponse::success(
        "Configuration backed up successfully",
        BackupCreatedPayload {
            backup_path: backup_path.display().to_string(),
        },
    )))
}

/// GET /api/config/backups - Available backups, newest first.
pub async fn list_backups(
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<BackupListPayload>>> {
    let backups = state.config_store.list_backups().await?;
    Ok(Json(ApiResponse::success(
        "Backups loaded",
        BackupListPayload { backups },
    )))
}

/// POST /api/config/restore/{filename} - Restore the named backup.
pub async fn restore_config(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> AppResult<Json<ApiResponse<UpdatedConfigPayload>>> {
    let config = state.config_store.restore(&filename).await?;
    Ok(Json(ApiResponse::success(
        "Configuration restored successfully",
        UpdatedConfigPayload {
            config,
            config_path: state.config_store.config_path().display().to_string(),
        },
    )))
}

/// POST /api/config/validate - Pure validation, no disk access.
pub async fn validate_config_handler(
    Json(req): Json<ValidateConfigRequest>,
) -> AppResult<Json<ApiResponse<ValidationReport>>> {
    let config = req
        .config
        .ok_or_else(|| AppError::Validation("Configuration is required".to_string()))?;
    Ok(Json(ApiResponse::success(
        "Validation completed",
        validate_config(&config),
    )))
}

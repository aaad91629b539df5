use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::config_store::BackupInfo;

// ============================================================================
// Request Types
// ============================================================================

#[derive(ToSchema, Deserialize, Clone, Debug)]
pub struct SaveConfigRequest {
    #[schema(value_type = Option<Object>)]
    pub config: Option<Value>,
}

#[derive(ToSchema, Deserialize, Clone, Debug)]
pub struct ValidateConfigRequest {
    #[schema(value_type = Option<Object>)]
    pub config: Option<Value>,
}

// ============================================================================
// Response Types
// ============================================================================

#[derive(ToSchema, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ConfigPayload {
    #[schema(value_type = Object)]
    pub config: Value,
    pub config_path: String,
    pub exists: bool,
}

#[derive(ToSchema, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SavedConfigPayload {
    pub config_path: String,
}

#[derive(ToSchema, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UpdatedConfigPayload {
    #[schema(value_type = Object)]
    pub config: Value,
    pub config_path: String,
}

#[derive(ToSchema, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct BackupCreatedPayload {
    pub backup_path: String,
}

#[derive(ToSchema, Serialize, Debug)]
pub struct BackupListPayload {
    pub backups: Vec<BackupInfo>,
}

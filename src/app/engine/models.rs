use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

// ============================================================================
// Request Types
// ============================================================================

#[derive(ToSchema, Deserialize, Clone, Debug)]
pub struct SwitchProxyRequest {
    #[schema(example = "MyNode")]
    pub name: Option<String>,
}

#[derive(Deserialize, Clone, Debug)]
pub struct DelayQuery {
    pub timeout: Option<u32>,
    pub url: Option<String>,
}

// ============================================================================
// Response Types
// ============================================================================

#[derive(ToSchema, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatusPayload {
    pub is_running: bool,
    pub pid: Option<u32>,
    pub uptime_secs: Option<u64>,
    pub control_api_reachable: bool,
    #[schema(value_type = Option<Object>)]
    pub control_api_snapshot: Option<Value>,
    pub mihomo_path: Option<String>,
    pub config_path: String,
}

#[derive(ToSchema, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ProcessPayload {
    pub process_id: u32,
}

#[derive(ToSchema, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct TunPayload {
    pub tun_enabled: bool,
}

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use validator::Validate;

use crate::subscription::{ParsedSubscription, Subscription};

// ============================================================================
// Request Types
// ============================================================================

#[derive(ToSchema, Deserialize, Validate, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionCreateRequest {
    #[schema(example = "My provider")]
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,

    #[schema(example = "https://example.com/sub")]
    #[validate(url)]
    pub url: Option<String>,

    #[schema(example = "clash")]
    pub user_agent: Option<String>,

    #[serde(default)]
    pub use_proxy: bool,
}

#[derive(ToSchema, Deserialize, Validate, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionUpdateRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,

    #[validate(url)]
    pub url: Option<String>,

    pub user_agent: Option<String>,

    pub use_proxy: Option<bool>,
}

#[derive(ToSchema, Deserialize, Validate, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ParseRequest {
    #[validate(url)]
    pub url: Option<String>,

    pub user_agent: Option<String>,
}

#[derive(ToSchema, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct MergeRequest {
    pub subscription_ids: Option<Vec<String>>,

    /// Override options overlaid on the merged document (e.g. port, mode).
    #[schema(value_type = Option<Object>)]
    pub merge_options: Option<Value>,
}

// ============================================================================
// Response Types
// ============================================================================

#[derive(ToSchema, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionPayload {
    pub subscription: Subscription,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parsed_data: Option<ParsedSubscription>,
}

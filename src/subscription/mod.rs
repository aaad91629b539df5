// Subscription pipeline: remote list records, fetch/parse, merge.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod merger;
pub mod parser;
pub mod store;

pub use merger::{merge_parsed, merge_subscriptions, MergeOutcome, MergeStats};
pub use parser::{parse_subscription, ParsedSubscription, DEFAULT_USER_AGENT};
pub use store::SubscriptionStore;

// ============================================================================
// Records
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Active,
    Error,
    Updating,
}

/// A remote subscription source. Serialized camelCase both on the wire and
/// in `subscriptions.json`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub id: String,
    pub name: String,
    pub url: String,
    pub user_agent: String,
    #[serde(default)]
    pub use_proxy: bool,
    pub created_at: String,
    pub last_updated: String,
    #[serde(default)]
    pub proxy_count: usize,
    pub status: SubscriptionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl Subscription {
    pub fn new(name: String, url: String, user_agent: Option<String>, use_proxy: bool) -> Self {
        let now = now_iso();
        Self {
            id: Utc::now().timestamp_millis().to_string(),
            name,
            url,
            user_agent: user_agent.unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            use_proxy,
            created_at: now.clone(),
            last_updated: now,
            proxy_count: 0,
            status: SubscriptionStatus::Active,
            last_error: None,
        }
    }
}

pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Fold a refresh attempt into the record. A failed fetch flips the status
/// to `error` and keeps the previous proxy count; the record is never
/// dropped.
pub fn apply_refresh(
    subscription: &mut Subscription,
    outcome: Result<&ParsedSubscription, &crate::error::AppError>,
) {
    subscription.last_updated = now_iso();
    match outcome {
        Ok(parsed) => {
            subscription.proxy_count = parsed.proxies.len();
            subscription.status = SubscriptionStatus::Active;
            subscription.last_error = None;
        }
        Err(e) => {
            subscription.status = SubscriptionStatus::Error;
            subscription.last_error = Some(e.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use serde_json::json;

    fn parsed_with_proxies(count: usize) -> ParsedSubscription {
        ParsedSubscription {
            proxies: (0..count).map(|i| json!({"name": format!("p{}", i)})).collect(),
            proxy_groups: vec![],
            rules: vec![],
            raw_config: json!({}),
        }
    }

    #[test]
    fn new_subscription_defaults() {
        let sub = Subscription::new("A".into(), "http://x/sub".into(), None, false);
        assert_eq!(sub.user_agent, DEFAULT_USER_AGENT);
        assert_eq!(sub.status, SubscriptionStatus::Active);
        assert_eq!(sub.proxy_count, 0);
        assert!(sub.id.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn refresh_success_updates_count_and_clears_error() {
        let mut sub = Subscription::new("A".into(), "http://x/sub".into(), None, false);
        sub.status = SubscriptionStatus::Error;
        sub.last_error = Some("boom".into());

        apply_refresh(&mut sub, Ok(&parsed_with_proxies(3)));

        assert_eq!(sub.proxy_count, 3);
        assert_eq!(sub.status, SubscriptionStatus::Active);
        assert!(sub.last_error.is_none());
    }

    #[test]
    fn refresh_failure_keeps_previous_proxy_count() {
        let mut sub = Subscription::new("A".into(), "http://x/sub".into(), None, false);
        sub.proxy_count = 7;

        let err = AppError::Fetch("404 Not Found".into());
        apply_refresh(&mut sub, Err(&err));

        assert_eq!(sub.proxy_count, 7);
        assert_eq!(sub.status, SubscriptionStatus::Error);
        assert!(sub.last_error.as_deref().unwrap().contains("404"));
    }

    #[test]
    fn record_serializes_camel_case() {
        let sub = Subscription::new("A".into(), "http://x/sub".into(), None, true);
        let value = serde_json::to_value(&sub).unwrap();
        assert!(value.get("userAgent").is_some());
        assert!(value.get("proxyCount").is_some());
        assert!(value.get("useProxy").is_some());
        assert_eq!(value["status"], json!("active"));
        // No error yet, so the field is omitted entirely.
        assert!(value.get("lastError").is_none());
    }
}

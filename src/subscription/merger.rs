use serde::Serialize;
use serde_json::{json, Value};
use tracing::warn;
use utoipa::ToSchema;

use crate::config_store::shallow_merge;
use crate::error::{AppError, AppResult};

use super::parser::{parse_subscription, ParsedSubscription};
use super::store::SubscriptionStore;
use super::SubscriptionStatus;

// ============================================================================
// Merger
// ============================================================================

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MergeStats {
    pub total_proxies: usize,
    pub total_groups: usize,
    pub total_rules: usize,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MergeOutcome {
    #[schema(value_type = Object)]
    pub config: Value,
    pub stats: MergeStats,
}

/// Concatenate parsed subscriptions in list order and overlay the override
/// options on top. Duplicate proxy or group names across subscriptions are
/// appended as-is; nothing is merged or renamed.
pub fn merge_parsed(parsed: &[ParsedSubscription], overrides: Option<&Value>) -> MergeOutcome {
    let mut proxies = Vec::new();
    let mut proxy_groups = Vec::new();
    let mut rules = Vec::new();

    for subscription in parsed {
        proxies.extend(subscription.proxies.iter().cloned());
        proxy_groups.extend(subscription.proxy_groups.iter().cloned());
        rules.extend(subscription.rules.iter().cloned());
    }

    let stats = MergeStats {
        total_proxies: proxies.len(),
        total_groups: proxy_groups.len(),
        total_rules: rules.len(),
    };

    let mut config = json!({
        "proxies": proxies,
        "proxy-groups": proxy_groups,
        "rules": rules,
    });
    if let Some(overrides) = overrides {
        shallow_merge(&mut config, overrides.clone());
    }

    MergeOutcome { config, stats }
}

/// Fetch and merge the selected subscriptions into one engine-ready
/// document. Only `active` records participate; a subscription whose fetch
/// fails mid-merge is logged and skipped rather than failing the whole
/// operation.
pub async fn merge_subscriptions(
    store: &SubscriptionStore,
    subscription_ids: &[String],
    overrides: Option<Value>,
) -> AppResult<MergeOutcome> {
    let selected: Vec<_> = store
        .list()
        .await
        .into_iter()
        .filter(|s| subscription_ids.contains(&s.id) && s.status == SubscriptionStatus::Active)
        .collect();

    if selected.is_empty() {
        return Err(AppError::NoValidSubscriptions);
    }

    let mut parsed = Vec::new();
    for subscription in &selected {
        match parse_subscription(&subscription.url, Some(&subscription.user_agent)).await {
            Ok(data) => parsed.push(data),
            Err(e) => warn!("failed to fetch subscription {}: {}", subscription.name, e),
        }
    }

    Ok(merge_parsed(&parsed, overrides.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(proxies: &[&str], groups: &[&str], rules: &[&str]) -> ParsedSubscription {
        ParsedSubscription {
            proxies: proxies.iter().map(|n| json!({"name": n})).collect(),
            proxy_groups: groups.iter().map(|n| json!({"name": n, "type": "select"})).collect(),
            rules: rules.iter().map(|r| json!(r)).collect(),
            raw_config: json!({}),
        }
    }

    #[test]
    fn counts_and_overrides() {
        let subs = vec![
            parsed(&["p1", "p2", "p3"], &["G1"], &["MATCH,G1"]),
            parsed(&["p4", "p5"], &[], &[]),
        ];

        let outcome = merge_parsed(&subs, Some(&json!({"port": 1234, "mode": "rule"})));

        assert_eq!(outcome.stats.total_proxies, 5);
        assert_eq!(outcome.stats.total_groups, 1);
        assert_eq!(outcome.stats.total_rules, 1);
        assert_eq!(outcome.config["port"], json!(1234));
        assert_eq!(outcome.config["mode"], json!("rule"));
        assert_eq!(outcome.config["proxies"].as_array().unwrap().len(), 5);
    }

    #[test]
    fn subscription_order_is_preserved() {
        let subs = vec![parsed(&["b"], &[], &[]), parsed(&["a"], &[], &[])];
        let outcome = merge_parsed(&subs, None);
        let names: Vec<_> = outcome.config["proxies"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn duplicate_names_are_kept_as_is() {
        let subs = vec![parsed(&["p1"], &[], &[]), parsed(&["p1"], &[], &[])];
        let outcome = merge_parsed(&subs, None);
        assert_eq!(outcome.stats.total_proxies, 2);
    }

    #[test]
    fn empty_input_yields_empty_document() {
        let outcome = merge_parsed(&[], None);
        assert_eq!(outcome.stats.total_proxies, 0);
        assert_eq!(outcome.config["proxies"], json!([]));
    }

    #[tokio::test]
    async fn merge_requires_an_active_selection() {
        let dir = tempfile::tempdir().unwrap();
        let store = SubscriptionStore::open(dir.path().join("subscriptions.json"));

        let err = merge_subscriptions(&store, &["missing".to_string()], None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NoValidSubscriptions));

        // An inactive record does not count as a valid selection either.
        let mut sub = crate::subscription::Subscription::new(
            "A".into(),
            "http://x/sub".into(),
            None,
            false,
        );
        sub.status = SubscriptionStatus::Error;
        let sub = store.insert(sub).await.unwrap();

        let err = merge_subscriptions(&store, &[sub.id.clone()], None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NoValidSubscriptions));
    }
}

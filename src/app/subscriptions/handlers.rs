use axum::extract::{Path, State};
use axum::response::Json;
use std::sync::Arc;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::subscription::{
    apply_refresh, merge_subscriptions, now_iso, parse_subscription, MergeOutcome,
    ParsedSubscription, Subscription, SubscriptionStatus,
};
use crate::{ApiResponse, AppState};

use super::models::*;

// ============================================================================
// API Handlers
// ============================================================================

fn check<R: Validate>(req: &R) -> AppResult<()> {
    req.validate()
        .map_err(|e| AppError::Validation(e.to_string()))
}

/// GET /api/subscription - All subscription records.
pub async fn list_subscriptions(
    State(state): State<Arc<AppState>>,
) -> Json<ApiResponse<Vec<Subscription>>> {
    Json(ApiResponse::success(
        "Subscriptions loaded",
        state.subscriptions.list().await,
    ))
}

/// POST /api/subscription - Add a record. The URL must fetch and parse
/// successfully before anything is persisted.
pub async fn create_subscription(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SubscriptionCreateRequest>,
) -> AppResult<Json<ApiResponse<SubscriptionPayload>>> {
    check(&req)?;
    let (Some(name), Some(url)) = (req.name, req.url) else {
        return Err(AppError::Validation("Name and URL are required".to_string()));
    };

    let parsed = parse_subscription(&url, req.user_agent.as_deref()).await?;

    let mut subscription = Subscription::new(name, url, req.user_agent, req.use_proxy);
    subscription.proxy_count = parsed.proxies.len();
    let subscription = state.subscriptions.insert(subscription).await?;

    Ok(Json(ApiResponse::success(
        "Subscription added successfully",
        SubscriptionPayload {
            subscription,
            parsed_data: Some(parsed),
        },
    )))
}

/// PUT /api/subscription/{id} - Update fields; a changed URL is re-parsed
/// before the record is touched.
pub async fn update_subscription(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<SubscriptionUpdateRequest>,
) -> AppResult<Json<ApiResponse<SubscriptionPayload>>> {
    check(&req)?;
    let existing = state.subscriptions.get(&id).await?;

    let mut parsed = None;
    if let Some(url) = &req.url {
        if *url != existing.url {
            let user_agent = req
                .user_agent
                .as_deref()
                .unwrap_or(existing.user_agent.as_str());
            parsed = Some(parse_subscription(url, Some(user_agent)).await?);
        }
    }

    let proxy_count = parsed.as_ref().map(|p| p.proxies.len());
    let subscription = state
        .subscriptions
        .update_with(&id, |s| {
            if let Some(name) = req.name {
                s.name = name;
            }
            if let Some(url) = req.url {
                s.url = url;
            }
            if let Some(user_agent) = req.user_agent {
                s.user_agent = user_agent;
            }
            if let Some(use_proxy) = req.use_proxy {
                s.use_proxy = use_proxy;
            }
            if let Some(count) = proxy_count {
                s.proxy_count = count;
            }
            s.last_updated = now_iso();
        })
        .await?;

    Ok(Json(ApiResponse::success(
        "Subscription updated successfully",
        SubscriptionPayload {
            subscription,
            parsed_data: parsed,
        },
    )))
}

/// DELETE /api/subscription/{id}
pub async fn delete_subscription(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<()>>> {
    state.subscriptions.remove(&id).await?;
    Ok(Json(ApiResponse::success_no_data(
        "Subscription deleted successfully",
    )))
}

/// POST /api/subscription/{id}/refresh - Re-fetch and re-parse. A failed
/// fetch marks the record `error` but never deletes it.
pub async fn refresh_subscription(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<SubscriptionPayload>>> {
    let subscription = state.subscriptions.get(&id).await?;

    state
        .subscriptions
        .update_with(&id, |s| s.status = SubscriptionStatus::Updating)
        .await?;

    match parse_subscription(&subscription.url, Some(&subscription.user_agent)).await {
        Ok(parsed) => {
            let subscription = state
                .subscriptions
                .update_with(&id, |s| apply_refresh(s, Ok(&parsed)))
                .await?;
            Ok(Json(ApiResponse::success(
                "Subscription refreshed successfully",
                SubscriptionPayload {
                    subscription,
                    parsed_data: Some(parsed),
                },
            )))
        }
        Err(e) => {
            state
                .subscriptions
                .update_with(&id, |s| apply_refresh(s, Err(&e)))
                .await?;
            Err(e)
        }
    }
}

/// GET /api/subscription/{id}/content - Fetch the record's current content
/// without mutating it.
pub async fn subscription_content(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<ParsedSubscription>>> {
    let subscription = state.subscriptions.get(&id).await?;
    let parsed = parse_subscription(&subscription.url, Some(&subscription.user_agent)).await?;
    Ok(Json(ApiResponse::success("Subscription content", parsed)))
}

/// POST /api/subscription/parse - Parse a URL without saving anything.
pub async fn parse_subscription_handler(
    Json(req): Json<ParseRequest>,
) -> AppResult<Json<ApiResponse<ParsedSubscription>>> {
    check(&req)?;
    let url = req
        .url
        .ok_or_else(|| AppError::Validation("URL is required".to_string()))?;
    let parsed = parse_subscription(&url, req.user_agent.as_deref()).await?;
    Ok(Json(ApiResponse::success("Subscription parsed", parsed)))
}

/// POST /api/subscription/merge - Merge the selected subscriptions into one
/// engine-ready configuration document.
pub async fn merge_subscriptions_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<MergeRequest>,
) -> AppResult<Json<ApiResponse<MergeOutcome>>> {
    let ids = match req.subscription_ids {
        Some(ids) if !ids.is_empty() => ids,
        _ => {
            return Err(AppError::Validation(
                "Subscription IDs are required".to_string(),
            ))
        }
    };

    let outcome = merge_subscriptions(&state.subscriptions, &ids, req.merge_options).await?;
    Ok(Json(ApiResponse::success(
        "Subscriptions merged successfully",
        outcome,
    )))
}

use axum::routing::{delete, get, post, put};
use axum::Router;
use std::sync::Arc;

use super::handlers::*;
use crate::AppState;

// ============================================================================
// Routes
// ============================================================================

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/subscription", get(list_subscriptions))
        .route("/api/subscription", post(create_subscription))
        .route("/api/subscription/{id}", put(update_subscription))
        .route("/api/subscription/{id}", delete(delete_subscription))
        .route("/api/subscription/{id}/refresh", post(refresh_subscription))
        .route("/api/subscription/{id}/content", get(subscription_content))
        .route("/api/subscription/parse", post(parse_subscription_handler))
        .route("/api/subscription/merge", post(merge_subscriptions_handler))
}

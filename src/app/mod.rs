// HTTP feature modules, one per API area.

use std::sync::Arc;

pub mod config;
pub mod engine;
pub mod subscriptions;

pub use super::AppState;

pub type SharedAppState = Arc<AppState>;

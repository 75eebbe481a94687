//! Top-level API router.
//!
//! Combines the route tables of all feature modules into the `/api`
//! surface served by `main`.

use axum::Router;
use std::sync::Arc;

use crate::shared::state::AppState;

pub fn configure_api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(crate::webhooks::configure())
        .merge(crate::orgs::configure())
        .merge(crate::leads::configure())
}

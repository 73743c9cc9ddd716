//! HTTP API handlers and routing.

pub mod error;
mod health;
mod reconcile;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Create the router serving the health check and the reconcile trigger.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(health::routes())
        .merge(reconcile::routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

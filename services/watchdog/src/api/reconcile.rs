//! Reconciliation trigger.
//!
//! Any request to `/` runs one full pass against the configured target. The
//! request body is ignored.

use axum::{extract::State, routing::get, Json, Router};
use tracing::error;
use watchdog_reconcile::ReconcileOutcome;

use crate::api::error::ApiError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/", get(run_pass).post(run_pass))
}

/// GET|POST /
async fn run_pass(State(state): State<AppState>) -> Result<Json<ReconcileOutcome>, ApiError> {
    let outcome = state
        .reconciler()
        .reconcile(state.target())
        .await
        .map_err(|e| {
            error!(error = %e, code = e.code(), "Reconciliation pass failed");
            ApiError::from(e)
        })?;

    Ok(Json(outcome))
}

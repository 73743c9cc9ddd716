//! Runner watchdog service.
//!
//! Adapters around the reconciliation engine in `watchdog-reconcile`:
//!
//! - `github`: GitHub Actions REST client (build-system side)
//! - `compute`: Compute Engine REST client (fleet side)
//! - `credentials`: Compute Engine access tokens
//! - `config`: flag/environment settings and their validation
//! - `api`: HTTP trigger for reconciliation passes

pub mod api;
pub mod compute;
pub mod config;
pub mod credentials;
pub mod github;
pub mod http;
pub mod state;

use std::sync::Arc;

use anyhow::Result;
use watchdog_reconcile::Reconciler;

pub use compute::ComputeClient;
pub use config::{Config, ConfigError, Settings};
pub use github::GitHubClient;
pub use state::AppState;

/// Build the long-lived reconciler from validated configuration.
pub fn build_reconciler(config: &Config) -> Result<Reconciler> {
    let github = GitHubClient::new(&config.github)?;
    let compute = ComputeClient::new(&config.compute)?;
    Ok(Reconciler::new(Arc::new(github), Arc::new(compute)))
}

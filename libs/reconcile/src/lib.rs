//! Runner demand reconciliation.
//!
//! Decides which on-demand build agents should be running for the work that
//! is actually queued, and converges the fleet toward that answer:
//!
//! - **Demand**: runner labels declared (in the workflow file at the run's
//!   commit) by jobs of active runs that have not completed.
//! - **Inventory**: compute instances tagged with `runner-name`.
//! - **Convergence**: start TERMINATED instances whose label is in demand,
//!   stop RUNNING instances whose label is not.
//!
//! # Invariants
//!
//! - Demand is resolved completely before any instance is touched
//! - At most one instance per runner label is started or stopped per pass
//! - Starts are issued before stops; issued transitions are never rolled back
//! - A second pass over an unchanged, converged fleet does nothing

pub mod demand;
pub mod error;
pub mod ports;
pub mod reconciler;
pub mod types;
pub mod workflow;

pub use demand::{labels_for_jobs, DemandResolver, RequiredLabels};
pub use error::{ParseError, ReconcileError, RemoteCause, RemoteError};
pub use ports::{BuildSystem, ComputeFleet};
pub use reconciler::{plan, ReconcileOutcome, ReconcilePlan, Reconciler};
pub use types::{
    ComputeInstance, InstanceStatus, ReconcileTarget, WorkStatus, WorkflowJob, WorkflowRun,
    GITHUB_SCOPE_KEY, RUNNER_NAME_KEY,
};
pub use workflow::{extract_job_labels, JobLabels};

//! Interfaces to the two remote systems a pass talks to.
//!
//! Implementations own transport, authentication and pagination. Every
//! failure is reported as a [`RemoteError`].

use async_trait::async_trait;

use crate::error::RemoteError;
use crate::types::{ComputeInstance, WorkflowJob, WorkflowRun};

/// Read access to the CI build system.
#[async_trait]
pub trait BuildSystem: Send + Sync {
    /// Queued runs followed by in-progress runs. Not deduplicated.
    async fn list_active_runs(&self, org: &str, repo: &str)
        -> Result<Vec<WorkflowRun>, RemoteError>;

    /// Repository path of the workflow definition behind `workflow_id`.
    async fn resolve_workflow_path(
        &self,
        org: &str,
        repo: &str,
        workflow_id: u64,
    ) -> Result<String, RemoteError>;

    /// Raw workflow file exactly as committed at `commit`.
    async fn fetch_workflow_file(
        &self,
        org: &str,
        repo: &str,
        commit: &str,
        path: &str,
    ) -> Result<String, RemoteError>;

    /// Live jobs of a run.
    async fn list_jobs(
        &self,
        org: &str,
        repo: &str,
        run_id: u64,
    ) -> Result<Vec<WorkflowJob>, RemoteError>;
}

/// Inventory and power control for on-demand instances.
#[async_trait]
pub trait ComputeFleet: Send + Sync {
    /// Instances tagged with `runner-name`; untagged instances are skipped.
    async fn list_managed_instances(
        &self,
        project: &str,
        zone: &str,
    ) -> Result<Vec<ComputeInstance>, RemoteError>;

    /// Start an instance. Starting a running instance is not an error.
    async fn start(&self, project: &str, zone: &str, instance_name: &str)
        -> Result<(), RemoteError>;

    /// Stop an instance. Stopping a stopped instance is not an error.
    async fn stop(&self, project: &str, zone: &str, instance_name: &str)
        -> Result<(), RemoteError>;
}

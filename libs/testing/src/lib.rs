//! In-memory fakes of the build system and compute fleet for tests.
//!
//! `FakeBuildSystem` serves canned runs, workflow files and jobs.
//! `FakeFleet` keeps an instance inventory, applies start/stop transitions to
//! it and records every call so tests can assert on what a pass did.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use watchdog_reconcile::{
    BuildSystem, ComputeFleet, ComputeInstance, InstanceStatus, RemoteError, WorkStatus,
    WorkflowJob, WorkflowRun,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Build a run with the given id, workflow and commit.
pub fn run(id: u64, status: WorkStatus, workflow_id: u64, head_sha: &str) -> WorkflowRun {
    WorkflowRun {
        id,
        status,
        workflow_id,
        head_sha: head_sha.to_string(),
    }
}

/// Build a job with the given name and status.
pub fn job(name: &str, status: WorkStatus) -> WorkflowJob {
    WorkflowJob {
        name: name.to_string(),
        status,
    }
}

/// Canned build-system responses.
#[derive(Debug, Default)]
pub struct FakeBuildSystem {
    runs: Vec<WorkflowRun>,
    workflows: HashMap<u64, String>,
    files: HashMap<(String, String), Result<String, RemoteError>>,
    jobs: HashMap<u64, Vec<WorkflowJob>>,
    list_runs_error: Option<RemoteError>,
    calls: Mutex<Vec<String>>,
}

impl FakeBuildSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_run(mut self, run: WorkflowRun) -> Self {
        self.runs.push(run);
        self
    }

    pub fn with_workflow(mut self, workflow_id: u64, path: &str) -> Self {
        self.workflows.insert(workflow_id, path.to_string());
        self
    }

    pub fn with_file(mut self, commit: &str, path: &str, contents: &str) -> Self {
        self.files.insert(
            (commit.to_string(), path.to_string()),
            Ok(contents.to_string()),
        );
        self
    }

    /// Make fetching `path` at `commit` fail with the given HTTP status.
    pub fn with_file_status(mut self, commit: &str, path: &str, status: u16) -> Self {
        self.files.insert(
            (commit.to_string(), path.to_string()),
            Err(RemoteError::status(
                format!("fetch {path} at {commit}"),
                status,
                "",
            )),
        );
        self
    }

    pub fn with_jobs(mut self, run_id: u64, jobs: Vec<WorkflowJob>) -> Self {
        self.jobs.insert(run_id, jobs);
        self
    }

    pub fn failing_run_listing(mut self, error: RemoteError) -> Self {
        self.list_runs_error = Some(error);
        self
    }

    /// Calls made so far, as short descriptions.
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    fn record(&self, call: String) {
        lock(&self.calls).push(call);
    }
}

#[async_trait]
impl BuildSystem for FakeBuildSystem {
    async fn list_active_runs(
        &self,
        org: &str,
        repo: &str,
    ) -> Result<Vec<WorkflowRun>, RemoteError> {
        self.record(format!("list_active_runs {org}/{repo}"));
        if let Some(err) = &self.list_runs_error {
            return Err(err.clone());
        }
        Ok(self.runs.clone())
    }

    async fn resolve_workflow_path(
        &self,
        _org: &str,
        _repo: &str,
        workflow_id: u64,
    ) -> Result<String, RemoteError> {
        self.record(format!("resolve_workflow_path {workflow_id}"));
        self.workflows
            .get(&workflow_id)
            .cloned()
            .ok_or_else(|| RemoteError::status(format!("get workflow {workflow_id}"), 404, ""))
    }

    async fn fetch_workflow_file(
        &self,
        _org: &str,
        _repo: &str,
        commit: &str,
        path: &str,
    ) -> Result<String, RemoteError> {
        self.record(format!("fetch_workflow_file {commit} {path}"));
        self.files
            .get(&(commit.to_string(), path.to_string()))
            .cloned()
            .unwrap_or_else(|| {
                Err(RemoteError::status(
                    format!("fetch {path} at {commit}"),
                    404,
                    "",
                ))
            })
    }

    async fn list_jobs(
        &self,
        _org: &str,
        _repo: &str,
        run_id: u64,
    ) -> Result<Vec<WorkflowJob>, RemoteError> {
        self.record(format!("list_jobs {run_id}"));
        Ok(self.jobs.get(&run_id).cloned().unwrap_or_default())
    }
}

/// A start or stop issued against the fake fleet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FleetCall {
    Start(String),
    Stop(String),
}

/// Instance inventory that reacts to start/stop like a provider would,
/// minus the transitional states.
#[derive(Debug, Default)]
pub struct FakeFleet {
    instances: Mutex<Vec<ComputeInstance>>,
    calls: Mutex<Vec<FleetCall>>,
    failing: Mutex<Option<String>>,
}

impl FakeFleet {
    pub fn new(instances: Vec<ComputeInstance>) -> Self {
        Self {
            instances: Mutex::new(instances),
            ..Self::default()
        }
    }

    pub fn shared(instances: Vec<ComputeInstance>) -> Arc<Self> {
        Arc::new(Self::new(instances))
    }

    /// Make every start/stop of `instance_name` fail.
    pub fn fail_on(&self, instance_name: &str) {
        *lock(&self.failing) = Some(instance_name.to_string());
    }

    pub fn calls(&self) -> Vec<FleetCall> {
        lock(&self.calls).clone()
    }

    pub fn status_of(&self, instance_name: &str) -> Option<InstanceStatus> {
        lock(&self.instances)
            .iter()
            .find(|instance| instance.instance_name == instance_name)
            .map(|instance| instance.status)
    }

    fn transition(
        &self,
        call: FleetCall,
        instance_name: &str,
        status: InstanceStatus,
    ) -> Result<(), RemoteError> {
        if lock(&self.failing).as_deref() == Some(instance_name) {
            return Err(RemoteError::status(
                format!("{call:?}"),
                500,
                "backend error",
            ));
        }
        lock(&self.calls).push(call);

        let mut instances = lock(&self.instances);
        match instances
            .iter_mut()
            .find(|instance| instance.instance_name == instance_name)
        {
            Some(instance) => {
                instance.status = status;
                Ok(())
            }
            None => Err(RemoteError::status(
                format!("instance {instance_name}"),
                404,
                "not found",
            )),
        }
    }
}

#[async_trait]
impl ComputeFleet for FakeFleet {
    async fn list_managed_instances(
        &self,
        _project: &str,
        _zone: &str,
    ) -> Result<Vec<ComputeInstance>, RemoteError> {
        Ok(lock(&self.instances).clone())
    }

    async fn start(
        &self,
        _project: &str,
        _zone: &str,
        instance_name: &str,
    ) -> Result<(), RemoteError> {
        self.transition(
            FleetCall::Start(instance_name.to_string()),
            instance_name,
            InstanceStatus::Running,
        )
    }

    async fn stop(
        &self,
        _project: &str,
        _zone: &str,
        instance_name: &str,
    ) -> Result<(), RemoteError> {
        self.transition(
            FleetCall::Stop(instance_name.to_string()),
            instance_name,
            InstanceStatus::Terminated,
        )
    }
}

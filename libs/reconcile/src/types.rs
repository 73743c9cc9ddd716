//! Snapshots of build-system and compute-provider state read during a pass.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Metadata key holding the runner label an instance serves.
pub const RUNNER_NAME_KEY: &str = "runner-name";

/// Metadata key restricting an instance to a single `org/repo`.
pub const GITHUB_SCOPE_KEY: &str = "github-scope";

/// Status of a workflow run or job as reported by the build system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkStatus {
    Queued,
    InProgress,
    Completed,
    Waiting,
    Requested,
    Pending,
    #[serde(other)]
    Unknown,
}

impl WorkStatus {
    /// Only `completed` is terminal; everything else still needs a runner.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Waiting => "waiting",
            Self::Requested => "requested",
            Self::Pending => "pending",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for WorkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One execution of a workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowRun {
    pub id: u64,
    pub status: WorkStatus,

    /// Opaque reference to the workflow definition that produced this run.
    pub workflow_id: u64,

    /// Commit the run was triggered from.
    pub head_sha: String,
}

/// One job of a workflow run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowJob {
    pub name: String,
    pub status: WorkStatus,
}

/// Lifecycle status of a compute instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceStatus {
    Provisioning,
    Staging,
    Running,
    Stopping,
    Stopped,
    Suspending,
    Suspended,
    Repairing,
    Terminated,
    #[serde(other)]
    Unknown,
}

impl InstanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Provisioning => "PROVISIONING",
            Self::Staging => "STAGING",
            Self::Running => "RUNNING",
            Self::Stopping => "STOPPING",
            Self::Stopped => "STOPPED",
            Self::Suspending => "SUSPENDING",
            Self::Suspended => "SUSPENDED",
            Self::Repairing => "REPAIRING",
            Self::Terminated => "TERMINATED",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A compute instance carrying the `runner-name` metadata convention.
///
/// Serialized form is the instance summary reported after a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeInstance {
    pub instance_name: String,

    #[serde(rename = "runner_name")]
    pub runner_label: String,

    #[serde(rename = "github_scope", default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    pub status: InstanceStatus,
}

impl ComputeInstance {
    pub fn new(
        instance_name: impl Into<String>,
        runner_label: impl Into<String>,
        status: InstanceStatus,
    ) -> Self {
        Self {
            instance_name: instance_name.into(),
            runner_label: runner_label.into(),
            scope: None,
            status,
        }
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Whether this instance may be managed on behalf of `scope`.
    ///
    /// Unscoped instances are managed by every pass in their zone.
    pub fn is_in_scope(&self, scope: &str) -> bool {
        self.scope.as_deref().is_none_or(|s| s == scope)
    }
}

/// Everything one pass needs to know about where to look.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileTarget {
    pub project: String,
    pub zone: String,
    pub organization: String,
    pub repository: String,
}

impl ReconcileTarget {
    /// `org/repo`, the value compared against `github-scope`.
    pub fn scope(&self) -> String {
        format!("{}/{}", self.organization, self.repository)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_work_status_deserializes_unknown_values() {
        let status: WorkStatus = serde_json::from_str("\"in_progress\"").unwrap();
        assert_eq!(status, WorkStatus::InProgress);

        let status: WorkStatus = serde_json::from_str("\"action_required\"").unwrap();
        assert_eq!(status, WorkStatus::Unknown);
        assert!(!status.is_terminal());
        assert!(WorkStatus::Completed.is_terminal());
    }

    #[test]
    fn test_instance_status_uses_provider_spelling() {
        let status: InstanceStatus = serde_json::from_str("\"TERMINATED\"").unwrap();
        assert_eq!(status, InstanceStatus::Terminated);
        assert_eq!(
            serde_json::to_string(&InstanceStatus::Running).unwrap(),
            "\"RUNNING\""
        );
    }

    #[test]
    fn test_instance_summary_serialization() {
        let instance = ComputeInstance::new("agent-1", "build_agent", InstanceStatus::Terminated);
        let json = serde_json::to_value(&instance).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "instance_name": "agent-1",
                "runner_name": "build_agent",
                "status": "TERMINATED",
            })
        );
    }

    #[test]
    fn test_scope_matching() {
        let target = ReconcileTarget {
            project: "p".to_string(),
            zone: "z".to_string(),
            organization: "acme".to_string(),
            repository: "game".to_string(),
        };
        let scope = target.scope();

        let unscoped = ComputeInstance::new("a", "l", InstanceStatus::Running);
        let ours = unscoped.clone().with_scope("acme/game");
        let theirs = unscoped.clone().with_scope("acme/tools");

        assert!(unscoped.is_in_scope(&scope));
        assert!(ours.is_in_scope(&scope));
        assert!(!theirs.is_in_scope(&scope));
    }
}

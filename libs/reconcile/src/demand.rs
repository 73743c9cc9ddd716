//! Demand resolution: which runner labels do active jobs still need?
//!
//! Live jobs are joined to workflow file entries by name. The build system
//! does not report a job's labels reliably, so the labels come from the
//! workflow file as committed at the run's head commit.

use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, info};

use crate::error::ReconcileError;
use crate::ports::BuildSystem;
use crate::types::{WorkflowJob, WorkflowRun};
use crate::workflow::{extract_job_labels, JobLabels};

/// Deduplicated runner labels in first-discovery order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RequiredLabels {
    labels: Vec<String>,
    #[serde(skip)]
    seen: HashSet<String>,
}

impl RequiredLabels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a label; returns false if it was already present.
    pub fn insert(&mut self, label: impl Into<String>) -> bool {
        let label = label.into();
        if self.seen.contains(&label) {
            return false;
        }
        self.seen.insert(label.clone());
        self.labels.push(label);
        true
    }

    pub fn contains(&self, label: &str) -> bool {
        self.seen.contains(label)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.labels
    }

    pub fn into_vec(self) -> Vec<String> {
        self.labels
    }
}

impl<S: Into<String>> FromIterator<S> for RequiredLabels {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut labels = Self::new();
        labels.extend(iter);
        labels
    }
}

impl<S: Into<String>> Extend<S> for RequiredLabels {
    fn extend<I: IntoIterator<Item = S>>(&mut self, iter: I) {
        for label in iter {
            self.insert(label);
        }
    }
}

/// Labels needed by the non-terminal jobs of one run.
///
/// Jobs whose name has no entry in `job_labels` contribute nothing.
pub fn labels_for_jobs(jobs: &[WorkflowJob], job_labels: &JobLabels) -> RequiredLabels {
    let mut required = RequiredLabels::new();

    for job in jobs.iter().filter(|job| !job.status.is_terminal()) {
        match job_labels.get(&job.name) {
            Some(labels) => required.extend(labels.iter().cloned()),
            None => debug!(
                job = %job.name,
                status = %job.status,
                "Job has no matching entry in workflow file"
            ),
        }
    }

    required
}

/// Drop repeated runs, keeping the first occurrence of each id.
fn dedupe_runs(runs: Vec<WorkflowRun>) -> Vec<WorkflowRun> {
    let mut seen = HashSet::new();
    runs.into_iter().filter(|run| seen.insert(run.id)).collect()
}

/// Resolves the label demand of a repository's active runs.
pub struct DemandResolver<'a> {
    build_system: &'a dyn BuildSystem,
}

impl<'a> DemandResolver<'a> {
    pub fn new(build_system: &'a dyn BuildSystem) -> Self {
        Self { build_system }
    }

    /// Labels required by every active, non-terminal job of `org/repo`.
    ///
    /// Stops at the first failing lookup; no partial result is returned.
    pub async fn resolve_required_labels(
        &self,
        org: &str,
        repo: &str,
    ) -> Result<RequiredLabels, ReconcileError> {
        let runs = dedupe_runs(self.build_system.list_active_runs(org, repo).await?);
        debug!(org, repo, run_count = runs.len(), "Listed active workflow runs");

        let mut required = RequiredLabels::new();
        for run in &runs {
            let labels = self.labels_for_run(org, repo, run).await?;
            required.extend(labels.into_vec());
        }

        info!(
            org,
            repo,
            labels = ?required.as_slice(),
            "Resolved required runner labels"
        );
        Ok(required)
    }

    async fn labels_for_run(
        &self,
        org: &str,
        repo: &str,
        run: &WorkflowRun,
    ) -> Result<RequiredLabels, ReconcileError> {
        let path = self
            .build_system
            .resolve_workflow_path(org, repo, run.workflow_id)
            .await?;

        let document = self
            .build_system
            .fetch_workflow_file(org, repo, &run.head_sha, &path)
            .await?;
        let job_labels = extract_job_labels(&document)?;

        let jobs = self.build_system.list_jobs(org, repo, run.id).await?;
        let required = labels_for_jobs(&jobs, &job_labels);

        debug!(
            run_id = run.id,
            status = %run.status,
            workflow = %path,
            commit = %run.head_sha,
            job_count = jobs.len(),
            labels = ?required.as_slice(),
            "Resolved labels for workflow run"
        );
        Ok(required)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::WorkStatus;

    fn job(name: &str, status: WorkStatus) -> WorkflowJob {
        WorkflowJob {
            name: name.to_string(),
            status,
        }
    }

    fn labels(pairs: &[(&str, &[&str])]) -> JobLabels {
        pairs
            .iter()
            .map(|(name, labels)| {
                (
                    name.to_string(),
                    labels.iter().map(|l| l.to_string()).collect(),
                )
            })
            .collect()
    }

    #[test]
    fn test_required_labels_dedupe_preserves_order() {
        let required: RequiredLabels = ["b", "a", "b", "c", "a"].into_iter().collect();

        assert_eq!(required.as_slice(), ["b", "a", "c"]);
        assert!(required.contains("c"));
        assert!(!required.contains("d"));
        assert_eq!(required.len(), 3);
    }

    #[test]
    fn test_labels_for_jobs_skips_completed() {
        let jobs = vec![
            job("job1", WorkStatus::Queued),
            job("job2", WorkStatus::InProgress),
            job("job3", WorkStatus::Completed),
        ];
        let job_labels = labels(&[
            ("job1", &["runner1", "runner3"]),
            ("job2", &["runner2", "runner3"]),
            ("job3", &["runner2", "runner4"]),
        ]);

        let required = labels_for_jobs(&jobs, &job_labels);

        assert_eq!(required.as_slice(), ["runner1", "runner3", "runner2"]);
    }

    #[test]
    fn test_labels_for_jobs_ignores_unknown_names() {
        let jobs = vec![
            job("build (ubuntu)", WorkStatus::Queued),
            job("build", WorkStatus::Waiting),
        ];
        let job_labels = labels(&[("build", &["linux"])]);

        let required = labels_for_jobs(&jobs, &job_labels);

        assert_eq!(required.as_slice(), ["linux"]);
    }

    #[test]
    fn test_dedupe_runs_keeps_first() {
        let run = |id, status| WorkflowRun {
            id,
            status,
            workflow_id: 7,
            head_sha: format!("sha-{id}"),
        };
        let runs = vec![
            run(1, WorkStatus::Queued),
            run(2, WorkStatus::Queued),
            run(1, WorkStatus::InProgress),
        ];

        let unique = dedupe_runs(runs);

        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0].status, WorkStatus::Queued);
        assert_eq!(unique[1].id, 2);
    }
}

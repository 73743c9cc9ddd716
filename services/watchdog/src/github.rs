//! GitHub Actions client.
//!
//! Provides the build-system side of a pass:
//! - Listing queued and in-progress workflow runs
//! - Resolving a workflow id to its file path
//! - Fetching the raw workflow file at a commit
//! - Listing the jobs of a run

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;
use watchdog_reconcile::{BuildSystem, RemoteError, WorkStatus, WorkflowJob, WorkflowRun};

use crate::config::GitHubConfig;
use crate::http;

/// Page size requested from list endpoints (GitHub's maximum).
const PER_PAGE: usize = 100;

/// Upper bound on pages read from a single listing.
const MAX_PAGES: u32 = 50;

/// Run statuses that count as active demand.
const ACTIVE_STATUSES: [&str; 2] = ["queued", "in_progress"];

/// GitHub REST API client.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    client: reqwest::Client,
    api_url: String,
    web_url: String,
}

impl GitHubClient {
    /// Create a new client; authenticates with the token when one is set.
    pub fn new(config: &GitHubConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github.v3+json"),
        );

        if let Some(token) = &config.token {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .context("Invalid GitHub token format")?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(http::USER_AGENT)
            .timeout(http::REQUEST_TIMEOUT)
            .build()
            .context("Failed to create GitHub HTTP client")?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            web_url: config.web_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        operation: &str,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, RemoteError> {
        let response = http::send(operation, self.client.get(url).query(query)).await?;
        http::json(operation, response).await
    }

    /// Read every page of a listing endpoint.
    async fn get_all_pages<P: Page>(
        &self,
        operation: &str,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<P::Item>, RemoteError> {
        let mut items = Vec::new();

        for page in 1..=MAX_PAGES {
            let mut page_query = query.to_vec();
            page_query.push(("per_page", PER_PAGE.to_string()));
            page_query.push(("page", page.to_string()));

            let body: P = self.get_json(operation, url, &page_query).await?;
            let total = body.total_count();
            let page_items = body.into_items();
            let received = page_items.len();
            items.extend(page_items);

            let reached_total = total.is_some_and(|total| items.len() as u64 >= total);
            if received < PER_PAGE || reached_total {
                break;
            }
        }

        Ok(items)
    }

    async fn list_runs_with_status(
        &self,
        org: &str,
        repo: &str,
        status: &str,
    ) -> Result<Vec<WorkflowRun>, RemoteError> {
        let url = format!("{}/repos/{org}/{repo}/actions/runs", self.api_url);
        let operation = format!("list {status} workflow runs for {org}/{repo}");

        let runs: Vec<RunBody> = self
            .get_all_pages::<RunsPage>(&operation, &url, &[("status", status.to_string())])
            .await?;

        debug!(org, repo, status, count = runs.len(), "Listed workflow runs");
        Ok(runs.into_iter().map(RunBody::into_run).collect())
    }
}

#[async_trait]
impl BuildSystem for GitHubClient {
    async fn list_active_runs(
        &self,
        org: &str,
        repo: &str,
    ) -> Result<Vec<WorkflowRun>, RemoteError> {
        let mut runs = Vec::new();
        for status in ACTIVE_STATUSES {
            runs.extend(self.list_runs_with_status(org, repo, status).await?);
        }
        Ok(runs)
    }

    async fn resolve_workflow_path(
        &self,
        org: &str,
        repo: &str,
        workflow_id: u64,
    ) -> Result<String, RemoteError> {
        let url = format!(
            "{}/repos/{org}/{repo}/actions/workflows/{workflow_id}",
            self.api_url
        );
        let operation = format!("get workflow {workflow_id} of {org}/{repo}");

        let workflow: WorkflowBody = self.get_json(&operation, &url, &[]).await?;
        Ok(workflow.path)
    }

    async fn fetch_workflow_file(
        &self,
        org: &str,
        repo: &str,
        commit: &str,
        path: &str,
    ) -> Result<String, RemoteError> {
        let url = format!(
            "{}/{org}/{repo}/raw/{commit}/{}",
            self.web_url,
            path.trim_start_matches('/')
        );
        let operation = format!("fetch {path} of {org}/{repo} at {commit}");
        debug!(url = %url, "Fetching workflow file");

        let response = http::send(&operation, self.client.get(&url)).await?;
        http::text(&operation, response).await
    }

    async fn list_jobs(
        &self,
        org: &str,
        repo: &str,
        run_id: u64,
    ) -> Result<Vec<WorkflowJob>, RemoteError> {
        let url = format!("{}/repos/{org}/{repo}/actions/runs/{run_id}/jobs", self.api_url);
        let operation = format!("list jobs of run {run_id} in {org}/{repo}");

        let jobs: Vec<JobBody> = self
            .get_all_pages::<JobsPage>(&operation, &url, &[])
            .await?;
        Ok(jobs.into_iter().map(JobBody::into_job).collect())
    }
}

/// A paginated GitHub listing response.
trait Page: DeserializeOwned {
    type Item;

    /// Size of the whole listing, when the endpoint reports it.
    fn total_count(&self) -> Option<u64>;

    fn into_items(self) -> Vec<Self::Item>;
}

#[derive(Debug, Deserialize)]
struct RunsPage {
    #[serde(default)]
    total_count: Option<u64>,
    workflow_runs: Vec<RunBody>,
}

impl Page for RunsPage {
    type Item = RunBody;

    fn total_count(&self) -> Option<u64> {
        self.total_count
    }

    fn into_items(self) -> Vec<RunBody> {
        self.workflow_runs
    }
}

#[derive(Debug, Deserialize)]
struct RunBody {
    id: u64,
    #[serde(default)]
    status: Option<WorkStatus>,
    workflow_id: u64,
    head_sha: String,
}

impl RunBody {
    fn into_run(self) -> WorkflowRun {
        WorkflowRun {
            id: self.id,
            status: self.status.unwrap_or(WorkStatus::Unknown),
            workflow_id: self.workflow_id,
            head_sha: self.head_sha,
        }
    }
}

#[derive(Debug, Deserialize)]
struct JobsPage {
    #[serde(default)]
    total_count: Option<u64>,
    jobs: Vec<JobBody>,
}

impl Page for JobsPage {
    type Item = JobBody;

    fn total_count(&self) -> Option<u64> {
        self.total_count
    }

    fn into_items(self) -> Vec<JobBody> {
        self.jobs
    }
}

#[derive(Debug, Deserialize)]
struct JobBody {
    name: String,
    #[serde(default)]
    status: Option<WorkStatus>,
}

impl JobBody {
    fn into_job(self) -> WorkflowJob {
        WorkflowJob {
            name: self.name,
            status: self.status.unwrap_or(WorkStatus::Unknown),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WorkflowBody {
    path: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_body_tolerates_null_status() {
        let body: RunsPage = serde_json::from_value(serde_json::json!({
            "total_count": 1,
            "workflow_runs": [
                {"id": 5, "status": null, "workflow_id": 9, "head_sha": "abc", "name": "Build"}
            ]
        }))
        .unwrap();

        let run = body.into_items().remove(0).into_run();
        assert_eq!(run.id, 5);
        assert_eq!(run.status, WorkStatus::Unknown);
        assert_eq!(run.workflow_id, 9);
    }

    #[test]
    fn test_client_trims_base_urls() {
        let client = GitHubClient::new(&GitHubConfig {
            api_url: "https://api.github.com/".to_string(),
            web_url: "https://github.com/".to_string(),
            token: Some("ghp_test".to_string()),
        })
        .unwrap();

        assert_eq!(client.api_url, "https://api.github.com");
        assert_eq!(client.web_url, "https://github.com");
    }
}

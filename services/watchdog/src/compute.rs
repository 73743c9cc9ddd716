//! Compute Engine client for on-demand build agents.
//!
//! Instances opt in to management through metadata: `runner-name` names the
//! runner label the instance serves, `github-scope` optionally pins it to one
//! `org/repo`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;
use watchdog_reconcile::{
    ComputeFleet, ComputeInstance, InstanceStatus, RemoteError, GITHUB_SCOPE_KEY, RUNNER_NAME_KEY,
};

use crate::config::ComputeConfig;
use crate::credentials::AccessTokenSource;
use crate::http;

/// Compute Engine REST client.
#[derive(Debug)]
pub struct ComputeClient {
    client: reqwest::Client,
    api_url: String,
    tokens: AccessTokenSource,
}

impl ComputeClient {
    pub fn new(config: &ComputeConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(http::USER_AGENT)
            .timeout(http::REQUEST_TIMEOUT)
            .build()
            .context("Failed to create Compute Engine HTTP client")?;

        let tokens = match &config.access_token {
            Some(token) => AccessTokenSource::fixed(token.clone()),
            None => AccessTokenSource::metadata_server(client.clone(), &config.metadata_token_url),
        };

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            tokens,
        })
    }

    fn instances_url(&self, project: &str, zone: &str) -> String {
        format!(
            "{}/compute/v1/projects/{project}/zones/{zone}/instances",
            self.api_url
        )
    }

    /// POST `{instance}/{verb}`; the returned zone operation is not awaited.
    async fn transition(
        &self,
        project: &str,
        zone: &str,
        instance_name: &str,
        verb: &str,
    ) -> Result<(), RemoteError> {
        let url = format!(
            "{}/{instance_name}/{verb}",
            self.instances_url(project, zone)
        );
        let operation = format!("{verb} instance {instance_name} in {project}/{zone}");
        let token = self.tokens.token().await?;

        http::send(&operation, self.client.post(&url).bearer_auth(token)).await?;
        Ok(())
    }
}

#[async_trait]
impl ComputeFleet for ComputeClient {
    async fn list_managed_instances(
        &self,
        project: &str,
        zone: &str,
    ) -> Result<Vec<ComputeInstance>, RemoteError> {
        let url = self.instances_url(project, zone);
        let operation = format!("list instances in {project}/{zone}");
        let token = self.tokens.token().await?;

        let mut managed = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut request = self.client.get(&url).bearer_auth(&token);
            if let Some(page_token) = &page_token {
                request = request.query(&[("pageToken", page_token)]);
            }

            let response = http::send(&operation, request).await?;
            let page: InstanceList = http::json(&operation, response).await?;

            for instance in page.items {
                let name = instance.name.clone();
                match instance.into_managed() {
                    Some(managed_instance) => managed.push(managed_instance),
                    None => debug!(instance = %name, "Skipping instance without runner-name"),
                }
            }

            match page.next_page_token {
                Some(next) if !next.is_empty() => page_token = Some(next),
                _ => break,
            }
        }

        Ok(managed)
    }

    async fn start(
        &self,
        project: &str,
        zone: &str,
        instance_name: &str,
    ) -> Result<(), RemoteError> {
        self.transition(project, zone, instance_name, "start").await
    }

    async fn stop(
        &self,
        project: &str,
        zone: &str,
        instance_name: &str,
    ) -> Result<(), RemoteError> {
        self.transition(project, zone, instance_name, "stop").await
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstanceList {
    #[serde(default)]
    items: Vec<InstanceBody>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InstanceBody {
    name: String,
    status: InstanceStatus,
    #[serde(default)]
    metadata: Option<Metadata>,
}

#[derive(Debug, Deserialize)]
struct Metadata {
    #[serde(default)]
    items: Vec<MetadataItem>,
}

#[derive(Debug, Deserialize)]
struct MetadataItem {
    key: String,
    #[serde(default)]
    value: Option<String>,
}

impl InstanceBody {
    fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata
            .as_ref()?
            .items
            .iter()
            .find(|item| item.key == key)
            .and_then(|item| item.value.as_deref())
            .filter(|value| !value.is_empty())
    }

    /// The instance as the engine sees it, if it carries `runner-name`.
    fn into_managed(self) -> Option<ComputeInstance> {
        let runner_label = self.metadata_value(RUNNER_NAME_KEY)?.to_string();
        let scope = self.metadata_value(GITHUB_SCOPE_KEY).map(str::to_string);

        Some(ComputeInstance {
            instance_name: self.name,
            runner_label,
            scope,
            status: self.status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(value: serde_json::Value) -> InstanceBody {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_into_managed_reads_metadata() {
        let instance = body(serde_json::json!({
            "name": "agent-1",
            "status": "TERMINATED",
            "metadata": {
                "items": [
                    {"key": "startup-script", "value": "echo hi"},
                    {"key": "runner-name", "value": "build_agent"},
                    {"key": "github-scope", "value": "acme/game"}
                ]
            }
        }));

        let managed = instance.into_managed().unwrap();
        assert_eq!(managed.instance_name, "agent-1");
        assert_eq!(managed.runner_label, "build_agent");
        assert_eq!(managed.scope.as_deref(), Some("acme/game"));
        assert_eq!(managed.status, InstanceStatus::Terminated);
    }

    #[test]
    fn test_into_managed_ignores_on_demand_flag() {
        let flagged_off = body(serde_json::json!({
            "name": "agent-3",
            "status": "RUNNING",
            "metadata": {
                "items": [
                    {"key": "on-demand", "value": "false"},
                    {"key": "runner-name", "value": "gpu_agent"}
                ]
            }
        }));
        let flag_only = body(serde_json::json!({
            "name": "agent-4",
            "status": "RUNNING",
            "metadata": {"items": [{"key": "on-demand", "value": "true"}]}
        }));

        let managed = flagged_off.into_managed().unwrap();
        assert_eq!(managed.runner_label, "gpu_agent");
        assert_eq!(managed.scope, None);
        assert!(flag_only.into_managed().is_none());
    }

    #[test]
    fn test_into_managed_skips_untagged_instances() {
        let no_metadata = body(serde_json::json!({"name": "db", "status": "RUNNING"}));
        let empty_tag = body(serde_json::json!({
            "name": "web",
            "status": "RUNNING",
            "metadata": {"items": [{"key": "runner-name", "value": ""}]}
        }));

        assert!(no_metadata.into_managed().is_none());
        assert!(empty_tag.into_managed().is_none());
    }
}

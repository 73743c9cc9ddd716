//! Configuration for the watchdog.
//!
//! Every setting can come from a command-line flag or its environment
//! variable. The four target settings are required; their absence is reported
//! before any remote call is made.

use clap::Args;
use thiserror::Error;
use watchdog_reconcile::ReconcileTarget;

use crate::credentials::DEFAULT_METADATA_TOKEN_URL;

pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";
pub const DEFAULT_GITHUB_WEB_URL: &str = "https://github.com";
pub const DEFAULT_COMPUTE_API_URL: &str = "https://compute.googleapis.com";

/// Configuration errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting --{flag} (or {env})")]
    Missing {
        flag: &'static str,
        env: &'static str,
    },

    #[error("invalid {name}: {message}")]
    Invalid { name: &'static str, message: String },
}

/// Raw settings as parsed from flags and environment.
#[derive(Debug, Clone, Default, Args)]
pub struct Settings {
    /// Google Cloud project containing the build agents.
    #[arg(long, global = true, env = "GCP_PROJECT")]
    pub project: Option<String>,

    /// Compute Engine zone containing the build agents.
    #[arg(long, global = true, env = "GCE_ZONE")]
    pub zone: Option<String>,

    /// GitHub organization owning the repository.
    #[arg(long, global = true, env = "GITHUB_ORGANIZATION")]
    pub organization: Option<String>,

    /// GitHub repository containing the workflows.
    #[arg(long, global = true, env = "GITHUB_REPOSITORY")]
    pub repository: Option<String>,

    /// GitHub token; anonymous access when omitted.
    #[arg(long, global = true, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,

    /// GitHub REST API base URL.
    #[arg(long, global = true, env = "GITHUB_API_URL")]
    pub github_api_url: Option<String>,

    /// GitHub web base URL, used for raw workflow files.
    #[arg(long, global = true, env = "GITHUB_WEB_URL")]
    pub github_web_url: Option<String>,

    /// Compute Engine API base URL.
    #[arg(long, global = true, env = "COMPUTE_API_URL")]
    pub compute_api_url: Option<String>,

    /// Static Compute Engine access token; the metadata server is used otherwise.
    #[arg(long, global = true, env = "GCE_ACCESS_TOKEN", hide_env_values = true)]
    pub compute_token: Option<String>,

    /// Metadata server endpoint serving service account tokens.
    #[arg(long, global = true, env = "GCE_METADATA_TOKEN_URL")]
    pub metadata_token_url: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, env = "WATCHDOG_LOG_LEVEL")]
    pub log_level: Option<String>,
}

/// GitHub client configuration.
#[derive(Debug, Clone)]
pub struct GitHubConfig {
    pub api_url: String,
    pub web_url: String,
    pub token: Option<String>,
}

/// Compute Engine client configuration.
#[derive(Debug, Clone)]
pub struct ComputeConfig {
    pub api_url: String,
    pub access_token: Option<String>,
    pub metadata_token_url: String,
}

/// Validated watchdog configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub target: ReconcileTarget,
    pub github: GitHubConfig,
    pub compute: ComputeConfig,
    pub log_level: String,
}

/// Treat unset and blank values alike.
fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required(
    value: Option<String>,
    flag: &'static str,
    env: &'static str,
) -> Result<String, ConfigError> {
    non_empty(value).ok_or(ConfigError::Missing { flag, env })
}

fn url(
    value: Option<String>,
    default: &str,
    name: &'static str,
) -> Result<String, ConfigError> {
    let url = non_empty(value).unwrap_or_else(|| default.to_string());
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(ConfigError::Invalid {
            name,
            message: format!("expected an http(s) URL, got '{url}'"),
        });
    }
    Ok(url)
}

impl Config {
    /// Validate raw settings.
    pub fn from_settings(settings: Settings) -> Result<Self, ConfigError> {
        let target = ReconcileTarget {
            project: required(settings.project, "project", "GCP_PROJECT")?,
            zone: required(settings.zone, "zone", "GCE_ZONE")?,
            organization: required(
                settings.organization,
                "organization",
                "GITHUB_ORGANIZATION",
            )?,
            repository: required(settings.repository, "repository", "GITHUB_REPOSITORY")?,
        };

        let github = GitHubConfig {
            api_url: url(settings.github_api_url, DEFAULT_GITHUB_API_URL, "github-api-url")?,
            web_url: url(settings.github_web_url, DEFAULT_GITHUB_WEB_URL, "github-web-url")?,
            token: non_empty(settings.github_token),
        };

        let compute = ComputeConfig {
            api_url: url(
                settings.compute_api_url,
                DEFAULT_COMPUTE_API_URL,
                "compute-api-url",
            )?,
            access_token: non_empty(settings.compute_token),
            metadata_token_url: url(
                settings.metadata_token_url,
                DEFAULT_METADATA_TOKEN_URL,
                "metadata-token-url",
            )?,
        };

        let log_level = non_empty(settings.log_level).unwrap_or_else(|| "info".to_string());

        Ok(Self {
            target,
            github,
            compute,
            log_level,
        })
    }
}

//! Access tokens for the Compute Engine API.
//!
//! Either a static token from configuration, or the ambient service account
//! token served by the GCE metadata server, cached until shortly before it
//! expires.

use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;
use watchdog_reconcile::RemoteError;

use crate::http;

/// Default metadata server endpoint for the default service account.
pub const DEFAULT_METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// Tokens are refreshed this long before they expire.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug)]
enum Source {
    Fixed(String),
    MetadataServer {
        client: reqwest::Client,
        url: String,
        cached: Mutex<Option<CachedToken>>,
    },
}

/// Where Compute Engine access tokens come from.
#[derive(Debug)]
pub struct AccessTokenSource {
    source: Source,
}

impl AccessTokenSource {
    /// Always hand out `token`.
    pub fn fixed(token: impl Into<String>) -> Self {
        Self {
            source: Source::Fixed(token.into()),
        }
    }

    /// Fetch tokens from the metadata server at `url`.
    pub fn metadata_server(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            source: Source::MetadataServer {
                client,
                url: url.into(),
                cached: Mutex::new(None),
            },
        }
    }

    /// A bearer token that stays valid for at least another minute.
    pub async fn token(&self) -> Result<String, RemoteError> {
        match &self.source {
            Source::Fixed(token) => Ok(token.clone()),
            Source::MetadataServer {
                client,
                url,
                cached,
            } => {
                let mut cached = cached.lock().await;
                if let Some(token) = cached.as_ref() {
                    if token.expires_at > Instant::now() + EXPIRY_MARGIN {
                        return Ok(token.value.clone());
                    }
                }

                let token = fetch_metadata_token(client, url).await?;
                let value = token.value.clone();
                *cached = Some(token);
                Ok(value)
            }
        }
    }
}

async fn fetch_metadata_token(
    client: &reqwest::Client,
    url: &str,
) -> Result<CachedToken, RemoteError> {
    let operation = "fetch access token from metadata server";
    debug!(url, "Fetching compute access token");

    let response = http::send(
        operation,
        client.get(url).header("Metadata-Flavor", "Google"),
    )
    .await?;
    let body: TokenResponse = http::json(operation, response).await?;

    Ok(CachedToken {
        value: body.access_token,
        expires_at: Instant::now() + Duration::from_secs(body.expires_in),
    })
}

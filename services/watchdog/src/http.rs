//! Response handling shared by the GitHub and Compute Engine clients.

use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::warn;
use watchdog_reconcile::RemoteError;

/// Per-request timeout for every remote call.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// User agent sent to both APIs.
pub const USER_AGENT: &str = concat!("runner-watchdog/", env!("CARGO_PKG_VERSION"));

/// Send a request, mapping transport failures.
pub async fn send(
    operation: &str,
    request: reqwest::RequestBuilder,
) -> Result<reqwest::Response, RemoteError> {
    let response = request
        .send()
        .await
        .map_err(|e| RemoteError::transport(operation, e.to_string()))?;

    ensure_success(operation, response).await
}

/// Turn a non-2xx response into a [`RemoteError`] carrying status and body.
pub async fn ensure_success(
    operation: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    warn!(operation, status = %status, body = %body, "Remote call failed");
    Err(RemoteError::status(operation, status.as_u16(), body))
}

/// Decode a JSON response body.
pub async fn json<T: DeserializeOwned>(
    operation: &str,
    response: reqwest::Response,
) -> Result<T, RemoteError> {
    response
        .json()
        .await
        .map_err(|e| RemoteError::decode(operation, e.to_string()))
}

/// Read a response body as text.
pub async fn text(operation: &str, response: reqwest::Response) -> Result<String, RemoteError> {
    response
        .text()
        .await
        .map_err(|e| RemoteError::decode(operation, e.to_string()))
}

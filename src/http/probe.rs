//! Container health probe against the local server.

use std::time::Duration;

use crate::config::HEALTHCHECK_TIMEOUT_SECS;

/// `GET http://127.0.0.1:{port}/health`; true only on a 2xx answer in time.
pub async fn probe_health(port: u16) -> bool {
    let url = format!("http://127.0.0.1:{}/health", port);

    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(HEALTHCHECK_TIMEOUT_SECS))
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build health check client");
            return false;
        }
    };

    match client.get(&url).send().await {
        Ok(resp) if resp.status().is_success() => true,
        Ok(resp) => {
            tracing::error!(url = %url, status = resp.status().as_u16(), "Health check failed");
            false
        }
        Err(e) => {
            tracing::error!(url = %url, error = %e, "Health check request failed");
            false
        }
    }
}

//! Single-request HTTP fetcher.
//!
//! One call, one outbound GET with a rotated identity and a bounded
//! timeout, returning the body text or a typed failure. The fetcher
//! never retries internally; retry policy belongs to the caller.

use crate::error::{PubmedError, Result};
use crate::identity::random_user_agent;
use std::time::Duration;
use tracing::debug;

/// Build the shared HTTP client used for all requests in a run.
pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| PubmedError::Config(format!("Failed to build HTTP client: {}", e)))
}

/// Fetch one URL and return its body text.
///
/// Outcomes map onto the error taxonomy directly: `Timeout` when the
/// request deadline elapses, `HttpStatus` for any non-2xx response,
/// `Network` for connection-level failures.
pub async fn fetch_text(client: &reqwest::Client, url: &str) -> Result<String> {
    debug!(url = %url, "Fetching");

    let response = client
        .get(url)
        .header("User-Agent", random_user_agent())
        .header(
            "Accept",
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
        )
        .header("Accept-Language", "en-US,en;q=0.9")
        .send()
        .await
        .map_err(classify_reqwest_error)?;

    let status = response.status();
    if !status.is_success() {
        return Err(PubmedError::HttpStatus(status.as_u16()));
    }

    response.text().await.map_err(classify_reqwest_error)
}

/// Separate timeouts from other transport failures
fn classify_reqwest_error(e: reqwest::Error) -> PubmedError {
    if e.is_timeout() {
        PubmedError::Timeout
    } else {
        PubmedError::Network(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_http_client() {
        let client = build_http_client(Duration::from_secs(5));
        assert!(client.is_ok());
    }

    #[tokio::test]
    async fn test_fetch_invalid_host_is_typed_failure() {
        let client = build_http_client(Duration::from_secs(2)).expect("client");
        let result = fetch_text(&client, "http://invalid.localdomain.invalid/").await;
        match result {
            Err(e) => assert!(e.is_fetch_error()),
            Ok(_) => panic!("expected a fetch failure"),
        }
    }
}

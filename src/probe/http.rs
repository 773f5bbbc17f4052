//! HTTP probe implementation.
//!
//! A redirect answer is reachability evidence, so redirects are not
//! followed and their status codes count as success.

use std::time::Instant;

use super::{ProbeError, HTTP_TIMEOUT};

/// Status codes that count as proof of reachability.
pub const REACHABLE_STATUSES: [u16; 6] = [200, 301, 302, 303, 307, 308];

/// Build the shared probe client: bounded, no redirect following.
pub fn build_client() -> Result<reqwest::Client, ProbeError> {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .map_err(|e| ProbeError::Network(e.to_string()))
}

/// Run one HTTP probe: a single GET against the target URL.
///
/// Returns the time to the response head in milliseconds.
pub async fn check(client: &reqwest::Client, url: &str) -> Result<f64, ProbeError> {
    let start = Instant::now();

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            ProbeError::Timeout(HTTP_TIMEOUT)
        } else {
            ProbeError::Network(e.to_string())
        }
    })?;

    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

    let code = response.status().as_u16();
    if REACHABLE_STATUSES.contains(&code) {
        Ok(elapsed_ms)
    } else {
        Err(ProbeError::Status(code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redirects_count_as_reachable() {
        for code in [200, 301, 302, 303, 307, 308] {
            assert!(REACHABLE_STATUSES.contains(&code));
        }
        for code in [204, 400, 404, 500, 502, 503] {
            assert!(!REACHABLE_STATUSES.contains(&code));
        }
    }

    #[tokio::test]
    async fn test_http_probe_unroutable_host() {
        let client = build_client().unwrap();
        let result = check(&client, "http://256.256.256.256").await;
        assert!(result.is_err());
    }
}

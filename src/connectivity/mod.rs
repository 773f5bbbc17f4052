//! Connectivity sensing: probe batches and the majority-vote verdict.

pub mod state;

use chrono::Utc;

use crate::probe::{self, ProbeError};
use crate::store::{ProbeMethod, ProbeResult, ProbeStatus};

/// Runs one batch of probes against the configured targets.
///
/// Probes execute strictly one after another; a failing probe contributes
/// a failed vote and never stops the rest of the batch.
pub struct ConnectivityChecker {
    ping_targets: Vec<String>,
    http_targets: Vec<String>,
    http_client: reqwest::Client,
}

impl ConnectivityChecker {
    pub fn new(ping_targets: Vec<String>, http_targets: Vec<String>) -> Result<Self, ProbeError> {
        Ok(Self {
            ping_targets,
            http_targets,
            http_client: probe::http::build_client()?,
        })
    }

    /// Probe every configured target once and return one row per probe.
    pub async fn run_batch(&self) -> Vec<ProbeResult> {
        let mut results = Vec::with_capacity(self.ping_targets.len() + self.http_targets.len());

        for target in &self.ping_targets {
            let outcome = probe::ping::check(target).await;
            results.push(to_result(target, ProbeMethod::Ping, outcome));
        }

        for target in &self.http_targets {
            let outcome = probe::http::check(&self.http_client, target).await;
            results.push(to_result(target, ProbeMethod::Http, outcome));
        }

        let successful = results.iter().filter(|r| r.is_connected()).count();
        tracing::debug!(
            "connectivity check: {}/{} probes passed",
            successful,
            results.len()
        );

        results
    }
}

fn to_result(target: &str, method: ProbeMethod, outcome: Result<f64, ProbeError>) -> ProbeResult {
    let (status, response_time_ms) = match outcome {
        Ok(rtt_ms) => (ProbeStatus::Connected, Some(rtt_ms)),
        Err(e) => {
            tracing::debug!("{} probe to {} failed: {}", method, target, e);
            (ProbeStatus::Disconnected, None)
        }
    };

    ProbeResult {
        timestamp: Utc::now(),
        status,
        target: target.to_string(),
        response_time_ms,
        method,
    }
}

/// Combine a probe batch into a single verdict: connected when strictly
/// more than half of the probes succeeded. An exact 50% split counts as
/// disconnected.
///
/// Callers must never pass an empty batch; config validation guarantees at
/// least one target.
pub fn aggregate(results: &[ProbeResult]) -> bool {
    let successful = results.iter().filter(|r| r.is_connected()).count();
    successful as f64 > results.len() as f64 * 0.5
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(successes: usize, failures: usize) -> Vec<ProbeResult> {
        let mut rows = Vec::new();
        for i in 0..successes {
            rows.push(to_result(&format!("10.0.0.{}", i), ProbeMethod::Ping, Ok(1.0)));
        }
        for i in 0..failures {
            rows.push(to_result(
                &format!("10.0.1.{}", i),
                ProbeMethod::Ping,
                Err(ProbeError::Network("unreachable".to_string())),
            ));
        }
        rows
    }

    #[test]
    fn strict_majority_required() {
        // 2 of 4 is exactly 50%: disconnected.
        assert!(!aggregate(&batch(2, 2)));
        // 3 of 4 is a majority: connected.
        assert!(aggregate(&batch(3, 1)));
    }

    #[test]
    fn unanimous_batches() {
        assert!(aggregate(&batch(6, 0)));
        assert!(!aggregate(&batch(0, 6)));
    }

    #[test]
    fn failed_probe_has_no_response_time() {
        let rows = batch(1, 1);
        assert_eq!(rows[0].status, ProbeStatus::Connected);
        assert!(rows[0].response_time_ms.is_some());
        assert_eq!(rows[1].status, ProbeStatus::Disconnected);
        assert!(rows[1].response_time_ms.is_none());
    }
}

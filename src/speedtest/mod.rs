//! Speed-test execution via external measurement tools.
//!
//! Candidate tools are tried in order behind one adapter trait; the first
//! success wins. The runner always produces a record, failures included.

pub mod legacy;
pub mod ookla;

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tokio::process::Command;

use crate::store::{SpeedTestRecord, SpeedTestStatus};

/// Wall-clock bound for one tool invocation.
pub const SPEEDTEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Tool adapter error types.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("tool not found")]
    NotFound,
    #[error("{0}")]
    Failed(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("parse error: {0}")]
    Parse(String),
}

/// Normalized measurement produced by any tool adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeedSample {
    pub download_mbps: f64,
    pub upload_mbps: f64,
    pub ping_ms: f64,
    pub server: String,
}

/// A speed-test tool: run the external program and parse its output into
/// a normalized sample.
#[async_trait]
pub trait SpeedTool: Send + Sync {
    fn name(&self) -> &'static str;
    async fn measure(&self, timeout: Duration) -> Result<SpeedSample, ToolError>;
}

/// Convert a raw bits-per-second figure to megabits per second.
pub(crate) fn bits_to_mbps(bits_per_sec: f64) -> f64 {
    bits_per_sec / 1_000_000.0
}

/// Run an external tool and return its stdout, mapping absence, non-zero
/// exit, and the time bound into `ToolError`.
pub(crate) async fn run_tool(
    program: &str,
    args: &[&str],
    timeout: Duration,
) -> Result<String, ToolError> {
    let output = tokio::time::timeout(
        timeout,
        Command::new(program)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output(),
    )
    .await
    .map_err(|_| ToolError::Timeout(timeout))?
    .map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ToolError::NotFound
        } else {
            ToolError::Failed(format!("failed to execute {}: {}", program, e))
        }
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ToolError::Failed(format!(
            "{} exited with {}: {}",
            program,
            output.status,
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Produces exactly one record per invocation and never fails the caller.
pub struct SpeedTestRunner {
    tools: Vec<Box<dyn SpeedTool>>,
}

impl SpeedTestRunner {
    /// Runner over the default tool chain: Ookla CLI first, the legacy
    /// speedtest-cli as fallback.
    pub fn new() -> Self {
        Self::with_tools(vec![Box::new(ookla::OoklaCli), Box::new(legacy::SpeedtestCli)])
    }

    pub fn with_tools(tools: Vec<Box<dyn SpeedTool>>) -> Self {
        Self { tools }
    }

    /// Try each tool in order; first success wins. Exhausting the chain
    /// yields a FAILED record carrying the last tool's error.
    pub async fn run(&self) -> SpeedTestRecord {
        tracing::info!("running speed test");

        let mut last_failure: Option<(&'static str, ToolError)> = None;

        for tool in &self.tools {
            match tool.measure(SPEEDTEST_TIMEOUT).await {
                Ok(sample) => {
                    tracing::info!(
                        "speed test: {:.1} Mbps down, {:.1} Mbps up, {:.1}ms ping ({})",
                        sample.download_mbps,
                        sample.upload_mbps,
                        sample.ping_ms,
                        sample.server
                    );
                    return SpeedTestRecord {
                        timestamp: Utc::now(),
                        download_mbps: Some(sample.download_mbps),
                        upload_mbps: Some(sample.upload_mbps),
                        ping_ms: Some(sample.ping_ms),
                        server: Some(sample.server),
                        status: SpeedTestStatus::Success,
                    };
                }
                Err(e) => {
                    tracing::debug!("speed test tool {} failed: {}", tool.name(), e);
                    last_failure = Some((tool.name(), e));
                }
            }
        }

        let reason = match last_failure {
            Some((name, e)) => format!("{}: {}", name, e),
            None => "no speed test tools configured".to_string(),
        };
        tracing::error!("speed test failed: {}", reason);

        SpeedTestRecord {
            timestamp: Utc::now(),
            download_mbps: None,
            upload_mbps: None,
            ping_ms: None,
            server: None,
            status: SpeedTestStatus::Failed { reason },
        }
    }
}

impl Default for SpeedTestRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeTool {
        name: &'static str,
        sample: Option<SpeedSample>,
    }

    #[async_trait]
    impl SpeedTool for FakeTool {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn measure(&self, _timeout: Duration) -> Result<SpeedSample, ToolError> {
            match &self.sample {
                Some(s) => Ok(s.clone()),
                None => Err(ToolError::NotFound),
            }
        }
    }

    fn sample(server: &str) -> SpeedSample {
        SpeedSample {
            download_mbps: 500.0,
            upload_mbps: 40.0,
            ping_ms: 8.5,
            server: server.to_string(),
        }
    }

    #[test]
    fn bits_per_second_normalize_to_mbps() {
        assert_eq!(bits_to_mbps(500_000_000.0), 500.0);
        assert_eq!(bits_to_mbps(0.0), 0.0);
    }

    #[tokio::test]
    async fn primary_failure_falls_back_to_secondary() {
        let runner = SpeedTestRunner::with_tools(vec![
            Box::new(FakeTool {
                name: "primary",
                sample: None,
            }),
            Box::new(FakeTool {
                name: "secondary",
                sample: Some(sample("Fallback ISP - Springfield")),
            }),
        ]);

        let record = runner.run().await;
        assert!(record.status.is_success());
        assert_eq!(record.download_mbps, Some(500.0));
        assert_eq!(record.server.as_deref(), Some("Fallback ISP - Springfield"));
    }

    #[tokio::test]
    async fn exhausted_chain_yields_failed_record() {
        let runner = SpeedTestRunner::with_tools(vec![
            Box::new(FakeTool {
                name: "primary",
                sample: None,
            }),
            Box::new(FakeTool {
                name: "secondary",
                sample: None,
            }),
        ]);

        let record = runner.run().await;
        assert!(!record.status.is_success());
        assert_eq!(record.download_mbps, None);
        assert_eq!(record.server, None);
        match record.status {
            SpeedTestStatus::Failed { reason } => {
                assert!(reason.contains("secondary"));
                assert!(reason.contains("tool not found"));
            }
            SpeedTestStatus::Success => panic!("expected failure"),
        }
    }

    #[tokio::test]
    async fn first_success_short_circuits() {
        let runner = SpeedTestRunner::with_tools(vec![
            Box::new(FakeTool {
                name: "primary",
                sample: Some(sample("Primary ISP - Shelbyville")),
            }),
            Box::new(FakeTool {
                name: "secondary",
                sample: Some(sample("Fallback ISP - Springfield")),
            }),
        ]);

        let record = runner.run().await;
        assert_eq!(record.server.as_deref(), Some("Primary ISP - Shelbyville"));
    }
}

//! Adapter for the legacy `speedtest-cli` tool.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::{bits_to_mbps, run_tool, SpeedSample, SpeedTool, ToolError};

/// JSON shape of `speedtest-cli --json`. Unlike the Ookla schema these
/// fields are required; their absence means unusable output.
#[derive(Debug, Deserialize)]
struct CliReport {
    /// Bits per second.
    download: f64,
    /// Bits per second.
    upload: f64,
    ping: f64,
    server: CliServer,
}

#[derive(Debug, Deserialize)]
struct CliServer {
    sponsor: String,
    name: String,
}

pub(crate) fn parse_report(json: &str) -> Result<SpeedSample, ToolError> {
    let report: CliReport =
        serde_json::from_str(json).map_err(|e| ToolError::Parse(e.to_string()))?;

    Ok(SpeedSample {
        download_mbps: bits_to_mbps(report.download),
        upload_mbps: bits_to_mbps(report.upload),
        ping_ms: report.ping,
        server: format!("{} - {}", report.server.sponsor, report.server.name),
    })
}

/// The deprecated python speedtest-cli, kept as fallback.
pub struct SpeedtestCli;

#[async_trait]
impl SpeedTool for SpeedtestCli {
    fn name(&self) -> &'static str {
        "speedtest-cli"
    }

    async fn measure(&self, timeout: Duration) -> Result<SpeedSample, ToolError> {
        let stdout = run_tool("speedtest-cli", &["--json"], timeout).await?;
        parse_report(&stdout)
    }
}

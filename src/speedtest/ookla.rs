//! Adapter for the Ookla `speedtest` CLI.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::{bits_to_mbps, run_tool, SpeedSample, SpeedTool, ToolError};

/// JSON shape of `speedtest --format=json`. Missing sections default to
/// zero rather than failing the whole measurement.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct OoklaReport {
    download: Transfer,
    upload: Transfer,
    ping: Ping,
    server: Server,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Transfer {
    /// Bits per second.
    bandwidth: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Ping {
    latency: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Server {
    name: String,
    location: String,
}

pub(crate) fn parse_report(json: &str) -> Result<SpeedSample, ToolError> {
    let report: OoklaReport =
        serde_json::from_str(json).map_err(|e| ToolError::Parse(e.to_string()))?;

    let name = if report.server.name.is_empty() {
        "Unknown"
    } else {
        &report.server.name
    };

    Ok(SpeedSample {
        download_mbps: bits_to_mbps(report.download.bandwidth),
        upload_mbps: bits_to_mbps(report.upload.bandwidth),
        ping_ms: report.ping.latency,
        server: format!("{} - {}", name, report.server.location),
    })
}

/// The current Ookla CLI, preferred when installed.
pub struct OoklaCli;

#[async_trait]
impl SpeedTool for OoklaCli {
    fn name(&self) -> &'static str {
        "speedtest"
    }

    async fn measure(&self, timeout: Duration) -> Result<SpeedSample, ToolError> {
        let stdout = run_tool("speedtest", &["--format=json"], timeout).await?;
        parse_report(&stdout)
    }
}

//! Summary report generation from the persisted series.
//!
//! A report is recomputed fresh from the series files on every request.
//! A missing or unreadable series degrades its section to "no data"; it
//! never fails the report as a whole.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::store::{DisconnectEvent, EventType, ProbeResult, SpeedTestRecord, Store};

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectivitySummary {
    pub total_probes: usize,
    pub failed_probes: usize,
    pub success_rate_pct: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DisconnectSummary {
    pub count: usize,
    pub total_downtime_s: f64,
    pub avg_duration_s: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpeedTestSummary {
    pub total: usize,
    pub successful: usize,
    pub avg_download_mbps: f64,
    pub min_download_mbps: f64,
    pub max_download_mbps: f64,
    pub avg_upload_mbps: f64,
}

/// Holds no state between runs; every field derives from the series.
#[derive(Debug, Clone)]
pub struct Report {
    pub generated_at: DateTime<Utc>,
    pub connectivity: Option<ConnectivitySummary>,
    pub disconnects: Option<DisconnectSummary>,
    pub speedtests: Option<SpeedTestSummary>,
}

fn connectivity_summary(rows: &[ProbeResult]) -> ConnectivitySummary {
    let total = rows.len();
    let failed = rows.iter().filter(|r| !r.is_connected()).count();
    let success_rate_pct = if total > 0 {
        (total - failed) as f64 / total as f64 * 100.0
    } else {
        0.0
    };

    ConnectivitySummary {
        total_probes: total,
        failed_probes: failed,
        success_rate_pct,
    }
}

fn disconnect_summary(events: &[DisconnectEvent]) -> Option<DisconnectSummary> {
    let durations: Vec<f64> = events
        .iter()
        .filter(|e| e.event_type == EventType::Disconnect)
        .map(|e| e.duration_seconds)
        .collect();

    if durations.is_empty() {
        return None;
    }

    let total_downtime_s: f64 = durations.iter().sum();
    Some(DisconnectSummary {
        count: durations.len(),
        total_downtime_s,
        avg_duration_s: total_downtime_s / durations.len() as f64,
    })
}

fn speedtest_summary(records: &[SpeedTestRecord]) -> Option<SpeedTestSummary> {
    let successful: Vec<&SpeedTestRecord> =
        records.iter().filter(|r| r.status.is_success()).collect();
    if successful.is_empty() {
        return None;
    }

    let downloads: Vec<f64> = successful.iter().filter_map(|r| r.download_mbps).collect();
    let uploads: Vec<f64> = successful.iter().filter_map(|r| r.upload_mbps).collect();
    if downloads.is_empty() {
        return None;
    }

    Some(SpeedTestSummary {
        total: records.len(),
        successful: successful.len(),
        avg_download_mbps: downloads.iter().sum::<f64>() / downloads.len() as f64,
        min_download_mbps: downloads.iter().cloned().fold(f64::INFINITY, f64::min),
        max_download_mbps: downloads.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
        avg_upload_mbps: if uploads.is_empty() {
            0.0
        } else {
            uploads.iter().sum::<f64>() / uploads.len() as f64
        },
    })
}

/// Read all three series and compute the report. Per-series errors are
/// logged and turn into an absent section.
pub fn build_report(store: &Store) -> Report {
    let connectivity = match store.read_probe_results() {
        Ok(rows) => Some(connectivity_summary(&rows)),
        Err(e) => {
            tracing::error!("report: failed to read connectivity series: {}", e);
            None
        }
    };

    let disconnects = match store.read_events() {
        Ok(events) => disconnect_summary(&events),
        Err(e) => {
            tracing::error!("report: failed to read events series: {}", e);
            None
        }
    };

    let speedtests = match store.read_speedtests() {
        Ok(records) => speedtest_summary(&records),
        Err(e) => {
            tracing::error!("report: failed to read speedtest series: {}", e);
            None
        }
    };

    Report {
        generated_at: Utc::now(),
        connectivity,
        disconnects,
        speedtests,
    }
}

/// Render the report as the plain-text artifact.
pub fn render(report: &Report, location: &str) -> String {
    let mut out = String::new();

    out.push_str("Internet Connection Monitoring Report\n");
    out.push_str(&"=".repeat(50));
    out.push('\n');
    out.push_str(&format!("Location: {}\n", location));
    out.push_str(&format!("Generated: {}\n\n", report.generated_at.to_rfc3339()));

    if let Some(c) = &report.connectivity {
        out.push_str("Connectivity Summary:\n");
        out.push_str(&format!("- Total tests: {}\n", c.total_probes));
        out.push_str(&format!("- Failed tests: {}\n", c.failed_probes));
        out.push_str(&format!("- Success rate: {:.1}%\n\n", c.success_rate_pct));
    }

    if let Some(d) = &report.disconnects {
        out.push_str("Disconnection Summary:\n");
        out.push_str(&format!("- Total disconnections: {}\n", d.count));
        out.push_str(&format!(
            "- Total downtime: {:.1} seconds ({:.1} minutes)\n",
            d.total_downtime_s,
            d.total_downtime_s / 60.0
        ));
        out.push_str(&format!(
            "- Average disconnect duration: {:.1} seconds\n\n",
            d.avg_duration_s
        ));
    }

    if let Some(s) = &report.speedtests {
        out.push_str("Speed Test Summary:\n");
        out.push_str(&format!("- Total speed tests: {}\n", s.total));
        out.push_str(&format!("- Successful tests: {}\n", s.successful));
        out.push_str(&format!("- Average download: {:.1} Mbps\n", s.avg_download_mbps));
        out.push_str(&format!("- Average upload: {:.1} Mbps\n", s.avg_upload_mbps));
        out.push_str(&format!("- Min download: {:.1} Mbps\n", s.min_download_mbps));
        out.push_str(&format!("- Max download: {:.1} Mbps\n", s.max_download_mbps));
    }

    out
}

/// Generate and write the report artifact, returning its path.
pub fn write_report(store: &Store, location: &str) -> Result<PathBuf, std::io::Error> {
    let report = build_report(store);
    let path = store.dir().join(format!(
        "report_{}.txt",
        report.generated_at.format("%Y%m%d_%H%M%S")
    ));

    std::fs::write(&path, render(&report, location))?;
    tracing::info!("report generated: {}", path.display());
    Ok(path)
}

/// The most recently modified report artifact in the log directory.
pub fn latest_report(dir: &Path) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;

    entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with("report_") && n.ends_with(".txt"))
                .unwrap_or(false)
        })
        .max_by_key(|p| {
            p.metadata()
                .and_then(|m| m.modified())
                .unwrap_or(std::time::UNIX_EPOCH)
        })
}

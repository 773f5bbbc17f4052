//! Command-line arguments and configuration file handling.
//!
//! Intervals and paths come from the command line; probe targets and the
//! remote-upload destination live in a TOML config file. A default file
//! is written on first run so the operator has something to edit.

use std::path::{Path, PathBuf};

use clap::Parser;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Monitor internet connection and log issues.
#[derive(Debug, Parser)]
#[command(name = "linkwatch", version)]
pub struct Args {
    /// Seconds between connectivity checks
    #[arg(long, default_value_t = 30)]
    pub check_interval: u64,

    /// Seconds between speed tests
    #[arg(long, default_value_t = 3600)]
    pub speedtest_interval: u64,

    /// Seconds between remote uploads
    #[arg(long, default_value_t = 300)]
    pub upload_interval: u64,

    /// Directory for log files and series data
    #[arg(long, default_value = "internet_logs")]
    pub log_dir: PathBuf,

    /// Configuration file
    #[arg(long, default_value = "monitor_config.toml")]
    pub config: PathBuf,

    /// Generate a report from existing logs and exit
    #[arg(long)]
    pub report: bool,

    /// Enable remote uploads in the config file and exit
    #[arg(long)]
    pub enable_upload: bool,
}

/// Configuration error types.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("at least one probe target must be configured")]
    NoTargets,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub monitor: MonitorSection,
    pub remote: RemoteSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSection {
    pub location_name: String,
    /// Literal IP addresses probed with ICMP echo.
    pub ping_targets: Vec<String>,
    /// URLs probed with a single GET.
    pub http_targets: Vec<String>,
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            location_name: "Home Network".to_string(),
            ping_targets: vec![
                "8.8.8.8".to_string(),        // Google DNS
                "1.1.1.1".to_string(),        // Cloudflare DNS
                "208.67.222.222".to_string(), // OpenDNS
            ],
            http_targets: vec![
                "https://www.google.com".to_string(),
                "https://www.cloudflare.com".to_string(),
                "https://httpbin.org/get".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteSection {
    pub enabled: bool,
    pub hostname: String,
    pub username: String,
    pub key_file: PathBuf,
    pub remote_directory: String,
    pub port: u16,
}

impl Default for RemoteSection {
    fn default() -> Self {
        Self {
            enabled: false,
            hostname: "your-vps-hostname.com".to_string(),
            username: "your-username".to_string(),
            key_file: PathBuf::from("~/.ssh/id_rsa"),
            remote_directory: "/opt/internet-monitor".to_string(),
            port: 22,
        }
    }
}

impl MonitorConfig {
    /// Load the config file, writing a default one first if it is absent.
    pub fn load_or_create(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let raw = std::fs::read_to_string(path)?;
            Ok(toml::from_str(&raw)?)
        } else {
            let cfg = Self::default();
            cfg.save(path)?;
            tracing::info!("wrote default config to {}", path.display());
            Ok(cfg)
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// The aggregator's verdict is undefined over an empty batch, so an
    /// empty target set is rejected up front.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.monitor.ping_targets.is_empty() && self.monitor.http_targets.is_empty() {
            return Err(ConfigError::NoTargets);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = MonitorConfig::default();
        assert_eq!(cfg.monitor.location_name, "Home Network");
        assert_eq!(cfg.monitor.ping_targets.len(), 3);
        assert_eq!(cfg.monitor.http_targets.len(), 3);
        assert!(!cfg.remote.enabled);
        assert_eq!(cfg.remote.port, 22);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn load_or_create_writes_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monitor_config.toml");

        let cfg = MonitorConfig::load_or_create(&path).unwrap();
        assert!(path.exists());
        assert_eq!(cfg.monitor.ping_targets.len(), 3);

        // Second load reads the written file back unchanged.
        let reloaded = MonitorConfig::load_or_create(&path).unwrap();
        assert_eq!(reloaded.monitor.ping_targets, cfg.monitor.ping_targets);
        assert_eq!(reloaded.remote.hostname, cfg.remote.hostname);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monitor_config.toml");
        std::fs::write(
            &path,
            "[remote]\nenabled = true\nhostname = \"vps.example.net\"\n",
        )
        .unwrap();

        let cfg = MonitorConfig::load_or_create(&path).unwrap();
        assert!(cfg.remote.enabled);
        assert_eq!(cfg.remote.hostname, "vps.example.net");
        assert_eq!(cfg.remote.port, 22);
        assert_eq!(cfg.monitor.ping_targets.len(), 3);
    }

    #[test]
    fn empty_targets_rejected() {
        let mut cfg = MonitorConfig::default();
        cfg.monitor.ping_targets.clear();
        cfg.monitor.http_targets.clear();
        assert!(matches!(cfg.validate(), Err(ConfigError::NoTargets)));
    }

    #[test]
    fn enable_flag_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monitor_config.toml");

        let mut cfg = MonitorConfig::load_or_create(&path).unwrap();
        cfg.remote.enabled = true;
        cfg.save(&path).unwrap();

        let reloaded = MonitorConfig::load_or_create(&path).unwrap();
        assert!(reloaded.remote.enabled);
    }
}

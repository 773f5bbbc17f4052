//! linkwatch - internet connection monitor.
//!
//! Probes connectivity, logs disconnects, runs periodic speed tests, and
//! summarizes the accumulated history into plain-text reports.

mod config;
mod connectivity;
mod probe;
mod report;
mod scheduler;
mod speedtest;
mod store;
mod upload;

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::{Args, MonitorConfig};
use scheduler::Monitor;
use store::Store;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();

    std::fs::create_dir_all(&args.log_dir)?;
    init_logging(&args.log_dir)?;

    let mut cfg = MonitorConfig::load_or_create(&args.config)?;

    if args.enable_upload {
        cfg.remote.enabled = true;
        cfg.save(&args.config)?;
        println!(
            "Remote uploads enabled. Edit {} with your server details.",
            args.config.display()
        );
        return Ok(());
    }

    let store = Store::new(&args.log_dir)?;

    if args.report {
        report::write_report(&store, &cfg.monitor.location_name)?;
        return Ok(());
    }

    cfg.validate()?;
    let mut monitor = Monitor::new(&args, &cfg, store)?;
    monitor.run().await
}

/// Log to stdout and to `monitor.log` in the log directory.
fn init_logging(log_dir: &Path) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("monitor.log"))?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(Arc::new(log_file))
                .with_ansi(false),
        )
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("linkwatch=info".parse()?),
        )
        .init();

    Ok(())
}

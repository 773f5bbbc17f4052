//! The monitor control loop and its tick-based schedules.
//!
//! One task drives everything: every tick runs a connectivity check, then
//! any slower-cadence action whose interval has elapsed runs inline. The
//! speed test therefore delays the next check by up to its full bound;
//! that latency is an accepted property of the single-loop design.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::Utc;

use crate::config::{Args, MonitorConfig};
use crate::connectivity::{self, state::ConnectionState, ConnectivityChecker};
use crate::probe::ProbeError;
use crate::report;
use crate::speedtest::SpeedTestRunner;
use crate::store::Store;
use crate::upload::Uploader;

/// A periodic action tracked by interval and last run time.
#[derive(Debug)]
pub struct PeriodicAction {
    interval: Duration,
    last_run: Option<Instant>,
}

impl PeriodicAction {
    /// Due on the first tick, then every `interval`.
    pub fn immediate(interval: Duration) -> Self {
        Self {
            interval,
            last_run: None,
        }
    }

    /// First due one full `interval` after `now`.
    pub fn starting_at(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            last_run: Some(now),
        }
    }

    pub fn is_due(&self, now: Instant) -> bool {
        match self.last_run {
            None => true,
            Some(last) => now.duration_since(last) >= self.interval,
        }
    }

    pub fn mark(&mut self, now: Instant) {
        self.last_run = Some(now);
    }
}

/// The long-running monitor: owns the connection state and wires the
/// probes, speed tests, store, and uploader together.
pub struct Monitor {
    check_interval: Duration,
    speedtest_interval: Duration,
    upload_interval: Duration,
    location: String,
    checker: ConnectivityChecker,
    state: ConnectionState,
    store: Store,
    speedtest: SpeedTestRunner,
    uploader: Option<Uploader>,
}

impl Monitor {
    pub fn new(args: &Args, cfg: &MonitorConfig, store: Store) -> Result<Self, ProbeError> {
        let checker = ConnectivityChecker::new(
            cfg.monitor.ping_targets.clone(),
            cfg.monitor.http_targets.clone(),
        )?;

        let uploader = cfg.remote.enabled.then(|| Uploader::new(&cfg.remote));

        Ok(Self {
            check_interval: Duration::from_secs(args.check_interval.max(1)),
            speedtest_interval: Duration::from_secs(args.speedtest_interval.max(1)),
            upload_interval: Duration::from_secs(args.upload_interval.max(1)),
            location: cfg.monitor.location_name.clone(),
            checker,
            state: ConnectionState::new(Utc::now()),
            store,
            speedtest: SpeedTestRunner::new(),
            uploader,
        })
    }

    /// Run until interrupted, then generate one final report.
    ///
    /// The interrupt is honored between actions; in-flight probes and
    /// tool invocations finish under their own timeouts first.
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        tracing::info!("starting internet connection monitor");
        tracing::info!("check interval: {}s", self.check_interval.as_secs());
        tracing::info!("speed test interval: {}s", self.speedtest_interval.as_secs());
        tracing::info!(
            "upload interval: {}s (remote uploads {})",
            self.upload_interval.as_secs(),
            if self.uploader.is_some() {
                "enabled"
            } else {
                "disabled"
            }
        );
        tracing::info!("logs directory: {}", self.store.dir().display());

        let mut speedtest_due = PeriodicAction::immediate(self.speedtest_interval);
        let mut upload_due = PeriodicAction::starting_at(self.upload_interval, Instant::now());

        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            self.check_cycle().await;

            let now = Instant::now();
            if speedtest_due.is_due(now) {
                speedtest_due.mark(now);
                self.speedtest_cycle().await;
            }

            if self.uploader.is_some() {
                let now = Instant::now();
                if upload_due.is_due(now) {
                    upload_due.mark(now);
                    self.upload_cycle().await;
                }
            }

            tokio::select! {
                _ = &mut ctrl_c => {
                    tracing::info!("monitoring stopped by user");
                    break;
                }
                _ = tokio::time::sleep(self.check_interval) => {}
            }
        }

        if let Err(e) = report::write_report(&self.store, &self.location) {
            tracing::error!("failed to generate final report: {}", e);
        }

        Ok(())
    }

    /// One connectivity check: probe batch, verdict, state transition,
    /// persistence. Storage failures are logged and never stop the loop.
    async fn check_cycle(&mut self) {
        let results = self.checker.run_batch().await;
        let verdict = connectivity::aggregate(&results);

        if let Err(e) = self.store.append_probe_results(&results) {
            tracing::error!("failed to record connectivity results: {}", e);
        }

        if let Some(event) = self.state.apply(verdict, Utc::now()) {
            if let Err(e) = self.store.append_event(&event) {
                tracing::error!("failed to record disconnect event: {}", e);
            }
        }
    }

    async fn speedtest_cycle(&self) {
        let record = self.speedtest.run().await;
        if let Err(e) = self.store.append_speedtest(&record) {
            tracing::error!("failed to record speed test: {}", e);
        }
    }

    async fn upload_cycle(&self) {
        let uploader = match &self.uploader {
            Some(u) => u,
            None => return,
        };

        let mut files: Vec<PathBuf> = vec![
            self.store.connectivity_path(),
            self.store.speedtest_path(),
            self.store.events_path(),
        ];
        if let Some(latest) = report::latest_report(self.store.dir()) {
            files.push(latest);
        }

        match uploader.upload(&files).await {
            Ok(outcomes) => {
                let failed = outcomes.iter().filter(|(_, r)| r.is_err()).count();
                if failed == 0 {
                    tracing::info!("log upload completed successfully");
                } else {
                    tracing::error!("log upload finished with {} failed file(s)", failed);
                }
            }
            Err(e) => tracing::error!("log upload failed: {}", e),
        }
    }
}

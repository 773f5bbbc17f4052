//! Append-only CSV series storage.
//!
//! Three durable series live in the log directory: connectivity rows,
//! speed-test rows, and event rows. Each file gets a fixed header the
//! first time it is touched; appends never rewrite prior rows.

mod models;

pub use models::*;

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Storage error types.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

const CONNECTIVITY_FILE: &str = "connectivity.csv";
const SPEEDTEST_FILE: &str = "speedtest.csv";
const EVENTS_FILE: &str = "events.csv";

const CONNECTIVITY_HEADER: [&str; 5] =
    ["timestamp", "status", "target", "response_time_ms", "method"];
const SPEEDTEST_HEADER: [&str; 6] = [
    "timestamp",
    "download_mbps",
    "upload_mbps",
    "ping_ms",
    "server",
    "status",
];
const EVENTS_HEADER: [&str; 4] = ["timestamp", "event_type", "duration_seconds", "details"];

/// Append-only store over the three series files.
///
/// Appends serialize through an internal lock so concurrent writers cannot
/// interleave partial rows; each append is flushed before the lock drops.
pub struct Store {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl Store {
    /// Open a store rooted at `dir`, creating the directory and series
    /// headers as needed.
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;

        let store = Self {
            dir,
            write_lock: Mutex::new(()),
        };
        store.init_series(CONNECTIVITY_FILE, &CONNECTIVITY_HEADER)?;
        store.init_series(SPEEDTEST_FILE, &SPEEDTEST_HEADER)?;
        store.init_series(EVENTS_FILE, &EVENTS_HEADER)?;
        Ok(store)
    }

    /// Directory holding the series files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn connectivity_path(&self) -> PathBuf {
        self.dir.join(CONNECTIVITY_FILE)
    }

    pub fn speedtest_path(&self) -> PathBuf {
        self.dir.join(SPEEDTEST_FILE)
    }

    pub fn events_path(&self) -> PathBuf {
        self.dir.join(EVENTS_FILE)
    }

    /// Write the header row if the series file does not exist yet.
    fn init_series(&self, name: &str, header: &[&str]) -> Result<(), StoreError> {
        let path = self.dir.join(name);
        if path.exists() {
            return Ok(());
        }
        let mut wtr = csv::Writer::from_path(&path)?;
        wtr.write_record(header)?;
        wtr.flush()?;
        Ok(())
    }

    fn append_rows<T: Serialize>(&self, name: &str, rows: &[T]) -> Result<(), StoreError> {
        if rows.is_empty() {
            return Ok(());
        }

        let _guard = self.write_lock.lock().unwrap();
        let file = OpenOptions::new().append(true).open(self.dir.join(name))?;
        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        for row in rows {
            wtr.serialize(row)?;
        }
        wtr.flush()?;
        Ok(())
    }

    /// Full ordered scan of a series. Malformed rows are skipped, not fatal.
    fn scan<T: DeserializeOwned>(&self, name: &str) -> Result<Vec<T>, StoreError> {
        let mut rdr = csv::Reader::from_path(self.dir.join(name))?;
        let mut rows = Vec::new();
        for record in rdr.deserialize() {
            match record {
                Ok(row) => rows.push(row),
                Err(e) => tracing::debug!("skipping malformed row in {}: {}", name, e),
            }
        }
        Ok(rows)
    }

    // --- Connectivity series ---

    pub fn append_probe_results(&self, rows: &[ProbeResult]) -> Result<(), StoreError> {
        self.append_rows(CONNECTIVITY_FILE, rows)
    }

    pub fn read_probe_results(&self) -> Result<Vec<ProbeResult>, StoreError> {
        self.scan(CONNECTIVITY_FILE)
    }

    // --- Speed-test series ---

    pub fn append_speedtest(&self, record: &SpeedTestRecord) -> Result<(), StoreError> {
        self.append_rows(SPEEDTEST_FILE, std::slice::from_ref(record))
    }

    pub fn read_speedtests(&self) -> Result<Vec<SpeedTestRecord>, StoreError> {
        self.scan(SPEEDTEST_FILE)
    }

    // --- Events series ---

    pub fn append_event(&self, event: &DisconnectEvent) -> Result<(), StoreError> {
        self.append_rows(EVENTS_FILE, std::slice::from_ref(event))
    }

    pub fn read_events(&self) -> Result<Vec<DisconnectEvent>, StoreError> {
        self.scan(EVENTS_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn probe_row(target: &str, connected: bool) -> ProbeResult {
        ProbeResult {
            timestamp: Utc::now(),
            status: if connected {
                ProbeStatus::Connected
            } else {
                ProbeStatus::Disconnected
            },
            target: target.to_string(),
            response_time_ms: connected.then_some(12.5),
            method: ProbeMethod::Ping,
        }
    }

    #[test]
    fn appended_rows_scan_back_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path()).unwrap();

        store
            .append_probe_results(&[probe_row("8.8.8.8", true), probe_row("1.1.1.1", false)])
            .unwrap();
        store.append_probe_results(&[probe_row("208.67.222.222", true)]).unwrap();

        let rows = store.read_probe_results().unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].target, "8.8.8.8");
        assert_eq!(rows[0].status, ProbeStatus::Connected);
        assert_eq!(rows[0].response_time_ms, Some(12.5));
        assert_eq!(rows[1].target, "1.1.1.1");
        assert_eq!(rows[1].response_time_ms, None);
        assert_eq!(rows[2].target, "208.67.222.222");
    }

    #[test]
    fn reopen_does_not_duplicate_headers() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = Store::new(dir.path()).unwrap();
            store.append_probe_results(&[probe_row("8.8.8.8", true)]).unwrap();
        }
        {
            let store = Store::new(dir.path()).unwrap();
            store.append_probe_results(&[probe_row("1.1.1.1", true)]).unwrap();
            assert_eq!(store.read_probe_results().unwrap().len(), 2);
        }

        let raw = std::fs::read_to_string(dir.path().join(CONNECTIVITY_FILE)).unwrap();
        assert_eq!(raw.matches("timestamp,status").count(), 1);
    }

    #[test]
    fn speedtest_records_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path()).unwrap();

        store
            .append_speedtest(&SpeedTestRecord {
                timestamp: Utc::now(),
                download_mbps: Some(512.3),
                upload_mbps: Some(48.1),
                ping_ms: Some(9.2),
                server: Some("Example ISP - Springfield".to_string()),
                status: SpeedTestStatus::Success,
            })
            .unwrap();
        store
            .append_speedtest(&SpeedTestRecord {
                timestamp: Utc::now(),
                download_mbps: None,
                upload_mbps: None,
                ping_ms: None,
                server: None,
                status: SpeedTestStatus::Failed {
                    reason: "speedtest: tool not found".to_string(),
                },
            })
            .unwrap();

        let records = store.read_speedtests().unwrap();
        assert_eq!(records.len(), 2);
        assert!(records[0].status.is_success());
        assert_eq!(records[0].download_mbps, Some(512.3));
        assert_eq!(
            records[0].server.as_deref(),
            Some("Example ISP - Springfield")
        );
        assert!(!records[1].status.is_success());
        assert_eq!(records[1].download_mbps, None);
    }

    #[test]
    fn events_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path()).unwrap();

        let start = Utc::now();
        store
            .append_event(&DisconnectEvent::new(start, 42.5, "outage".to_string()))
            .unwrap();

        let events = store.read_events().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::Disconnect);
        assert_eq!(events[0].duration_seconds, 42.5);
        assert_eq!(events[0].timestamp, start);
    }

    #[test]
    fn malformed_rows_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path()).unwrap();
        store.append_probe_results(&[probe_row("8.8.8.8", true)]).unwrap();

        use std::io::Write;
        let mut file = OpenOptions::new()
            .append(true)
            .open(store.connectivity_path())
            .unwrap();
        writeln!(file, "not-a-timestamp,connected,8.8.8.8,oops,ping").unwrap();

        store.append_probe_results(&[probe_row("1.1.1.1", false)]).unwrap();

        let rows = store.read_probe_results().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].target, "1.1.1.1");
    }
}

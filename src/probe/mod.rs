//! Reachability probes.
//!
//! One probe is one bounded check against one target. Probes report
//! failure through `ProbeError`; the connectivity layer turns that into
//! a failed vote, never into an aborted batch.

pub mod http;
pub mod ping;

use std::time::Duration;
use thiserror::Error;

/// Per-attempt timeout for a single echo request.
pub const PING_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(3);
/// Overall wall-clock bound for one ping probe, fallback included.
pub const PING_OVERALL_TIMEOUT: Duration = Duration::from_secs(8);
/// Wall-clock bound for one HTTP probe.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(5);

/// Probe error types.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
    #[error("network error: {0}")]
    Network(String),
    #[error("target is not a literal IP address: {0}")]
    Address(String),
    #[error("command failed: {0}")]
    Command(String),
    #[error("status {0} does not indicate reachability")]
    Status(u16),
}

//! The connected/disconnected state machine with downtime accounting.

use chrono::{DateTime, Utc};

use crate::store::DisconnectEvent;

/// Connection state owned by the control loop.
///
/// Invariant: `disconnect_start` is set if and only if `is_connected`
/// is false.
#[derive(Debug, Clone)]
pub struct ConnectionState {
    pub is_connected: bool,
    pub disconnect_start: Option<DateTime<Utc>>,
    pub last_successful_probe: DateTime<Utc>,
}

impl ConnectionState {
    /// Start optimistically connected, so process boot does not register
    /// a spurious outage before the first check completes.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            is_connected: true,
            disconnect_start: None,
            last_successful_probe: now,
        }
    }

    /// Apply one verdict at time `now`.
    ///
    /// Returns a `DisconnectEvent` exactly once per outage, at the moment
    /// connectivity is restored. Downtime is measured from the check that
    /// first observed the loss.
    pub fn apply(&mut self, connected: bool, now: DateTime<Utc>) -> Option<DisconnectEvent> {
        match (self.is_connected, connected) {
            (true, true) => {
                self.last_successful_probe = now;
                None
            }
            (true, false) => {
                tracing::error!(
                    "internet connection lost (last successful check: {})",
                    self.last_successful_probe.to_rfc3339()
                );
                self.is_connected = false;
                self.disconnect_start = Some(now);
                None
            }
            (false, false) => {
                // Outage continues; downtime accrues implicitly.
                None
            }
            (false, true) => {
                let event = self.disconnect_start.map(|start| {
                    let duration = (now - start).num_milliseconds() as f64 / 1000.0;
                    tracing::warn!("connection restored after {:.1} seconds", duration);
                    DisconnectEvent::new(
                        start,
                        duration,
                        format!(
                            "Disconnected from {} to {}",
                            start.to_rfc3339(),
                            now.to_rfc3339()
                        ),
                    )
                });

                self.is_connected = true;
                self.disconnect_start = None;
                self.last_successful_probe = now;
                event
            }
        }
    }
}

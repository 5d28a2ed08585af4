//! Process-wide monotonic counters, read-only to the outside world.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Counters updated by the Client Hub and Slot Scheduler.
///
/// Lives behind a single `parking_lot::Mutex` in `AppState` — every update
/// already happens on a path that holds some other short-lived lock, so one
/// more plain struct behind one more lock costs nothing and keeps the
/// increments uncomplicated.
#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    #[serde(skip)]
    pub started_at: DateTime<Utc>,
    pub frames_relayed: u64,
    pub osc_messages: u64,
    pub clients_connected: u64,
    pub bridges_spawned: u64,
    pub decode_errors: u64,
    pub osc_unrecognized: u64,
    pub protocol_violations: u64,
}

impl Stats {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            frames_relayed: 0,
            osc_messages: 0,
            clients_connected: 0,
            bridges_spawned: 0,
            decode_errors: 0,
            osc_unrecognized: 0,
            protocol_violations: 0,
        }
    }

    pub fn uptime_ms(&self) -> i64 {
        (Utc::now() - self.started_at).num_milliseconds().max(0)
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

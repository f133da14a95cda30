//! Connectivity status reporting.
//!
//! `ConnectivityEngine::status()` returns a [`StatusReport`]; the display
//! helpers here turn it into the strings shown on the device UI.

use std::time::Duration;

use chrono::{DateTime, Local};

use crate::engine::ConnectivityState;

/// Snapshot of the engine's diagnostic state. Produced by a pure query;
/// holding one never blocks the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    /// Current connectivity state.
    pub state: ConnectivityState,

    /// Time since bring-up started. Zero before `start()` is called.
    pub uptime: Duration,

    /// Wall-clock time of the last successful time sync, if any.
    pub last_sync: Option<DateTime<Local>>,
}

impl StatusReport {
    /// Uptime as `d:hh:mm:ss (d:h:m:s)`.
    pub fn uptime_display(&self) -> String {
        format_uptime(self.uptime)
    }

    /// Last sync wall-clock time, or `"never"`.
    pub fn last_sync_display(&self) -> String {
        match self.last_sync {
            Some(ts) => local_time_display(ts),
            None => "never".to_string(),
        }
    }
}

/// Format a duration as `d:hh:mm:ss (d:h:m:s)`.
pub fn format_uptime(uptime: Duration) -> String {
    let sec = uptime.as_secs();
    let days = sec / 86_400;
    let hours = (sec / 3_600) % 24;
    let minutes = (sec / 60) % 60;
    let seconds = sec % 60;
    format!("{days}:{hours:02}:{minutes:02}:{seconds:02} (d:h:m:s)")
}

/// Format a wall-clock instant the way the device UI shows it.
pub fn local_time_display(ts: DateTime<Local>) -> String {
    ts.format("%H:%M:%S, %A, %B %d %Y").to_string()
}

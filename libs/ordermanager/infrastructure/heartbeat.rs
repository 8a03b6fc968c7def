//! Heartbeat logging for long-running processes

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Tracks when the next periodic status line is due
pub struct Heartbeat {
    interval: Duration,
    last_beat: DateTime<Utc>,
    beats: u64,
}

impl Heartbeat {
    /// Create a new heartbeat with the given interval in seconds
    pub fn new(interval_secs: u64) -> Self {
        Self {
            interval: Duration::from_secs(interval_secs),
            last_beat: Utc::now(),
            beats: 0,
        }
    }

    /// Check if enough time has passed since the last beat
    pub fn should_beat(&self) -> bool {
        let elapsed = Utc::now().signed_duration_since(self.last_beat);
        elapsed.to_std().unwrap_or_default() >= self.interval
    }

    /// Record a beat when one is due; returns whether it was
    pub fn tick(&mut self) -> bool {
        if !self.should_beat() {
            return false;
        }
        self.last_beat = Utc::now();
        self.beats += 1;
        true
    }

    pub fn beats(&self) -> u64 {
        self.beats
    }
}

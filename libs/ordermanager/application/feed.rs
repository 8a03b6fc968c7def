//! Publishes newline-delimited JSON events onto the bus

use crate::domain::Event;
use eventbus::EventBus;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedStats {
    pub lines: u64,
    pub published: u64,
    pub skipped: u64,
    pub malformed: u64,
}

pub struct EventFeed {
    bus: Arc<EventBus<Event>>,
}

impl EventFeed {
    pub fn new(bus: Arc<EventBus<Event>>) -> Self {
        Self { bus }
    }

    /// Read until EOF or until `shutdown_flag` clears
    ///
    /// Blank lines and `#` comments are skipped; lines that do not parse as an
    /// [`Event`] are logged and skipped.
    pub async fn run<R>(&self, reader: R, shutdown_flag: &AtomicBool) -> std::io::Result<FeedStats>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut stats = FeedStats::default();
        let mut lines = reader.lines();

        while shutdown_flag.load(Ordering::Acquire) {
            let Some(line) = lines.next_line().await? else {
                break;
            };
            stats.lines += 1;

            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                stats.skipped += 1;
                continue;
            }

            match serde_json::from_str::<Event>(trimmed) {
                Ok(event) => {
                    let kind = event.kind();
                    let delivered = self.bus.publish(event);
                    debug!("Feed line {}: {} -> {} subscribers", stats.lines, kind.as_str(), delivered);
                    stats.published += 1;
                }
                Err(e) => {
                    warn!("Feed line {} is not a valid event: {}", stats.lines, e);
                    stats.malformed += 1;
                }
            }
        }

        info!(
            "Event feed finished: {} lines, {} published, {} skipped, {} malformed",
            stats.lines, stats.published, stats.skipped, stats.malformed
        );
        Ok(stats)
    }
}

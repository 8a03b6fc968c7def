use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time copy of the bus counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BusMetrics {
    pub published: u64,
    pub delivered: u64,
    pub failed: u64,
    pub redelivered: u64,
    pub dropped: u64,
}

/// Lock-free counters shared by the bus and its subscription tasks
#[derive(Debug, Default)]
pub struct AtomicBusMetrics {
    published: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    redelivered: AtomicU64,
    dropped: AtomicU64,
}

impl AtomicBusMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_published(&self) {
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_redelivered(&self) {
        self.redelivered.fetch_add(1, Ordering::Relaxed);
    }

    /// A message that was given up on
    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> BusMetrics {
        BusMetrics {
            published: self.published.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            redelivered: self.redelivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

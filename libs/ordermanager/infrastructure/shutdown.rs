//! Graceful shutdown management

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::Notify;
use tracing::info;

/// Shared run flag for long-running tasks
///
/// The flag starts `true`; Ctrl+C, [`trigger`](Self::trigger) or any holder of
/// the flag storing `false` stops the process.
pub struct ShutdownManager {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl ShutdownManager {
    /// Create a new shutdown manager with running state
    pub fn new() -> Self {
        Self::from_flag(Arc::new(AtomicBool::new(true)))
    }

    /// Wrap a flag that other components already hold
    pub fn from_flag(flag: Arc<AtomicBool>) -> Self {
        Self {
            flag,
            notify: Arc::new(Notify::new()),
        }
    }

    /// Spawn a Ctrl+C signal handler that triggers shutdown
    pub fn spawn_signal_handler(&self) {
        let flag = Arc::clone(&self.flag);
        let notify = Arc::clone(&self.notify);
        tokio::spawn(async move {
            if signal::ctrl_c().await.is_ok() {
                info!("");
                info!("Received shutdown signal (Ctrl+C)");
                info!("Shutting down gracefully...");
                flag.store(false, Ordering::Release);
                notify.notify_waiters();
            }
        });
    }

    /// Check if the process should continue running
    pub fn is_running(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Get a clone of the shutdown flag for passing to async tasks
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }

    /// Request shutdown from inside the process
    pub fn trigger(&self) {
        self.flag.store(false, Ordering::Release);
        self.notify.notify_waiters();
    }

    /// Wait until shutdown is requested
    ///
    /// Flags cleared by other holders are noticed within one poll interval.
    pub async fn wait(&self) {
        while self.is_running() {
            self.interruptible_sleep(Duration::from_secs(1)).await;
        }
    }

    /// Sleep for a duration, but wake early if shutdown is triggered
    pub async fn interruptible_sleep(&self, duration: Duration) {
        let check_interval = Duration::from_millis(50);
        let deadline = tokio::time::Instant::now() + duration;

        while self.is_running() {
            let now = tokio::time::Instant::now();
            if now >= deadline {
                break;
            }
            let step = check_interval.min(deadline - now);
            tokio::select! {
                _ = tokio::time::sleep(step) => {}
                _ = self.notify.notified() => break,
            }
        }
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}

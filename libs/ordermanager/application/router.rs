//! Attaches the manager to its inbound topics, as an explicit state machine

use crate::domain::{Event, EventKind};
use eventbus::{EventBus, MessageHandler, RedeliveryPolicy, Subscription};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterState {
    Stopped,
    Running,
    PausedForFork,
    /// Left only by a manual `start`
    PausedForWarning,
    /// Terminal
    Halted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterTransition {
    Start,
    Stop,
    PauseForFork,
    ResumeAfterFork,
    PauseForWarning,
    Halt,
}

impl fmt::Display for RouterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl fmt::Display for RouterTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouterError {
    #[error("Invalid router transition {transition} from {from}")]
    InvalidTransition {
        from: RouterState,
        transition: RouterTransition,
    },
}

pub type Result<T> = std::result::Result<T, RouterError>;

impl RouterState {
    pub fn next(self, transition: RouterTransition) -> Result<RouterState> {
        use RouterState::*;
        use RouterTransition::*;

        let next = match (self, transition) {
            (Halted, Halt | Stop) => Halted,
            (_, Halt) => Halted,
            (_, Stop) => Stopped,
            (Stopped | Running | PausedForWarning, Start) => Running,
            (Running, PauseForFork) => PausedForFork,
            (PausedForFork, ResumeAfterFork) => Running,
            (Running | PausedForFork | PausedForWarning, PauseForWarning) => PausedForWarning,
            (from, transition) => return Err(RouterError::InvalidTransition { from, transition }),
        };
        Ok(next)
    }
}

struct RouterInner {
    state: RouterState,
    subscriptions: Vec<Subscription<EventKind>>,
}

/// Owns the manager's subscriptions on the shared bus
pub struct EventRouter {
    bus: Arc<EventBus<Event>>,
    redelivery: Arc<dyn RedeliveryPolicy>,
    inner: Mutex<RouterInner>,
}

impl EventRouter {
    pub fn new(bus: Arc<EventBus<Event>>, redelivery: Arc<dyn RedeliveryPolicy>) -> Self {
        Self {
            bus,
            redelivery,
            inner: Mutex::new(RouterInner {
                state: RouterState::Stopped,
                subscriptions: Vec::new(),
            }),
        }
    }

    pub fn state(&self) -> RouterState {
        self.inner.lock().state
    }

    pub fn subscription_count(&self) -> usize {
        self.inner.lock().subscriptions.len()
    }

    /// Attach `handler` to every inbound topic; idempotent while running
    pub fn start(&self, handler: Arc<dyn MessageHandler<Event>>) -> Result<()> {
        self.attach(RouterTransition::Start, handler)
    }

    pub fn resume_after_fork(&self, handler: Arc<dyn MessageHandler<Event>>) -> Result<()> {
        self.attach(RouterTransition::ResumeAfterFork, handler)
    }

    /// Detach everything and wait for queued ordinary events to finish
    pub async fn stop(&self) -> Result<()> {
        self.detach(RouterTransition::Stop).await
    }

    /// Detach and drain ordinary topics before fork recovery starts
    ///
    /// Safe to call from the fork handler itself: control topics are
    /// detached but never awaited.
    pub async fn pause_for_fork(&self) -> Result<()> {
        self.detach(RouterTransition::PauseForFork).await
    }

    pub async fn pause_for_warning(&self) -> Result<()> {
        self.detach(RouterTransition::PauseForWarning).await
    }

    pub async fn halt(&self) {
        // Halt is valid from every state
        if let Err(e) = self.detach(RouterTransition::Halt).await {
            warn!("Router halt rejected: {}", e);
        }
    }

    fn attach(&self, transition: RouterTransition, handler: Arc<dyn MessageHandler<Event>>) -> Result<()> {
        let mut inner = self.inner.lock();
        let next = inner.state.next(transition)?;

        if inner.subscriptions.is_empty() {
            for kind in EventKind::INBOUND {
                let subscription =
                    self.bus
                        .subscribe(kind, Arc::clone(&handler), Arc::clone(&self.redelivery));
                inner.subscriptions.push(subscription);
            }
            debug!("Attached {} subscriptions", inner.subscriptions.len());
        }

        info!("Router {} -> {} ({})", inner.state, next, transition);
        inner.state = next;
        Ok(())
    }

    async fn detach(&self, transition: RouterTransition) -> Result<()> {
        let detached = {
            let mut inner = self.inner.lock();
            let next = inner.state.next(transition)?;
            info!("Router {} -> {} ({})", inner.state, next, transition);
            inner.state = next;
            std::mem::take(&mut inner.subscriptions)
        };

        if detached.is_empty() {
            return Ok(());
        }

        for subscription in &detached {
            self.bus.unsubscribe(subscription);
        }

        let count = detached.len();
        for subscription in detached {
            if subscription.route_key().is_control() {
                continue;
            }
            subscription.drained().await;
        }
        debug!("Detached {} subscriptions", count);
        Ok(())
    }
}

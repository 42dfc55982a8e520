//! Idle-window debouncing
//!
//! A burst of qualifying events collapses into one deadline that moves
//! forward with every event and fires once the tree has been quiet for the
//! whole idle window.

use std::time::Duration;

use tokio::time::Instant;

/// Resettable deadline for debounced syncs
#[derive(Debug, Clone)]
pub struct EventDebouncer {
    idle_window: Duration,
    last_event: Option<Instant>,
}

impl EventDebouncer {
    pub fn new(idle_window: Duration) -> Self {
        Self {
            idle_window,
            last_event: None,
        }
    }

    /// Record a qualifying event. Returns true if this armed a new pending run.
    pub fn notify(&mut self, now: Instant) -> bool {
        let armed = self.last_event.is_none();
        // Out-of-order timestamps never pull the deadline backwards
        self.last_event = Some(match self.last_event {
            Some(prev) if prev > now => prev,
            _ => now,
        });
        armed
    }

    pub fn is_pending(&self) -> bool {
        self.last_event.is_some()
    }

    pub fn last_event(&self) -> Option<Instant> {
        self.last_event
    }

    pub fn idle_window(&self) -> Duration {
        self.idle_window
    }

    /// When the pending run becomes due, if any
    pub fn deadline(&self) -> Option<Instant> {
        self.last_event.map(|t| t + self.idle_window)
    }

    /// Consume the pending run if the idle window has elapsed
    pub fn poll_due(&mut self, now: Instant) -> bool {
        match self.deadline() {
            Some(deadline) if now >= deadline => {
                self.last_event = None;
                true
            }
            _ => false,
        }
    }

    /// Drop the pending run; a pipeline that is starting covers it
    pub fn cancel(&mut self) {
        self.last_event = None;
    }
}

//! Process-wide stabilization notifications.
//!
//! Observers subscribe to an [`EventBus`] and receive events on a bounded
//! channel. Publishing happens inside the host's tick, so it never blocks: a
//! full or disconnected subscriber loses the event and the loss is counted.

use std::time::Duration;

use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError, TrySendError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    /// The first vessel entered stabilization.
    WindowOpened,
    /// The last stabilizing vessel finished.
    WindowClosed {
        /// Completion message, when one was shown to the user.
        message: Option<String>,
    },
}

/// A notification delivered to subscribers.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StabilizationEvent {
    pub event_id: Uuid,
    pub kind: EventKind,
    pub emitted_at: DateTime<Utc>,
}

impl StabilizationEvent {
    /// Stamps a new event with a fresh id and the current time.
    #[must_use]
    pub fn new(kind: EventKind) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            kind,
            emitted_at: Utc::now(),
        }
    }

    /// Returns true for [`EventKind::WindowOpened`].
    #[must_use]
    pub const fn is_window_opened(&self) -> bool {
        matches!(self.kind, EventKind::WindowOpened)
    }

    /// Returns true for [`EventKind::WindowClosed`].
    #[must_use]
    pub const fn is_window_closed(&self) -> bool {
        matches!(self.kind, EventKind::WindowClosed { .. })
    }
}

/// Fan-out of events to subscriber streams.
#[derive(Debug)]
pub struct EventBus {
    capacity: usize,
    subscribers: Vec<Sender<StabilizationEvent>>,
    dropped_events: u64,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_capacity(64)
    }
}

impl EventBus {
    /// Bus whose streams buffer up to `capacity` events each.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            subscribers: Vec::new(),
            dropped_events: 0,
        }
    }

    /// Opens a new stream receiving every event published from now on.
    pub fn subscribe(&mut self) -> EventStream {
        let (tx, rx) = bounded(self.capacity);
        self.subscribers.push(tx);
        EventStream { rx }
    }

    /// Delivers `event` to every live subscriber without blocking.
    pub fn publish(&mut self, event: &StabilizationEvent) {
        let mut dropped = 0;
        self.subscribers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                dropped += 1;
                true
            }
            Err(TrySendError::Disconnected(_)) => {
                dropped += 1;
                false
            }
        });
        self.dropped_events += dropped;
    }

    /// Number of live subscribers as of the last publish.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Events lost to full or disconnected subscribers.
    #[must_use]
    pub const fn dropped_events(&self) -> u64 {
        self.dropped_events
    }
}

/// Receiving end of a subscription. Dropping it unsubscribes.
#[derive(Debug)]
pub struct EventStream {
    rx: Receiver<StabilizationEvent>,
}

impl EventStream {
    /// Next queued event, if any.
    #[must_use]
    pub fn try_recv(&self) -> Option<StabilizationEvent> {
        match self.rx.try_recv() {
            Ok(ev) => Some(ev),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Waits up to `timeout` for the next event.
    #[must_use]
    pub fn recv_timeout(&self, timeout: Duration) -> Option<StabilizationEvent> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// Every queued event.
    #[must_use]
    pub fn drain(&self) -> Vec<StabilizationEvent> {
        self.rx.try_iter().collect()
    }
}

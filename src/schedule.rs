//! Deferred tasks keyed by due tick.
//!
//! Replaces "wait N seconds then call back" with plain data: tasks sit in an
//! ordered map until the tick driver drains the due ones. Insertion order
//! breaks ties between tasks due on the same tick.

use std::collections::BTreeMap;

/// Simulation tick counter.
pub type Tick = u64;

/// Ordered queue of tasks due at a tick.
#[derive(Debug, Clone)]
pub struct DeferredQueue<T> {
    tasks: BTreeMap<(Tick, u64), T>,
    next_seq: u64,
}

impl<T> Default for DeferredQueue<T> {
    fn default() -> Self {
        Self {
            tasks: BTreeMap::new(),
            next_seq: 0,
        }
    }
}

impl<T> DeferredQueue<T> {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules `task` to become due at `due`.
    pub fn schedule(&mut self, due: Tick, task: T) {
        self.tasks.insert((due, self.next_seq), task);
        self.next_seq += 1;
    }

    /// Removes and returns every task due at or before `now`, in order.
    pub fn drain_due(&mut self, now: Tick) -> Vec<T> {
        let Some(cutoff) = now.checked_add(1) else {
            return std::mem::take(&mut self.tasks).into_values().collect();
        };
        let later = self.tasks.split_off(&(cutoff, 0));
        let due = std::mem::replace(&mut self.tasks, later);
        due.into_values().collect()
    }

    /// Drops every task matching `pred`; returns how many were dropped.
    pub fn cancel_where(&mut self, mut pred: impl FnMut(&T) -> bool) -> usize {
        let before = self.tasks.len();
        self.tasks.retain(|_, t| !pred(t));
        before - self.tasks.len()
    }

    /// Returns true if any queued task matches `pred`.
    pub fn any(&self, pred: impl FnMut(&T) -> bool) -> bool {
        self.tasks.values().any(pred)
    }

    /// Earliest due tick, if any task is queued.
    #[must_use]
    pub fn next_due(&self) -> Option<Tick> {
        self.tasks.keys().next().map(|(t, _)| *t)
    }

    /// Number of queued tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns true if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

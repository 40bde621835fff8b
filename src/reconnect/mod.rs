//! Deferred reattachment of ground-anchoring devices.
//!
//! Ground contact is usually detected after the stabilization window has
//! closed, so reattachment is driven by small per-device agents living in an
//! arena keyed by vessel, watched part and device. An agent waits for its
//! signal (contact, a polled grounded flag, or a plain deadline), fires once,
//! lingers for a grace period and retires. Reattach calls are queued as
//! deferred tasks so kinds with a configured delay wait before attaching.

pub mod agent;
pub mod scheduler;

pub use agent::{AgentState, AgentTransition, ReconnectAgent, TriggerPolicy};
pub use scheduler::{AgentKey, ReconnectReport, ReconnectScheduler};

//! Per-device reconnection state machine.

use serde::{Deserialize, Serialize};

use crate::anchoring::DeviceHandle;
use crate::schedule::Tick;
use crate::vessel::{PartId, VesselId};

/// Signal an agent waits for before reattaching its device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum TriggerPolicy {
    /// Collision of the watched part against static world geometry.
    Contact,
    /// The watched part's grounded flag, polled every `interval` ticks.
    PollGrounded {
        /// Ticks between polls; 0 is treated as 1.
        interval: Tick,
    },
    /// Fires unconditionally once the deadline passes.
    Deadline,
}

/// Lifecycle of a [`ReconnectAgent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    /// Waiting for a signal.
    Armed,
    /// Attach requested; lingering for the grace period.
    Triggered,
    /// Finished; the owner removes the agent.
    Retired,
}

/// Transition produced by one agent step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentTransition {
    /// The agent fired; its device must be attached now.
    Triggered,
    /// The agent gave up waiting; its device stays detached.
    TimedOut,
    /// The grace period after firing elapsed.
    Retired,
}

/// Waits for ground contact on one part, then asks for one device to be
/// reattached exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectAgent {
    device: DeviceHandle,
    watched_part: PartId,
    policy: TriggerPolicy,
    armed_at: Tick,
    timeout_deadline: Tick,
    grace_ticks: u32,
    state: AgentState,
    triggered: bool,
    triggered_at: Option<Tick>,
    contact_seen: bool,
}

impl ReconnectAgent {
    /// Arms an agent at `armed_at` that gives up after `timeout_ticks`.
    #[must_use]
    pub fn new(
        device: DeviceHandle,
        watched_part: PartId,
        policy: TriggerPolicy,
        armed_at: Tick,
        timeout_ticks: Tick,
        grace_ticks: u32,
    ) -> Self {
        Self {
            device,
            watched_part,
            policy,
            armed_at,
            timeout_deadline: armed_at.saturating_add(timeout_ticks),
            grace_ticks,
            state: AgentState::Armed,
            triggered: false,
            triggered_at: None,
            contact_seen: false,
        }
    }

    /// Device this agent reattaches.
    #[must_use]
    pub const fn device(&self) -> &DeviceHandle {
        &self.device
    }

    /// Vessel owning the device.
    #[must_use]
    pub const fn vessel(&self) -> VesselId {
        self.device.vessel
    }

    /// Part whose contact or grounded flag the agent watches.
    #[must_use]
    pub const fn watched_part(&self) -> PartId {
        self.watched_part
    }

    /// Signal the agent waits for.
    #[must_use]
    pub const fn policy(&self) -> TriggerPolicy {
        self.policy
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> AgentState {
        self.state
    }

    /// True once the agent has fired. Never reset.
    #[must_use]
    pub const fn is_triggered(&self) -> bool {
        self.triggered
    }

    /// Tick the agent was installed.
    #[must_use]
    pub const fn armed_at(&self) -> Tick {
        self.armed_at
    }

    /// Tick at which an untriggered agent gives up.
    #[must_use]
    pub const fn timeout_deadline(&self) -> Tick {
        self.timeout_deadline
    }

    /// Records a static-world collision of the watched part.
    pub fn notify_contact(&mut self) {
        if self.state == AgentState::Armed && self.policy == TriggerPolicy::Contact {
            self.contact_seen = true;
        }
    }

    /// Fires the agent. Returns false if it already fired or has retired.
    pub fn trigger(&mut self, now: Tick) -> bool {
        if self.triggered || self.state != AgentState::Armed {
            return false;
        }
        self.triggered = true;
        self.triggered_at = Some(now);
        self.state = AgentState::Triggered;
        true
    }

    /// Advances the agent to tick `now`.
    ///
    /// `grounded` is only consulted on poll ticks of a polling agent.
    pub fn step(&mut self, now: Tick, grounded: impl FnOnce() -> bool) -> Option<AgentTransition> {
        match self.state {
            AgentState::Armed => self.step_armed(now, grounded),
            AgentState::Triggered => {
                let fired = self.triggered_at.unwrap_or(now);
                if now >= fired.saturating_add(Tick::from(self.grace_ticks)) {
                    self.state = AgentState::Retired;
                    Some(AgentTransition::Retired)
                } else {
                    None
                }
            }
            AgentState::Retired => None,
        }
    }

    fn step_armed(&mut self, now: Tick, grounded: impl FnOnce() -> bool) -> Option<AgentTransition> {
        let signalled = match self.policy {
            TriggerPolicy::Contact => self.contact_seen,
            TriggerPolicy::PollGrounded { interval } => {
                let elapsed = now.saturating_sub(self.armed_at);
                elapsed > 0 && elapsed % interval.max(1) == 0 && grounded()
            }
            TriggerPolicy::Deadline => now >= self.timeout_deadline,
        };
        if signalled && self.trigger(now) {
            return Some(AgentTransition::Triggered);
        }
        if now >= self.timeout_deadline {
            self.state = AgentState::Retired;
            return Some(AgentTransition::TimedOut);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchoring::{DeviceId, IntegrationKind};

    fn handle() -> DeviceHandle {
        DeviceHandle {
            id: DeviceId::new(7),
            vessel: VesselId::new(),
            part: PartId::new(1),
            kind: IntegrationKind::GroundAnchor,
        }
    }

    #[test]
    fn contact_fires_once_then_retires_after_grace() {
        let mut agent = ReconnectAgent::new(handle(), PartId::new(1), TriggerPolicy::Contact, 10, 500, 3);
        assert_eq!(agent.step(11, || false), None);

        agent.notify_contact();
        assert_eq!(agent.step(12, || false), Some(AgentTransition::Triggered));
        agent.notify_contact();
        assert!(!agent.trigger(13));
        assert_eq!(agent.step(13, || false), None);
        assert_eq!(agent.step(15, || false), Some(AgentTransition::Retired));
        assert_eq!(agent.state(), AgentState::Retired);
        assert!(agent.is_triggered());
    }

    #[test]
    fn polling_only_checks_on_interval() {
        let mut agent = ReconnectAgent::new(
            handle(),
            PartId::new(2),
            TriggerPolicy::PollGrounded { interval: 25 },
            0,
            500,
            3,
        );
        let mut polls = 0;
        for now in 1..50 {
            assert_eq!(
                agent.step(now, || {
                    polls += 1;
                    false
                }),
                None
            );
        }
        assert_eq!(polls, 1);
        assert_eq!(agent.step(50, || true), Some(AgentTransition::Triggered));
    }

    #[test]
    fn timeout_retires_without_triggering() {
        let mut agent = ReconnectAgent::new(handle(), PartId::new(1), TriggerPolicy::Contact, 0, 100, 3);
        for now in 1..100 {
            assert_eq!(agent.step(now, || true), None);
        }
        assert_eq!(agent.step(100, || true), Some(AgentTransition::TimedOut));
        assert_eq!(agent.state(), AgentState::Retired);
        assert!(!agent.is_triggered());

        agent.notify_contact();
        assert!(!agent.trigger(101));
        assert_eq!(agent.step(101, || true), None);
    }

    #[test]
    fn deadline_fires_unconditionally() {
        let mut agent = ReconnectAgent::new(handle(), PartId::new(1), TriggerPolicy::Deadline, 0, 40, 0);
        assert_eq!(agent.step(39, || false), None);
        assert_eq!(agent.step(40, || false), Some(AgentTransition::Triggered));
        assert_eq!(agent.step(40, || false), Some(AgentTransition::Retired));
    }
}

//! Arena of live reconnect agents plus their deferred reattach tasks.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::anchoring::{AttachOutcome, DeviceHandle, DeviceId, GroundAttachmentRegistry, IntegrationKind};
use crate::host::Host;
use crate::schedule::{DeferredQueue, Tick};
use crate::vessel::{PartId, VesselId};

use super::agent::{AgentTransition, ReconnectAgent};

/// Arena key: one agent per device per watched part.
pub type AgentKey = (VesselId, PartId, DeviceId);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ReattachTask {
    device: DeviceHandle,
    watched_part: PartId,
}

/// What one scheduler tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconnectReport {
    /// Devices whose agent fired this tick.
    pub triggered: Vec<DeviceHandle>,
    /// Devices whose agent gave up; they stay detached and leave the registry
    /// once no other agent or task still refers to them.
    pub timed_out: Vec<DeviceHandle>,
    /// Attach attempts executed this tick.
    pub attached: Vec<(DeviceHandle, AttachOutcome)>,
    /// Agents removed after their grace period or timeout.
    pub retired: usize,
}

/// Owns every live [`ReconnectAgent`] and the reattach tasks they spawn.
#[derive(Debug, Default)]
pub struct ReconnectScheduler {
    agents: BTreeMap<AgentKey, ReconnectAgent>,
    tasks: DeferredQueue<ReattachTask>,
}

impl ReconnectScheduler {
    /// Creates an empty scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs an agent. Returns false if one already watches that device on that part.
    pub fn spawn(&mut self, agent: ReconnectAgent) -> bool {
        let key = (agent.vessel(), agent.watched_part(), agent.device().id);
        if self.agents.contains_key(&key) {
            return false;
        }
        debug!(
            vessel = %key.0,
            part = %key.1,
            device = %key.2,
            policy = ?agent.policy(),
            "reconnect agent armed"
        );
        self.agents.insert(key, agent);
        true
    }

    /// Routes a static-world collision of a part to the agents watching it.
    pub fn notify_contact(&mut self, vessel: VesselId, part: PartId) {
        for ((v, p, _), agent) in &mut self.agents {
            if *v == vessel && *p == part {
                agent.notify_contact();
            }
        }
    }

    /// Advances every agent, then executes due reattach tasks.
    ///
    /// `delay_ticks` gives the reattach delay of a device kind; 0 attaches in
    /// the same tick the agent fires.
    pub fn tick<H: Host>(
        &mut self,
        now: Tick,
        host: &mut H,
        registry: &mut GroundAttachmentRegistry,
        delay_ticks: impl Fn(IntegrationKind) -> Tick,
    ) -> ReconnectReport {
        let mut report = ReconnectReport::default();
        let mut retired = Vec::new();

        for (key, agent) in &mut self.agents {
            let (vessel, part, _) = *key;
            let transition = agent.step(now, || host.part_grounded(vessel, part));
            match transition {
                Some(AgentTransition::Triggered) => {
                    let device = *agent.device();
                    let due = now.saturating_add(delay_ticks(device.kind));
                    debug!(vessel = %vessel, %part, device = %device.id, due, "reconnect agent triggered");
                    self.tasks.schedule(
                        due,
                        ReattachTask {
                            device,
                            watched_part: part,
                        },
                    );
                    report.triggered.push(device);
                }
                Some(AgentTransition::TimedOut) => {
                    let device = *agent.device();
                    warn!(
                        vessel = %vessel,
                        %part,
                        kind = %device.kind,
                        "no ground contact before timeout; device left detached"
                    );
                    report.timed_out.push(device);
                    retired.push(*key);
                }
                Some(AgentTransition::Retired) => retired.push(*key),
                None => {}
            }
        }

        for task in self.tasks.drain_due(now) {
            let outcome = registry.attach(&mut *host, task.device.id);
            if outcome == AttachOutcome::Attached {
                info!(vessel = %task.device.vessel, part = %task.device.part, kind = %task.device.kind, "device reconnected");
            }
            report.attached.push((task.device, outcome));
        }

        report.retired = retired.len();
        for key in retired {
            self.agents.remove(&key);
        }

        // A device nobody watches any more stays detached for good.
        for device in &report.timed_out {
            let id = device.id;
            if !self.has_agent_for(id) && !self.tasks.any(|t| t.device.id == id) {
                registry.forget(id);
            }
        }
        report
    }

    /// Drops agents and tasks tied to a destroyed part. Idempotent.
    pub fn cancel_part(&mut self, vessel: VesselId, part: PartId) -> usize {
        let before = self.agents.len();
        self.agents.retain(|(v, p, _), agent| {
            !(*v == vessel && (*p == part || agent.device().part == part))
        });
        let agents = before - self.agents.len();
        let tasks = self.tasks.cancel_where(|t| {
            t.device.vessel == vessel && (t.watched_part == part || t.device.part == part)
        });
        agents + tasks
    }

    /// Drops everything tied to a vessel. Idempotent.
    pub fn cancel_vessel(&mut self, vessel: VesselId) -> usize {
        let before = self.agents.len();
        self.agents.retain(|(v, _, _), _| *v != vessel);
        let agents = before - self.agents.len();
        agents + self.tasks.cancel_where(|t| t.device.vessel == vessel)
    }

    /// Keeps only agents and tasks of vessels for which `keep` is true.
    pub fn retain_vessels(&mut self, mut keep: impl FnMut(VesselId) -> bool) -> usize {
        let before = self.agents.len() + self.tasks.len();
        self.agents.retain(|(v, _, _), _| keep(*v));
        self.tasks.cancel_where(|t| !keep(t.device.vessel));
        before - self.agents.len() - self.tasks.len()
    }

    /// Returns true if an agent already watches `device`.
    #[must_use]
    pub fn has_agent_for(&self, device: DeviceId) -> bool {
        self.agents.keys().any(|(_, _, d)| *d == device)
    }

    /// Live agents of one vessel.
    pub fn agents_for(&self, vessel: VesselId) -> impl Iterator<Item = &ReconnectAgent> {
        self.agents
            .iter()
            .filter(move |((v, _, _), _)| *v == vessel)
            .map(|(_, a)| a)
    }

    /// Number of live agents.
    #[must_use]
    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    /// Reattach tasks waiting for their delay to elapse.
    #[must_use]
    pub fn pending_tasks(&self) -> usize {
        self.tasks.len()
    }

    /// Returns true when no agent or reattach task is left.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.agents.is_empty() && self.tasks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchoring::full_catalog;
    use crate::host::memory::{InMemoryHost, InvokeEffect, ModuleState};
    use crate::reconnect::TriggerPolicy;
    use crate::vessel::{ModuleHandle, Part, Vessel};

    struct Fixture {
        host: InMemoryHost,
        registry: GroundAttachmentRegistry,
        vessel: VesselId,
        module: ModuleHandle,
        handle: DeviceHandle,
    }

    fn anchored() -> Fixture {
        let mut host = InMemoryHost::new();
        let module = ModuleHandle::new(1);
        host.insert_module(
            module,
            ModuleState::new()
                .with_bool("isAttached", true)
                .on_invoke("Detach anchor", InvokeEffect::SetBool("isAttached".into(), false))
                .on_invoke("Attach anchor", InvokeEffect::SetBool("isAttached".into(), true)),
        );
        let vessel = VesselId::new();
        host.insert_vessel(
            Vessel::landed(vessel, "hangar")
                .with_part(Part::new(PartId::new(1), "anchor").with_module("GroundAnchor", module)),
        );
        let mut registry = GroundAttachmentRegistry::discover(&full_catalog());
        let handle = registry.detach_all(&mut host, vessel)[0];
        Fixture {
            host,
            registry,
            vessel,
            module,
            handle,
        }
    }

    #[test]
    fn contact_reattaches_after_delay() {
        let mut f = anchored();
        let mut sched = ReconnectScheduler::new();
        assert!(sched.spawn(ReconnectAgent::new(f.handle, PartId::new(1), TriggerPolicy::Contact, 0, 500, 3)));
        assert!(!sched.spawn(ReconnectAgent::new(f.handle, PartId::new(1), TriggerPolicy::Contact, 0, 500, 3)));

        sched.notify_contact(f.vessel, PartId::new(1));
        let report = sched.tick(1, &mut f.host, &mut f.registry, |_| 5);
        assert_eq!(report.triggered.len(), 1);
        assert!(report.attached.is_empty());
        assert_eq!(sched.pending_tasks(), 1);

        for now in 2..6 {
            assert!(sched.tick(now, &mut f.host, &mut f.registry, |_| 5).attached.is_empty());
        }
        let report = sched.tick(6, &mut f.host, &mut f.registry, |_| 5);
        assert_eq!(report.attached, vec![(f.handle, AttachOutcome::Attached)]);
        assert_eq!(f.host.module_bool(f.module, "isAttached"), Some(true));
        assert!(sched.is_idle());
    }

    #[test]
    fn destroyed_part_cancels_pending_task() {
        let mut f = anchored();
        let mut sched = ReconnectScheduler::new();
        sched.spawn(ReconnectAgent::new(f.handle, PartId::new(1), TriggerPolicy::Contact, 0, 500, 3));
        sched.notify_contact(f.vessel, PartId::new(1));
        sched.tick(1, &mut f.host, &mut f.registry, |_| 10);

        assert!(sched.cancel_part(f.vessel, PartId::new(1)) >= 1);
        assert_eq!(sched.cancel_part(f.vessel, PartId::new(1)), 0);
        let report = sched.tick(20, &mut f.host, &mut f.registry, |_| 10);
        assert!(report.attached.is_empty());
        assert_eq!(f.host.invocation_count(f.module, "Attach anchor"), 0);
    }

    #[test]
    fn timeout_leaves_device_detached() {
        let mut f = anchored();
        let mut sched = ReconnectScheduler::new();
        sched.spawn(ReconnectAgent::new(f.handle, PartId::new(1), TriggerPolicy::Contact, 0, 10, 3));
        let mut timed_out = Vec::new();
        for now in 1..=10 {
            timed_out.extend(sched.tick(now, &mut f.host, &mut f.registry, |_| 0).timed_out);
        }
        assert_eq!(timed_out, vec![f.handle]);
        assert_eq!(sched.agent_count(), 0);
        assert_eq!(f.host.module_bool(f.module, "isAttached"), Some(false));
        assert!(!f.registry.is_pending(f.handle.id));
        assert_eq!(f.registry.pending_count(), 0);
    }

    #[test]
    fn device_stays_pending_while_another_agent_watches_it() {
        let mut f = anchored();
        let mut sched = ReconnectScheduler::new();
        sched.spawn(ReconnectAgent::new(f.handle, PartId::new(1), TriggerPolicy::Contact, 0, 5, 0));
        sched.spawn(ReconnectAgent::new(f.handle, PartId::new(2), TriggerPolicy::Contact, 0, 50, 0));
        for now in 1..=5 {
            sched.tick(now, &mut f.host, &mut f.registry, |_| 0);
        }
        assert_eq!(sched.agent_count(), 1);
        assert!(f.registry.is_pending(f.handle.id));

        sched.notify_contact(f.vessel, PartId::new(2));
        let report = sched.tick(6, &mut f.host, &mut f.registry, |_| 0);
        assert_eq!(report.attached, vec![(f.handle, AttachOutcome::Attached)]);
    }

    #[test]
    fn polling_agent_reads_grounded_flag() {
        let mut f = anchored();
        let mut sched = ReconnectScheduler::new();
        sched.spawn(ReconnectAgent::new(
            f.handle,
            PartId::new(1),
            TriggerPolicy::PollGrounded { interval: 2 },
            0,
            100,
            0,
        ));
        assert!(sched.tick(2, &mut f.host, &mut f.registry, |_| 0).triggered.is_empty());
        f.host.set_grounded(f.vessel, PartId::new(1), true);
        let report = sched.tick(4, &mut f.host, &mut f.registry, |_| 0);
        assert_eq!(report.attached, vec![(f.handle, AttachOutcome::Attached)]);
    }
}

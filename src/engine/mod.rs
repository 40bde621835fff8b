//! Stabilization engine.
//!
//! [`StabilizationEngine`] is the context object that owns every piece of
//! stabilizer state: the per-vessel entries, the "currently stabilizing"
//! counter, the ground attachment registry, the reconnect agents and the
//! event bus. The host drives it from its callbacks and its fixed-timestep
//! update; nothing here blocks or keeps global state.
//!
//! Per vessel the window runs:
//! 1. Entry (host callback): guards, bounds snapshot, device detach, optional
//!    altitude restore.
//! 2. First tick: rising check, then reconnect agents are armed.
//! 3. Next `grounding_ticks` ticks: descent.
//! 4. Every tick: velocities zeroed and external forces suppressed.
//! 5. Timer expiry: entry removed, counter decremented.

/// Vertical correction planning.
pub mod descent;
mod entry;

use std::collections::HashMap;

use glam::Vec3;
use tracing::{debug, info, warn};

use crate::anchoring::{DeviceHandle, GroundAttachmentRegistry};
use crate::config::{StabilizerConfig, Timebase};
use crate::error::StabilizerResult;
use crate::events::{EventBus, EventKind, EventStream, StabilizationEvent};
use crate::geometry::{GeometryProbe, VesselBounds};
use crate::host::{Host, LayerMask, LoadedExtension, ModuleHost, STATIC_WORLD_LAYER};
use crate::probe::AltitudeSampler;
use crate::reconnect::{ReconnectAgent, ReconnectReport, ReconnectScheduler, TriggerPolicy};
use crate::schedule::Tick;
use crate::vessel::{PartId, Situation, Vessel, VesselId};

pub use descent::{plan_descent, plan_rise, DescentPlan, SkipReason};
pub use entry::{Phase, StabilizationEntry};

/// User-facing message posted when the last vessel settles.
pub const COMPLETION_MESSAGE: &str = "World has been stabilized";

const PROGRESS_LOG_EVERY: u32 = 10;
const ALTITUDE_RESTORE_EPSILON: f32 = 1e-3;

/// Why an off-rails vessel was not taken into stabilization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipCause {
    /// The host does not know the vessel.
    UnknownVessel,
    /// Not landed (or pre-launch when those are skipped).
    Situation,
    /// A kerbal on EVA.
    Kerbal,
    /// Still packed, no physics yet.
    Packed,
    /// On the exclusion list.
    Excluded,
    /// Launch clamp, flag or similar world-fixed part.
    PermanentFixture,
    /// Already inside a window.
    AlreadyTracked,
}

/// Result of an off-rails notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryOutcome {
    /// A stabilization window opened for the vessel.
    Tracking {
        /// Devices released for the window.
        detached: Vec<DeviceHandle>,
    },
    /// The vessel is left alone.
    Skipped(SkipCause),
}

impl EntryOutcome {
    /// Returns true if the vessel entered a window.
    #[must_use]
    pub const fn is_tracking(&self) -> bool {
        matches!(self, Self::Tracking { .. })
    }
}

/// What one fixed update did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    /// Engine tick just processed.
    pub tick: Tick,
    /// Vessels whose window expired this tick.
    pub finished: Vec<VesselId>,
    /// Vessels dropped because the host no longer reports them.
    pub lost: Vec<VesselId>,
    /// Reconnect activity.
    pub reconnect: ReconnectReport,
}

/// Owns and drives every stabilization window.
#[derive(Debug)]
pub struct StabilizationEngine {
    config: StabilizerConfig,
    timebase: Timebase,
    registry: GroundAttachmentRegistry,
    scheduler: ReconnectScheduler,
    entries: HashMap<VesselId, StabilizationEntry>,
    stabilizing: usize,
    tick: Tick,
    events: EventBus,
}

impl StabilizationEngine {
    /// Creates an engine, binding integrations from `catalog`.
    ///
    /// Fails only on an invalid configuration or timestep.
    pub fn new(config: StabilizerConfig, fixed_delta_time: f32, catalog: &[LoadedExtension]) -> StabilizerResult<Self> {
        config.validate()?;
        let timebase = Timebase::new(fixed_delta_time)?;
        info!(
            window_ticks = config.stabilization_ticks,
            fixed_delta_time,
            "stabilization engine started"
        );
        Ok(Self {
            config,
            timebase,
            registry: GroundAttachmentRegistry::discover(catalog),
            scheduler: ReconnectScheduler::new(),
            entries: HashMap::new(),
            stabilizing: 0,
            tick: 0,
            events: EventBus::default(),
        })
    }

    /// Creates an engine bound against the host's extension catalog.
    pub fn for_host(config: StabilizerConfig, fixed_delta_time: f32, host: &dyn ModuleHost) -> StabilizerResult<Self> {
        Self::new(config, fixed_delta_time, &host.loaded_extensions())
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &StabilizerConfig {
        &self.config
    }

    /// Seconds-to-ticks conversion in use.
    #[must_use]
    pub const fn timebase(&self) -> Timebase {
        self.timebase
    }

    /// Detached-device bookkeeping.
    #[must_use]
    pub const fn registry(&self) -> &GroundAttachmentRegistry {
        &self.registry
    }

    /// Live reconnect agents.
    #[must_use]
    pub const fn scheduler(&self) -> &ReconnectScheduler {
        &self.scheduler
    }

    /// Number of fixed updates processed.
    #[must_use]
    pub const fn current_tick(&self) -> Tick {
        self.tick
    }

    /// Vessels currently inside their window.
    #[must_use]
    pub const fn stabilizing_count(&self) -> usize {
        self.stabilizing
    }

    /// Tracking entry of a vessel, if it is stabilizing.
    #[must_use]
    pub fn entry(&self, vessel: VesselId) -> Option<&StabilizationEntry> {
        self.entries.get(&vessel)
    }

    /// Bounds snapshot of a stabilizing vessel.
    #[must_use]
    pub fn bounds(&self, vessel: VesselId) -> Option<&VesselBounds> {
        self.entries.get(&vessel).map(StabilizationEntry::bounds)
    }

    /// Opens a stream of window opened/closed notifications.
    pub fn subscribe(&mut self) -> EventStream {
        self.events.subscribe()
    }

    /// Notifications lost to slow or closed subscribers.
    #[must_use]
    pub const fn dropped_events(&self) -> u64 {
        self.events.dropped_events()
    }

    /// Host callback: the vessel switched to full physics.
    pub fn on_vessel_off_rails<H: Host>(&mut self, host: &mut H, vessel_id: VesselId) -> EntryOutcome {
        let bounds = match self.admit(&*host, vessel_id) {
            Ok(bounds) => bounds,
            Err(cause) => {
                debug!(vessel = %vessel_id, ?cause, "vessel not stabilized");
                return EntryOutcome::Skipped(cause);
            }
        };

        let detached = self.registry.detach_all(host, vessel_id);
        if self.config.restore_altitude {
            restore_altitude(host, vessel_id, &bounds);
        }
        if self.config.draw_markers {
            draw_bounds(host, vessel_id, &bounds);
        }

        let entry = StabilizationEntry::new(
            vessel_id,
            self.config.stabilization_ticks,
            self.config.grounding_ticks,
            self.tick,
            bounds,
            detached.clone(),
        );
        self.entries.insert(vessel_id, entry);
        self.stabilizing += 1;
        info!(
            vessel = %vessel_id,
            ticks = self.config.stabilization_ticks,
            devices = detached.len(),
            stabilizing = self.stabilizing,
            "stabilization started"
        );
        if self.stabilizing == 1 {
            self.events.publish(&StabilizationEvent::new(EventKind::WindowOpened));
        }
        EntryOutcome::Tracking { detached }
    }

    fn admit<H: Host>(&self, host: &H, vessel_id: VesselId) -> Result<VesselBounds, SkipCause> {
        if self.entries.contains_key(&vessel_id) {
            return Err(SkipCause::AlreadyTracked);
        }
        let vessel = host.vessel(vessel_id).ok_or(SkipCause::UnknownVessel)?;
        match vessel.situation {
            Situation::Landed => {}
            Situation::Prelaunch if self.config.stabilize_prelaunch => {}
            _ => return Err(SkipCause::Situation),
        }
        if vessel.is_eva && !self.config.stabilize_kerbals {
            return Err(SkipCause::Kerbal);
        }
        if vessel.packed {
            return Err(SkipCause::Packed);
        }
        if self.config.is_excluded(&vessel.name) {
            return Err(SkipCause::Excluded);
        }
        if vessel.has_permanent_fixture() {
            return Err(SkipCause::PermanentFixture);
        }
        Ok(GeometryProbe::compute_bounds(vessel))
    }

    /// Host callback: the vessel went back on rails.
    ///
    /// Ends the window at once; devices still without an agent get one so
    /// they are not stranded. Idempotent.
    pub fn on_vessel_on_rails<H: Host>(&mut self, host: &mut H, vessel_id: VesselId) {
        let Some(mut entry) = self.entries.remove(&vessel_id) else {
            return;
        };
        entry.abort();
        if !entry.agents_installed {
            self.install_agents(&*host, &mut entry);
        }
        info!(vessel = %vessel_id, "vessel packed before stabilization finished");
        self.release_slot(host, false);
    }

    /// Host callback: the active vessel changed. Drops state of vessels the
    /// host no longer reports.
    pub fn on_vessel_switch<H: Host>(&mut self, host: &mut H, from: Option<VesselId>, to: VesselId) {
        debug!(from = ?from, to = %to, "vessel switch");
        self.prune_unloaded(host);
    }

    /// Host callback: the vessel was destroyed. Idempotent.
    pub fn on_vessel_destroyed<H: Host>(&mut self, host: &mut H, vessel_id: VesselId) {
        let forgotten = self.registry.forget_vessel(vessel_id) + self.scheduler.cancel_vessel(vessel_id);
        if let Some(mut entry) = self.entries.remove(&vessel_id) {
            entry.abort();
            self.release_slot(host, false);
        }
        if forgotten > 0 {
            debug!(vessel = %vessel_id, forgotten, "dropped reconnect state of destroyed vessel");
        }
    }

    /// Host callback: a part was destroyed or separated. Idempotent.
    pub fn on_part_destroyed(&mut self, vessel_id: VesselId, part: PartId) {
        let dropped = self.registry.forget_part(vessel_id, part) + self.scheduler.cancel_part(vessel_id, part);
        if let Some(entry) = self.entries.get_mut(&vessel_id) {
            entry.detached.retain(|h| h.part != part);
            entry.bounds_stale = true;
        }
        if dropped > 0 {
            debug!(vessel = %vessel_id, %part, dropped, "cancelled reconnection for destroyed part");
        }
    }

    /// Host callback: a part collided with something on `layer`.
    pub fn on_part_collision(&mut self, vessel_id: VesselId, part: PartId, layer: u32) {
        if layer == STATIC_WORLD_LAYER {
            self.scheduler.notify_contact(vessel_id, part);
        }
    }

    /// Host fixed-timestep update.
    pub fn fixed_update<H: Host>(&mut self, host: &mut H) -> TickReport {
        self.tick += 1;
        let now = self.tick;
        let mut report = TickReport {
            tick: now,
            ..TickReport::default()
        };
        let window_active = self.stabilizing > 0;

        let mut ids: Vec<VesselId> = self.entries.keys().copied().collect();
        ids.sort();
        for id in ids {
            let Some(mut entry) = self.entries.remove(&id) else {
                continue;
            };
            if host.vessel(id).is_none() {
                warn!(vessel = %id, "stabilizing vessel vanished from host");
                entry.abort();
                self.registry.forget_vessel(id);
                self.scheduler.cancel_vessel(id);
                self.release_slot(host, false);
                report.lost.push(id);
                continue;
            }

            self.advance(host, &mut entry);
            hold_still(host, id);

            if self.config.debug_logging && entry.ticks_remaining() % PROGRESS_LOG_EVERY == 0 {
                let altitude = host.vessel(id).map(|v| v.altitude);
                debug!(vessel = %id, phase = %entry.phase(), ticks_remaining = entry.ticks_remaining(), ?altitude, "stabilizing");
            }

            if entry.count_down() {
                if !entry.agents_installed {
                    self.install_agents(&*host, &mut entry);
                }
                info!(vessel = %id, "stabilization finished");
                self.release_slot(host, true);
                report.finished.push(id);
            } else {
                self.entries.insert(id, entry);
            }
        }

        if window_active {
            self.anti_slide(host);
        }

        let config = &self.config;
        let timebase = self.timebase;
        report.reconnect = self.scheduler.tick(now, host, &mut self.registry, |kind| {
            Tick::from(timebase.ticks(config.reattach_delay_for(kind)))
        });
        report
    }

    fn advance<H: Host>(&mut self, host: &mut H, entry: &mut StabilizationEntry) {
        match entry.phase() {
            Phase::Detaching | Phase::RisingCheck => {
                entry.set_phase(Phase::RisingCheck);
                self.rising_check(host, entry);
                self.install_agents(&*host, entry);
                entry.set_phase(Phase::Grounding);
            }
            Phase::Grounding => {
                if entry.descent_ticks_left > 0 {
                    entry.descent_ticks_left -= 1;
                    self.grounding_step(host, entry);
                }
            }
            Phase::Done => {}
        }
    }

    fn rising_check<H: Host>(&self, host: &mut H, entry: &mut StabilizationEntry) {
        let id = entry.vessel_id();
        if entry.bounds.is_degenerate() {
            debug!(vessel = %id, "no usable geometry; skipping rising check");
            return;
        }
        let raised = {
            let Some(vessel) = host.vessel(id) else {
                return;
            };
            let bounds = entry.bounds;
            let up = vessel.up();
            let height = bounds.height().max(0.0);
            let sampler = AltitudeSampler::new(up, vessel.unload_distance);
            let origin = bounds.bottom_point(&vessel.transform) + up * height;
            let host_ref: &H = &*host;
            plan_rise(
                |raised| {
                    let probe = sampler.probe(host_ref, origin + up * raised, LayerMask::GROUND_ONLY);
                    probe.is_hit().then(|| probe.hit_distance - height)
                },
                &self.config,
            )
        };
        if raised <= 0.0 {
            return;
        }
        let Some(up) = host.vessel(id).map(Vessel::up) else {
            return;
        };
        match host.translate(id, up * raised) {
            Ok(()) => {
                entry.raised_by = raised;
                info!(vessel = %id, raised, "lifted vessel clear of the ground");
            }
            Err(e) => warn!(vessel = %id, error = %e, "rising check translation failed"),
        }
    }

    fn grounding_step<H: Host>(&self, host: &mut H, entry: &mut StabilizationEntry) {
        let id = entry.vessel_id();
        let (plan, up) = {
            let Some(vessel) = host.vessel(id) else {
                return;
            };
            if self.config.recalculate_bounds || entry.bounds_stale {
                GeometryProbe::refresh(vessel, &mut entry.bounds);
                entry.bounds_stale = false;
            }
            if entry.bounds.is_degenerate() {
                debug!(vessel = %id, "no usable geometry; skipping descent");
                return;
            }
            let up = vessel.up();
            let sampler = AltitudeSampler::new(up, vessel.unload_distance);
            let bottom = entry.bounds.bottom_point(&vessel.transform);
            let top = entry.bounds.top_point(&vessel.transform);
            let bottom_ground = sampler.probe(&*host, bottom, LayerMask::GROUND_ONLY);
            let top_ground = sampler.probe(&*host, top, LayerMask::GROUND_ONLY);
            let bottom_all = sampler.probe(&*host, bottom, LayerMask::GROUND_AND_PARTS);
            if self.config.debug_logging {
                debug!(
                    vessel = %id,
                    bottom = bottom_ground.hit_distance,
                    top = top_ground.hit_distance,
                    with_parts = bottom_all.hit_distance,
                    "ground probes"
                );
            }
            (plan_descent(bottom_ground, top_ground, bottom_all, &self.config), up)
        };

        if self.config.draw_markers {
            draw_bounds(host, id, &entry.bounds);
        }
        let distance = plan.distance();
        match plan {
            DescentPlan::Skip(reason) => {
                debug!(vessel = %id, ?reason, "not moving down");
                return;
            }
            DescentPlan::Fallback(_) => {
                debug!(vessel = %id, distance, "bottom and top probes disagree; conservative descent");
            }
            DescentPlan::Descend(_) => debug!(vessel = %id, distance, "moving down"),
        }
        if let Err(e) = host.translate(id, -up * distance) {
            warn!(vessel = %id, error = %e, "descent translation failed");
        }
    }

    fn install_agents<H: Host>(&mut self, host: &H, entry: &mut StabilizationEntry) {
        entry.agents_installed = true;
        if entry.detached.is_empty() {
            return;
        }
        let now = self.tick;
        let timeout = Tick::from(self.timebase.ticks(self.config.check_landed_timeout));
        let poll = Tick::from(self.timebase.ticks(self.config.check_landed_period)).max(1);
        let grace = self.config.reconnect_grace_ticks;

        let bottom = entry.bounds.bottom_part.and_then(|part_id| {
            host.vessel(entry.vessel_id())
                .and_then(|v| v.part(part_id))
                .map(|p| (p.id, p.is_wheel()))
        });
        for device in &entry.detached {
            if self.scheduler.has_agent_for(device.id) || !self.registry.is_pending(device.id) {
                continue;
            }
            let (watched, policy) = match bottom {
                Some((part, true)) => (part, TriggerPolicy::PollGrounded { interval: poll }),
                Some((part, false)) => (part, TriggerPolicy::Contact),
                None => (device.part, TriggerPolicy::Deadline),
            };
            self.scheduler
                .spawn(ReconnectAgent::new(*device, watched, policy, now, timeout, grace));
        }
    }

    fn release_slot<H: Host>(&mut self, host: &mut H, expired: bool) {
        let Some(left) = self.stabilizing.checked_sub(1) else {
            warn!("stabilizing counter already zero");
            return;
        };
        self.stabilizing = left;
        if left > 0 {
            return;
        }
        let message = (expired && self.config.display_message).then(|| COMPLETION_MESSAGE.to_string());
        if let Some(text) = &message {
            host.post_message(text);
        }
        info!("all vessels stabilized");
        self.events
            .publish(&StabilizationEvent::new(EventKind::WindowClosed { message }));
    }

    fn anti_slide<H: Host>(&self, host: &mut H) {
        for id in host.loaded_vessels() {
            let slow = host
                .vessel(id)
                .is_some_and(|v| !v.packed && v.surface_speed < self.config.anti_slide_speed);
            if slow {
                if let Err(e) = host.zero_velocity(id) {
                    debug!(vessel = %id, error = %e, "anti-slide skipped");
                }
            }
        }
    }

    fn prune_unloaded<H: Host>(&mut self, host: &mut H) {
        let loaded: Vec<VesselId> = host.loaded_vessels();
        let gone: Vec<VesselId> = self
            .entries
            .keys()
            .filter(|id| !loaded.contains(id))
            .copied()
            .collect();
        for id in gone {
            if let Some(mut entry) = self.entries.remove(&id) {
                entry.abort();
                self.registry.forget_vessel(id);
                self.release_slot(host, false);
                debug!(vessel = %id, "dropped entry of unloaded vessel");
            }
        }
        let pruned = self.scheduler.retain_vessels(|v| loaded.contains(&v));
        if pruned > 0 {
            debug!(pruned, "dropped reconnect agents of unloaded vessels");
        }
    }
}

fn hold_still<H: Host>(host: &mut H, id: VesselId) {
    if let Err(e) = host.zero_velocity(id) {
        warn!(vessel = %id, error = %e, "cannot zero velocity");
    }
    if let Err(e) = host.suppress_external_forces(id) {
        warn!(vessel = %id, error = %e, "cannot suppress external forces");
    }
}

/// Lifts a vessel back to the altitude it had on rails, ignoring collisions
/// with the surface it rests on during the move.
fn restore_altitude<H: Host>(host: &mut H, id: VesselId, bounds: &VesselBounds) {
    let (lift, up, surface) = {
        let Some(vessel) = host.vessel(id) else {
            return;
        };
        let Some(rails_altitude) = vessel.rails_altitude else {
            return;
        };
        let lift = rails_altitude - vessel.altitude;
        if !lift.is_finite() || lift <= ALTITUDE_RESTORE_EPSILON {
            return;
        }
        let up = vessel.up();
        let sampler = AltitudeSampler::new(up, vessel.unload_distance);
        let origin = bounds.bottom_point(&vessel.transform) + up * bounds.height().max(0.0);
        (lift, up, sampler.probe(&*host, origin, LayerMask::GROUND_ONLY).surface)
    };

    if let Some(surface) = surface {
        if let Err(e) = host.set_collision_ignored(id, surface, true) {
            warn!(vessel = %id, error = %e, "cannot suppress collisions for altitude restore");
        }
    }
    match host.translate(id, up * lift) {
        Ok(()) => info!(vessel = %id, lift, "restored on-rails altitude"),
        Err(e) => warn!(vessel = %id, error = %e, "altitude restore failed"),
    }
    if let Some(surface) = surface {
        if let Err(e) = host.set_collision_ignored(id, surface, false) {
            warn!(vessel = %id, error = %e, "cannot restore collisions after altitude restore");
        }
    }
}

fn draw_bounds<H: Host>(host: &mut H, id: VesselId, bounds: &VesselBounds) {
    let Some(vessel) = host.vessel(id) else {
        return;
    };
    let from = bounds.bottom_point(&vessel.transform);
    let to: Vec3 = from + bounds.up * bounds.height().max(0.0);
    host.draw_marker(id, from, to);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchoring::full_catalog;
    use crate::host::memory::{InMemoryHost, InvokeEffect, ModuleState};
    use crate::host::SimHost;
    use crate::vessel::{CollisionMesh, ModuleHandle, Part};

    fn cube(host: &mut InMemoryHost, name: &str, y: f32) -> VesselId {
        let id = VesselId::new();
        let mut v = Vessel::landed(id, name).with_part(
            Part::new(PartId::new(1), "hull").with_mesh(CollisionMesh::cuboid(Vec3::new(0.0, y, 0.0), Vec3::ONE)),
        );
        v.center_of_mass = Vec3::new(0.0, y, 0.0);
        v.altitude = y - 1.0;
        host.insert_vessel(v);
        id
    }

    fn engine(cfg: StabilizerConfig) -> StabilizationEngine {
        StabilizationEngine::new(cfg, 0.02, &full_catalog()).unwrap()
    }

    #[test]
    fn invalid_config_is_rejected() {
        let cfg = StabilizerConfig {
            stabilization_ticks: 0,
            ..StabilizerConfig::default()
        };
        let err = StabilizationEngine::new(cfg, 0.02, &[]).unwrap_err();
        assert!(err.is_validation());
        assert!(StabilizationEngine::new(StabilizerConfig::default(), 0.0, &[]).is_err());
    }

    #[test]
    fn guards_skip_ineligible_vessels() {
        let mut host = InMemoryHost::new();
        let mut eng = engine(StabilizerConfig {
            exclude_vessels: vec!["Skip Me".into()],
            ..StabilizerConfig::default()
        });

        let flying = cube(&mut host, "flyer", 3.0);
        host.vessel_mut(flying).unwrap().situation = Situation::Flying;
        let kerbal = cube(&mut host, "jeb", 3.0);
        host.vessel_mut(kerbal).unwrap().is_eva = true;
        let packed = cube(&mut host, "packed", 3.0);
        host.vessel_mut(packed).unwrap().packed = true;
        let excluded = cube(&mut host, "Skip Me", 3.0);
        let clamped = cube(&mut host, "clamped", 3.0);
        host.vessel_mut(clamped).unwrap().parts[0]
            .modules
            .push(crate::vessel::ModuleRef::new("LaunchClamp", ModuleHandle::new(9)));

        let causes: Vec<_> = [flying, kerbal, packed, excluded, clamped, VesselId::new()]
            .into_iter()
            .map(|id| eng.on_vessel_off_rails(&mut host, id))
            .collect();
        assert_eq!(
            causes,
            vec![
                EntryOutcome::Skipped(SkipCause::Situation),
                EntryOutcome::Skipped(SkipCause::Kerbal),
                EntryOutcome::Skipped(SkipCause::Packed),
                EntryOutcome::Skipped(SkipCause::Excluded),
                EntryOutcome::Skipped(SkipCause::PermanentFixture),
                EntryOutcome::Skipped(SkipCause::UnknownVessel),
            ]
        );
        assert_eq!(eng.stabilizing_count(), 0);
    }

    #[test]
    fn prelaunch_follows_toggle() {
        let mut host = InMemoryHost::new();
        let id = cube(&mut host, "pad", 3.0);
        host.vessel_mut(id).unwrap().situation = Situation::Prelaunch;

        let mut off = engine(StabilizerConfig {
            stabilize_prelaunch: false,
            ..StabilizerConfig::default()
        });
        assert_eq!(off.on_vessel_off_rails(&mut host, id), EntryOutcome::Skipped(SkipCause::Situation));
        let mut on = engine(StabilizerConfig::default());
        assert!(on.on_vessel_off_rails(&mut host, id).is_tracking());
    }

    #[test]
    fn duplicate_off_rails_does_not_double_count() {
        let mut host = InMemoryHost::new();
        host.add_ground_plane(0.0);
        let id = cube(&mut host, "lander", 1.5);
        let mut eng = engine(StabilizerConfig::default());
        assert!(eng.on_vessel_off_rails(&mut host, id).is_tracking());
        assert_eq!(
            eng.on_vessel_off_rails(&mut host, id),
            EntryOutcome::Skipped(SkipCause::AlreadyTracked)
        );
        assert_eq!(eng.stabilizing_count(), 1);
    }

    #[test]
    fn timer_and_counter_follow_ticks() {
        let mut host = InMemoryHost::new();
        host.add_ground_plane(0.0);
        let id = cube(&mut host, "lander", 1.5);
        let mut eng = engine(StabilizerConfig {
            stabilization_ticks: 20,
            ..StabilizerConfig::default()
        });
        eng.on_vessel_off_rails(&mut host, id);

        let mut last = eng.entry(id).unwrap().ticks_remaining();
        for _ in 0..19 {
            eng.fixed_update(&mut host);
            let now = eng.entry(id).unwrap().ticks_remaining();
            assert_eq!(now, last - 1);
            last = now;
        }
        let report = eng.fixed_update(&mut host);
        assert_eq!(report.finished, vec![id]);
        assert!(eng.entry(id).is_none());
        assert_eq!(eng.stabilizing_count(), 0);
        assert!(host.zero_velocity_count(id) >= 20);
        assert_eq!(host.suppressed_count(id), 20);
        assert_eq!(host.messages(), [COMPLETION_MESSAGE.to_string()]);
    }

    #[test]
    fn rising_check_lifts_sunken_vessel() {
        let mut host = InMemoryHost::new();
        host.add_ground_plane(0.0);
        // Bottom face sits 0.25 below the ground.
        let id = cube(&mut host, "sunk", 0.75);
        let mut eng = engine(StabilizerConfig {
            grounding_ticks: 0,
            ..StabilizerConfig::default()
        });
        eng.on_vessel_off_rails(&mut host, id);
        eng.fixed_update(&mut host);

        let raised = eng.entry(id).unwrap().raised_by();
        assert!((raised - 0.4).abs() < 1e-4, "raised {raised}");
        assert_eq!(eng.entry(id).unwrap().phase(), Phase::Grounding);
    }

    #[test]
    fn grounding_lowers_hovering_vessel() {
        let mut host = InMemoryHost::new();
        host.add_ground_plane(0.0);
        // Bottom face hovers 0.55 above the ground.
        let id = cube(&mut host, "hover", 1.55);
        let mut eng = engine(StabilizerConfig::default());
        eng.on_vessel_off_rails(&mut host, id);
        for _ in 0..5 {
            eng.fixed_update(&mut host);
        }
        let bottom_y = host.vessel(id).unwrap().center_of_mass.y - 1.0;
        assert!((bottom_y - 0.05).abs() < 1e-3, "bottom at {bottom_y}");
    }

    #[test]
    fn on_rails_exits_early_and_closes_window() {
        let mut host = InMemoryHost::new();
        host.add_ground_plane(0.0);
        let id = cube(&mut host, "lander", 1.5);
        let mut eng = engine(StabilizerConfig::default());
        let events = eng.subscribe();

        eng.on_vessel_off_rails(&mut host, id);
        eng.fixed_update(&mut host);
        eng.on_vessel_on_rails(&mut host, id);
        eng.on_vessel_on_rails(&mut host, id);

        assert_eq!(eng.stabilizing_count(), 0);
        assert!(eng.entry(id).is_none());
        assert!(host.messages().is_empty());
        let kinds: Vec<_> = events.drain().into_iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![EventKind::WindowOpened, EventKind::WindowClosed { message: None }]);
    }

    #[test]
    fn altitude_restore_toggles_collision_ignore() {
        let mut host = InMemoryHost::new();
        let ground = host.add_ground_plane(0.0);
        let id = cube(&mut host, "snapped", 1.0);
        host.vessel_mut(id).unwrap().rails_altitude = Some(0.4);
        let mut eng = engine(StabilizerConfig::default());
        eng.on_vessel_off_rails(&mut host, id);

        assert_eq!(host.collision_ignores(), [(id, ground, true), (id, ground, false)]);
        assert!((host.total_translation(id).y - 0.4).abs() < 1e-4);
    }

    #[test]
    fn degenerate_geometry_is_tracked_but_not_moved() {
        let mut host = InMemoryHost::new();
        host.add_ground_plane(0.0);
        let id = VesselId::new();
        let mut v = Vessel::landed(id, "ghost").with_part(Part::new(PartId::new(1), "empty"));
        v.center_of_mass = Vec3::new(0.0, 3.0, 0.0);
        host.insert_vessel(v);

        let mut eng = engine(StabilizerConfig::default());
        assert!(eng.on_vessel_off_rails(&mut host, id).is_tracking());
        for _ in 0..5 {
            eng.fixed_update(&mut host);
        }
        assert!(host.translations().is_empty());
        assert_eq!(eng.entry(id).unwrap().ticks_remaining(), 295);
    }

    #[test]
    fn anti_slide_holds_slow_bystanders() {
        let mut host = InMemoryHost::new();
        host.add_ground_plane(0.0);
        let lander = cube(&mut host, "lander", 1.5);
        let slow = cube(&mut host, "slow", 1.0);
        host.vessel_mut(slow).unwrap().situation = Situation::Flying;
        host.vessel_mut(slow).unwrap().surface_speed = 0.05;
        let fast = cube(&mut host, "fast", 1.0);
        host.vessel_mut(fast).unwrap().situation = Situation::Flying;
        host.vessel_mut(fast).unwrap().surface_speed = 3.0;

        let mut eng = engine(StabilizerConfig::default());
        eng.fixed_update(&mut host);
        assert_eq!(host.zero_velocity_count(slow), 0);

        eng.on_vessel_off_rails(&mut host, lander);
        eng.fixed_update(&mut host);
        assert_eq!(host.zero_velocity_count(slow), 1);
        assert_eq!(host.zero_velocity_count(fast), 0);
    }

    #[test]
    fn expiry_installs_contact_agent_on_bottom_part() {
        let mut host = InMemoryHost::new();
        host.add_ground_plane(0.0);
        let anchor = ModuleHandle::new(4);
        host.insert_module(
            anchor,
            ModuleState::new()
                .with_bool("isAttached", true)
                .on_invoke("Detach anchor", InvokeEffect::SetBool("isAttached".into(), false))
                .on_invoke("Attach anchor", InvokeEffect::SetBool("isAttached".into(), true)),
        );
        let id = cube(&mut host, "hangar", 1.5);
        host.vessel_mut(id).unwrap().parts[0]
            .modules
            .push(crate::vessel::ModuleRef::new("GroundAnchor", anchor));

        let mut eng = engine(StabilizerConfig {
            stabilization_ticks: 10,
            ..StabilizerConfig::default()
        });
        let EntryOutcome::Tracking { detached } = eng.on_vessel_off_rails(&mut host, id) else {
            panic!("vessel should be tracked");
        };
        assert_eq!(detached.len(), 1);
        assert_eq!(host.module_bool(anchor, "isAttached"), Some(false));

        eng.fixed_update(&mut host);
        let agent = eng.scheduler().agents_for(id).next().unwrap();
        assert_eq!(agent.policy(), TriggerPolicy::Contact);
        assert_eq!(agent.watched_part(), PartId::new(1));

        eng.on_part_collision(id, PartId::new(1), crate::host::PARTS_LAYER);
        eng.fixed_update(&mut host);
        assert_eq!(host.module_bool(anchor, "isAttached"), Some(false));

        eng.on_part_collision(id, PartId::new(1), STATIC_WORLD_LAYER);
        let report = eng.fixed_update(&mut host);
        assert_eq!(report.reconnect.attached.len(), 1);
        assert_eq!(host.module_bool(anchor, "isAttached"), Some(true));
    }
}

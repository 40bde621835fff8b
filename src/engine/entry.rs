//! Per-vessel stabilization state.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::anchoring::DeviceHandle;
use crate::geometry::VesselBounds;
use crate::schedule::Tick;
use crate::vessel::VesselId;

/// Phase of one vessel's stabilization window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Devices released; waiting for the first tick.
    Detaching,
    /// Lifting the vessel clear of the ground.
    RisingCheck,
    /// Lowering onto the ground, then holding still until the timer runs out.
    Grounding,
    /// Timer expired.
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Detaching => "detaching",
            Self::RisingCheck => "rising-check",
            Self::Grounding => "grounding",
            Self::Done => "done",
        };
        f.write_str(s)
    }
}

/// Tracking record of a vessel inside its stabilization window.
#[derive(Debug, Clone, PartialEq)]
pub struct StabilizationEntry {
    vessel_id: VesselId,
    ticks_remaining: u32,
    phase: Phase,
    opened_at: Tick,
    pub(crate) bounds: VesselBounds,
    pub(crate) bounds_stale: bool,
    pub(crate) detached: Vec<DeviceHandle>,
    pub(crate) agents_installed: bool,
    pub(crate) descent_ticks_left: u32,
    pub(crate) raised_by: f32,
}

impl StabilizationEntry {
    pub(crate) fn new(
        vessel_id: VesselId,
        window_ticks: u32,
        grounding_ticks: u32,
        opened_at: Tick,
        bounds: VesselBounds,
        detached: Vec<DeviceHandle>,
    ) -> Self {
        Self {
            vessel_id,
            ticks_remaining: window_ticks,
            phase: Phase::Detaching,
            opened_at,
            bounds,
            bounds_stale: false,
            detached,
            agents_installed: false,
            descent_ticks_left: grounding_ticks,
            raised_by: 0.0,
        }
    }

    /// Vessel this entry tracks.
    #[must_use]
    pub const fn vessel_id(&self) -> VesselId {
        self.vessel_id
    }

    /// Ticks left in the window.
    #[must_use]
    pub const fn ticks_remaining(&self) -> u32 {
        self.ticks_remaining
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Engine tick at which the window opened.
    #[must_use]
    pub const fn opened_at(&self) -> Tick {
        self.opened_at
    }

    /// Bounds snapshot used for probing.
    #[must_use]
    pub const fn bounds(&self) -> &VesselBounds {
        &self.bounds
    }

    /// Devices released when the window opened.
    #[must_use]
    pub fn detached(&self) -> &[DeviceHandle] {
        &self.detached
    }

    /// Upward correction applied by the rising check.
    #[must_use]
    pub const fn raised_by(&self) -> f32 {
        self.raised_by
    }

    pub(crate) fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
    }

    /// Counts one tick down. Returns true when the timer reaches zero.
    pub(crate) fn count_down(&mut self) -> bool {
        if self.phase == Phase::Done {
            return false;
        }
        self.ticks_remaining = self.ticks_remaining.saturating_sub(1);
        if self.ticks_remaining == 0 {
            self.phase = Phase::Done;
            true
        } else {
            false
        }
    }

    /// Zeroes the timer without running the remaining phases.
    pub(crate) fn abort(&mut self) {
        self.ticks_remaining = 0;
        self.phase = Phase::Done;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vessel::Vessel;

    fn entry(window: u32) -> StabilizationEntry {
        let v = Vessel::landed(VesselId::new(), "probe");
        StabilizationEntry::new(v.id, window, 3, 0, VesselBounds::degenerate(&v), Vec::new())
    }

    #[test]
    fn timer_decrements_by_one_until_done() {
        let mut e = entry(3);
        assert_eq!(e.phase(), Phase::Detaching);
        assert!(!e.count_down());
        assert_eq!(e.ticks_remaining(), 2);
        assert!(!e.count_down());
        assert!(e.count_down());
        assert_eq!(e.phase(), Phase::Done);
        assert!(!e.count_down());
        assert_eq!(e.ticks_remaining(), 0);
    }

    #[test]
    fn abort_finishes_immediately() {
        let mut e = entry(300);
        e.set_phase(Phase::Grounding);
        e.abort();
        assert_eq!(e.ticks_remaining(), 0);
        assert_eq!(e.phase(), Phase::Done);
    }
}

//! Vertical correction planning.
//!
//! Both planners are pure: they take probe results (or a probe closure) and
//! the configuration, and return how far to move. The engine performs the
//! translation.

use crate::config::{StabilizerConfig, MAX_RISE_STEPS};
use crate::probe::ProbeResult;

/// Why a grounding tick does not move the vessel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The ground-only probe from the bottom point found nothing.
    NoGroundBelow,
    /// The ground-and-parts probe from the bottom point found nothing.
    NoSurfaceBelow,
    /// Already within the safety margin.
    WithinMargin,
}

/// Outcome of descent planning for one grounding tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DescentPlan {
    /// Leave the vessel where it is.
    Skip(SkipReason),
    /// Bottom and top probes hit different surfaces; descend a fixed, small distance.
    Fallback(f32),
    /// Descend by the measured distance less the safety margin.
    Descend(f32),
}

impl DescentPlan {
    /// Distance to move down, 0 for a skip.
    #[must_use]
    pub const fn distance(&self) -> f32 {
        match self {
            Self::Skip(_) => 0.0,
            Self::Fallback(d) | Self::Descend(d) => *d,
        }
    }
}

/// Plans one descent step.
///
/// `bottom_ground` and `top_ground` are ground-only probes from the bottom and
/// top support points; `bottom_all` is the ground-and-parts probe from the
/// bottom point.
#[must_use]
pub fn plan_descent(
    bottom_ground: ProbeResult,
    top_ground: ProbeResult,
    bottom_all: ProbeResult,
    cfg: &StabilizerConfig,
) -> DescentPlan {
    let Some(bottom_surface) = bottom_ground.surface else {
        return DescentPlan::Skip(SkipReason::NoGroundBelow);
    };
    if let Some(top_surface) = top_ground.surface {
        if top_surface != bottom_surface {
            return DescentPlan::Fallback(cfg.fallback_descent);
        }
    }
    if !bottom_all.is_hit() {
        return DescentPlan::Skip(SkipReason::NoSurfaceBelow);
    }
    let measured = bottom_all.hit_distance;
    if measured <= cfg.min_down_movement {
        return DescentPlan::Skip(SkipReason::WithinMargin);
    }
    DescentPlan::Descend((measured - cfg.min_down_movement).min(cfg.max_down_movement))
}

/// Plans the rising check.
///
/// `clearance_at(raised)` reports the bottom's clearance above the ground
/// once the vessel has been lifted by `raised`, or `None` when no ground is
/// found. The vessel rises in `up_step` increments until the clearance
/// exceeds `min_clearance`; the result never exceeds `max_up_movement` and
/// at most [`MAX_RISE_STEPS`] increments are probed.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
pub fn plan_rise(mut clearance_at: impl FnMut(f32) -> Option<f32>, cfg: &StabilizerConfig) -> f32 {
    let max_steps = ((cfg.max_up_movement / cfg.up_step + 1e-4).floor().max(0.0) as u32).min(MAX_RISE_STEPS);
    for step in 0..=max_steps {
        let raised = (step as f32 * cfg.up_step).min(cfg.max_up_movement);
        if clearance_at(raised).is_some_and(|c| c > cfg.min_clearance) {
            return raised;
        }
    }
    (max_steps as f32 * cfg.up_step).min(cfg.max_up_movement)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vessel::SurfaceId;

    fn hit(d: f32, s: u64) -> ProbeResult {
        ProbeResult {
            hit_distance: d,
            surface: Some(SurfaceId::new(s)),
        }
    }

    #[test]
    fn below_margin_does_not_move() {
        let cfg = StabilizerConfig::default();
        let plan = plan_descent(hit(0.03, 1), hit(2.03, 1), hit(0.03, 1), &cfg);
        assert_eq!(plan, DescentPlan::Skip(SkipReason::WithinMargin));
        assert_eq!(plan.distance(), 0.0);
    }

    #[test]
    fn different_surfaces_take_fallback() {
        let cfg = StabilizerConfig::default();
        let plan = plan_descent(hit(1.0, 1), hit(3.0, 2), hit(1.0, 1), &cfg);
        assert_eq!(plan, DescentPlan::Fallback(cfg.fallback_descent));
    }

    #[test]
    fn descends_to_margin_and_caps() {
        let cfg = StabilizerConfig::default();
        match plan_descent(hit(0.55, 1), hit(2.55, 1), hit(0.55, 1), &cfg) {
            DescentPlan::Descend(d) => assert!((d - 0.5).abs() < 1e-5),
            other => panic!("unexpected plan {other:?}"),
        }
        let plan = plan_descent(hit(40.0, 1), hit(42.0, 1), hit(40.0, 1), &cfg);
        assert_eq!(plan, DescentPlan::Descend(cfg.max_down_movement));
    }

    #[test]
    fn parts_probe_limits_descent() {
        let cfg = StabilizerConfig::default();
        let plan = plan_descent(hit(1.0, 1), hit(3.0, 1), hit(0.25, 9), &cfg);
        match plan {
            DescentPlan::Descend(d) => assert!((d - 0.2).abs() < 1e-5),
            other => panic!("unexpected plan {other:?}"),
        }
    }

    #[test]
    fn missing_ground_skips() {
        let cfg = StabilizerConfig::default();
        let plan = plan_descent(ProbeResult::MISS, hit(3.0, 1), hit(1.0, 1), &cfg);
        assert_eq!(plan, DescentPlan::Skip(SkipReason::NoGroundBelow));
    }

    #[test]
    fn rise_stops_once_clear() {
        let cfg = StabilizerConfig::default();
        // Bottom starts 0.25 below the surface.
        let raised = plan_rise(|r| Some(r - 0.25), &cfg);
        assert!((raised - 0.4).abs() < 1e-4);
    }

    #[test]
    fn rise_never_exceeds_budget_without_ground() {
        let cfg = StabilizerConfig::default();
        let mut calls = 0;
        let raised = plan_rise(
            |_| {
                calls += 1;
                None
            },
            &cfg,
        );
        assert!(raised <= cfg.max_up_movement);
        assert!((raised - cfg.max_up_movement).abs() < 1e-4);
        assert_eq!(calls, 51);
    }

    #[test]
    fn rise_probes_are_capped_for_tiny_steps() {
        let cfg = StabilizerConfig {
            up_step: 1e-12,
            ..StabilizerConfig::default()
        };
        let mut calls = 0_u32;
        let raised = plan_rise(
            |_| {
                calls += 1;
                None
            },
            &cfg,
        );
        assert_eq!(calls, MAX_RISE_STEPS + 1);
        assert!(raised <= cfg.max_up_movement);
    }

    #[test]
    fn already_clear_does_not_rise() {
        let cfg = StabilizerConfig::default();
        assert_eq!(plan_rise(|_| Some(1.0), &cfg), 0.0);
    }
}

//! Stabilizer configuration.
//!
//! All fields have defaults, so a partial JSON document (or none at all) is a
//! valid configuration. Durations given in seconds are turned into tick
//! counts through a [`Timebase`] built from the host's fixed timestep.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::anchoring::IntegrationKind;
use crate::error::{StabilizerError, StabilizerResult, ValidationError};

/// Most `up_step` increments one rising check may take.
pub const MAX_RISE_STEPS: u32 = 1000;

/// Tunables of the stabilization window, descent and reconnection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilizerConfig {
    /// Length of the stabilization window in ticks.
    pub stabilization_ticks: u32,
    /// Ticks, at the start of the window, in which descent is attempted.
    pub grounding_ticks: u32,
    /// Descent safety margin.
    pub min_down_movement: f32,
    /// Cap on one descent step.
    pub max_down_movement: f32,
    /// Descent used when the bottom and top probes disagree.
    pub fallback_descent: f32,
    /// Increment of the rising check.
    pub up_step: f32,
    /// Upward movement budget of the rising check.
    pub max_up_movement: f32,
    /// Clearance the rising check must see above the ground.
    pub min_clearance: f32,
    /// Default delay between ground contact and reattach, in seconds.
    pub reattach_delay: f32,
    /// Per-kind overrides of `reattach_delay`.
    pub reattach_delays: BTreeMap<IntegrationKind, f32>,
    /// Grounded-flag poll interval for wheel parts, in seconds.
    pub check_landed_period: f32,
    /// How long an agent waits for ground contact, in seconds.
    pub check_landed_timeout: f32,
    /// Ticks a triggered agent lingers before retiring.
    pub reconnect_grace_ticks: u32,
    /// Surface speed under which a vessel is held still.
    pub anti_slide_speed: f32,
    /// Stabilize vessels sitting on the launch pad.
    pub stabilize_prelaunch: bool,
    /// Stabilize kerbals on EVA.
    pub stabilize_kerbals: bool,
    /// Recompute bounds on every grounding tick.
    pub recalculate_bounds: bool,
    /// Lift vessels back to their on-rails altitude when unpacking lowered them.
    pub restore_altitude: bool,
    /// Emit periodic progress and probe details.
    pub debug_logging: bool,
    /// Draw support points and ray markers.
    pub draw_markers: bool,
    /// Post a completion message when the last vessel settles.
    pub display_message: bool,
    /// Vessel names never stabilized.
    pub exclude_vessels: Vec<String>,
}

impl Default for StabilizerConfig {
    fn default() -> Self {
        Self {
            stabilization_ticks: 300,
            grounding_ticks: 3,
            min_down_movement: 0.05,
            max_down_movement: 2.0,
            fallback_descent: 0.1,
            up_step: 0.1,
            max_up_movement: 5.0,
            min_clearance: 0.1,
            reattach_delay: 0.0,
            reattach_delays: BTreeMap::new(),
            check_landed_period: 0.5,
            check_landed_timeout: 10.0,
            reconnect_grace_ticks: 3,
            anti_slide_speed: 0.1,
            stabilize_prelaunch: true,
            stabilize_kerbals: false,
            recalculate_bounds: true,
            restore_altitude: true,
            debug_logging: false,
            draw_markers: false,
            display_message: true,
            exclude_vessels: Vec::new(),
        }
    }
}

impl StabilizerConfig {
    /// Parses and validates a JSON document.
    pub fn from_json_str(json: &str) -> StabilizerResult<Self> {
        let cfg: Self = serde_json::from_str(json)
            .map_err(|e| StabilizerError::config(format!("invalid stabilizer config: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reads, parses and validates a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> StabilizerResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| StabilizerError::config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json_str(&text)
    }

    /// Checks ranges and cross-field constraints.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.stabilization_ticks == 0 {
            return Err(not_positive("stabilization_ticks", 0.0));
        }
        if self.grounding_ticks > self.stabilization_ticks {
            return Err(ValidationError::GroundingExceedsWindow {
                grounding_ticks: self.grounding_ticks,
                window_ticks: self.stabilization_ticks,
            });
        }

        let scalars = [
            ("min_down_movement", self.min_down_movement),
            ("max_down_movement", self.max_down_movement),
            ("fallback_descent", self.fallback_descent),
            ("up_step", self.up_step),
            ("max_up_movement", self.max_up_movement),
            ("min_clearance", self.min_clearance),
            ("reattach_delay", self.reattach_delay),
            ("check_landed_period", self.check_landed_period),
            ("check_landed_timeout", self.check_landed_timeout),
            ("anti_slide_speed", self.anti_slide_speed),
        ];
        for (field, value) in scalars {
            if !value.is_finite() {
                return Err(ValidationError::NotFinite { field: field.to_string() });
            }
        }
        for (field, value) in [
            ("up_step", self.up_step),
            ("check_landed_period", self.check_landed_period),
            ("check_landed_timeout", self.check_landed_timeout),
        ] {
            if value <= 0.0 {
                return Err(not_positive(field, value));
            }
        }
        for (field, value) in scalars {
            if value < 0.0 {
                return Err(not_positive(field, value));
            }
        }
        for (kind, delay) in &self.reattach_delays {
            if !delay.is_finite() || *delay < 0.0 {
                return Err(not_positive(&format!("reattach_delays.{kind}"), *delay));
            }
        }

        if self.min_down_movement > self.max_down_movement {
            return Err(ValidationError::ExceedsLimit {
                field: "min_down_movement".to_string(),
                limit_field: "max_down_movement".to_string(),
                value: f64::from(self.min_down_movement),
                limit: f64::from(self.max_down_movement),
            });
        }
        if self.up_step > self.max_up_movement {
            return Err(ValidationError::ExceedsLimit {
                field: "up_step".to_string(),
                limit_field: "max_up_movement".to_string(),
                value: f64::from(self.up_step),
                limit: f64::from(self.max_up_movement),
            });
        }
        let rise_steps = f64::from(self.max_up_movement) / f64::from(self.up_step);
        if rise_steps > f64::from(MAX_RISE_STEPS) + 1e-3 {
            return Err(ValidationError::TooManyRiseSteps {
                steps: rise_steps,
                limit: MAX_RISE_STEPS,
            });
        }
        Ok(())
    }

    /// Reattach delay for a kind, in seconds.
    #[must_use]
    pub fn reattach_delay_for(&self, kind: IntegrationKind) -> f32 {
        self.reattach_delays
            .get(&kind)
            .copied()
            .unwrap_or(self.reattach_delay)
    }

    /// Returns true if the vessel name is on the exclusion list.
    #[must_use]
    pub fn is_excluded(&self, vessel_name: &str) -> bool {
        let name = vessel_name.trim();
        self.exclude_vessels.iter().any(|n| n.trim() == name)
    }
}

fn not_positive(field: &str, value: f32) -> ValidationError {
    ValidationError::NotPositive {
        field: field.to_string(),
        value: f64::from(value),
    }
}

/// Converts seconds of simulation time to whole ticks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timebase {
    fixed_delta_time: f32,
}

impl Timebase {
    /// Builds a timebase from the host's fixed timestep in seconds.
    pub fn new(fixed_delta_time: f32) -> Result<Self, ValidationError> {
        if !fixed_delta_time.is_finite() {
            return Err(ValidationError::NotFinite {
                field: "fixed_delta_time".to_string(),
            });
        }
        if fixed_delta_time <= 0.0 {
            return Err(not_positive("fixed_delta_time", fixed_delta_time));
        }
        Ok(Self { fixed_delta_time })
    }

    /// Seconds per tick.
    #[must_use]
    pub const fn fixed_delta_time(&self) -> f32 {
        self.fixed_delta_time
    }

    /// Whole ticks covering `seconds`, rounded up. Non-positive durations are 0.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn ticks(&self, seconds: f32) -> u32 {
        if seconds <= 0.0 {
            return 0;
        }
        // Absorb float noise so 0.5 s at 0.02 s/tick is 25 ticks, not 26.
        let exact = seconds / self.fixed_delta_time;
        let ticks = (exact - 1e-4).ceil();
        ticks.clamp(0.0, u32::MAX as f32) as u32
    }
}

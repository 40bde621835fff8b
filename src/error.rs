//! Error types for the vessel stabilizer.
//!
//! All errors are strongly typed using thiserror so callers can match on
//! specific conditions. None of them is fatal to a running simulation: the
//! engine isolates vessel and device failures and only surfaces errors from
//! construction and configuration loading.

use thiserror::Error;

use crate::anchoring::IntegrationKind;
use crate::vessel::{ModuleHandle, PartId, VesselId};

/// Validation errors for configuration and caller-supplied input.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Field '{field}' must be positive, got {value}")]
    NotPositive {
        field: String,
        value: f64,
    },

    #[error("Field '{field}' must be finite")]
    NotFinite {
        field: String,
    },

    #[error("Grounding phase ({grounding_ticks} ticks) does not fit in the stabilization window ({window_ticks} ticks)")]
    GroundingExceedsWindow {
        grounding_ticks: u32,
        window_ticks: u32,
    },

    #[error("Field '{field}' must not exceed '{limit_field}' ({value} > {limit})")]
    ExceedsLimit {
        field: String,
        limit_field: String,
        value: f64,
        limit: f64,
    },

    #[error("Rising check needs {steps} steps of up_step, more than the limit of {limit}")]
    TooManyRiseSteps {
        steps: f64,
        limit: u32,
    },
}

/// Errors reported across the host seam.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("Vessel not found: {id}")]
    VesselNotFound {
        id: VesselId,
    },

    #[error("Module not found: {handle}")]
    ModuleNotFound {
        handle: ModuleHandle,
    },

    #[error("Module {handle} has been destroyed")]
    ModuleDestroyed {
        handle: ModuleHandle,
    },

    #[error("Module {handle} has no field '{field}'")]
    FieldMissing {
        handle: ModuleHandle,
        field: String,
    },

    #[error("Module {handle} rejected '{method}'")]
    InvocationRejected {
        handle: ModuleHandle,
        method: String,
    },
}

/// Errors raised by anchoring device adapters.
#[derive(Debug, Error)]
pub enum AnchorError {
    #[error("{kind} device on part {part} is stale (module {handle} destroyed)")]
    StaleDevice {
        kind: IntegrationKind,
        part: PartId,
        handle: ModuleHandle,
    },

    #[error("{kind} device on part {part}: {action} failed: {source}")]
    ActionFailed {
        kind: IntegrationKind,
        part: PartId,
        action: &'static str,
        #[source]
        source: HostError,
    },
}

/// Top-level error type.
#[derive(Debug, Error)]
pub enum StabilizerError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Host error: {0}")]
    Host(#[from] HostError),

    #[error("Anchor error: {0}")]
    Anchor(#[from] AnchorError),

    #[error("Configuration error: {message}")]
    Config {
        message: String,
    },
}

impl StabilizerError {
    /// Creates a configuration loading error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is a host error.
    #[must_use]
    pub const fn is_host(&self) -> bool {
        matches!(self, Self::Host(_))
    }

    /// Returns true if this is an anchor error.
    #[must_use]
    pub const fn is_anchor(&self) -> bool {
        matches!(self, Self::Anchor(_))
    }

    /// Returns true if this is a configuration loading error.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config { .. })
    }

    /// Returns true if the failure concerns a device whose backing module is gone.
    #[must_use]
    pub const fn is_stale_device(&self) -> bool {
        match self {
            Self::Anchor(AnchorError::StaleDevice { .. }) => true,
            Self::Host(HostError::ModuleDestroyed { .. }) => true,
            _ => false,
        }
    }
}

/// Result type alias for stabilizer operations.
pub type StabilizerResult<T> = Result<T, StabilizerError>;

/// Result type alias for host seam operations.
pub type HostResult<T> = Result<T, HostError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_not_positive() {
        let err = ValidationError::NotPositive {
            field: "up_step".to_string(),
            value: -0.5,
        };
        let msg = format!("{err}");
        assert!(msg.contains("up_step"));
        assert!(msg.contains("-0.5"));
    }

    #[test]
    fn test_validation_error_grounding_window() {
        let err = ValidationError::GroundingExceedsWindow {
            grounding_ticks: 400,
            window_ticks: 300,
        };
        let msg = format!("{err}");
        assert!(msg.contains("400"));
        assert!(msg.contains("300"));
    }

    #[test]
    fn test_validation_error_rise_steps() {
        let err = ValidationError::TooManyRiseSteps {
            steps: 500_000.0,
            limit: 1000,
        };
        let msg = format!("{err}");
        assert!(msg.contains("500000"));
        assert!(msg.contains("1000"));
    }

    #[test]
    fn test_host_error_vessel_not_found() {
        let id = VesselId::new();
        let err = HostError::VesselNotFound { id };
        assert!(format!("{err}").contains("Vessel not found"));
    }

    #[test]
    fn test_anchor_error_carries_host_source() {
        let err = AnchorError::ActionFailed {
            kind: IntegrationKind::KisPylon,
            part: PartId::new(7),
            action: "detach",
            source: HostError::ModuleDestroyed {
                handle: ModuleHandle::new(3),
            },
        };
        let msg = format!("{err}");
        assert!(msg.contains("detach failed"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_stabilizer_error_from_validation() {
        let err: StabilizerError = ValidationError::NotFinite {
            field: "min_clearance".to_string(),
        }
        .into();
        assert!(err.is_validation());
        assert!(!err.is_host());
    }

    #[test]
    fn test_stabilizer_error_stale_device() {
        let err: StabilizerError = AnchorError::StaleDevice {
            kind: IntegrationKind::KasHarpoon,
            part: PartId::new(1),
            handle: ModuleHandle::new(9),
        }
        .into();
        assert!(err.is_anchor());
        assert!(err.is_stale_device());

        let err: StabilizerError = HostError::ModuleDestroyed {
            handle: ModuleHandle::new(9),
        }
        .into();
        assert!(err.is_stale_device());

    }
}

//! Ground-anchoring integrations.
//!
//! Clamps, tethers, pylons and anchors bind a vessel to the static world and
//! must be released before the vessel is moved. This module provides:
//! - Discovery of the optional integrations the host has loaded
//! - One [`AnchoringDevice`] adapter per integration kind
//! - The [`GroundAttachmentRegistry`] that detaches devices and later
//!   reattaches each of them at most once

pub mod device;
pub mod integration;
pub mod registry;

pub use device::{adapter_for, AnchoringDevice, GroundAnchorDevice, HarpoonDevice, PylonDevice};
pub use integration::{full_catalog, Integration, IntegrationKind};
pub use registry::{AttachOutcome, DeviceHandle, DeviceId, GroundAttachmentRegistry};

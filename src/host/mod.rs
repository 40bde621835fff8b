//! Host seam: the operations the stabilizer consumes from the simulation engine.
//!
//! These traits define the contract a host must implement. The stabilizer
//! never touches rigid bodies, colliders or foreign add-on objects directly:
//! it reads vessel views, asks for ray probes, and requests mutations.
//! By using traits, we enable:
//! - An in-memory host for tests, benches and headless tools
//! - Bindings to a real game engine

/// In-process host with plane/box surfaces and scripted modules.
pub mod memory;

use std::collections::BTreeSet;
use std::fmt;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::HostResult;
use crate::vessel::{ModuleHandle, PartId, SurfaceId, Vessel, VesselId};

/// Layer index of static world geometry (terrain, buildings).
pub const STATIC_WORLD_LAYER: u32 = 15;
/// Layer index of vessel parts.
pub const PARTS_LAYER: u32 = 0;
/// Layer index of local scenery colliders.
pub const LOCAL_SCENERY_LAYER: u32 = 28;

/// Collision layer filter for ray probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerMask(u32);

impl LayerMask {
    /// Terrain and static world geometry only.
    pub const GROUND_ONLY: Self = Self(1 << STATIC_WORLD_LAYER);
    /// Ground plus vessel parts and local scenery.
    pub const GROUND_AND_PARTS: Self =
        Self((1 << LOCAL_SCENERY_LAYER) | (1 << STATIC_WORLD_LAYER) | (1 << PARTS_LAYER));

    /// Mask from raw bits.
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw bits.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Returns true if the mask admits the given layer index.
    #[must_use]
    pub const fn contains_layer(self, layer: u32) -> bool {
        layer < 32 && self.0 & (1 << layer) != 0
    }
}

/// First intersection reported by a host ray cast.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    /// World-space hit point.
    pub point: Vec3,
    /// Surface that was hit.
    pub surface: SurfaceId,
}

/// Saved or applied parameters of a spring joint (winch cable).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpringJointParams {
    /// Spring stiffness.
    pub spring: f32,
    /// Slack allowed before the spring acts.
    pub tolerance: f32,
    /// Cable length.
    pub max_distance: f32,
}

/// Name of a callable exported by a host extension, `Type::Method`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryPoint(String);

impl EntryPoint {
    /// Builds `type_name::method`.
    #[must_use]
    pub fn new(type_name: &str, method: &str) -> Self {
        Self(format!("{type_name}::{method}"))
    }

    /// The qualified name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The method part after the last `::`.
    #[must_use]
    pub fn method(&self) -> &str {
        self.0.rsplit("::").next().unwrap_or(&self.0)
    }
}

impl fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An extension (add-on assembly) loaded by the host, with the entry points it exports.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadedExtension {
    pub name: String,
    pub entry_points: BTreeSet<EntryPoint>,
}

impl LoadedExtension {
    /// Creates an extension exporting no types yet.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entry_points: BTreeSet::new(),
        }
    }

    /// Builder-style entry point export.
    #[must_use]
    pub fn exporting(mut self, type_name: &str, method: &str) -> Self {
        self.entry_points.insert(EntryPoint::new(type_name, method));
        self
    }

    /// Resolves an entry point, if exported.
    #[must_use]
    pub fn resolve(&self, type_name: &str, method: &str) -> Option<EntryPoint> {
        let wanted = EntryPoint::new(type_name, method);
        self.entry_points.contains(&wanted).then_some(wanted)
    }
}

/// Vessel access and physics operations.
pub trait SimHost {
    /// Read-only view of a loaded vessel.
    fn vessel(&self, id: VesselId) -> Option<&Vessel>;

    /// Ids of all vessels currently loaded in the physics scene.
    fn loaded_vessels(&self) -> Vec<VesselId>;

    /// Moves the vessel rigidly by `offset`.
    fn translate(&mut self, id: VesselId, offset: Vec3) -> HostResult<()>;

    /// Zeroes linear velocity, angular velocity and angular momentum.
    fn zero_velocity(&mut self, id: VesselId) -> HostResult<()>;

    /// Stops external force accumulation (g-forces, ground contact, collision ignores) for this tick.
    fn suppress_external_forces(&mut self, id: VesselId) -> HostResult<()>;

    /// Enables or disables collision response between the vessel and a surface.
    fn set_collision_ignored(&mut self, id: VesselId, surface: SurfaceId, ignored: bool) -> HostResult<()>;

    /// Casts a ray and returns the first hit within `max_distance` on a layer in `mask`.
    fn raycast(&self, origin: Vec3, direction: Vec3, max_distance: f32, mask: LayerMask) -> Option<RayHit>;

    /// Part-local "is grounded" flag (wheel/landing gear contact state).
    fn part_grounded(&self, vessel: VesselId, part: PartId) -> bool;

    /// Shows a one-line message to the user.
    fn post_message(&mut self, _text: &str) {}

    /// Draws a diagnostic line segment.
    fn draw_marker(&mut self, _vessel: VesselId, _from: Vec3, _to: Vec3) {}
}

/// Access to part modules owned by host extensions.
///
/// Modules are addressed by non-owning handles; a handle may outlive the module
/// it refers to, in which case every call reports `HostError::ModuleDestroyed`.
pub trait ModuleHost {
    /// The host's loaded-extension catalog.
    fn loaded_extensions(&self) -> Vec<LoadedExtension>;

    /// Returns true while the module still exists.
    fn module_alive(&self, module: ModuleHandle) -> bool;

    /// Reads a boolean field. Dotted paths address nested fields.
    fn read_bool(&self, module: ModuleHandle, field: &str) -> HostResult<bool>;

    /// Reads a string field.
    fn read_str(&self, module: ModuleHandle, field: &str) -> HostResult<String>;

    /// Writes a boolean field.
    fn write_bool(&mut self, module: ModuleHandle, field: &str, value: bool) -> HostResult<()>;

    /// Invokes an entry point (or a named action) on the module.
    fn invoke(&mut self, module: ModuleHandle, entry_point: &EntryPoint, arg: Option<i32>) -> HostResult<()>;

    /// Follows a module reference stored in `field` (possibly on a sibling module).
    fn linked_module(&self, module: ModuleHandle, field: &str) -> Option<ModuleHandle>;

    /// Spring joint found under the module's part, if any.
    fn spring_joint(&self, module: ModuleHandle) -> Option<SpringJointParams>;

    /// Overwrites the spring joint under the module's part.
    fn set_spring_joint(&mut self, module: ModuleHandle, params: SpringJointParams) -> HostResult<()>;
}

/// Everything the stabilization engine needs from its host.
pub trait Host: SimHost + ModuleHost {}

impl<T: SimHost + ModuleHost> Host for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_masks() {
        assert!(LayerMask::GROUND_ONLY.contains_layer(STATIC_WORLD_LAYER));
        assert!(!LayerMask::GROUND_ONLY.contains_layer(PARTS_LAYER));
        assert!(LayerMask::GROUND_AND_PARTS.contains_layer(PARTS_LAYER));
        assert!(LayerMask::GROUND_AND_PARTS.contains_layer(LOCAL_SCENERY_LAYER));
        assert!(!LayerMask::from_bits(u32::MAX).contains_layer(40));
    }

    #[test]
    fn extension_resolves_only_exported_entry_points() {
        let ext = LoadedExtension::new("KIS")
            .exporting("KIS.ModuleKISItem", "GroundDetach");
        let ep = ext.resolve("KIS.ModuleKISItem", "GroundDetach").unwrap();
        assert_eq!(ep.as_str(), "KIS.ModuleKISItem::GroundDetach");
        assert_eq!(ep.method(), "GroundDetach");
        assert!(ext.resolve("KIS.ModuleKISItem", "GroundAttach").is_none());
    }
}

//! Vessel data model as seen through the host seam.
//!
//! The core never owns a vessel. The host hands out read-only views of its
//! vessels (transform, centre of mass, parts, collision meshes) and performs
//! every mutation on request.

use std::fmt;

use glam::{Affine3A, Vec3};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Module name carried by wheel and landing-gear parts.
pub const MODULE_WHEEL_BASE: &str = "ModuleWheelBase";
/// Module name of grapple/harpoon parts whose meshes are not hull geometry.
pub const MODULE_HARPOON: &str = "KASModuleHarpoon";
/// Module names marking a part that is bolted to the world for good.
pub const PERMANENT_FIXTURE_MODULES: &[&str] = &["LaunchClamp", "FlagSite"];

/// Globally unique, stable vessel identifier (the host's vessel GUID).
///
/// # Examples
///
/// ```
/// use vessel_stabilizer::VesselId;
///
/// let id = VesselId::new();
/// assert!(!id.is_nil());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VesselId(Uuid);

impl VesselId {
    /// Creates a new random vessel ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a vessel ID from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Returns true if this is a nil (all zeros) UUID.
    #[must_use]
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }

    /// Creates a nil vessel ID (for testing or sentinel values).
    #[must_use]
    pub const fn nil() -> Self {
        Self(Uuid::nil())
    }
}

impl Default for VesselId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for VesselId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for VesselId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<VesselId> for Uuid {
    fn from(id: VesselId) -> Self {
        id.0
    }
}

macro_rules! host_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Wraps a host-assigned id.
            #[must_use]
            pub const fn new(raw: u64) -> Self {
                Self(raw)
            }

            /// Returns the raw host id.
            #[must_use]
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

host_id!(
    /// Host-assigned part id (stable for the lifetime of the part).
    PartId,
    "part"
);
host_id!(
    /// Non-owning reference to a part module living in the host.
    ModuleHandle,
    "module"
);
host_id!(
    /// Opaque identifier of a surface hit by a ray probe.
    SurfaceId,
    "surface"
);

/// Coarse flight situation reported by the host.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Situation {
    Landed,
    Prelaunch,
    Splashed,
    Flying,
    Orbiting,
    Other,
}

/// A module attached to a part, referenced by name and host handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRef {
    /// Module type name as the host reports it.
    pub name: String,
    /// Handle used for every call back into the host.
    pub handle: ModuleHandle,
}

impl ModuleRef {
    /// Module reference by name and handle.
    pub fn new(name: impl Into<String>, handle: ModuleHandle) -> Self {
        Self {
            name: name.into(),
            handle,
        }
    }
}

/// One renderable mesh of a part together with its world transform.
#[derive(Debug, Clone)]
pub struct CollisionMesh {
    /// Mesh-local to world transform.
    pub transform: Affine3A,
    /// Mesh-local vertices.
    pub vertices: Vec<Vec3>,
    /// Whether a collider is attached to this mesh.
    pub has_collider: bool,
}

impl CollisionMesh {
    /// Axis-aligned box mesh (8 vertices) centred on `center`, already in world space.
    #[must_use]
    pub fn cuboid(center: Vec3, half_extents: Vec3) -> Self {
        let mut vertices = Vec::with_capacity(8);
        for sx in [-1.0, 1.0] {
            for sy in [-1.0, 1.0] {
                for sz in [-1.0, 1.0] {
                    vertices.push(Vec3::new(sx, sy, sz) * half_extents);
                }
            }
        }
        Self {
            transform: Affine3A::from_translation(center),
            vertices,
            has_collider: true,
        }
    }

    /// Same mesh without an instantiated collider.
    #[must_use]
    pub fn without_collider(mut self) -> Self {
        self.has_collider = false;
        self
    }
}

/// A rigid sub-component of a vessel.
#[allow(missing_docs)]
#[derive(Debug, Clone)]
pub struct Part {
    pub id: PartId,
    pub name: String,
    pub modules: Vec<ModuleRef>,
    pub meshes: Vec<CollisionMesh>,
}

impl Part {
    /// Creates a part with no modules and no meshes.
    pub fn new(id: PartId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            modules: Vec::new(),
            meshes: Vec::new(),
        }
    }

    /// Builder-style module attachment.
    #[must_use]
    pub fn with_module(mut self, name: impl Into<String>, handle: ModuleHandle) -> Self {
        self.modules.push(ModuleRef::new(name, handle));
        self
    }

    /// Builder-style mesh attachment.
    #[must_use]
    pub fn with_mesh(mut self, mesh: CollisionMesh) -> Self {
        self.meshes.push(mesh);
        self
    }

    /// Returns true if the part carries a module with this name.
    #[must_use]
    pub fn has_module(&self, name: &str) -> bool {
        self.modules.iter().any(|m| m.name == name)
    }

    /// First module with this name.
    #[must_use]
    pub fn module(&self, name: &str) -> Option<&ModuleRef> {
        self.modules.iter().find(|m| m.name == name)
    }

    /// Wheels and landing gear. Their colliders are usually not instantiated
    /// yet when a vessel goes off rails.
    #[must_use]
    pub fn is_wheel(&self) -> bool {
        self.has_module(MODULE_WHEEL_BASE)
    }

    /// Parts whose geometry does not describe the hull.
    #[must_use]
    pub fn is_excluded_from_bounds(&self) -> bool {
        self.has_module(MODULE_HARPOON)
    }

    /// Launch clamps, flags and similar world-fixed parts.
    #[must_use]
    pub fn is_permanent_fixture(&self) -> bool {
        PERMANENT_FIXTURE_MODULES.iter().any(|m| self.has_module(m))
    }
}

/// Read-only view of a host vessel.
#[allow(missing_docs)]
#[derive(Debug, Clone)]
pub struct Vessel {
    pub id: VesselId,
    pub name: String,
    pub situation: Situation,
    /// Lightweight crewed actor (kerbal on EVA).
    pub is_eva: bool,
    /// No active physics yet.
    pub packed: bool,
    /// Vessel-local to world transform.
    pub transform: Affine3A,
    pub center_of_mass: Vec3,
    /// Centre of the gravitating body the vessel sits on.
    pub body_center: Vec3,
    pub surface_speed: f32,
    /// Ray length used for ground probes (vessel-class unload distance).
    pub unload_distance: f32,
    pub altitude: f32,
    /// Altitude the vessel had while it was on rails, if the host kept it.
    pub rails_altitude: Option<f32>,
    pub parts: Vec<Part>,
}

impl Vessel {
    /// Creates a landed, unpacked vessel whose body centre lies far below the origin.
    pub fn landed(id: VesselId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            situation: Situation::Landed,
            is_eva: false,
            packed: false,
            transform: Affine3A::IDENTITY,
            center_of_mass: Vec3::ZERO,
            body_center: Vec3::new(0.0, -600_000.0, 0.0),
            surface_speed: 0.0,
            unload_distance: 2250.0,
            altitude: 0.0,
            rails_altitude: None,
            parts: Vec::new(),
        }
    }

    /// Builder-style part attachment.
    #[must_use]
    pub fn with_part(mut self, part: Part) -> Self {
        self.parts.push(part);
        self
    }

    /// Unit vector from the body centre towards the centre of mass.
    #[must_use]
    pub fn up(&self) -> Vec3 {
        (self.center_of_mass - self.body_center).normalize_or_zero()
    }

    /// Looks up a part by id.
    #[must_use]
    pub fn part(&self, id: PartId) -> Option<&Part> {
        self.parts.iter().find(|p| p.id == id)
    }

    /// Returns true if any part pins the vessel to the world permanently.
    #[must_use]
    pub fn has_permanent_fixture(&self) -> bool {
        self.parts.iter().any(Part::is_permanent_fixture)
    }

    /// Moves the vessel (transform and centre of mass) by `offset`.
    pub fn translate(&mut self, offset: Vec3) {
        self.transform.translation += glam::Vec3A::from(offset);
        self.center_of_mass += offset;
        for part in &mut self.parts {
            for mesh in &mut part.meshes {
                mesh.transform.translation += glam::Vec3A::from(offset);
            }
        }
        self.altitude += offset.dot(self.up());
    }
}

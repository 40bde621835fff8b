//! Vertical extent of a vessel without an explicit bounding box.
//!
//! The probe places two anchor points far below and far above the centre of
//! mass along the local up axis and keeps, for each anchor, the collision
//! vertex nearest to it. Nearest-to-a-distant-anchor is close to "lowest" and
//! "highest" but ignores stray geometry off to the side of the silhouette.

use glam::{Affine3A, Vec3};
use tracing::{debug, warn};

use crate::vessel::{PartId, Vessel, VesselId};

/// Distance of the directional anchors from the centre of mass.
pub const ANCHOR_DISTANCE: f32 = 2000.0;

/// Snapshot of a vessel's vertical extent.
///
/// Support points are stored in vessel-local coordinates so they stay valid
/// after the vessel is translated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VesselBounds {
    /// Unit up axis at the time of the snapshot.
    pub up: Vec3,
    /// Bottom support point, vessel-local.
    pub local_bottom: Vec3,
    /// Top support point, vessel-local.
    pub local_top: Vec3,
    /// Distance from the centre of mass down to the bottom point along `up`.
    pub bottom_length: f32,
    /// Distance from the centre of mass up to the top point along `up`.
    pub top_length: f32,
    /// Part that supplied the bottom point.
    pub bottom_part: Option<PartId>,
    /// Part that supplied the top point.
    pub top_part: Option<PartId>,
}

impl VesselBounds {
    /// Bounds collapsed onto the centre of mass.
    #[must_use]
    pub fn degenerate(vessel: &Vessel) -> Self {
        let local_com = vessel.transform.inverse().transform_point3(vessel.center_of_mass);
        Self {
            up: vessel.up(),
            local_bottom: local_com,
            local_top: local_com,
            bottom_length: 0.0,
            top_length: 0.0,
            bottom_part: None,
            top_part: None,
        }
    }

    /// True when no collision-bearing geometry was found.
    #[must_use]
    pub const fn is_degenerate(&self) -> bool {
        self.bottom_part.is_none()
    }

    /// Bottom support point in world space under the vessel's current transform.
    #[must_use]
    pub fn bottom_point(&self, transform: &Affine3A) -> Vec3 {
        transform.transform_point3(self.local_bottom)
    }

    /// Top support point in world space under the vessel's current transform.
    #[must_use]
    pub fn top_point(&self, transform: &Affine3A) -> Vec3 {
        transform.transform_point3(self.local_top)
    }

    /// Vertical extent from bottom to top support point.
    #[must_use]
    pub fn height(&self) -> f32 {
        self.bottom_length + self.top_length
    }
}

/// Computes [`VesselBounds`] from a vessel's collision meshes.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeometryProbe;

#[derive(Debug, Clone, Copy)]
struct Nearest {
    sqr_dist: f32,
    point: Vec3,
    part: Option<PartId>,
}

impl Nearest {
    fn seed(at: Vec3) -> Self {
        Self {
            sqr_dist: f32::INFINITY,
            point: at,
            part: None,
        }
    }

    #[inline]
    fn offer(&mut self, anchor: Vec3, candidate: Vec3, part: PartId) {
        let d = (anchor - candidate).length_squared();
        if d < self.sqr_dist {
            self.sqr_dist = d;
            self.point = candidate;
            self.part = Some(part);
        }
    }
}

impl GeometryProbe {
    /// Computes the bottom and top support points of `vessel`.
    ///
    /// Parts flagged as excluded are skipped. A mesh contributes when it has a
    /// collider, or when its part is a wheel whose collider is not instantiated
    /// yet. With no contributing mesh the result is [`VesselBounds::degenerate`].
    #[must_use]
    pub fn compute_bounds(vessel: &Vessel) -> VesselBounds {
        let com = vessel.center_of_mass;
        let up = vessel.up();
        let down_anchor = com - ANCHOR_DISTANCE * up;
        let up_anchor = com + ANCHOR_DISTANCE * up;

        let mut bottom = Nearest::seed(com);
        let mut top = Nearest::seed(com);

        for part in &vessel.parts {
            if part.is_excluded_from_bounds() {
                continue;
            }
            let wheel = part.is_wheel();
            for mesh in &part.meshes {
                if !mesh.has_collider && !wheel {
                    continue;
                }
                for vert in &mesh.vertices {
                    let world = mesh.transform.transform_point3(*vert);
                    bottom.offer(down_anchor, world, part.id);
                    top.offer(up_anchor, world, part.id);
                }
            }
        }

        if bottom.part.is_none() {
            warn!(vessel = %vessel.id, vessel_name = %vessel.name, "no collision-bearing geometry; bounds collapse to centre of mass");
            return VesselBounds::degenerate(vessel);
        }

        let to_local = vessel.transform.inverse();
        let bounds = VesselBounds {
            up,
            local_bottom: to_local.transform_point3(bottom.point),
            local_top: to_local.transform_point3(top.point),
            bottom_length: (com - bottom.point).dot(up),
            top_length: (top.point - com).dot(up),
            bottom_part: bottom.part,
            top_part: top.part,
        };
        log_bounds(vessel.id, &vessel.name, &bounds);
        bounds
    }

    /// Recomputes `bounds` in place.
    pub fn refresh(vessel: &Vessel, bounds: &mut VesselBounds) {
        *bounds = Self::compute_bounds(vessel);
    }
}

fn log_bounds(id: VesselId, name: &str, b: &VesselBounds) {
    debug!(
        vessel = %id,
        vessel_name = name,
        bottom_part = ?b.bottom_part,
        top_part = ?b.top_part,
        bottom_length = b.bottom_length,
        top_length = b.top_length,
        "bounds computed"
    );
}

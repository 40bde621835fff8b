//! Ground-distance probing.
//!
//! A single downward ray from a world point, restricted to a layer mask. The
//! distance reported is the drop along the up axis to the hit point, so a
//! slanted ray direction never inflates it.

use glam::Vec3;

use crate::host::{LayerMask, SimHost};
use crate::vessel::SurfaceId;

/// Outcome of one probe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeResult {
    /// Distance along up from the origin to the hit; 0 on a miss.
    pub hit_distance: f32,
    /// Surface that was hit, `None` on a miss.
    pub surface: Option<SurfaceId>,
}

impl ProbeResult {
    /// Nothing intersected.
    pub const MISS: Self = Self {
        hit_distance: 0.0,
        surface: None,
    };

    /// Returns true when the ray hit something.
    #[must_use]
    pub const fn is_hit(&self) -> bool {
        self.surface.is_some()
    }
}

/// Casts ground probes through the host's ray primitive.
#[derive(Debug, Clone, Copy)]
pub struct AltitudeSampler {
    up: Vec3,
    max_distance: f32,
}

impl AltitudeSampler {
    /// Sampler for a vessel whose up axis is `up`; rays are cut at `max_distance`.
    #[must_use]
    pub fn new(up: Vec3, max_distance: f32) -> Self {
        Self {
            up: up.normalize_or_zero(),
            max_distance,
        }
    }

    /// Up axis used for distance projection.
    #[must_use]
    pub const fn up(&self) -> Vec3 {
        self.up
    }

    /// Probes straight down from `origin`.
    pub fn probe<H: SimHost + ?Sized>(&self, host: &H, origin: Vec3, mask: LayerMask) -> ProbeResult {
        self.probe_along(host, origin, -self.up, mask)
    }

    /// Probes from `origin` along `direction`.
    pub fn probe_along<H: SimHost + ?Sized>(
        &self,
        host: &H,
        origin: Vec3,
        direction: Vec3,
        mask: LayerMask,
    ) -> ProbeResult {
        if self.up == Vec3::ZERO || !origin.is_finite() {
            return ProbeResult::MISS;
        }
        match host.raycast(origin, direction, self.max_distance, mask) {
            Some(hit) => ProbeResult {
                hit_distance: (hit.point - origin).dot(self.up).abs(),
                surface: Some(hit.surface),
            },
            None => ProbeResult::MISS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::memory::InMemoryHost;
    use crate::host::PARTS_LAYER;

    #[test]
    fn probe_reports_vertical_drop_and_surface() {
        let mut host = InMemoryHost::new();
        let ground = host.add_ground_plane(0.0);
        let sampler = AltitudeSampler::new(Vec3::Y, 100.0);

        let r = sampler.probe(&host, Vec3::new(2.0, 3.5, -1.0), LayerMask::GROUND_ONLY);
        assert!(r.is_hit());
        assert_eq!(r.surface, Some(ground));
        assert!((r.hit_distance - 3.5).abs() < 1e-5);
    }

    #[test]
    fn miss_is_zero_distance_without_surface() {
        let host = InMemoryHost::new();
        let sampler = AltitudeSampler::new(Vec3::Y, 100.0);
        let r = sampler.probe(&host, Vec3::ZERO, LayerMask::GROUND_ONLY);
        assert_eq!(r, ProbeResult::MISS);
    }

    #[test]
    fn out_of_range_ground_is_a_miss() {
        let mut host = InMemoryHost::new();
        host.add_ground_plane(-500.0);
        let sampler = AltitudeSampler::new(Vec3::Y, 100.0);
        assert!(!sampler.probe(&host, Vec3::ZERO, LayerMask::GROUND_ONLY).is_hit());
    }

    #[test]
    fn parts_mask_sees_own_parts() {
        let mut host = InMemoryHost::new();
        let ground = host.add_ground_plane(0.0);
        let strut = host.add_box(PARTS_LAYER, Vec3::new(-0.5, 1.0, -0.5), Vec3::new(0.5, 2.0, 0.5));
        let sampler = AltitudeSampler::new(Vec3::Y, 100.0);

        let ground_only = sampler.probe(&host, Vec3::new(0.0, 5.0, 0.0), LayerMask::GROUND_ONLY);
        let with_parts = sampler.probe(&host, Vec3::new(0.0, 5.0, 0.0), LayerMask::GROUND_AND_PARTS);
        assert_eq!(ground_only.surface, Some(ground));
        assert_eq!(with_parts.surface, Some(strut));
        assert!(with_parts.hit_distance < ground_only.hit_distance);
    }
}

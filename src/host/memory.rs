//! In-memory host implementation.
//!
//! `InMemoryHost` implements both host traits over plain collections. World
//! geometry is a list of planes and axis-aligned boxes on collision layers;
//! part modules are scripted bags of fields whose entry points can be wired
//! to field changes. Every mutation the stabilizer requests is recorded so
//! tests can assert on it.

use std::collections::{HashMap, HashSet};

use glam::Vec3;

use crate::error::{HostError, HostResult};
use crate::vessel::{ModuleHandle, PartId, SurfaceId, Vessel, VesselId};

use super::{EntryPoint, LayerMask, LoadedExtension, ModuleHost, RayHit, SimHost, SpringJointParams};

/// Surface geometry understood by the in-memory ray caster.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SurfaceShape {
    /// Infinite plane `normal · p = offset`.
    Plane { normal: Vec3, offset: f32 },
    /// Axis-aligned box.
    Box { min: Vec3, max: Vec3 },
}

/// A ray-castable surface.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Surface {
    pub id: SurfaceId,
    pub layer: u32,
    pub shape: SurfaceShape,
}

impl Surface {
    fn intersect(&self, origin: Vec3, dir: Vec3) -> Option<f32> {
        match self.shape {
            SurfaceShape::Plane { normal, offset } => {
                let denom = normal.dot(dir);
                if denom.abs() < 1e-9 {
                    return None;
                }
                let t = (offset - normal.dot(origin)) / denom;
                (t >= 0.0).then_some(t)
            }
            SurfaceShape::Box { min, max } => {
                let mut t_near = f32::NEG_INFINITY;
                let mut t_far = f32::INFINITY;
                for axis in 0..3 {
                    let (o, d, lo, hi) = (origin[axis], dir[axis], min[axis], max[axis]);
                    if d.abs() < 1e-9 {
                        if o < lo || o > hi {
                            return None;
                        }
                        continue;
                    }
                    let (mut t0, mut t1) = ((lo - o) / d, (hi - o) / d);
                    if t0 > t1 {
                        std::mem::swap(&mut t0, &mut t1);
                    }
                    t_near = t_near.max(t0);
                    t_far = t_far.min(t1);
                    if t_near > t_far {
                        return None;
                    }
                }
                if t_far < 0.0 {
                    return None;
                }
                Some(t_near.max(0.0))
            }
        }
    }
}

/// Field change applied when an entry point is invoked.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq)]
pub enum InvokeEffect {
    SetBool(String, bool),
    ToggleBool(String),
    SetStr(String, String),
    /// The call fails with [`HostError::InvocationRejected`] and changes nothing.
    Reject,
}

/// Recorded entry point call.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub module: ModuleHandle,
    pub method: String,
    pub arg: Option<i32>,
}

/// Scripted state of one part module.
#[derive(Debug, Clone)]
pub struct ModuleState {
    alive: bool,
    bools: HashMap<String, bool>,
    strings: HashMap<String, String>,
    links: HashMap<String, ModuleHandle>,
    spring: Option<SpringJointParams>,
    effects: HashMap<String, Vec<InvokeEffect>>,
}

impl Default for ModuleState {
    fn default() -> Self {
        Self {
            alive: true,
            bools: HashMap::new(),
            strings: HashMap::new(),
            links: HashMap::new(),
            spring: None,
            effects: HashMap::new(),
        }
    }
}

impl ModuleState {
    /// Live module with no fields.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style boolean field.
    #[must_use]
    pub fn with_bool(mut self, field: &str, value: bool) -> Self {
        self.bools.insert(field.to_string(), value);
        self
    }

    /// Builder-style string field.
    #[must_use]
    pub fn with_str(mut self, field: &str, value: &str) -> Self {
        self.strings.insert(field.to_string(), value.to_string());
        self
    }

    /// Builder-style module reference.
    #[must_use]
    pub fn with_link(mut self, field: &str, target: ModuleHandle) -> Self {
        self.links.insert(field.to_string(), target);
        self
    }

    /// Builder-style spring joint.
    #[must_use]
    pub fn with_spring(mut self, params: SpringJointParams) -> Self {
        self.spring = Some(params);
        self
    }

    /// Wires a method name to a field change.
    #[must_use]
    pub fn on_invoke(mut self, method: &str, effect: InvokeEffect) -> Self {
        self.effects.entry(method.to_string()).or_default().push(effect);
        self
    }

    fn apply(&mut self, effect: &InvokeEffect) {
        match effect {
            InvokeEffect::SetBool(field, value) => {
                self.bools.insert(field.clone(), *value);
            }
            InvokeEffect::ToggleBool(field) => {
                let v = self.bools.entry(field.clone()).or_insert(false);
                *v = !*v;
            }
            InvokeEffect::SetStr(field, value) => {
                self.strings.insert(field.clone(), value.clone());
            }
            InvokeEffect::Reject => {}
        }
    }
}

/// In-memory host: vessels, surfaces, modules and a record of requested mutations.
#[derive(Debug, Default)]
pub struct InMemoryHost {
    vessels: HashMap<VesselId, Vessel>,
    surfaces: Vec<Surface>,
    modules: HashMap<ModuleHandle, ModuleState>,
    extensions: Vec<LoadedExtension>,
    grounded: HashSet<(VesselId, PartId)>,
    next_surface: u64,

    translations: Vec<(VesselId, Vec3)>,
    zeroed: HashMap<VesselId, u32>,
    suppressed: HashMap<VesselId, u32>,
    collision_ignores: Vec<(VesselId, SurfaceId, bool)>,
    invocations: Vec<Invocation>,
    messages: Vec<String>,
    markers: usize,
}

impl InMemoryHost {
    /// Empty world.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a vessel.
    pub fn insert_vessel(&mut self, vessel: Vessel) {
        self.vessels.insert(vessel.id, vessel);
    }

    /// Removes a vessel (destruction or unload).
    pub fn remove_vessel(&mut self, id: VesselId) -> Option<Vessel> {
        self.vessels.remove(&id)
    }

    /// Mutable access for tests that simulate host-side changes.
    pub fn vessel_mut(&mut self, id: VesselId) -> Option<&mut Vessel> {
        self.vessels.get_mut(&id)
    }

    /// Adds a horizontal ground plane at height `y` on the static world layer.
    pub fn add_ground_plane(&mut self, y: f32) -> SurfaceId {
        self.add_surface(
            super::STATIC_WORLD_LAYER,
            SurfaceShape::Plane {
                normal: Vec3::Y,
                offset: y,
            },
        )
    }

    /// Adds an axis-aligned box on the given layer.
    pub fn add_box(&mut self, layer: u32, min: Vec3, max: Vec3) -> SurfaceId {
        self.add_surface(layer, SurfaceShape::Box { min, max })
    }

    /// Adds an arbitrary surface.
    pub fn add_surface(&mut self, layer: u32, shape: SurfaceShape) -> SurfaceId {
        let id = SurfaceId::new(self.next_surface);
        self.next_surface += 1;
        self.surfaces.push(Surface { id, layer, shape });
        id
    }

    /// Registers a loaded extension.
    pub fn add_extension(&mut self, extension: LoadedExtension) {
        self.extensions.push(extension);
    }

    /// Adds or replaces a module.
    pub fn insert_module(&mut self, handle: ModuleHandle, state: ModuleState) {
        self.modules.insert(handle, state);
    }

    /// Marks a module destroyed; its handle stays dangling.
    pub fn destroy_module(&mut self, handle: ModuleHandle) {
        if let Some(m) = self.modules.get_mut(&handle) {
            m.alive = false;
        }
    }

    /// Sets a part's grounded flag.
    pub fn set_grounded(&mut self, vessel: VesselId, part: PartId, grounded: bool) {
        if grounded {
            self.grounded.insert((vessel, part));
        } else {
            self.grounded.remove(&(vessel, part));
        }
    }

    /// Current value of a module's boolean field (ignores liveness).
    #[must_use]
    pub fn module_bool(&self, handle: ModuleHandle, field: &str) -> Option<bool> {
        self.modules.get(&handle).and_then(|m| m.bools.get(field).copied())
    }

    /// Current spring joint of a module (ignores liveness).
    #[must_use]
    pub fn module_spring(&self, handle: ModuleHandle) -> Option<SpringJointParams> {
        self.modules.get(&handle).and_then(|m| m.spring)
    }

    /// Every translation requested so far.
    #[must_use]
    pub fn translations(&self) -> &[(VesselId, Vec3)] {
        &self.translations
    }

    /// Sum of translations requested for one vessel.
    #[must_use]
    pub fn total_translation(&self, id: VesselId) -> Vec3 {
        self.translations
            .iter()
            .filter(|(v, _)| *v == id)
            .fold(Vec3::ZERO, |acc, (_, d)| acc + *d)
    }

    /// How many times the vessel's velocity was zeroed.
    #[must_use]
    pub fn zero_velocity_count(&self, id: VesselId) -> u32 {
        self.zeroed.get(&id).copied().unwrap_or(0)
    }

    /// How many times external forces were suppressed for the vessel.
    #[must_use]
    pub fn suppressed_count(&self, id: VesselId) -> u32 {
        self.suppressed.get(&id).copied().unwrap_or(0)
    }

    /// Collision ignore requests in order.
    #[must_use]
    pub fn collision_ignores(&self) -> &[(VesselId, SurfaceId, bool)] {
        &self.collision_ignores
    }

    /// Entry point calls in order.
    #[must_use]
    pub fn invocations(&self) -> &[Invocation] {
        &self.invocations
    }

    /// Calls of `method` on `module`.
    #[must_use]
    pub fn invocation_count(&self, module: ModuleHandle, method: &str) -> usize {
        self.invocations
            .iter()
            .filter(|i| i.module == module && i.method == method)
            .count()
    }

    /// Messages posted to the user.
    #[must_use]
    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    /// Number of diagnostic markers drawn.
    #[must_use]
    pub fn marker_count(&self) -> usize {
        self.markers
    }

    fn live_module(&self, handle: ModuleHandle) -> HostResult<&ModuleState> {
        let m = self
            .modules
            .get(&handle)
            .ok_or(HostError::ModuleNotFound { handle })?;
        if !m.alive {
            return Err(HostError::ModuleDestroyed { handle });
        }
        Ok(m)
    }

    fn live_module_mut(&mut self, handle: ModuleHandle) -> HostResult<&mut ModuleState> {
        let m = self
            .modules
            .get_mut(&handle)
            .ok_or(HostError::ModuleNotFound { handle })?;
        if !m.alive {
            return Err(HostError::ModuleDestroyed { handle });
        }
        Ok(m)
    }
}

impl SimHost for InMemoryHost {
    fn vessel(&self, id: VesselId) -> Option<&Vessel> {
        self.vessels.get(&id)
    }

    fn loaded_vessels(&self) -> Vec<VesselId> {
        let mut ids: Vec<VesselId> = self.vessels.keys().copied().collect();
        ids.sort();
        ids
    }

    fn translate(&mut self, id: VesselId, offset: Vec3) -> HostResult<()> {
        let vessel = self.vessels.get_mut(&id).ok_or(HostError::VesselNotFound { id })?;
        vessel.translate(offset);
        self.translations.push((id, offset));
        Ok(())
    }

    fn zero_velocity(&mut self, id: VesselId) -> HostResult<()> {
        let vessel = self.vessels.get_mut(&id).ok_or(HostError::VesselNotFound { id })?;
        vessel.surface_speed = 0.0;
        *self.zeroed.entry(id).or_insert(0) += 1;
        Ok(())
    }

    fn suppress_external_forces(&mut self, id: VesselId) -> HostResult<()> {
        if !self.vessels.contains_key(&id) {
            return Err(HostError::VesselNotFound { id });
        }
        *self.suppressed.entry(id).or_insert(0) += 1;
        Ok(())
    }

    fn set_collision_ignored(&mut self, id: VesselId, surface: SurfaceId, ignored: bool) -> HostResult<()> {
        if !self.vessels.contains_key(&id) {
            return Err(HostError::VesselNotFound { id });
        }
        self.collision_ignores.push((id, surface, ignored));
        Ok(())
    }

    fn raycast(&self, origin: Vec3, direction: Vec3, max_distance: f32, mask: LayerMask) -> Option<RayHit> {
        let dir = direction.normalize_or_zero();
        if dir == Vec3::ZERO {
            return None;
        }
        self.surfaces
            .iter()
            .filter(|s| mask.contains_layer(s.layer))
            .filter_map(|s| s.intersect(origin, dir).map(|t| (t, s.id)))
            .filter(|(t, _)| *t <= max_distance)
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(t, surface)| RayHit {
                point: origin + dir * t,
                surface,
            })
    }

    fn part_grounded(&self, vessel: VesselId, part: PartId) -> bool {
        self.grounded.contains(&(vessel, part))
    }

    fn post_message(&mut self, text: &str) {
        self.messages.push(text.to_string());
    }

    fn draw_marker(&mut self, _vessel: VesselId, _from: Vec3, _to: Vec3) {
        self.markers += 1;
    }
}

impl ModuleHost for InMemoryHost {
    fn loaded_extensions(&self) -> Vec<LoadedExtension> {
        self.extensions.clone()
    }

    fn module_alive(&self, module: ModuleHandle) -> bool {
        self.modules.get(&module).is_some_and(|m| m.alive)
    }

    fn read_bool(&self, module: ModuleHandle, field: &str) -> HostResult<bool> {
        self.live_module(module)?
            .bools
            .get(field)
            .copied()
            .ok_or_else(|| HostError::FieldMissing {
                handle: module,
                field: field.to_string(),
            })
    }

    fn read_str(&self, module: ModuleHandle, field: &str) -> HostResult<String> {
        self.live_module(module)?
            .strings
            .get(field)
            .cloned()
            .ok_or_else(|| HostError::FieldMissing {
                handle: module,
                field: field.to_string(),
            })
    }

    fn write_bool(&mut self, module: ModuleHandle, field: &str, value: bool) -> HostResult<()> {
        self.live_module_mut(module)?.bools.insert(field.to_string(), value);
        Ok(())
    }

    fn invoke(&mut self, module: ModuleHandle, entry_point: &EntryPoint, arg: Option<i32>) -> HostResult<()> {
        let state = self.live_module_mut(module)?;
        let method = entry_point.method().to_string();
        if state.effects.get(&method).is_some_and(|e| e.contains(&InvokeEffect::Reject)) {
            return Err(HostError::InvocationRejected { handle: module, method });
        }
        if let Some(effects) = state.effects.get(&method).cloned() {
            for effect in &effects {
                state.apply(effect);
            }
        }
        self.invocations.push(Invocation { module, method, arg });
        Ok(())
    }

    fn linked_module(&self, module: ModuleHandle, field: &str) -> Option<ModuleHandle> {
        self.live_module(module).ok()?.links.get(field).copied()
    }

    fn spring_joint(&self, module: ModuleHandle) -> Option<SpringJointParams> {
        self.live_module(module).ok()?.spring
    }

    fn set_spring_joint(&mut self, module: ModuleHandle, params: SpringJointParams) -> HostResult<()> {
        self.live_module_mut(module)?.spring = Some(params);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{PARTS_LAYER, STATIC_WORLD_LAYER};

    #[test]
    fn raycast_hits_nearest_plane_on_mask() {
        let mut host = InMemoryHost::new();
        let low = host.add_ground_plane(-5.0);
        let high = host.add_ground_plane(-1.0);

        let hit = host
            .raycast(Vec3::new(0.0, 10.0, 0.0), -Vec3::Y, 100.0, LayerMask::GROUND_ONLY)
            .unwrap();
        assert_eq!(hit.surface, high);
        assert!((hit.point.y + 1.0).abs() < 1e-5);

        // Starting between the planes only sees the lower one.
        let hit = host
            .raycast(Vec3::new(0.0, -2.0, 0.0), -Vec3::Y, 100.0, LayerMask::GROUND_ONLY)
            .unwrap();
        assert_eq!(hit.surface, low);
    }

    #[test]
    fn raycast_respects_max_distance_and_layers() {
        let mut host = InMemoryHost::new();
        host.add_ground_plane(-50.0);
        host.add_box(PARTS_LAYER, Vec3::new(-1.0, -2.0, -1.0), Vec3::new(1.0, -1.0, 1.0));

        assert!(host
            .raycast(Vec3::ZERO, -Vec3::Y, 10.0, LayerMask::GROUND_ONLY)
            .is_none());
        let hit = host
            .raycast(Vec3::ZERO, -Vec3::Y, 10.0, LayerMask::GROUND_AND_PARTS)
            .unwrap();
        assert!((hit.point.y + 1.0).abs() < 1e-5);
    }

    #[test]
    fn box_misses_when_ray_passes_beside_it() {
        let mut host = InMemoryHost::new();
        host.add_box(STATIC_WORLD_LAYER, Vec3::new(-1.0, -2.0, -1.0), Vec3::new(1.0, -1.0, 1.0));
        assert!(host
            .raycast(Vec3::new(5.0, 0.0, 0.0), -Vec3::Y, 10.0, LayerMask::GROUND_ONLY)
            .is_none());
    }

    #[test]
    fn invoke_applies_effects_and_records_calls() {
        let mut host = InMemoryHost::new();
        let handle = ModuleHandle::new(1);
        host.insert_module(
            handle,
            ModuleState::new()
                .with_bool("staticAttached", true)
                .on_invoke("GroundDetach", InvokeEffect::SetBool("staticAttached".into(), false)),
        );

        let ep = EntryPoint::new("KIS.ModuleKISItem", "GroundDetach");
        host.invoke(handle, &ep, None).unwrap();
        assert!(!host.read_bool(handle, "staticAttached").unwrap());
        assert_eq!(host.invocation_count(handle, "GroundDetach"), 1);
    }

    #[test]
    fn destroyed_module_rejects_calls() {
        let mut host = InMemoryHost::new();
        let handle = ModuleHandle::new(2);
        host.insert_module(handle, ModuleState::new().with_bool("isAttached", true));
        host.destroy_module(handle);

        assert!(!host.module_alive(handle));
        assert!(matches!(
            host.read_bool(handle, "isAttached"),
            Err(HostError::ModuleDestroyed { .. })
        ));
        assert!(matches!(
            host.read_bool(ModuleHandle::new(99), "isAttached"),
            Err(HostError::ModuleNotFound { .. })
        ));
    }
}

//! Per-vessel bookkeeping of detached anchoring devices.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::AnchorError;
use crate::host::{Host, LoadedExtension, ModuleHost};
use crate::vessel::{ModuleHandle, PartId, VesselId};

use super::device::{adapter_for, AnchoringDevice};
use super::integration::{Integration, IntegrationKind};

/// Registry-assigned id of a detached device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(u64);

impl DeviceId {
    /// Wraps a raw id.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw id.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "device#{}", self.0)
    }
}

/// Handle to a device the registry detached and still owes an attach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceHandle {
    /// Registry-assigned id.
    pub id: DeviceId,
    /// Vessel the device belongs to.
    pub vessel: VesselId,
    /// Part carrying the device.
    pub part: PartId,
    /// Integration the device belongs to.
    pub kind: IntegrationKind,
}

/// Result of one attach attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachOutcome {
    /// The device is engaged again.
    Attached,
    /// The backing module no longer exists; skipped.
    Stale,
    /// The host rejected the attach; the device stays detached.
    Failed,
    /// The handle was not pending (already attached, forgotten or never issued).
    Unknown,
}

#[derive(Debug)]
struct DetachedDevice {
    handle: DeviceHandle,
    device: Box<dyn AnchoringDevice>,
}

/// Discovers integrations once and tracks, per vessel, the devices detached
/// during the current stabilization window.
///
/// Every detached device is attached at most once: [`attach`](Self::attach)
/// takes the device out of the registry before calling into the host.
#[derive(Debug, Default)]
pub struct GroundAttachmentRegistry {
    integrations: Vec<Integration>,
    detached: HashMap<VesselId, Vec<DeviceHandle>>,
    devices: HashMap<DeviceId, DetachedDevice>,
    next_id: u64,
}

impl GroundAttachmentRegistry {
    /// Creates a registry over already-bound integrations.
    #[must_use]
    pub fn new(integrations: Vec<Integration>) -> Self {
        Self {
            integrations,
            ..Self::default()
        }
    }

    /// Binds every integration the catalog supports.
    #[must_use]
    pub fn discover(catalog: &[LoadedExtension]) -> Self {
        let registry = Self::new(Integration::discover(catalog));
        info!(
            available = registry.integrations.len(),
            "ground attachment registry ready"
        );
        registry
    }

    /// Binds against the host's loaded-extension catalog.
    #[must_use]
    pub fn discover_from(host: &dyn ModuleHost) -> Self {
        Self::discover(&host.loaded_extensions())
    }

    /// Integration kinds that bound successfully.
    #[must_use]
    pub fn available_kinds(&self) -> BTreeSet<IntegrationKind> {
        self.integrations.iter().map(Integration::kind).collect()
    }

    /// Returns true if `kind` bound at discovery.
    #[must_use]
    pub fn is_available(&self, kind: IntegrationKind) -> bool {
        self.integrations.iter().any(|i| i.kind() == kind)
    }

    /// Detaches every engaged device of every available kind on the vessel.
    ///
    /// Devices whose detach fails are left alone and not returned. An unknown
    /// vessel or a registry with no integrations yields an empty list.
    pub fn detach_all<H: Host>(&mut self, host: &mut H, vessel_id: VesselId) -> Vec<DeviceHandle> {
        if self.integrations.is_empty() {
            return Vec::new();
        }
        let candidates = self.candidates(&*host, vessel_id);

        let mut handles = Vec::new();
        for (integration, part, module) in candidates {
            let mut device = adapter_for(&self.integrations[integration], part, module);
            if !device.is_engaged(&*host) {
                continue;
            }
            if let Err(e) = device.detach(host) {
                warn!(vessel = %vessel_id, %part, error = %e, "device detach failed; leaving it attached");
                continue;
            }
            let handle = DeviceHandle {
                id: self.allocate_id(),
                vessel: vessel_id,
                part,
                kind: device.kind(),
            };
            debug!(vessel = %vessel_id, %part, kind = %handle.kind, device = %handle.id, "device detached");
            self.devices.insert(handle.id, DetachedDevice { handle, device });
            self.detached.entry(vessel_id).or_default().push(handle);
            handles.push(handle);
        }
        if !handles.is_empty() {
            info!(vessel = %vessel_id, count = handles.len(), "detached ground-anchoring devices");
        }
        handles
    }

    fn candidates<H: Host>(&self, host: &H, vessel_id: VesselId) -> Vec<(usize, PartId, ModuleHandle)> {
        let Some(vessel) = host.vessel(vessel_id) else {
            debug!(vessel = %vessel_id, "detach requested for unknown vessel");
            return Vec::new();
        };
        let mut out = Vec::new();
        for part in &vessel.parts {
            for (idx, integration) in self.integrations.iter().enumerate() {
                let module_name = integration.kind().module_name();
                for module in part.modules.iter().filter(|m| m.name == module_name) {
                    out.push((idx, part.id, module.handle));
                }
            }
        }
        out
    }

    fn allocate_id(&mut self) -> DeviceId {
        let id = DeviceId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Attaches one pending device.
    ///
    /// The device leaves the registry whatever the outcome, so a second call
    /// with the same handle reports [`AttachOutcome::Unknown`].
    pub fn attach(&mut self, host: &mut dyn ModuleHost, id: DeviceId) -> AttachOutcome {
        let Some(mut entry) = self.devices.remove(&id) else {
            return AttachOutcome::Unknown;
        };
        let handle = entry.handle;
        self.unlist(handle.vessel, |h| h.id == id);

        match entry.device.attach(host) {
            Ok(()) => {
                debug!(vessel = %handle.vessel, part = %handle.part, kind = %handle.kind, "device reattached");
                AttachOutcome::Attached
            }
            Err(e @ AnchorError::StaleDevice { .. }) => {
                warn!(vessel = %handle.vessel, error = %e, "skipping reattach of stale device");
                AttachOutcome::Stale
            }
            Err(e) => {
                warn!(vessel = %handle.vessel, error = %e, "device reattach failed; device stays detached");
                AttachOutcome::Failed
            }
        }
    }

    /// Attaches each handle in turn. A failing device never stops the rest.
    pub fn attach_all(&mut self, host: &mut dyn ModuleHost, handles: &[DeviceHandle]) -> Vec<(DeviceHandle, AttachOutcome)> {
        handles
            .iter()
            .map(|h| (*h, self.attach(host, h.id)))
            .collect()
    }

    /// Devices detached from `vessel` and not yet attached.
    #[must_use]
    pub fn pending(&self, vessel: VesselId) -> &[DeviceHandle] {
        self.detached.get(&vessel).map_or(&[][..], Vec::as_slice)
    }

    /// Returns true while the device awaits its attach.
    #[must_use]
    pub fn is_pending(&self, id: DeviceId) -> bool {
        self.devices.contains_key(&id)
    }

    /// Total number of devices awaiting an attach.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.devices.len()
    }

    /// Drops one pending device without attaching, typically after its
    /// reconnect agent timed out. Returns the handle if it was pending.
    pub fn forget(&mut self, id: DeviceId) -> Option<DeviceHandle> {
        let entry = self.devices.remove(&id)?;
        self.unlist(entry.handle.vessel, |h| h.id == id);
        Some(entry.handle)
    }

    /// Drops every pending device of the vessel without attaching. Idempotent.
    pub fn forget_vessel(&mut self, vessel: VesselId) -> usize {
        let Some(handles) = self.detached.remove(&vessel) else {
            return 0;
        };
        for h in &handles {
            self.devices.remove(&h.id);
        }
        handles.len()
    }

    /// Drops pending devices carried by one part. Idempotent.
    pub fn forget_part(&mut self, vessel: VesselId, part: PartId) -> usize {
        let removed = self.unlist(vessel, |h| h.part == part);
        for h in &removed {
            self.devices.remove(&h.id);
        }
        removed.len()
    }

    fn unlist(&mut self, vessel: VesselId, pred: impl Fn(&DeviceHandle) -> bool) -> Vec<DeviceHandle> {
        let Some(list) = self.detached.get_mut(&vessel) else {
            return Vec::new();
        };
        let (removed, kept): (Vec<_>, Vec<_>) = list.drain(..).partition(|h| pred(h));
        if kept.is_empty() {
            self.detached.remove(&vessel);
        } else {
            *list = kept;
        }
        removed
    }
}

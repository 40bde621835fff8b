//! Anchoring device adapters.
//!
//! Every integration kind gets one adapter implementing [`AnchoringDevice`].
//! Adapters hold a non-owning module handle plus whatever state they need to
//! undo their own detach.

use std::fmt;

use tracing::{debug, warn};

use crate::error::{AnchorError, HostError};
use crate::host::{ModuleHost, SpringJointParams};
use crate::vessel::{ModuleHandle, PartId};

use super::integration::{GroundAnchorBinding, Integration, IntegrationKind, KasBinding, KisBinding};

const ANCHOR_ATTACHED_FIELD: &str = "isAttached";
const PYLON_ATTACHED_FIELD: &str = "staticAttached";
const HARPOON_STATIC_JOINT_FIELD: &str = "attachMode.StaticJoint";
const WINCH_LINK_FIELD: &str = "KASModulePort.winchConnected";
const WINCH_HEAD_STATE_FIELD: &str = "headStateField";
const WINCH_DOCKED_STATE: &str = "Plugged(Docked)";
const WINCH_RELEASE_FIELD: &str = "release.active";

/// Attach type argument of the harpoon `Detach` call that releases a ground attachment.
const DETACH_FROM_GROUND: i32 = 4;

/// Slack added to the saved cable length so the restored joint starts relaxed.
const SPRING_RESTORE_SLACK: f32 = 0.03;
/// Joint parameters applied while the vessel is being repositioned.
const SPRING_WEAK_TOLERANCE: f32 = 3.0;
const SPRING_WEAK_EXTRA_LENGTH: f32 = 3.0;

/// Uniform capability contract over foreign ground-anchoring devices.
pub trait AnchoringDevice: fmt::Debug {
    /// Integration this device belongs to.
    fn kind(&self) -> IntegrationKind;

    /// Part carrying the device.
    fn part(&self) -> PartId;

    /// Module handle backing the device.
    fn module(&self) -> ModuleHandle;

    /// Whether the device currently binds the vessel to the world.
    fn is_engaged(&self, host: &dyn ModuleHost) -> bool;

    /// Releases the device.
    fn detach(&mut self, host: &mut dyn ModuleHost) -> Result<(), AnchorError>;

    /// Restores the device.
    fn attach(&mut self, host: &mut dyn ModuleHost) -> Result<(), AnchorError>;
}

/// Builds the adapter for `integration` on a module.
#[must_use]
pub fn adapter_for(integration: &Integration, part: PartId, module: ModuleHandle) -> Box<dyn AnchoringDevice> {
    match integration {
        Integration::GroundAnchor(binding) => Box::new(GroundAnchorDevice {
            part,
            module,
            binding: binding.clone(),
        }),
        Integration::KisPylon(binding) => Box::new(PylonDevice {
            part,
            module,
            binding: binding.clone(),
        }),
        Integration::KasHarpoon(binding) => Box::new(HarpoonDevice {
            part,
            module,
            binding: binding.clone(),
            winch: None,
        }),
    }
}

fn ensure_alive(host: &dyn ModuleHost, kind: IntegrationKind, part: PartId, handle: ModuleHandle) -> Result<(), AnchorError> {
    if host.module_alive(handle) {
        Ok(())
    } else {
        Err(AnchorError::StaleDevice { kind, part, handle })
    }
}

fn read_flag(host: &dyn ModuleHost, module: ModuleHandle, field: &str) -> bool {
    match host.read_bool(module, field) {
        Ok(v) => v,
        Err(e) => {
            debug!(%module, field, error = %e, "flag unreadable; treating as not engaged");
            false
        }
    }
}

fn action_failed(kind: IntegrationKind, part: PartId, action: &'static str) -> impl FnOnce(HostError) -> AnchorError {
    move |source| AnchorError::ActionFailed {
        kind,
        part,
        action,
        source,
    }
}

/// Hangar ground anchor.
#[derive(Debug, Clone)]
pub struct GroundAnchorDevice {
    part: PartId,
    module: ModuleHandle,
    binding: GroundAnchorBinding,
}

impl AnchoringDevice for GroundAnchorDevice {
    fn kind(&self) -> IntegrationKind {
        IntegrationKind::GroundAnchor
    }

    fn part(&self) -> PartId {
        self.part
    }

    fn module(&self) -> ModuleHandle {
        self.module
    }

    fn is_engaged(&self, host: &dyn ModuleHost) -> bool {
        read_flag(host, self.module, ANCHOR_ATTACHED_FIELD)
    }

    fn detach(&mut self, host: &mut dyn ModuleHost) -> Result<(), AnchorError> {
        ensure_alive(host, self.kind(), self.part, self.module)?;
        host.invoke(self.module, &self.binding.detach, None)
            .map_err(action_failed(self.kind(), self.part, "detach"))
    }

    fn attach(&mut self, host: &mut dyn ModuleHost) -> Result<(), AnchorError> {
        ensure_alive(host, self.kind(), self.part, self.module)?;
        host.invoke(self.module, &self.binding.attach, None)
            .map_err(action_failed(self.kind(), self.part, "attach"))
    }
}

/// Inventory item static-attached to the ground.
#[derive(Debug, Clone)]
pub struct PylonDevice {
    part: PartId,
    module: ModuleHandle,
    binding: KisBinding,
}

impl AnchoringDevice for PylonDevice {
    fn kind(&self) -> IntegrationKind {
        IntegrationKind::KisPylon
    }

    fn part(&self) -> PartId {
        self.part
    }

    fn module(&self) -> ModuleHandle {
        self.module
    }

    fn is_engaged(&self, host: &dyn ModuleHost) -> bool {
        read_flag(host, self.module, PYLON_ATTACHED_FIELD)
    }

    fn detach(&mut self, host: &mut dyn ModuleHost) -> Result<(), AnchorError> {
        ensure_alive(host, self.kind(), self.part, self.module)?;
        host.invoke(self.module, &self.binding.ground_detach, None)
            .map_err(action_failed(self.kind(), self.part, "ground detach"))
    }

    fn attach(&mut self, host: &mut dyn ModuleHost) -> Result<(), AnchorError> {
        ensure_alive(host, self.kind(), self.part, self.module)?;
        host.invoke(self.module, &self.binding.ground_attach, None)
            .map_err(action_failed(self.kind(), self.part, "ground attach"))
    }
}

/// Harpoon stuck in the ground, usually tethered to a winch.
///
/// Detaching the harpoon alone leaves the winch cable tensioned; the cable
/// spring is saved, slackened for the move and restored verbatim on attach.
/// Winch steps are best effort once the harpoon is off the ground: each one
/// that succeeded is recorded and undone on attach, failed ones are logged.
#[derive(Debug, Clone)]
pub struct HarpoonDevice {
    part: PartId,
    module: ModuleHandle,
    binding: KasBinding,
    winch: Option<WinchRelease>,
}

/// Winch steps performed by a harpoon detach.
#[derive(Debug, Clone, Copy, PartialEq)]
struct WinchRelease {
    winch: ModuleHandle,
    spring_backup: Option<SpringJointParams>,
    plug_undocked: bool,
    reel_released: bool,
}

impl HarpoonDevice {
    fn release_winch(&self, host: &mut dyn ModuleHost, winch: ModuleHandle) -> WinchRelease {
        let mut release = WinchRelease {
            winch,
            spring_backup: None,
            plug_undocked: false,
            reel_released: false,
        };

        if let Some(joint) = host.spring_joint(winch) {
            let weak = SpringJointParams {
                spring: 0.0,
                tolerance: SPRING_WEAK_TOLERANCE,
                max_distance: joint.max_distance + SPRING_WEAK_EXTRA_LENGTH,
            };
            match host.set_spring_joint(winch, weak) {
                Ok(()) => {
                    release.spring_backup = Some(SpringJointParams {
                        spring: joint.spring,
                        tolerance: joint.tolerance,
                        max_distance: joint.max_distance + SPRING_RESTORE_SLACK,
                    });
                }
                Err(e) => warn!(part = %self.part, %winch, error = %e, "cannot weaken winch spring"),
            }
        } else {
            warn!(part = %self.part, %winch, "no spring joint under winch; cable left as is");
        }

        match host.invoke(winch, &self.binding.toggle_plug_mode, None) {
            Ok(()) => release.plug_undocked = true,
            Err(e) => warn!(part = %self.part, %winch, error = %e, "cannot undock winch plug"),
        }
        match host.write_bool(winch, WINCH_RELEASE_FIELD, true) {
            Ok(()) => release.reel_released = true,
            Err(e) => warn!(part = %self.part, %winch, error = %e, "cannot release winch reel"),
        }
        release
    }

    fn relock_winch(&self, host: &mut dyn ModuleHost, release: WinchRelease) {
        let winch = release.winch;
        if !host.module_alive(winch) {
            warn!(part = %self.part, %winch, "winch destroyed before reattach; skipping cable restore");
            return;
        }
        if let Some(saved) = release.spring_backup {
            if host.spring_joint(winch).is_none() {
                warn!(part = %self.part, %winch, "no spring joint under winch on reattach");
            } else if let Err(e) = host.set_spring_joint(winch, saved) {
                warn!(part = %self.part, %winch, error = %e, "cannot restore winch spring");
            }
        }
        if release.reel_released {
            if let Err(e) = host.write_bool(winch, WINCH_RELEASE_FIELD, false) {
                warn!(part = %self.part, %winch, error = %e, "cannot lock winch reel");
            }
        }
        if release.plug_undocked {
            if let Err(e) = host.invoke(winch, &self.binding.toggle_plug_mode, None) {
                warn!(part = %self.part, %winch, error = %e, "cannot dock winch plug");
            }
        }
    }
}

impl AnchoringDevice for HarpoonDevice {
    fn kind(&self) -> IntegrationKind {
        IntegrationKind::KasHarpoon
    }

    fn part(&self) -> PartId {
        self.part
    }

    fn module(&self) -> ModuleHandle {
        self.module
    }

    fn is_engaged(&self, host: &dyn ModuleHost) -> bool {
        read_flag(host, self.module, HARPOON_STATIC_JOINT_FIELD)
    }

    fn detach(&mut self, host: &mut dyn ModuleHost) -> Result<(), AnchorError> {
        ensure_alive(host, self.kind(), self.part, self.module)?;
        host.invoke(self.module, &self.binding.detach, Some(DETACH_FROM_GROUND))
            .map_err(action_failed(self.kind(), self.part, "detach"))?;

        let Some(winch) = host.linked_module(self.module, WINCH_LINK_FIELD) else {
            debug!(part = %self.part, "harpoon has no connected winch");
            return Ok(());
        };
        let docked = host
            .read_str(winch, WINCH_HEAD_STATE_FIELD)
            .is_ok_and(|state| state == WINCH_DOCKED_STATE);
        if !docked {
            debug!(part = %self.part, %winch, "winch plug not docked; leaving cable alone");
            return Ok(());
        }
        self.winch = Some(self.release_winch(host, winch));
        Ok(())
    }

    fn attach(&mut self, host: &mut dyn ModuleHost) -> Result<(), AnchorError> {
        // Cable first: a stale harpoon or a rejected grapple must not leave the spring slack.
        if let Some(release) = self.winch.take() {
            self.relock_winch(host, release);
        }
        ensure_alive(host, self.kind(), self.part, self.module)?;
        host.invoke(self.module, &self.binding.attach_static, None)
            .map_err(action_failed(self.kind(), self.part, "attach static grapple"))
    }
}

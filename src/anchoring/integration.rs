//! Optional ground-anchoring integrations and their discovery.
//!
//! The set of integrations is closed and known at build time. Each one binds
//! at startup by resolving the entry points it needs from the host's
//! loaded-extension catalog; a missing extension or a missing entry point
//! leaves the integration unbound, and every operation for that kind becomes
//! a no-op.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::host::{EntryPoint, LoadedExtension};

/// Module driving hangar ground anchors.
pub const GROUND_ANCHOR_MODULE: &str = "GroundAnchor";
/// Inventory item module that can be static-attached to the ground.
pub const KIS_ITEM_MODULE: &str = "ModuleKISItem";
/// Harpoon module of the tether integration.
pub const KAS_HARPOON_MODULE: &str = "KASModuleHarpoon";

const HANGAR_EXTENSION: &str = "Hangar";
const KIS_EXTENSION: &str = "KIS";
const KIS_ITEM_TYPE: &str = "KIS.ModuleKISItem";
const KAS_EXTENSION: &str = "KAS";
const KAS_HARPOON_TYPE: &str = "KAS.KASModuleHarpoon";
const KAS_WINCH_TYPE: &str = "KAS.KASModuleWinch";

/// Kinds of ground-anchoring devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationKind {
    /// Hangar ground anchors.
    GroundAnchor,
    /// Static-attached inventory pylons.
    KisPylon,
    /// Harpoons held by a winch tether.
    KasHarpoon,
}

impl IntegrationKind {
    /// All kinds, in discovery order.
    pub const ALL: [Self; 3] = [Self::GroundAnchor, Self::KisPylon, Self::KasHarpoon];

    /// Name of the part module implementing this kind.
    #[must_use]
    pub const fn module_name(self) -> &'static str {
        match self {
            Self::GroundAnchor => GROUND_ANCHOR_MODULE,
            Self::KisPylon => KIS_ITEM_MODULE,
            Self::KasHarpoon => KAS_HARPOON_MODULE,
        }
    }
}

impl fmt::Display for IntegrationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::GroundAnchor => "ground-anchor",
            Self::KisPylon => "kis-pylon",
            Self::KasHarpoon => "kas-harpoon",
        };
        f.write_str(s)
    }
}

/// Resolved entry points of the hangar anchor actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroundAnchorBinding {
    /// Releases the anchor from the ground.
    pub detach: EntryPoint,
    /// Plants the anchor again.
    pub attach: EntryPoint,
}

/// Resolved entry points of the inventory pylon API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KisBinding {
    /// Frees a static-attached item from the ground.
    pub ground_detach: EntryPoint,
    /// Static-attaches the item to the ground under it.
    pub ground_attach: EntryPoint,
}

/// Resolved entry points of the harpoon/winch API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KasBinding {
    /// Pulls the harpoon out; takes the attach type as argument.
    pub detach: EntryPoint,
    /// Grapples the harpoon to the static world.
    pub attach_static: EntryPoint,
    /// Docks or undocks the winch cable head.
    pub toggle_plug_mode: EntryPoint,
}

/// A bound integration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Integration {
    /// Hangar ground anchors.
    GroundAnchor(GroundAnchorBinding),
    /// Inventory items static-attached to the ground.
    KisPylon(KisBinding),
    /// Harpoons, optionally tethered to a winch.
    KasHarpoon(KasBinding),
}

impl Integration {
    /// Kind of this integration.
    #[must_use]
    pub const fn kind(&self) -> IntegrationKind {
        match self {
            Self::GroundAnchor(_) => IntegrationKind::GroundAnchor,
            Self::KisPylon(_) => IntegrationKind::KisPylon,
            Self::KasHarpoon(_) => IntegrationKind::KasHarpoon,
        }
    }

    /// Tries to bind `kind` against the catalog.
    ///
    /// Returns `None` unless the owning extension is loaded and every entry
    /// point the integration needs resolves.
    #[must_use]
    pub fn try_bind(kind: IntegrationKind, catalog: &[LoadedExtension]) -> Option<Self> {
        let find = |name: &str| catalog.iter().find(|ext| ext.name == name);
        match kind {
            IntegrationKind::GroundAnchor => {
                let ext = find(HANGAR_EXTENSION)?;
                Some(Self::GroundAnchor(GroundAnchorBinding {
                    detach: ext.resolve(GROUND_ANCHOR_MODULE, "Detach anchor")?,
                    attach: ext.resolve(GROUND_ANCHOR_MODULE, "Attach anchor")?,
                }))
            }
            IntegrationKind::KisPylon => {
                let ext = find(KIS_EXTENSION)?;
                Some(Self::KisPylon(KisBinding {
                    ground_detach: ext.resolve(KIS_ITEM_TYPE, "GroundDetach")?,
                    ground_attach: ext.resolve(KIS_ITEM_TYPE, "GroundAttach")?,
                }))
            }
            IntegrationKind::KasHarpoon => {
                let ext = find(KAS_EXTENSION)?;
                Some(Self::KasHarpoon(KasBinding {
                    detach: ext.resolve(KAS_HARPOON_TYPE, "Detach")?,
                    attach_static: ext.resolve(KAS_HARPOON_TYPE, "AttachStaticGrapple")?,
                    toggle_plug_mode: ext.resolve(KAS_WINCH_TYPE, "TogglePlugMode")?,
                }))
            }
        }
    }

    /// Binds every integration the catalog supports.
    #[must_use]
    pub fn discover(catalog: &[LoadedExtension]) -> Vec<Self> {
        let mut found = Vec::new();
        for kind in IntegrationKind::ALL {
            match Self::try_bind(kind, catalog) {
                Some(integration) => {
                    info!(%kind, "ground-anchoring integration available");
                    found.push(integration);
                }
                None => debug!(%kind, "ground-anchoring integration not present"),
            }
        }
        found
    }
}

/// Catalog entries for all three integrations, as their add-ons export them.
#[must_use]
pub fn full_catalog() -> Vec<LoadedExtension> {
    vec![
        LoadedExtension::new(HANGAR_EXTENSION)
            .exporting(GROUND_ANCHOR_MODULE, "Detach anchor")
            .exporting(GROUND_ANCHOR_MODULE, "Attach anchor"),
        LoadedExtension::new(KIS_EXTENSION)
            .exporting(KIS_ITEM_TYPE, "GroundDetach")
            .exporting(KIS_ITEM_TYPE, "GroundAttach"),
        LoadedExtension::new(KAS_EXTENSION)
            .exporting(KAS_HARPOON_TYPE, "Detach")
            .exporting(KAS_HARPOON_TYPE, "AttachStaticGrapple")
            .exporting(KAS_WINCH_TYPE, "TogglePlugMode"),
    ]
}

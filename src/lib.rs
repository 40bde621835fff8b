//! # Vessel Stabilizer - Settling Vessels When Physics Wakes Up
//!
//! When a simulation host switches a multi-part vessel from its simplified
//! "on-rails" representation to full rigid-body physics, imprecise collision
//! geometry makes it jitter, sink into the ground or pop off it. This crate
//! runs a short, bounded corrective window per vessel that lifts it clear,
//! lowers it onto the ground and holds it still, releasing ground-anchoring
//! devices for the move and reattaching them once the vessel has settled.
//!
//! ## Core Concepts
//!
//! - **GeometryProbe**: Vertical extent of a vessel from its collision meshes
//! - **AltitudeSampler**: Downward ray probes with ground-only / ground-and-parts masks
//! - **GroundAttachmentRegistry**: Optional anchoring integrations and detach/attach bookkeeping
//! - **ReconnectAgent**: Per-device state machine that reattaches once ground contact is seen
//! - **StabilizationEngine**: Per-vessel timed control loop driven by the host's fixed update
//!
//! ## Usage
//!
//! ```rust
//! use glam::Vec3;
//! use vessel_stabilizer::host::memory::InMemoryHost;
//! use vessel_stabilizer::{
//!     CollisionMesh, Part, PartId, StabilizationEngine, StabilizerConfig, Vessel, VesselId,
//! };
//!
//! let mut host = InMemoryHost::new();
//! host.add_ground_plane(0.0);
//!
//! let id = VesselId::new();
//! let mut lander = Vessel::landed(id, "lander").with_part(
//!     Part::new(PartId::new(1), "hull")
//!         .with_mesh(CollisionMesh::cuboid(Vec3::new(0.0, 1.5, 0.0), Vec3::ONE)),
//! );
//! lander.center_of_mass = Vec3::new(0.0, 1.5, 0.0);
//! host.insert_vessel(lander);
//!
//! let mut engine = StabilizationEngine::new(StabilizerConfig::default(), 0.02, &[])?;
//! engine.on_vessel_off_rails(&mut host, id);
//! while engine.stabilizing_count() > 0 {
//!     engine.fixed_update(&mut host);
//! }
//! # Ok::<(), vessel_stabilizer::StabilizerError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Host seam and data model
pub mod error;
pub mod host;
pub mod vessel;

// Measurement
pub mod geometry;
pub mod probe;

// Anchoring and reconnection
pub mod anchoring;
pub mod reconnect;
pub mod schedule;

// Control loop
pub mod config;
pub mod engine;
pub mod events;

pub use anchoring::{
    AnchoringDevice, AttachOutcome, DeviceHandle, DeviceId, GroundAttachmentRegistry, Integration,
    IntegrationKind,
};
pub use config::{StabilizerConfig, Timebase, MAX_RISE_STEPS};
pub use engine::{
    DescentPlan, EntryOutcome, Phase, SkipCause, StabilizationEngine, StabilizationEntry, TickReport,
    COMPLETION_MESSAGE,
};
pub use error::{AnchorError, HostError, StabilizerError, StabilizerResult, ValidationError};
pub use events::{EventBus, EventKind, EventStream, StabilizationEvent};
pub use geometry::{GeometryProbe, VesselBounds};
pub use host::{Host, LayerMask, ModuleHost, SimHost};
pub use probe::{AltitudeSampler, ProbeResult};
pub use reconnect::{AgentState, ReconnectAgent, ReconnectScheduler, TriggerPolicy};
pub use schedule::{DeferredQueue, Tick};
pub use vessel::{CollisionMesh, ModuleHandle, ModuleRef, Part, PartId, Situation, SurfaceId, Vessel, VesselId};

//! # TETHER Shared-Memory Protocol
//!
//! Lock-free channels that let the simulation/render thread and the
//! physics thread cooperate without ever blocking each other:
//!
//! ```text
//!  simulation thread                         physics thread
//!  ┌──────────────┐   command ring (SPSC)   ┌──────────────┐
//!  │ CommandWriter ├────────────────────────> CommandReader │
//!  │              │   snapshot triple buf   │              │
//!  │ SnapshotReader <──────────────────────┤ SnapshotWriter│
//!  │              │   event rings (SPSC)    │              │
//!  │ EventConsumer <──────────────────────┤ EventProducer │
//!  │              │   result slots (GEN)    │              │
//!  │ RayResultReader <────────────────────┤ RayResultWriter│
//!  └──────────────┘                         └──────────────┘
//! ```
//!
//! Every channel has exactly one writer and one reader, fixed for the
//! process lifetime. Regions are allocated and header-initialized once at
//! startup and never resized. A full ring drops the newest item; a stale
//! snapshot simply is not re-read. Nothing here blocks, ever.

pub mod command;
pub mod error;
pub mod events;
pub mod layout;
pub mod query;
pub mod region;
pub mod snapshot;

use std::sync::Arc;

use region::{init_header, SharedRegion};

pub use command::{BodyDesc, BodyKind, Command, CommandReader, CommandWriter, RayParams, ShapeParam};
pub use error::{ShmError, ShmResult};
pub use events::{
    controller_kind, region_bytes_for, CollisionEvent, ControllerEvent, EventConsumer,
    EventProducer, RingSlot,
};
pub use query::{RayHit, RayResultReader, RayResultWriter};
pub use snapshot::{BodyRecord, SnapshotReader, SnapshotWriter};

/// The complete set of shared regions both threads attach to.
///
/// Allocated once by the host before either thread runs its loop; cloning
/// is cheap (`Arc` per region) and is how the bundle crosses the thread
/// boundary inside the control-plane INIT message.
#[derive(Clone, Debug)]
pub struct RegionSet {
    /// Command ring, simulation -> physics.
    pub commands: Arc<SharedRegion>,
    /// Snapshot triple buffer, physics -> simulation.
    pub snapshots: Arc<SharedRegion>,
    /// Collision event ring, physics -> simulation.
    pub collisions: Arc<SharedRegion>,
    /// Controller event ring, physics -> simulation.
    pub controller_events: Arc<SharedRegion>,
    /// Weapon raycast result slot.
    pub weapon_ray: Arc<SharedRegion>,
    /// Interaction raycast result slot.
    pub interact_ray: Arc<SharedRegion>,
}

impl RegionSet {
    /// Allocates every region at its exact layout size and stamps all
    /// headers. After this returns, both sides may attach and run.
    #[must_use]
    pub fn allocate() -> Self {
        let set = Self {
            commands: SharedRegion::alloc(layout::CMD_REGION_BYTES),
            snapshots: SharedRegion::alloc(layout::SNAP_REGION_BYTES),
            collisions: SharedRegion::alloc(region_bytes_for::<CollisionEvent>()),
            controller_events: SharedRegion::alloc(region_bytes_for::<ControllerEvent>()),
            weapon_ray: SharedRegion::alloc(layout::RAY_REGION_BYTES),
            interact_ray: SharedRegion::alloc(layout::RAY_REGION_BYTES),
        };
        for region in [
            &set.commands,
            &set.snapshots,
            &set.collisions,
            &set.controller_events,
            &set.weapon_ray,
            &set.interact_ray,
        ] {
            init_header(region);
        }
        set
    }
}

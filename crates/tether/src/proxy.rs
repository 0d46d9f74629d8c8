//! # Simulation-Side Proxy
//!
//! The one object the game loop touches. It bundles the simulation
//! thread's end of every shared channel behind intent-level methods:
//! spawn this, move that, shoot there, and pull back whatever the
//! physics thread published since last frame.
//!
//! Every method here is wait-free. A full command ring refuses the
//! command (returns `false`); polls that find nothing new return
//! nothing. The game loop's frame time never depends on the physics
//! thread's schedule.

use std::sync::Arc;

use tether_shm::{
    BodyDesc, BodyRecord, CollisionEvent, Command, CommandWriter, ControllerEvent, EventConsumer,
    RayHit, RayParams, RayResultReader, RegionSet, ShmResult, SnapshotReader,
};

/// Consumes snapshot records, typically by writing them into the
/// render-side transform storage.
pub trait TransformSink {
    /// Applies one body's published transform.
    fn apply(&mut self, record: &BodyRecord);
}

impl<F: FnMut(&BodyRecord)> TransformSink for F {
    fn apply(&mut self, record: &BodyRecord) {
        self(record);
    }
}

/// The simulation thread's handle to the physics world.
pub struct PhysicsProxy {
    commands: CommandWriter,
    snapshots: SnapshotReader,
    collisions: EventConsumer<CollisionEvent>,
    controller_events: EventConsumer<ControllerEvent>,
    weapon_ray: RayResultReader,
    interact_ray: RayResultReader,
}

impl PhysicsProxy {
    /// Attaches to the simulation-side end of every region.
    pub fn attach(regions: &RegionSet) -> ShmResult<Self> {
        Ok(Self {
            commands: CommandWriter::attach(Arc::clone(&regions.commands))?,
            snapshots: SnapshotReader::attach(Arc::clone(&regions.snapshots))?,
            collisions: EventConsumer::attach(Arc::clone(&regions.collisions))?,
            controller_events: EventConsumer::attach(Arc::clone(&regions.controller_events))?,
            weapon_ray: RayResultReader::attach(Arc::clone(&regions.weapon_ray))?,
            interact_ray: RayResultReader::attach(Arc::clone(&regions.interact_ray))?,
        })
    }

    /// Requests a body. Returns `false` if the command ring was full and
    /// the request was dropped.
    pub fn create_body(&self, phys_id: u32, desc: BodyDesc) -> bool {
        self.commands
            .try_enqueue(&Command::CreateBody { phys_id, desc })
    }

    /// Requests destruction of a body.
    pub fn destroy_body(&self, phys_id: u32) -> bool {
        self.commands.try_enqueue(&Command::DestroyBody { phys_id })
    }

    /// Requests a character-controller move for this tick.
    pub fn move_player(&self, phys_id: u32, displacement: [f32; 3]) -> bool {
        self.commands.try_enqueue(&Command::MovePlayer {
            phys_id,
            displacement,
        })
    }

    /// Fires a weapon ray; the answer arrives via
    /// [`Self::poll_weapon_hit`].
    pub fn cast_weapon_ray(&self, source_phys_id: u32, ray: RayParams) -> bool {
        self.commands.try_enqueue(&Command::WeaponRaycast {
            source_phys_id,
            ray,
        })
    }

    /// Fires an interaction ray; the answer arrives via
    /// [`Self::poll_interact_hit`].
    pub fn cast_interact_ray(&self, source_phys_id: u32, ray: RayParams) -> bool {
        self.commands.try_enqueue(&Command::InteractRaycast {
            source_phys_id,
            ray,
        })
    }

    /// Applies the newest snapshot to `sink`, once per published
    /// generation. Returns the consumed generation, or `None` when the
    /// physics thread has not published since the last call.
    pub fn apply_snapshot(&mut self, sink: &mut impl TransformSink) -> Option<u32> {
        self.snapshots.poll(|record| sink.apply(record))
    }

    /// Duration of the physics thread's most recent step, in
    /// microseconds. Diagnostic only.
    #[must_use]
    pub fn last_step_us(&self) -> f32 {
        self.snapshots.last_step_us()
    }

    /// Drains pending collision events in FIFO order.
    pub fn drain_collisions(&self, handle: impl FnMut(CollisionEvent)) -> u32 {
        self.collisions.drain(handle)
    }

    /// Drains pending character-controller events in FIFO order.
    pub fn drain_controller_events(&self, handle: impl FnMut(ControllerEvent)) -> u32 {
        self.controller_events.drain(handle)
    }

    /// Newest weapon raycast result, once per published answer.
    pub fn poll_weapon_hit(&mut self) -> Option<RayHit> {
        self.weapon_ray.poll()
    }

    /// Newest interaction raycast result, once per published answer.
    pub fn poll_interact_hit(&mut self) -> Option<RayHit> {
        self.interact_ray.poll()
    }

    /// Commands that can still be enqueued this frame before the ring
    /// drops.
    #[must_use]
    pub fn free_command_slots(&self) -> u32 {
        self.commands.free_slots()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_shm::{CommandReader, ShapeParam};

    #[test]
    fn proxy_commands_land_in_the_ring_in_order() {
        let regions = RegionSet::allocate();
        let proxy = PhysicsProxy::attach(&regions).unwrap();
        let reader = CommandReader::attach(Arc::clone(&regions.commands)).unwrap();

        assert!(proxy.create_body(
            1,
            BodyDesc::fixed(
                ShapeParam::Cuboid {
                    half_extents: [10.0, 0.5, 10.0],
                },
                [0.0, -0.5, 0.0],
            ),
        ));
        assert!(proxy.move_player(9, [0.1, 0.0, 0.0]));
        assert!(proxy.destroy_body(1));

        let mut seen = Vec::new();
        reader.drain(|cmd| seen.push(cmd));
        assert_eq!(seen.len(), 3);
        assert!(matches!(seen[0], Command::CreateBody { phys_id: 1, .. }));
        assert!(matches!(seen[1], Command::MovePlayer { phys_id: 9, .. }));
        assert!(matches!(seen[2], Command::DestroyBody { phys_id: 1 }));
    }

    #[test]
    fn closures_are_transform_sinks() {
        let regions = RegionSet::allocate();
        let mut proxy = PhysicsProxy::attach(&regions).unwrap();
        // Nothing published yet, so the sink must not run.
        let mut sink = |_: &BodyRecord| panic!("no snapshot exists");
        assert!(proxy.apply_snapshot(&mut sink).is_none());
    }
}

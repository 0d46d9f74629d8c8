//! # Body Store
//!
//! Owns the `phys_id` -> rapier handle maps. These maps live exclusively
//! on the physics thread; the simulation side only ever sees `phys_id`s,
//! which is what keeps handle reuse and body lifetime entirely out of
//! the shared-memory protocol.

use std::collections::HashMap;

use nalgebra::{Quaternion, UnitQuaternion};
use rapier3d::prelude::{
    ActiveEvents, Collider, ColliderBuilder, ColliderHandle, Isometry, RigidBody,
    RigidBodyBuilder, RigidBodyHandle, Translation, vector,
};

use tether_shm::{BodyDesc, BodyKind, BodyRecord, ShapeParam};

use crate::world::PhysicsWorld;

/// Per-body character-controller state tracked across ticks.
#[derive(Clone, Copy, Debug, Default)]
pub struct ControllerState {
    /// Grounded flag as of the last controller move.
    pub grounded: bool,
}

/// One mapped body.
#[derive(Clone, Copy, Debug)]
pub struct BodyEntry {
    /// Rapier body handle.
    pub body: RigidBodyHandle,
    /// Handle of the body's single collider.
    pub collider: ColliderHandle,
    /// Present when the body carries a character controller.
    pub controller: Option<ControllerState>,
}

/// All id-to-handle bookkeeping for the physics thread.
#[derive(Debug, Default)]
pub struct BodyStore {
    entries: HashMap<u32, BodyEntry>,
    owners: HashMap<ColliderHandle, u32>,
}

impl BodyStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of mapped bodies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no bodies are mapped.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Creates a body from a wire description and maps it under
    /// `phys_id`.
    ///
    /// An invalid shape rolls the whole create back: nothing is inserted
    /// and nothing is mapped. A reused id replaces the previous body so
    /// the map never aliases two rapier bodies under one id.
    pub fn create(&mut self, world: &mut PhysicsWorld, phys_id: u32, desc: &BodyDesc) -> bool {
        let Some(collider) = build_collider(desc.shape) else {
            tracing::warn!(phys_id, "invalid collider shape, discarding create");
            return false;
        };

        if self.entries.contains_key(&phys_id) {
            tracing::warn!(phys_id, "phys id reused, replacing existing body");
            self.destroy(world, phys_id);
        }

        let (body_handle, collider_handle) = world.insert_body(build_body(desc), collider);
        self.entries.insert(
            phys_id,
            BodyEntry {
                body: body_handle,
                collider: collider_handle,
                controller: desc.controller.then(ControllerState::default),
            },
        );
        self.owners.insert(collider_handle, phys_id);
        tracing::debug!(phys_id, kind = ?desc.kind, "body created");
        true
    }

    /// Destroys the body mapped under `phys_id`. Unknown ids are a
    /// no-op: destroy commands may race ahead of creates that were
    /// dropped by a full ring.
    pub fn destroy(&mut self, world: &mut PhysicsWorld, phys_id: u32) -> bool {
        let Some(entry) = self.entries.remove(&phys_id) else {
            tracing::debug!(phys_id, "destroy for unmapped phys id, ignoring");
            return false;
        };
        self.owners.remove(&entry.collider);
        world.remove_body(entry.body);
        tracing::debug!(phys_id, "body destroyed");
        true
    }

    /// Looks up a mapped body.
    #[must_use]
    pub fn entry(&self, phys_id: u32) -> Option<&BodyEntry> {
        self.entries.get(&phys_id)
    }

    /// Maps a collider back to the `phys_id` owning it.
    #[must_use]
    pub fn owner_of(&self, collider: ColliderHandle) -> Option<u32> {
        self.owners.get(&collider).copied()
    }

    /// Records a controller's grounded flag. Returns true when the flag
    /// actually changed, which is what gates the event.
    pub fn set_grounded(&mut self, phys_id: u32, grounded: bool) -> bool {
        let Some(state) = self
            .entries
            .get_mut(&phys_id)
            .and_then(|entry| entry.controller.as_mut())
        else {
            return false;
        };
        let changed = state.grounded != grounded;
        state.grounded = grounded;
        changed
    }

    /// Fills `out` with one snapshot record per mapped body. Bodies
    /// whose handle vanished from the world are silently skipped.
    pub fn fill_records(&self, world: &PhysicsWorld, out: &mut Vec<BodyRecord>) {
        for (&phys_id, entry) in &self.entries {
            let Some((pos, rot)) = world.body_transform(entry.body) else {
                continue;
            };
            out.push(BodyRecord {
                phys_id,
                pos,
                rot,
                grounded: match entry.controller {
                    Some(state) if state.grounded => 1.0,
                    _ => 0.0,
                },
            });
        }
    }

    /// Removes every mapped body from the world. Used at teardown.
    pub fn clear(&mut self, world: &mut PhysicsWorld) {
        for (_, entry) in self.entries.drain() {
            world.remove_body(entry.body);
        }
        self.owners.clear();
    }
}

/// Builds the rapier body for a wire description. A controller implies a
/// position-based kinematic body whatever the requested kind says; the
/// controller drives the pose directly and dynamics would fight it.
fn build_body(desc: &BodyDesc) -> RigidBody {
    let kind = if desc.controller && desc.kind != BodyKind::Kinematic {
        tracing::debug!(requested = ?desc.kind, "controller forces kinematic body kind");
        BodyKind::Kinematic
    } else {
        desc.kind
    };

    let pose = Isometry::from_parts(
        Translation::from(vector![desc.pos[0], desc.pos[1], desc.pos[2]]),
        unit_quat(desc.rot),
    );

    match kind {
        BodyKind::Fixed => RigidBodyBuilder::fixed().pose(pose).build(),
        BodyKind::Kinematic => RigidBodyBuilder::kinematic_position_based()
            .pose(pose)
            .build(),
        BodyKind::Dynamic => RigidBodyBuilder::dynamic()
            .pose(pose)
            .linvel(vector![desc.linvel[0], desc.linvel[1], desc.linvel[2]])
            .build(),
    }
}

/// Builds the collider for a wire shape, or `None` for an invalid one.
/// Every collider emits collision events; the shared event ring is the
/// only way contacts reach gameplay.
fn build_collider(shape: ShapeParam) -> Option<Collider> {
    let builder = match shape {
        ShapeParam::Sphere { radius } => ColliderBuilder::ball(radius),
        ShapeParam::Cuboid { half_extents } => {
            ColliderBuilder::cuboid(half_extents[0], half_extents[1], half_extents[2])
        }
        ShapeParam::Capsule {
            half_height,
            radius,
        } => ColliderBuilder::capsule_y(half_height, radius),
        ShapeParam::Invalid => return None,
    };
    Some(builder.active_events(ActiveEvents::COLLISION_EVENTS).build())
}

/// Unit quaternion from wire `[x, y, z, w]`. A degenerate quaternion
/// falls back to identity rather than normalizing to NaN.
fn unit_quat(rot: [f32; 4]) -> UnitQuaternion<f32> {
    let quat = Quaternion::new(rot[3], rot[0], rot[1], rot[2]);
    if quat.norm_squared() < 1.0e-12 {
        UnitQuaternion::identity()
    } else {
        UnitQuaternion::from_quaternion(quat)
    }
}

//! # Simulation World
//!
//! Thin wrapper around rapier's structure-of-sets pipeline. Everything
//! rapier lives behind this module: the rest of the crate speaks
//! `phys_id`s, plain float arrays, and [`crate::bodies::BodyStore`]
//! handles, never rapier types.
//!
//! Scene queries use rapier 0.31's borrowed `QueryPipeline` view built
//! from the broad phase each time, so there is no separate query
//! structure to keep in sync after stepping.

use nalgebra::point;
use std::sync::mpsc::Receiver;
use rapier3d::control::KinematicCharacterController;
use rapier3d::pipeline::ChannelEventCollector;
use rapier3d::prelude::*;

/// Result of one character-controller move.
#[derive(Clone, Copy, Debug)]
pub struct MoveOutcome {
    /// Collision-corrected translation actually applied.
    pub translation: [f32; 3],
    /// Whether the controller ended the move standing on ground.
    pub grounded: bool,
}

/// The rapier world plus the channels its event collector drains into.
pub struct PhysicsWorld {
    gravity: Vector<Real>,
    params: IntegrationParameters,
    pipeline: PhysicsPipeline,
    islands: IslandManager,
    broad_phase: BroadPhaseBvh,
    narrow_phase: NarrowPhase,
    bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd: CCDSolver,
    controller: KinematicCharacterController,
    collector: ChannelEventCollector,
    collision_rx: Receiver<CollisionEvent>,
    contact_force_rx: Receiver<ContactForceEvent>,
}

impl PhysicsWorld {
    /// Builds an empty world with the given gravity vector.
    #[must_use]
    pub fn new(gravity: [f32; 3]) -> Self {
        let (collision_tx, collision_rx) = std::sync::mpsc::channel();
        let (contact_force_tx, contact_force_rx) = std::sync::mpsc::channel();
        Self {
            gravity: vector![gravity[0], gravity[1], gravity[2]],
            params: IntegrationParameters::default(),
            pipeline: PhysicsPipeline::new(),
            islands: IslandManager::new(),
            broad_phase: BroadPhaseBvh::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd: CCDSolver::new(),
            controller: KinematicCharacterController::default(),
            collector: ChannelEventCollector::new(collision_tx, contact_force_tx),
            collision_rx,
            contact_force_rx,
        }
    }

    /// Inserts a body and attaches its collider.
    pub fn insert_body(
        &mut self,
        body: RigidBody,
        collider: Collider,
    ) -> (RigidBodyHandle, ColliderHandle) {
        let body_handle = self.bodies.insert(body);
        let collider_handle =
            self.colliders
                .insert_with_parent(collider, body_handle, &mut self.bodies);
        (body_handle, collider_handle)
    }

    /// Removes a body and everything attached to it.
    pub fn remove_body(&mut self, handle: RigidBodyHandle) {
        self.bodies.remove(
            handle,
            &mut self.islands,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            true,
        );
    }

    /// Current world transform of a body, as position plus `[x, y, z, w]`
    /// quaternion.
    #[must_use]
    pub fn body_transform(&self, handle: RigidBodyHandle) -> Option<([f32; 3], [f32; 4])> {
        let body = self.bodies.get(handle)?;
        let pose = body.position();
        Some((
            [
                pose.translation.x,
                pose.translation.y,
                pose.translation.z,
            ],
            [
                pose.rotation.i,
                pose.rotation.j,
                pose.rotation.k,
                pose.rotation.w,
            ],
        ))
    }

    /// Advances the simulation by exactly `dt` seconds.
    pub fn step(&mut self, dt: f32) {
        self.params.dt = dt;
        self.pipeline.step(
            &self.gravity,
            &self.params,
            &mut self.islands,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd,
            &(),
            &self.collector,
        );
    }

    /// Casts a ray and returns the first hit collider and its distance
    /// along the ray. The direction is normalized here; a zero direction
    /// or non-positive range is a guaranteed miss.
    #[must_use]
    pub fn cast_ray(
        &self,
        origin: [f32; 3],
        dir: [f32; 3],
        max_distance: f32,
        exclude: Option<RigidBodyHandle>,
    ) -> Option<(ColliderHandle, f32)> {
        let direction = vector![dir[0], dir[1], dir[2]];
        let norm = direction.norm();
        if norm <= f32::EPSILON || max_distance <= 0.0 {
            return None;
        }

        let mut filter = QueryFilter::default();
        if let Some(handle) = exclude {
            filter = filter.exclude_rigid_body(handle);
        }
        let query_pipeline = self.broad_phase.as_query_pipeline(
            self.narrow_phase.query_dispatcher(),
            &self.bodies,
            &self.colliders,
            filter,
        );

        let ray = Ray::new(point![origin[0], origin[1], origin[2]], direction / norm);
        query_pipeline
            .cast_ray_and_get_normal(&ray, max_distance, true)
            .map(|(handle, hit)| (handle, hit.time_of_impact))
    }

    /// Runs the kinematic character controller for one body: slides the
    /// desired translation along obstacles and commits the corrected pose
    /// for the next step. The body itself is excluded from the query.
    pub fn move_character(
        &mut self,
        dt: f32,
        body: RigidBodyHandle,
        collider: ColliderHandle,
        desired: [f32; 3],
    ) -> Option<MoveOutcome> {
        let pose = *self.bodies.get(body)?.position();
        let corrected = {
            let shape = self.colliders.get(collider)?.shape();
            let filter = QueryFilter::default().exclude_rigid_body(body);
            let query_pipeline = self.broad_phase.as_query_pipeline(
                self.narrow_phase.query_dispatcher(),
                &self.bodies,
                &self.colliders,
                filter,
            );
            self.controller.move_shape(
                dt,
                &query_pipeline,
                shape,
                &pose,
                vector![desired[0], desired[1], desired[2]],
                |_| {},
            )
        };

        let next = Isometry::from_parts(
            Translation::from(pose.translation.vector + corrected.translation),
            pose.rotation,
        );
        self.bodies.get_mut(body)?.set_next_kinematic_position(next);

        Some(MoveOutcome {
            translation: [
                corrected.translation.x,
                corrected.translation.y,
                corrected.translation.z,
            ],
            grounded: corrected.grounded,
        })
    }

    /// Drains the collision events collected during the last step(s).
    /// Contact-force events are discarded; nothing downstream consumes
    /// them.
    pub fn drain_collisions(&mut self, mut handle: impl FnMut(ColliderHandle, ColliderHandle, bool)) {
        while let Ok(event) = self.collision_rx.try_recv() {
            match event {
                CollisionEvent::Started(a, b, _) => handle(a, b, true),
                CollisionEvent::Stopped(a, b, _) => handle(a, b, false),
            }
        }
        while self.contact_force_rx.try_recv().is_ok() {}
    }
}

impl std::fmt::Debug for PhysicsWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicsWorld")
            .field("bodies", &self.bodies.len())
            .field("colliders", &self.colliders.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 1.0 / 60.0;

    fn ground(world: &mut PhysicsWorld) -> (RigidBodyHandle, ColliderHandle) {
        let body = RigidBodyBuilder::fixed()
            .pose(Isometry::translation(0.0, -0.5, 0.0))
            .build();
        let collider = ColliderBuilder::cuboid(10.0, 0.5, 10.0)
            .active_events(ActiveEvents::COLLISION_EVENTS)
            .build();
        world.insert_body(body, collider)
    }

    fn falling_ball(world: &mut PhysicsWorld, y: f32) -> (RigidBodyHandle, ColliderHandle) {
        let body = RigidBodyBuilder::dynamic()
            .pose(Isometry::translation(0.0, y, 0.0))
            .build();
        let collider = ColliderBuilder::ball(1.0)
            .active_events(ActiveEvents::COLLISION_EVENTS)
            .build();
        world.insert_body(body, collider)
    }

    #[test]
    fn gravity_pulls_a_dynamic_body_down_onto_the_ground() {
        let mut world = PhysicsWorld::new([0.0, -9.81, 0.0]);
        ground(&mut world);
        let (ball, _) = falling_ball(&mut world, 5.0);

        for _ in 0..120 {
            world.step(DT);
        }

        let (pos, _) = world.body_transform(ball).unwrap();
        // Fell from 5m and came to rest on the ground plane (top at y=0,
        // ball radius 1), allowing some solver slop.
        assert!(pos[1] < 4.0, "ball did not fall: y = {}", pos[1]);
        assert!(pos[1] > 0.5, "ball fell through the ground: y = {}", pos[1]);
    }

    #[test]
    fn impact_produces_a_started_collision_event() {
        let mut world = PhysicsWorld::new([0.0, -9.81, 0.0]);
        let (_, ground_collider) = ground(&mut world);
        let (_, ball_collider) = falling_ball(&mut world, 2.5);

        let mut started = Vec::new();
        for _ in 0..120 {
            world.step(DT);
            world.drain_collisions(|a, b, start| {
                if start {
                    started.push((a, b));
                }
            });
        }

        assert!(started
            .iter()
            .any(|&(a, b)| (a, b) == (ground_collider, ball_collider)
                || (a, b) == (ball_collider, ground_collider)));
    }

    #[test]
    fn ray_hits_the_ground_at_the_expected_distance() {
        let mut world = PhysicsWorld::new([0.0, -9.81, 0.0]);
        let (_, ground_collider) = ground(&mut world);
        world.step(DT);

        let (hit, distance) = world
            .cast_ray([0.0, 5.0, 0.0], [0.0, -1.0, 0.0], 100.0, None)
            .expect("ray straight down must hit the ground");
        assert_eq!(hit, ground_collider);
        assert!((distance - 5.0).abs() < 0.05, "distance = {distance}");
    }

    #[test]
    fn ray_excluding_a_body_passes_through_it() {
        let mut world = PhysicsWorld::new([0.0, -9.81, 0.0]);
        let (_, ground_collider) = ground(&mut world);
        let (ball_body, _) = falling_ball(&mut world, 3.0);
        world.step(DT);

        let (hit, _) = world
            .cast_ray([0.0, 8.0, 0.0], [0.0, -1.0, 0.0], 100.0, Some(ball_body))
            .expect("ray must reach the ground behind the excluded ball");
        assert_eq!(hit, ground_collider);
    }

    #[test]
    fn zero_direction_ray_is_a_miss() {
        let mut world = PhysicsWorld::new([0.0, -9.81, 0.0]);
        ground(&mut world);
        world.step(DT);
        assert!(world
            .cast_ray([0.0, 5.0, 0.0], [0.0, 0.0, 0.0], 100.0, None)
            .is_none());
    }

    #[test]
    fn character_controller_reports_ground_contact() {
        let mut world = PhysicsWorld::new([0.0, -9.81, 0.0]);
        ground(&mut world);
        let body = RigidBodyBuilder::kinematic_position_based()
            .pose(Isometry::translation(0.0, 1.31, 0.0))
            .build();
        let collider = ColliderBuilder::capsule_y(0.9, 0.4).build();
        let (body, collider) = world.insert_body(body, collider);
        world.step(DT);

        // Walk forward with a small downward bias for several steps.
        let mut grounded = false;
        for _ in 0..30 {
            let outcome = world
                .move_character(DT, body, collider, [0.05, -0.05, 0.0])
                .expect("body and collider exist");
            grounded = outcome.grounded;
            world.step(DT);
        }
        assert!(grounded, "controller never touched down");
    }
}

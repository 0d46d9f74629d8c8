//! # Physics Runtime
//!
//! The physics thread's side of every shared channel, glued to the
//! simulation world. One [`PhysicsRuntime::tick`] is:
//!
//! ```text
//!   advance stepper ──▶ per fixed step:
//!                         drain command ring ─▶ mutate world / answer rays
//!                         step rapier
//!                       then, once per tick (if any step ran):
//!                         pump collision events into the ring
//!                         publish snapshot
//! ```
//!
//! Commands are re-drained before every sub-step so a burst of steps
//! after a hitch still interleaves command handling with stepping.

use std::time::Instant;

use tether_shm::{
    controller_kind, BodyRecord, Command, CommandReader, CollisionEvent, ControllerEvent,
    EventProducer, RayResultWriter, RegionSet, SnapshotWriter,
};

use crate::bodies::BodyStore;
use crate::error::PhysicsResult;
use crate::stepper::FixedStepper;
use crate::world::PhysicsWorld;

/// Tuning knobs for the physics worker.
#[derive(Clone, Copy, Debug)]
pub struct PhysicsConfig {
    /// Fixed simulation step in seconds.
    pub fixed_dt: f32,
    /// World gravity.
    pub gravity: [f32; 3],
    /// Step cap per tick; debt beyond it is forfeited.
    pub max_steps_per_tick: u32,
    /// When true the worker ticks itself on wall-clock time between
    /// control messages. Tests turn this off and drive STEP manually.
    pub free_run: bool,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            fixed_dt: 1.0 / 60.0,
            gravity: [0.0, -9.81, 0.0],
            max_steps_per_tick: 5,
            free_run: true,
        }
    }
}

/// The physics thread's working set: world, body maps, and its end of
/// every shared region.
pub struct PhysicsRuntime {
    world: PhysicsWorld,
    store: BodyStore,
    stepper: FixedStepper,
    commands: CommandReader,
    snapshots: SnapshotWriter,
    collisions: EventProducer<CollisionEvent>,
    controller_events: EventProducer<ControllerEvent>,
    weapon_ray: RayResultWriter,
    interact_ray: RayResultWriter,
    records: Vec<BodyRecord>,
    last_step_us: f32,
}

impl PhysicsRuntime {
    /// Attaches to every region in the set and builds an empty world.
    pub fn attach(regions: &RegionSet, config: &PhysicsConfig) -> PhysicsResult<Self> {
        Ok(Self {
            world: PhysicsWorld::new(config.gravity),
            store: BodyStore::new(),
            stepper: FixedStepper::new(config.fixed_dt, config.max_steps_per_tick),
            commands: CommandReader::attach(regions.commands.clone())?,
            snapshots: SnapshotWriter::attach(regions.snapshots.clone())?,
            collisions: EventProducer::attach(regions.collisions.clone())?,
            controller_events: EventProducer::attach(regions.controller_events.clone())?,
            weapon_ray: RayResultWriter::attach(regions.weapon_ray.clone())?,
            interact_ray: RayResultWriter::attach(regions.interact_ray.clone())?,
            records: Vec::new(),
            last_step_us: 0.0,
        })
    }

    /// Runs one tick worth of simulation for `elapsed` wall-clock
    /// seconds and returns the number of fixed steps executed.
    pub fn tick(&mut self, elapsed: f32) -> u32 {
        let steps = self.stepper.advance(elapsed);
        for _ in 0..steps {
            self.drain_commands();
            let start = Instant::now();
            self.world.step(self.stepper.fixed_dt());
            self.last_step_us = start.elapsed().as_secs_f32() * 1.0e6;
        }
        if steps > 0 {
            // Events and the snapshot go out once per tick, not per
            // sub-step; the collector queues across sub-steps.
            self.pump_collisions();
            self.publish_snapshot();
        }
        steps
    }

    /// Removes every body and publishes a final empty snapshot so the
    /// simulation side observes the cleared world.
    pub fn teardown(&mut self) {
        self.drain_commands();
        self.store.clear(&mut self.world);
        self.publish_snapshot();
        tracing::info!("physics runtime torn down");
    }

    fn drain_commands(&mut self) {
        let dt = self.stepper.fixed_dt();
        let Self {
            commands,
            world,
            store,
            controller_events,
            weapon_ray,
            interact_ray,
            ..
        } = self;
        commands.drain(|command| {
            dispatch(
                command,
                dt,
                world,
                store,
                controller_events,
                weapon_ray,
                interact_ray,
            );
        });
    }

    fn pump_collisions(&mut self) {
        let Self {
            world,
            store,
            collisions,
            ..
        } = self;
        world.drain_collisions(|a, b, started| {
            // Contacts involving a collider that was destroyed mid-step
            // have no owner anymore; gameplay cannot act on them.
            let (Some(a_phys_id), Some(b_phys_id)) = (store.owner_of(a), store.owner_of(b))
            else {
                return;
            };
            collisions.try_push(&CollisionEvent {
                a_phys_id,
                b_phys_id,
                started: u32::from(started),
            });
        });
    }

    fn publish_snapshot(&mut self) {
        self.records.clear();
        self.store.fill_records(&self.world, &mut self.records);
        self.snapshots
            .publish(self.records.drain(..), self.last_step_us);
    }
}

fn dispatch(
    command: Command,
    dt: f32,
    world: &mut PhysicsWorld,
    store: &mut BodyStore,
    controller_events: &EventProducer<ControllerEvent>,
    weapon_ray: &RayResultWriter,
    interact_ray: &RayResultWriter,
) {
    match command {
        Command::CreateBody { phys_id, desc } => {
            store.create(world, phys_id, &desc);
        }
        Command::DestroyBody { phys_id } => {
            store.destroy(world, phys_id);
        }
        Command::MovePlayer {
            phys_id,
            displacement,
        } => {
            let Some(entry) = store.entry(phys_id).copied() else {
                tracing::debug!(phys_id, "move for unmapped phys id, ignoring");
                return;
            };
            if entry.controller.is_none() {
                tracing::debug!(phys_id, "move for body without controller, ignoring");
                return;
            }
            let Some(outcome) = world.move_character(dt, entry.body, entry.collider, displacement)
            else {
                return;
            };
            if store.set_grounded(phys_id, outcome.grounded) {
                controller_events.try_push(&ControllerEvent {
                    phys_id,
                    kind: controller_kind::GROUNDED_CHANGED,
                    value: if outcome.grounded { 1.0 } else { 0.0 },
                });
            }
        }
        Command::WeaponRaycast {
            source_phys_id,
            ray,
        } => {
            answer_ray(source_phys_id, ray, world, store, weapon_ray);
        }
        Command::InteractRaycast {
            source_phys_id,
            ray,
        } => {
            answer_ray(source_phys_id, ray, world, store, interact_ray);
        }
    }
}

/// Casts one ray, excluding the requester's own body, and publishes the
/// outcome. A hit on a collider with no owner counts as a miss.
fn answer_ray(
    source_phys_id: u32,
    ray: tether_shm::RayParams,
    world: &PhysicsWorld,
    store: &BodyStore,
    slot: &RayResultWriter,
) {
    let exclude = store.entry(source_phys_id).map(|entry| entry.body);
    let hit = world
        .cast_ray(ray.origin, ray.dir, ray.max_distance, exclude)
        .and_then(|(collider, distance)| {
            store
                .owner_of(collider)
                .map(|hit_phys_id| (hit_phys_id, distance))
        });
    slot.publish(source_phys_id, hit);
}

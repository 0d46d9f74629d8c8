//! # TETHER Physics Worker
//!
//! The physics half of the layer: a dedicated thread that owns a rapier
//! world outright and talks to the simulation thread only through the
//! `tether_shm` regions plus a small lifecycle control plane.
//!
//! Layering, bottom up:
//!
//! - [`world`]: the rapier wrapper; the only module that sees rapier
//!   types.
//! - [`bodies`]: `phys_id` to handle maps, owned by this thread alone.
//! - [`stepper`]: wall-clock to fixed-step conversion with a hitch cap.
//! - [`runtime`]: one tick = drain commands, step, publish.
//! - [`worker`]: the thread itself and its INIT/READY/STEP/DESTROY
//!   channel protocol.

pub mod bodies;
pub mod error;
pub mod runtime;
pub mod stepper;
pub mod worker;
pub mod world;

pub use bodies::{BodyEntry, BodyStore};
pub use error::{PhysicsError, PhysicsResult};
pub use runtime::{PhysicsConfig, PhysicsRuntime};
pub use stepper::FixedStepper;
pub use worker::{HostMsg, WorkerHandle, WorkerMsg};
pub use world::{MoveOutcome, PhysicsWorld};

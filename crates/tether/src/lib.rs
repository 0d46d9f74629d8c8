//! # TETHER
//!
//! A lock-free bridge between a game's simulation/render thread and a
//! dedicated physics thread. The two threads share fixed-layout memory
//! regions (see `tether_shm`) and never block on each other: commands
//! flow one way through an SPSC ring, transforms come back through a
//! triple buffer, and discrete events and raycast answers ride their
//! own channels.
//!
//! ```no_run
//! use tether::{Tether, TetherConfig};
//! use tether_shm::{BodyDesc, ShapeParam};
//!
//! let mut tether = Tether::spawn(&TetherConfig::default())?;
//! tether.proxy.create_body(
//!     1,
//!     BodyDesc::dynamic(ShapeParam::Sphere { radius: 1.0 }, [0.0, 5.0, 0.0]),
//! );
//! // ... each frame:
//! tether.proxy.apply_snapshot(&mut |record: &tether_shm::BodyRecord| {
//!     // move the entity for record.phys_id
//!     let _ = record;
//! });
//! tether.shutdown()?;
//! # Ok::<(), tether::TetherError>(())
//! ```

pub mod config;
pub mod proxy;

use thiserror::Error;

use tether_physics::{PhysicsError, WorkerHandle};
use tether_shm::{RegionSet, ShmError};

pub use config::{ConfigError, TetherConfig};
pub use proxy::{PhysicsProxy, TransformSink};

/// Anything that can go wrong while standing the layer up or tearing it
/// down. Steady-state operation does not produce errors.
#[derive(Debug, Error)]
pub enum TetherError {
    /// Bad configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A shared region failed validation.
    #[error(transparent)]
    Shm(#[from] ShmError),

    /// The worker thread failed or the control plane closed.
    #[error(transparent)]
    Physics(#[from] PhysicsError),
}

/// The assembled layer: regions allocated, worker running, proxy
/// attached.
pub struct Tether {
    /// The simulation thread's handle to everything.
    pub proxy: PhysicsProxy,
    worker: WorkerHandle,
}

impl Tether {
    /// Allocates the shared regions, spawns the physics worker, runs the
    /// INIT handshake, and attaches the proxy.
    pub fn spawn(config: &TetherConfig) -> Result<Self, TetherError> {
        config.validate()?;
        let regions = RegionSet::allocate();
        let worker = WorkerHandle::spawn();
        worker.init(regions.clone(), config.to_physics())?;
        let proxy = PhysicsProxy::attach(&regions)?;
        tracing::info!(fixed_dt = config.fixed_dt, "tether layer up");
        Ok(Self { proxy, worker })
    }

    /// Drives one manual tick. Only useful when `free_run` is disabled;
    /// returns the number of fixed steps the worker executed.
    pub fn step(&self, elapsed: f32) -> Result<u32, TetherError> {
        Ok(self.worker.step(elapsed)?)
    }

    /// Sends DESTROY, waits for the worker to tear the world down, and
    /// joins the thread.
    pub fn shutdown(self) -> Result<(), TetherError> {
        self.worker.shutdown()?;
        Ok(())
    }
}

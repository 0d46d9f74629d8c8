//! Physics-side error taxonomy.
//!
//! Steady-state operation is infallible by design: full rings drop and
//! warn, bad commands are skipped. Errors here are confined to setup and
//! the control plane.

use thiserror::Error;

use tether_shm::ShmError;

/// Errors surfaced by the physics worker and its control plane.
#[derive(Debug, Error)]
pub enum PhysicsError {
    /// A shared region failed validation while attaching.
    #[error("shared region rejected at attach: {0}")]
    Shm(#[from] ShmError),

    /// The worker reported a failure during initialization.
    #[error("physics worker failed to initialize: {0}")]
    WorkerInit(String),

    /// The control-plane channel closed before a reply arrived, meaning
    /// the other side is gone.
    #[error("control-plane channel closed")]
    ControlPlaneClosed,
}

/// Convenience alias used throughout the physics crates.
pub type PhysicsResult<T> = Result<T, PhysicsError>;

//! # Shared-Memory Setup Errors
//!
//! Failures detected while validating a region against the protocol.
//! These are configuration errors: they happen once at setup, before any
//! channel traffic, and are fatal for the channel they concern. Capacity
//! and referential problems are NOT errors at this layer; they degrade to
//! logged drops and skips instead.

use thiserror::Error;

/// Errors raised while attaching a channel to a shared region.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShmError {
    /// The region is smaller than the channel layout requires.
    #[error("region too small: need {required} bytes, have {actual}")]
    RegionTooSmall {
        /// Bytes required by the channel layout.
        required: usize,
        /// Bytes actually present in the region.
        actual: usize,
    },

    /// The magic word does not match the protocol constant.
    #[error("bad magic: expected {expected:#010x}, found {found:#010x}")]
    BadMagic {
        /// Expected magic word.
        expected: u32,
        /// Magic word found in the region.
        found: u32,
    },

    /// The version word does not match the protocol constant.
    #[error("protocol version mismatch: expected {expected}, found {found}")]
    BadVersion {
        /// Expected protocol version.
        expected: u32,
        /// Version found in the region.
        found: u32,
    },
}

/// Result type for shared-memory setup operations.
pub type ShmResult<T> = Result<T, ShmError>;

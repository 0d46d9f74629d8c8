//! # Shared Regions
//!
//! A [`SharedRegion`] is a fixed block of 4-byte words shared by exactly
//! two threads. All channel protocols in this crate are built from three
//! primitives on it:
//!
//! - relaxed loads/stores for payload words,
//! - an acquire load of the publishing field on the reader side,
//! - a release store of the publishing field as the writer's LAST memory
//!   operation for a unit of work.
//!
//! That release/acquire pair on the publishing field is the sole
//! correctness invariant of the whole layer. There are no locks anywhere.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::error::{ShmError, ShmResult};
use crate::layout::{MAGIC, MAGIC_OFFSET, VERSION, VERSION_OFFSET};

/// A fixed-size shared memory region addressed by byte offset.
///
/// Allocated once at startup, never resized, and shared between the
/// simulation and physics threads via `Arc`. Every field the protocol
/// defines is a 4-byte-aligned word; floats are stored as raw bits.
pub struct SharedRegion {
    words: Box<[AtomicU32]>,
}

impl SharedRegion {
    /// Allocates a zeroed region of at least `bytes` bytes (rounded up to
    /// a whole word).
    #[must_use]
    pub fn alloc(bytes: usize) -> Arc<Self> {
        let words = bytes.div_ceil(4);
        let mut buf = Vec::with_capacity(words);
        buf.resize_with(words, || AtomicU32::new(0));
        Arc::new(Self {
            words: buf.into_boxed_slice(),
        })
    }

    /// Region length in bytes.
    #[must_use]
    pub fn len_bytes(&self) -> usize {
        self.words.len() * 4
    }

    #[inline]
    fn word(&self, offset: usize) -> &AtomicU32 {
        debug_assert_eq!(offset % 4, 0, "unaligned shared-memory access");
        &self.words[offset / 4]
    }

    /// Acquire-loads the word at `offset`.
    ///
    /// Use for publishing fields (head/tail/index/generation) on the
    /// reader side: payload words written before the matching release
    /// store are visible after this load.
    #[inline]
    #[must_use]
    pub fn load(&self, offset: usize) -> u32 {
        self.word(offset).load(Ordering::Acquire)
    }

    /// Release-stores the word at `offset`.
    ///
    /// Use for publishing fields on the writer side, AFTER all payload
    /// stores for the unit of work.
    #[inline]
    pub fn store(&self, offset: usize, value: u32) {
        self.word(offset).store(value, Ordering::Release);
    }

    /// Relaxed load for payload words and single-writer-owned fields.
    #[inline]
    #[must_use]
    pub fn load_relaxed(&self, offset: usize) -> u32 {
        self.word(offset).load(Ordering::Relaxed)
    }

    /// Relaxed store for payload words. Ordering is provided by the
    /// publishing field's release store, not by the payload itself.
    #[inline]
    pub fn store_relaxed(&self, offset: usize, value: u32) {
        self.word(offset).store(value, Ordering::Relaxed);
    }

    /// Relaxed load of an `f32` stored as raw bits.
    #[inline]
    #[must_use]
    pub fn load_f32(&self, offset: usize) -> f32 {
        f32::from_bits(self.load_relaxed(offset))
    }

    /// Relaxed store of an `f32` as raw bits.
    #[inline]
    pub fn store_f32(&self, offset: usize, value: f32) {
        self.store_relaxed(offset, value.to_bits());
    }

    /// Increments the counter at `offset` with release ordering and
    /// returns the NEW value. Wraps on overflow; readers compare for
    /// inequality, never for magnitude.
    #[inline]
    pub fn bump(&self, offset: usize) -> u32 {
        self.word(offset)
            .fetch_add(1, Ordering::Release)
            .wrapping_add(1)
    }
}

impl std::fmt::Debug for SharedRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedRegion")
            .field("len_bytes", &self.len_bytes())
            .finish()
    }
}

/// Stamps the protocol magic and version into a region.
///
/// Idempotent: safe to call repeatedly on the side that owns
/// initialization. Channel-specific indices are already zero from
/// allocation and are NOT reset here, so re-stamping a live channel does
/// not corrupt it.
pub fn init_header(region: &SharedRegion) {
    region.store_relaxed(MAGIC_OFFSET, MAGIC);
    region.store(VERSION_OFFSET, VERSION);
}

/// Validates a region's size and stamped header before any channel use.
///
/// A mismatch is a fatal configuration error for the channel: the caller
/// must not proceed to read or write slots.
pub fn validate_header(region: &SharedRegion, required_bytes: usize) -> ShmResult<()> {
    if region.len_bytes() < required_bytes {
        return Err(ShmError::RegionTooSmall {
            required: required_bytes,
            actual: region.len_bytes(),
        });
    }
    let magic = region.load(MAGIC_OFFSET);
    if magic != MAGIC {
        return Err(ShmError::BadMagic {
            expected: MAGIC,
            found: magic,
        });
    }
    let version = region.load(VERSION_OFFSET);
    if version != VERSION {
        return Err(ShmError::BadVersion {
            expected: VERSION,
            found: version,
        });
    }
    Ok(())
}

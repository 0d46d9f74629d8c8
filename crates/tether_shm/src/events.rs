//! # Event Channels
//!
//! Two independent SPSC rings carrying discrete physics occurrences out
//! to the simulation thread: collision events and character-controller
//! events. Same ring algorithm as the command channel with the direction
//! reversed; the full-ring drop policy applies unchanged, so consumers
//! must drain fully each tick.

use std::marker::PhantomData;
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};

use crate::error::ShmResult;
use crate::layout::{
    event_region_bytes, event_slot_offset, COLLISION_SLOT_BYTES, CONTROLLER_SLOT_BYTES,
    EVT_CAPACITY, EVT_GEN_OFFSET, EVT_HEAD_OFFSET, EVT_TAIL_OFFSET,
};
use crate::region::{validate_header, SharedRegion};

/// A fixed-width event payload that can live in a ring slot.
///
/// Implementations are plain `Pod` structs whose `#[repr(C)]` layout is
/// the wire format.
pub trait RingSlot: Copy + std::fmt::Debug {
    /// Slot width in bytes (whole words).
    const SLOT_BYTES: usize;

    /// Writes the payload at `base`. Payload stores are relaxed; ordering
    /// comes from the ring's HEAD publish.
    fn write(&self, region: &SharedRegion, base: usize);

    /// Reads the payload at `base`.
    fn read(region: &SharedRegion, base: usize) -> Self;
}

/// A collision between two mapped bodies.
///
/// "Ended" events (`started == 0`) stay in the protocol for
/// forward-compatibility even though gameplay currently reacts only to
/// "started".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct CollisionEvent {
    /// First colliding body.
    pub a_phys_id: u32,
    /// Second colliding body.
    pub b_phys_id: u32,
    /// 1 when contact started, 0 when it ended.
    pub started: u32,
}

impl CollisionEvent {
    /// True for contact-start events, the ones gameplay acts on.
    #[must_use]
    pub fn is_start(&self) -> bool {
        self.started != 0
    }
}

impl RingSlot for CollisionEvent {
    const SLOT_BYTES: usize = COLLISION_SLOT_BYTES;

    fn write(&self, region: &SharedRegion, base: usize) {
        let words: [u32; 3] = bytemuck::cast(*self);
        for (i, word) in words.iter().enumerate() {
            region.store_relaxed(base + i * 4, *word);
        }
    }

    fn read(region: &SharedRegion, base: usize) -> Self {
        let mut words = [0u32; 3];
        for (i, word) in words.iter_mut().enumerate() {
            *word = region.load_relaxed(base + i * 4);
        }
        bytemuck::cast(words)
    }
}

/// Character-controller event kinds.
pub mod controller_kind {
    /// The controller's grounded state changed; `value` is 0.0 or 1.0.
    pub const GROUNDED_CHANGED: u32 = 0;
}

/// A discrete character-controller occurrence.
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct ControllerEvent {
    /// Body whose controller produced the event.
    pub phys_id: u32,
    /// Event kind (see [`controller_kind`]).
    pub kind: u32,
    /// Kind-specific scalar.
    pub value: f32,
}

impl RingSlot for ControllerEvent {
    const SLOT_BYTES: usize = CONTROLLER_SLOT_BYTES;

    fn write(&self, region: &SharedRegion, base: usize) {
        let words: [u32; 3] = bytemuck::cast(*self);
        for (i, word) in words.iter().enumerate() {
            region.store_relaxed(base + i * 4, *word);
        }
    }

    fn read(region: &SharedRegion, base: usize) -> Self {
        let mut words = [0u32; 3];
        for (i, word) in words.iter_mut().enumerate() {
            *word = region.load_relaxed(base + i * 4);
        }
        bytemuck::cast(words)
    }
}

/// Size in bytes of the region backing an event ring of `T`.
#[must_use]
pub const fn region_bytes_for<T: RingSlot>() -> usize {
    event_region_bytes(T::SLOT_BYTES)
}

/// Producer end of an event ring. Owned by the physics thread.
pub struct EventProducer<T: RingSlot> {
    region: Arc<SharedRegion>,
    _slot: PhantomData<T>,
}

impl<T: RingSlot> EventProducer<T> {
    /// Attaches to an initialized event region.
    pub fn attach(region: Arc<SharedRegion>) -> ShmResult<Self> {
        validate_header(&region, region_bytes_for::<T>())?;
        Ok(Self {
            region,
            _slot: PhantomData,
        })
    }

    /// Pushes one event without blocking. A full ring drops the newest
    /// event with a warning, mirroring the command channel's policy.
    pub fn try_push(&self, event: &T) -> bool {
        let head = self.region.load(EVT_HEAD_OFFSET);
        let tail = self.region.load(EVT_TAIL_OFFSET);
        let next = (head + 1) % EVT_CAPACITY;
        if next == tail {
            tracing::warn!(?event, "event ring full, dropping event");
            return false;
        }

        event.write(&self.region, event_slot_offset(head, T::SLOT_BYTES));
        self.region.store(EVT_HEAD_OFFSET, next);
        self.region.bump(EVT_GEN_OFFSET);
        true
    }
}

/// Consumer end of an event ring. Owned by the simulation thread.
pub struct EventConsumer<T: RingSlot> {
    region: Arc<SharedRegion>,
    _slot: PhantomData<T>,
}

impl<T: RingSlot> EventConsumer<T> {
    /// Attaches to an initialized event region.
    pub fn attach(region: Arc<SharedRegion>) -> ShmResult<Self> {
        validate_header(&region, region_bytes_for::<T>())?;
        Ok(Self {
            region,
            _slot: PhantomData,
        })
    }

    /// Drains every pending event in FIFO order. Call once per frame;
    /// leaving events behind eventually forces the producer to drop.
    pub fn drain(&self, mut handle: impl FnMut(T)) -> u32 {
        let head = self.region.load(EVT_HEAD_OFFSET);
        let mut tail = self.region.load(EVT_TAIL_OFFSET);
        let mut handled = 0;

        while tail != head {
            handle(T::read(
                &self.region,
                event_slot_offset(tail, T::SLOT_BYTES),
            ));
            handled += 1;
            tail = (tail + 1) % EVT_CAPACITY;
            self.region.store(EVT_TAIL_OFFSET, tail);
        }
        handled
    }
}

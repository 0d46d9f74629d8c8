//! # Snapshot Channel
//!
//! Triple-buffered body-transform publication from the physics thread to
//! the simulation thread.
//!
//! ## Publish order
//!
//! The writer targets slot `(WRITE_INDEX + 1) % 3`, writes `COUNT = 0`,
//! then the records, then the final `COUNT`, then `WRITE_INDEX`, then
//! bumps `GEN` — in that order. A reader that samples `GEN` before
//! touching the slot can therefore never observe a half-written slot for
//! that generation. This ordering is the load-bearing invariant; do not
//! reorder it.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};

use crate::error::ShmResult;
use crate::layout::{
    snap_record_offset, snap_slot_offset, MAX_SNAPSHOT_BODIES, SNAP_GEN_OFFSET,
    SNAP_LAST_STEP_US_OFFSET, SNAP_READ_GEN_OFFSET, SNAP_REGION_BYTES, SNAP_SLOT_COUNT,
    SNAP_WRITE_INDEX_OFFSET,
};
use crate::region::{validate_header, SharedRegion};

/// One published body transform.
///
/// Fixed 36-byte wire record; the `Pod` layout IS the byte layout both
/// threads agree on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct BodyRecord {
    /// Physics id correlating this body to an application entity.
    pub phys_id: u32,
    /// World position.
    pub pos: [f32; 3],
    /// Orientation as a unit quaternion `[x, y, z, w]`.
    pub rot: [f32; 4],
    /// 1.0 when the body's character controller reports ground contact.
    pub grounded: f32,
}

impl BodyRecord {
    const WORDS: usize = 9;

    fn write(&self, region: &SharedRegion, base: usize) {
        let words: [u32; Self::WORDS] = bytemuck::cast(*self);
        for (i, word) in words.iter().enumerate() {
            region.store_relaxed(base + i * 4, *word);
        }
    }

    fn read(region: &SharedRegion, base: usize) -> Self {
        let mut words = [0u32; Self::WORDS];
        for (i, word) in words.iter_mut().enumerate() {
            *word = region.load_relaxed(base + i * 4);
        }
        bytemuck::cast(words)
    }
}

/// Producer end of the snapshot buffer. Owned by the physics thread.
pub struct SnapshotWriter {
    region: Arc<SharedRegion>,
}

impl SnapshotWriter {
    /// Attaches to an initialized snapshot region.
    pub fn attach(region: Arc<SharedRegion>) -> ShmResult<Self> {
        validate_header(&region, SNAP_REGION_BYTES)?;
        Ok(Self { region })
    }

    /// Publishes one snapshot and returns the new generation.
    ///
    /// Records beyond [`MAX_SNAPSHOT_BODIES`] are dropped with a warning;
    /// the channel never grows. `last_step_us` is a diagnostic mirror of
    /// the engine's step duration.
    pub fn publish<I>(&self, records: I, last_step_us: f32) -> u32
    where
        I: IntoIterator<Item = BodyRecord>,
    {
        let current = self.region.load_relaxed(SNAP_WRITE_INDEX_OFFSET);
        let target = (current + 1) % SNAP_SLOT_COUNT;
        let slot_base = snap_slot_offset(target);

        // COUNT = 0 first: a reader that somehow samples this slot
        // mid-write sees zero records rather than stale ones.
        self.region.store_relaxed(slot_base, 0);

        let mut count: u32 = 0;
        let mut dropped: u32 = 0;
        for record in records {
            if count < MAX_SNAPSHOT_BODIES {
                record.write(&self.region, snap_record_offset(target, count));
                count += 1;
            } else {
                dropped += 1;
            }
        }
        if dropped > 0 {
            tracing::warn!(dropped, "snapshot overflow, bodies not published");
        }

        // Publish order: COUNT, WRITE_INDEX, GEN.
        self.region.store_relaxed(slot_base, count);
        self.region.store(SNAP_WRITE_INDEX_OFFSET, target);
        let generation = self.region.bump(SNAP_GEN_OFFSET);
        self.region.store_relaxed(SNAP_READ_GEN_OFFSET, generation);
        self.region.store_f32(SNAP_LAST_STEP_US_OFFSET, last_step_us);
        generation
    }
}

/// Consumer end of the snapshot buffer. Owned by the simulation thread.
///
/// Remembers the last generation it consumed, so re-polling without an
/// intervening publish is a no-op.
pub struct SnapshotReader {
    region: Arc<SharedRegion>,
    last_gen: u32,
}

impl SnapshotReader {
    /// Attaches to an initialized snapshot region.
    pub fn attach(region: Arc<SharedRegion>) -> ShmResult<Self> {
        validate_header(&region, SNAP_REGION_BYTES)?;
        Ok(Self {
            region,
            last_gen: 0,
        })
    }

    /// Reads the newest snapshot if one was published since the last
    /// call, yielding each record to `apply`. Returns the consumed
    /// generation, or `None` when nothing new exists.
    pub fn poll(&mut self, mut apply: impl FnMut(&BodyRecord)) -> Option<u32> {
        let generation = self.region.load(SNAP_GEN_OFFSET);
        if generation == self.last_gen {
            return None;
        }
        self.last_gen = generation;

        let slot = self.region.load(SNAP_WRITE_INDEX_OFFSET);
        if slot >= SNAP_SLOT_COUNT {
            tracing::warn!(slot, "snapshot write index out of range, skipping");
            return None;
        }

        let count = self
            .region
            .load_relaxed(snap_slot_offset(slot))
            .min(MAX_SNAPSHOT_BODIES);
        for index in 0..count {
            let record = BodyRecord::read(&self.region, snap_record_offset(slot, index));
            apply(&record);
        }
        Some(generation)
    }

    /// Latest published generation (without consuming it).
    #[must_use]
    pub fn generation(&self) -> u32 {
        self.region.load(SNAP_GEN_OFFSET)
    }

    /// Duration of the physics thread's last fixed step in microseconds.
    #[must_use]
    pub fn last_step_us(&self) -> f32 {
        self.region.load_f32(SNAP_LAST_STEP_US_OFFSET)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> (SnapshotWriter, SnapshotReader) {
        let region = SharedRegion::alloc(SNAP_REGION_BYTES);
        crate::region::init_header(&region);
        (
            SnapshotWriter::attach(Arc::clone(&region)).unwrap(),
            SnapshotReader::attach(region).unwrap(),
        )
    }

    fn record(phys_id: u32, y: f32) -> BodyRecord {
        BodyRecord {
            phys_id,
            pos: [0.0, y, 0.0],
            rot: [0.0, 0.0, 0.0, 1.0],
            grounded: 0.0,
        }
    }

    #[test]
    fn record_layout_is_36_bytes() {
        assert_eq!(std::mem::size_of::<BodyRecord>(), 36);
    }

    #[test]
    fn publish_then_poll_sees_all_records() {
        let (writer, mut reader) = channel();
        let generation = writer.publish((0..10).map(|i| record(i, i as f32)), 120.0);
        assert_eq!(generation, 1);

        let mut seen = Vec::new();
        assert_eq!(reader.poll(|r| seen.push(*r)), Some(1));
        assert_eq!(seen.len(), 10);
        assert_eq!(seen[3], record(3, 3.0));
        assert_eq!(reader.last_step_us(), 120.0);
    }

    #[test]
    fn second_poll_without_publish_is_noop() {
        let (writer, mut reader) = channel();
        writer.publish([record(1, 1.0)], 0.0);
        assert!(reader.poll(|_| {}).is_some());
        assert_eq!(reader.poll(|_| panic!("no new snapshot")), None);
    }

    #[test]
    fn poll_sees_only_newest_snapshot() {
        let (writer, mut reader) = channel();
        writer.publish([record(1, 1.0)], 0.0);
        writer.publish([record(1, 2.0)], 0.0);
        writer.publish([record(1, 3.0)], 0.0);

        let mut seen = Vec::new();
        assert_eq!(reader.poll(|r| seen.push(*r)), Some(3));
        assert_eq!(seen, vec![record(1, 3.0)]);
    }

    #[test]
    fn writer_rotates_all_three_slots() {
        let (writer, mut reader) = channel();
        for i in 0..7 {
            writer.publish([record(9, i as f32)], 0.0);
            let mut y = None;
            reader.poll(|r| y = Some(r.pos[1]));
            assert_eq!(y, Some(i as f32));
        }
    }

    #[test]
    fn overflow_is_truncated() {
        let (writer, mut reader) = channel();
        writer.publish(
            (0..MAX_SNAPSHOT_BODIES + 50).map(|i| record(i, 0.0)),
            0.0,
        );
        let mut seen = 0;
        reader.poll(|_| seen += 1);
        assert_eq!(seen, MAX_SNAPSHOT_BODIES);
    }

    #[test]
    fn empty_snapshot_is_still_a_publish() {
        let (writer, mut reader) = channel();
        writer.publish(std::iter::empty(), 0.0);
        let mut seen = 0;
        assert_eq!(reader.poll(|_| seen += 1), Some(1));
        assert_eq!(seen, 0);
    }

    #[test]
    fn concurrent_publish_and_poll_never_tear() {
        let region = SharedRegion::alloc(SNAP_REGION_BYTES);
        crate::region::init_header(&region);
        let writer = SnapshotWriter::attach(Arc::clone(&region)).unwrap();
        let mut reader = SnapshotReader::attach(region).unwrap();

        // Every record in one generation carries the same marker value;
        // a torn read would mix markers from two generations.
        let producer = std::thread::spawn(move || {
            for marker in 1..2000u32 {
                writer.publish((0..32).map(|i| record(i, marker as f32)), 0.0);
            }
        });

        let mut checked = 0;
        let mut last_gen = 0;
        while checked < 200 {
            let mut markers = Vec::new();
            if let Some(generation) = reader.poll(|r| markers.push(r.pos[1])) {
                assert!(generation > last_gen, "generations must be monotonic");
                last_gen = generation;
                // The per-generation guarantee holds while the writer has
                // not published again; only then is the slot provably ours.
                if reader.generation() == generation {
                    assert!(
                        markers.windows(2).all(|w| w[0] == w[1]),
                        "torn snapshot: {markers:?}"
                    );
                    checked += 1;
                }
            }
            if last_gen >= 1999 {
                break;
            }
            std::hint::spin_loop();
        }
        producer.join().unwrap();
        assert!(checked > 0, "reader never observed a stable snapshot");
    }
}

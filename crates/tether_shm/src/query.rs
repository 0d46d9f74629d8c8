//! # Raycast Result Slots
//!
//! Single-slot, generation-stamped request/response areas. Unlike the
//! rings there is no queue: each new result overwrites the previous one,
//! and the protocol supports exactly one in-flight query per slot. The
//! requester correlates request to response purely by observing a GEN
//! change after issuing the request; when multiple requesters could
//! interleave it must also match `source_phys_id`.
//!
//! Publish order mirrors the snapshot channel: hit fields, then the
//! correlating source id, then the GEN bump LAST.

use std::sync::Arc;

use crate::error::ShmResult;
use crate::layout::{
    RAY_DISTANCE_OFFSET, RAY_GEN_OFFSET, RAY_HIT_ID_OFFSET, RAY_MISS, RAY_REGION_BYTES,
    RAY_SOURCE_ID_OFFSET,
};
use crate::region::{validate_header, SharedRegion};

/// A published raycast outcome.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RayHit {
    /// Physics id of the hit body; [`RAY_MISS`] (0) when nothing was hit.
    pub hit_phys_id: u32,
    /// Distance from the ray origin to the hit, in meters. Zero on miss.
    pub distance: f32,
    /// Physics id of the body that issued the query.
    pub source_phys_id: u32,
}

impl RayHit {
    /// True when the ray hit a mapped body.
    #[must_use]
    pub fn is_hit(&self) -> bool {
        self.hit_phys_id != RAY_MISS
    }
}

/// Writer end of a result slot. Owned by the physics thread.
pub struct RayResultWriter {
    region: Arc<SharedRegion>,
}

impl RayResultWriter {
    /// Attaches to an initialized result region.
    pub fn attach(region: Arc<SharedRegion>) -> ShmResult<Self> {
        validate_header(&region, RAY_REGION_BYTES)?;
        Ok(Self { region })
    }

    /// Publishes one result. A miss is a real publish: the sentinel hit
    /// id plus a GEN bump, never an omission.
    pub fn publish(&self, source_phys_id: u32, hit: Option<(u32, f32)>) {
        let (hit_id, distance) = hit.unwrap_or((RAY_MISS, 0.0));
        self.region.store_relaxed(RAY_HIT_ID_OFFSET, hit_id);
        self.region.store_f32(RAY_DISTANCE_OFFSET, distance);
        self.region.store_relaxed(RAY_SOURCE_ID_OFFSET, source_phys_id);
        self.region.bump(RAY_GEN_OFFSET);
    }
}

/// Reader end of a result slot. Owned by the simulation thread.
///
/// Reports each published result exactly once: re-polling without an
/// intervening publish yields `None`.
pub struct RayResultReader {
    region: Arc<SharedRegion>,
    last_gen: u32,
}

impl RayResultReader {
    /// Attaches to an initialized result region.
    pub fn attach(region: Arc<SharedRegion>) -> ShmResult<Self> {
        validate_header(&region, RAY_REGION_BYTES)?;
        Ok(Self {
            region,
            last_gen: 0,
        })
    }

    /// Returns the newest result if one was published since the last
    /// call. Callers re-issue queries every tick rather than awaiting a
    /// specific response.
    pub fn poll(&mut self) -> Option<RayHit> {
        let generation = self.region.load(RAY_GEN_OFFSET);
        if generation == self.last_gen {
            return None;
        }
        self.last_gen = generation;
        Some(RayHit {
            hit_phys_id: self.region.load_relaxed(RAY_HIT_ID_OFFSET),
            distance: self.region.load_f32(RAY_DISTANCE_OFFSET),
            source_phys_id: self.region.load_relaxed(RAY_SOURCE_ID_OFFSET),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot() -> (RayResultWriter, RayResultReader) {
        let region = SharedRegion::alloc(RAY_REGION_BYTES);
        crate::region::init_header(&region);
        (
            RayResultWriter::attach(Arc::clone(&region)).unwrap(),
            RayResultReader::attach(region).unwrap(),
        )
    }

    #[test]
    fn hit_is_reported_exactly_once() {
        let (writer, mut reader) = slot();
        assert_eq!(reader.poll(), None);

        writer.publish(42, Some((7, 4.5)));
        let hit = reader.poll().expect("result was published");
        assert!(hit.is_hit());
        assert_eq!(hit.hit_phys_id, 7);
        assert_eq!(hit.distance, 4.5);
        assert_eq!(hit.source_phys_id, 42);

        assert_eq!(reader.poll(), None);
    }

    #[test]
    fn miss_is_a_publish_not_an_omission() {
        let (writer, mut reader) = slot();
        writer.publish(42, None);
        let hit = reader.poll().expect("miss still bumps the generation");
        assert!(!hit.is_hit());
        assert_eq!(hit.hit_phys_id, RAY_MISS);
        assert_eq!(hit.distance, 0.0);
    }

    #[test]
    fn newer_result_overwrites_older() {
        let (writer, mut reader) = slot();
        writer.publish(1, Some((10, 1.0)));
        writer.publish(2, Some((20, 2.0)));
        let hit = reader.poll().unwrap();
        assert_eq!(hit.hit_phys_id, 20);
        assert_eq!(hit.source_phys_id, 2);
        assert_eq!(reader.poll(), None);
    }
}

//! # Channel Layouts
//!
//! Byte-exact offsets and sizes for every shared-memory channel.
//!
//! These constants ARE the wire format: both threads index the same region
//! with them, so a change here is a protocol break and must bump
//! [`VERSION`]. All header fields are 4-byte-aligned `u32` words; floats
//! cross the boundary as raw `f32` bits.

// ============================================================================
// COMMON HEADER
// ============================================================================

/// Protocol magic stamped at offset 0 of every region ("TETH").
pub const MAGIC: u32 = 0x5445_5448;

/// Protocol version stamped at offset 4 of every region.
pub const VERSION: u32 = 1;

/// Byte offset of the magic word.
pub const MAGIC_OFFSET: usize = 0;

/// Byte offset of the version word.
pub const VERSION_OFFSET: usize = 4;

// ============================================================================
// COMMAND RING (simulation -> physics)
// ============================================================================

/// Next write slot, advanced only by the producer.
pub const CMD_HEAD_OFFSET: usize = 8;

/// Next read slot, advanced only by the consumer.
pub const CMD_TAIL_OFFSET: usize = 12;

/// Monotonic enqueue counter (observability only, never read for control).
pub const CMD_GEN_OFFSET: usize = 16;

/// First command slot.
pub const CMD_SLOTS_OFFSET: usize = 24;

/// Number of slots in the command ring. One slot is always kept empty to
/// distinguish full from empty, so usable capacity is `CMD_CAPACITY - 1`.
pub const CMD_CAPACITY: u32 = 256;

/// Fixed number of `f32` parameters carried by every command slot.
/// Unused parameters are zero-padded.
pub const CMD_PARAM_FLOATS: usize = 16;

/// Slot header: `TYPE:u32` + `PHYS_ID:u32`.
pub const CMD_SLOT_HEADER_BYTES: usize = 8;

/// Total size of one command slot in bytes.
pub const CMD_SLOT_BYTES: usize = CMD_SLOT_HEADER_BYTES + CMD_PARAM_FLOATS * 4;

/// Total size of the command region in bytes.
pub const CMD_REGION_BYTES: usize = CMD_SLOTS_OFFSET + CMD_CAPACITY as usize * CMD_SLOT_BYTES;

/// Byte offset of command slot `index`.
#[inline]
#[must_use]
pub const fn cmd_slot_offset(index: u32) -> usize {
    CMD_SLOTS_OFFSET + index as usize * CMD_SLOT_BYTES
}

// ============================================================================
// SNAPSHOT TRIPLE BUFFER (physics -> simulation)
// ============================================================================

/// Slot the physics thread will write NEXT (0..2).
pub const SNAP_WRITE_INDEX_OFFSET: usize = 8;

/// Mirror of [`SNAP_GEN_OFFSET`] taken at publish time, for diagnostics.
pub const SNAP_READ_GEN_OFFSET: usize = 12;

/// Global publish counter. A reader re-processes a snapshot only when this
/// differs from the last value it consumed.
pub const SNAP_GEN_OFFSET: usize = 16;

/// Duration of the last fixed step in microseconds, as `f32` bits.
pub const SNAP_LAST_STEP_US_OFFSET: usize = 20;

/// First snapshot slot.
pub const SNAP_SLOTS_OFFSET: usize = 24;

/// Number of snapshot slots (triple buffering).
pub const SNAP_SLOT_COUNT: u32 = 3;

/// Maximum number of body records one snapshot slot can hold.
pub const MAX_SNAPSHOT_BODIES: u32 = 1024;

/// One body record: `id:u32, pos:f32*3, rot:f32*4, grounded:f32`.
pub const BODY_RECORD_BYTES: usize = 36;

/// One snapshot slot: `COUNT:u32` followed by the record array.
pub const SNAP_SLOT_BYTES: usize = 4 + MAX_SNAPSHOT_BODIES as usize * BODY_RECORD_BYTES;

/// Total size of the snapshot region in bytes.
pub const SNAP_REGION_BYTES: usize =
    SNAP_SLOTS_OFFSET + SNAP_SLOT_COUNT as usize * SNAP_SLOT_BYTES;

/// Byte offset of the `COUNT` field of snapshot slot `slot`.
#[inline]
#[must_use]
pub const fn snap_slot_offset(slot: u32) -> usize {
    SNAP_SLOTS_OFFSET + slot as usize * SNAP_SLOT_BYTES
}

/// Byte offset of body record `index` inside snapshot slot `slot`.
#[inline]
#[must_use]
pub const fn snap_record_offset(slot: u32, index: u32) -> usize {
    snap_slot_offset(slot) + 4 + index as usize * BODY_RECORD_BYTES
}

// ============================================================================
// EVENT RINGS (physics -> simulation)
// ============================================================================
// Collision and controller events use the same ring header as the command
// ring, with direction reversed and a channel-specific slot payload.

/// Next write slot, advanced only by the producer (physics).
pub const EVT_HEAD_OFFSET: usize = 8;

/// Next read slot, advanced only by the consumer (simulation).
pub const EVT_TAIL_OFFSET: usize = 12;

/// Monotonic publish counter (observability only).
pub const EVT_GEN_OFFSET: usize = 16;

/// First event slot.
pub const EVT_SLOTS_OFFSET: usize = 24;

/// Number of slots per event ring (usable capacity is one less).
pub const EVT_CAPACITY: u32 = 256;

/// Collision slot: `a_phys_id:u32, b_phys_id:u32, started:u32`.
pub const COLLISION_SLOT_BYTES: usize = 12;

/// Controller slot: `phys_id:u32, kind:u32, value:f32`.
pub const CONTROLLER_SLOT_BYTES: usize = 12;

/// Size of an event region whose slots are `slot_bytes` wide.
#[inline]
#[must_use]
pub const fn event_region_bytes(slot_bytes: usize) -> usize {
    EVT_SLOTS_OFFSET + EVT_CAPACITY as usize * slot_bytes
}

/// Byte offset of event slot `index` for slots `slot_bytes` wide.
#[inline]
#[must_use]
pub const fn event_slot_offset(index: u32, slot_bytes: usize) -> usize {
    EVT_SLOTS_OFFSET + index as usize * slot_bytes
}

// ============================================================================
// RAYCAST RESULT SLOTS (physics -> simulation, single record)
// ============================================================================

/// Generation counter, bumped LAST on every write.
pub const RAY_GEN_OFFSET: usize = 8;

/// Physics id of the hit body; [`RAY_MISS`] on a miss.
pub const RAY_HIT_ID_OFFSET: usize = 12;

/// Hit distance along the ray as `f32` bits.
pub const RAY_DISTANCE_OFFSET: usize = 16;

/// Physics id of the body that issued the query.
pub const RAY_SOURCE_ID_OFFSET: usize = 20;

/// Total size of a raycast result region in bytes.
pub const RAY_REGION_BYTES: usize = 24;

/// Sentinel hit id meaning "no hit". A miss is still a publish: the
/// generation counter bumps so the requester can observe completion.
pub const RAY_MISS: u32 = 0;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_words_are_aligned() {
        for offset in [
            MAGIC_OFFSET,
            VERSION_OFFSET,
            CMD_HEAD_OFFSET,
            CMD_TAIL_OFFSET,
            CMD_GEN_OFFSET,
            CMD_SLOTS_OFFSET,
            SNAP_WRITE_INDEX_OFFSET,
            SNAP_GEN_OFFSET,
            SNAP_SLOTS_OFFSET,
            EVT_SLOTS_OFFSET,
            RAY_GEN_OFFSET,
            RAY_SOURCE_ID_OFFSET,
        ] {
            assert_eq!(offset % 4, 0, "offset {offset} is not word aligned");
        }
    }

    #[test]
    fn command_slot_is_fixed_width() {
        assert_eq!(CMD_SLOT_BYTES, 72);
        assert_eq!(cmd_slot_offset(0), 24);
        assert_eq!(cmd_slot_offset(1), 24 + 72);
    }

    #[test]
    fn snapshot_slots_do_not_overlap() {
        assert_eq!(BODY_RECORD_BYTES % 4, 0);
        let end_of_first = snap_record_offset(0, MAX_SNAPSHOT_BODIES - 1) + BODY_RECORD_BYTES;
        assert!(end_of_first <= snap_slot_offset(1));
        let end_of_last = snap_record_offset(2, MAX_SNAPSHOT_BODIES - 1) + BODY_RECORD_BYTES;
        assert_eq!(end_of_last, SNAP_REGION_BYTES);
    }

    #[test]
    fn event_regions_cover_all_slots() {
        let bytes = event_region_bytes(COLLISION_SLOT_BYTES);
        let last = event_slot_offset(EVT_CAPACITY - 1, COLLISION_SLOT_BYTES);
        assert_eq!(last + COLLISION_SLOT_BYTES, bytes);
    }
}

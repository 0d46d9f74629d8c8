//! # Command Channel
//!
//! Single-producer/single-consumer ring carrying typed commands from the
//! simulation thread to the physics thread.
//!
//! ## Ring discipline
//!
//! ```text
//!          HEAD (producer)                TAIL (consumer)
//!            │                               │
//!   ┌────┬───▼┬────┬────┬────┬────┬────┬────▼┬────┐
//!   │ .. │free│full│full│full│full│full│full │ .. │
//!   └────┴────┴────┴────┴────┴────┴────┴─────┴────┘
//! ```
//!
//! The ring is full exactly when `(HEAD + 1) % CAPACITY == TAIL`. The
//! producer never writes past that point: a command enqueued into a full
//! ring is dropped with a warning, which is accepted lossy-channel
//! behavior, not an error. A slot's payload is fully written before HEAD
//! advances, so the consumer trusts any slot in `[TAIL, HEAD)`.

use std::sync::Arc;

use crate::error::ShmResult;
use crate::layout::{
    cmd_slot_offset, CMD_CAPACITY, CMD_GEN_OFFSET, CMD_HEAD_OFFSET, CMD_PARAM_FLOATS,
    CMD_REGION_BYTES, CMD_TAIL_OFFSET,
};
use crate::region::{validate_header, SharedRegion};

/// Raw command type words. Only this module maps between raw values and
/// the typed [`Command`] enum; everything past the boundary is typed.
mod raw {
    pub const CREATE_BODY: u32 = 1;
    pub const DESTROY_BODY: u32 = 2;
    pub const MOVE_PLAYER: u32 = 3;
    pub const WEAPON_RAYCAST: u32 = 4;
    pub const INTERACT_RAYCAST: u32 = 5;
}

/// Rigid-body kind requested by a create command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BodyKind {
    /// Fully simulated body, affected by gravity and contacts.
    Dynamic,
    /// Immovable body (world geometry).
    Fixed,
    /// Position-driven body (character controllers).
    Kinematic,
}

impl BodyKind {
    /// Decodes a raw kind word. Unknown values fall back to [`Self::Dynamic`]
    /// with a warning: leniency is deliberate at this boundary.
    #[must_use]
    pub fn from_raw(value: u32) -> Self {
        match value {
            0 => Self::Dynamic,
            1 => Self::Fixed,
            2 => Self::Kinematic,
            other => {
                tracing::warn!(kind = other, "unknown body kind, defaulting to dynamic");
                Self::Dynamic
            }
        }
    }

    #[must_use]
    fn to_raw(self) -> u32 {
        match self {
            Self::Dynamic => 0,
            Self::Fixed => 1,
            Self::Kinematic => 2,
        }
    }
}

/// Collider shape requested by a create command.
///
/// Unlike [`BodyKind`], an unrecognized shape does NOT fall back to a
/// default: a body without a valid collider is invalid, so the consumer
/// rolls the create back. [`Self::Invalid`] carries that decision across
/// the decode boundary.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ShapeParam {
    /// Ball with the given radius.
    Sphere {
        /// Radius in meters.
        radius: f32,
    },
    /// Axis-aligned box with the given half extents.
    Cuboid {
        /// Half extents in meters.
        half_extents: [f32; 3],
    },
    /// Y-aligned capsule.
    Capsule {
        /// Half height of the cylindrical part in meters.
        half_height: f32,
        /// Radius in meters.
        radius: f32,
    },
    /// Unrecognized shape word; the create must be discarded.
    Invalid,
}

impl ShapeParam {
    fn from_raw(value: u32, dims: [f32; 3]) -> Self {
        match value {
            0 => Self::Sphere { radius: dims[0] },
            1 => Self::Cuboid { half_extents: dims },
            2 => Self::Capsule {
                half_height: dims[0],
                radius: dims[1],
            },
            _ => Self::Invalid,
        }
    }

    fn to_raw(self) -> (u32, [f32; 3]) {
        match self {
            Self::Sphere { radius } => (0, [radius, 0.0, 0.0]),
            Self::Cuboid { half_extents } => (1, half_extents),
            Self::Capsule {
                half_height,
                radius,
            } => (2, [half_height, radius, 0.0]),
            // Encoded only by tests that exercise the rollback path.
            Self::Invalid => (u32::MAX, [0.0; 3]),
        }
    }
}

/// Everything needed to create one physics body.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BodyDesc {
    /// Body kind.
    pub kind: BodyKind,
    /// Collider shape.
    pub shape: ShapeParam,
    /// Initial position.
    pub pos: [f32; 3],
    /// Initial orientation as a unit quaternion `[x, y, z, w]`.
    pub rot: [f32; 4],
    /// Initial linear velocity (dynamic bodies only).
    pub linvel: [f32; 3],
    /// Attach a character controller to this body.
    pub controller: bool,
}

impl BodyDesc {
    /// A dynamic body at rest with identity orientation.
    #[must_use]
    pub fn dynamic(shape: ShapeParam, pos: [f32; 3]) -> Self {
        Self {
            kind: BodyKind::Dynamic,
            shape,
            pos,
            rot: [0.0, 0.0, 0.0, 1.0],
            linvel: [0.0; 3],
            controller: false,
        }
    }

    /// A fixed body (world geometry) with identity orientation.
    #[must_use]
    pub fn fixed(shape: ShapeParam, pos: [f32; 3]) -> Self {
        Self {
            kind: BodyKind::Fixed,
            shape,
            pos,
            rot: [0.0, 0.0, 0.0, 1.0],
            linvel: [0.0; 3],
            controller: false,
        }
    }

    /// A kinematic body with an attached character controller.
    #[must_use]
    pub fn player(shape: ShapeParam, pos: [f32; 3]) -> Self {
        Self {
            kind: BodyKind::Kinematic,
            shape,
            pos,
            rot: [0.0, 0.0, 0.0, 1.0],
            linvel: [0.0; 3],
            controller: true,
        }
    }
}

/// Parameters shared by both raycast command kinds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RayParams {
    /// Ray origin.
    pub origin: [f32; 3],
    /// Ray direction (need not be normalized; the consumer normalizes).
    pub dir: [f32; 3],
    /// Maximum hit distance in meters.
    pub max_distance: f32,
}

/// Typed commands carried by the ring.
///
/// `phys_id` correlates a simulation body with an application entity; the
/// physics thread owns the id-to-handle maps.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Command {
    /// Create a body with the given id.
    CreateBody {
        /// Physics id of the new body.
        phys_id: u32,
        /// Body parameters.
        desc: BodyDesc,
    },
    /// Destroy the body with the given id.
    DestroyBody {
        /// Physics id of the body to remove.
        phys_id: u32,
    },
    /// Apply a desired displacement to a player's character controller.
    MovePlayer {
        /// Physics id of the controlled body.
        phys_id: u32,
        /// Desired displacement for this tick in meters.
        displacement: [f32; 3],
    },
    /// Weapon raycast; the requester's own body is excluded from hits.
    WeaponRaycast {
        /// Physics id of the requesting body.
        source_phys_id: u32,
        /// Ray parameters.
        ray: RayParams,
    },
    /// Interaction raycast (shorter intended range, separate result slot).
    InteractRaycast {
        /// Physics id of the requesting body.
        source_phys_id: u32,
        /// Ray parameters.
        ray: RayParams,
    },
}

impl Command {
    /// Encodes into the fixed slot format: type word, id word, and a
    /// zero-padded parameter block.
    #[must_use]
    pub fn encode(&self) -> (u32, u32, [f32; CMD_PARAM_FLOATS]) {
        let mut p = [0.0f32; CMD_PARAM_FLOATS];
        match *self {
            Self::CreateBody { phys_id, desc } => {
                let (shape_raw, dims) = desc.shape.to_raw();
                p[0] = desc.kind.to_raw() as f32;
                p[1] = shape_raw as f32;
                p[2..5].copy_from_slice(&dims);
                p[5..8].copy_from_slice(&desc.pos);
                p[8..12].copy_from_slice(&desc.rot);
                p[12..15].copy_from_slice(&desc.linvel);
                p[15] = if desc.controller { 1.0 } else { 0.0 };
                (raw::CREATE_BODY, phys_id, p)
            }
            Self::DestroyBody { phys_id } => (raw::DESTROY_BODY, phys_id, p),
            Self::MovePlayer {
                phys_id,
                displacement,
            } => {
                p[0..3].copy_from_slice(&displacement);
                (raw::MOVE_PLAYER, phys_id, p)
            }
            Self::WeaponRaycast {
                source_phys_id,
                ray,
            } => {
                p[0..3].copy_from_slice(&ray.origin);
                p[3..6].copy_from_slice(&ray.dir);
                p[6] = ray.max_distance;
                (raw::WEAPON_RAYCAST, source_phys_id, p)
            }
            Self::InteractRaycast {
                source_phys_id,
                ray,
            } => {
                p[0..3].copy_from_slice(&ray.origin);
                p[3..6].copy_from_slice(&ray.dir);
                p[6] = ray.max_distance;
                (raw::INTERACT_RAYCAST, source_phys_id, p)
            }
        }
    }

    /// Decodes a raw slot. Returns `None` for an unknown type word; the
    /// consumer skips such slots rather than crashing.
    #[must_use]
    pub fn decode(ty: u32, phys_id: u32, p: &[f32; CMD_PARAM_FLOATS]) -> Option<Self> {
        match ty {
            raw::CREATE_BODY => Some(Self::CreateBody {
                phys_id,
                desc: BodyDesc {
                    kind: BodyKind::from_raw(p[0] as u32),
                    shape: ShapeParam::from_raw(p[1] as u32, [p[2], p[3], p[4]]),
                    pos: [p[5], p[6], p[7]],
                    rot: [p[8], p[9], p[10], p[11]],
                    linvel: [p[12], p[13], p[14]],
                    controller: p[15] != 0.0,
                },
            }),
            raw::DESTROY_BODY => Some(Self::DestroyBody { phys_id }),
            raw::MOVE_PLAYER => Some(Self::MovePlayer {
                phys_id,
                displacement: [p[0], p[1], p[2]],
            }),
            raw::WEAPON_RAYCAST => Some(Self::WeaponRaycast {
                source_phys_id: phys_id,
                ray: RayParams {
                    origin: [p[0], p[1], p[2]],
                    dir: [p[3], p[4], p[5]],
                    max_distance: p[6],
                },
            }),
            raw::INTERACT_RAYCAST => Some(Self::InteractRaycast {
                source_phys_id: phys_id,
                ray: RayParams {
                    origin: [p[0], p[1], p[2]],
                    dir: [p[3], p[4], p[5]],
                    max_distance: p[6],
                },
            }),
            _ => None,
        }
    }
}

/// Producer end of the command ring. Owned by the simulation thread.
pub struct CommandWriter {
    region: Arc<SharedRegion>,
}

impl CommandWriter {
    /// Attaches to an initialized command region.
    pub fn attach(region: Arc<SharedRegion>) -> ShmResult<Self> {
        validate_header(&region, CMD_REGION_BYTES)?;
        Ok(Self { region })
    }

    /// Enqueues one command without blocking.
    ///
    /// Returns `false` and leaves the ring untouched when full. Dropping
    /// the newest command is the channel's only back-pressure.
    pub fn try_enqueue(&self, command: &Command) -> bool {
        let head = self.region.load(CMD_HEAD_OFFSET);
        let tail = self.region.load(CMD_TAIL_OFFSET);
        let next = (head + 1) % CMD_CAPACITY;
        if next == tail {
            tracing::warn!(?command, "command ring full, dropping command");
            return false;
        }

        let base = cmd_slot_offset(head);
        let (ty, phys_id, params) = command.encode();
        self.region.store_relaxed(base, ty);
        self.region.store_relaxed(base + 4, phys_id);
        for (i, value) in params.iter().enumerate() {
            self.region.store_f32(base + 8 + i * 4, *value);
        }

        // Publish: payload first, then HEAD. GEN is observability only.
        self.region.store(CMD_HEAD_OFFSET, next);
        self.region.bump(CMD_GEN_OFFSET);
        true
    }

    /// Number of slots that can still be enqueued before the ring is full.
    #[must_use]
    pub fn free_slots(&self) -> u32 {
        let head = self.region.load(CMD_HEAD_OFFSET);
        let tail = self.region.load(CMD_TAIL_OFFSET);
        (tail + CMD_CAPACITY - head - 1) % CMD_CAPACITY
    }
}

/// Consumer end of the command ring. Owned by the physics thread.
pub struct CommandReader {
    region: Arc<SharedRegion>,
}

impl CommandReader {
    /// Attaches to an initialized command region.
    pub fn attach(region: Arc<SharedRegion>) -> ShmResult<Self> {
        validate_header(&region, CMD_REGION_BYTES)?;
        Ok(Self { region })
    }

    /// Drains every pending command in FIFO order, dispatching each to
    /// `dispatch`. Returns the number of commands handled.
    ///
    /// Slots with an unknown type word are skipped with a warning.
    pub fn drain(&self, mut dispatch: impl FnMut(Command)) -> u32 {
        let head = self.region.load(CMD_HEAD_OFFSET);
        let mut tail = self.region.load(CMD_TAIL_OFFSET);
        let mut handled = 0;

        while tail != head {
            let base = cmd_slot_offset(tail);
            let ty = self.region.load_relaxed(base);
            let phys_id = self.region.load_relaxed(base + 4);
            let mut params = [0.0f32; CMD_PARAM_FLOATS];
            for (i, value) in params.iter_mut().enumerate() {
                *value = self.region.load_f32(base + 8 + i * 4);
            }

            match Command::decode(ty, phys_id, &params) {
                Some(command) => {
                    dispatch(command);
                    handled += 1;
                }
                None => tracing::warn!(ty, phys_id, "unknown command type, skipping slot"),
            }

            tail = (tail + 1) % CMD_CAPACITY;
            self.region.store(CMD_TAIL_OFFSET, tail);
        }
        handled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring() -> (CommandWriter, CommandReader) {
        let region = SharedRegion::alloc(CMD_REGION_BYTES);
        crate::region::init_header(&region);
        (
            CommandWriter::attach(Arc::clone(&region)).unwrap(),
            CommandReader::attach(region).unwrap(),
        )
    }

    fn destroy(phys_id: u32) -> Command {
        Command::DestroyBody { phys_id }
    }

    #[test]
    fn attach_rejects_unstamped_region() {
        let region = SharedRegion::alloc(CMD_REGION_BYTES);
        assert!(CommandWriter::attach(region).is_err());
    }

    #[test]
    fn fifo_exactly_once() {
        let (writer, reader) = ring();
        for id in 0..100 {
            assert!(writer.try_enqueue(&destroy(id)));
        }
        let mut seen = Vec::new();
        reader.drain(|cmd| seen.push(cmd));
        assert_eq!(seen.len(), 100);
        for (i, cmd) in seen.iter().enumerate() {
            assert_eq!(*cmd, destroy(i as u32));
        }
        // A second drain observes nothing.
        assert_eq!(reader.drain(|_| panic!("ring should be empty")), 0);
    }

    #[test]
    fn full_ring_drops_newest_and_preserves_indices() {
        let (writer, reader) = ring();
        // Usable capacity is CMD_CAPACITY - 1.
        for id in 0..CMD_CAPACITY - 2 {
            assert!(writer.try_enqueue(&destroy(id)));
        }
        assert_eq!(writer.free_slots(), 1);
        assert!(writer.try_enqueue(&destroy(9998)));
        assert_eq!(writer.free_slots(), 0);
        assert!(!writer.try_enqueue(&destroy(9999)));
        assert!(!writer.try_enqueue(&destroy(9999)));

        let mut seen = Vec::new();
        reader.drain(|cmd| seen.push(cmd));
        assert_eq!(seen.len(), (CMD_CAPACITY - 1) as usize);
        assert_eq!(seen[0], destroy(0));
        assert_eq!(*seen.last().unwrap(), destroy(9998));
    }

    #[test]
    fn wraps_across_ring_boundary() {
        let (writer, reader) = ring();
        let mut expected = 0u32;
        // Push/drain in chunks so head and tail lap the ring several times.
        for chunk in 0..20 {
            for i in 0..100 {
                assert!(writer.try_enqueue(&destroy(chunk * 100 + i)));
            }
            reader.drain(|cmd| {
                assert_eq!(cmd, destroy(expected));
                expected += 1;
            });
        }
        assert_eq!(expected, 2000);
    }

    #[test]
    fn create_body_round_trips() {
        let (writer, reader) = ring();
        let cmd = Command::CreateBody {
            phys_id: 42,
            desc: BodyDesc {
                kind: BodyKind::Kinematic,
                shape: ShapeParam::Capsule {
                    half_height: 0.9,
                    radius: 0.4,
                },
                pos: [1.0, 2.0, 3.0],
                rot: [0.0, 0.7071, 0.0, 0.7071],
                linvel: [0.0, -1.0, 0.0],
                controller: true,
            },
        };
        assert!(writer.try_enqueue(&cmd));
        let mut seen = None;
        reader.drain(|c| seen = Some(c));
        assert_eq!(seen, Some(cmd));
    }

    #[test]
    fn raycast_round_trips() {
        let (writer, reader) = ring();
        let cmd = Command::WeaponRaycast {
            source_phys_id: 7,
            ray: RayParams {
                origin: [0.0, 5.0, 0.0],
                dir: [0.0, -1.0, 0.0],
                max_distance: 100.0,
            },
        };
        assert!(writer.try_enqueue(&cmd));
        let mut seen = None;
        reader.drain(|c| seen = Some(c));
        assert_eq!(seen, Some(cmd));
    }

    #[test]
    fn unknown_body_kind_falls_back_to_dynamic() {
        assert_eq!(BodyKind::from_raw(77), BodyKind::Dynamic);
    }

    #[test]
    fn unknown_shape_decodes_to_invalid() {
        let desc = BodyDesc {
            shape: ShapeParam::Invalid,
            ..BodyDesc::dynamic(ShapeParam::Sphere { radius: 1.0 }, [0.0; 3])
        };
        let (ty, id, p) = Command::CreateBody { phys_id: 1, desc }.encode();
        match Command::decode(ty, id, &p) {
            Some(Command::CreateBody { desc, .. }) => {
                assert_eq!(desc.shape, ShapeParam::Invalid);
            }
            other => panic!("unexpected decode: {other:?}"),
        }
    }

    #[test]
    fn unknown_command_type_is_skipped() {
        let region = SharedRegion::alloc(CMD_REGION_BYTES);
        crate::region::init_header(&region);
        let writer = CommandWriter::attach(Arc::clone(&region)).unwrap();
        let reader = CommandReader::attach(Arc::clone(&region)).unwrap();
        assert!(writer.try_enqueue(&destroy(1)));
        assert!(writer.try_enqueue(&destroy(2)));
        // Corrupt the type word of the first pending slot.
        region.store_relaxed(cmd_slot_offset(0), 0xDEAD);
        let mut seen = Vec::new();
        assert_eq!(reader.drain(|cmd| seen.push(cmd)), 1);
        assert_eq!(seen, vec![destroy(2)]);
    }

    #[test]
    fn cross_thread_fifo() {
        let region = SharedRegion::alloc(CMD_REGION_BYTES);
        crate::region::init_header(&region);
        let writer = CommandWriter::attach(Arc::clone(&region)).unwrap();
        let reader = CommandReader::attach(region).unwrap();

        const TOTAL: u32 = 100_000;
        let producer = std::thread::spawn(move || {
            let mut id = 0;
            while id < TOTAL {
                if writer.try_enqueue(&Command::DestroyBody { phys_id: id }) {
                    id += 1;
                } else {
                    std::hint::spin_loop();
                }
            }
        });

        let mut expected = 0u32;
        while expected < TOTAL {
            reader.drain(|cmd| {
                assert_eq!(cmd, Command::DestroyBody { phys_id: expected });
                expected += 1;
            });
            std::hint::spin_loop();
        }
        producer.join().unwrap();
        assert_eq!(expected, TOTAL);
    }
}

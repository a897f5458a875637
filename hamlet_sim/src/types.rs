// Core types shared across the settlement construction system.
//
// Defines world coordinates (`VoxelCoord`, `ChunkCoord`), entity identifiers
// (strongly-typed UUID v4 wrappers), and the block/item vocabulary
// (`BlockId`, `BlockState`). All types derive `Serialize` and `Deserialize`
// for save/load.
//
// `VoxelCoord` also knows the 64-bit packed layout used by the persisted
// settlement records (26 bits x, 26 bits z, 12 bits y, all two's-complement),
// which is the same packing the host world uses for block positions.
//
// `BlockId::is_air()` is the single authority on what counts as "nothing".
// The ledger, the scheduler, and template loading all defer to it so legacy
// data that recorded air entries is filtered the same way everywhere.
//
// **Critical constraint: determinism.** Entity IDs are generated from the
// sim's `GameRng` (see `prng.rs`). Do not use external UUID libraries or OS
// entropy.

use crate::prng::GameRng;
use crate::rotation::Rotation;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// Spatial types
// ---------------------------------------------------------------------------

/// A block position in the world. Each component is in block units.
///
/// - X: east  (positive) / west  (negative)
/// - Y: up    (positive) / down  (negative)
/// - Z: south (positive) / north (negative)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VoxelCoord {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

const PACKED_XZ_BITS: u32 = 26;
const PACKED_Y_BITS: u32 = 12;
const PACKED_XZ_MASK: i64 = (1 << PACKED_XZ_BITS) - 1;
const PACKED_Y_MASK: i64 = (1 << PACKED_Y_BITS) - 1;
const PACKED_X_SHIFT: u32 = PACKED_Y_BITS + PACKED_XZ_BITS;
const PACKED_Z_SHIFT: u32 = PACKED_Y_BITS;

impl VoxelCoord {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Component-wise sum.
    pub const fn offset(self, other: Self) -> Self {
        Self::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }

    /// Squared Euclidean distance. Computed in `i64` so settlement-scale
    /// coordinates cannot overflow.
    pub fn distance_squared(self, other: Self) -> i64 {
        let dx = (self.x - other.x) as i64;
        let dy = (self.y - other.y) as i64;
        let dz = (self.z - other.z) as i64;
        dx * dx + dy * dy + dz * dz
    }

    /// The chunk column containing this position.
    pub fn chunk(self) -> ChunkCoord {
        ChunkCoord::containing(self)
    }

    /// Pack into the 64-bit persisted layout.
    pub fn pack(self) -> i64 {
        ((self.x as i64 & PACKED_XZ_MASK) << PACKED_X_SHIFT)
            | ((self.z as i64 & PACKED_XZ_MASK) << PACKED_Z_SHIFT)
            | (self.y as i64 & PACKED_Y_MASK)
    }

    /// Inverse of [`VoxelCoord::pack`]. Arithmetic shifts restore the sign
    /// of each field.
    pub fn unpack(packed: i64) -> Self {
        let x = packed >> PACKED_X_SHIFT;
        let z = (packed << (64 - PACKED_X_SHIFT)) >> (64 - PACKED_XZ_BITS);
        let y = (packed << (64 - PACKED_Y_BITS)) >> (64 - PACKED_Y_BITS);
        Self::new(x as i32, y as i32, z as i32)
    }
}

impl fmt::Display for VoxelCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Horizontal chunk column coordinate. Chunks are `CHUNK_SIZE` blocks wide
/// on X and Z and span the full world height.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkCoord {
    pub x: i32,
    pub z: i32,
}

/// Width of a chunk column in blocks.
pub const CHUNK_SIZE: i32 = 16;

impl ChunkCoord {
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    pub fn containing(pos: VoxelCoord) -> Self {
        Self::new(pos.x.div_euclid(CHUNK_SIZE), pos.z.div_euclid(CHUNK_SIZE))
    }
}

// ---------------------------------------------------------------------------
// Entity IDs (deterministic UUID v4)
// ---------------------------------------------------------------------------

/// A UUID v4, generated deterministically from the simulation PRNG.
///
/// Layout follows RFC 4122: 128 bits with version nibble (bits 48–51) set
/// to `0100` and variant bits (bits 64–65) set to `10`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SimUuid([u8; 16]);

impl SimUuid {
    pub fn new_v4(rng: &mut GameRng) -> Self {
        let mut bytes = rng.next_128_bits();
        bytes[6] = (bytes[6] & 0x0F) | 0x40;
        bytes[8] = (bytes[8] & 0x3F) | 0x80;
        Self(bytes)
    }

    /// Parse the 8-4-4-4-12 hex form. Dashes are optional.
    pub fn parse(s: &str) -> Option<Self> {
        let hex: String = s.chars().filter(|c| *c != '-').collect();
        if hex.len() != 32 || !hex.is_ascii() {
            return None;
        }
        let mut bytes = [0u8; 16];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).ok()?;
        }
        Some(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

// Serialized as the hex string so IDs can be JSON map keys.
impl Serialize for SimUuid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for SimUuid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        SimUuid::parse(&s).ok_or_else(|| serde::de::Error::custom("invalid UUID format"))
    }
}

impl fmt::Debug for SimUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SimUuid({self})")
    }
}

impl fmt::Display for SimUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, b) in self.0.iter().enumerate() {
            if matches!(i, 4 | 6 | 8 | 10) {
                f.write_str("-")?;
            }
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub SimUuid);

        impl $name {
            pub fn new(rng: &mut GameRng) -> Self {
                Self(SimUuid::new_v4(rng))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

entity_id!(/// Unique identifier for a settlement.
SettlementId);
entity_id!(/// Unique identifier for a building within a settlement.
BuildingId);
entity_id!(/// Unique identifier for a player issuing commands.
PlayerId);

// ---------------------------------------------------------------------------
// Blocks and items
// ---------------------------------------------------------------------------

/// Namespaced block or item identifier, e.g. `minecraft:oak_planks`.
///
/// Blocks and the items that place them share identifiers, so the material
/// ledger keys on `BlockId` directly.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(String);

impl BlockId {
    pub const AIR: &'static str = "minecraft:air";

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn air() -> Self {
        Self(Self::AIR.to_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The path portion after the namespace (`oak_planks` for
    /// `minecraft:oak_planks`). Unnamespaced ids are their own path.
    pub fn path(&self) -> &str {
        self.0.split_once(':').map_or(self.0.as_str(), |(_, p)| p)
    }

    /// True for every spelling of "no block": the empty id and the air,
    /// cave air, and void air variants with or without a namespace.
    pub fn is_air(&self) -> bool {
        self.0.is_empty() || matches!(self.path(), "air" | "cave_air" | "void_air")
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BlockId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Opaque block state properties (`facing=north`, `half=top`, ...).
///
/// The construction system never interprets these except for orientation:
/// `facing` and `axis` are rotated alongside the block's position so a
/// rotated building keeps its doors and stairs pointing the right way.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockState(pub BTreeMap<String, String>);

impl BlockState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.0.insert(key.to_owned(), value.to_owned());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Return a copy with orientation properties rotated.
    pub fn rotated(&self, rotation: Rotation) -> Self {
        if rotation == Rotation::None {
            return self.clone();
        }
        let mut out = self.clone();
        if let Some(facing) = self.get("facing")
            && let Some(dir) = Direction::from_name(facing)
        {
            out.0
                .insert("facing".to_owned(), dir.rotated(rotation).name().to_owned());
        }
        if rotation.swaps_axes()
            && let Some(axis) = self.get("axis")
        {
            let swapped = match axis {
                "x" => "z",
                "z" => "x",
                other => other,
            };
            out.0.insert("axis".to_owned(), swapped.to_owned());
        }
        out
    }
}

/// Compass and vertical directions as unit offsets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    North,
    East,
    South,
    West,
    Up,
    Down,
}

impl Direction {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "north" => Self::North,
            "east" => Self::East,
            "south" => Self::South,
            "west" => Self::West,
            "up" => Self::Up,
            "down" => Self::Down,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::North => "north",
            Self::East => "east",
            Self::South => "south",
            Self::West => "west",
            Self::Up => "up",
            Self::Down => "down",
        }
    }

    pub fn offset(self) -> VoxelCoord {
        match self {
            Self::North => VoxelCoord::new(0, 0, -1),
            Self::East => VoxelCoord::new(1, 0, 0),
            Self::South => VoxelCoord::new(0, 0, 1),
            Self::West => VoxelCoord::new(-1, 0, 0),
            Self::Up => VoxelCoord::new(0, 1, 0),
            Self::Down => VoxelCoord::new(0, -1, 0),
        }
    }

    fn from_offset(offset: VoxelCoord) -> Option<Self> {
        [
            Self::North,
            Self::East,
            Self::South,
            Self::West,
            Self::Up,
            Self::Down,
        ]
        .into_iter()
        .find(|d| d.offset() == offset)
    }

    /// Rotate through the same transform used for positions, so block
    /// orientation and block placement can never disagree.
    pub fn rotated(self, rotation: Rotation) -> Self {
        Self::from_offset(rotation.apply(self.offset())).unwrap_or(self)
    }
}

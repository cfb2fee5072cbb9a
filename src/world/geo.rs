use crate::world::chunk::CHUNK_SIZE;
use crate::world::core::World;
use crate::world::handle::Handle;
use crate::world::region::REGION_BLOCKS;
use glam::{IVec3, Quat, Vec3};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// One of the six axis-aligned block faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockFace {
    Top,
    Bottom,
    North,
    South,
    East,
    West,
}

impl BlockFace {
    pub const ALL: [BlockFace; 6] = [
        BlockFace::Top,
        BlockFace::Bottom,
        BlockFace::North,
        BlockFace::South,
        BlockFace::East,
        BlockFace::West,
    ];

    /// Unit offset of this face in block coordinates.
    pub fn offset(&self) -> IVec3 {
        match self {
            BlockFace::Top => IVec3::new(0, 1, 0),
            BlockFace::Bottom => IVec3::new(0, -1, 0),
            BlockFace::North => IVec3::new(0, 0, -1),
            BlockFace::South => IVec3::new(0, 0, 1),
            BlockFace::East => IVec3::new(1, 0, 0),
            BlockFace::West => IVec3::new(-1, 0, 0),
        }
    }

    pub fn opposite(&self) -> BlockFace {
        match self {
            BlockFace::Top => BlockFace::Bottom,
            BlockFace::Bottom => BlockFace::Top,
            BlockFace::North => BlockFace::South,
            BlockFace::South => BlockFace::North,
            BlockFace::East => BlockFace::West,
            BlockFace::West => BlockFace::East,
        }
    }
}

/// A continuous position inside a world. The world part is a weak handle,
/// so a Point never keeps its world loaded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub world: Handle<World>,
    pub position: Vec3,
}

impl Point {
    pub fn new(world: Handle<World>, position: Vec3) -> Self {
        Self { world, position }
    }

    // Float coordinates truncate toward zero when converted to block
    // coordinates, matching `as i32` cast semantics.
    pub fn block_x(&self) -> i32 {
        self.position.x as i32
    }

    pub fn block_y(&self) -> i32 {
        self.position.y as i32
    }

    pub fn block_z(&self) -> i32 {
        self.position.z as i32
    }
}

/// Position, rotation and scale. Used for spawn points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Transform {
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::at(Vec3::ZERO)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkCoord(pub IVec3);

impl ChunkCoord {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self(IVec3::new(x, y, z))
    }

    /// Coordinate of the chunk containing the given block.
    pub fn from_block(x: i32, y: i32, z: i32) -> Self {
        Self::new(
            x.div_euclid(CHUNK_SIZE),
            y.div_euclid(CHUNK_SIZE),
            z.div_euclid(CHUNK_SIZE),
        )
    }

    pub fn x(&self) -> i32 {
        self.0.x
    }

    pub fn y(&self) -> i32 {
        self.0.y
    }

    pub fn z(&self) -> i32 {
        self.0.z
    }

    /// Block coordinate of this chunk's lowest corner.
    pub fn base(&self) -> IVec3 {
        self.0 * CHUNK_SIZE
    }

    pub fn to_path(&self) -> PathBuf {
        PathBuf::from(format!("chunk_{}_{}_{}.bin", self.0.x, self.0.y, self.0.z))
    }
}

impl fmt::Display for ChunkCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.0.x, self.0.y, self.0.z)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegionCoord(pub IVec3);

impl RegionCoord {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self(IVec3::new(x, y, z))
    }

    /// Coordinate of the region containing the given block.
    pub fn from_block(x: i32, y: i32, z: i32) -> Self {
        Self::new(
            x.div_euclid(REGION_BLOCKS),
            y.div_euclid(REGION_BLOCKS),
            z.div_euclid(REGION_BLOCKS),
        )
    }

    pub fn from_chunk(coord: ChunkCoord) -> Self {
        Self::from_block(coord.base().x, coord.base().y, coord.base().z)
    }

    /// Block coordinate of this region's lowest corner.
    pub fn base(&self) -> IVec3 {
        self.0 * REGION_BLOCKS
    }
}

impl fmt::Display for RegionCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.0.x, self.0.y, self.0.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_coord_from_block() {
        assert_eq!(ChunkCoord::from_block(0, 0, 0), ChunkCoord::new(0, 0, 0));
        assert_eq!(ChunkCoord::from_block(15, 15, 15), ChunkCoord::new(0, 0, 0));
        assert_eq!(ChunkCoord::from_block(16, 0, 0), ChunkCoord::new(1, 0, 0));
        assert_eq!(ChunkCoord::from_block(-1, 0, 0), ChunkCoord::new(-1, 0, 0));
        assert_eq!(
            ChunkCoord::from_block(-16, -17, 31),
            ChunkCoord::new(-1, -2, 1)
        );
    }

    #[test]
    fn test_region_coord_from_block() {
        assert_eq!(RegionCoord::from_block(0, 0, 0), RegionCoord::new(0, 0, 0));
        assert_eq!(
            RegionCoord::from_block(255, 255, 255),
            RegionCoord::new(0, 0, 0)
        );
        assert_eq!(RegionCoord::from_block(256, 0, -1), RegionCoord::new(1, 0, -1));
    }

    #[test]
    fn test_point_truncates_toward_zero() {
        let p = Point::new(Handle::EMPTY, Vec3::new(3.9, -0.5, -1.2));
        assert_eq!(p.block_x(), 3);
        assert_eq!(p.block_y(), 0);
        assert_eq!(p.block_z(), -1);
    }

    #[test]
    fn test_face_offsets_cancel() {
        for face in BlockFace::ALL {
            assert_eq!(face.offset() + face.opposite().offset(), IVec3::ZERO);
        }
    }
}

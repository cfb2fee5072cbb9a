pub mod block;
pub mod chunk;
pub mod core;
pub mod generator;
pub mod geo;
pub mod handle;
pub mod material;
pub mod region;
pub mod storage;

pub use self::block::{Block, BlockError};
pub use self::chunk::{
    BlockChange, BlockEvent, Cause, Chunk, SerializedChunk, CHUNK_SIZE, CHUNK_VOLUME,
};
pub use self::core::{PhysicsUpdate, World};
pub use self::generator::{Biome, FlatGenerator, NoiseGenerator, WorldGenerator};
pub use self::geo::{BlockFace, ChunkCoord, Point, RegionCoord, Transform};
pub use self::handle::{AtomicHandle, Handle, WeakRegistry};
pub use self::material::{BlockMaterial, MaterialError, MaterialFlags, MaterialId, MaterialRegistry};
pub use self::region::{
    BlockComponent, DynamicUpdateEntry, LoadOption, Region, REGION_BLOCKS, REGION_CHUNKS,
};
pub use self::storage::{ChunkStorage, StorageError};

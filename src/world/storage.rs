use crate::world::chunk::{SerializedChunk, CHUNK_VOLUME};
use crate::world::geo::ChunkCoord;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Chunk encode/decode failed: {0}")]
    Codec(#[from] bincode::Error),

    #[error("Chunk {0} has malformed block arrays")]
    Malformed(ChunkCoord),
}

/// Per-chunk bincode files under a world directory, one
/// `chunk_{x}_{y}_{z}.bin` per chunk.
pub struct ChunkStorage {
    root: PathBuf,
}

impl ChunkStorage {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn chunk_path(&self, coord: ChunkCoord) -> PathBuf {
        self.root.join(coord.to_path())
    }

    pub fn exists(&self, coord: ChunkCoord) -> bool {
        self.chunk_path(coord).is_file()
    }

    pub fn save(&self, snapshot: &SerializedChunk) -> Result<(), StorageError> {
        let file = File::create(self.chunk_path(snapshot.position))?;
        let mut writer = BufWriter::new(file);
        bincode::serialize_into(&mut writer, snapshot)?;
        Ok(())
    }

    /// Loads a chunk snapshot, or `None` when nothing is stored for the
    /// coordinate.
    pub fn load(&self, coord: ChunkCoord) -> Result<Option<SerializedChunk>, StorageError> {
        let path = self.chunk_path(coord);
        if !path.is_file() {
            return Ok(None);
        }
        let reader = BufReader::new(File::open(path)?);
        let snapshot: SerializedChunk = bincode::deserialize_from(reader)?;
        // A truncated or corrupt write can decode cleanly with short
        // arrays; reject it here rather than panic on first access.
        if snapshot.materials.len() != CHUNK_VOLUME
            || snapshot.data.len() != CHUNK_VOLUME
            || snapshot.sky_light.len() != CHUNK_VOLUME
            || snapshot.block_light.len() != CHUNK_VOLUME
        {
            return Err(StorageError::Malformed(coord));
        }
        Ok(Some(snapshot))
    }
}

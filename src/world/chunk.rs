use crate::world::geo::ChunkCoord;
use crate::world::handle::Handle;
use crate::world::material::MaterialId;
use crate::world::region::Region;
use crossbeam_channel::Sender;
use glam::IVec3;
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

pub const CHUNK_SIZE: i32 = 16;
pub const CHUNK_VOLUME: usize = (CHUNK_SIZE * CHUNK_SIZE * CHUNK_SIZE) as usize;

/// Opaque attribution for a block mutation, forwarded to the event channel
/// for downstream observers. The world core never inspects it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cause {
    Player(String),
    Plugin(String),
    Natural,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BlockChange {
    Material { from: MaterialId, to: MaterialId, data: u16 },
    Data { from: u16, to: u16 },
    SkyLight(u8),
    BlockLight(u8),
}

#[derive(Debug, Clone)]
pub struct BlockEvent {
    pub position: IVec3,
    pub change: BlockChange,
    pub cause: Option<Cause>,
}

/// Snapshot of a chunk's block arrays, as written to disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializedChunk {
    pub position: ChunkCoord,
    pub materials: Vec<u16>,
    pub data: Vec<u16>,
    pub sky_light: Vec<u8>,
    pub block_light: Vec<u8>,
}

impl SerializedChunk {
    pub fn empty(position: ChunkCoord) -> Self {
        Self {
            position,
            materials: vec![0; CHUNK_VOLUME],
            data: vec![0; CHUNK_VOLUME],
            sky_light: vec![0; CHUNK_VOLUME],
            block_light: vec![0; CHUNK_VOLUME],
        }
    }
}

struct BlockStore {
    materials: Vec<u16>,
    data: Vec<u16>,
    sky_light: Vec<u8>,
    block_light: Vec<u8>,
}

/// A 16x16x16 cube of blocks. The authoritative owner of per-block
/// material, data and light state; locators only ever delegate here.
///
/// Chunks are shared behind `Arc` and mutated through interior locks, so
/// all accessors take `&self`. Coordinates are world block coordinates and
/// must lie within this chunk; debug builds assert that.
pub struct Chunk {
    position: ChunkCoord,
    region: Weak<Region>,
    loaded: AtomicBool,
    store: RwLock<BlockStore>,
    self_handle: OnceCell<Handle<Chunk>>,
    events: Option<Sender<BlockEvent>>,
}

impl Chunk {
    pub fn new(
        position: ChunkCoord,
        region: Weak<Region>,
        events: Option<Sender<BlockEvent>>,
    ) -> Self {
        Self::from_serialized(SerializedChunk::empty(position), region, events)
    }

    pub fn from_serialized(
        snapshot: SerializedChunk,
        region: Weak<Region>,
        events: Option<Sender<BlockEvent>>,
    ) -> Self {
        Self {
            position: snapshot.position,
            region,
            loaded: AtomicBool::new(true),
            store: RwLock::new(BlockStore {
                materials: snapshot.materials,
                data: snapshot.data,
                sky_light: snapshot.sky_light,
                block_light: snapshot.block_light,
            }),
            self_handle: OnceCell::new(),
            events,
        }
    }

    pub fn to_serialized(&self) -> SerializedChunk {
        let store = self.store.read();
        SerializedChunk {
            position: self.position,
            materials: store.materials.clone(),
            data: store.data.clone(),
            sky_light: store.sky_light.clone(),
            block_light: store.block_light.clone(),
        }
    }

    pub fn position(&self) -> ChunkCoord {
        self.position
    }

    pub fn region(&self) -> Option<Arc<Region>> {
        self.region.upgrade()
    }

    /// Registry handle for this chunk; `EMPTY` until the owning region
    /// attaches one.
    pub fn handle(&self) -> Handle<Chunk> {
        self.self_handle.get().copied().unwrap_or(Handle::EMPTY)
    }

    pub(crate) fn attach_handle(&self, handle: Handle<Chunk>) {
        let _ = self.self_handle.set(handle);
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    pub(crate) fn mark_unloaded(&self) {
        self.loaded.store(false, Ordering::Release);
    }

    pub fn contains_block(&self, x: i32, y: i32, z: i32) -> bool {
        ChunkCoord::from_block(x, y, z) == self.position
    }

    fn index(&self, x: i32, y: i32, z: i32) -> usize {
        debug_assert!(
            self.contains_block(x, y, z),
            "block ({}, {}, {}) is outside chunk {}",
            x,
            y,
            z,
            self.position
        );
        let lx = x.rem_euclid(CHUNK_SIZE);
        let ly = y.rem_euclid(CHUNK_SIZE);
        let lz = z.rem_euclid(CHUNK_SIZE);
        (lx + lz * CHUNK_SIZE + ly * CHUNK_SIZE * CHUNK_SIZE) as usize
    }

    fn emit(&self, x: i32, y: i32, z: i32, change: BlockChange, cause: Option<&Cause>) {
        if let Some(events) = &self.events {
            let _ = events.send(BlockEvent {
                position: IVec3::new(x, y, z),
                change,
                cause: cause.cloned(),
            });
        }
    }

    pub fn block_material(&self, x: i32, y: i32, z: i32) -> MaterialId {
        MaterialId(self.store.read().materials[self.index(x, y, z)])
    }

    /// Sets material and data in one step. Returns `true` iff anything
    /// actually changed.
    pub fn set_block_material(
        &self,
        x: i32,
        y: i32,
        z: i32,
        material: MaterialId,
        data: u16,
        cause: Option<&Cause>,
    ) -> bool {
        let index = self.index(x, y, z);
        let from = {
            let mut store = self.store.write();
            let from = MaterialId(store.materials[index]);
            if from == material && store.data[index] == data {
                return false;
            }
            store.materials[index] = material.0;
            store.data[index] = data;
            from
        };
        self.emit(
            x,
            y,
            z,
            BlockChange::Material {
                from,
                to: material,
                data,
            },
            cause,
        );
        true
    }

    pub fn block_data(&self, x: i32, y: i32, z: i32) -> u16 {
        self.store.read().data[self.index(x, y, z)]
    }

    pub fn set_block_data(&self, x: i32, y: i32, z: i32, data: u16, cause: Option<&Cause>) {
        self.update_data(x, y, z, cause, |_| data);
    }

    pub fn add_block_data(&self, x: i32, y: i32, z: i32, amount: u16, cause: Option<&Cause>) {
        self.update_data(x, y, z, cause, |old| old.wrapping_add(amount));
    }

    /// Sets the masked bits. Returns the new data value.
    pub fn set_block_data_bits(
        &self,
        x: i32,
        y: i32,
        z: i32,
        bits: u16,
        cause: Option<&Cause>,
    ) -> u16 {
        self.update_data(x, y, z, cause, |old| old | bits)
    }

    /// Sets or clears the masked bits depending on `set`.
    pub fn set_block_data_bits_to(
        &self,
        x: i32,
        y: i32,
        z: i32,
        bits: u16,
        set: bool,
        cause: Option<&Cause>,
    ) -> u16 {
        if set {
            self.set_block_data_bits(x, y, z, bits, cause)
        } else {
            self.clear_block_data_bits(x, y, z, bits, cause)
        }
    }

    /// Clears the masked bits. Returns the new data value.
    pub fn clear_block_data_bits(
        &self,
        x: i32,
        y: i32,
        z: i32,
        bits: u16,
        cause: Option<&Cause>,
    ) -> u16 {
        self.update_data(x, y, z, cause, |old| old & !bits)
    }

    pub fn is_block_data_bit_set(&self, x: i32, y: i32, z: i32, bits: u16) -> bool {
        self.block_data(x, y, z) & bits == bits
    }

    /// Reads the field selected by the contiguous mask `bits`, shifted down
    /// to its least significant position.
    pub fn block_data_field(&self, x: i32, y: i32, z: i32, bits: u16) -> u16 {
        (self.block_data(x, y, z) & bits) >> bits.trailing_zeros()
    }

    /// Writes the field selected by `bits`. Returns the previous field
    /// value.
    pub fn set_block_data_field(
        &self,
        x: i32,
        y: i32,
        z: i32,
        bits: u16,
        value: u16,
        cause: Option<&Cause>,
    ) -> u16 {
        let shift = bits.trailing_zeros();
        let mut old_field = 0;
        self.update_data(x, y, z, cause, |old| {
            old_field = (old & bits) >> shift;
            (old & !bits) | ((value << shift) & bits)
        });
        old_field
    }

    /// Adds to the field selected by `bits`, wrapping within the mask.
    /// Returns the previous field value.
    pub fn add_block_data_field(
        &self,
        x: i32,
        y: i32,
        z: i32,
        bits: u16,
        value: u16,
        cause: Option<&Cause>,
    ) -> u16 {
        let shift = bits.trailing_zeros();
        let mut old_field = 0;
        self.update_data(x, y, z, cause, |old| {
            old_field = (old & bits) >> shift;
            let sum = old_field.wrapping_add(value);
            (old & !bits) | ((sum << shift) & bits)
        });
        old_field
    }

    fn update_data(
        &self,
        x: i32,
        y: i32,
        z: i32,
        cause: Option<&Cause>,
        mut f: impl FnMut(u16) -> u16,
    ) -> u16 {
        let index = self.index(x, y, z);
        let (from, to) = {
            let mut store = self.store.write();
            let from = store.data[index];
            let to = f(from);
            store.data[index] = to;
            (from, to)
        };
        if from != to {
            self.emit(x, y, z, BlockChange::Data { from, to }, cause);
        }
        to
    }

    /// Effective sky light, 0..=15.
    pub fn block_sky_light(&self, x: i32, y: i32, z: i32) -> u8 {
        self.block_sky_light_raw(x, y, z) & 0x0F
    }

    /// Stored sky light byte, without masking off marker bits.
    pub fn block_sky_light_raw(&self, x: i32, y: i32, z: i32) -> u8 {
        self.store.read().sky_light[self.index(x, y, z)]
    }

    pub fn set_block_sky_light(&self, x: i32, y: i32, z: i32, level: u8, cause: Option<&Cause>) {
        self.store.write().sky_light[self.index(x, y, z)] = level;
        self.emit(x, y, z, BlockChange::SkyLight(level), cause);
    }

    pub fn block_light(&self, x: i32, y: i32, z: i32) -> u8 {
        self.store.read().block_light[self.index(x, y, z)] & 0x0F
    }

    pub fn set_block_light(&self, x: i32, y: i32, z: i32, level: u8, cause: Option<&Cause>) {
        self.store.write().block_light[self.index(x, y, z)] = level;
        self.emit(x, y, z, BlockChange::BlockLight(level), cause);
    }
}

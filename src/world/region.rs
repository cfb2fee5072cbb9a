use crate::world::chunk::{Chunk, CHUNK_SIZE};
use crate::world::core::World;
use crate::world::geo::{ChunkCoord, RegionCoord};
use crate::world::storage::StorageError;
use glam::IVec3;
use log::warn;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::{Arc, Weak};

/// Chunks per region edge.
pub const REGION_CHUNKS: i32 = 16;
/// Blocks per region edge.
pub const REGION_BLOCKS: i32 = REGION_CHUNKS * CHUNK_SIZE;

/// Policy for chunk lookups that miss the in-memory map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOption {
    /// In-memory state only.
    NoLoad,
    /// May read from disk, never generates.
    LoadOnly,
    /// Load from disk if present, generate otherwise.
    LoadGen,
}

/// An attached per-block behavior, opaque to the world core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockComponent {
    pub name: String,
    pub data: u16,
}

/// A scheduled dynamic-material update for one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DynamicUpdateEntry {
    pub position: IVec3,
    pub update_time: u64,
    pub data: u32,
    pub exclusive: bool,
}

/// A 16x16x16 cube of chunks: the unit of file storage, and the owner of
/// dynamic-update scheduling and block components for its blocks.
pub struct Region {
    position: RegionCoord,
    world: Weak<World>,
    me: Weak<Region>,
    chunks: RwLock<HashMap<ChunkCoord, Arc<Chunk>>>,
    dynamic_queue: Mutex<Vec<DynamicUpdateEntry>>,
    pending_resets: Mutex<Vec<IVec3>>,
    components: RwLock<HashMap<IVec3, BlockComponent>>,
}

impl Region {
    pub(crate) fn new(position: RegionCoord, world: Weak<World>) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            position,
            world,
            me: me.clone(),
            chunks: RwLock::new(HashMap::new()),
            dynamic_queue: Mutex::new(Vec::new()),
            pending_resets: Mutex::new(Vec::new()),
            components: RwLock::new(HashMap::new()),
        })
    }

    pub fn position(&self) -> RegionCoord {
        self.position
    }

    pub fn contains_block(&self, x: i32, y: i32, z: i32) -> bool {
        RegionCoord::from_block(x, y, z) == self.position
    }

    pub fn loaded_chunk_count(&self) -> usize {
        self.chunks.read().len()
    }

    pub fn loaded_chunks(&self) -> Vec<Arc<Chunk>> {
        self.chunks.read().values().cloned().collect()
    }

    pub fn get_chunk_from_block(
        &self,
        x: i32,
        y: i32,
        z: i32,
        option: LoadOption,
    ) -> Option<Arc<Chunk>> {
        self.get_chunk(ChunkCoord::from_block(x, y, z), option)
    }

    pub fn get_chunk(&self, coord: ChunkCoord, option: LoadOption) -> Option<Arc<Chunk>> {
        if let Some(chunk) = self.chunks.read().get(&coord) {
            if chunk.is_loaded() {
                return Some(chunk.clone());
            }
        }
        match option {
            LoadOption::NoLoad => None,
            LoadOption::LoadOnly | LoadOption::LoadGen => self.load_chunk(coord, option),
        }
    }

    fn load_chunk(&self, coord: ChunkCoord, option: LoadOption) -> Option<Arc<Chunk>> {
        let world = self.world.upgrade()?;

        let snapshot = match world.storage().load(coord) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("failed to read chunk {} from disk: {}", coord, e);
                return None;
            }
        };
        let snapshot = match snapshot {
            Some(snapshot) => snapshot,
            None if option == LoadOption::LoadGen => world.generator().generate_chunk(coord),
            None => return None,
        };

        let chunk = Arc::new(Chunk::from_serialized(
            snapshot,
            self.me.clone(),
            Some(world.event_sender()),
        ));
        let handle = world.services().chunks.register(&chunk);
        chunk.attach_handle(handle);

        let mut chunks = self.chunks.write();
        // A concurrent loader may have won the race; keep the first one.
        if let Some(existing) = chunks.get(&coord) {
            if existing.is_loaded() {
                return Some(existing.clone());
            }
        }
        chunks.insert(coord, chunk.clone());
        Some(chunk)
    }

    /// Removes a chunk from memory, optionally persisting it first. Any
    /// locator still caching the chunk will re-resolve on next access.
    pub fn unload_chunk(&self, coord: ChunkCoord, save: bool) -> Result<bool, StorageError> {
        let chunk = match self.chunks.write().remove(&coord) {
            Some(chunk) => chunk,
            None => return Ok(false),
        };
        chunk.mark_unloaded();
        if save {
            if let Some(world) = self.world.upgrade() {
                world.storage().save(&chunk.to_serialized())?;
            }
        }
        Ok(true)
    }

    pub fn save_all(&self) -> Result<usize, StorageError> {
        let world = match self.world.upgrade() {
            Some(world) => world,
            None => return Ok(0),
        };
        let chunks: Vec<_> = self.chunks.read().values().cloned().collect();
        let mut saved = 0;
        for chunk in chunks {
            world.storage().save(&chunk.to_serialized())?;
            saved += 1;
        }
        Ok(saved)
    }

    /// Queues removal of all dynamic updates at the block, applied at the
    /// next drain.
    pub fn reset_dynamic_block(&self, x: i32, y: i32, z: i32) {
        self.pending_resets.lock().push(IVec3::new(x, y, z));
    }

    /// Removes all dynamic updates at the block immediately.
    pub fn sync_reset_dynamic_block(&self, x: i32, y: i32, z: i32) {
        let position = IVec3::new(x, y, z);
        self.dynamic_queue.lock().retain(|e| e.position != position);
    }

    pub fn queue_dynamic_update(&self, x: i32, y: i32, z: i32, exclusive: bool) -> DynamicUpdateEntry {
        let next_tick = self.world.upgrade().map_or(0, |w| w.age() + 1);
        self.queue_dynamic_update_with(x, y, z, next_tick, 0, exclusive)
    }

    pub fn queue_dynamic_update_at(
        &self,
        x: i32,
        y: i32,
        z: i32,
        update_time: u64,
        exclusive: bool,
    ) -> DynamicUpdateEntry {
        self.queue_dynamic_update_with(x, y, z, update_time, 0, exclusive)
    }

    pub fn queue_dynamic_update_with(
        &self,
        x: i32,
        y: i32,
        z: i32,
        update_time: u64,
        data: u32,
        exclusive: bool,
    ) -> DynamicUpdateEntry {
        let entry = DynamicUpdateEntry {
            position: IVec3::new(x, y, z),
            update_time,
            data,
            exclusive,
        };
        let mut queue = self.dynamic_queue.lock();
        if exclusive {
            // An exclusive update owns its block; earlier entries are
            // superseded.
            queue.retain(|e| e.position != entry.position);
        }
        queue.push(entry);
        entry
    }

    /// Applies pending resets, then removes and returns every entry due at
    /// `now`.
    pub fn drain_due_updates(&self, now: u64) -> Vec<DynamicUpdateEntry> {
        let resets: Vec<IVec3> = std::mem::take(&mut *self.pending_resets.lock());
        let mut queue = self.dynamic_queue.lock();
        if !resets.is_empty() {
            queue.retain(|e| !resets.contains(&e.position));
        }
        let mut due = Vec::new();
        queue.retain(|e| {
            if e.update_time <= now {
                due.push(*e);
                false
            } else {
                true
            }
        });
        due
    }

    pub fn queued_update_count(&self) -> usize {
        self.dynamic_queue.lock().len()
    }

    pub fn get_block_component(&self, x: i32, y: i32, z: i32) -> Option<BlockComponent> {
        self.components.read().get(&IVec3::new(x, y, z)).cloned()
    }

    pub fn set_block_component(&self, x: i32, y: i32, z: i32, component: BlockComponent) {
        self.components
            .write()
            .insert(IVec3::new(x, y, z), component);
    }

    pub fn clear_block_component(&self, x: i32, y: i32, z: i32) -> Option<BlockComponent> {
        self.components.write().remove(&IVec3::new(x, y, z))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region() -> Arc<Region> {
        Region::new(RegionCoord::new(0, 0, 0), Weak::new())
    }

    #[test]
    fn test_contains_block() {
        let r = region();
        assert!(r.contains_block(0, 0, 0));
        assert!(r.contains_block(255, 255, 255));
        assert!(!r.contains_block(256, 0, 0));
        assert!(!r.contains_block(-1, 10, 10));
    }

    #[test]
    fn test_no_world_means_no_load() {
        let r = region();
        assert!(r
            .get_chunk_from_block(0, 0, 0, LoadOption::LoadGen)
            .is_none());
        assert!(r.get_chunk_from_block(0, 0, 0, LoadOption::NoLoad).is_none());
    }

    #[test]
    fn test_exclusive_update_supersedes() {
        let r = region();
        r.queue_dynamic_update_at(1, 2, 3, 10, false);
        r.queue_dynamic_update_at(1, 2, 3, 20, false);
        assert_eq!(r.queued_update_count(), 2);

        let entry = r.queue_dynamic_update_at(1, 2, 3, 30, true);
        assert_eq!(r.queued_update_count(), 1);
        assert_eq!(r.drain_due_updates(30), vec![entry]);
    }

    #[test]
    fn test_drain_respects_update_time() {
        let r = region();
        r.queue_dynamic_update_at(0, 0, 0, 5, false);
        r.queue_dynamic_update_at(0, 1, 0, 15, false);
        let due = r.drain_due_updates(10);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].position, IVec3::new(0, 0, 0));
        assert_eq!(r.queued_update_count(), 1);
    }

    #[test]
    fn test_reset_dynamic_applies_on_drain() {
        let r = region();
        r.queue_dynamic_update_at(4, 4, 4, 1, false);
        r.reset_dynamic_block(4, 4, 4);
        // Still queued until the next drain.
        assert_eq!(r.queued_update_count(), 1);
        assert!(r.drain_due_updates(100).is_empty());
        assert_eq!(r.queued_update_count(), 0);
    }

    #[test]
    fn test_sync_reset_is_immediate() {
        let r = region();
        r.queue_dynamic_update_at(4, 4, 4, 1, false);
        r.sync_reset_dynamic_block(4, 4, 4);
        assert_eq!(r.queued_update_count(), 0);
    }

    #[test]
    fn test_block_components() {
        let r = region();
        assert!(r.get_block_component(1, 1, 1).is_none());
        r.set_block_component(
            1,
            1,
            1,
            BlockComponent {
                name: "sign".into(),
                data: 3,
            },
        );
        assert_eq!(r.get_block_component(1, 1, 1).unwrap().name, "sign");
        assert!(r.clear_block_component(1, 1, 1).is_some());
        assert!(r.get_block_component(1, 1, 1).is_none());
    }
}

use crate::engine::Services;
use crate::world::block::Block;
use crate::world::chunk::{BlockEvent, Chunk, CHUNK_SIZE};
use crate::world::generator::{Biome, WorldGenerator};
use crate::world::geo::{ChunkCoord, RegionCoord, Transform};
use crate::world::handle::Handle;
use crate::world::region::{DynamicUpdateEntry, LoadOption, Region};
use crate::world::storage::{ChunkStorage, StorageError};
use crossbeam_channel::Sender;
use glam::IVec3;
use log::info;
use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// A queued physics check for a block and its neighborhood.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhysicsUpdate {
    pub position: IVec3,
    pub range: u32,
}

/// One named world: a sparse set of regions plus the shared services,
/// generator and disk storage its chunks are built from.
///
/// Worlds are always held behind `Arc` and referenced weakly from points,
/// locators and regions, so dropping the last engine-side `Arc` unloads
/// the world and invalidates every outstanding handle.
pub struct World {
    name: String,
    seed: u64,
    age: AtomicU64,
    me: Weak<World>,
    services: Arc<Services>,
    generator: Arc<dyn WorldGenerator>,
    storage: ChunkStorage,
    regions: RwLock<HashMap<RegionCoord, Arc<Region>>>,
    spawn: RwLock<Transform>,
    physics_queue: Mutex<VecDeque<PhysicsUpdate>>,
    events: Sender<BlockEvent>,
    self_handle: OnceCell<Handle<World>>,
}

impl World {
    pub fn open(
        name: &str,
        seed: u64,
        directory: &Path,
        generator: Arc<dyn WorldGenerator>,
        services: Arc<Services>,
        events: Sender<BlockEvent>,
    ) -> Result<Arc<World>, StorageError> {
        let storage = ChunkStorage::new(directory.join(name))?;
        let world = Arc::new_cyclic(|me| World {
            name: name.to_string(),
            seed,
            age: AtomicU64::new(0),
            me: me.clone(),
            services,
            generator,
            storage,
            regions: RwLock::new(HashMap::new()),
            spawn: RwLock::new(Transform::default()),
            physics_queue: Mutex::new(VecDeque::new()),
            events,
            self_handle: OnceCell::new(),
        });
        let handle = world.services.worlds.register(&world);
        let _ = world.self_handle.set(handle);
        info!("opened world '{}' (seed {})", name, seed);
        Ok(world)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// World age in ticks.
    pub fn age(&self) -> u64 {
        self.age.load(Ordering::Acquire)
    }

    pub fn handle(&self) -> Handle<World> {
        self.self_handle.get().copied().unwrap_or(Handle::EMPTY)
    }

    pub fn services(&self) -> &Arc<Services> {
        &self.services
    }

    pub(crate) fn storage(&self) -> &ChunkStorage {
        &self.storage
    }

    pub(crate) fn generator(&self) -> &Arc<dyn WorldGenerator> {
        &self.generator
    }

    pub(crate) fn event_sender(&self) -> Sender<BlockEvent> {
        self.events.clone()
    }

    /// The region containing the coordinate, created on demand. Regions are
    /// cheap shells; chunk data only materializes through load options.
    pub fn get_region_from_block(&self, x: i32, y: i32, z: i32) -> Arc<Region> {
        self.get_region(RegionCoord::from_block(x, y, z))
    }

    pub fn get_region(&self, coord: RegionCoord) -> Arc<Region> {
        if let Some(region) = self.regions.read().get(&coord) {
            return region.clone();
        }
        let mut regions = self.regions.write();
        regions
            .entry(coord)
            .or_insert_with(|| Region::new(coord, self.me.clone()))
            .clone()
    }

    /// The region containing the coordinate, without creating one.
    pub fn get_region_if_loaded(&self, coord: RegionCoord) -> Option<Arc<Region>> {
        self.regions.read().get(&coord).cloned()
    }

    pub fn get_chunk_from_block(
        &self,
        x: i32,
        y: i32,
        z: i32,
        option: LoadOption,
    ) -> Option<Arc<Chunk>> {
        if option == LoadOption::NoLoad {
            let coord = RegionCoord::from_block(x, y, z);
            return self
                .get_region_if_loaded(coord)?
                .get_chunk_from_block(x, y, z, option);
        }
        self.get_region_from_block(x, y, z)
            .get_chunk_from_block(x, y, z, option)
    }

    pub fn get_chunk(&self, coord: ChunkCoord, option: LoadOption) -> Option<Arc<Chunk>> {
        let base = coord.base();
        self.get_chunk_from_block(base.x, base.y, base.z, option)
    }

    /// A locator for the block, resolving through this world's services.
    pub fn block_at(&self, x: i32, y: i32, z: i32) -> Block {
        Block::new(
            self.handle(),
            self.services.clone(),
            x,
            y,
            z,
        )
    }

    /// Y of the topmost non-air (or, with `only_solid`, solid) block in the
    /// column, scanning loaded chunks top-down. Falls back to the
    /// generator's column height when nothing relevant is loaded.
    pub fn get_surface_height(&self, x: i32, z: i32, only_solid: bool) -> i32 {
        let cx = x.div_euclid(CHUNK_SIZE);
        let cz = z.div_euclid(CHUNK_SIZE);

        let mut column: Vec<Arc<Chunk>> = Vec::new();
        for region in self.regions.read().values() {
            for chunk in region.loaded_chunks() {
                let pos = chunk.position();
                if pos.x() == cx && pos.z() == cz && chunk.is_loaded() {
                    column.push(chunk);
                }
            }
        }
        column.sort_by_key(|c| std::cmp::Reverse(c.position().y()));

        for chunk in column {
            let base_y = chunk.position().base().y;
            for ly in (0..CHUNK_SIZE).rev() {
                let y = base_y + ly;
                let material = chunk.block_material(x, y, z);
                let hit = if only_solid {
                    self.services.materials.is_solid(material)
                } else {
                    !material.is_air()
                };
                if hit {
                    return y;
                }
            }
        }
        self.generator.surface_height(x, z)
    }

    pub fn get_biome(&self, x: i32, y: i32, z: i32) -> Biome {
        self.generator.biome(x, y, z)
    }

    pub fn queue_block_physics(&self, x: i32, y: i32, z: i32, range: u32) {
        self.physics_queue.lock().push_back(PhysicsUpdate {
            position: IVec3::new(x, y, z),
            range,
        });
    }

    pub fn drain_block_physics(&self) -> Vec<PhysicsUpdate> {
        self.physics_queue.lock().drain(..).collect()
    }

    pub fn queued_physics_count(&self) -> usize {
        self.physics_queue.lock().len()
    }

    pub fn spawn_point(&self) -> Transform {
        *self.spawn.read()
    }

    pub fn set_spawn_point(&self, transform: Transform) {
        *self.spawn.write() = transform;
    }

    /// Advances the world one tick and returns the dynamic updates that
    /// came due across all regions.
    pub fn tick(&self) -> Vec<DynamicUpdateEntry> {
        let now = self.age.fetch_add(1, Ordering::AcqRel) + 1;
        let regions: Vec<_> = self.regions.read().values().cloned().collect();
        let mut due = Vec::new();
        for region in regions {
            due.extend(region.drain_due_updates(now));
        }
        due
    }

    pub fn region_count(&self) -> usize {
        self.regions.read().len()
    }

    pub fn loaded_chunk_count(&self) -> usize {
        self.regions
            .read()
            .values()
            .map(|r| r.loaded_chunk_count())
            .sum()
    }

    pub fn save_all(&self) -> Result<usize, StorageError> {
        let regions: Vec<_> = self.regions.read().values().cloned().collect();
        let mut saved = 0;
        for region in regions {
            saved += region.save_all()?;
        }
        Ok(saved)
    }

    /// Persists and drops every chunk. Locators caching any of them will
    /// fail over to a reload on next access.
    pub fn unload_all(&self, save: bool) -> Result<(), StorageError> {
        let regions: Vec<_> = self.regions.write().drain().map(|(_, r)| r).collect();
        for region in regions {
            for chunk in region.loaded_chunks() {
                region.unload_chunk(chunk.position(), save)?;
            }
        }
        Ok(())
    }
}

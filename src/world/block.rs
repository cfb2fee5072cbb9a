use crate::engine::Services;
use crate::world::chunk::{Cause, Chunk};
use crate::world::core::World;
use crate::world::generator::Biome;
use crate::world::geo::{BlockFace, Point};
use crate::world::handle::{AtomicHandle, Handle};
use crate::world::material::{BlockMaterial, MaterialId};
use crate::world::region::{BlockComponent, DynamicUpdateEntry, LoadOption, Region};
use glam::{IVec3, Vec3};
use log::warn;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BlockError {
    #[error("the world has been unloaded")]
    WorldUnloaded,

    #[error("no chunk could be resolved for block ({0}, {1}, {2})")]
    ChunkUnavailable(i32, i32, i32),
}

/// A locator for one block position in one world.
///
/// The locator owns no block state; every read and write resolves the
/// containing chunk first and delegates to it. The chunk resolution is
/// cached in a lock-free handle slot that can go stale at any time (chunk
/// unload, world teardown) without invalidating the locator itself: the
/// next access simply re-resolves, reloading or regenerating the chunk if
/// needed.
///
/// Identity is the world plus the coordinates. The cache never
/// participates in equality or hashing, so two locators for the same block
/// compare equal regardless of what either has resolved.
pub struct Block {
    x: i32,
    y: i32,
    z: i32,
    world: Handle<World>,
    chunk: AtomicHandle<Chunk>,
    services: Arc<Services>,
}

impl Block {
    pub fn new(world: Handle<World>, services: Arc<Services>, x: i32, y: i32, z: i32) -> Self {
        Self {
            x,
            y,
            z,
            world,
            chunk: AtomicHandle::empty(),
            services,
        }
    }

    /// Like [`Block::new`], seeding the chunk cache from a chunk the caller
    /// already holds. A hint that does not contain the block is used at
    /// most for a same-region lookup and is never cached as-is.
    pub fn with_hint(
        world: Handle<World>,
        services: Arc<Services>,
        x: i32,
        y: i32,
        z: i32,
        hint: &Arc<Chunk>,
    ) -> Self {
        let block = Self::new(world, services, x, y, z);
        if hint.contains_block(x, y, z) {
            block.chunk.store(hint.handle());
        } else if let Some(region) = hint.region() {
            if region.contains_block(x, y, z) {
                if let Some(chunk) = region.get_chunk_from_block(x, y, z, LoadOption::NoLoad) {
                    block.chunk.store(chunk.handle());
                }
            }
        }
        block
    }

    pub fn x(&self) -> i32 {
        self.x
    }

    pub fn y(&self) -> i32 {
        self.y
    }

    pub fn z(&self) -> i32 {
        self.z
    }

    /// Center of the block as a continuous point.
    pub fn position(&self) -> Point {
        Point::new(
            self.world,
            Vec3::new(
                self.x as f32 + 0.5,
                self.y as f32 + 0.5,
                self.z as f32 + 0.5,
            ),
        )
    }

    pub fn world(&self) -> Result<Arc<World>, BlockError> {
        self.services
            .worlds
            .resolve(self.world)
            .ok_or(BlockError::WorldUnloaded)
    }

    /// The cached chunk, if it is still registered and loaded.
    fn cached_chunk(&self) -> Option<Arc<Chunk>> {
        let handle = self.chunk.load();
        if handle.is_empty() {
            return None;
        }
        let chunk = self.services.chunks.resolve(handle)?;
        if chunk.is_loaded() {
            Some(chunk)
        } else {
            None
        }
    }

    /// The chunk containing this block. Serves from the cache when the
    /// cached chunk is still live, otherwise re-resolves through the world
    /// with load-or-generate semantics and refreshes the cache.
    pub fn chunk(&self) -> Result<Arc<Chunk>, BlockError> {
        if let Some(chunk) = self.cached_chunk() {
            return Ok(chunk);
        }
        let world = self.world()?;
        match world.get_chunk_from_block(self.x, self.y, self.z, LoadOption::LoadGen) {
            Some(chunk) => {
                self.chunk.store(chunk.handle());
                Ok(chunk)
            }
            None => {
                warn!(
                    "chunk resolution failed for block ({}, {}, {}) in world '{}'",
                    self.x,
                    self.y,
                    self.z,
                    world.name()
                );
                self.chunk.store(Handle::EMPTY);
                Err(BlockError::ChunkUnavailable(self.x, self.y, self.z))
            }
        }
    }

    pub fn region(&self) -> Result<Arc<Region>, BlockError> {
        self.chunk()?
            .region()
            .ok_or(BlockError::ChunkUnavailable(self.x, self.y, self.z))
    }

    /// A locator offset by whole blocks. Infallible: the current chunk
    /// resolution, when live, seeds the new locator's cache.
    pub fn translate(&self, dx: i32, dy: i32, dz: i32) -> Block {
        let (x, y, z) = (self.x + dx, self.y + dy, self.z + dz);
        match self.cached_chunk() {
            Some(chunk) => {
                Block::with_hint(self.world, self.services.clone(), x, y, z, &chunk)
            }
            None => Block::new(self.world, self.services.clone(), x, y, z),
        }
    }

    pub fn translate_face(&self, face: BlockFace) -> Block {
        self.offset(face.offset())
    }

    pub fn translate_face_by(&self, face: BlockFace, distance: i32) -> Block {
        self.offset(face.offset() * distance)
    }

    pub fn offset(&self, offset: IVec3) -> Block {
        self.translate(offset.x, offset.y, offset.z)
    }

    /// Offset by a continuous vector, truncated toward zero per axis.
    pub fn translate_vec(&self, offset: Vec3) -> Block {
        self.translate(offset.x as i32, offset.y as i32, offset.z as i32)
    }

    pub fn material(&self) -> Result<Arc<BlockMaterial>, BlockError> {
        let id = self.material_id()?;
        self.services
            .materials
            .get(id)
            .ok_or(BlockError::ChunkUnavailable(self.x, self.y, self.z))
    }

    pub fn material_id(&self) -> Result<MaterialId, BlockError> {
        Ok(self.chunk()?.block_material(self.x, self.y, self.z))
    }

    /// Sets material and data together. Returns `true` iff the block
    /// actually changed.
    pub fn set_material(
        &self,
        material: MaterialId,
        data: u16,
        cause: Option<&Cause>,
    ) -> Result<bool, BlockError> {
        Ok(self
            .chunk()?
            .set_block_material(self.x, self.y, self.z, material, data, cause))
    }

    /// Sets the material with its registered default data.
    pub fn set_material_defaults(
        &self,
        material: MaterialId,
        cause: Option<&Cause>,
    ) -> Result<bool, BlockError> {
        let data = self
            .services
            .materials
            .get(material)
            .map_or(0, |m| m.default_data);
        self.set_material(material, data, cause)
    }

    pub fn data(&self) -> Result<u16, BlockError> {
        Ok(self.chunk()?.block_data(self.x, self.y, self.z))
    }

    pub fn set_data(&self, data: u16, cause: Option<&Cause>) -> Result<(), BlockError> {
        self.chunk()?.set_block_data(self.x, self.y, self.z, data, cause);
        Ok(())
    }

    pub fn add_data(&self, amount: u16, cause: Option<&Cause>) -> Result<(), BlockError> {
        self.chunk()?.add_block_data(self.x, self.y, self.z, amount, cause);
        Ok(())
    }

    pub fn set_data_bits(&self, bits: u16, cause: Option<&Cause>) -> Result<u16, BlockError> {
        Ok(self.chunk()?.set_block_data_bits(self.x, self.y, self.z, bits, cause))
    }

    pub fn set_data_bits_to(
        &self,
        bits: u16,
        set: bool,
        cause: Option<&Cause>,
    ) -> Result<u16, BlockError> {
        Ok(self
            .chunk()?
            .set_block_data_bits_to(self.x, self.y, self.z, bits, set, cause))
    }

    pub fn clear_data_bits(&self, bits: u16, cause: Option<&Cause>) -> Result<u16, BlockError> {
        Ok(self.chunk()?.clear_block_data_bits(self.x, self.y, self.z, bits, cause))
    }

    pub fn is_data_bit_set(&self, bits: u16) -> Result<bool, BlockError> {
        Ok(self.chunk()?.is_block_data_bit_set(self.x, self.y, self.z, bits))
    }

    pub fn data_field(&self, bits: u16) -> Result<u16, BlockError> {
        Ok(self.chunk()?.block_data_field(self.x, self.y, self.z, bits))
    }

    pub fn set_data_field(
        &self,
        bits: u16,
        value: u16,
        cause: Option<&Cause>,
    ) -> Result<u16, BlockError> {
        Ok(self
            .chunk()?
            .set_block_data_field(self.x, self.y, self.z, bits, value, cause))
    }

    pub fn add_data_field(
        &self,
        bits: u16,
        value: u16,
        cause: Option<&Cause>,
    ) -> Result<u16, BlockError> {
        Ok(self
            .chunk()?
            .add_block_data_field(self.x, self.y, self.z, bits, value, cause))
    }

    pub fn sky_light(&self) -> Result<u8, BlockError> {
        Ok(self.chunk()?.block_sky_light(self.x, self.y, self.z))
    }

    pub fn sky_light_raw(&self) -> Result<u8, BlockError> {
        Ok(self.chunk()?.block_sky_light_raw(self.x, self.y, self.z))
    }

    pub fn set_sky_light(&self, level: u8, cause: Option<&Cause>) -> Result<(), BlockError> {
        self.chunk()?.set_block_sky_light(self.x, self.y, self.z, level, cause);
        Ok(())
    }

    pub fn block_light(&self) -> Result<u8, BlockError> {
        Ok(self.chunk()?.block_light(self.x, self.y, self.z))
    }

    pub fn set_block_light(&self, level: u8, cause: Option<&Cause>) -> Result<(), BlockError> {
        self.chunk()?.set_block_light(self.x, self.y, self.z, level, cause);
        Ok(())
    }

    /// Received light: the brighter of sky and block light.
    pub fn light(&self) -> Result<u8, BlockError> {
        Ok(self.sky_light()?.max(self.block_light()?))
    }

    pub fn surface_height(&self) -> Result<i32, BlockError> {
        Ok(self.world()?.get_surface_height(self.x, self.z, true))
    }

    /// Whether this block sits at or above the column's surface.
    pub fn is_at_surface(&self) -> Result<bool, BlockError> {
        Ok(self.y >= self.surface_height()?)
    }

    /// The surface block of this column: self when already at or above the
    /// surface, otherwise a locator at surface height.
    pub fn surface(&self) -> Result<Block, BlockError> {
        let height = self.surface_height()?;
        if self.y >= height {
            Ok(self.clone())
        } else {
            Ok(Block::new(
                self.world,
                self.services.clone(),
                self.x,
                height,
                self.z,
            ))
        }
    }

    pub fn biome(&self) -> Result<Biome, BlockError> {
        Ok(self.world()?.get_biome(self.x, self.y, self.z))
    }

    /// Queues a physics check for this block and its neighborhood.
    pub fn queue_update(&self, range: u32) -> Result<(), BlockError> {
        self.world()?.queue_block_physics(self.x, self.y, self.z, range);
        Ok(())
    }

    pub fn reset_dynamic(&self) -> Result<(), BlockError> {
        self.dynamic_region()?.reset_dynamic_block(self.x, self.y, self.z);
        Ok(())
    }

    pub fn sync_reset_dynamic(&self) -> Result<(), BlockError> {
        self.dynamic_region()?
            .sync_reset_dynamic_block(self.x, self.y, self.z);
        Ok(())
    }

    pub fn dynamic_update(&self, exclusive: bool) -> Result<DynamicUpdateEntry, BlockError> {
        Ok(self
            .dynamic_region()?
            .queue_dynamic_update(self.x, self.y, self.z, exclusive))
    }

    pub fn dynamic_update_at(
        &self,
        update_time: u64,
        exclusive: bool,
    ) -> Result<DynamicUpdateEntry, BlockError> {
        Ok(self
            .dynamic_region()?
            .queue_dynamic_update_at(self.x, self.y, self.z, update_time, exclusive))
    }

    pub fn dynamic_update_with(
        &self,
        update_time: u64,
        data: u32,
        exclusive: bool,
    ) -> Result<DynamicUpdateEntry, BlockError> {
        Ok(self.dynamic_region()?.queue_dynamic_update_with(
            self.x,
            self.y,
            self.z,
            update_time,
            data,
            exclusive,
        ))
    }

    pub fn component(&self) -> Result<Option<BlockComponent>, BlockError> {
        Ok(self
            .dynamic_region()?
            .get_block_component(self.x, self.y, self.z))
    }

    pub fn set_component(&self, component: BlockComponent) -> Result<(), BlockError> {
        self.dynamic_region()?
            .set_block_component(self.x, self.y, self.z, component);
        Ok(())
    }

    // Scheduling and components live on the region shell, which exists
    // independently of chunk data.
    fn dynamic_region(&self) -> Result<Arc<Region>, BlockError> {
        Ok(self
            .world()?
            .get_region_from_block(self.x, self.y, self.z))
    }
}

impl Clone for Block {
    fn clone(&self) -> Self {
        Self {
            x: self.x,
            y: self.y,
            z: self.z,
            world: self.world,
            chunk: AtomicHandle::new(self.chunk.load()),
            services: self.services.clone(),
        }
    }
}

impl PartialEq for Block {
    fn eq(&self, other: &Self) -> bool {
        self.world == other.world && self.x == other.x && self.y == other.y && self.z == other.z
    }
}

impl Eq for Block {}

impl Hash for Block {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.world.hash(state);
        self.x.hash(state);
        self.y.hash(state);
        self.z.hash(state);
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Block")
            .field("x", &self.x)
            .field("y", &self.y)
            .field("z", &self.z)
            .field("world", &self.world)
            .finish()
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "block ({}, {}, {})", self.x, self.y, self.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::generator::FlatGenerator;
    use crate::world::geo::ChunkCoord;
    use std::collections::HashSet;

    fn test_world(dir: &std::path::Path) -> Arc<World> {
        let services = Arc::new(Services::new());
        let (tx, _rx) = crossbeam_channel::unbounded();
        World::open(
            "blocks",
            0,
            dir,
            Arc::new(FlatGenerator::new(10, MaterialId(1))),
            services,
            tx,
        )
        .unwrap()
    }

    #[test]
    fn test_identity_ignores_cache() {
        let dir = tempfile::tempdir().unwrap();
        let world = test_world(dir.path());

        let a = world.block_at(1, 2, 3);
        let b = world.block_at(1, 2, 3);
        // Resolve only one of them; they must still compare equal.
        a.chunk().unwrap();
        assert_eq!(a, b);
        assert_ne!(a, world.block_at(1, 2, 4));

        let mut set = HashSet::new();
        set.insert(a.clone());
        assert!(set.contains(&b));
    }

    #[test]
    fn test_reads_and_writes_share_state() {
        let dir = tempfile::tempdir().unwrap();
        let world = test_world(dir.path());

        let block = world.block_at(4, 4, 4);
        assert_eq!(block.material_id().unwrap(), MaterialId(1));
        assert!(block.set_material(MaterialId(2), 3, None).unwrap());

        // A fresh locator with a cold cache sees the same block state.
        let fresh = world.block_at(4, 4, 4);
        assert_eq!(fresh.material_id().unwrap(), MaterialId(2));
        assert_eq!(fresh.data().unwrap(), 3);
    }

    #[test]
    fn test_stale_cache_reresolves_after_unload() {
        let dir = tempfile::tempdir().unwrap();
        let world = test_world(dir.path());

        let block = world.block_at(7, 7, 7);
        block.set_material(MaterialId(4), 0, None).unwrap();
        let before = block.chunk().unwrap();

        world.unload_all(true).unwrap();
        assert!(!before.is_loaded());

        // The locator transparently reloads; the edit survived via disk.
        let after = block.chunk().unwrap();
        assert!(after.is_loaded());
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(block.material_id().unwrap(), MaterialId(4));
    }

    #[test]
    fn test_wrong_hint_is_never_trusted() {
        let dir = tempfile::tempdir().unwrap();
        let world = test_world(dir.path());

        let far = world
            .get_chunk(ChunkCoord::new(30, 0, 0), LoadOption::LoadGen)
            .unwrap();
        // Hint chunk is in another region entirely.
        let block = Block::with_hint(world.handle(), world.services().clone(), 2, 2, 2, &far);
        let resolved = block.chunk().unwrap();
        assert!(resolved.contains_block(2, 2, 2));

        // Hint in the right region but the wrong chunk seeds via a region
        // lookup or not at all, never with the wrong chunk.
        let neighbor = world
            .get_chunk(ChunkCoord::new(1, 0, 0), LoadOption::LoadGen)
            .unwrap();
        let block = Block::with_hint(world.handle(), world.services().clone(), 2, 2, 2, &neighbor);
        assert!(block.chunk().unwrap().contains_block(2, 2, 2));
    }

    #[test]
    fn test_translate_carries_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let world = test_world(dir.path());

        let block = world.block_at(15, 5, 15);
        block.chunk().unwrap();

        let same = block.translate(0, 0, 0);
        assert_eq!(same, block);
        assert!(same.chunk().unwrap().contains_block(15, 5, 15));

        // Crossing the chunk boundary resolves the neighboring chunk.
        let next = block.translate(1, 0, 0);
        assert_eq!(next.x(), 16);
        assert!(next.chunk().unwrap().contains_block(16, 5, 15));
        assert_ne!(next, block);

        let above = block.translate_face(BlockFace::Top);
        assert_eq!(above.y(), 6);
        let below = block.translate_face_by(BlockFace::Bottom, 3);
        assert_eq!(below.y(), 2);
    }

    #[test]
    fn test_world_unload_invalidates_locator() {
        let dir = tempfile::tempdir().unwrap();
        let world = test_world(dir.path());
        let block = world.block_at(0, 0, 0);
        block.chunk().unwrap();

        drop(world);
        assert_eq!(block.world().err(), Some(BlockError::WorldUnloaded));
        assert_eq!(block.chunk().err(), Some(BlockError::WorldUnloaded));
    }

    #[test]
    fn test_light_and_surface_queries() {
        let dir = tempfile::tempdir().unwrap();
        let world = test_world(dir.path());

        let air = world.block_at(0, 11, 0);
        assert_eq!(air.sky_light().unwrap(), 15);
        air.set_block_light(4, None).unwrap();
        assert_eq!(air.light().unwrap(), 15);
        // Above the surface still counts as at-surface.
        assert!(air.is_at_surface().unwrap());

        let top = world.block_at(0, 10, 0);
        assert!(top.is_at_surface().unwrap());
        assert!(!world.block_at(0, 9, 0).is_at_surface().unwrap());
    }

    #[test]
    fn test_surface_locator() {
        let dir = tempfile::tempdir().unwrap();
        let world = test_world(dir.path());

        // A buried block surfaces at the column's top solid block.
        let buried = world.block_at(2, 3, 2);
        let surface = buried.surface().unwrap();
        assert_eq!(surface, world.block_at(2, 10, 2));
        assert_eq!(surface.material_id().unwrap(), MaterialId(1));

        // At or above the surface, the locator is its own surface.
        let above = world.block_at(2, 12, 2);
        assert_eq!(above.surface().unwrap(), above);
        assert_eq!(surface.surface().unwrap(), surface);
    }

    #[test]
    fn test_dynamic_scheduling_through_locator() {
        let dir = tempfile::tempdir().unwrap();
        let world = test_world(dir.path());

        let block = world.block_at(3, 3, 3);
        block.dynamic_update_at(5, false).unwrap();
        block.dynamic_update_at(5, true).unwrap();
        let region = world.get_region_from_block(3, 3, 3);
        assert_eq!(region.queued_update_count(), 1);

        block.set_component(BlockComponent {
            name: "hopper".into(),
            data: 0,
        })
        .unwrap();
        assert_eq!(block.component().unwrap().unwrap().name, "hopper");
    }
}

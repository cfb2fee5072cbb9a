use crate::world::chunk::{SerializedChunk, CHUNK_SIZE};
use crate::world::geo::ChunkCoord;
use crate::world::material::{MaterialId, MaterialRegistry};
use noise::{NoiseFn, Perlin};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha12Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Biome {
    Plains,
    Forest,
    Desert,
    Ocean,
    Mountains,
}

/// Fills chunks the paging layer could not find on disk, and answers
/// column queries for unloaded terrain.
pub trait WorldGenerator: Send + Sync {
    fn generate_chunk(&self, coord: ChunkCoord) -> SerializedChunk;

    /// Height of the topmost generated solid block in the column.
    fn surface_height(&self, x: i32, z: i32) -> i32;

    fn biome(&self, x: i32, y: i32, z: i32) -> Biome;
}

/// Single-material slab up to a fixed height. Deterministic; used by tests
/// and as a cheap fallback world type.
pub struct FlatGenerator {
    pub ground: i32,
    pub material: MaterialId,
}

impl FlatGenerator {
    pub fn new(ground: i32, material: MaterialId) -> Self {
        Self { ground, material }
    }
}

impl WorldGenerator for FlatGenerator {
    fn generate_chunk(&self, coord: ChunkCoord) -> SerializedChunk {
        let mut snapshot = SerializedChunk::empty(coord);
        let base = coord.base();
        for ly in 0..CHUNK_SIZE {
            let world_y = base.y + ly;
            for lz in 0..CHUNK_SIZE {
                for lx in 0..CHUNK_SIZE {
                    let index = (lx + lz * CHUNK_SIZE + ly * CHUNK_SIZE * CHUNK_SIZE) as usize;
                    if world_y <= self.ground {
                        snapshot.materials[index] = self.material.0;
                    } else {
                        snapshot.sky_light[index] = 15;
                    }
                }
            }
        }
        snapshot
    }

    fn surface_height(&self, _x: i32, _z: i32) -> i32 {
        self.ground
    }

    fn biome(&self, _x: i32, _y: i32, _z: i32) -> Biome {
        Biome::Plains
    }
}

/// Perlin-height terrain with a dirt/grass skin over stone and water up to
/// sea level. Per-chunk detail (ore-style strata jitter) comes from a
/// `ChaCha12Rng` seeded from the world seed and chunk coordinate, so
/// regeneration is reproducible.
pub struct NoiseGenerator {
    seed: u64,
    height_noise: Perlin,
    biome_noise: Perlin,
    sea_level: i32,
    stone: MaterialId,
    dirt: MaterialId,
    grass: MaterialId,
    sand: MaterialId,
    water: MaterialId,
}

impl NoiseGenerator {
    pub fn new(seed: u64, sea_level: i32, materials: &MaterialRegistry) -> Self {
        let id = |name: &str| {
            materials
                .get_by_name(name)
                .map(|m| m.id)
                .unwrap_or(MaterialId::AIR)
        };
        Self {
            seed,
            height_noise: Perlin::new(seed as u32),
            biome_noise: Perlin::new((seed as u32).wrapping_add(1)),
            sea_level,
            stone: id("stone"),
            dirt: id("dirt"),
            grass: id("grass"),
            sand: id("sand"),
            water: id("water"),
        }
    }

    fn chunk_rng(&self, coord: ChunkCoord) -> ChaCha12Rng {
        ChaCha12Rng::seed_from_u64(
            self.seed
                .wrapping_add((coord.x() as u64).wrapping_mul(341_873_128_712))
                .wrapping_add((coord.y() as u64).wrapping_mul(132_897_987_541))
                .wrapping_add((coord.z() as u64).wrapping_mul(914_494_178_609)),
        )
    }

    fn column_height(&self, x: i32, z: i32) -> i32 {
        let xf = x as f64 * 0.03;
        let zf = z as f64 * 0.03;
        let base = 60.0;
        let variation = self.height_noise.get([xf, zf]) * 14.0;
        (base + variation) as i32
    }
}

impl WorldGenerator for NoiseGenerator {
    fn generate_chunk(&self, coord: ChunkCoord) -> SerializedChunk {
        let mut snapshot = SerializedChunk::empty(coord);
        let base = coord.base();
        let mut rng = self.chunk_rng(coord);

        for lz in 0..CHUNK_SIZE {
            for lx in 0..CHUNK_SIZE {
                let world_x = base.x + lx;
                let world_z = base.z + lz;
                let height = self.column_height(world_x, world_z);
                let beach = height <= self.sea_level + 1;

                for ly in 0..CHUNK_SIZE {
                    let world_y = base.y + ly;
                    let index = (lx + lz * CHUNK_SIZE + ly * CHUNK_SIZE * CHUNK_SIZE) as usize;

                    let material = if world_y > height {
                        if world_y <= self.sea_level {
                            self.water
                        } else {
                            MaterialId::AIR
                        }
                    } else if world_y == height {
                        if beach {
                            self.sand
                        } else {
                            self.grass
                        }
                    } else if world_y >= height - 3 {
                        if beach {
                            self.sand
                        } else {
                            self.dirt
                        }
                    } else {
                        self.stone
                    };

                    snapshot.materials[index] = material.0;
                    if material == self.stone && rng.gen_ratio(1, 32) {
                        // Strata variant, consumed by decoration passes.
                        snapshot.data[index] = 1;
                    }
                    if world_y > height && world_y > self.sea_level {
                        snapshot.sky_light[index] = 15;
                    }
                }
            }
        }
        snapshot
    }

    fn surface_height(&self, x: i32, z: i32) -> i32 {
        self.column_height(x, z)
    }

    fn biome(&self, x: i32, _y: i32, z: i32) -> Biome {
        let height = self.column_height(x, z);
        if height <= self.sea_level {
            return Biome::Ocean;
        }
        if height > 68 {
            return Biome::Mountains;
        }
        let moisture = self.biome_noise.get([x as f64 * 0.008, z as f64 * 0.008]);
        if moisture < -0.3 {
            Biome::Desert
        } else if moisture > 0.3 {
            Biome::Forest
        } else {
            Biome::Plains
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_generator_fills_to_ground() {
        let generator = FlatGenerator::new(10, MaterialId(1));
        let snapshot = generator.generate_chunk(ChunkCoord::new(0, 0, 0));
        // y = 10 is ground, y = 11 is air with full sky light.
        let at = |x: i32, y: i32, z: i32| {
            let index = (x + z * CHUNK_SIZE + y * CHUNK_SIZE * CHUNK_SIZE) as usize;
            (snapshot.materials[index], snapshot.sky_light[index])
        };
        assert_eq!(at(0, 10, 0), (1, 0));
        assert_eq!(at(0, 11, 0), (0, 15));
        assert_eq!(generator.surface_height(123, -456), 10);
    }

    #[test]
    fn test_noise_generator_is_deterministic() {
        let materials = MaterialRegistry::with_defaults();
        let a = NoiseGenerator::new(42, 58, &materials);
        let b = NoiseGenerator::new(42, 58, &materials);
        let coord = ChunkCoord::new(3, 3, -2);
        let first = a.generate_chunk(coord);
        let second = b.generate_chunk(coord);
        assert_eq!(first.materials, second.materials);
        assert_eq!(first.data, second.data);
    }

    #[test]
    fn test_noise_surface_matches_generated_chunk() {
        let materials = MaterialRegistry::with_defaults();
        let generator = NoiseGenerator::new(7, 58, &materials);
        let height = generator.surface_height(5, 5);
        let coord = ChunkCoord::from_block(5, height, 5);
        let snapshot = generator.generate_chunk(coord);

        let lx = 5i32.rem_euclid(CHUNK_SIZE);
        let ly = height.rem_euclid(CHUNK_SIZE);
        let lz = 5i32.rem_euclid(CHUNK_SIZE);
        let index = (lx + lz * CHUNK_SIZE + ly * CHUNK_SIZE * CHUNK_SIZE) as usize;
        assert_ne!(snapshot.materials[index], MaterialId::AIR.0);
    }
}

use crate::world::generator::{FlatGenerator, NoiseGenerator, WorldGenerator};
use crate::world::material::{MaterialId, MaterialRegistry};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeneratorKind {
    Flat,
    Noise,
}

/// Terrain settings for the default world, read from `worldgen.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldGenConfig {
    pub world_seed: u64,
    pub generator: GeneratorKind,
    pub sea_level: i32,
    /// Ground height used by the flat generator.
    pub flat_ground: i32,
}

impl Default for WorldGenConfig {
    fn default() -> Self {
        Self {
            world_seed: 0,
            generator: GeneratorKind::Noise,
            sea_level: 58,
            flat_ground: 10,
        }
    }
}

impl WorldGenConfig {
    /// Reads the config file, falling back to defaults when it is missing
    /// or malformed.
    pub fn load_or_default(path: &std::path::Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(text) => match toml::from_str(&text) {
                Ok(config) => config,
                Err(e) => {
                    log::warn!("invalid config at {}: {}; using defaults", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    pub fn build(&self, materials: &MaterialRegistry) -> Arc<dyn WorldGenerator> {
        match self.generator {
            GeneratorKind::Flat => {
                let surface = materials
                    .get_by_name("grass")
                    .map_or(MaterialId::AIR, |m| m.id);
                Arc::new(FlatGenerator::new(self.flat_ground, surface))
            }
            GeneratorKind::Noise => {
                Arc::new(NoiseGenerator::new(self.world_seed, self.sea_level, materials))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::geo::ChunkCoord;

    #[test]
    fn test_flat_config_builds_flat_terrain() {
        let materials = MaterialRegistry::with_defaults();
        let config = WorldGenConfig {
            generator: GeneratorKind::Flat,
            flat_ground: 5,
            ..WorldGenConfig::default()
        };
        let generator = config.build(&materials);
        assert_eq!(generator.surface_height(0, 0), 5);
    }

    #[test]
    fn test_noise_config_uses_seed() {
        let materials = MaterialRegistry::with_defaults();
        let a = WorldGenConfig {
            world_seed: 1,
            ..WorldGenConfig::default()
        };
        let b = WorldGenConfig {
            world_seed: 2,
            ..WorldGenConfig::default()
        };
        let coord = ChunkCoord::new(0, 3, 0);
        let first = a.build(&materials).generate_chunk(coord);
        let second = b.build(&materials).generate_chunk(coord);
        assert_ne!(first.materials, second.materials);
    }
}

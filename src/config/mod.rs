mod core;
mod worldgen;

pub use self::core::EngineConfig;
pub use self::worldgen::{GeneratorKind, WorldGenConfig};

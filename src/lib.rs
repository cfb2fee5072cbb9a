pub mod command;
pub mod config;
pub mod engine;
pub mod player;
pub mod plugin;
pub mod world;

pub use command::{CommandArgs, CommandDispatcher, CommandError, CommandSource, ConsoleSource};
pub use config::{EngineConfig, GeneratorKind, WorldGenConfig};
pub use engine::{Engine, EngineError, Services};
pub use player::Player;
pub use plugin::{PluginDescriptor, PluginError, PluginManager};
pub use world::{
    Block, BlockError, BlockFace, Cause, Chunk, ChunkCoord, LoadOption, MaterialId,
    MaterialRegistry, Point, Transform, World, WorldGenerator,
};

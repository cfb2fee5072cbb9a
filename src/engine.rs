use crate::command::CommandSource;
use crate::config::EngineConfig;
use crate::player::Player;
use crate::plugin::PluginManager;
use crate::world::chunk::{BlockEvent, Chunk};
use crate::world::core::World;
use crate::world::generator::WorldGenerator;
use crate::world::handle::WeakRegistry;
use crate::world::material::MaterialRegistry;
use crate::world::storage::StorageError;
use crossbeam_channel::{Receiver, Sender};
use log::info;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Unknown world: {0}")]
    UnknownWorld(String),

    #[error("World already exists: {0}")]
    WorldExists(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Shared lookup services threaded through worlds and locators. One
/// instance per engine; nothing here is global.
pub struct Services {
    pub worlds: WeakRegistry<World>,
    pub chunks: WeakRegistry<Chunk>,
    pub materials: Arc<MaterialRegistry>,
}

impl Services {
    pub fn new() -> Self {
        Self {
            worlds: WeakRegistry::new(),
            chunks: WeakRegistry::new(),
            materials: Arc::new(MaterialRegistry::with_defaults()),
        }
    }
}

impl Default for Services {
    fn default() -> Self {
        Self::new()
    }
}

/// Top-level owner of worlds, players and plugins. Holds the only strong
/// references to worlds; everything else reaches them through handles.
pub struct Engine {
    services: Arc<Services>,
    config: EngineConfig,
    worlds: RwLock<HashMap<String, Arc<World>>>,
    players: RwLock<HashMap<String, Arc<Player>>>,
    plugins: PluginManager,
    running: AtomicBool,
    events: (Sender<BlockEvent>, Receiver<BlockEvent>),
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            services: Arc::new(Services::new()),
            config,
            worlds: RwLock::new(HashMap::new()),
            players: RwLock::new(HashMap::new()),
            plugins: PluginManager::new(),
            running: AtomicBool::new(true),
            events: crossbeam_channel::unbounded(),
        }
    }

    pub fn services(&self) -> &Arc<Services> {
        &self.services
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn plugins(&self) -> &PluginManager {
        &self.plugins
    }

    pub fn create_world(
        &self,
        name: &str,
        seed: u64,
        generator: Arc<dyn WorldGenerator>,
    ) -> Result<Arc<World>, EngineError> {
        let mut worlds = self.worlds.write();
        if worlds.contains_key(name) {
            return Err(EngineError::WorldExists(name.to_string()));
        }
        let world = World::open(
            name,
            seed,
            &self.config.data_dir.join("worlds"),
            generator,
            self.services.clone(),
            self.events.0.clone(),
        )?;
        worlds.insert(name.to_string(), world.clone());
        Ok(world)
    }

    pub fn get_world(&self, name: &str) -> Option<Arc<World>> {
        self.worlds.read().get(name).cloned()
    }

    pub fn default_world(&self) -> Option<Arc<World>> {
        self.get_world(&self.config.default_world)
    }

    pub fn worlds(&self) -> Vec<Arc<World>> {
        self.worlds.read().values().cloned().collect()
    }

    /// Saves (optionally) and drops the world. The engine holds the only
    /// strong reference, so this expires every handle pointing at it.
    pub fn unload_world(&self, name: &str, save: bool) -> Result<(), EngineError> {
        let world = self
            .worlds
            .write()
            .remove(name)
            .ok_or_else(|| EngineError::UnknownWorld(name.to_string()))?;
        world.unload_all(save)?;
        info!("unloaded world '{}'", name);
        Ok(())
    }

    pub fn add_player(&self, name: &str) -> Arc<Player> {
        let player = Arc::new(Player::new(name));
        self.players
            .write()
            .insert(name.to_lowercase(), player.clone());
        player
    }

    pub fn remove_player(&self, name: &str) -> Option<Arc<Player>> {
        let player = self.players.write().remove(&name.to_lowercase())?;
        player.set_online(false);
        Some(player)
    }

    /// Case-insensitive player lookup. With `exact` false, a unique name
    /// prefix also matches.
    pub fn get_player(&self, name: &str, exact: bool) -> Option<Arc<Player>> {
        let key = name.to_lowercase();
        let players = self.players.read();
        if let Some(player) = players.get(&key) {
            return Some(player.clone());
        }
        if exact {
            return None;
        }
        let mut matches = players.values().filter(|p| p.name().to_lowercase().starts_with(&key));
        let first = matches.next()?.clone();
        if matches.next().is_some() {
            // Ambiguous prefix.
            return None;
        }
        Some(first)
    }

    pub fn online_players(&self) -> Vec<Arc<Player>> {
        self.players
            .read()
            .values()
            .filter(|p| p.is_online())
            .cloned()
            .collect()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Broadcasts the message and flags the main loop to exit.
    pub fn stop(&self, message: &str) {
        for player in self.online_players() {
            player.send_message(message);
        }
        info!("engine stopping: {}", message);
        self.running.store(false, Ordering::Release);
    }

    /// Block events emitted by chunk mutations since the last drain.
    pub fn drain_block_events(&self) -> Vec<BlockEvent> {
        self.events.1.try_iter().collect()
    }

    /// Advances every world one tick.
    pub fn tick(&self) {
        for world in self.worlds() {
            let due = world.tick();
            if !due.is_empty() {
                info!(
                    "world '{}': {} dynamic updates due at tick {}",
                    world.name(),
                    due.len(),
                    world.age()
                );
            }
        }
    }

    /// Logs a snapshot of engine state. The closest a single process gets
    /// to a full thread dump without platform hooks.
    pub fn log_diagnostics(&self) {
        let worlds = self.worlds();
        info!(
            "diagnostics: {} worlds, {} players online, {} live chunk handles, {} plugins",
            worlds.len(),
            self.online_players().len(),
            self.services.chunks.live_count(),
            self.plugins.list().len()
        );
        for world in worlds {
            info!(
                "  world '{}': age {}, {} regions, {} loaded chunks, {} queued physics",
                world.name(),
                world.age(),
                world.region_count(),
                world.loaded_chunk_count(),
                world.queued_physics_count()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::generator::FlatGenerator;
    use crate::world::material::MaterialId;
    use crate::world::region::LoadOption;

    fn test_engine() -> (Engine, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = EngineConfig::default();
        config.data_dir = dir.path().to_path_buf();
        (Engine::new(config), dir)
    }

    fn flat() -> Arc<dyn WorldGenerator> {
        Arc::new(FlatGenerator::new(10, MaterialId(1)))
    }

    #[test]
    fn test_world_lifecycle() {
        let (engine, _dir) = test_engine();
        let world = engine.create_world("alpha", 1, flat()).unwrap();
        assert!(engine.get_world("alpha").is_some());
        assert!(matches!(
            engine.create_world("alpha", 1, flat()),
            Err(EngineError::WorldExists(_))
        ));

        // A locator keeps working while the engine holds the world...
        let block = world.block_at(0, 0, 0);
        drop(world);
        assert!(block.chunk().is_ok());

        // ...and expires when the engine lets go.
        engine.unload_world("alpha", false).unwrap();
        assert!(block.world().is_err());
        assert!(matches!(
            engine.unload_world("alpha", false),
            Err(EngineError::UnknownWorld(_))
        ));
    }

    #[test]
    fn test_player_lookup_prefix() {
        let (engine, _dir) = test_engine();
        engine.add_player("Notch");
        engine.add_player("Nobody");
        engine.add_player("Steve");

        assert_eq!(engine.get_player("notch", true).unwrap().name(), "Notch");
        assert!(engine.get_player("not", true).is_none());
        assert_eq!(engine.get_player("st", false).unwrap().name(), "Steve");
        // "no" is ambiguous between Notch and Nobody.
        assert!(engine.get_player("no", false).is_none());
    }

    #[test]
    fn test_stop_broadcasts() {
        let (engine, _dir) = test_engine();
        let player = engine.add_player("Steve");
        assert!(engine.is_running());
        engine.stop("going down");
        assert!(!engine.is_running());
        assert_eq!(player.take_messages(), vec!["going down".to_string()]);
    }

    #[test]
    fn test_block_events_reach_engine() {
        let (engine, _dir) = test_engine();
        let world = engine.create_world("alpha", 1, flat()).unwrap();
        world
            .get_chunk_from_block(0, 0, 0, LoadOption::LoadGen)
            .unwrap();
        world.block_at(1, 1, 1).set_material(MaterialId(2), 0, None).unwrap();

        let events = engine.drain_block_events();
        assert_eq!(events.len(), 1);
        assert!(engine.drain_block_events().is_empty());
    }
}

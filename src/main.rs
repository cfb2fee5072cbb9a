use anyhow::Result;
use crossbeam_channel::{select, tick, unbounded};
use log::{info, LevelFilter};
use simple_logger::SimpleLogger;
use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use voxhold::command::{CommandDispatcher, ConsoleSource};
use voxhold::config::{EngineConfig, WorldGenConfig};
use voxhold::engine::Engine;

fn main() -> Result<()> {
    let config = EngineConfig::load_or_default(Path::new("engine.toml"));
    let level = config.log_level.parse().unwrap_or(LevelFilter::Info);
    SimpleLogger::new().with_level(level).init()?;

    let worldgen = WorldGenConfig::load_or_default(Path::new("worldgen.toml"));
    let tick_ms = config.tick_ms;
    let default_world = config.default_world.clone();

    let engine = Arc::new(Engine::new(config));
    let generator = worldgen.build(&engine.services().materials);
    engine.create_world(&default_world, worldgen.world_seed, generator)?;
    info!("default world '{}' ready", default_world);

    let dispatcher = CommandDispatcher::new(engine.clone());

    // Console reader thread; the main loop owns everything else.
    let (console_tx, console_rx) = unbounded::<String>();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if console_tx.send(line).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });

    let ticker = tick(Duration::from_millis(tick_ms));
    while engine.is_running() {
        select! {
            recv(ticker) -> _ => {
                engine.tick();
                engine.drain_block_events();
            }
            recv(console_rx) -> line => {
                if let Ok(line) = line {
                    dispatcher.dispatch(&ConsoleSource, &line);
                }
            }
        }
    }

    for world in engine.worlds() {
        let saved = world.save_all()?;
        info!("saved {} chunks for world '{}'", saved, world.name());
    }
    info!("shutdown complete");
    Ok(())
}

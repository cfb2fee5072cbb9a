use crate::command::{CommandArgs, CommandDispatcher, CommandError, CommandSource, CommandSpec};
use crate::player::Player;
use crate::world::core::World;
use crate::world::geo::{Point, Transform};
use crate::world::region::LoadOption;
use glam::Vec3;
use std::sync::Arc;

/// The built-in administrative commands.
pub fn specs() -> Vec<CommandSpec> {
    vec![
        CommandSpec {
            name: "stop",
            aliases: &[],
            usage: "stop [message]",
            description: "Stop the engine, broadcasting an optional message",
            permission: Some("voxhold.command.stop"),
            min_args: 0,
            max_args: None,
            handler: stop,
        },
        CommandSpec {
            name: "stackdump",
            aliases: &["dumpstack"],
            usage: "stackdump",
            description: "Write an engine state snapshot to the log",
            permission: Some("voxhold.command.stackdump"),
            min_args: 0,
            max_args: Some(0),
            handler: stackdump,
        },
        CommandSpec {
            name: "reload",
            aliases: &[],
            usage: "reload [plugin]",
            description: "Reload one plugin, or all reloadable plugins",
            permission: Some("voxhold.command.reload"),
            min_args: 0,
            max_args: Some(1),
            handler: reload,
        },
        CommandSpec {
            name: "plugins",
            aliases: &["pl"],
            usage: "plugins",
            description: "List registered plugins",
            permission: Some("voxhold.command.plugins"),
            min_args: 0,
            max_args: Some(0),
            handler: plugins,
        },
        CommandSpec {
            name: "batch",
            aliases: &[],
            usage: "batch <file>",
            description: "Run each line of a batch file as a command",
            permission: Some("voxhold.command.batch"),
            min_args: 1,
            max_args: Some(1),
            handler: batch,
        },
        CommandSpec {
            name: "setspawn",
            aliases: &[],
            usage: "setspawn [<world> <x> <y> <z>]",
            description: "Set a world's spawn point",
            permission: Some("voxhold.command.setspawn"),
            min_args: 0,
            max_args: Some(4),
            handler: setspawn,
        },
        CommandSpec {
            name: "whatisspawn",
            aliases: &[],
            usage: "whatisspawn [world]",
            description: "Show a world's spawn point",
            permission: Some("voxhold.command.whatisspawn"),
            min_args: 0,
            max_args: Some(1),
            handler: whatisspawn,
        },
        CommandSpec {
            name: "worldinfo",
            aliases: &[],
            usage: "worldinfo [world]",
            description: "List worlds, or show details for one",
            permission: Some("voxhold.command.worldinfo"),
            min_args: 0,
            max_args: Some(1),
            handler: worldinfo,
        },
        CommandSpec {
            name: "regioninfo",
            aliases: &[],
            usage: "regioninfo <world> [<x> <y> <z>]",
            description: "Show a world's region totals, or the region containing a block",
            permission: Some("voxhold.command.regioninfo"),
            min_args: 1,
            max_args: Some(4),
            handler: regioninfo,
        },
        CommandSpec {
            name: "tp",
            aliases: &["teleport"],
            usage: "tp <player> | tp <player> <player> | tp [player] <x> <y> <z> [-w world]",
            description: "Teleport to a player, or move a player to a position",
            permission: Some("voxhold.command.tp"),
            min_args: 1,
            max_args: Some(4),
            handler: tp,
        },
    ]
}

fn require_player<'a>(source: &'a dyn CommandSource) -> Result<&'a Player, CommandError> {
    source
        .as_player()
        .ok_or_else(|| CommandError::new("Only players may use that form of the command."))
}

fn find_online(
    dispatcher: &CommandDispatcher,
    name: &str,
) -> Result<Arc<Player>, CommandError> {
    dispatcher
        .engine()
        .get_player(name, false)
        .filter(|p| p.is_online())
        .ok_or_else(|| CommandError(format!("{} is not online.", name)))
}

fn find_world(dispatcher: &CommandDispatcher, name: &str) -> Result<Arc<World>, CommandError> {
    dispatcher
        .engine()
        .get_world(name)
        .ok_or_else(|| CommandError(format!("Unknown world: {}", name)))
}

fn fmt_vec(position: Vec3) -> String {
    format!("({:.1}, {:.1}, {:.1})", position.x, position.y, position.z)
}

fn stop(
    dispatcher: &CommandDispatcher,
    _source: &dyn CommandSource,
    args: &CommandArgs,
) -> Result<(), CommandError> {
    let message = if args.is_empty() {
        "Engine stopped.".to_string()
    } else {
        args.joined(0)
    };
    dispatcher.engine().stop(&message);
    Ok(())
}

fn stackdump(
    dispatcher: &CommandDispatcher,
    source: &dyn CommandSource,
    _args: &CommandArgs,
) -> Result<(), CommandError> {
    dispatcher.engine().log_diagnostics();
    source.send_message("Engine diagnostics written to the log.");
    Ok(())
}

fn reload(
    dispatcher: &CommandDispatcher,
    source: &dyn CommandSource,
    args: &CommandArgs,
) -> Result<(), CommandError> {
    let plugins = dispatcher.engine().plugins();
    if args.is_empty() {
        let count = plugins.reload_all();
        source.send_message(&format!("Reloaded {} plugins.", count));
    } else {
        let name = args.string(0)?;
        plugins.reload(name).map_err(|e| CommandError(e.to_string()))?;
        source.send_message(&format!("Reloaded plugin '{}'.", name));
    }
    Ok(())
}

fn plugins(
    dispatcher: &CommandDispatcher,
    source: &dyn CommandSource,
    _args: &CommandArgs,
) -> Result<(), CommandError> {
    let list = dispatcher.engine().plugins().list();
    if list.is_empty() {
        source.send_message("No plugins registered.");
        return Ok(());
    }
    let names: Vec<String> = list
        .iter()
        .map(|r| {
            let d = r.descriptor();
            format!("{} v{}", d.name, d.version)
        })
        .collect();
    source.send_message(&format!("Plugins ({}): {}", list.len(), names.join(", ")));
    Ok(())
}

fn batch(
    dispatcher: &CommandDispatcher,
    source: &dyn CommandSource,
    args: &CommandArgs,
) -> Result<(), CommandError> {
    let file = args.string(0)?;
    // Each batch file carries its own permission node, so access can be
    // granted per script.
    let node = format!("voxhold.command.batch.{}", file);
    if !source.has_permission(&node) {
        return Err(CommandError(format!(
            "You do not have permission to run batch file '{}'.",
            file
        )));
    }
    let path = dispatcher.engine().config().data_dir.join("batches").join(file);
    let text = std::fs::read_to_string(&path)
        .map_err(|_| CommandError(format!("Could not read batch file '{}'.", file)))?;

    let mut executed = 0;
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        dispatcher.dispatch(source, line);
        executed += 1;
    }
    source.send_message(&format!("Executed {} commands from '{}'.", executed, file));
    Ok(())
}

fn setspawn(
    dispatcher: &CommandDispatcher,
    source: &dyn CommandSource,
    args: &CommandArgs,
) -> Result<(), CommandError> {
    let (world, position) = if args.is_empty() {
        let player = require_player(source)?;
        let point = player.position();
        let world = dispatcher
            .engine()
            .services()
            .worlds
            .resolve(point.world)
            .ok_or_else(|| CommandError::new("You are not in a loaded world."))?;
        (world, point.position)
    } else if args.len() == 4 {
        let world = find_world(dispatcher, args.string(0)?)?;
        let position = Vec3::new(args.float(1)?, args.float(2)?, args.float(3)?);
        (world, position)
    } else {
        return Err(CommandError::new("Usage: setspawn [<world> <x> <y> <z>]"));
    };
    world.set_spawn_point(Transform::at(position));
    source.send_message(&format!(
        "Spawn of '{}' set to {}.",
        world.name(),
        fmt_vec(position)
    ));
    Ok(())
}

fn whatisspawn(
    dispatcher: &CommandDispatcher,
    source: &dyn CommandSource,
    args: &CommandArgs,
) -> Result<(), CommandError> {
    // Same asymmetry as setspawn: a player defaults to their own world,
    // the console must name one.
    let world = if args.is_empty() {
        let player = source
            .as_player()
            .ok_or_else(|| CommandError::new("Usage: whatisspawn <world>"))?;
        dispatcher
            .engine()
            .services()
            .worlds
            .resolve(player.position().world)
            .ok_or_else(|| CommandError::new("You are not in a loaded world."))?
    } else {
        find_world(dispatcher, args.string(0)?)?
    };
    let spawn = world.spawn_point();
    source.send_message(&format!(
        "Spawn of '{}' is {}.",
        world.name(),
        fmt_vec(spawn.position)
    ));
    Ok(())
}

fn worldinfo(
    dispatcher: &CommandDispatcher,
    source: &dyn CommandSource,
    args: &CommandArgs,
) -> Result<(), CommandError> {
    if args.is_empty() {
        let worlds = dispatcher.engine().worlds();
        if worlds.is_empty() {
            source.send_message("No worlds are loaded.");
            return Ok(());
        }
        let mut names: Vec<&str> = worlds.iter().map(|w| w.name()).collect();
        names.sort_unstable();
        source.send_message(&format!("Worlds ({}): {}", names.len(), names.join(", ")));
        return Ok(());
    }
    let world = find_world(dispatcher, args.string(0)?)?;
    source.send_message(&format!(
        "World '{}': seed {}, age {} ticks, {} regions, {} loaded chunks",
        world.name(),
        world.seed(),
        world.age(),
        world.region_count(),
        world.loaded_chunk_count()
    ));
    Ok(())
}

fn regioninfo(
    dispatcher: &CommandDispatcher,
    source: &dyn CommandSource,
    args: &CommandArgs,
) -> Result<(), CommandError> {
    let world = find_world(dispatcher, args.string(0)?)?;
    if args.len() == 1 {
        source.send_message(&format!(
            "World '{}': {} regions, {} loaded chunks",
            world.name(),
            world.region_count(),
            world.loaded_chunk_count()
        ));
        return Ok(());
    }
    if args.len() != 4 {
        return Err(CommandError::new("Usage: regioninfo <world> [<x> <y> <z>]"));
    }
    let x = args.integer(1)? as i32;
    let y = args.integer(2)? as i32;
    let z = args.integer(3)? as i32;

    let coord = crate::world::geo::RegionCoord::from_block(x, y, z);
    match world.get_region_if_loaded(coord) {
        Some(region) => source.send_message(&format!(
            "Region {} of '{}': {} loaded chunks, {} queued dynamic updates",
            region.position(),
            world.name(),
            region.loaded_chunk_count(),
            region.queued_update_count()
        )),
        None => source.send_message(&format!(
            "No region is loaded at {} in '{}'.",
            coord,
            world.name()
        )),
    }
    Ok(())
}

fn tp(
    dispatcher: &CommandDispatcher,
    source: &dyn CommandSource,
    args: &CommandArgs,
) -> Result<(), CommandError> {
    let engine = dispatcher.engine();

    // tp <player>: the issuing player goes to the named player.
    if args.len() == 1 {
        let mover = require_player(source)?;
        let target = find_online(dispatcher, args.string(0)?)?;
        let destination = target.position();
        complete_teleport(dispatcher, mover, destination);
        mover.send_message(&format!(
            "Teleported to {} at {}.",
            target.name(),
            fmt_vec(destination.position)
        ));
        return Ok(());
    }

    // tp <player> <player>: move the first to the second.
    if args.len() == 2 {
        let mover = find_online(dispatcher, args.string(0)?)?;
        let target = find_online(dispatcher, args.string(1)?)?;
        let destination = target.position();
        complete_teleport(dispatcher, &mover, destination);
        mover.send_message(&format!("You were teleported to {}.", target.name()));
        source.send_message(&format!(
            "Teleported {} to {}.",
            mover.name(),
            target.name()
        ));
        return Ok(());
    }

    // tp [player] <x> <y> <z> [-w world]: coordinates, optionally in
    // another world.
    let (mover, coord_start): (Arc<Player>, usize) = if args.len() == 4 {
        (find_online(dispatcher, args.string(0)?)?, 1)
    } else {
        let player = require_player(source)?;
        let mover = engine
            .get_player(player.name(), true)
            .ok_or_else(|| CommandError(format!("{} is not online.", player.name())))?;
        (mover, 0)
    };

    let base = mover.position();
    let position = Vec3::new(
        args.relative_coord(coord_start, base.position.x)?,
        args.relative_coord(coord_start + 1, base.position.y)?,
        args.relative_coord(coord_start + 2, base.position.z)?,
    );

    let world_handle = match args.flag('w') {
        Some(name) => {
            if !source.has_permission("voxhold.command.tp.world-flag") {
                return Err(CommandError::new(
                    "You do not have permission to teleport across worlds.",
                ));
            }
            find_world(dispatcher, name)?.handle()
        }
        None => base.world,
    };

    let destination = Point::new(world_handle, position);
    complete_teleport(dispatcher, &mover, destination);
    mover.send_message(&format!("You were teleported to {}.", fmt_vec(position)));
    if source.name() != mover.name() {
        source.send_message(&format!(
            "Teleported {} to {}.",
            mover.name(),
            fmt_vec(position)
        ));
    }
    Ok(())
}

// Moves the player and makes sure the ground under the destination exists
// before they arrive.
fn complete_teleport(dispatcher: &CommandDispatcher, player: &Player, destination: Point) {
    if let Some(world) = dispatcher
        .engine()
        .services()
        .worlds
        .resolve(destination.world)
    {
        world.get_chunk_from_block(
            destination.block_x(),
            destination.block_y(),
            destination.block_z(),
            LoadOption::LoadGen,
        );
    }
    player.teleport(destination);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::ConsoleSource;
    use crate::config::EngineConfig;
    use crate::engine::Engine;
    use crate::world::generator::FlatGenerator;
    use crate::world::material::MaterialId;

    fn setup() -> (CommandDispatcher, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = EngineConfig::default();
        config.data_dir = dir.path().to_path_buf();
        config.default_world = "main".to_string();
        let engine = Arc::new(Engine::new(config));
        engine
            .create_world("main", 0, Arc::new(FlatGenerator::new(10, MaterialId(1))))
            .unwrap();
        (CommandDispatcher::new(engine), dir)
    }

    #[test]
    fn test_tp_to_online_player() {
        let (dispatcher, _dir) = setup();
        let engine = dispatcher.engine();
        let world = engine.default_world().unwrap();

        let alice = engine.add_player("Alice");
        let bob = engine.add_player("Bob");
        bob.teleport(Point::new(world.handle(), Vec3::new(100.0, 12.0, 100.0)));
        alice.grant("voxhold.command.tp");

        dispatcher.execute(alice.as_ref(), "tp Bob").unwrap();
        assert_eq!(alice.position(), bob.position());
        assert!(alice.take_messages()[0].contains("Bob"));
    }

    #[test]
    fn test_tp_offline_player_is_an_error() {
        let (dispatcher, _dir) = setup();
        let alice = dispatcher.engine().add_player("Alice");
        alice.grant("voxhold.command.tp");

        let err = dispatcher.execute(alice.as_ref(), "tp Ghost").unwrap_err();
        assert_eq!(err.0, "Ghost is not online.");
        // The failed command moved nobody.
        assert_eq!(alice.position().position, Vec3::ZERO);
    }

    #[test]
    fn test_tp_coordinates_preload_destination() {
        let (dispatcher, _dir) = setup();
        let engine = dispatcher.engine();
        let world = engine.default_world().unwrap();
        let steve = engine.add_player("Steve");
        steve.teleport(Point::new(world.handle(), Vec3::ZERO));

        dispatcher
            .execute(&ConsoleSource, "tp Steve 100 20 100")
            .unwrap();
        assert_eq!(steve.position().position, Vec3::new(100.0, 20.0, 100.0));
        // Destination chunk was loaded ahead of the move.
        assert!(world
            .get_chunk_from_block(100, 20, 100, LoadOption::NoLoad)
            .is_some());
    }

    #[test]
    fn test_tp_relative_coordinates() {
        let (dispatcher, _dir) = setup();
        let engine = dispatcher.engine();
        let world = engine.default_world().unwrap();
        let steve = engine.add_player("Steve");
        steve.teleport(Point::new(world.handle(), Vec3::new(8.0, 12.0, 8.0)));
        steve.grant("voxhold.command.tp");

        dispatcher.execute(steve.as_ref(), "tp ~5 ~ ~-2").unwrap();
        assert_eq!(steve.position().position, Vec3::new(13.0, 12.0, 6.0));
    }

    #[test]
    fn test_tp_world_flag_requires_permission() {
        let (dispatcher, _dir) = setup();
        let engine = dispatcher.engine();
        engine
            .create_world("nether", 7, Arc::new(FlatGenerator::new(10, MaterialId(1))))
            .unwrap();
        let steve = engine.add_player("Steve");
        steve.teleport(Point::new(
            engine.default_world().unwrap().handle(),
            Vec3::ZERO,
        ));
        steve.grant("voxhold.command.tp");

        let err = dispatcher
            .execute(steve.as_ref(), "tp 0 12 0 -w nether")
            .unwrap_err();
        assert!(err.0.contains("permission"));

        steve.grant("voxhold.command.tp.world-flag");
        dispatcher
            .execute(steve.as_ref(), "tp 0 12 0 -w nether")
            .unwrap();
        let nether = engine.get_world("nether").unwrap();
        assert_eq!(steve.position().world, nether.handle());
    }

    #[test]
    fn test_setspawn_and_whatisspawn() {
        let (dispatcher, _dir) = setup();
        dispatcher
            .execute(&ConsoleSource, "setspawn main 8 11 8")
            .unwrap();
        let world = dispatcher.engine().default_world().unwrap();
        assert_eq!(world.spawn_point().position, Vec3::new(8.0, 11.0, 8.0));
        // Reads back through the query command without error.
        dispatcher
            .execute(&ConsoleSource, "whatisspawn main")
            .unwrap();
        // The console has no world of its own, so it must name one.
        let err = dispatcher.execute(&ConsoleSource, "whatisspawn").unwrap_err();
        assert!(err.0.contains("whatisspawn <world>"));
    }

    #[test]
    fn test_whatisspawn_defaults_to_player_world() {
        let (dispatcher, _dir) = setup();
        let engine = dispatcher.engine();
        let nether = engine
            .create_world("nether", 7, Arc::new(FlatGenerator::new(10, MaterialId(1))))
            .unwrap();
        nether.set_spawn_point(Transform::at(Vec3::new(3.0, 11.0, 3.0)));

        let steve = engine.add_player("Steve");
        steve.teleport(Point::new(nether.handle(), Vec3::ZERO));
        steve.grant("voxhold.command.whatisspawn");

        dispatcher.execute(steve.as_ref(), "whatisspawn").unwrap();
        let messages = steve.take_messages();
        assert!(messages[0].contains("nether"));
        assert!(messages[0].contains("3.0"));
    }

    #[test]
    fn test_setspawn_from_player_position() {
        let (dispatcher, _dir) = setup();
        let engine = dispatcher.engine();
        let world = engine.default_world().unwrap();
        let steve = engine.add_player("Steve");
        steve.teleport(Point::new(world.handle(), Vec3::new(4.0, 12.0, 4.0)));
        steve.grant("voxhold.command.setspawn");

        dispatcher.execute(steve.as_ref(), "setspawn").unwrap();
        assert_eq!(world.spawn_point().position, Vec3::new(4.0, 12.0, 4.0));
    }

    #[test]
    fn test_batch_runs_lines_and_checks_file_node() {
        let (dispatcher, dir) = setup();
        let batches = dir.path().join("batches");
        std::fs::create_dir_all(&batches).unwrap();
        std::fs::write(
            batches.join("spawn.txt"),
            "# set up spawn\nsetspawn main 1 11 1\nwhatisspawn main\n",
        )
        .unwrap();

        dispatcher.execute(&ConsoleSource, "batch spawn.txt").unwrap();
        let world = dispatcher.engine().default_world().unwrap();
        assert_eq!(world.spawn_point().position, Vec3::new(1.0, 11.0, 1.0));

        // A player needs the per-file node on top of the base permission.
        let steve = dispatcher.engine().add_player("Steve");
        steve.grant("voxhold.command.batch");
        let err = dispatcher
            .execute(steve.as_ref(), "batch spawn.txt")
            .unwrap_err();
        assert!(err.0.contains("spawn.txt"));
    }

    #[test]
    fn test_worldinfo_and_regioninfo() {
        let (dispatcher, _dir) = setup();
        let world = dispatcher.engine().default_world().unwrap();
        world.get_chunk_from_block(0, 0, 0, LoadOption::LoadGen).unwrap();

        dispatcher.execute(&ConsoleSource, "worldinfo").unwrap();
        dispatcher.execute(&ConsoleSource, "worldinfo main").unwrap();
        dispatcher
            .execute(&ConsoleSource, "regioninfo main 0 0 0")
            .unwrap();
        assert!(dispatcher
            .execute(&ConsoleSource, "worldinfo missing")
            .is_err());
    }

    #[test]
    fn test_regioninfo_world_only_form() {
        let (dispatcher, _dir) = setup();
        let world = dispatcher.engine().default_world().unwrap();
        world.get_chunk_from_block(0, 0, 0, LoadOption::LoadGen).unwrap();

        // One argument summarizes the whole world's regions.
        dispatcher.execute(&ConsoleSource, "regioninfo main").unwrap();
        // Partial coordinates are rejected, not misread.
        assert!(dispatcher
            .execute(&ConsoleSource, "regioninfo main 0 0")
            .is_err());
        assert!(dispatcher
            .execute(&ConsoleSource, "regioninfo missing")
            .is_err());
    }

    #[test]
    fn test_reload_and_plugins() {
        let (dispatcher, _dir) = setup();
        dispatcher.engine().plugins().register(crate::plugin::PluginDescriptor {
            name: "Economy".to_string(),
            version: "2.1.0".to_string(),
            allows_reload: true,
        });
        dispatcher.execute(&ConsoleSource, "plugins").unwrap();
        dispatcher.execute(&ConsoleSource, "reload Economy").unwrap();
        dispatcher.execute(&ConsoleSource, "reload").unwrap();
        assert_eq!(
            dispatcher
                .engine()
                .plugins()
                .get("Economy")
                .unwrap()
                .reload_count(),
            2
        );
        assert!(dispatcher.execute(&ConsoleSource, "reload Ghost").is_err());
    }
}

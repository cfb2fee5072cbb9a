mod args;
mod common;

pub use args::CommandArgs;

use crate::engine::Engine;
use crate::player::Player;
use log::info;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// A command failure, reported back to whoever typed the command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct CommandError(pub String);

impl CommandError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Anything that can issue commands and receive replies: a player, the
/// console, or a test harness.
pub trait CommandSource: Send + Sync {
    fn name(&self) -> &str;

    fn has_permission(&self, permission: &str) -> bool;

    fn send_message(&self, message: &str);

    fn as_player(&self) -> Option<&Player> {
        None
    }
}

/// The server console. Holds every permission; replies go to the log.
pub struct ConsoleSource;

impl CommandSource for ConsoleSource {
    fn name(&self) -> &str {
        "console"
    }

    fn has_permission(&self, _permission: &str) -> bool {
        true
    }

    fn send_message(&self, message: &str) {
        info!("{}", message);
    }
}

pub type CommandHandler =
    fn(&CommandDispatcher, &dyn CommandSource, &CommandArgs) -> Result<(), CommandError>;

/// Static description of one command: names, arity, permission, handler.
pub struct CommandSpec {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub usage: &'static str,
    pub description: &'static str,
    /// Checked before the handler runs. Handlers may demand further,
    /// argument-dependent permissions themselves.
    pub permission: Option<&'static str>,
    pub min_args: usize,
    pub max_args: Option<usize>,
    pub handler: CommandHandler,
}

/// Routes command lines to handlers. Failures never propagate out of
/// [`CommandDispatcher::dispatch`]; they are reported to the source.
pub struct CommandDispatcher {
    engine: Arc<Engine>,
    commands: Vec<Arc<CommandSpec>>,
    index: HashMap<&'static str, usize>,
}

impl CommandDispatcher {
    pub fn new(engine: Arc<Engine>) -> Self {
        let mut dispatcher = Self {
            engine,
            commands: Vec::new(),
            index: HashMap::new(),
        };
        for spec in common::specs() {
            dispatcher.register(spec);
        }
        dispatcher
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn register(&mut self, spec: CommandSpec) {
        let position = self.commands.len();
        self.index.insert(spec.name, position);
        for alias in spec.aliases {
            self.index.insert(alias, position);
        }
        self.commands.push(Arc::new(spec));
    }

    pub fn commands(&self) -> &[Arc<CommandSpec>] {
        &self.commands
    }

    pub fn find(&self, name: &str) -> Option<&Arc<CommandSpec>> {
        self.index.get(name).map(|&i| &self.commands[i])
    }

    /// Parses and runs one command line.
    pub fn execute(&self, source: &dyn CommandSource, line: &str) -> Result<(), CommandError> {
        let line = line.trim();
        let line = line.strip_prefix('/').unwrap_or(line);
        let mut tokens = line.split_whitespace();
        let name = match tokens.next() {
            Some(name) => name.to_lowercase(),
            None => return Ok(()),
        };
        let spec = self
            .find(&name)
            .ok_or_else(|| CommandError(format!("Unknown command: {}", name)))?
            .clone();

        if let Some(permission) = spec.permission {
            if !source.has_permission(permission) {
                return Err(CommandError::new(
                    "You do not have permission to use that command.",
                ));
            }
        }

        let rest: Vec<&str> = tokens.collect();
        let args = CommandArgs::parse(&rest);
        if args.len() < spec.min_args || spec.max_args.map_or(false, |max| args.len() > max) {
            return Err(CommandError(format!("Usage: {}", spec.usage)));
        }
        (spec.handler)(self, source, &args)
    }

    /// Like [`CommandDispatcher::execute`], but reports failures to the
    /// source instead of returning them.
    pub fn dispatch(&self, source: &dyn CommandSource, line: &str) {
        if let Err(e) = self.execute(source, line) {
            source.send_message(&e.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    fn dispatcher() -> (CommandDispatcher, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = EngineConfig::default();
        config.data_dir = dir.path().to_path_buf();
        (CommandDispatcher::new(Arc::new(Engine::new(config))), dir)
    }

    #[test]
    fn test_unknown_command_is_an_error() {
        let (dispatcher, _dir) = dispatcher();
        let err = dispatcher.execute(&ConsoleSource, "frobnicate").unwrap_err();
        assert!(err.0.contains("frobnicate"));
        // Blank lines are ignored.
        dispatcher.execute(&ConsoleSource, "   ").unwrap();
    }

    #[test]
    fn test_aliases_and_slash_prefix() {
        let (dispatcher, _dir) = dispatcher();
        assert!(dispatcher.find("tp").is_some());
        assert!(dispatcher.find("teleport").is_some());
        dispatcher.execute(&ConsoleSource, "/plugins").unwrap();
    }

    #[test]
    fn test_permission_gate() {
        let (dispatcher, _dir) = dispatcher();
        let player = dispatcher.engine().add_player("Steve");
        let err = dispatcher.execute(player.as_ref(), "stop").unwrap_err();
        assert!(err.0.contains("permission"));

        player.grant("voxhold.command.stop");
        dispatcher.execute(player.as_ref(), "stop").unwrap();
        assert!(!dispatcher.engine().is_running());
    }

    #[test]
    fn test_arity_reports_usage() {
        let (dispatcher, _dir) = dispatcher();
        let err = dispatcher.execute(&ConsoleSource, "tp").unwrap_err();
        assert!(err.0.starts_with("Usage:"));
    }
}

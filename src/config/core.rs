use log::warn;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level engine settings, read from `engine.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Root directory for world saves and batch scripts.
    pub data_dir: PathBuf,
    /// World created and used when no world is named.
    pub default_world: String,
    pub log_level: String,
    /// Main loop period in milliseconds.
    pub tick_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            default_world: "world".to_string(),
            log_level: "info".to_string(),
            tick_ms: 50,
        }
    }
}

impl EngineConfig {
    /// Reads the config file, falling back to defaults when it is missing
    /// or malformed.
    pub fn load_or_default(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(text) => match toml::from_str(&text) {
                Ok(config) => config,
                Err(e) => {
                    warn!("invalid config at {}: {}; using defaults", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }
}

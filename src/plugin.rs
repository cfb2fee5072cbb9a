use log::info;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("Unknown plugin: {0}")]
    Unknown(String),

    #[error("Plugin '{0}' does not support reloading")]
    NotReloadable(String),
}

/// Static identity of a plugin as declared at registration.
#[derive(Debug, Clone)]
pub struct PluginDescriptor {
    pub name: String,
    pub version: String,
    pub allows_reload: bool,
}

/// Runtime state for one registered plugin.
pub struct PluginRecord {
    descriptor: PluginDescriptor,
    enabled: AtomicBool,
    reload_count: AtomicU32,
}

impl PluginRecord {
    pub fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn reload_count(&self) -> u32 {
        self.reload_count.load(Ordering::Acquire)
    }
}

/// Registry of plugins known to the engine. Loading actual plugin code is
/// a host concern; the manager tracks identity, enablement and reloads.
pub struct PluginManager {
    plugins: RwLock<HashMap<String, Arc<PluginRecord>>>,
}

impl PluginManager {
    pub fn new() -> Self {
        Self {
            plugins: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&self, descriptor: PluginDescriptor) -> Arc<PluginRecord> {
        let record = Arc::new(PluginRecord {
            descriptor: descriptor.clone(),
            enabled: AtomicBool::new(true),
            reload_count: AtomicU32::new(0),
        });
        self.plugins
            .write()
            .insert(descriptor.name.to_lowercase(), record.clone());
        record
    }

    pub fn get(&self, name: &str) -> Option<Arc<PluginRecord>> {
        self.plugins.read().get(&name.to_lowercase()).cloned()
    }

    /// All registered plugins, sorted by name.
    pub fn list(&self) -> Vec<Arc<PluginRecord>> {
        let mut plugins: Vec<_> = self.plugins.read().values().cloned().collect();
        plugins.sort_by(|a, b| a.descriptor.name.cmp(&b.descriptor.name));
        plugins
    }

    pub fn reload(&self, name: &str) -> Result<(), PluginError> {
        let record = self
            .get(name)
            .ok_or_else(|| PluginError::Unknown(name.to_string()))?;
        if !record.descriptor.allows_reload {
            return Err(PluginError::NotReloadable(record.descriptor.name.clone()));
        }
        record.reload_count.fetch_add(1, Ordering::AcqRel);
        info!("reloaded plugin '{}'", record.descriptor.name);
        Ok(())
    }

    /// Reloads every plugin that allows it; returns how many reloaded.
    pub fn reload_all(&self) -> usize {
        let mut reloaded = 0;
        for record in self.list() {
            if record.descriptor.allows_reload {
                record.reload_count.fetch_add(1, Ordering::AcqRel);
                reloaded += 1;
            }
        }
        info!("reloaded {} plugins", reloaded);
        reloaded
    }
}

impl Default for PluginManager {
    fn default() -> Self {
        Self::new()
    }
}

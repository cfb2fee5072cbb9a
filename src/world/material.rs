use bitflags::bitflags;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MaterialError {
    #[error("Duplicate material ID: {0:?}")]
    DuplicateId(MaterialId),

    #[error("Duplicate material name: {0}")]
    DuplicateName(String),
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MaterialFlags: u8 {
        const SOLID   = 0b0001;
        const OPAQUE  = 0b0010;
        const LIQUID  = 0b0100;
        const DYNAMIC = 0b1000;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MaterialId(pub u16);

impl MaterialId {
    pub const AIR: MaterialId = MaterialId(0);

    pub fn is_air(&self) -> bool {
        *self == Self::AIR
    }
}

impl fmt::Display for MaterialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct BlockMaterial {
    pub id: MaterialId,
    pub name: String,
    pub flags: MaterialFlags,
    pub default_data: u16,
}

impl BlockMaterial {
    pub fn new(id: u16, name: &str, flags: MaterialFlags) -> Self {
        Self {
            id: MaterialId(id),
            name: name.to_string(),
            flags,
            default_data: 0,
        }
    }

    pub fn is_solid(&self) -> bool {
        self.flags.contains(MaterialFlags::SOLID)
    }
}

/// Id- and name-indexed material table. Built once at engine startup and
/// passed through `Services`; there is no global registry.
pub struct MaterialRegistry {
    by_id: RwLock<HashMap<MaterialId, Arc<BlockMaterial>>>,
    by_name: RwLock<HashMap<String, MaterialId>>,
}

impl MaterialRegistry {
    pub fn new() -> Self {
        Self {
            by_id: RwLock::new(HashMap::new()),
            by_name: RwLock::new(HashMap::new()),
        }
    }

    /// Registry preloaded with the built-in materials.
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        let solid = MaterialFlags::SOLID | MaterialFlags::OPAQUE;
        for material in [
            BlockMaterial::new(0, "air", MaterialFlags::empty()),
            BlockMaterial::new(1, "stone", solid),
            BlockMaterial::new(2, "dirt", solid),
            BlockMaterial::new(3, "grass", solid),
            BlockMaterial::new(4, "sand", solid | MaterialFlags::DYNAMIC),
            BlockMaterial::new(5, "water", MaterialFlags::LIQUID | MaterialFlags::DYNAMIC),
            BlockMaterial::new(6, "bedrock", solid),
        ] {
            // Built-ins are distinct by construction.
            let _ = registry.register(material);
        }
        registry
    }

    pub fn register(&self, material: BlockMaterial) -> Result<MaterialId, MaterialError> {
        let mut by_id = self.by_id.write();
        let mut by_name = self.by_name.write();
        if by_id.contains_key(&material.id) {
            return Err(MaterialError::DuplicateId(material.id));
        }
        if by_name.contains_key(&material.name) {
            return Err(MaterialError::DuplicateName(material.name));
        }
        let id = material.id;
        by_name.insert(material.name.clone(), id);
        by_id.insert(id, Arc::new(material));
        Ok(id)
    }

    pub fn get(&self, id: MaterialId) -> Option<Arc<BlockMaterial>> {
        self.by_id.read().get(&id).cloned()
    }

    pub fn get_by_name(&self, name: &str) -> Option<Arc<BlockMaterial>> {
        let id = *self.by_name.read().get(name)?;
        self.get(id)
    }

    pub fn is_solid(&self, id: MaterialId) -> bool {
        self.get(id).map_or(false, |m| m.is_solid())
    }
}

impl Default for MaterialRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_resolve_by_name() {
        let registry = MaterialRegistry::with_defaults();
        let stone = registry.get_by_name("stone").unwrap();
        assert!(stone.is_solid());
        assert_eq!(registry.get(stone.id).unwrap().name, "stone");
        assert!(!registry.is_solid(MaterialId::AIR));
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let registry = MaterialRegistry::with_defaults();
        let dup_id = BlockMaterial::new(1, "marble", MaterialFlags::SOLID);
        assert!(matches!(
            registry.register(dup_id),
            Err(MaterialError::DuplicateId(_))
        ));

        let dup_name = BlockMaterial::new(99, "stone", MaterialFlags::SOLID);
        assert!(matches!(
            registry.register(dup_name),
            Err(MaterialError::DuplicateName(_))
        ));
    }
}

use crate::command::CommandSource;
use crate::world::geo::Point;
use crate::world::handle::Handle;
use glam::Vec3;
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

/// A connected (or recently connected) player. Network transport is out of
/// scope; messages queue up for whatever session layer drains them.
pub struct Player {
    name: String,
    online: AtomicBool,
    position: RwLock<Point>,
    permissions: RwLock<HashSet<String>>,
    messages: Mutex<Vec<String>>,
}

impl Player {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            online: AtomicBool::new(true),
            position: RwLock::new(Point::new(Handle::EMPTY, Vec3::ZERO)),
            permissions: RwLock::new(HashSet::new()),
            messages: Mutex::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    pub(crate) fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::Release);
    }

    pub fn position(&self) -> Point {
        *self.position.read()
    }

    pub fn teleport(&self, point: Point) {
        *self.position.write() = point;
    }

    pub fn grant(&self, permission: &str) {
        self.permissions.write().insert(permission.to_string());
    }

    pub fn revoke(&self, permission: &str) {
        self.permissions.write().remove(permission);
    }

    /// Drains all queued messages, oldest first.
    pub fn take_messages(&self) -> Vec<String> {
        std::mem::take(&mut *self.messages.lock())
    }
}

impl CommandSource for Player {
    fn name(&self) -> &str {
        &self.name
    }

    fn has_permission(&self, permission: &str) -> bool {
        let permissions = self.permissions.read();
        permissions.contains("*") || permissions.contains(permission)
    }

    fn send_message(&self, message: &str) {
        self.messages.lock().push(message.to_string());
    }

    fn as_player(&self) -> Option<&Player> {
        Some(self)
    }
}

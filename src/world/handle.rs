use parking_lot::RwLock;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// A non-owning reference into a [`WeakRegistry`]. Copyable, hashable and
/// packable into a single `u64` so it can live in an atomic slot.
///
/// A handle is a cache key, not a source of truth: resolving it may yield
/// nothing at any time, once the target entity has been dropped or its
/// registry slot reused.
pub struct Handle<T> {
    index: u32,
    generation: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    /// Sentinel that never resolves. Locators built without a target use
    /// this so they behave exactly like ones whose target has expired.
    pub const EMPTY: Handle<T> = Handle {
        index: u32::MAX,
        generation: u32::MAX,
        _marker: PhantomData,
    };

    pub fn is_empty(&self) -> bool {
        self.index == u32::MAX
    }

    fn pack(self) -> u64 {
        ((self.index as u64) << 32) | self.generation as u64
    }

    fn unpack(bits: u64) -> Self {
        Handle {
            index: (bits >> 32) as u32,
            generation: bits as u32,
            _marker: PhantomData,
        }
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.generation.hash(state);
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            write!(f, "Handle(empty)")
        } else {
            write!(f, "Handle({}v{})", self.index, self.generation)
        }
    }
}

struct Slot<T> {
    generation: u32,
    target: Weak<T>,
}

/// Generation-checked table of weak references.
///
/// Registering hands out a [`Handle`]; resolving upgrades the stored weak
/// reference, or returns `None` once the entity is gone. Dead slots are
/// reused with a bumped generation, so handles into a reused slot go stale
/// instead of resolving to the wrong entity.
pub struct WeakRegistry<T> {
    slots: RwLock<Vec<Slot<T>>>,
}

impl<T> WeakRegistry<T> {
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(Vec::new()),
        }
    }

    /// Issues a handle for the given entity. Cheap, never fails.
    pub fn register(&self, target: &Arc<T>) -> Handle<T> {
        let mut slots = self.slots.write();
        if let Some(index) = slots.iter().position(|s| s.target.strong_count() == 0) {
            let slot = &mut slots[index];
            slot.generation = slot.generation.wrapping_add(1);
            slot.target = Arc::downgrade(target);
            Handle {
                index: index as u32,
                generation: slot.generation,
                _marker: PhantomData,
            }
        } else {
            slots.push(Slot {
                generation: 0,
                target: Arc::downgrade(target),
            });
            Handle {
                index: (slots.len() - 1) as u32,
                generation: 0,
                _marker: PhantomData,
            }
        }
    }

    /// Resolves a handle back to a strong reference. `None` means the
    /// entity's lifecycle has ended; this is the common case, not an error.
    pub fn resolve(&self, handle: Handle<T>) -> Option<Arc<T>> {
        if handle.is_empty() {
            return None;
        }
        let slots = self.slots.read();
        let slot = slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.target.upgrade()
    }

    /// Number of entries whose target is still alive.
    pub fn live_count(&self) -> usize {
        self.slots
            .read()
            .iter()
            .filter(|s| s.target.strong_count() > 0)
            .count()
    }
}

impl<T> Default for WeakRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A lock-free, atomically swappable slot holding one packed [`Handle`].
///
/// Readers and a concurrent writer never observe a torn value; the handle
/// is a single `u64`, not a pair of fields.
pub struct AtomicHandle<T> {
    bits: AtomicU64,
    _marker: PhantomData<fn() -> T>,
}

impl<T> AtomicHandle<T> {
    pub fn new(handle: Handle<T>) -> Self {
        Self {
            bits: AtomicU64::new(handle.pack()),
            _marker: PhantomData,
        }
    }

    pub fn empty() -> Self {
        Self::new(Handle::EMPTY)
    }

    pub fn load(&self) -> Handle<T> {
        Handle::unpack(self.bits.load(Ordering::Acquire))
    }

    pub fn store(&self, handle: Handle<T>) {
        self.bits.store(handle.pack(), Ordering::Release);
    }
}

impl<T> fmt::Debug for AtomicHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AtomicHandle({:?})", self.load())
    }
}

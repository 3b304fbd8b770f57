//! Storage strategies backing a [`Registry`](crate::Registry)
//!
//! The default [`PerThreadStorage`] gives every thread its own isolated map, so
//! registrations made on one thread are never observed by another and the map
//! lock is uncontended. [`SharedStorage`] makes registrations visible process-wide at the cost
//! of a read/write lock around the map.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

/// A type-erased registered instance.
///
/// The erased value is always an `Arc<K>` where `K` is the key type, which lets
/// unsized keys such as `dyn Trait` share one representation with sized ones.
pub type StoredInstance = Arc<dyn Any + Send + Sync>;

/// How a registry shares its entries between threads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StorageMode {
    /// Each thread sees only its own registrations
    #[default]
    PerThread,
    /// All threads share one map guarded by a lock
    Shared,
}

/// Backing map of a registry.
///
/// Implementations must never call back into user code while holding internal
/// borrows or locks; replaced instances are returned or dropped afterwards.
pub trait Storage: Send + Sync {
    /// Insert an entry, returning the one it replaced
    fn insert(&self, key: TypeId, instance: StoredInstance) -> Option<StoredInstance>;

    /// Fetch the entry stored under `key`
    fn get(&self, key: TypeId) -> Option<StoredInstance>;

    fn contains(&self, key: TypeId) -> bool {
        self.get(key).is_some()
    }

    /// Number of entries visible to the caller
    fn len(&self) -> usize;

    /// Remove every entry visible to the caller
    fn clear(&self);
}

impl StorageMode {
    pub fn create(self) -> Box<dyn Storage> {
        match self {
            StorageMode::PerThread => Box::new(PerThreadStorage::new()),
            StorageMode::Shared => Box::new(SharedStorage::new()),
        }
    }
}

type InstanceMap = HashMap<TypeId, StoredInstance>;
type ThreadMap = Arc<Mutex<InstanceMap>>;

static NEXT_STORAGE_ID: AtomicU64 = AtomicU64::new(1);

/// One thread's entries for one storage
struct ThreadSlot {
    owner: Weak<()>,
    map: ThreadMap,
}

thread_local! {
    static THREAD_MAPS: RefCell<HashMap<u64, ThreadSlot>> = RefCell::new(HashMap::new());
}

/// Thread-isolated storage.
///
/// Each thread gets its own map, reachable only from that thread's local table.
/// The storage also tracks every map it created, so dropping it releases the
/// entries of all threads, including ones that are still running. A thread's
/// entries are also released when that thread exits.
pub struct PerThreadStorage {
    id: u64,
    alive: Arc<()>,
    created: Mutex<Vec<Weak<Mutex<InstanceMap>>>>,
}

impl PerThreadStorage {
    pub fn new() -> Self {
        Self {
            id: NEXT_STORAGE_ID.fetch_add(1, Ordering::Relaxed),
            alive: Arc::new(()),
            created: Mutex::new(Vec::new()),
        }
    }

    fn thread_map(&self) -> Option<ThreadMap> {
        THREAD_MAPS.with(|maps| maps.borrow().get(&self.id).map(|slot| Arc::clone(&slot.map)))
    }

    fn thread_map_or_create(&self) -> ThreadMap {
        if let Some(map) = self.thread_map() {
            return map;
        }

        let map = ThreadMap::default();
        let stale = THREAD_MAPS.with(|maps| {
            let mut maps = maps.borrow_mut();
            let dead: Vec<u64> = maps
                .iter()
                .filter(|(_, slot)| slot.owner.strong_count() == 0)
                .map(|(id, _)| *id)
                .collect();
            let stale: Vec<ThreadSlot> = dead.iter().filter_map(|id| maps.remove(id)).collect();
            maps.insert(
                self.id,
                ThreadSlot {
                    owner: Arc::downgrade(&self.alive),
                    map: Arc::clone(&map),
                },
            );
            stale
        });
        drop(stale);

        let mut created = self.created.lock();
        created.retain(|weak| weak.strong_count() > 0);
        created.push(Arc::downgrade(&map));
        map
    }
}

impl Default for PerThreadStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PerThreadStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PerThreadStorage")
            .field("id", &self.id)
            .field("threads", &self.created.lock().len())
            .finish()
    }
}

impl Storage for PerThreadStorage {
    fn insert(&self, key: TypeId, instance: StoredInstance) -> Option<StoredInstance> {
        let map = self.thread_map_or_create();
        let replaced = map.lock().insert(key, instance);
        replaced
    }

    fn get(&self, key: TypeId) -> Option<StoredInstance> {
        let map = self.thread_map()?;
        let instance = map.lock().get(&key).cloned();
        instance
    }

    fn len(&self) -> usize {
        let Some(map) = self.thread_map() else {
            return 0;
        };
        let len = map.lock().len();
        len
    }

    fn clear(&self) {
        if let Some(map) = self.thread_map() {
            let removed = std::mem::take(&mut *map.lock());
            drop(removed);
        }
    }
}

impl Drop for PerThreadStorage {
    fn drop(&mut self) {
        let maps: Vec<ThreadMap> = self
            .created
            .get_mut()
            .drain(..)
            .filter_map(|weak| weak.upgrade())
            .collect();
        for map in maps {
            // Entries are dropped after the map lock is released.
            let removed = std::mem::take(&mut *map.lock());
            drop(removed);
        }
    }
}

/// Storage shared by every thread, guarded by a read/write lock
#[derive(Default)]
pub struct SharedStorage {
    map: RwLock<InstanceMap>,
}

impl SharedStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for SharedStorage {
    fn insert(&self, key: TypeId, instance: StoredInstance) -> Option<StoredInstance> {
        self.map.write().insert(key, instance)
    }

    fn get(&self, key: TypeId) -> Option<StoredInstance> {
        self.map.read().get(&key).cloned()
    }

    fn len(&self) -> usize {
        self.map.read().len()
    }

    fn clear(&self) {
        let removed = std::mem::take(&mut *self.map.write());
        drop(removed);
    }
}

//! Type-keyed registry of singleton instances

use std::any::{type_name, TypeId};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::config::RegistryConfig;
use crate::error::{RegistrationError, RegistryLookupError};
use crate::storage::{Storage, StorageMode, StoredInstance};

/// Types that may never be used as registry keys.
///
/// Registering a bare `String` or `u32` would make every injected parameter of that
/// type share one global value, which is almost never intended. Wrap such values in
/// a newtype instead.
#[derive(Clone)]
pub struct BannedTypes {
    ids: HashSet<TypeId>,
    names: Vec<&'static str>,
}

macro_rules! ban {
    ($set:ident, $($ty:ty),+ $(,)?) => {
        $( $set = $set.with::<$ty>(); )+
    };
}

impl BannedTypes {
    /// An empty set: every type may be registered
    pub fn none() -> Self {
        Self {
            ids: HashSet::new(),
            names: Vec::new(),
        }
    }

    /// Primitive and builtin standard library types
    pub fn builtin() -> Self {
        let mut set = Self::none();
        ban!(
            set,
            (),
            bool,
            char,
            i8,
            i16,
            i32,
            i64,
            i128,
            isize,
            u8,
            u16,
            u32,
            u64,
            u128,
            usize,
            f32,
            f64,
            str,
            String,
            &'static str,
            Box<str>,
            [u8],
            Vec<u8>,
            Box<[u8]>,
        );
        set
    }

    /// Add `T` to the set
    pub fn with<T: ?Sized + 'static>(mut self) -> Self {
        if self.ids.insert(TypeId::of::<T>()) {
            self.names.push(type_name::<T>());
        }
        self
    }

    pub fn is_banned<T: ?Sized + 'static>(&self) -> bool {
        self.contains(TypeId::of::<T>())
    }

    pub fn contains(&self, type_id: TypeId) -> bool {
        self.ids.contains(&type_id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Names of the banned types, in insertion order
    pub fn names(&self) -> &[&'static str] {
        &self.names
    }
}

impl Default for BannedTypes {
    fn default() -> Self {
        Self::builtin()
    }
}

impl fmt::Debug for BannedTypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.names.iter()).finish()
    }
}

/// A registry of instances indexed by their type.
///
/// At most one instance is stored per key. Lookups match the key exactly: an
/// instance registered as `Concrete` is not returned for `dyn Trait` unless it was
/// registered under that key with [`Registry::register_arc`].
///
/// # Example
///
/// ```
/// use tidi::Registry;
///
/// struct Database {
///     url: String,
/// }
///
/// let registry = Registry::new();
/// registry.register(Database { url: "db://local".into() }).unwrap();
///
/// let db = registry.get::<Database>().unwrap();
/// assert_eq!(db.url, "db://local");
/// ```
pub struct Registry {
    banned: BannedTypes,
    storage: Box<dyn Storage>,
}

impl Registry {
    /// Registry with builtin types banned and per-thread storage
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Registry whose entries are shared by every thread
    pub fn shared() -> Self {
        Self::builder().storage_mode(StorageMode::Shared).build()
    }

    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub fn from_config(config: &RegistryConfig) -> Self {
        let banned = if config.ban_builtin_types {
            BannedTypes::builtin()
        } else {
            BannedTypes::none()
        };
        Self::builder()
            .banned_types(banned)
            .storage_mode(config.storage)
            .build()
    }

    /// Register `instance` keyed by its own type.
    ///
    /// Any previous instance of the same type is replaced.
    ///
    /// # Errors
    /// `RegistrationError::BannedType` if `T` is a banned type
    pub fn register<T: Send + Sync + 'static>(&self, instance: T) -> Result<(), RegistrationError> {
        self.register_arc(Arc::new(instance))
    }

    /// Register a shared instance under the key `K`.
    ///
    /// `K` may be unsized, which is how an implementation is registered under a
    /// trait object key:
    ///
    /// ```
    /// use std::sync::Arc;
    /// use tidi::Registry;
    ///
    /// trait Greeter: Send + Sync {
    ///     fn greet(&self) -> String;
    /// }
    ///
    /// struct English;
    ///
    /// impl Greeter for English {
    ///     fn greet(&self) -> String {
    ///         "hello".into()
    ///     }
    /// }
    ///
    /// let registry = Registry::new();
    /// registry.register_arc::<dyn Greeter>(Arc::new(English)).unwrap();
    /// assert_eq!(registry.get::<dyn Greeter>().unwrap().greet(), "hello");
    /// ```
    pub fn register_arc<K>(&self, instance: Arc<K>) -> Result<(), RegistrationError>
    where
        K: ?Sized + Send + Sync + 'static,
    {
        let type_id = TypeId::of::<K>();
        if self.banned.contains(type_id) {
            return Err(RegistrationError::BannedType {
                type_name: type_name::<K>(),
            });
        }

        let replaced = self.storage.insert(type_id, Arc::new(instance) as StoredInstance);
        debug!(
            type_name = type_name::<K>(),
            replaced = replaced.is_some(),
            "Registered instance"
        );
        Ok(())
    }

    /// Get the instance registered under `T`.
    ///
    /// # Errors
    /// `RegistryLookupError::NotRegistered` if nothing is registered under `T`
    pub fn get<T>(&self) -> Result<Arc<T>, RegistryLookupError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.find::<T>().ok_or(RegistryLookupError::NotRegistered {
            type_name: type_name::<T>(),
        })
    }

    /// Get the instance registered under `T`, or `default` when there is none
    pub fn get_or<T>(&self, default: Arc<T>) -> Arc<T>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.find::<T>().unwrap_or(default)
    }

    /// Get the instance registered under `T`, if any
    pub fn find<T>(&self) -> Option<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.storage
            .get(TypeId::of::<T>())
            .and_then(|stored| stored.downcast_ref::<Arc<T>>().cloned())
    }

    pub fn contains<T: ?Sized + 'static>(&self) -> bool {
        self.storage.contains(TypeId::of::<T>())
    }

    /// Number of instances visible from the current execution context
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every instance visible from the current execution context
    pub fn clear(&self) {
        self.storage.clear();
        debug!("Cleared registry");
    }

    pub fn banned_types(&self) -> &BannedTypes {
        &self.banned
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("banned_types", &self.banned.len())
            .field("len", &self.len())
            .finish()
    }
}

/// Builder for configuring a [`Registry`]
pub struct RegistryBuilder {
    banned: BannedTypes,
    storage: Option<Box<dyn Storage>>,
    mode: StorageMode,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self {
            banned: BannedTypes::builtin(),
            storage: None,
            mode: StorageMode::default(),
        }
    }

    pub fn banned_types(mut self, banned: BannedTypes) -> Self {
        self.banned = banned;
        self
    }

    pub fn storage_mode(mut self, mode: StorageMode) -> Self {
        self.mode = mode;
        self
    }

    /// Use a custom storage strategy; overrides `storage_mode`
    pub fn storage<S: Storage + 'static>(mut self, storage: S) -> Self {
        self.storage = Some(Box::new(storage));
        self
    }

    pub fn build(self) -> Registry {
        Registry {
            banned: self.banned,
            storage: self.storage.unwrap_or_else(|| self.mode.create()),
        }
    }
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

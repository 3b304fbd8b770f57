//! Injection namespaces and the process-wide default namespace
//!
//! A [`Namespace`] ties wrapped callables to one registry. Most programs use the
//! default namespace through the crate-level free functions:
//!
//! ```
//! use tidi::{Arguments, CallArgs, Dependency, Parameter, Signature};
//!
//! #[derive(Default)]
//! struct Counter {
//!     start: u32,
//! }
//!
//! tidi::register(Counter { start: 10 }).unwrap();
//!
//! let next = tidi::inject(
//!     Signature::new().with(Parameter::injected("counter", Dependency::<Counter>::default_constructible())),
//!     |args: CallArgs| args.dependency::<Counter>("counter").map(|c| c.start + 1),
//! );
//!
//! assert_eq!(next.call(Arguments::new()).unwrap().unwrap(), 11);
//! # tidi::reset_default_registry();
//! ```

use std::sync::Arc;

use once_cell::sync::Lazy;
use tracing::{info, warn};

use crate::config::RegistryConfig;
use crate::error::{DependencyResolutionError, RegistrationError};
use crate::inject::{CallArgs, Injector};
use crate::parameters::Signature;
use crate::provider::Provider;
use crate::registry::Registry;
use crate::resolver::{resolve, Dependency, ResolutionPolicy};

/// A registry handle shared by every callable wrapped through it
#[derive(Debug, Clone)]
pub struct Namespace {
    registry: Arc<Registry>,
}

impl Namespace {
    pub fn new(registry: Registry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    pub fn from_config(config: &RegistryConfig) -> Self {
        Self::new(Registry::from_config(config))
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn register<T: Send + Sync + 'static>(&self, instance: T) -> Result<(), RegistrationError> {
        self.registry.register(instance)
    }

    pub fn register_arc<K>(&self, instance: Arc<K>) -> Result<(), RegistrationError>
    where
        K: ?Sized + Send + Sync + 'static,
    {
        self.registry.register_arc(instance)
    }

    /// Wrap `func` so its omitted injectable parameters resolve against this namespace
    pub fn inject<F, R>(&self, signature: Signature, func: F) -> Injector<F>
    where
        F: Fn(CallArgs) -> R,
    {
        Injector::new(signature, Some(Arc::clone(&self.registry)), func)
    }

    /// A zero-argument factory resolving `T` with the default policy on every call.
    ///
    /// A scoped resource produced by `provider` is released before the factory
    /// returns; the value itself is handed back.
    pub fn field_factory<T>(
        &self,
        dependency: Dependency<T>,
        provider: Option<Provider<T>>,
    ) -> impl Fn() -> Result<Arc<T>, DependencyResolutionError> + Send + Sync + 'static
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let registry = Arc::clone(&self.registry);
        move || {
            let resolved = resolve(
                &dependency,
                ResolutionPolicy::default(),
                Some(&registry),
                provider.as_ref(),
            )?;
            Ok(Arc::clone(resolved.get()))
        }
    }

    /// Remove every registration visible from the current execution context
    pub fn reset(&self) {
        self.registry.clear();
    }
}

impl Default for Namespace {
    fn default() -> Self {
        Self::new(Registry::new())
    }
}

static DEFAULT_NAMESPACE: Lazy<Namespace> = Lazy::new(|| {
    let config = RegistryConfig::from_env().unwrap_or_else(|e| {
        warn!("Invalid registry environment config, using defaults: {}", e);
        RegistryConfig::default()
    });
    info!(
        storage = ?config.storage,
        ban_builtin_types = config.ban_builtin_types,
        "Created default namespace"
    );
    Namespace::from_config(&config)
});

/// The process-wide default namespace
pub fn default_namespace() -> &'static Namespace {
    &DEFAULT_NAMESPACE
}

/// The registry of the default namespace
pub fn default_registry() -> Arc<Registry> {
    Arc::clone(DEFAULT_NAMESPACE.registry())
}

/// Register `instance` in the default registry
pub fn register<T: Send + Sync + 'static>(instance: T) -> Result<(), RegistrationError> {
    DEFAULT_NAMESPACE.register(instance)
}

/// Register a shared instance under the key `K` in the default registry
pub fn register_arc<K>(instance: Arc<K>) -> Result<(), RegistrationError>
where
    K: ?Sized + Send + Sync + 'static,
{
    DEFAULT_NAMESPACE.register_arc(instance)
}

/// Wrap `func` for injection from the default registry
pub fn inject<F, R>(signature: Signature, func: F) -> Injector<F>
where
    F: Fn(CallArgs) -> R,
{
    DEFAULT_NAMESPACE.inject(signature, func)
}

/// A factory resolving `T` from the default registry
pub fn field_factory<T>(
    dependency: Dependency<T>,
    provider: Option<Provider<T>>,
) -> impl Fn() -> Result<Arc<T>, DependencyResolutionError> + Send + Sync + 'static
where
    T: ?Sized + Send + Sync + 'static,
{
    DEFAULT_NAMESPACE.field_factory(dependency, provider)
}

/// Clear the default registry for the current execution context
pub fn reset_default_registry() {
    DEFAULT_NAMESPACE.reset();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inject::Arguments;
    use crate::parameters::Parameter;
    use crate::provider::Resource;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default, PartialEq)]
    struct Settings {
        name: String,
    }

    #[test]
    fn test_namespace_injects_from_own_registry() {
        let namespace = Namespace::default();
        namespace
            .register(Settings {
                name: "local".into(),
            })
            .unwrap();

        let read = namespace.inject(
            Signature::new().with(Parameter::injected(
                "settings",
                Dependency::<Settings>::default_constructible(),
            )),
            |args: CallArgs| args.dependency::<Settings>("settings").unwrap().name.clone(),
        );

        assert_eq!(read.call(Arguments::new()).unwrap(), "local");
    }

    #[test]
    fn test_namespaces_are_independent() {
        let first = Namespace::default();
        let second = Namespace::default();
        first.register(Settings::default()).unwrap();

        assert!(first.registry().contains::<Settings>());
        assert!(!second.registry().contains::<Settings>());
    }

    #[test]
    fn test_field_factory_prefers_registry() {
        let namespace = Namespace::default();
        let make = namespace.field_factory(Dependency::<Settings>::default_constructible(), None);
        assert_eq!(*make().unwrap(), Settings::default());

        namespace
            .register(Settings {
                name: "registered".into(),
            })
            .unwrap();
        assert_eq!(make().unwrap().name, "registered");
    }

    #[test]
    fn test_field_factory_releases_scoped_resource() {
        let namespace = Namespace::default();
        let exits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&exits);
        let provider = Provider::scoped(move || {
            let counter = Arc::clone(&counter);
            Resource::new(
                || {
                    Ok(Arc::new(Settings {
                        name: "scoped".into(),
                    }))
                },
                move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                },
            )
        });
        let make = namespace.field_factory(Dependency::new(), Some(provider));

        let settings = make().unwrap();
        assert_eq!(settings.name, "scoped");
        assert_eq!(exits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_reset_clears_registrations() {
        let namespace = Namespace::default();
        namespace.register(Settings::default()).unwrap();
        namespace.reset();

        assert!(namespace.registry().is_empty());
    }
}

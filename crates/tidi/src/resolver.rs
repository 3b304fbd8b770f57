//! Dependency resolution
//!
//! [`resolve`] decides, from a [`ResolutionPolicy`], whether a dependency comes
//! from a registry, from a provider, or from the type's zero-argument constructor.

use std::any::type_name;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{DependencyResolutionError, MissingConstructor};
use crate::provider::{Provider, Provision, ScopedResource};
use crate::registry::Registry;

/// Controls where the resolver looks for a dependency.
///
/// `(use_registry: false, initialize_if_missing: false)` can never resolve anything
/// and is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResolutionPolicy {
    pub use_registry: bool,
    pub initialize_if_missing: bool,
}

impl ResolutionPolicy {
    /// Registry lookup only; a missing entry is an error
    pub const REGISTRY_ONLY: Self = Self::new(true, false);
    /// Registry lookup, falling back to initialisation
    pub const REGISTRY_OR_INITIALIZE: Self = Self::new(true, true);
    /// Always initialise
    pub const INITIALIZE_ONLY: Self = Self::new(false, true);

    pub const fn new(use_registry: bool, initialize_if_missing: bool) -> Self {
        Self {
            use_registry,
            initialize_if_missing,
        }
    }

    /// Build a policy, rejecting the combination that can never resolve
    pub fn try_new(
        use_registry: bool,
        initialize_if_missing: bool,
    ) -> Result<Self, DependencyResolutionError> {
        Self::new(use_registry, initialize_if_missing).validate()
    }

    pub fn validate(self) -> Result<Self, DependencyResolutionError> {
        if self.is_valid() {
            Ok(self)
        } else {
            Err(DependencyResolutionError::InvalidPolicy(self))
        }
    }

    pub const fn is_valid(&self) -> bool {
        self.use_registry || self.initialize_if_missing
    }
}

impl Default for ResolutionPolicy {
    fn default() -> Self {
        Self::REGISTRY_OR_INITIALIZE
    }
}

type ConstructFn<T> = dyn Fn() -> anyhow::Result<Arc<T>> + Send + Sync;

/// The requested type of a dependency, with its zero-argument constructor if it has one
pub struct Dependency<T: ?Sized + Send + Sync + 'static> {
    construct: Option<Arc<ConstructFn<T>>>,
}

impl<T: ?Sized + Send + Sync + 'static> Dependency<T> {
    /// A dependency that cannot be constructed without arguments
    pub fn new() -> Self {
        Self { construct: None }
    }

    /// A dependency constructed by `construct`
    pub fn with_constructor<F>(construct: F) -> Self
    where
        F: Fn() -> anyhow::Result<Arc<T>> + Send + Sync + 'static,
    {
        Self {
            construct: Some(Arc::new(construct)),
        }
    }

    pub fn type_name(&self) -> &'static str {
        type_name::<T>()
    }

    pub fn is_constructible(&self) -> bool {
        self.construct.is_some()
    }

    /// Construct a fresh instance with no arguments
    pub fn construct(&self) -> Result<Arc<T>, DependencyResolutionError> {
        let construct = self
            .construct
            .as_ref()
            .ok_or_else(|| DependencyResolutionError::Construction {
                type_name: type_name::<T>(),
                source: Box::new(MissingConstructor {
                    type_name: type_name::<T>(),
                }),
            })?;

        construct().map_err(|source| DependencyResolutionError::Construction {
            type_name: type_name::<T>(),
            source: source.into(),
        })
    }
}

impl<T: Default + Send + Sync + 'static> Dependency<T> {
    /// A dependency constructed with `T::default()`
    pub fn default_constructible() -> Self {
        Self::with_constructor(|| Ok(Arc::new(T::default())))
    }
}

impl<T: ?Sized + Send + Sync + 'static> Clone for Dependency<T> {
    fn clone(&self) -> Self {
        Self {
            construct: self.construct.clone(),
        }
    }
}

impl<T: ?Sized + Send + Sync + 'static> Default for Dependency<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized + Send + Sync + 'static> fmt::Debug for Dependency<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dependency")
            .field("type", &type_name::<T>())
            .field("constructible", &self.is_constructible())
            .finish()
    }
}

/// A resolved dependency.
///
/// Dereferences to the value. When the value came from a scoped resource, the
/// resource is exited exactly once when this guard is dropped.
pub struct Resolved<T: ?Sized + Send + Sync + 'static> {
    value: Arc<T>,
    resource: Option<Box<dyn ScopedResource<Target = T>>>,
}

impl<T: ?Sized + Send + Sync + 'static> Resolved<T> {
    pub fn value(value: Arc<T>) -> Self {
        Self {
            value,
            resource: None,
        }
    }

    pub fn scoped(value: Arc<T>, resource: Box<dyn ScopedResource<Target = T>>) -> Self {
        Self {
            value,
            resource: Some(resource),
        }
    }

    /// The shared value
    pub fn get(&self) -> &Arc<T> {
        &self.value
    }

    pub fn is_scoped(&self) -> bool {
        self.resource.is_some()
    }

    /// Release the value now
    pub fn release(self) {
        drop(self);
    }
}

impl<T: ?Sized + Send + Sync + 'static> Deref for Resolved<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T: ?Sized + Send + Sync + 'static> Drop for Resolved<T> {
    fn drop(&mut self) {
        if let Some(mut resource) = self.resource.take() {
            debug!(type_name = type_name::<T>(), "Releasing scoped resource");
            resource.exit();
        }
    }
}

impl<T: ?Sized + Send + Sync + 'static> fmt::Debug for Resolved<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolved")
            .field("type", &type_name::<T>())
            .field("scoped", &self.is_scoped())
            .finish()
    }
}

/// Resolve a dependency according to `policy`.
///
/// | `use_registry` | `initialize_if_missing` | registry | outcome |
/// |---|---|---|---|
/// | true | false | present | registry lookup, missing is an error |
/// | true | false | absent | `RegistryRequired` |
/// | true | true | present | registry lookup, else initialise |
/// | any | true | absent / ignored | initialise |
/// | false | false | any | `UnresolvablePolicy` |
///
/// Initialisation invokes `provider` once when given, otherwise the dependency's
/// zero-argument constructor.
pub fn resolve<T>(
    dependency: &Dependency<T>,
    policy: ResolutionPolicy,
    registry: Option<&Registry>,
    provider: Option<&Provider<T>>,
) -> Result<Resolved<T>, DependencyResolutionError>
where
    T: ?Sized + Send + Sync + 'static,
{
    match (policy.use_registry, policy.initialize_if_missing, registry) {
        (true, false, Some(registry)) => {
            debug!(type_name = type_name::<T>(), "Resolving from registry");
            Ok(Resolved::value(registry.get::<T>()?))
        }
        (true, false, None) => Err(DependencyResolutionError::RegistryRequired {
            type_name: type_name::<T>(),
        }),
        (true, true, Some(registry)) => match registry.find::<T>() {
            Some(value) => {
                debug!(type_name = type_name::<T>(), "Resolved from registry");
                Ok(Resolved::value(value))
            }
            None => initialize(dependency, provider),
        },
        (_, true, _) => initialize(dependency, provider),
        (false, false, _) => Err(DependencyResolutionError::UnresolvablePolicy {
            type_name: type_name::<T>(),
            policy,
        }),
    }
}

fn initialize<T>(
    dependency: &Dependency<T>,
    provider: Option<&Provider<T>>,
) -> Result<Resolved<T>, DependencyResolutionError>
where
    T: ?Sized + Send + Sync + 'static,
{
    let Some(provider) = provider else {
        debug!(type_name = type_name::<T>(), "Constructing default instance");
        return dependency.construct().map(Resolved::value);
    };

    let provision = provider
        .provide()
        .map_err(|source| DependencyResolutionError::Provider {
            type_name: type_name::<T>(),
            source: source.into(),
        })?;

    match provision {
        Provision::Value(value) => {
            debug!(type_name = type_name::<T>(), "Resolved from provider");
            Ok(Resolved::value(value))
        }
        Provision::Scoped(mut resource) => {
            let value = resource
                .enter()
                .map_err(|source| DependencyResolutionError::ResourceEnter {
                    type_name: type_name::<T>(),
                    source: source.into(),
                })?;
            debug!(type_name = type_name::<T>(), "Entered scoped resource");
            Ok(Resolved::scoped(value, resource))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Resource;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default, PartialEq)]
    struct Dep {
        hello: String,
    }

    #[derive(Debug)]
    struct DepWithArgs {
        #[allow(dead_code)]
        arg: String,
    }

    fn registered() -> Registry {
        let registry = Registry::new();
        registry
            .register(Dep {
                hello: "registered".into(),
            })
            .unwrap();
        registry
    }

    fn provided() -> Provider<Dep> {
        Provider::from_fn(|| Dep {
            hello: "provided".into(),
        })
    }

    #[test]
    fn test_registry_only_with_registry() {
        let registry = registered();
        let dep = resolve(
            &Dependency::<Dep>::default_constructible(),
            ResolutionPolicy::REGISTRY_ONLY,
            Some(&registry),
            None,
        )
        .unwrap();

        assert_eq!(dep.hello, "registered");
        assert!(Arc::ptr_eq(dep.get(), &registry.get::<Dep>().unwrap()));
    }

    #[test]
    fn test_registry_only_missing_entry() {
        let registry = Registry::new();
        let result = resolve(
            &Dependency::<Dep>::default_constructible(),
            ResolutionPolicy::REGISTRY_ONLY,
            Some(&registry),
            None,
        );

        assert!(matches!(result, Err(DependencyResolutionError::Lookup(_))));
    }

    #[test]
    fn test_registry_only_without_registry() {
        let result = resolve(
            &Dependency::<Dep>::default_constructible(),
            ResolutionPolicy::REGISTRY_ONLY,
            None,
            None,
        );

        assert!(matches!(
            result,
            Err(DependencyResolutionError::RegistryRequired { .. })
        ));
    }

    #[test]
    fn test_registry_or_initialize_prefers_registry() {
        let registry = registered();
        let dep = resolve(
            &Dependency::<Dep>::default_constructible(),
            ResolutionPolicy::REGISTRY_OR_INITIALIZE,
            Some(&registry),
            Some(&provided()),
        )
        .unwrap();

        assert_eq!(dep.hello, "registered");
    }

    #[test]
    fn test_registry_or_initialize_constructs_when_missing() {
        let registry = Registry::new();
        let dep = resolve(
            &Dependency::<Dep>::default_constructible(),
            ResolutionPolicy::REGISTRY_OR_INITIALIZE,
            Some(&registry),
            None,
        )
        .unwrap();

        assert_eq!(*dep, Dep::default());
        assert!(!dep.is_scoped());
    }

    #[test]
    fn test_registry_or_initialize_uses_provider_when_missing() {
        let registry = Registry::new();
        let dep = resolve(
            &Dependency::<Dep>::new(),
            ResolutionPolicy::REGISTRY_OR_INITIALIZE,
            Some(&registry),
            Some(&provided()),
        )
        .unwrap();

        assert_eq!(dep.hello, "provided");
    }

    #[test]
    fn test_registry_or_initialize_without_registry_initializes() {
        let dep = resolve(
            &Dependency::<Dep>::default_constructible(),
            ResolutionPolicy::REGISTRY_OR_INITIALIZE,
            None,
            None,
        )
        .unwrap();

        assert_eq!(*dep, Dep::default());
    }

    #[test]
    fn test_initialize_only_ignores_registry() {
        let registry = registered();
        let dep = resolve(
            &Dependency::<Dep>::default_constructible(),
            ResolutionPolicy::INITIALIZE_ONLY,
            Some(&registry),
            None,
        )
        .unwrap();

        assert_eq!(*dep, Dep::default());
    }

    #[test]
    fn test_initialize_only_from_provider() {
        let dep = resolve(
            &Dependency::<Dep>::new(),
            ResolutionPolicy::INITIALIZE_ONLY,
            None,
            Some(&provided()),
        )
        .unwrap();

        assert_eq!(dep.hello, "provided");
    }

    #[test]
    fn test_unable_to_construct() {
        let result = resolve(
            &Dependency::<DepWithArgs>::new(),
            ResolutionPolicy::INITIALIZE_ONLY,
            None,
            None,
        );

        match result {
            Err(DependencyResolutionError::Construction { source, .. }) => {
                assert!(source.is::<MissingConstructor>());
            }
            other => panic!("expected construction error, got {other:?}"),
        }
    }

    #[test]
    fn test_failing_constructor_is_wrapped() {
        let dependency: Dependency<Dep> =
            Dependency::with_constructor(|| anyhow::bail!("connection refused"));
        let result = resolve(&dependency, ResolutionPolicy::INITIALIZE_ONLY, None, None);

        match result {
            Err(DependencyResolutionError::Construction { source, .. }) => {
                assert_eq!(source.to_string(), "connection refused");
            }
            other => panic!("expected construction error, got {other:?}"),
        }
    }

    #[test]
    fn test_unresolvable_policy() {
        let registry = registered();
        for registry in [None, Some(&registry)] {
            let result = resolve(
                &Dependency::<Dep>::default_constructible(),
                ResolutionPolicy::new(false, false),
                registry,
                None,
            );
            assert!(matches!(
                result,
                Err(DependencyResolutionError::UnresolvablePolicy { .. })
            ));
        }
    }

    #[test]
    fn test_policy_validation() {
        assert!(ResolutionPolicy::try_new(false, false).is_err());
        assert_eq!(
            ResolutionPolicy::try_new(true, true).unwrap(),
            ResolutionPolicy::REGISTRY_OR_INITIALIZE
        );
        assert_eq!(ResolutionPolicy::default(), ResolutionPolicy::new(true, true));
    }

    #[test]
    fn test_scoped_resource_exits_when_released() {
        let exits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&exits);
        let provider = Provider::scoped(move || {
            let counter = Arc::clone(&counter);
            Resource::new(
                || {
                    Ok(Arc::new(Dep {
                        hello: "scoped".into(),
                    }))
                },
                move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                },
            )
        });

        let dep = resolve(
            &Dependency::<Dep>::new(),
            ResolutionPolicy::INITIALIZE_ONLY,
            None,
            Some(&provider),
        )
        .unwrap();

        assert!(dep.is_scoped());
        assert_eq!(dep.hello, "scoped");
        assert_eq!(exits.load(Ordering::SeqCst), 0);

        dep.release();
        assert_eq!(exits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_enter_is_not_exited() {
        let exits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&exits);
        let provider: Provider<Dep> = Provider::scoped(move || {
            let counter = Arc::clone(&counter);
            Resource::<Dep>::new(
                || anyhow::bail!("unreachable host"),
                move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                },
            )
        });

        let result = resolve(
            &Dependency::<Dep>::new(),
            ResolutionPolicy::INITIALIZE_ONLY,
            None,
            Some(&provider),
        );

        assert!(matches!(
            result,
            Err(DependencyResolutionError::ResourceEnter { .. })
        ));
        assert_eq!(exits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_provider_invoked_once_per_resolution() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let provider = Provider::from_fn(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Dep::default()
        });

        for _ in 0..3 {
            resolve(
                &Dependency::<Dep>::new(),
                ResolutionPolicy::INITIALIZE_ONLY,
                None,
                Some(&provider),
            )
            .unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}

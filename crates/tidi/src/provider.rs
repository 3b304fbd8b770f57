//! Providers: user-supplied factories used when a dependency must be initialised
//!
//! A provider is a zero-argument function. It either hands back a plain value or a
//! scoped resource whose acquisition must be paired with a release step:
//!
//! ```
//! use std::sync::Arc;
//! use tidi::{Provider, Resource};
//!
//! struct Connection {
//!     url: String,
//! }
//!
//! // Plain value
//! let plain = Provider::from_fn(|| Connection { url: "db://demo".into() });
//!
//! // Scoped resource, released once the resolved value goes out of scope
//! let scoped = Provider::scoped(|| {
//!     Resource::new(
//!         || Ok(Arc::new(Connection { url: "db://demo".into() })),
//!         |conn: Arc<Connection>| println!("closing {}", conn.url),
//!     )
//! });
//! # let _ = (plain, scoped);
//! ```

use std::any::type_name;
use std::fmt;
use std::sync::Arc;

/// A value whose acquisition must be paired with a release step.
///
/// The resolver calls [`enter`](ScopedResource::enter) once while resolving and
/// [`exit`](ScopedResource::exit) exactly once when the resolved value is released.
/// `exit` is not called when `enter` fails.
pub trait ScopedResource: Send {
    type Target: ?Sized + Send + Sync + 'static;

    /// Acquire the resource and return the value to inject
    fn enter(&mut self) -> anyhow::Result<Arc<Self::Target>>;

    /// Release the resource
    fn exit(&mut self);
}

/// The result of invoking a provider
pub enum Provision<T: ?Sized + Send + Sync + 'static> {
    /// A plain value, injected as is
    Value(Arc<T>),
    /// A resource to enter now and exit when the resolved value is released
    Scoped(Box<dyn ScopedResource<Target = T>>),
}

impl<T: Send + Sync + 'static> Provision<T> {
    pub fn value(value: T) -> Self {
        Provision::Value(Arc::new(value))
    }
}

impl<T: ?Sized + Send + Sync + 'static> Provision<T> {
    pub fn scoped<R>(resource: R) -> Self
    where
        R: ScopedResource<Target = T> + 'static,
    {
        Provision::Scoped(Box::new(resource))
    }

    pub fn is_scoped(&self) -> bool {
        matches!(self, Provision::Scoped(_))
    }
}

impl<T: ?Sized + Send + Sync + 'static> From<Arc<T>> for Provision<T> {
    fn from(value: Arc<T>) -> Self {
        Provision::Value(value)
    }
}

impl<T: ?Sized + Send + Sync + 'static> fmt::Debug for Provision<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provision::Value(_) => write!(f, "Provision::Value<{}>", type_name::<T>()),
            Provision::Scoped(_) => write!(f, "Provision::Scoped<{}>", type_name::<T>()),
        }
    }
}

type ProviderFn<T> = dyn Fn() -> anyhow::Result<Provision<T>> + Send + Sync;

/// A zero-argument factory producing a `T`, either directly or through a scoped resource
pub struct Provider<T: ?Sized + Send + Sync + 'static> {
    func: Arc<ProviderFn<T>>,
}

impl<T: ?Sized + Send + Sync + 'static> Provider<T> {
    /// Provider returning a [`Provision`] directly
    pub fn new<F>(func: F) -> Self
    where
        F: Fn() -> anyhow::Result<Provision<T>> + Send + Sync + 'static,
    {
        Self {
            func: Arc::new(func),
        }
    }

    /// Provider returning a shared value; works for unsized targets such as `dyn Trait`
    pub fn from_arc<F>(func: F) -> Self
    where
        F: Fn() -> Arc<T> + Send + Sync + 'static,
    {
        Self::new(move || Ok(Provision::Value(func())))
    }

    /// Provider returning a scoped resource
    pub fn scoped<R, F>(func: F) -> Self
    where
        R: ScopedResource<Target = T> + 'static,
        F: Fn() -> R + Send + Sync + 'static,
    {
        Self::new(move || Ok(Provision::Scoped(Box::new(func()))))
    }

    /// Invoke the provider
    pub fn provide(&self) -> anyhow::Result<Provision<T>> {
        (self.func)()
    }
}

impl<T: Send + Sync + 'static> Provider<T> {
    /// Provider returning a plain value
    pub fn from_fn<F>(func: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::new(move || Ok(Provision::value(func())))
    }

    /// Provider returning a plain value or an error
    pub fn try_from_fn<F>(func: F) -> Self
    where
        F: Fn() -> anyhow::Result<T> + Send + Sync + 'static,
    {
        Self::new(move || func().map(Provision::value))
    }
}

impl<T: ?Sized + Send + Sync + 'static> Clone for Provider<T> {
    fn clone(&self) -> Self {
        Self {
            func: Arc::clone(&self.func),
        }
    }
}

impl<T: ?Sized + Send + Sync + 'static> fmt::Debug for Provider<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Provider<{}>", type_name::<T>())
    }
}

type AcquireFn<T> = Box<dyn FnOnce() -> anyhow::Result<Arc<T>> + Send>;
type ReleaseFn<T> = Box<dyn FnOnce(Arc<T>) + Send>;

/// A [`ScopedResource`] built from an acquire closure and a release closure.
///
/// The release closure receives the acquired value and runs at most once.
pub struct Resource<T: ?Sized + Send + Sync + 'static> {
    acquire: Option<AcquireFn<T>>,
    release: Option<ReleaseFn<T>>,
    acquired: Option<Arc<T>>,
}

impl<T: ?Sized + Send + Sync + 'static> Resource<T> {
    pub fn new<A, R>(acquire: A, release: R) -> Self
    where
        A: FnOnce() -> anyhow::Result<Arc<T>> + Send + 'static,
        R: FnOnce(Arc<T>) + Send + 'static,
    {
        Self {
            acquire: Some(Box::new(acquire)),
            release: Some(Box::new(release)),
            acquired: None,
        }
    }
}

impl<T: ?Sized + Send + Sync + 'static> ScopedResource for Resource<T> {
    type Target = T;

    fn enter(&mut self) -> anyhow::Result<Arc<T>> {
        let acquire = self
            .acquire
            .take()
            .ok_or_else(|| anyhow::anyhow!("resource for {} entered twice", type_name::<T>()))?;
        let value = acquire()?;
        self.acquired = Some(Arc::clone(&value));
        Ok(value)
    }

    fn exit(&mut self) {
        if let (Some(release), Some(value)) = (self.release.take(), self.acquired.take()) {
            release(value);
        }
    }
}

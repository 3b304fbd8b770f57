//! A tiny dependency injection library
//!
//! `tidi` fills in the parameters a caller leaves out. A callable is described by a
//! static [`Signature`]; parameters annotated with a [`ResolutionPolicy`] are resolved
//! at call time from a type-keyed [`Registry`], from a [`Provider`], or by
//! constructing a fresh instance.
//!
//! ## Quick Start
//!
//! ```rust
//! use tidi::{Arguments, CallArgs, Dependency, Parameter, Registry, Signature};
//! use std::sync::Arc;
//!
//! #[derive(Default)]
//! struct Database {
//!     url: String,
//! }
//!
//! let registry = Arc::new(Registry::new());
//! registry.register(Database { url: "db://prod".into() }).unwrap();
//!
//! let connect = tidi::Injector::new(
//!     Signature::new().with(Parameter::injected("db", Dependency::<Database>::default_constructible())),
//!     Some(registry),
//!     |args: CallArgs| args.dependency::<Database>("db").map(|db| db.url.clone()),
//! );
//!
//! assert_eq!(connect.call(Arguments::new()).unwrap().unwrap(), "db://prod");
//! ```
//!
//! ## Components
//!
//! - [`parameters`]: signature descriptors and [`extract_injectable`]
//! - [`registry`] / [`storage`]: the type-keyed registry and its storage strategies
//! - [`resolver`] / [`provider`] / [`scope`]: resolution decisions, factories, release
//! - [`inject`]: the adapter that binds arguments and fills omitted parameters
//! - [`namespace`]: the process-wide default registry and free functions
//! - [`registration`]: startup hooks collected with `inventory`

pub mod config;
pub mod error;
pub mod inject;
pub mod namespace;
pub mod parameters;
pub mod provider;
pub mod registration;
pub mod registry;
pub mod resolver;
pub mod scope;
pub mod storage;

pub use crate::config::RegistryConfig;
pub use error::{
    ArgumentError, ConfigError, DependencyResolutionError, InjectError, MissingConstructor,
    RegistrationError, RegistryLookupError,
};
pub use inject::{Arguments, CallArgs, Injector};
pub use namespace::{
    default_namespace, default_registry, field_factory, inject, register, register_arc,
    reset_default_registry, Namespace,
};
pub use parameters::{
    extract_injectable, Annotation, AnyProvider, DeclaredType, DefaultValue, Metadata,
    Parameter, ParameterKind, ParameterSpec, Signature, TypeKey, TypeSlot, Unset,
};
pub use provider::{Provider, Provision, Resource, ScopedResource};
pub use registration::{run_registration_hooks, RegistrationHook};
pub use registry::{BannedTypes, Registry, RegistryBuilder};
pub use resolver::{resolve, Dependency, ResolutionPolicy, Resolved};
pub use scope::{Release, ScopeStack};
pub use storage::{PerThreadStorage, SharedStorage, Storage, StorageMode};

/// Resolution policy of `Injected<T>` parameters: registry first, then initialise
pub const DEFAULT_RESOLUTION_POLICY: ResolutionPolicy = ResolutionPolicy::REGISTRY_OR_INITIALIZE;

/// The `Unset` placeholder value
pub const UNSET: Unset = Unset;

/// Re-exported so hook submitters need no direct dependency
pub use inventory;

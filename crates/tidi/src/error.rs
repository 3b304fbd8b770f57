//! Error types for registration, lookup, resolution and injection

use thiserror::Error;

use crate::resolver::ResolutionPolicy;

/// Boxed cause carried by construction and provider failures
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised when registering an instance
#[derive(Debug, Error)]
pub enum RegistrationError {
    /// The key type is a primitive or builtin type
    #[error("Trying to register a banned type: {type_name}")]
    BannedType { type_name: &'static str },
}

/// Errors raised when looking up an instance in a registry
#[derive(Debug, Error)]
pub enum RegistryLookupError {
    /// Nothing is registered under the requested type
    #[error("Type has not been registered: {type_name}")]
    NotRegistered { type_name: &'static str },
}

/// Errors raised by the resolver
#[derive(Debug, Error)]
pub enum DependencyResolutionError {
    #[error("Registry required but not provided for {type_name}")]
    RegistryRequired { type_name: &'static str },

    #[error("Unable to resolve {type_name} with policy {policy:?}")]
    UnresolvablePolicy {
        type_name: &'static str,
        policy: ResolutionPolicy,
    },

    #[error("Invalid resolution policy {0:?}: at least one of use_registry or initialize_if_missing must be set")]
    InvalidPolicy(ResolutionPolicy),

    #[error(transparent)]
    Lookup(#[from] RegistryLookupError),

    #[error("Unable to construct {type_name}")]
    Construction {
        type_name: &'static str,
        #[source]
        source: BoxError,
    },

    #[error("Provider for {type_name} failed")]
    Provider {
        type_name: &'static str,
        #[source]
        source: BoxError,
    },

    #[error("Failed to enter scoped resource for {type_name}")]
    ResourceEnter {
        type_name: &'static str,
        #[source]
        source: BoxError,
    },

    #[error("Provider type mismatch: expected {expected}, found {found}")]
    ProviderTypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
}

/// Raised when a type has no zero-argument constructor
#[derive(Debug, Error)]
#[error("{type_name} has no zero-argument constructor")]
pub struct MissingConstructor {
    pub type_name: &'static str,
}

/// Errors raised while binding call arguments to a signature
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ArgumentError {
    #[error("Too many positional arguments: expected at most {expected}, got {given}")]
    TooManyPositional { expected: usize, given: usize },

    #[error("Got multiple values for argument '{0}'")]
    MultipleValues(String),

    #[error("Unexpected keyword argument '{0}'")]
    UnexpectedKeyword(String),

    #[error("Missing required argument '{0}'")]
    Missing(String),

    #[error("Argument '{0}' is not bound")]
    NotBound(String),

    #[error("Argument '{name}' is not a {expected}")]
    TypeMismatch { name: String, expected: &'static str },
}

/// Errors surfaced when calling an injected callable
#[derive(Debug, Error)]
pub enum InjectError {
    #[error(transparent)]
    Arguments(#[from] ArgumentError),

    #[error(transparent)]
    Resolution(#[from] DependencyResolutionError),
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config error: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

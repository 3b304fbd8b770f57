//! Static signature descriptors and injectable-parameter extraction
//!
//! A callable's parameter list is described once, when it is wrapped, with a
//! [`Signature`]. Parameters whose annotation carries a [`Metadata::Policy`] entry and
//! that can be passed by keyword with a default are injectable:
//!
//! ```
//! use tidi::{extract_injectable, Annotation, Dependency, Parameter, Signature};
//!
//! #[derive(Default)]
//! struct Dep;
//!
//! let signature = Signature::new()
//!     .with(Parameter::positional("a").typed::<String>())
//!     .with(Parameter::injected("b", Dependency::<Dep>::default_constructible()));
//!
//! let specs = extract_injectable(&signature);
//! assert_eq!(specs.len(), 1);
//! assert_eq!(specs[0].name(), "b");
//! ```

use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::sync::Arc;

use tracing::warn;

use crate::error::DependencyResolutionError;
use crate::provider::Provider;
use crate::registry::Registry;
use crate::resolver::{resolve, Dependency, ResolutionPolicy};
use crate::scope::Release;

/// A bound argument value
pub type ArgValue = Box<dyn Any + Send>;

/// Placeholder default meaning "not set yet, inject me"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Unset;

/// How a parameter may be passed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterKind {
    PositionalOnly,
    PositionalOrKeyword,
    /// Collects surplus positional arguments
    VarPositional,
    KeywordOnly,
    /// Collects surplus keyword arguments
    VarKeyword,
}

impl ParameterKind {
    pub fn accepts_keyword(self) -> bool {
        matches!(
            self,
            ParameterKind::PositionalOrKeyword | ParameterKind::KeywordOnly
        )
    }

    pub fn accepts_positional(self) -> bool {
        matches!(
            self,
            ParameterKind::PositionalOnly | ParameterKind::PositionalOrKeyword
        )
    }

    pub fn is_variadic(self) -> bool {
        matches!(
            self,
            ParameterKind::VarPositional | ParameterKind::VarKeyword
        )
    }
}

/// Identity of a type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is<T: ?Sized + 'static>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }
}

/// The outcome of resolving one parameter
pub struct ResolvedArg {
    /// An `Arc<T>` for the requested type `T`
    pub value: ArgValue,
    /// Release obligation when the value came from a scoped resource
    pub guard: Option<Box<dyn Release>>,
}

impl fmt::Debug for ResolvedArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedArg")
            .field("scoped", &self.guard.is_some())
            .finish()
    }
}

trait ErasedDependency: Send + Sync {
    fn resolve_erased(
        &self,
        policy: ResolutionPolicy,
        registry: Option<&Registry>,
        provider: Option<&AnyProvider>,
    ) -> Result<ResolvedArg, DependencyResolutionError>;
}

impl<T: ?Sized + Send + Sync + 'static> ErasedDependency for Dependency<T> {
    fn resolve_erased(
        &self,
        policy: ResolutionPolicy,
        registry: Option<&Registry>,
        provider: Option<&AnyProvider>,
    ) -> Result<ResolvedArg, DependencyResolutionError> {
        let provider = provider.map(AnyProvider::downcast::<T>).transpose()?;
        let resolved = resolve(self, policy, registry, provider)?;
        let value: ArgValue = Box::new(Arc::clone(resolved.get()));
        let guard = if resolved.is_scoped() {
            Some(Box::new(resolved) as Box<dyn Release>)
        } else {
            None
        };
        Ok(ResolvedArg { value, guard })
    }
}

/// One member of a declared type, able to resolve values of that type
#[derive(Clone)]
pub struct TypeSlot {
    key: TypeKey,
    dependency: Arc<dyn ErasedDependency>,
}

impl TypeSlot {
    /// A type without a zero-argument constructor
    pub fn of<T: ?Sized + Send + Sync + 'static>() -> Self {
        Self::dependency(Dependency::<T>::new())
    }

    pub fn dependency<T: ?Sized + Send + Sync + 'static>(dependency: Dependency<T>) -> Self {
        Self {
            key: TypeKey::of::<T>(),
            dependency: Arc::new(dependency),
        }
    }

    pub fn key(&self) -> TypeKey {
        self.key
    }

    pub fn type_name(&self) -> &'static str {
        self.key.name
    }

    pub fn is_unset(&self) -> bool {
        self.key.is::<Unset>()
    }
}

impl PartialEq for TypeSlot {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl fmt::Debug for TypeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key.name)
    }
}

/// A parameter's declared type: one type or a union of alternatives
#[derive(Debug, Clone, PartialEq)]
pub enum DeclaredType {
    Single(TypeSlot),
    Union(Vec<TypeSlot>),
}

impl DeclaredType {
    pub fn of<T: ?Sized + Send + Sync + 'static>() -> Self {
        DeclaredType::Single(TypeSlot::of::<T>())
    }

    /// `T | Unset`
    pub fn or_unset<T: ?Sized + Send + Sync + 'static>(dependency: Dependency<T>) -> Self {
        DeclaredType::Union(vec![TypeSlot::dependency(dependency), TypeSlot::of::<Unset>()])
    }

    /// The type to resolve: the first union member that is not [`Unset`]
    pub fn base_type(&self) -> Option<&TypeSlot> {
        match self {
            DeclaredType::Single(slot) => Some(slot),
            DeclaredType::Union(members) => members.iter().find(|slot| !slot.is_unset()),
        }
    }
}

impl From<TypeSlot> for DeclaredType {
    fn from(slot: TypeSlot) -> Self {
        DeclaredType::Single(slot)
    }
}

/// Extra information attached to an annotated parameter
#[derive(Clone)]
pub enum Metadata {
    /// Marks the parameter as injectable under this policy
    Policy(ResolutionPolicy),
    /// Anything else; compared by identity
    Other(Arc<dyn Any + Send + Sync>),
}

impl Metadata {
    pub fn other<V: Any + Send + Sync>(value: V) -> Self {
        Metadata::Other(Arc::new(value))
    }

    pub fn policy(&self) -> Option<ResolutionPolicy> {
        match self {
            Metadata::Policy(policy) => Some(*policy),
            Metadata::Other(_) => None,
        }
    }
}

impl PartialEq for Metadata {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Metadata::Policy(a), Metadata::Policy(b)) => a == b,
            (Metadata::Other(a), Metadata::Other(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Metadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metadata::Policy(policy) => f.debug_tuple("Policy").field(policy).finish(),
            Metadata::Other(_) => f.write_str("Other(..)"),
        }
    }
}

/// A parameter's type annotation
#[derive(Debug, Clone, PartialEq)]
pub enum Annotation {
    /// A bare type hint
    Plain(DeclaredType),
    /// A type hint carrying metadata
    Annotated {
        declared: DeclaredType,
        metadata: Vec<Metadata>,
    },
}

impl Annotation {
    pub fn plain<T: ?Sized + Send + Sync + 'static>() -> Self {
        Annotation::Plain(DeclaredType::of::<T>())
    }

    pub fn annotated(declared: impl Into<DeclaredType>, metadata: Vec<Metadata>) -> Self {
        Annotation::Annotated {
            declared: declared.into(),
            metadata,
        }
    }

    /// `T | Unset` resolved with the default policy
    pub fn injected<T: ?Sized + Send + Sync + 'static>(dependency: Dependency<T>) -> Self {
        Self::injected_with(dependency, ResolutionPolicy::default())
    }

    /// `T | Unset` resolved with `policy`
    pub fn injected_with<T: ?Sized + Send + Sync + 'static>(
        dependency: Dependency<T>,
        policy: ResolutionPolicy,
    ) -> Self {
        Annotation::Annotated {
            declared: DeclaredType::or_unset(dependency),
            metadata: vec![Metadata::Policy(policy)],
        }
    }
}

/// A type-erased [`Provider`]
#[derive(Clone)]
pub struct AnyProvider {
    type_name: &'static str,
    provider: Arc<dyn Any + Send + Sync>,
}

impl AnyProvider {
    pub fn new<T: ?Sized + Send + Sync + 'static>(provider: Provider<T>) -> Self {
        Self {
            type_name: type_name::<T>(),
            provider: Arc::new(provider),
        }
    }

    /// Name of the provided type
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn downcast<T: ?Sized + Send + Sync + 'static>(
        &self,
    ) -> Result<&Provider<T>, DependencyResolutionError> {
        self.provider.downcast_ref::<Provider<T>>().ok_or(
            DependencyResolutionError::ProviderTypeMismatch {
                expected: type_name::<T>(),
                found: self.type_name,
            },
        )
    }
}

impl<T: ?Sized + Send + Sync + 'static> From<Provider<T>> for AnyProvider {
    fn from(provider: Provider<T>) -> Self {
        Self::new(provider)
    }
}

impl fmt::Debug for AnyProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Provider<{}>", self.type_name)
    }
}

type DefaultFn = dyn Fn() -> ArgValue + Send + Sync;

/// A parameter's declared default
#[derive(Clone)]
pub enum DefaultValue {
    /// The [`Unset`] placeholder
    Unset,
    /// A factory for the parameter's value
    Provider(AnyProvider),
    /// A plain value, cloned into every call that omits the parameter
    Value(Arc<DefaultFn>),
}

impl DefaultValue {
    pub fn value<V: Clone + Send + Sync + 'static>(value: V) -> Self {
        DefaultValue::Value(Arc::new(move || Box::new(value.clone()) as ArgValue))
    }

    pub fn provider<T: ?Sized + Send + Sync + 'static>(provider: Provider<T>) -> Self {
        DefaultValue::Provider(AnyProvider::new(provider))
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, DefaultValue::Unset)
    }

    /// The value bound when the parameter is omitted and not injected
    pub fn materialize(&self) -> ArgValue {
        match self {
            DefaultValue::Unset => Box::new(Unset),
            DefaultValue::Provider(provider) => Box::new(provider.clone()),
            DefaultValue::Value(make) => make(),
        }
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::Unset => f.write_str("Unset"),
            DefaultValue::Provider(provider) => provider.fmt(f),
            DefaultValue::Value(_) => f.write_str("Value(..)"),
        }
    }
}

/// One declared parameter
#[derive(Debug, Clone)]
pub struct Parameter {
    name: String,
    kind: ParameterKind,
    default: Option<DefaultValue>,
    annotation: Option<Annotation>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, kind: ParameterKind) -> Self {
        Self {
            name: name.into(),
            kind,
            default: None,
            annotation: None,
        }
    }

    /// A positional-or-keyword parameter
    pub fn positional(name: impl Into<String>) -> Self {
        Self::new(name, ParameterKind::PositionalOrKeyword)
    }

    pub fn keyword_only(name: impl Into<String>) -> Self {
        Self::new(name, ParameterKind::KeywordOnly)
    }

    /// `name: Injected<T> = Unset`
    pub fn injected<T: ?Sized + Send + Sync + 'static>(
        name: impl Into<String>,
        dependency: Dependency<T>,
    ) -> Self {
        Self::positional(name)
            .annotation(Annotation::injected(dependency))
            .default(DefaultValue::Unset)
    }

    /// `name: Injected<T> = Provider(..)`
    pub fn provided<T: ?Sized + Send + Sync + 'static>(
        name: impl Into<String>,
        provider: Provider<T>,
    ) -> Self {
        Self::positional(name)
            .annotation(Annotation::injected(Dependency::<T>::new()))
            .default(DefaultValue::provider(provider))
    }

    pub fn default(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }

    pub fn annotation(mut self, annotation: Annotation) -> Self {
        self.annotation = Some(annotation);
        self
    }

    /// Plain type hint
    pub fn typed<T: ?Sized + Send + Sync + 'static>(self) -> Self {
        self.annotation(Annotation::plain::<T>())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ParameterKind {
        self.kind
    }

    pub fn default_value(&self) -> Option<&DefaultValue> {
        self.default.as_ref()
    }

    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }

    pub fn annotation_ref(&self) -> Option<&Annotation> {
        self.annotation.as_ref()
    }

    pub fn is_annotated(&self) -> bool {
        matches!(self.annotation, Some(Annotation::Annotated { .. }))
    }

    /// The real type of an annotated parameter; `None` when not annotated
    pub fn base_type(&self) -> Option<&TypeSlot> {
        match &self.annotation {
            Some(Annotation::Annotated { declared, .. }) => declared.base_type(),
            _ => None,
        }
    }

    /// Metadata of an annotated parameter; `None` when not annotated
    pub fn metadata(&self) -> Option<&[Metadata]> {
        match &self.annotation {
            Some(Annotation::Annotated { metadata, .. }) => Some(metadata),
            _ => None,
        }
    }

    /// The governing policy: the first policy entry in the metadata
    pub fn policy(&self) -> Option<ResolutionPolicy> {
        self.metadata()?.iter().find_map(Metadata::policy)
    }
}

/// The ordered parameter list of a callable
#[derive(Debug, Clone, Default)]
pub struct Signature {
    parameters: Vec<Parameter>,
}

impl Signature {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a parameter.
    ///
    /// A parameter reusing an earlier name replaces that declaration.
    pub fn with(mut self, parameter: Parameter) -> Self {
        if let Some(existing) = self
            .parameters
            .iter_mut()
            .find(|p| p.name == parameter.name)
        {
            warn!(name = %parameter.name, "Duplicate parameter name replaces earlier declaration");
            *existing = parameter;
        } else {
            self.parameters.push(parameter);
        }
        self
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Every annotated parameter, regardless of kind or default
    pub fn annotated_parameters(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters.iter().filter(|p| p.is_annotated())
    }
}

impl FromIterator<Parameter> for Signature {
    fn from_iter<I: IntoIterator<Item = Parameter>>(iter: I) -> Self {
        iter.into_iter().fold(Signature::new(), Signature::with)
    }
}

/// An injectable parameter: what to resolve, how, and with which provider
#[derive(Debug, Clone)]
pub struct ParameterSpec {
    name: String,
    requested: TypeSlot,
    policy: ResolutionPolicy,
    provider: Option<AnyProvider>,
}

impl ParameterSpec {
    /// Build the spec of an injectable parameter; `None` when it does not qualify
    pub fn from_parameter(parameter: &Parameter) -> Option<Self> {
        if !parameter.kind.accepts_keyword() {
            return None;
        }
        let default = parameter.default.as_ref()?;
        let policy = parameter.policy()?;
        let requested = parameter.base_type()?.clone();
        let provider = match default {
            DefaultValue::Provider(provider) => Some(provider.clone()),
            _ => None,
        };

        Some(Self {
            name: parameter.name.clone(),
            requested,
            policy,
            provider,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn requested_type(&self) -> TypeKey {
        self.requested.key
    }

    pub fn policy(&self) -> ResolutionPolicy {
        self.policy
    }

    pub fn provider(&self) -> Option<&AnyProvider> {
        self.provider.as_ref()
    }

    /// Resolve this parameter's value
    pub fn resolve(
        &self,
        registry: Option<&Registry>,
    ) -> Result<ResolvedArg, DependencyResolutionError> {
        self.requested
            .dependency
            .resolve_erased(self.policy, registry, self.provider.as_ref())
    }
}

/// The injectable parameters of `signature`, in declaration order
pub fn extract_injectable(signature: &Signature) -> Vec<ParameterSpec> {
    signature
        .parameters
        .iter()
        .filter_map(ParameterSpec::from_parameter)
        .collect()
}

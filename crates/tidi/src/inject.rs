//! Injection adapter: wraps a callable and fills omitted injectable parameters
//!
//! ```
//! use std::sync::Arc;
//! use tidi::{Arguments, CallArgs, Dependency, Injector, Parameter, Registry, Signature};
//!
//! #[derive(Default)]
//! struct Greeting {
//!     word: String,
//! }
//!
//! let registry = Arc::new(Registry::new());
//! registry.register(Greeting { word: "hello".into() }).unwrap();
//!
//! let greet = Injector::new(
//!     Signature::new()
//!         .with(Parameter::positional("name").typed::<String>())
//!         .with(Parameter::injected("greeting", Dependency::<Greeting>::default_constructible())),
//!     Some(registry),
//!     |args: CallArgs| -> Result<String, tidi::ArgumentError> {
//!         let name = args.get::<String>("name")?;
//!         let greeting = args.dependency::<Greeting>("greeting")?;
//!         Ok(format!("{} {}", greeting.word, name))
//!     },
//! );
//!
//! let out = greet.call(Arguments::new().arg("world".to_string())).unwrap();
//! assert_eq!(out.unwrap(), "hello world");
//! ```

use std::any::type_name;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::error::{ArgumentError, InjectError};
use crate::parameters::{
    extract_injectable, ArgValue, ParameterKind, ParameterSpec, Signature, Unset,
};
use crate::registry::Registry;
use crate::scope::ScopeStack;

/// Arguments supplied by the caller
#[derive(Default)]
pub struct Arguments {
    positional: Vec<ArgValue>,
    keyword: Vec<(String, ArgValue)>,
}

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a positional argument
    pub fn arg<V: Send + 'static>(mut self, value: V) -> Self {
        self.positional.push(Box::new(value));
        self
    }

    /// Add a keyword argument
    pub fn kwarg<V: Send + 'static>(mut self, name: impl Into<String>, value: V) -> Self {
        self.keyword.push((name.into(), Box::new(value)));
        self
    }

    /// Supply an injectable parameter explicitly
    pub fn dependency<T>(self, name: impl Into<String>, value: Arc<T>) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.kwarg(name, value)
    }

    pub fn len(&self) -> usize {
        self.positional.len() + self.keyword.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for Arguments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arguments")
            .field("positional", &self.positional.len())
            .field(
                "keyword",
                &self.keyword.iter().map(|(name, _)| name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Arguments bound to parameter names, as seen by the wrapped callable
#[derive(Default)]
pub struct CallArgs {
    values: HashMap<String, ArgValue>,
    extra_positional: Vec<ArgValue>,
    extra_keyword: Vec<(String, ArgValue)>,
}

impl CallArgs {
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Borrow the value bound to `name`
    pub fn get<V: 'static>(&self, name: &str) -> Result<&V, ArgumentError> {
        self.values
            .get(name)
            .ok_or_else(|| ArgumentError::NotBound(name.to_string()))?
            .downcast_ref::<V>()
            .ok_or_else(|| ArgumentError::TypeMismatch {
                name: name.to_string(),
                expected: type_name::<V>(),
            })
    }

    /// Take ownership of the value bound to `name`
    pub fn take<V: 'static>(&mut self, name: &str) -> Result<V, ArgumentError> {
        let value = self
            .values
            .remove(name)
            .ok_or_else(|| ArgumentError::NotBound(name.to_string()))?;
        match value.downcast::<V>() {
            Ok(value) => Ok(*value),
            Err(value) => {
                self.values.insert(name.to_string(), value);
                Err(ArgumentError::TypeMismatch {
                    name: name.to_string(),
                    expected: type_name::<V>(),
                })
            }
        }
    }

    /// The shared value of an injectable parameter
    pub fn dependency<T>(&self, name: &str) -> Result<Arc<T>, ArgumentError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.get::<Arc<T>>(name).cloned()
    }

    /// `true` when `name` is bound to the [`Unset`] placeholder
    pub fn is_unset(&self, name: &str) -> bool {
        self.values.get(name).is_some_and(|value| value.is::<Unset>())
    }

    /// Surplus positional arguments collected by a variadic parameter
    pub fn extra_positional(&self) -> &[ArgValue] {
        &self.extra_positional
    }

    /// Surplus keyword arguments collected by a variadic parameter
    pub fn extra_keyword(&self) -> &[(String, ArgValue)] {
        &self.extra_keyword
    }

    fn insert(&mut self, name: &str, value: ArgValue) {
        self.values.insert(name.to_string(), value);
    }
}

impl fmt::Debug for CallArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.values.keys().collect();
        names.sort();
        f.debug_struct("CallArgs")
            .field("bound", &names)
            .field("extra_positional", &self.extra_positional.len())
            .field("extra_keyword", &self.extra_keyword.len())
            .finish()
    }
}

/// Bind caller arguments to `signature`.
///
/// Returns the bound arguments and the names the caller supplied explicitly.
/// Omitted parameters with a default get that default; omitted injectable
/// parameters in `injectable` are left unbound for the resolver.
fn bind(
    signature: &Signature,
    injectable: &[ParameterSpec],
    args: Arguments,
) -> Result<CallArgs, ArgumentError> {
    let Arguments {
        positional,
        keyword,
    } = args;
    let mut bound = CallArgs::default();

    let positional_slots: Vec<_> = signature
        .parameters()
        .iter()
        .filter(|p| p.kind().accepts_positional())
        .collect();
    let accepts_extra_positional = signature
        .parameters()
        .iter()
        .any(|p| p.kind() == ParameterKind::VarPositional);
    let accepts_extra_keyword = signature
        .parameters()
        .iter()
        .any(|p| p.kind() == ParameterKind::VarKeyword);

    let given = positional.len();
    let mut positional = positional.into_iter();
    for (slot, value) in positional_slots.iter().zip(positional.by_ref()) {
        bound.insert(slot.name(), value);
    }
    let surplus: Vec<_> = positional.collect();
    if !surplus.is_empty() {
        if !accepts_extra_positional {
            return Err(ArgumentError::TooManyPositional {
                expected: positional_slots.len(),
                given,
            });
        }
        bound.extra_positional = surplus;
    }

    for (name, value) in keyword {
        match signature.parameter(&name) {
            Some(parameter) if parameter.kind().accepts_keyword() => {
                if bound.contains(&name) {
                    return Err(ArgumentError::MultipleValues(name));
                }
                bound.insert(&name, value);
            }
            _ if accepts_extra_keyword => {
                if bound.extra_keyword.iter().any(|(existing, _)| *existing == name) {
                    return Err(ArgumentError::MultipleValues(name));
                }
                bound.extra_keyword.push((name, value));
            }
            _ => return Err(ArgumentError::UnexpectedKeyword(name)),
        }
    }

    for parameter in signature.parameters() {
        if parameter.kind().is_variadic() || bound.contains(parameter.name()) {
            continue;
        }
        if injectable.iter().any(|spec| spec.name() == parameter.name()) {
            continue;
        }
        match parameter.default_value() {
            Some(default) => bound.insert(parameter.name(), default.materialize()),
            None => return Err(ArgumentError::Missing(parameter.name().to_string())),
        }
    }

    Ok(bound)
}

/// A callable wrapped for injection.
///
/// The injectable parameter list is extracted once, here, and reused by every call.
pub struct Injector<F> {
    signature: Signature,
    injectable: Vec<ParameterSpec>,
    registry: Option<Arc<Registry>>,
    func: F,
}

impl<F> Injector<F> {
    pub fn new<R>(signature: Signature, registry: Option<Arc<Registry>>, func: F) -> Self
    where
        F: Fn(CallArgs) -> R,
    {
        let injectable = extract_injectable(&signature);
        debug!(
            parameters = signature.len(),
            injectable = injectable.len(),
            "Wrapped callable for injection"
        );
        Self {
            signature,
            injectable,
            registry,
            func,
        }
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// The cached injectable parameters
    pub fn injectable(&self) -> &[ParameterSpec] {
        &self.injectable
    }

    pub fn registry(&self) -> Option<&Arc<Registry>> {
        self.registry.as_ref()
    }

    /// Bind `args`, resolve every omitted injectable parameter and run the callable.
    ///
    /// Scoped resources entered while resolving are released in reverse order once
    /// the callable returns, when a later parameter fails to resolve, or when the
    /// callable panics.
    ///
    /// # Errors
    /// - `InjectError::Arguments` if `args` do not fit the signature; nothing is resolved
    /// - `InjectError::Resolution` if an injectable parameter cannot be resolved; the
    ///   callable is not run
    pub fn call<R>(&self, args: Arguments) -> Result<R, InjectError>
    where
        F: Fn(CallArgs) -> R,
    {
        let mut bound = bind(&self.signature, &self.injectable, args)?;
        let mut scope = ScopeStack::new();
        let registry = self.registry.as_deref();

        for spec in &self.injectable {
            if bound.contains(spec.name()) {
                debug!(name = spec.name(), "Parameter supplied by caller");
                continue;
            }
            let resolved = spec.resolve(registry)?;
            if let Some(guard) = resolved.guard {
                scope.push_boxed(guard);
            }
            bound.insert(spec.name(), resolved.value);
        }

        let output = (self.func)(bound);
        scope.close();
        Ok(output)
    }
}

impl<F> fmt::Debug for Injector<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Injector")
            .field("signature", &self.signature)
            .field("injectable", &self.injectable)
            .field("has_registry", &self.registry.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DependencyResolutionError;
    use crate::parameters::{DefaultValue, Parameter};
    use crate::provider::{Provider, Resource};
    use crate::resolver::Dependency;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default, PartialEq)]
    struct Dep {
        hello: String,
    }

    #[derive(Debug)]
    struct DepWithArgs {
        arg: String,
    }

    fn signature() -> Signature {
        Signature::new()
            .with(Parameter::positional("a").typed::<String>())
            .with(Parameter::injected(
                "b",
                Dependency::<Dep>::default_constructible(),
            ))
    }

    fn echo(args: CallArgs) -> (String, Arc<Dep>) {
        let a = args.get::<String>("a").unwrap().clone();
        let b = args.dependency::<Dep>("b").unwrap();
        (a, b)
    }

    #[test]
    fn test_bind_positional_and_keyword() {
        let signature = Signature::new()
            .with(Parameter::positional("a"))
            .with(Parameter::positional("b"))
            .with(Parameter::keyword_only("c").default(DefaultValue::value(3u8)));

        let bound = bind(
            &signature,
            &[],
            Arguments::new().arg(1u8).kwarg("b", 2u8),
        )
        .unwrap();

        assert_eq!(*bound.get::<u8>("a").unwrap(), 1);
        assert_eq!(*bound.get::<u8>("b").unwrap(), 2);
        assert_eq!(*bound.get::<u8>("c").unwrap(), 3);
    }

    #[test]
    fn test_bind_errors() {
        let signature = Signature::new()
            .with(Parameter::new("a", ParameterKind::PositionalOnly))
            .with(Parameter::positional("b"));

        assert_eq!(
            bind(&signature, &[], Arguments::new().arg(1u8).arg(2u8).arg(3u8)).unwrap_err(),
            ArgumentError::TooManyPositional {
                expected: 2,
                given: 3
            }
        );
        assert_eq!(
            bind(&signature, &[], Arguments::new().arg(1u8).arg(2u8).kwarg("b", 2u8)).unwrap_err(),
            ArgumentError::MultipleValues("b".into())
        );
        assert_eq!(
            bind(&signature, &[], Arguments::new().kwarg("a", 1u8)).unwrap_err(),
            ArgumentError::UnexpectedKeyword("a".into())
        );
        assert_eq!(
            bind(&signature, &[], Arguments::new().arg(1u8)).unwrap_err(),
            ArgumentError::Missing("b".into())
        );
    }

    #[test]
    fn test_bind_variadics() {
        let signature = Signature::new()
            .with(Parameter::positional("a"))
            .with(Parameter::new("args", ParameterKind::VarPositional))
            .with(Parameter::new("kwargs", ParameterKind::VarKeyword));

        let bound = bind(
            &signature,
            &[],
            Arguments::new().arg(1u8).arg(2u8).arg(3u8).kwarg("extra", 4u8),
        )
        .unwrap();

        assert_eq!(bound.extra_positional().len(), 2);
        assert_eq!(bound.extra_keyword()[0].0, "extra");
        assert!(!bound.contains("args"));
    }

    #[test]
    fn test_call_args_type_mismatch() {
        let mut bound = bind(
            &Signature::new().with(Parameter::positional("a")),
            &[],
            Arguments::new().arg(1u8),
        )
        .unwrap();

        assert!(matches!(
            bound.get::<String>("a"),
            Err(ArgumentError::TypeMismatch { .. })
        ));
        assert!(bound.take::<String>("a").is_err());
        assert_eq!(bound.take::<u8>("a").unwrap(), 1);
        assert_eq!(
            bound.get::<u8>("a").unwrap_err(),
            ArgumentError::NotBound("a".into())
        );
    }

    #[test]
    fn test_unset_default_is_bound_when_not_injectable() {
        let signature =
            Signature::new().with(Parameter::positional("a").default(DefaultValue::Unset));

        let bound = bind(&signature, &[], Arguments::new()).unwrap();
        assert!(bound.is_unset("a"));
    }

    #[test]
    fn test_injects_default_constructed() {
        let injector = Injector::new(signature(), Some(Arc::new(Registry::new())), echo);

        let (a, b) = injector
            .call(Arguments::new().arg("hello".to_string()))
            .unwrap();
        assert_eq!(a, "hello");
        assert_eq!(*b, Dep::default());
    }

    #[test]
    fn test_injects_registered() {
        let registry = Arc::new(Registry::new());
        registry
            .register(Dep {
                hello: "world".into(),
            })
            .unwrap();
        let injector = Injector::new(signature(), Some(Arc::clone(&registry)), echo);

        let (_, b) = injector
            .call(Arguments::new().arg("hello".to_string()))
            .unwrap();
        assert_eq!(b.hello, "world");
        assert!(Arc::ptr_eq(&b, &registry.get::<Dep>().unwrap()));
    }

    #[test]
    fn test_explicit_argument_skips_resolution() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let signature = Signature::new()
            .with(Parameter::positional("a").typed::<String>())
            .with(Parameter::provided(
                "b",
                Provider::from_fn(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Dep::default()
                }),
            ));
        let injector = Injector::new(signature, None, echo);
        let custom = Arc::new(Dep {
            hello: "custom".into(),
        });

        let (_, by_keyword) = injector
            .call(
                Arguments::new()
                    .arg("hello".to_string())
                    .dependency("b", Arc::clone(&custom)),
            )
            .unwrap();
        let (_, by_position) = injector
            .call(
                Arguments::new()
                    .arg("hello".to_string())
                    .arg(Arc::clone(&custom)),
            )
            .unwrap();

        assert!(Arc::ptr_eq(&by_keyword, &custom));
        assert!(Arc::ptr_eq(&by_position, &custom));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_resolution_error_aborts_call() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let signature =
            Signature::new().with(Parameter::injected("b", Dependency::<DepWithArgs>::new()));
        let injector = Injector::new(signature, None, move |args: CallArgs| {
            counter.fetch_add(1, Ordering::SeqCst);
            args.dependency::<DepWithArgs>("b").unwrap().arg.clone()
        });

        let result = injector.call(Arguments::new());
        assert!(matches!(
            result,
            Err(InjectError::Resolution(
                DependencyResolutionError::Construction { .. }
            ))
        ));
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_argument_error_checked_before_resolution() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let signature = Signature::new()
            .with(Parameter::positional("a"))
            .with(Parameter::provided(
                "b",
                Provider::from_fn(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Dep::default()
                }),
            ));
        let injector = Injector::new(signature, None, |_: CallArgs| ());

        let result = injector.call(Arguments::new().kwarg("zzz", 1u8));
        assert!(matches!(result, Err(InjectError::Arguments(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    fn tracked(id: u32, log: &Arc<Mutex<Vec<String>>>) -> Provider<Dep> {
        let log = Arc::clone(log);
        Provider::scoped(move || {
            let enter_log = Arc::clone(&log);
            let exit_log = Arc::clone(&log);
            Resource::new(
                move || {
                    enter_log.lock().push(format!("enter {id}"));
                    Ok(Arc::new(Dep::default()))
                },
                move |_| exit_log.lock().push(format!("exit {id}")),
            )
        })
    }

    #[test]
    fn test_scoped_resources_released_in_reverse_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let signature = Signature::new()
            .with(Parameter::provided("one", tracked(1, &log)))
            .with(Parameter::provided("two", tracked(2, &log)))
            .with(Parameter::provided("three", tracked(3, &log)));
        let body_log = Arc::clone(&log);
        let injector = Injector::new(signature, None, move |_: CallArgs| {
            body_log.lock().push("body".to_string());
        });

        injector.call(Arguments::new()).unwrap();

        assert_eq!(
            *log.lock(),
            vec![
                "enter 1", "enter 2", "enter 3", "body", "exit 3", "exit 2", "exit 1"
            ]
        );
    }

    #[test]
    fn test_partial_resolution_failure_releases_entered() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let signature = Signature::new()
            .with(Parameter::provided("one", tracked(1, &log)))
            .with(Parameter::provided("two", tracked(2, &log)))
            .with(Parameter::provided(
                "broken",
                Provider::<Dep>::try_from_fn(|| anyhow::bail!("factory failed")),
            ));
        let injector = Injector::new(signature, None, |_: CallArgs| ());

        assert!(injector.call(Arguments::new()).is_err());
        assert_eq!(*log.lock(), vec!["enter 1", "enter 2", "exit 2", "exit 1"]);
    }

    #[test]
    fn test_release_on_panic() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let signature = Signature::new()
            .with(Parameter::provided("one", tracked(1, &log)))
            .with(Parameter::provided("two", tracked(2, &log)));
        let injector = Injector::new(signature, None, |_: CallArgs| -> () {
            panic!("callable failed");
        });

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            injector.call(Arguments::new())
        }));

        assert!(result.is_err());
        assert_eq!(*log.lock(), vec!["enter 1", "enter 2", "exit 2", "exit 1"]);
    }

    #[test]
    fn test_injectable_list_is_cached() {
        let injector = Injector::new(signature(), None, echo);

        assert_eq!(injector.injectable().len(), 1);
        assert_eq!(injector.injectable()[0].name(), "b");
        assert_eq!(injector.signature().len(), 2);
    }
}

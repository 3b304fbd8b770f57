//! The demo programs, each returning the line it prints

use std::sync::Arc;

use anyhow::Result;
use tidi::{
    Annotation, Arguments, CallArgs, DefaultValue, Dependency, Namespace, Parameter, Provider,
    RegistrationHook, Signature,
};
use tracing::info;

/// Default database connection string when `DB_CONN_STRING` is unset
pub const DEFAULT_DB_CONN_STRING: &str = "db://demo-db";

#[derive(Debug, Clone, PartialEq)]
pub struct Audience(pub String);

fn get_audience() -> Audience {
    Audience("World".to_string())
}

struct Welcomer {
    audience: Arc<Audience>,
}

impl Welcomer {
    fn greet(&self) -> String {
        format!("Hello, {}! 👋", self.audience.0)
    }
}

/// Greet an audience supplied by a provider
pub fn hello_world(namespace: &Namespace) -> Result<String> {
    let new_welcomer = namespace.inject(
        Signature::new().with(Parameter::provided(
            "audience",
            Provider::from_fn(get_audience),
        )),
        |args: CallArgs| -> Result<Welcomer> {
            Ok(Welcomer {
                audience: args.dependency::<Audience>("audience")?,
            })
        },
    );

    let welcomer = new_welcomer.call(Arguments::new())??;
    Ok(welcomer.greet())
}

#[derive(Debug, Clone, PartialEq)]
pub struct DbConnString(pub String);

fn load_db_conn_string() -> DbConnString {
    DbConnString(
        std::env::var("DB_CONN_STRING").unwrap_or_else(|_| DEFAULT_DB_CONN_STRING.to_string()),
    )
}

struct Fridge {
    db_conn_string: Arc<DbConnString>,
}

impl Fridge {
    fn get_snack(&self) -> String {
        format!("getting snack from {}", self.db_conn_string.0)
    }
}

/// Read a connection string through a provider function
pub fn from_func(namespace: &Namespace) -> Result<String> {
    let new_fridge = namespace.inject(
        Signature::new().with(Parameter::provided(
            "db_conn_string",
            Provider::from_fn(load_db_conn_string),
        )),
        |args: CallArgs| -> Result<Fridge> {
            Ok(Fridge {
                db_conn_string: args.dependency::<DbConnString>("db_conn_string")?,
            })
        },
    );

    let fridge = new_fridge.call(Arguments::new())??;
    Ok(fridge.get_snack())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumRepeats(pub u32);

inventory::submit! {
    RegistrationHook::new("demo_num_repeats", |registry| registry.register(NumRepeats(10)))
}

#[derive(Debug)]
struct AlgorithmConfig {
    atol: f64,
    num_repeats: NumRepeats,
}

#[derive(Debug)]
struct Algorithm {
    name: String,
    atol: f64,
    num_repeats: NumRepeats,
}

impl Algorithm {
    fn run(&self, feature: f64) -> f64 {
        feature * self.atol * f64::from(self.num_repeats.0)
    }
}

/// Options of the registered-types demo
#[derive(Debug, Clone)]
pub struct RegisteredOptions {
    pub name: String,
    pub atol: f64,
    pub feature: f64,
    pub repeats: Option<u32>,
}

fn configure_algorithm(namespace: &Namespace, atol: f64) -> Result<()> {
    let num_repeats = namespace.field_factory(Dependency::<NumRepeats>::new(), None);
    let config = AlgorithmConfig {
        atol,
        num_repeats: *num_repeats()?,
    };
    namespace.register(config)?;
    info!("algorithm configured ✅");
    Ok(())
}

fn build_model(namespace: &Namespace, name: &str) -> Result<()> {
    let new_algorithm = namespace.inject(
        Signature::new()
            .with(Parameter::positional("name").typed::<String>())
            .with(
                Parameter::positional("alg_config")
                    .annotation(Annotation::injected(Dependency::<AlgorithmConfig>::new()))
                    .default(DefaultValue::Unset),
            ),
        |mut args: CallArgs| -> Result<Algorithm> {
            let config = args.dependency::<AlgorithmConfig>("alg_config")?;
            Ok(Algorithm {
                name: args.take::<String>("name")?,
                atol: config.atol,
                num_repeats: config.num_repeats,
            })
        },
    );

    let model = new_algorithm.call(Arguments::new().arg(name.to_string()))??;
    namespace.register(model)?;
    info!("model built ✅");
    Ok(())
}

fn run_model(namespace: &Namespace, feature: f64) -> Result<String> {
    let run = namespace.inject(
        Signature::new().with(Parameter::injected("model", Dependency::<Algorithm>::new())),
        move |args: CallArgs| -> Result<String> {
            let model = args.dependency::<Algorithm>("model")?;
            Ok(format!(
                "algorithm \"{}\" has output = {:.4} 😎",
                model.name,
                model.run(feature)
            ))
        },
    );

    run.call(Arguments::new())?
}

/// Configure, build and run a model wired entirely through the registry
pub fn registered(namespace: &Namespace, options: &RegisteredOptions) -> Result<String> {
    if let Some(repeats) = options.repeats {
        namespace.register(NumRepeats(repeats))?;
    }
    configure_algorithm(namespace, options.atol)?;
    build_model(namespace, &options.name)?;
    run_model(namespace, options.feature)
}

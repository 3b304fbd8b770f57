//! Startup registration hooks collected at link time
//!
//! Any linked crate can contribute instances to a registry by submitting a
//! [`RegistrationHook`]:
//!
//! ```rust,ignore
//! use tidi::{Registry, RegistrationError, RegistrationHook};
//!
//! inventory::submit! {
//!     RegistrationHook::new("database", |registry: &Registry| -> Result<(), RegistrationError> {
//!         registry.register(Database::connect_default())
//!     })
//! }
//! ```
//!
//! The hooks are then executed against a registry at startup:
//!
//! ```rust,ignore
//! let registry = tidi::default_registry();
//! tidi::run_registration_hooks(&registry)?;
//! ```

use tracing::{debug, info};

use crate::error::RegistrationError;
use crate::registry::Registry;

/// A named registration function discovered through `inventory`
pub struct RegistrationHook {
    /// Name of the hook, for diagnostics
    pub name: &'static str,

    /// Registers instances with the registry
    pub register_fn: fn(&Registry) -> Result<(), RegistrationError>,

    /// Execution order (lower = earlier, default = 100)
    pub priority: u32,
}

impl RegistrationHook {
    pub const fn new(
        name: &'static str,
        register_fn: fn(&Registry) -> Result<(), RegistrationError>,
    ) -> Self {
        Self::with_priority(name, register_fn, 100)
    }

    pub const fn with_priority(
        name: &'static str,
        register_fn: fn(&Registry) -> Result<(), RegistrationError>,
        priority: u32,
    ) -> Self {
        Self {
            name,
            register_fn,
            priority,
        }
    }
}

inventory::collect!(RegistrationHook);

fn sorted_hooks() -> Vec<&'static RegistrationHook> {
    let mut hooks: Vec<_> = inventory::iter::<RegistrationHook>().collect();
    // Stable: equal priorities keep discovery order
    hooks.sort_by_key(|hook| hook.priority);
    hooks
}

/// Run every discovered hook against `registry`, in priority order.
///
/// Stops at the first failing hook. Returns the number of hooks run.
pub fn run_registration_hooks(registry: &Registry) -> Result<usize, RegistrationError> {
    let hooks = sorted_hooks();
    info!("Discovered {} registration hooks", hooks.len());

    for hook in &hooks {
        debug!(
            "Running registration hook '{}' (priority: {})",
            hook.name, hook.priority
        );
        (hook.register_fn)(registry)?;
    }

    Ok(hooks.len())
}

/// Names of the discovered hooks, in execution order
pub fn list_registration_hooks() -> Vec<&'static str> {
    sorted_hooks().into_iter().map(|hook| hook.name).collect()
}

pub fn registration_hook_count() -> usize {
    inventory::iter::<RegistrationHook>().count()
}

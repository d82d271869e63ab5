//! Per-component lifecycle: the `Lifecycle` capability and the state machine
//! that drives a component through its start/stop hooks.

mod machine;
mod state;


pub use machine::{LifecycleHooks, LifecycleStateMachine};
pub use state::{transition, ComponentState, HookKind, LifecycleEvent};

use crate::error::Result;
use std::sync::Arc;
use tracing::warn;

/// Start/stop capability of a supervised component.
///
/// Handles are compared by identity, never by value.
pub trait Lifecycle: Send + Sync {
    /// Name used in logs and errors
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn start(&self) -> Result<()>;

    fn stop(&self) -> Result<()>;
}

/// Something that owns a `Lifecycle` without being one
pub trait LifecycleAware {
    fn lifecycle(&self) -> Arc<dyn Lifecycle>;
}

/// Identity comparison of two component handles
pub fn same_component(a: &Arc<dyn Lifecycle>, b: &Arc<dyn Lifecycle>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

/// Start a component, logging instead of returning any failure.
///
/// Returns whether the component started.
pub fn start_quietly(component: &dyn Lifecycle) -> bool {
    match component.start() {
        Ok(()) => true,
        Err(e) => {
            warn!("Failed to start component '{}': {}", component.name(), e);
            false
        }
    }
}

/// Stop a component, logging instead of returning any failure.
///
/// Returns whether the component stopped.
pub fn stop_quietly(component: &dyn Lifecycle) -> bool {
    match component.stop() {
        Ok(()) => true,
        Err(e) => {
            warn!("Failed to stop component '{}': {}", component.name(), e);
            false
        }
    }
}

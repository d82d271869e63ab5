pub mod config;
pub mod error;
pub mod heartbeat;
pub mod lifecycle;
pub mod manager;
pub mod shutdown;

#[cfg(test)]
pub mod test_utils;

pub use crate::config::{HeartbeatConfig, LoggingConfig, ShutdownConfig, SupervisorConfig};
pub use error::{BatchOperation, ComponentFailure, FailureCause, Result, SupervisorError};
pub use heartbeat::{Heartbeat, HeartbeatComponent};
pub use lifecycle::{
    start_quietly, stop_quietly, ComponentState, Lifecycle, LifecycleAware, LifecycleHooks,
    LifecycleStateMachine,
};
pub use manager::LifecycleManager;
pub use shutdown::{
    ExitAction, ExitHook, ProcessExit, ShutdownCoordinator, SignalExitHook, TerminationSignal,
};

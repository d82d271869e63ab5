use crate::lifecycle::{ComponentState, HookKind, LifecycleEvent};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Shared handle to the error a component hook returned.
pub type FailureCause = Arc<anyhow::Error>;

/// Batch operation the manager was running when components failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOperation {
    Start,
    Stop,
}

impl fmt::Display for BatchOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => write!(f, "start"),
            Self::Stop => write!(f, "stop"),
        }
    }
}

/// One component's failure inside a batch operation
#[derive(Debug)]
pub struct ComponentFailure {
    pub component: String,
    pub error: SupervisorError,
}

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Undefined transition: cannot {event} component '{component}' while {state}")]
    UndefinedTransition {
        component: String,
        state: ComponentState,
        event: LifecycleEvent,
    },

    #[error("Component '{component}' failed during {phase}: {cause:#}")]
    Hook {
        component: String,
        phase: HookKind,
        cause: FailureCause,
    },

    /// The message carries only the count; individual causes ride along in
    /// `failures` and have already been logged.
    #[error("{} components failed to {operation}", .failures.len())]
    Batch {
        operation: BatchOperation,
        failures: Vec<ComponentFailure>,
    },

    #[error("Exit hook error: {message}")]
    ExitHook { message: String },
}

impl SupervisorError {
    pub fn exit_hook<S: Into<String>>(message: S) -> Self {
        Self::ExitHook {
            message: message.into(),
        }
    }

    /// Number of failed components for a batch error, zero otherwise
    pub fn failed_count(&self) -> usize {
        match self {
            Self::Batch { failures, .. } => failures.len(),
            _ => 0,
        }
    }

    pub fn is_undefined_transition(&self) -> bool {
        matches!(self, Self::UndefinedTransition { .. })
    }
}

pub type Result<T> = std::result::Result<T, SupervisorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_message_reports_count_only() {
        let err = SupervisorError::Batch {
            operation: BatchOperation::Start,
            failures: vec![ComponentFailure {
                component: "db".to_string(),
                error: SupervisorError::exit_hook("boom"),
            }],
        };

        assert_eq!(err.to_string(), "1 components failed to start");
        assert_eq!(err.failed_count(), 1);
    }

    #[test]
    fn test_hook_error_includes_cause() {
        let err = SupervisorError::Hook {
            component: "cache".to_string(),
            phase: HookKind::Stop,
            cause: Arc::new(anyhow::anyhow!("disk full")),
        };

        let message = err.to_string();
        assert!(message.contains("cache"));
        assert!(message.contains("stop"));
        assert!(message.contains("disk full"));
        assert!(!err.is_undefined_transition());
    }
}

use super::state::{transition, ComponentState, HookKind, LifecycleEvent};
use super::Lifecycle;
use crate::error::{FailureCause, Result, SupervisorError};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Hooks a component supplies to its state machine.
///
/// Hook errors never escape directly: the machine captures them as the
/// component's failure record, moves to [`ComponentState::Failed`] and hands
/// the resulting error to [`LifecycleHooks::do_failed`].
pub trait LifecycleHooks: Send + Sync {
    /// Whether a failed component may be recovered by [`LifecycleHooks::do_reset`].
    const RESETTABLE: bool = false;

    /// Name used in logs and errors
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn do_start(&self) -> anyhow::Result<()>;

    fn do_stop(&self) -> anyhow::Result<()>;

    /// Clear whatever left the component failed. Only called when
    /// `RESETTABLE` is true.
    fn do_reset(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called once per failure while the component lock is still held.
    ///
    /// Returning `Ok(())` swallows the failure, so the `start`/`stop` call that
    /// caused it returns normally with the component left in `Failed`.
    fn do_failed(&self, error: SupervisorError) -> Result<()> {
        error!("{}", error);
        Err(error)
    }
}

#[derive(Debug, Default)]
struct Inner {
    state: ComponentState,
    failure: Option<FailureCause>,
}

/// Serialized start/stop state machine around a set of [`LifecycleHooks`].
///
/// Every operation, including the queries, takes the component lock for its
/// whole duration, so callers never observe `Starting` or `Stopping` from the
/// outside. Hooks must not call back into their own state machine; the lock is
/// not reentrant.
pub struct LifecycleStateMachine<H> {
    hooks: H,
    inner: Mutex<Inner>,
}

impl<H: LifecycleHooks> LifecycleStateMachine<H> {
    /// Create a state machine in the `Stopped` state
    pub fn new(hooks: H) -> Self {
        Self {
            hooks,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    pub fn is_resettable(&self) -> bool {
        H::RESETTABLE
    }

    /// Current state, never an intermediate one
    pub fn state(&self) -> ComponentState {
        self.inner.lock().state
    }

    pub fn is_started(&self) -> bool {
        self.state() == ComponentState::Started
    }

    pub fn is_stopped(&self) -> bool {
        self.state() == ComponentState::Stopped
    }

    pub fn is_failed(&self) -> bool {
        self.state() == ComponentState::Failed
    }

    /// The captured failure, if the component has one that has not been reset
    pub fn failure(&self) -> Option<FailureCause> {
        self.inner.lock().failure.clone()
    }

    fn invoke(&self, hook: HookKind) -> anyhow::Result<()> {
        match hook {
            HookKind::Start => self.hooks.do_start(),
            HookKind::Stop => self.hooks.do_stop(),
            HookKind::Reset => self.hooks.do_reset(),
        }
    }

    fn undefined(&self, state: ComponentState, event: LifecycleEvent) -> SupervisorError {
        SupervisorError::UndefinedTransition {
            component: self.hooks.name().to_string(),
            state,
            event,
        }
    }

    fn step(&self, inner: &mut Inner, event: LifecycleEvent) -> Result<()> {
        let next = transition(inner.state, event, H::RESETTABLE)
            .ok_or_else(|| self.undefined(inner.state, event))?;
        debug!(
            "Component '{}' {} -> {} on {}",
            self.hooks.name(),
            inner.state,
            next,
            event
        );
        inner.state = next;
        Ok(())
    }

    fn report_failure(&self, inner: &Inner, hook: HookKind) -> Result<()> {
        let Some(cause) = inner.failure.clone() else {
            return Ok(());
        };
        self.hooks.do_failed(SupervisorError::Hook {
            component: self.hooks.name().to_string(),
            phase: hook,
            cause,
        })
    }

    /// Drive one caller request through to a settled state
    fn run(&self, event: LifecycleEvent, hook: HookKind) -> Result<()> {
        let mut inner = self.inner.lock();
        let from = inner.state;

        if transition(from, event, H::RESETTABLE).is_none() {
            return Err(self.undefined(from, event));
        }

        if from == ComponentState::Failed {
            debug!("Resetting component '{}' before {}", self.hooks.name(), event);
            match self.invoke(HookKind::Reset) {
                Ok(()) => inner.failure = None,
                Err(e) => {
                    // The new failure replaces the old one; the state stays Failed
                    inner.failure = Some(Arc::new(e));
                    return self.report_failure(&inner, HookKind::Reset);
                }
            }
        }

        self.step(&mut inner, event)?;

        if let Err(e) = self.invoke(hook) {
            inner.failure = Some(Arc::new(e));
        }

        if inner.failure.is_some() {
            self.step(&mut inner, LifecycleEvent::Failed)?;
            return self.report_failure(&inner, hook);
        }

        self.step(&mut inner, LifecycleEvent::Completed)?;
        info!("Component '{}' {}", self.hooks.name(), inner.state);
        Ok(())
    }
}

impl<H: LifecycleHooks> Lifecycle for LifecycleStateMachine<H> {
    fn name(&self) -> &str {
        self.hooks.name()
    }

    fn start(&self) -> Result<()> {
        self.run(LifecycleEvent::Start, HookKind::Start)
    }

    fn stop(&self) -> Result<()> {
        self.run(LifecycleEvent::Stop, HookKind::Stop)
    }
}

impl<H: LifecycleHooks> std::fmt::Debug for LifecycleStateMachine<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("LifecycleStateMachine")
            .field("name", &self.hooks.name())
            .field("state", &inner.state)
            .field("failed", &inner.failure.is_some())
            .finish()
    }
}

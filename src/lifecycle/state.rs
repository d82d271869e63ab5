use std::fmt;

/// Component lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ComponentState {
    #[default]
    Stopped,
    Starting,
    Started,
    Stopping,
    Failed,
}

impl fmt::Display for ComponentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => write!(f, "stopped"),
            Self::Starting => write!(f, "starting"),
            Self::Started => write!(f, "started"),
            Self::Stopping => write!(f, "stopping"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Inputs that drive the state machine.
///
/// `Start` and `Stop` come from callers; `Completed` and `Failed` are raised
/// internally once the component hook for the pending transition returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Start,
    Stop,
    Completed,
    Failed,
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => write!(f, "start"),
            Self::Stop => write!(f, "stop"),
            Self::Completed => write!(f, "complete"),
            Self::Failed => write!(f, "fail"),
        }
    }
}

/// Component hook invoked during a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    Start,
    Stop,
    Reset,
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => write!(f, "start"),
            Self::Stop => write!(f, "stop"),
            Self::Reset => write!(f, "reset"),
        }
    }
}

/// Transition table.
///
/// Returns the next state for `(state, event)` or `None` when the edge does
/// not exist. Leaving `Failed` is only possible for resettable components; the
/// caller runs the reset hook before entering the returned state.
pub fn transition(
    state: ComponentState,
    event: LifecycleEvent,
    resettable: bool,
) -> Option<ComponentState> {
    use ComponentState::*;
    use LifecycleEvent as E;

    match (state, event) {
        (Stopped, E::Start) => Some(Starting),
        (Started, E::Stop) => Some(Stopping),
        (Failed, E::Start) if resettable => Some(Starting),
        (Failed, E::Stop) if resettable => Some(Stopping),
        (Starting, E::Completed) => Some(Started),
        (Stopping, E::Completed) => Some(Stopped),
        (Starting, E::Failed) | (Stopping, E::Failed) => Some(Failed),
        _ => None,
    }
}

use crate::error::{Result, SupervisorError};
use crate::lifecycle::{LifecycleHooks, LifecycleStateMachine};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Shared, ordered record of hook invocations such as `"start:a"`
pub type CallLog = Arc<Mutex<Vec<String>>>;

pub fn call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// Scriptable hooks that record every call into a [`CallLog`]
pub struct Probe<const R: bool> {
    name: String,
    log: CallLog,
    swallow_failures: bool,
    pub fail_start: AtomicBool,
    pub fail_stop: AtomicBool,
    pub fail_reset: AtomicBool,
    pub resets: AtomicUsize,
    pub failures_reported: AtomicUsize,
}

impl<const R: bool> Probe<R> {
    pub fn new(name: &str) -> Self {
        Self::with_log(name, call_log())
    }

    pub fn with_log(name: &str, log: CallLog) -> Self {
        Self {
            name: name.to_string(),
            log,
            swallow_failures: false,
            fail_start: AtomicBool::new(false),
            fail_stop: AtomicBool::new(false),
            fail_reset: AtomicBool::new(false),
            resets: AtomicUsize::new(0),
            failures_reported: AtomicUsize::new(0),
        }
    }

    pub fn swallowing(mut self) -> Self {
        self.swallow_failures = true;
        self
    }

    pub fn failing_start(self) -> Self {
        self.fail_start.store(true, Ordering::SeqCst);
        self
    }

    pub fn failing_stop(self) -> Self {
        self.fail_stop.store(true, Ordering::SeqCst);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    fn record(&self, hook: &str) {
        self.log.lock().push(format!("{}:{}", hook, self.name));
    }
}

impl<const R: bool> LifecycleHooks for Probe<R> {
    const RESETTABLE: bool = R;

    fn name(&self) -> &str {
        &self.name
    }

    fn do_start(&self) -> anyhow::Result<()> {
        self.record("start");
        if self.fail_start.load(Ordering::SeqCst) {
            anyhow::bail!("{} refused to start", self.name);
        }
        Ok(())
    }

    fn do_stop(&self) -> anyhow::Result<()> {
        self.record("stop");
        if self.fail_stop.load(Ordering::SeqCst) {
            anyhow::bail!("{} refused to stop", self.name);
        }
        Ok(())
    }

    fn do_reset(&self) -> anyhow::Result<()> {
        self.record("reset");
        self.resets.fetch_add(1, Ordering::SeqCst);
        if self.fail_reset.load(Ordering::SeqCst) {
            anyhow::bail!("{} refused to reset", self.name);
        }
        Ok(())
    }

    fn do_failed(&self, error: SupervisorError) -> Result<()> {
        self.failures_reported.fetch_add(1, Ordering::SeqCst);
        if self.swallow_failures {
            Ok(())
        } else {
            Err(error)
        }
    }
}

pub type ProbeComponent = LifecycleStateMachine<Probe<false>>;
pub type ResettableProbeComponent = LifecycleStateMachine<Probe<true>>;

pub fn probe(name: &str, log: &CallLog) -> Arc<ProbeComponent> {
    Arc::new(LifecycleStateMachine::new(Probe::with_log(name, Arc::clone(log))))
}

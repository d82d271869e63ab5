use crate::error::{BatchOperation, ComponentFailure, Result, SupervisorError};
use crate::lifecycle::{same_component, Lifecycle, LifecycleAware};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Collects per-component failures while a batch keeps going
struct BatchOutcome {
    operation: BatchOperation,
    attempted: usize,
    failures: Vec<ComponentFailure>,
}

impl BatchOutcome {
    fn new(operation: BatchOperation) -> Self {
        Self {
            operation,
            attempted: 0,
            failures: Vec::new(),
        }
    }

    fn record(&mut self, component: &dyn Lifecycle, result: Result<()>) {
        self.attempted += 1;
        if let Err(e) = result {
            error!(
                "Error during {} of component '{}': {}",
                self.operation,
                component.name(),
                e
            );
            self.failures.push(ComponentFailure {
                component: component.name().to_string(),
                error: e,
            });
        }
    }

    fn finish(self) -> Result<()> {
        if self.failures.is_empty() {
            debug!("Batch {} of {} components succeeded", self.operation, self.attempted);
            return Ok(());
        }

        let err = SupervisorError::Batch {
            operation: self.operation,
            failures: self.failures,
        };
        error!("{} (of {} attempted)", err, self.attempted);
        Err(err)
    }
}

/// Ordered set of components started and stopped as one unit.
///
/// Components start in registration order and stop in the exact reverse. A
/// failing component never prevents the rest of the batch from running; the
/// batch reports a single aggregate error at the end.
///
/// Batches iterate over a snapshot of the registration set, so `add` and
/// `remove` never wait on a component's hooks and are safe to call while a
/// batch is running.
pub struct LifecycleManager {
    components: RwLock<Vec<Arc<dyn Lifecycle>>>,
}

impl LifecycleManager {
    pub fn new() -> Self {
        Self {
            components: RwLock::new(Vec::new()),
        }
    }

    /// Register a component. Returns false if it was already registered.
    pub fn add(&self, component: Arc<dyn Lifecycle>) -> bool {
        let mut components = self.components.write();
        if components.iter().any(|c| same_component(c, &component)) {
            debug!("Component '{}' already registered", component.name());
            return false;
        }

        info!("Registering component '{}'", component.name());
        components.push(component);
        true
    }

    pub fn add_aware(&self, aware: &dyn LifecycleAware) -> bool {
        self.add(aware.lifecycle())
    }

    /// Unregister a component without stopping it. Returns false if it was
    /// not registered.
    pub fn remove(&self, component: &Arc<dyn Lifecycle>) -> bool {
        let mut components = self.components.write();
        match components.iter().position(|c| same_component(c, component)) {
            Some(index) => {
                let removed = components.remove(index);
                info!("Unregistered component '{}'", removed.name());
                true
            }
            None => false,
        }
    }

    pub fn remove_aware(&self, aware: &dyn LifecycleAware) -> bool {
        self.remove(&aware.lifecycle())
    }

    /// Drop every registration without stopping anything
    pub fn clear(&self) {
        let mut components = self.components.write();
        debug!("Clearing {} registered components", components.len());
        components.clear();
    }

    pub fn contains(&self, component: &Arc<dyn Lifecycle>) -> bool {
        self.components
            .read()
            .iter()
            .any(|c| same_component(c, component))
    }

    pub fn len(&self) -> usize {
        self.components.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.read().is_empty()
    }

    /// Snapshot of the registration set in start order
    pub fn components(&self) -> Vec<Arc<dyn Lifecycle>> {
        self.components.read().clone()
    }

    /// Start every component in registration order
    pub fn start(&self) -> Result<()> {
        let components = self.components();
        info!("Starting {} components", components.len());

        let mut outcome = BatchOutcome::new(BatchOperation::Start);
        for component in &components {
            outcome.record(&**component, component.start());
        }
        outcome.finish()
    }

    /// Stop every component in reverse registration order
    pub fn stop(&self) -> Result<()> {
        let components = self.components();
        info!("Stopping {} components", components.len());

        let mut outcome = BatchOutcome::new(BatchOperation::Stop);
        for component in components.iter().rev() {
            outcome.record(&**component, component.stop());
        }
        outcome.finish()
    }

    /// Start all components, logging instead of returning the aggregate error
    pub fn start_quietly(&self) -> bool {
        match self.start() {
            Ok(()) => true,
            Err(e) => {
                warn!("Ignoring start failure: {}", e);
                false
            }
        }
    }

    /// Stop all components, logging instead of returning the aggregate error
    pub fn stop_quietly(&self) -> bool {
        match self.stop() {
            Ok(()) => true,
            Err(e) => {
                warn!("Ignoring stop failure: {}", e);
                false
            }
        }
    }
}

impl Default for LifecycleManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle for LifecycleManager {
    fn name(&self) -> &str {
        "lifecycle-manager"
    }

    fn start(&self) -> Result<()> {
        LifecycleManager::start(self)
    }

    fn stop(&self) -> Result<()> {
        LifecycleManager::stop(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::LifecycleStateMachine;
    use crate::test_utils::{call_log, probe, Probe};
    use std::thread;

    fn as_dyn<T: Lifecycle + 'static>(component: &Arc<T>) -> Arc<dyn Lifecycle> {
        Arc::clone(component) as Arc<dyn Lifecycle>
    }

    #[test]
    fn test_start_in_order_stop_in_reverse() {
        let log = call_log();
        let manager = LifecycleManager::new();
        for name in ["a", "b", "c"] {
            assert!(manager.add(probe(name, &log)));
        }

        manager.start().unwrap();
        manager.stop().unwrap();

        assert_eq!(
            *log.lock(),
            vec!["start:a", "start:b", "start:c", "stop:c", "stop:b", "stop:a"]
        );
    }

    #[test]
    fn test_failure_does_not_abort_batch() {
        let log = call_log();
        let manager = LifecycleManager::new();
        let a = Arc::new(LifecycleStateMachine::new(
            Probe::<false>::with_log("a", Arc::clone(&log)).failing_start(),
        ));
        let b = probe("b", &log);
        let c = probe("c", &log);
        manager.add(as_dyn(&a));
        manager.add(as_dyn(&b));
        manager.add(as_dyn(&c));

        let err = manager.start().unwrap_err();

        assert_eq!(err.to_string(), "1 components failed to start");
        assert_eq!(err.failed_count(), 1);
        match &err {
            SupervisorError::Batch {
                operation,
                failures,
            } => {
                assert_eq!(*operation, BatchOperation::Start);
                assert_eq!(failures[0].component, "a");
            }
            other => panic!("Unexpected error: {}", other),
        }
        assert_eq!(*log.lock(), vec!["start:a", "start:b", "start:c"]);
        assert!(a.is_failed());
        assert!(b.is_started());
        assert!(c.is_started());
    }

    #[test]
    fn test_stop_counts_every_failure() {
        let log = call_log();
        let manager = LifecycleManager::new();
        let a = probe("a", &log);
        let b = probe("b", &log);
        manager.add(as_dyn(&a));
        manager.add(as_dyn(&b));

        // Neither component was started, so both stops are undefined
        let err = manager.stop().unwrap_err();
        assert_eq!(err.to_string(), "2 components failed to stop");
        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_duplicate_add_is_noop() {
        let log = call_log();
        let manager = LifecycleManager::new();
        let a = as_dyn(&probe("a", &log));

        assert!(manager.add(Arc::clone(&a)));
        assert!(!manager.add(Arc::clone(&a)));
        assert_eq!(manager.len(), 1);

        manager.start().unwrap();
        assert_eq!(*log.lock(), vec!["start:a"]);
    }

    #[test]
    fn test_remove_and_clear() {
        let log = call_log();
        let manager = LifecycleManager::new();
        let a = as_dyn(&probe("a", &log));
        let b = as_dyn(&probe("b", &log));
        manager.add(Arc::clone(&a));
        manager.add(Arc::clone(&b));

        assert!(manager.remove(&a));
        assert!(!manager.remove(&a));
        assert!(!manager.contains(&a));
        assert!(manager.contains(&b));

        manager.start().unwrap();
        manager.clear();

        assert!(manager.is_empty());
        // Clearing never stops anything
        assert_eq!(*log.lock(), vec!["start:b"]);
    }

    #[test]
    fn test_quiet_batch() {
        let log = call_log();
        let manager = LifecycleManager::new();
        manager.add(probe("a", &log));

        assert!(manager.start_quietly());
        assert!(!manager.start_quietly());
        assert!(manager.stop_quietly());
    }

    #[test]
    fn test_nested_manager() {
        let log = call_log();
        let inner = Arc::new(LifecycleManager::new());
        inner.add(probe("inner", &log));

        let outer = LifecycleManager::new();
        outer.add(probe("first", &log));
        outer.add(as_dyn(&inner));
        outer.add(probe("last", &log));

        outer.start().unwrap();
        outer.stop().unwrap();

        assert_eq!(
            *log.lock(),
            vec![
                "start:first",
                "start:inner",
                "start:last",
                "stop:last",
                "stop:inner",
                "stop:first"
            ]
        );
    }

    #[test]
    fn test_concurrent_registration_during_batches() {
        let log = call_log();
        let manager = Arc::new(LifecycleManager::new());

        let registrar = {
            let manager = Arc::clone(&manager);
            let log = Arc::clone(&log);
            thread::spawn(move || {
                for i in 0..50 {
                    let component = as_dyn(&probe(&format!("c{}", i), &log));
                    manager.add(Arc::clone(&component));
                    if i % 2 == 0 {
                        manager.remove(&component);
                    }
                }
            })
        };

        for _ in 0..20 {
            // Components may be mid-cycle; only the absence of panics matters here
            let _ = manager.start();
            let _ = manager.stop();
        }
        registrar.join().unwrap();

        assert_eq!(manager.len(), 25);
    }
}

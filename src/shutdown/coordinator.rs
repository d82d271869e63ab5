use super::hook::{ExitAction, ExitHook, SignalExitHook};
use crate::config::ShutdownConfig;
use crate::error::Result;
use crate::lifecycle::{Lifecycle, LifecycleAware};
use crate::manager::LifecycleManager;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, error, info};

static GLOBAL: Lazy<ShutdownCoordinator> =
    Lazy::new(|| ShutdownCoordinator::new(SignalExitHook::new(ShutdownConfig::default())));

#[derive(Debug, Default)]
struct Registration {
    count: usize,
    installed: bool,
}

/// Stops registered components when the process terminates.
///
/// The coordinator owns a [`LifecycleManager`] that is considered always
/// running: components are registered already started (or started by their
/// owner) and the coordinator only ever stops them, in reverse registration
/// order, from the exit hook. The hook is installed while at least one
/// component is registered and removed as soon as none are.
///
/// An exit hook fires once. Firing marks it uninstalled, so the next
/// registration change installs a fresh one for whatever is still registered.
pub struct ShutdownCoordinator {
    manager: Arc<LifecycleManager>,
    hook: Box<dyn ExitHook>,
    registration: Arc<Mutex<Registration>>,
}

impl ShutdownCoordinator {
    pub fn new<H: ExitHook + 'static>(hook: H) -> Self {
        Self {
            manager: Arc::new(LifecycleManager::new()),
            hook: Box::new(hook),
            registration: Arc::new(Mutex::new(Registration::default())),
        }
    }

    /// Process-wide coordinator bound to SIGINT/SIGTERM with default settings
    pub fn global() -> &'static ShutdownCoordinator {
        &GLOBAL
    }

    /// Register a component. Returns false if it was already registered.
    pub fn add(&self, component: Arc<dyn Lifecycle>) -> Result<bool> {
        let mut registration = self.registration.lock();
        let added = self.manager.add(component);
        if added {
            registration.count += 1;
        }
        self.sync_hook(&mut registration)?;
        Ok(added)
    }

    /// Register several components, returning how many were new
    pub fn add_all<I>(&self, components: I) -> Result<usize>
    where
        I: IntoIterator<Item = Arc<dyn Lifecycle>>,
    {
        let mut registration = self.registration.lock();
        let mut added = 0;
        for component in components {
            if self.manager.add(component) {
                added += 1;
            }
        }
        registration.count += added;
        self.sync_hook(&mut registration)?;
        Ok(added)
    }

    pub fn add_aware(&self, aware: &dyn LifecycleAware) -> Result<bool> {
        self.add(aware.lifecycle())
    }

    /// Unregister a component without stopping it. Returns false if it was
    /// not registered.
    pub fn remove(&self, component: &Arc<dyn Lifecycle>) -> Result<bool> {
        let mut registration = self.registration.lock();
        let removed = self.manager.remove(component);
        if removed {
            registration.count = registration.count.saturating_sub(1);
        }
        self.sync_hook(&mut registration)?;
        Ok(removed)
    }

    /// Unregister several components, returning how many were registered
    pub fn remove_all<'a, I>(&self, components: I) -> Result<usize>
    where
        I: IntoIterator<Item = &'a Arc<dyn Lifecycle>>,
    {
        let mut registration = self.registration.lock();
        let mut removed = 0;
        for component in components {
            if self.manager.remove(component) {
                removed += 1;
            }
        }
        registration.count = registration.count.saturating_sub(removed);
        self.sync_hook(&mut registration)?;
        Ok(removed)
    }

    pub fn remove_aware(&self, aware: &dyn LifecycleAware) -> Result<bool> {
        self.remove(&aware.lifecycle())
    }

    /// Drop every registration and the exit hook without stopping anything
    pub fn clear(&self) -> Result<()> {
        let mut registration = self.registration.lock();
        self.manager.clear();
        registration.count = 0;
        self.sync_hook(&mut registration)
    }

    /// Number of registered components
    pub fn registered(&self) -> usize {
        self.registration.lock().count
    }

    pub fn is_hook_installed(&self) -> bool {
        self.registration.lock().installed
    }

    /// Stop all registered components the way the exit hook does, logging
    /// instead of returning any failure
    pub fn run_exit_action(&self) {
        stop_on_exit(&self.manager);
    }

    fn exit_action(&self) -> ExitAction {
        let manager = Arc::clone(&self.manager);
        let registration = Arc::clone(&self.registration);
        Arc::new(move || {
            registration.lock().installed = false;
            stop_on_exit(&manager);
        })
    }

    /// Bring the hook in line with the registration count. Called with the
    /// registration lock held.
    fn sync_hook(&self, registration: &mut Registration) -> Result<()> {
        if registration.count > 0 && !registration.installed {
            self.hook.install(self.exit_action())?;
            registration.installed = true;
            info!(
                "Installed exit hook for {} registered components",
                registration.count
            );
        } else if registration.count == 0 && registration.installed {
            self.hook.uninstall()?;
            registration.installed = false;
            info!("Removed exit hook, no components registered");
        } else {
            debug!(
                "Exit hook unchanged ({} registered, installed: {})",
                registration.count, registration.installed
            );
        }
        Ok(())
    }
}

fn stop_on_exit(manager: &LifecycleManager) {
    info!("Stopping {} components on exit", manager.len());
    // Exit hooks must not fail; the batch error has already been logged in detail
    if let Err(e) = manager.stop() {
        error!("Shutdown incomplete: {}", e);
    }
}

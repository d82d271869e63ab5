use crate::config::HeartbeatConfig;
use crate::lifecycle::{LifecycleHooks, LifecycleStateMachine};
use crossbeam::channel::{self, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info};

/// Supervised heartbeat, as registered by the daemon
pub type HeartbeatComponent = LifecycleStateMachine<Heartbeat>;

struct Worker {
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
}

/// Background worker that logs a heartbeat at a fixed interval
pub struct Heartbeat {
    name: String,
    interval: Duration,
    beats: Arc<AtomicU64>,
    worker: Mutex<Option<Worker>>,
}

impl Heartbeat {
    pub fn new<S: Into<String>>(name: S, interval: Duration) -> Self {
        Self {
            name: name.into(),
            interval,
            beats: Arc::new(AtomicU64::new(0)),
            worker: Mutex::new(None),
        }
    }

    pub fn from_config(config: &HeartbeatConfig) -> Self {
        Self::new(config.name.clone(), Duration::from_millis(config.interval_ms))
    }

    /// Wrap in a state machine ready to be registered
    pub fn into_component(self) -> Arc<HeartbeatComponent> {
        Arc::new(LifecycleStateMachine::new(self))
    }

    /// Heartbeats emitted since creation
    pub fn beats(&self) -> u64 {
        self.beats.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some()
    }

    fn join_worker(&self) -> anyhow::Result<()> {
        let Some(worker) = self.worker.lock().take() else {
            return Ok(());
        };

        // The worker may already be gone; a closed channel stops it as well
        let _ = worker.stop_tx.send(());
        worker
            .handle
            .join()
            .map_err(|_| anyhow::anyhow!("heartbeat '{}' worker panicked", self.name))
    }
}

impl LifecycleHooks for Heartbeat {
    const RESETTABLE: bool = true;

    fn name(&self) -> &str {
        &self.name
    }

    fn do_start(&self) -> anyhow::Result<()> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            anyhow::bail!("heartbeat '{}' worker already running", self.name);
        }

        let (stop_tx, stop_rx) = channel::bounded::<()>(1);
        let name = self.name.clone();
        let interval = self.interval;
        let beats = Arc::clone(&self.beats);

        let handle = thread::Builder::new()
            .name(format!("heartbeat-{}", self.name))
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        let count = beats.fetch_add(1, Ordering::Relaxed) + 1;
                        info!("Heartbeat '{}' #{}", name, count);
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                        debug!("Heartbeat '{}' worker exiting", name);
                        break;
                    }
                }
            })?;

        *worker = Some(Worker { stop_tx, handle });
        Ok(())
    }

    fn do_stop(&self) -> anyhow::Result<()> {
        self.join_worker()
    }

    fn do_reset(&self) -> anyhow::Result<()> {
        // Tear down anything a failed transition left behind
        self.join_worker()
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.get_mut().take() {
            let _ = worker.stop_tx.send(());
        }
    }
}

use crate::config::ShutdownConfig;
use crate::error::{Result, SupervisorError};
use crossbeam::channel;
use parking_lot::Mutex;
use std::fmt;
use std::io;
use std::sync::Arc;
use std::thread;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Callback run once when the process is asked to terminate
pub type ExitAction = Arc<dyn Fn() + Send + Sync>;

/// Registration of a process-exit callback with the host process.
pub trait ExitHook: Send + Sync {
    fn install(&self, action: ExitAction) -> Result<()>;

    fn uninstall(&self) -> Result<()>;
}

/// Termination request received from the operating system
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationSignal {
    Interrupt,
    Terminate,
}

impl TerminationSignal {
    /// Exit status a shell reports for a process killed by this signal
    pub fn default_exit_code(&self) -> i32 {
        match self {
            Self::Interrupt => 130,
            Self::Terminate => 143,
        }
    }
}

impl fmt::Display for TerminationSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interrupt => write!(f, "SIGINT"),
            Self::Terminate => write!(f, "SIGTERM"),
        }
    }
}

#[cfg(unix)]
struct TerminationSignals {
    terminate: tokio::signal::unix::Signal,
    interrupt: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl TerminationSignals {
    fn register() -> io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            terminate: signal(SignalKind::terminate())?,
            interrupt: signal(SignalKind::interrupt())?,
        })
    }

    async fn recv(&mut self) -> TerminationSignal {
        tokio::select! {
            _ = self.terminate.recv() => TerminationSignal::Terminate,
            _ = self.interrupt.recv() => TerminationSignal::Interrupt,
        }
    }
}

#[cfg(not(unix))]
struct TerminationSignals;

#[cfg(not(unix))]
impl TerminationSignals {
    fn register() -> io::Result<Self> {
        Ok(Self)
    }

    async fn recv(&mut self) -> TerminationSignal {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
        TerminationSignal::Interrupt
    }
}

/// Ends the process with the given status once a termination signal has
/// been handled
pub type ProcessExit = Arc<dyn Fn(i32) + Send + Sync>;

/// Exit hook bound to SIGINT and SIGTERM.
///
/// The first `install` starts a listener thread with its own single-threaded
/// tokio runtime. The OS handlers cannot be handed back once registered, so
/// the listener stays up for the life of the hook and `uninstall` only disarms
/// the action. A signal that arrives while disarmed always ends the process
/// with the conventional `128 + signo` status, as the default handler would,
/// whatever `exit_process` says.
///
/// Ending the process goes through [`ProcessExit`], `std::process::exit` by
/// default. Binaries that hold buffered writers can hand the status to their
/// main thread instead and exit there once everything is flushed.
pub struct SignalExitHook {
    config: ShutdownConfig,
    action: Arc<Mutex<Option<ExitAction>>>,
    process_exit: ProcessExit,
    listener: Mutex<Option<CancellationToken>>,
}

impl SignalExitHook {
    pub fn new(config: ShutdownConfig) -> Self {
        Self {
            config,
            action: Arc::new(Mutex::new(None)),
            process_exit: Arc::new(|code| std::process::exit(code)),
            listener: Mutex::new(None),
        }
    }

    /// Replace the default `std::process::exit` call
    pub fn with_process_exit(mut self, process_exit: ProcessExit) -> Self {
        self.process_exit = process_exit;
        self
    }

    pub fn is_armed(&self) -> bool {
        self.action.lock().is_some()
    }

    fn ensure_listener(&self) -> Result<()> {
        let mut listener = self.listener.lock();
        if listener.is_some() {
            return Ok(());
        }

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let token = CancellationToken::new();
        let (ready_tx, ready_rx) = channel::bounded::<io::Result<()>>(1);

        let thread_token = token.clone();
        let handler = SignalHandler {
            action: Arc::clone(&self.action),
            process_exit: Arc::clone(&self.process_exit),
            config: self.config.clone(),
        };
        thread::Builder::new()
            .name("exit-hook".to_string())
            .spawn(move || {
                runtime.block_on(async move {
                    let mut signals = match TerminationSignals::register() {
                        Ok(signals) => {
                            let _ = ready_tx.send(Ok(()));
                            signals
                        }
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                            return;
                        }
                    };

                    loop {
                        tokio::select! {
                            biased;
                            _ = thread_token.cancelled() => break,
                            signal = signals.recv() => handler.handle(signal),
                        }
                    }
                    debug!("Exit hook listener stopped");
                });
            })?;

        // Handlers must be in place before install returns, or an early
        // signal would still take the default path
        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                return Err(SupervisorError::exit_hook(
                    "signal listener exited before registering handlers",
                ))
            }
        }

        debug!("Exit hook listener registered for SIGINT and SIGTERM");
        *listener = Some(token);
        Ok(())
    }
}

struct SignalHandler {
    action: Arc<Mutex<Option<ExitAction>>>,
    process_exit: ProcessExit,
    config: ShutdownConfig,
}

impl SignalHandler {
    fn handle(&self, signal: TerminationSignal) {
        // Take the action so it runs at most once
        let armed = self.action.lock().take();
        match armed {
            Some(action) => {
                info!("Received {}, running exit hook", signal);
                action();
                if self.config.exit_process {
                    info!("Exit hook finished, exiting with code {}", self.config.exit_code);
                    (self.process_exit)(self.config.exit_code);
                } else {
                    info!("Exit hook finished, process keeps running");
                }
            }
            None => {
                let code = signal.default_exit_code();
                info!("Received {} with no exit hook installed, exiting with code {}", signal, code);
                (self.process_exit)(code);
            }
        }
    }
}

impl ExitHook for SignalExitHook {
    fn install(&self, action: ExitAction) -> Result<()> {
        if let Err(e) = self.ensure_listener() {
            error!("Failed to register signal handlers: {}", e);
            return Err(e);
        }
        *self.action.lock() = Some(action);
        Ok(())
    }

    fn uninstall(&self) -> Result<()> {
        self.action.lock().take();
        Ok(())
    }
}

impl Drop for SignalExitHook {
    fn drop(&mut self) {
        if let Some(token) = self.listener.lock().take() {
            token.cancel();
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    // Signals reach every live listener in the process, so tests that
    // install a hook run one at a time
    static SIGNALS: Mutex<()> = parking_lot::const_mutex(());

    fn recording_hook(exit_process: bool) -> (SignalExitHook, channel::Receiver<i32>) {
        let (tx, rx) = channel::unbounded();
        let hook = SignalExitHook::new(ShutdownConfig {
            exit_process,
            exit_code: 7,
        })
        .with_process_exit(Arc::new(move |code| {
            let _ = tx.send(code);
        }));
        (hook, rx)
    }

    fn raise_sigterm() {
        unsafe {
            libc::kill(libc::getpid(), libc::SIGTERM);
        }
    }

    #[test]
    fn test_default_exit_codes() {
        assert_eq!(TerminationSignal::Interrupt.default_exit_code(), 130);
        assert_eq!(TerminationSignal::Terminate.default_exit_code(), 143);
        assert_eq!(TerminationSignal::Terminate.to_string(), "SIGTERM");
    }

    #[test]
    fn test_install_and_uninstall_toggle_arming() {
        let _signals = SIGNALS.lock();
        let (hook, _exits) = recording_hook(false);
        assert!(!hook.is_armed());

        hook.install(Arc::new(|| {})).unwrap();
        assert!(hook.is_armed());

        hook.uninstall().unwrap();
        assert!(!hook.is_armed());

        // Reinstalling reuses the listener
        hook.install(Arc::new(|| {})).unwrap();
        assert!(hook.is_armed());
    }

    #[test]
    fn test_signal_runs_action_then_exits_with_configured_code() {
        let _signals = SIGNALS.lock();
        let (hook, exits) = recording_hook(true);
        let (tx, rx) = channel::unbounded();
        hook.install(Arc::new(move || {
            let _ = tx.send(());
        }))
        .unwrap();

        raise_sigterm();

        rx.recv_timeout(Duration::from_secs(5))
            .expect("exit action should run");
        assert_eq!(exits.recv_timeout(Duration::from_secs(5)), Ok(7));
        assert!(!hook.is_armed());
    }

    #[test]
    fn test_disarmed_signal_exits_with_default_code() {
        let _signals = SIGNALS.lock();
        let (hook, exits) = recording_hook(false);
        let (tx, rx) = channel::unbounded();
        hook.install(Arc::new(move || {
            let _ = tx.send(());
        }))
        .unwrap();
        hook.uninstall().unwrap();

        raise_sigterm();

        assert_eq!(exits.recv_timeout(Duration::from_secs(5)), Ok(143));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_signal_after_action_ran_exits_even_without_exit_process() {
        let _signals = SIGNALS.lock();
        let (hook, exits) = recording_hook(false);
        let (tx, rx) = channel::unbounded();
        hook.install(Arc::new(move || {
            let _ = tx.send(());
        }))
        .unwrap();

        raise_sigterm();
        rx.recv_timeout(Duration::from_secs(5))
            .expect("exit action should run");

        // The first signal ran the action and kept the process alive; the
        // second one finds the hook disarmed
        raise_sigterm();
        assert_eq!(exits.recv_timeout(Duration::from_secs(5)), Ok(143));
        assert!(rx.try_recv().is_err());
    }
}

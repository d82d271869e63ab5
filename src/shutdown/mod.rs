//! Process-exit supervision.
//!
//! ```text
//! add (0 -> 1)  -> ExitHook::install(stop all)
//! remove (-> 0) -> ExitHook::uninstall()
//! SIGINT/SIGTERM -> LifecycleManager::stop() in reverse order -> exit
//! ```
//!
//! Only SIGINT and SIGTERM run the exit hook. Returning from `main` or calling
//! `std::process::exit` elsewhere ends the process without stopping anything;
//! call `ShutdownCoordinator::run_exit_action` first on those paths.

mod coordinator;
mod hook;


pub use coordinator::ShutdownCoordinator;
pub use hook::{ExitAction, ExitHook, ProcessExit, SignalExitHook, TerminationSignal};

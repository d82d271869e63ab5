use anyhow::Result;
use clap::Parser;
use crossbeam::channel;
use lifecycle_supervisor::{
    Heartbeat, Lifecycle, LifecycleManager, ShutdownCoordinator, SignalExitHook, SupervisorConfig,
};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Parser, Debug)]
#[command(name = "lifecycle-supervisor")]
#[command(about = "Supervise component lifecycles and stop them cleanly on termination")]
#[command(version)]
#[command(long_about = "Starts the heartbeat components described in the configuration file \
in order, and on SIGINT or SIGTERM stops them in reverse order through a process exit hook \
before exiting.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "supervisor.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Also write logs to this file
    #[arg(long, value_name = "PATH", help = "Write logs to a file in addition to stderr")]
    log_file: Option<String>,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without starting components")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Dry run mode - build components but don't start them
    #[arg(long, help = "Perform dry run - register components but don't start them")]
    dry_run: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    let config = SupervisorConfig::load_from_file(&args.config)?;

    // Dropped right before the process exits so buffered file logs are flushed
    let log_guard = init_logging(&args, &config)?;

    info!("Starting lifecycle supervisor v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        eprintln!("✗ Configuration validation failed: {}", e);
        drop(log_guard);
        std::process::exit(1);
    }

    if args.validate_config {
        info!("Configuration validation successful");
        println!("✓ Configuration is valid");
        return Ok(());
    }

    let components = Arc::new(LifecycleManager::new());
    for heartbeat in &config.heartbeat {
        components.add(Heartbeat::from_config(heartbeat).into_component());
    }

    if components.is_empty() {
        warn!("No [[heartbeat]] components configured");
    }

    if args.dry_run {
        info!("Dry run mode - {} components registered but not started", components.len());
        println!("✓ Dry run completed successfully - {} components registered", components.len());
        return Ok(());
    }

    if let Err(e) = components.start() {
        error!("Failed to start components: {}", e);
        components.stop_quietly();
        return Err(e.into());
    }

    if !config.shutdown.exit_process {
        warn!("shutdown.exit_process is disabled; the first signal only stops components");
    }

    // The signal thread hands the exit status over instead of exiting itself
    let (exit_tx, exit_rx) = channel::unbounded::<i32>();
    let hook = SignalExitHook::new(config.shutdown.clone()).with_process_exit(Arc::new(
        move |code| {
            let _ = exit_tx.send(code);
        },
    ));

    let coordinator = ShutdownCoordinator::new(hook);
    if let Err(e) = coordinator.add(Arc::clone(&components) as Arc<dyn Lifecycle>) {
        error!("Failed to install exit hook: {}", e);
        components.stop_quietly();
        return Err(e.into());
    }

    info!("Supervisor running with {} components, waiting for SIGINT/SIGTERM", components.len());

    let exit_code = exit_rx.recv()?;
    info!("Supervisor exiting with code {}", exit_code);

    drop(coordinator);
    drop(log_guard);
    std::process::exit(exit_code);
}

fn init_logging(args: &Args, config: &SupervisorConfig) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    // Command line flags win over the configured level
    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        config.logging.level.as_str()
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("lifecycle_supervisor={}", log_level)));

    let format = args
        .log_format
        .as_deref()
        .unwrap_or(config.logging.format.as_str());

    let fmt_layer = match format {
        "json" => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        "compact" => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_names(false)
            .boxed(),
        "pretty" => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_names(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        other => {
            eprintln!("Warning: Unknown log format '{}', using default", other);
            fmt::layer().with_target(true).boxed()
        }
    };

    let log_file = args.log_file.as_deref().or(config.logging.file.as_deref());
    let (file_layer, guard) = match log_file {
        Some(path) => {
            let path = Path::new(path);
            let directory = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let file_name = path
                .file_name()
                .ok_or_else(|| anyhow::anyhow!("Log file path '{}' has no file name", path.display()))?;

            let appender = tracing_appender::rolling::never(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer).boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(file_layer)
        .with(env_filter)
        .init();

    Ok(guard)
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# Lifecycle supervisor configuration file");
    println!("# Add one [[heartbeat]] table per supervised heartbeat, e.g.");
    println!("#");
    println!("# [[heartbeat]]");
    println!("# name = \"pulse\"");
    println!("# interval_ms = 1000");
    println!();
    println!("{}", SupervisorConfig::default().to_toml()?);
    Ok(())
}

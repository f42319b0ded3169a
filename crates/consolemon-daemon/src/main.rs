//! consolemon-daemon: runs a poll cycle every few minutes until stopped.

mod scheduler;

use clap::Parser;
use consolemon_core::{Config, ExternalTools, Overrides, PollEngine, RegistryStore};
use scheduler::Scheduler;
use std::future::Future;
use std::path::Path;
use tracing::{error, info, warn};

/// consolemon-daemon: periodic console session polling
#[derive(Parser, Debug)]
#[command(name = "consolemon-daemon", version, about = "Periodically poll console sessions and flag hung ones")]
struct Cli {
    /// Config file path
    #[arg(long, default_value = "~/.consolemon/config.toml")]
    config: String,

    /// Directory holding consoles.json (overrides the config file)
    #[arg(long)]
    state_dir: Option<String>,

    /// Minutes between the end of one cycle and the start of the next
    #[arg(long)]
    interval_minutes: Option<u64>,

    /// Minutes without change before a session counts as hanging
    #[arg(long, env = "HANG_MINUTES")]
    hang_minutes: Option<f64>,

    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    use tracing_subscriber::EnvFilter;
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    let overrides = Overrides {
        state_dir: cli.state_dir.clone(),
        hang_minutes: cli.hang_minutes,
        interval_minutes: cli.interval_minutes,
    };
    let config = match Config::resolve(Some(Path::new(&cli.config)), &overrides) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "failed to load config");
            std::process::exit(1);
        }
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        state_dir = %config.state_dir().display(),
        hang_minutes = config.monitor.hang_minutes,
        interval_minutes = config.monitor.interval_minutes,
        once = cli.once,
        "starting consolemon-daemon"
    );

    let shutdown = shutdown_signal();

    let tools = ExternalTools::new(&config.tools, config.state_dir());
    let engine = PollEngine::new(
        &tools,
        &tools,
        RegistryStore::from_config(&config),
        config.hang_threshold(),
    );
    let scheduler = Scheduler::new(engine, config.interval());

    let stats = scheduler.run(cli.once, shutdown).await;
    info!(cycles = stats.cycles, failures = stats.failures, "consolemon-daemon stopped");

    if cli.once && stats.failures > 0 {
        std::process::exit(1);
    }
}

/// Install the SIGINT (Ctrl+C) and SIGTERM handlers now and return a future
/// that resolves on the first signal. A signal arriving before the future is
/// polled, e.g. during the first cycle, is still observed.
#[cfg(unix)]
fn shutdown_signal() -> impl Future<Output = ()> {
    use tokio::signal::unix::{signal, SignalKind};

    let interrupt = signal(SignalKind::interrupt());
    let terminate = signal(SignalKind::terminate());
    async move {
        match (interrupt, terminate) {
            (Ok(mut interrupt), Ok(mut terminate)) => {
                tokio::select! {
                    _ = interrupt.recv() => {}
                    _ = terminate.recv() => {}
                }
            }
            (Ok(mut interrupt), Err(e)) => {
                warn!(error = %e, "failed to install SIGTERM handler, only Ctrl+C will stop the daemon");
                interrupt.recv().await;
            }
            (Err(e), _) => {
                warn!(error = %e, "failed to install signal handlers, waiting for Ctrl+C");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(windows)]
fn shutdown_signal() -> impl Future<Output = ()> {
    let ctrl_c = tokio::signal::windows::ctrl_c();
    async move {
        match ctrl_c {
            Ok(mut ctrl_c) => {
                ctrl_c.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(not(any(unix, windows)))]
fn shutdown_signal() -> impl Future<Output = ()> {
    async {
        tokio::signal::ctrl_c().await.ok();
    }
}

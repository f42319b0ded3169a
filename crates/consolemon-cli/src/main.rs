//! consolemon: operator CLI for the console session monitor.
//!
//! Runs a poll cycle on demand, types into a session (optionally guarded by
//! the fingerprint the operator last saw), acknowledges or ignores sessions
//! and reads the registry. Every command prints one JSON object: to stdout
//! on success, to stderr on failure.

mod commands;
mod output;

use clap::{ArgMatches, CommandFactory, FromArgMatches, Parser, Subcommand};
use consolemon_core::{Config, Fingerprint, Overrides, SessionId};
use std::path::{Path, PathBuf};
use tracing::error;

/// consolemon: watch console sessions and flag the hung ones
#[derive(Parser)]
#[command(name = "consolemon", version, about = "Watch console sessions and flag the ones that stopped changing")]
struct Cli {
    /// Config file path
    #[arg(long = "config", global = true)]
    config: Option<String>,

    /// Directory holding consoles.json (overrides the config file)
    #[arg(long = "state-dir", global = true)]
    state_dir: Option<String>,

    /// Minutes without change before a session counts as hanging
    #[arg(long = "hang-minutes", global = true, env = "HANG_MINUTES")]
    hang_minutes: Option<f64>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one poll cycle now
    Refresh,

    /// Type into a session: --text and --keys are delivered in the order given
    Poke {
        /// Session process id
        pid: SessionId,

        /// Only act if the session content still has this fingerprint
        #[arg(long)]
        hash: Option<Fingerprint>,

        /// Literal text to type (repeatable)
        #[arg(long)]
        text: Vec<String>,

        /// Key to press, e.g. {ENTER}, esc, ctrl+c (repeatable)
        #[arg(long)]
        keys: Vec<String>,
    },

    /// Acknowledge a session so it stops being reported as hanging
    Handle {
        /// Session process id
        pid: SessionId,
    },

    /// Print or export the sessions with the given statuses
    Read {
        /// Status to select (repeatable)
        #[arg(long = "status", required = true)]
        status: Vec<String>,

        /// Write one <status>.json file per status into this directory
        #[arg(long = "out-dir")]
        out_dir: Option<PathBuf>,
    },

    /// Show the registry as a table
    List,

    /// Stop watching a session until it is unignored
    Ignore {
        /// Session process id
        pid: SessionId,
    },

    /// Resume watching a session; its hang clock restarts now
    Unignore {
        /// Session process id
        pid: SessionId,
    },
}

#[tokio::main]
async fn main() {
    let matches = Cli::command().get_matches();
    let cli = match Cli::from_arg_matches(&matches) {
        Ok(cli) => cli,
        Err(e) => e.exit(),
    };

    // Logs go to stderr so stdout stays a single JSON document.
    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("consolemon=debug,consolemon_cli=debug,consolemon_core=debug")
            .with_writer(std::io::stderr)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter("consolemon=warn,consolemon_cli=warn,consolemon_core=warn")
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    }

    if let Err(e) = run(cli, &matches).await {
        error!("{e:#}");
        std::process::exit(output::report_error(&e));
    }
}

async fn run(cli: Cli, matches: &ArgMatches) -> anyhow::Result<()> {
    let overrides = Overrides {
        state_dir: cli.state_dir,
        hang_minutes: cli.hang_minutes,
        interval_minutes: None,
    };
    let config = Config::resolve(cli.config.as_deref().map(Path::new), &overrides)?;

    match cli.command {
        Command::Refresh => commands::refresh::run(&config).await,
        Command::Poke { pid, hash, .. } => {
            let actions = match matches.subcommand_matches("poke") {
                Some(sub) => commands::poke::ordered_actions(sub)?,
                None => Vec::new(),
            };
            commands::poke::run(&config, pid, actions, hash).await
        }
        Command::Handle { pid } => commands::status::run_handle(&config, pid).await,
        Command::Read { status, out_dir } => {
            commands::read::run(&config, &status, out_dir.as_deref()).await
        }
        Command::List => commands::list::run(&config).await,
        Command::Ignore { pid } => commands::status::run_ignore(&config, pid).await,
        Command::Unignore { pid } => commands::status::run_unignore(&config, pid).await,
    }
}

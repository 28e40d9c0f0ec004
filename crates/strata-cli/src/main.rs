mod commands;
mod init;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use strata_common::Direction;
use strata_config::{ConfigLoader, LogConfig, LogFormat};
use strata_migrate::Target;
use tracing_subscriber::EnvFilter;

/// Revision-chained schema migrations for SQLite.
#[derive(Parser, Debug)]
#[command(name = "strata", version, about)]
struct Cli {
    /// Config file (default: strata.yml, strata.yaml or strata.toml in the working directory)
    #[arg(short, long, global = true, env = "STRATA_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a starter config and create the versions directory
    Init {
        /// Directory to initialize
        #[arg(default_value = ".")]
        dir: PathBuf,
    },
    /// Create a new revision on top of the current head
    Revision {
        #[arg(short, long)]
        message: String,
        /// Identifier to use instead of a generated one
        #[arg(long)]
        id: Option<String>,
    },
    /// Upgrade to a later revision
    Upgrade {
        /// `head`, a revision id or `+N`
        #[arg(default_value = "head", allow_hyphen_values = true)]
        target: Target,
        /// Print the SQL instead of running it
        #[arg(long)]
        sql: bool,
    },
    /// Downgrade to an earlier revision
    Downgrade {
        /// `base`, a revision id or `-N`
        #[arg(allow_hyphen_values = true)]
        target: Target,
        #[arg(long)]
        sql: bool,
    },
    /// Show the revision the database is at
    Current {
        #[arg(short, long)]
        verbose: bool,
    },
    /// List revisions, newest first
    History {
        #[arg(short, long)]
        verbose: bool,
    },
    /// List head revisions
    Heads,
    /// Show one revision's descriptor
    Show { revision: String },
    /// Set the database's revision without running any migration
    Stamp {
        #[arg(allow_hyphen_values = true)]
        target: Target,
    },
    /// Show recently applied steps
    Journal {
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,
    },
    /// Clear a run lock left behind by an interrupted process
    Unlock,
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            if failed_before_store(&e) {
                eprintln!("The database was not touched.");
            }
            ExitCode::FAILURE
        }
    }
}

fn failed_before_store(err: &anyhow::Error) -> bool {
    err.chain()
        .filter_map(|cause| cause.downcast_ref::<strata_common::Error>())
        .any(|e| e.is_planning())
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let command = match cli.command {
        Command::Init { dir } => {
            init_tracing(&LogConfig::default());
            init::run(&dir)?;
            return Ok(ExitCode::SUCCESS);
        }
        other => other,
    };

    let cwd = std::env::current_dir().context("failed to read working directory")?;
    let config = ConfigLoader::new(cwd)
        .load(cli.config.as_deref())
        .context("failed to load configuration")?;
    init_tracing(&config.log);

    match command {
        Command::Init { .. } => {}
        Command::Revision { message, id } => commands::revision(&config, &message, id)?,
        Command::Upgrade { target, sql } => {
            return commands::migrate(&config, Direction::Upgrade, target, sql).await;
        }
        Command::Downgrade { target, sql } => {
            return commands::migrate(&config, Direction::Downgrade, target, sql).await;
        }
        Command::Current { verbose } => commands::current(&config, verbose)?,
        Command::History { verbose } => commands::history(&config, verbose)?,
        Command::Heads => commands::heads(&config)?,
        Command::Show { revision } => commands::show(&config, &revision)?,
        Command::Stamp { target } => commands::stamp(&config, &target)?,
        Command::Journal { limit } => commands::journal(&config, limit)?,
        Command::Unlock => commands::unlock(&config)?,
    }
    Ok(ExitCode::SUCCESS)
}

/// `RUST_LOG` wins over the configured level. Logs go to stderr so that
/// `--sql` output stays clean.
fn init_tracing(log: &LogConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    match log.format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

//! blockgridd — the blockgrid daemon.
//!
//! Wires the state store, service registry, host manager, and placement
//! engine together:
//! - Registers volume services in the state store (redb)
//! - Replays a batch of capability deliveries into a fresh host manager
//! - Runs one placement and prints the ranked candidates as JSON
//! - Lists pools with operator-style narrowing
//!
//! # Usage
//!
//! ```text
//! blockgridd register --db /var/lib/blockgrid/state.redb --services services.json
//! blockgridd place --db /var/lib/blockgrid/state.redb --reports reports.json --request request.json
//! ```

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;

use blockgrid_core::SchedulerConfig;

#[derive(Parser)]
#[command(name = "blockgridd", about = "blockgrid volume scheduler daemon")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Upsert service records into the state store.
    Register {
        /// State store path.
        #[arg(long)]
        db: PathBuf,

        /// JSON array of service records.
        #[arg(long)]
        services: PathBuf,
    },

    /// Feed capability reports into the scheduler and place one request.
    Place {
        /// Scheduler configuration (TOML). Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// State store path.
        #[arg(long)]
        db: PathBuf,

        /// JSON array of capability deliveries.
        #[arg(long)]
        reports: PathBuf,

        /// JSON filter properties of the request.
        #[arg(long)]
        request: PathBuf,
    },

    /// List schedulable pools.
    Pools {
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long)]
        db: PathBuf,

        #[arg(long)]
        reports: PathBuf,

        /// Pool id (`host@backend#pool`) or backend id.
        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        multiattach: Option<bool>,
    },
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new("info,blockgridd=debug,blockgrid=debug")
    });
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<SchedulerConfig> {
    match path {
        Some(path) => {
            let config = SchedulerConfig::from_file(path)?;
            info!(path = ?path, "configuration loaded");
            Ok(config)
        }
        None => Ok(SchedulerConfig::default()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json);

    let output = match cli.command {
        Command::Register { db, services } => {
            let count = commands::register(&db, &services)?;
            serde_json::json!({ "registered": count })
        }
        Command::Place {
            config,
            db,
            reports,
            request,
        } => {
            let config = load_config(config.as_ref())?;
            let outcome = commands::place(&config, &db, &reports, &request).await?;
            serde_json::to_value(outcome)?
        }
        Command::Pools {
            config,
            db,
            reports,
            name,
            multiattach,
        } => {
            let config = load_config(config.as_ref())?;
            let pools = commands::pools(&config, &db, &reports, name, multiattach).await?;
            serde_json::to_value(pools)?
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

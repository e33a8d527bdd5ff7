use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use tg_bulkinvite::config;
use tg_bulkinvite::db::{self, SqliteLedgerStore};
use tg_bulkinvite::model::{RecipientStatus, RunSnapshot, RunState};
use tg_bulkinvite::platform::GatewayClient;
use tg_bulkinvite::Orchestrator;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Collect, filter and invite according to the `run` section
    Run {
        /// Compute the eligible list, then invite without live progress output
        #[arg(long)]
        background: bool,
    },
    /// Print an example configuration file
    ExampleConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let background = match args.command {
        Command::ExampleConfig => {
            print!("{}", config::example());
            return Ok(());
        }
        Command::Run { background } => background,
    };

    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let pool = db::init_pool(&cfg.app.database_url()).await?;
    db::run_migrations(&pool).await?;

    let platform = Arc::new(GatewayClient::from_config(&cfg.gateway)?);
    let store = Arc::new(SqliteLedgerStore::new(pool));
    let orchestrator = Orchestrator::new(platform, store);

    let token = orchestrator.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; stopping after the current recipient");
            token.cancel();
        }
    });

    let handle = if background {
        let handle = orchestrator.start_background(cfg.run.clone()).await;
        let plan = handle.status();
        for row in &plan.recipients {
            match &row.status {
                RecipientStatus::Pending => {
                    println!("queued  {:>12}  {}", row.recipient.id, row.recipient.label())
                }
                RecipientStatus::Skipped(reason) => println!(
                    "skipped {:>12}  {} ({})",
                    row.recipient.id,
                    row.recipient.label(),
                    reason.as_str()
                ),
                _ => {}
            }
        }
        info!(run_id = %handle.id(), queued = plan.counts().pending, "background invite started");
        handle
    } else {
        let handle = orchestrator.start(cfg.run.clone());
        info!(run_id = %handle.id(), "invite run started");
        handle
    };

    if !background {
        let mut rx = handle.subscribe();
        let mut printed = 0usize;
        while rx.changed().await.is_ok() {
            let snap = rx.borrow_and_update().clone();
            printed = print_progress(&snap, printed);
            if snap.state.is_terminal() {
                break;
            }
        }
    }

    let report = handle.wait().await;
    let c = report.counts();
    println!(
        "{}: total={} invited={} skipped={} failed={} pending={}",
        report.state.as_str(),
        c.total,
        c.invited,
        c.skipped,
        c.failed,
        c.pending
    );
    if let RunState::Errored(reason) = report.state {
        bail!("run failed: {}", reason);
    }
    Ok(())
}

/// Print rows that reached a terminal status since the last call; returns the
/// new count of printed dispatch results.
fn print_progress(snap: &RunSnapshot, printed: usize) -> usize {
    let done: Vec<_> = snap
        .recipients
        .iter()
        .filter(|r| matches!(r.status, RecipientStatus::Invited | RecipientStatus::Failed(_)))
        .collect();
    for row in done.iter().skip(printed) {
        let detail = match &row.status {
            RecipientStatus::Failed(code) => format!(" ({})", code),
            _ => String::new(),
        };
        println!(
            "{:<8} {:>12}  {}{}",
            row.status.as_str(),
            row.recipient.id,
            row.recipient.label(),
            detail
        );
    }
    done.len().max(printed)
}

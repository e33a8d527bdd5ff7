use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use tg_bulkinvite::community::CommunityRef;
use tg_bulkinvite::config;
use tg_bulkinvite::db;

#[derive(Debug, Parser)]
#[command(author, version, about = "Inspect or clear the invited ledger")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show entry counts per destination, or the entries of one destination
    List {
        #[arg(long)]
        destination: Option<String>,
    },
    /// Forget processed recipients so later runs may invite them again
    Clear {
        /// Only clear this destination
        #[arg(long)]
        destination: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let pool = db::init_pool(&cfg.app.database_url()).await?;
    db::run_migrations(&pool).await?;

    match args.command {
        Command::List { destination: None } => {
            for s in db::ledger_summary(&pool).await? {
                let newest = s
                    .newest
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "-".into());
                println!("{:<40} {:>5}  newest {}", s.destination, s.entries, newest);
            }
        }
        Command::List {
            destination: Some(raw),
        } => {
            let dest = CommunityRef::parse(&raw)?;
            for e in db::load_ledger(&pool, &dest.key()).await? {
                println!(
                    "{}  {:>12}  {}",
                    e.invited_at.to_rfc3339(),
                    e.recipient_id,
                    e.display_name.as_deref().unwrap_or("")
                );
            }
        }
        Command::Clear { destination } => {
            let key = destination
                .as_deref()
                .map(CommunityRef::parse)
                .transpose()?
                .map(|d| d.key());
            let removed = db::clear_ledger(&pool, key.as_deref()).await?;
            info!(removed, destination = key.as_deref().unwrap_or("*"), "ledger cleared");
            println!("removed {} entries", removed);
        }
    }
    Ok(())
}

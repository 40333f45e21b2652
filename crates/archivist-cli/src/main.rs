mod synthetic;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use archivist_core::app::{Archivist, ArchivistBuilder, RefreshTarget, scheduler};
use archivist_core::ports::LaneQueue;
use archivist_core::ArchivistConfig;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::synthetic::SyntheticForum;

/// How long `refresh` waits for the crawl it triggered to settle.
const REFRESH_DRAIN_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Parser)]
#[command(name = "archivist", about = "Incremental crawl scheduler for a forum archive")]
struct Args {
    /// TOML configuration file. Built-in defaults when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Human-readable TRACE logs instead of JSON lines.
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run workers and the recurring schedule until Ctrl-C.
    Run {
        /// Stop after this many seconds.
        #[arg(long)]
        for_secs: Option<u64>,
    },

    /// Print the effective recurring schedule as JSON lines.
    Schedule,

    /// Enqueue a refresh (discuss:<id>, article:<lid>, paste:<id>, judgement)
    /// and run workers until it settles.
    Refresh { target: String },
}

fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    }
}

async fn load_config(path: Option<&PathBuf>) -> Result<ArchivistConfig> {
    match path {
        Some(path) => ArchivistConfig::load(path)
            .await
            .with_context(|| format!("loading {}", path.display())),
        None => Ok(ArchivistConfig::default()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.debug);

    let config = load_config(args.config.as_ref()).await?;

    match args.command {
        Command::Schedule => print_schedule(&config),
        Command::Run { for_secs } => run(config, for_secs).await,
        Command::Refresh { target } => refresh(config, &target).await,
    }
}

fn build(config: ArchivistConfig) -> Result<Archivist> {
    let crawler = Arc::new(SyntheticForum::new(config.retry_policy()));
    ArchivistBuilder::new(config)
        .crawler(crawler)
        .build()
        .context("wiring archivist")
}

fn print_schedule(config: &ArchivistConfig) -> Result<()> {
    let schedule = config.schedule();
    scheduler::validate(&schedule).context("validating schedule")?;
    for entry in &schedule.entries {
        println!("{}", serde_json::to_string(entry)?);
    }
    Ok(())
}

async fn run(config: ArchivistConfig, for_secs: Option<u64>) -> Result<()> {
    let archivist = build(config)?;
    let workers = archivist.start_workers();
    let schedule = archivist
        .start_schedule()
        .await
        .context("starting recurring schedule")?;

    match for_secs {
        Some(secs) => {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(secs)) => info!(secs, "run window elapsed"),
                _ = tokio::signal::ctrl_c() => info!("interrupted"),
            }
        }
        None => {
            tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
            info!("interrupted");
        }
    }

    // seed を止めてからワーカーを止める
    schedule.shutdown().await.context("stopping recurring schedule")?;
    workers.shutdown_and_join().await;

    let counts = archivist.queue.counts().await?;
    println!("{}", serde_json::to_string_pretty(&counts)?);
    Ok(())
}

async fn refresh(config: ArchivistConfig, raw_target: &str) -> Result<()> {
    let target: RefreshTarget = raw_target.parse()?;
    let archivist = build(config)?;
    let poll_interval = archivist.budget.poll_interval;

    let admission = archivist.trigger.refresh(&target).await?;
    println!("{}", serde_json::to_string(&admission)?);

    let workers = archivist.start_workers();
    let drained = tokio::time::timeout(REFRESH_DRAIN_TIMEOUT, async {
        loop {
            tokio::time::sleep(poll_interval).await;
            match archivist.queue.counts().await {
                Ok(counts) if counts.outstanding() == 0 => break,
                Ok(_) => {}
                Err(err) => warn!(error = %err, "failed to read queue counts"),
            }
        }
    })
    .await;
    if drained.is_err() {
        warn!(refresh = %target, "refresh still has outstanding work; stopping anyway");
    }
    workers.shutdown_and_join().await;

    let counts = archivist.queue.counts().await?;
    println!("{}", serde_json::to_string_pretty(&counts)?);
    Ok(())
}

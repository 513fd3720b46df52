use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use rating_porter::checkpoint::CheckpointStore;
use rating_porter::config::{self, ConfigOverrides, MigrationConfig, BASE_URL_ENV, TIMEOUT_ENV};
use rating_porter::export::ExportWorkQueueBuilder;
use rating_porter::migrate::driver::RunContext;
use rating_porter::migrate::{Migrator, RunDriver};
use rating_porter::transport::ImdbTransport;
use rating_porter::util::env as env_util;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "rating-porter",
    version,
    about = "Replay ratings and watchlist entries from a catalog export into IMDb"
)]
struct Cli {
    /// Debug logging for this crate (RUST_LOG still wins)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Migrate the export, resuming from its checkpoint when one is valid
    Run(RunArgs),
    /// Print the checkpoint next to an export without touching the network
    Status {
        /// Source export (.xls/.html table or .csv)
        source: PathBuf,
    },
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Source export (.xls/.html table or .csv)
    source: PathBuf,
    /// all | list_only | rating_only (env: PORTER_MODE)
    #[arg(long)]
    mode: Option<String>,
    /// Target list id for watchlist adds (env: PORTER_LIST_ID)
    #[arg(long)]
    list: Option<String>,
    /// strict | ignore_case | fuzzy (env: PORTER_COMPARE)
    #[arg(long)]
    compare: Option<String>,
    /// title | title_year (env: PORTER_QUERY_FORMAT)
    #[arg(long)]
    query_format: Option<String>,
    /// Whole-run budget in seconds, 0 = unbounded (env: PORTER_TIME_LIMIT_SECS)
    #[arg(long)]
    time_limit_secs: Option<u64>,
    /// Pause between records in milliseconds (env: PORTER_REQUEST_DELAY_MS)
    #[arg(long)]
    delay_ms: Option<u64>,
}

impl RunArgs {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            mode: self.mode.clone(),
            list_id: self.list.clone(),
            compare: self.compare.clone(),
            query_format: self.query_format.clone(),
            time_limit_secs: self.time_limit_secs,
            request_delay_ms: self.delay_ms,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_util::init_env();
    let cli = Cli::parse();
    rating_porter::tracing::init_tracing(cli.verbose)?;

    match cli.command {
        Command::Run(args) => run(args).await,
        Command::Status { source } => status(source),
    }
}

async fn run(args: RunArgs) -> Result<()> {
    let cfg = MigrationConfig::try_from(args.overrides().over(ConfigOverrides::from_env()))
        .context("invalid configuration")?;
    let cookie = config::auth_cookie()?;

    let mut store = CheckpointStore::open(&args.source)?;
    let state = store
        .resolve_work_queue(&ExportWorkQueueBuilder::default())
        .context("resolving work queue")?;

    let transport = ImdbTransport::new(
        env_util::env_opt(BASE_URL_ENV).as_deref(),
        env_util::env_parse_opt(TIMEOUT_ENV),
    )?
    .with_auth_cookie(Some(cookie));

    let cancel = CancellationToken::new();
    let ctx = RunContext::with_time_limit(cfg.time_limit, cancel.clone());
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; stopping after checkpoint");
            cancel.cancel();
        }
    });

    let driver = RunDriver::new(Migrator::new(transport, cfg.options), store)
        .with_request_delay(cfg.request_delay);
    let summary = driver.run(state, &ctx).await?;
    info!(
        processed = summary.processed,
        failures = summary.failures,
        status = ?summary.status,
        checkpoint = %driver.store().checkpoint_path().display(),
        "done"
    );
    Ok(())
}

fn status(source: PathBuf) -> Result<()> {
    let store = CheckpointStore::open(&source)?;
    let Some(doc) = store.inspect()? else {
        println!(
            "{}",
            json!({ "checkpoint": store.checkpoint_path(), "status": null })
        );
        return Ok(());
    };
    let failures: Vec<_> = doc.failures().collect();
    let out = json!({
        "checkpoint": store.checkpoint_path(),
        "status": doc.settings.status,
        "filesize": doc.settings.filesize,
        "updated_at": doc.settings.updated_at,
        "pending": doc.queue.len(),
        "succeeded": doc.outcomes.len() - failures.len(),
        "failures": failures,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

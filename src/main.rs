//! squad-booking operator CLI.
//!
//! ```text
//! squad-booking migrate
//! squad-booking stress --users 10 --quota '{"player_front": 5}'
//! squad-booking stress --memory --users 50 --position gk
//! ```

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use squad_booking::config::{BookingConfig, LogFormat};
use squad_booking::domain::{Match, Position, PositionQuotas, QuotaResolver, UserId};
use squad_booking::persistence::{BookingStore, MemoryStore, PgStore};
use squad_booking::stress::run_join_race;
use squad_booking::BookingEngine;

#[derive(Debug, Parser)]
#[command(
    name = "squad-booking",
    version,
    about = "Booking allocation engine for capacity-limited matches"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Apply the database migrations
    Migrate,
    /// Race concurrent joins against one fresh match and check for oversell
    Stress(StressArgs),
}

#[derive(Debug, Args)]
struct StressArgs {
    /// Run against the in-memory store instead of PostgreSQL
    #[arg(long)]
    memory: bool,

    /// Position quotas of the seeded match (JSON object)
    #[arg(long, default_value = r#"{"player_front": 5}"#)]
    quota: String,

    /// Number of concurrent joining users
    #[arg(short, long, default_value_t = 10)]
    users: usize,

    /// Position every user asks for
    #[arg(short, long, default_value = "player_front")]
    position: Position,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let config = BookingConfig::from_env();
    init_tracing(config.log_format);

    let cli = Cli::parse();
    match cli.command {
        Command::Migrate => {
            let store = PgStore::connect(&config).await?;
            store.migrate().await?;
            tracing::info!("migrations applied");
            Ok(ExitCode::SUCCESS)
        }
        Command::Stress(args) => {
            if args.memory {
                stress(Arc::new(MemoryStore::new()), &config, &args).await
            } else {
                let store = PgStore::connect(&config).await?;
                store.migrate().await?;
                stress(Arc::new(store), &config, &args).await
            }
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

async fn stress<S: BookingStore>(
    store: Arc<S>,
    config: &BookingConfig,
    args: &StressArgs,
) -> Result<ExitCode> {
    let quotas = PositionQuotas::parse(&args.quota)
        .with_context(|| format!("invalid --quota {:?}", args.quota))?;
    let capacity =
        QuotaResolver::new(config.quota_policy.clone()).capacity(quotas.as_ref(), args.position);

    let mut record = Match::new(UserId::new(), "stress test", 0);
    record.position_quotas = quotas;

    let engine = BookingEngine::from_config(store, config);
    engine.register_match(&record).await?;
    tracing::info!(
        match_id = %record.id,
        position = %args.position,
        %capacity,
        users = args.users,
        "starting join race"
    );

    let report = run_join_race(&engine, record.id, args.position, args.users).await;
    println!("{report}");

    if report.oversold(capacity) {
        tracing::error!(%capacity, confirmed = report.confirmed, "OVERSOLD");
        return Ok(ExitCode::FAILURE);
    }
    if !report.waitlist_is_contiguous() {
        tracing::error!(orders = ?report.waitlist_orders, "waitlist ranks are not 1..=n");
        return Ok(ExitCode::FAILURE);
    }
    for err in &report.errors {
        tracing::warn!(error = %err, "join failed");
    }
    Ok(ExitCode::SUCCESS)
}

//! SARMC command line
//!
//! Validates mission configurations, prints the initial planning problem and
//! replays recorded JSON-lines feeds through the mission runtime.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use sarmc::planner::{CommandPlanner, DryRunExecutor, NullPlanner, PlannerFacade};
use sarmc::runtime::{FeedEvent, MissionRuntime};
use sarmc::telemetry::FlightState;
use sarmc::{MissionConfig, MissionSupervisor};

#[derive(Parser)]
#[command(name = "sarmc")]
#[command(about = "Search-and-rescue mission control", version)]
struct Cli {
    /// Mission configuration (TOML)
    #[arg(short, long, env = "SARMC_CONFIG", default_value = "mission.toml")]
    config: PathBuf,

    /// Default log filter when RUST_LOG is not set
    #[arg(long, default_value = "sarmc=info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the configuration and report problems
    Validate,

    /// Print the planning problem of the first search plan
    Problem,

    /// Replay a recorded feed through the supervisor
    Run {
        /// JSON-lines feed, one event per line
        #[arg(long)]
        feed: PathBuf,

        /// Delay between replayed events
        #[arg(long, default_value_t = 100)]
        event_delay_ms: u64,

        /// Report plans as finished after this many polls
        #[arg(long)]
        complete_after: Option<u32>,
    },
}

fn init_logging(default_directive: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::from_default_env().add_directive(
        default_directive
            .parse()
            .with_context(|| format!("Invalid log directive '{}'", default_directive))?,
    );
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    // Library code logs through the `log` facade
    tracing_log::LogTracer::init()?;
    Ok(())
}

fn load_config(path: &Path) -> anyhow::Result<MissionConfig> {
    let mut config = MissionConfig::from_file(path)
        .with_context(|| format!("Failed to load mission config {}", path.display()))?;
    config.apply_env_overrides()?;
    Ok(config)
}

fn planner_for(config: &MissionConfig) -> Box<dyn PlannerFacade> {
    if config.planner.command.is_empty() {
        warn!("No planner command configured, every planning request will fail");
        return Box::new(NullPlanner);
    }
    match CommandPlanner::from_config(&config.planner) {
        Ok(planner) => Box::new(planner),
        Err(e) => {
            warn!("{}; falling back to no planner", e);
            Box::new(NullPlanner)
        }
    }
}

fn validate(config: &MissionConfig) {
    info!(
        "Mission for {}: {} locations, {} to search, {} markers, {} lifevests",
        config.drone.name,
        config.locations.names.len(),
        config.mission_goals.locations_to_search.len(),
        config.mission_init.payload.num_markers,
        config.mission_init.payload.num_lifevests
    );
    println!("Configuration OK");
}

fn print_problem(config: MissionConfig) -> anyhow::Result<()> {
    let mut supervisor = MissionSupervisor::new(config, NullPlanner, DryRunExecutor::new())?;
    // Assume a vehicle landed at the origin with a full battery
    let telemetry = supervisor.telemetry_mut();
    telemetry.set_flight_state(FlightState::Landed);
    telemetry.set_battery_percent(100.0);
    supervisor.initialize()?;
    // The first tick sets the search goals; the null planner leaves them in place
    supervisor.tick()?;
    println!("{}", supervisor.problem_text());
    Ok(())
}

async fn replay(path: PathBuf, delay: Duration, tx: tokio::sync::mpsc::Sender<FeedEvent>) -> anyhow::Result<()> {
    let file = tokio::fs::File::open(&path)
        .await
        .with_context(|| format!("Failed to open feed {}", path.display()))?;
    let mut lines = BufReader::new(file).lines();
    let mut line_number = 0usize;
    while let Some(line) = lines.next_line().await? {
        line_number += 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let event = FeedEvent::from_json_line(line)
            .with_context(|| format!("{}:{}: invalid feed event", path.display(), line_number))?;
        if tx.send(event).await.is_err() {
            break;
        }
        tokio::time::sleep(delay).await;
    }
    Ok(())
}

async fn run(
    config: MissionConfig,
    feed: PathBuf,
    event_delay_ms: u64,
    complete_after: Option<u32>,
) -> anyhow::Result<()> {
    let executor = match complete_after {
        Some(polls) => DryRunExecutor::complete_after(polls),
        None => DryRunExecutor::new(),
    };
    let planner = planner_for(&config);
    let (tx, rx) = MissionRuntime::<Box<dyn PlannerFacade>, DryRunExecutor>::channel(
        config.runtime.feed_buffer,
    );
    let supervisor = MissionSupervisor::new(config, planner, executor)?;
    let mut runtime = MissionRuntime::new(supervisor, rx);

    let producer = tokio::spawn(replay(feed, Duration::from_millis(event_delay_ms), tx));

    let summary = tokio::select! {
        result = runtime.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted");
            runtime.summary()
        }
    };
    producer.abort();
    if let Ok(Err(e)) = producer.await {
        error!("Feed replay failed: {:#}", e);
    }

    info!(
        "Mission ended in {} after {} ticks: {} replans, {} planning failures, {} people detected",
        summary.final_state,
        summary.ticks,
        summary.replans,
        summary.planning_failures,
        summary.detections
    );
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    let config = load_config(&cli.config)?;
    match cli.command {
        Commands::Validate => validate(&config),
        Commands::Problem => print_problem(config)?,
        Commands::Run {
            feed,
            event_delay_ms,
            complete_after,
        } => run(config, feed, event_delay_ms, complete_after).await?,
    }
    Ok(())
}

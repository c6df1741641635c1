//! Tideye command-line entry point.
//!
//! Opens the LMDB cache, wires the configured adapters into an
//! [`IdentityResolver`] and prints results as JSON on stdout. Logs go to
//! stderr.
//!
//! Usage:
//!   tideye names --start 2024-06-01T00:00:00Z --end 2024-06-01T12:00:00Z
//!   tideye lookup 319139200 227000001
//!   tideye name 319139200
//!   tideye status
//!   tideye invalid list
//!   tideye invalid remove 000000001

use std::process::ExitCode;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tideye_core::{Clock, Mmsi, SystemClock, TideyeConfig, TideyeError, TideyeResult, VesselRecord};
use tideye_resolver::{IdentityResolver, Sources};
use tideye_sources::{
    AisHubRegistry, ExternalRegistry, InfluxSource, LiveVesselSource, RegistryResponse,
    SignalKSource, TelemetryRow, TimeSeriesSource,
};
use tideye_storage::{CacheStore, LmdbCacheStore};

#[derive(Parser, Debug)]
#[command(name = "tideye")]
#[command(about = "Resolve AIS vessel identifiers to names")]
struct Cli {
    /// Log at debug level unless RUST_LOG is set
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Names of all vessels observed in a window (default: last 24 hours)
    Names {
        #[arg(long)]
        start: Option<DateTime<Utc>>,
        #[arg(long)]
        end: Option<DateTime<Utc>>,
    },
    /// Resolve identifiers through the registry, waiting for the rate limit
    Lookup {
        #[arg(required = true)]
        mmsi: Vec<String>,
    },
    /// Resolve one identifier through all tiers
    Name { mmsi: String },
    /// Query the live source and refresh the cached record
    Live { mmsi: String },
    /// Registry rate limit status
    Status,
    /// Manage identifiers the registry rejected
    Invalid {
        #[command(subcommand)]
        action: InvalidAction,
    },
    /// Copy observed positions from telemetry into the cache
    Positions {
        #[arg(long)]
        start: Option<DateTime<Utc>>,
        #[arg(long)]
        end: Option<DateTime<Utc>>,
    },
}

#[derive(Subcommand, Debug)]
enum InvalidAction {
    List,
    Remove { mmsi: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            eprintln!("error: {}", e);
            if e.is_input() {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

/// Install the subscriber: `RUST_LOG` filter, JSON lines when
/// `TIDEYE_LOG_FORMAT=json`, human-readable otherwise.
fn init_logging(verbose: bool) {
    let default_filter = if verbose {
        "tideye_resolver=debug,tideye_sources=debug,info"
    } else {
        "info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let json = std::env::var("TIDEYE_LOG_FORMAT").is_ok_and(|format| format == "json");
    let registry = tracing_subscriber::registry().with(env_filter);
    let result = if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };
    if let Err(e) = result {
        eprintln!("warning: failed to init logging: {}", e);
    }
}

async fn run(command: Command) -> TideyeResult<()> {
    let config = TideyeConfig::from_env()?;
    let store: Arc<dyn CacheStore> = Arc::new(LmdbCacheStore::open(&config.storage)?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
    let resolver = IdentityResolver::new(store, sources(&config), clock, &config);

    match command {
        Command::Names { start, end } => print_json(&resolver.resolve_names(start, end).await?),
        Command::Lookup { mmsi } => print_json(&resolver.lookup_batch(&mmsi).await?),
        Command::Name { mmsi } => print_json(&resolver.resolve_name(&mmsi).await?),
        Command::Live { mmsi } => print_json(&resolver.lookup_live(&mmsi).await?),
        Command::Status => print_json(&resolver.rate_limiter().status().await?),
        Command::Invalid { action } => match action {
            InvalidAction::List => print_json(&resolver.invalid_identifiers().list().await?),
            InvalidAction::Remove { mmsi } => {
                let removed = resolver.invalid_identifiers().remove(&mmsi).await?;
                print_json(&serde_json::json!({ "mmsi": mmsi, "removed": removed }))
            }
        },
        Command::Positions { start, end } => {
            let window = resolver.window(start, end)?;
            let samples = resolver
                .position_recorder()
                .record_positions(Some(window))
                .await?;
            print_json(&samples)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> TideyeResult<()> {
    let text = serde_json::to_string_pretty(value).map_err(|e| {
        TideyeError::from(tideye_core::SourceError::InvalidResponse {
            source_name: "tideye".to_string(),
            reason: format!("Failed to encode output: {}", e),
        })
    })?;
    println!("{}", text);
    Ok(())
}

/// Build each adapter from configuration. An adapter whose settings are
/// missing is replaced by one that fails every call with the config error,
/// so commands that never reach it still work.
fn sources(config: &TideyeConfig) -> Sources {
    let telemetry: Arc<dyn TimeSeriesSource> = match InfluxSource::from_config(&config.telemetry) {
        Ok(source) => Arc::new(source),
        Err(e) => Arc::new(Unconfigured(e)),
    };
    let live: Arc<dyn LiveVesselSource> = match SignalKSource::from_config(&config.live) {
        Ok(source) => Arc::new(source),
        Err(e) => Arc::new(Unconfigured(e)),
    };
    let registry: Arc<dyn ExternalRegistry> = match AisHubRegistry::from_config(&config.registry) {
        Ok(registry) => Arc::new(registry),
        Err(e) => Arc::new(Unconfigured(e)),
    };
    Sources {
        telemetry,
        live,
        registry,
    }
}

/// Stand-in for an adapter that could not be built.
#[derive(Debug)]
struct Unconfigured(TideyeError);

#[async_trait]
impl TimeSeriesSource for Unconfigured {
    async fn collect_rows(&self, _flux: &str) -> TideyeResult<Vec<TelemetryRow>> {
        Err(self.0.clone())
    }

    fn name(&self) -> &str {
        "unconfigured"
    }
}

#[async_trait]
impl LiveVesselSource for Unconfigured {
    async fn get_vessel(&self, _mmsi: &Mmsi) -> TideyeResult<Option<VesselRecord>> {
        Err(self.0.clone())
    }
}

#[async_trait]
impl ExternalRegistry for Unconfigured {
    async fn fetch(&self, _identifiers: &[Mmsi]) -> TideyeResult<RegistryResponse> {
        Err(self.0.clone())
    }
}

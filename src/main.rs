//! CLI entry point for the Tasmanian transit departure watcher.
//!
//! Provides subcommands for watching configured stops with adaptive polling,
//! one-shot departure lookups, stop search and stop validation.

use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tas_transit::{
    config::{Config, FilterMode, StopConfig},
    coordinator::Coordinator,
    infra::transit::TransitClient,
    notify::{LogNotifier, spawn_notifications},
    output::{format_departure, print_json, print_pretty, print_summaries},
    parser::{best_stop_match, parse_stop_locations},
    ranker::process_departures,
    sensors::StopSensors,
    services::{StopSearch, TransitApi, transit_api::DEFAULT_SEARCH_RADIUS},
};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "tas_transit")]
#[command(about = "Real-time departures for Tasmanian Metro stops", long_about = None)]
struct Cli {
    /// JSON config file (falls back to TAS_TRANSIT_CONFIG)
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the configured stops until Ctrl-C
    Watch {
        /// Seconds between sensor summaries in the log
        #[arg(short, long, default_value_t = 60)]
        summary_every: u64,
    },
    /// Fetch and rank departures for one stop
    Departures {
        #[arg(value_name = "STOP_ID")]
        stop_id: String,

        /// Route numbers to filter on
        #[arg(short, long)]
        line: Vec<String>,

        /// Destination fragments to filter on
        #[arg(short, long)]
        destination: Vec<String>,

        /// Drop matching departures instead of keeping them
        #[arg(long, default_value_t = false)]
        exclude: bool,

        /// Print the ranked snapshot as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Find stops near a coordinate
    Search {
        #[arg(long, allow_hyphen_values = true)]
        latitude: f64,

        #[arg(long, allow_hyphen_values = true)]
        longitude: f64,

        /// Stop name to look for
        #[arg(short, long)]
        query: Option<String>,

        /// Search radius in metres
        #[arg(short, long, default_value_t = DEFAULT_SEARCH_RADIUS)]
        radius: u32,
    },
    /// Check that a stop id is known to the API
    Validate {
        #[arg(value_name = "STOP_ID")]
        stop_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/tas_transit.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("tas_transit.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config)?;
    let client = TransitClient::new(config.base_url.clone(), config.polling.request_timeout());

    match cli.command {
        Commands::Watch { summary_every } => {
            watch(client, config, summary_every).await?;
        }
        Commands::Departures {
            stop_id,
            line,
            destination,
            exclude,
            json,
        } => {
            let stop = config
                .stops
                .iter()
                .find(|s| s.stop_id == stop_id)
                .cloned()
                .unwrap_or_else(|| {
                    let mode = if exclude {
                        FilterMode::Exclude
                    } else {
                        FilterMode::Include
                    };
                    StopConfig::new(stop_id.clone(), "")
                        .with_line_filters(line)
                        .with_destination_filters(destination)
                        .with_filter_mode(mode)
                });

            let departures = client.get_stop_departures(&stop.stop_id).await?;
            let snapshot = process_departures(&departures, &stop, Utc::now());
            client.close();

            if json {
                print_json(&snapshot)?;
            } else {
                info!(
                    stop_id = %stop.stop_id,
                    fetched = departures.len(),
                    upcoming = snapshot.upcoming_departures().len(),
                    status = ?snapshot.bus_status(),
                    "Departures"
                );
                for departure in snapshot.upcoming_departures() {
                    info!("{}", format_departure(departure));
                }
            }
        }
        Commands::Search {
            latitude,
            longitude,
            query,
            radius,
        } => {
            let mut search = StopSearch::new(latitude, longitude).with_radius(radius);
            if let Some(q) = &query {
                search = search.with_query(q.clone());
            }
            let results = client.search_stops_by_location(&search).await?;
            client.close();

            let stops = parse_stop_locations(&results);
            info!(total = stops.len(), "Stop search complete");
            for stop in &stops {
                info!(stop_id = %stop.id, latitude = ?stop.latitude, longitude = ?stop.longitude, "{}", stop.name);
            }
            if let Some(q) = query.as_deref() {
                match best_stop_match(&stops, q) {
                    Some(best) => info!(stop_id = %best.id, "Best match: {}", best.name),
                    None => warn!(query = q, "No stops found"),
                }
            }
        }
        Commands::Validate { stop_id } => {
            let valid = client.validate_stop(&stop_id).await?;
            client.close();
            if valid {
                info!(stop_id = %stop_id, "Stop is valid");
            } else {
                bail!("Unknown stop {}", stop_id);
            }
        }
    }

    Ok(())
}

/// Loads the config file from `--config` or `TAS_TRANSIT_CONFIG`. Without
/// either, defaults apply and no stops are configured.
fn load_config(path: Option<String>) -> Result<Config> {
    let path = path.or_else(|| std::env::var("TAS_TRANSIT_CONFIG").ok());
    match path {
        Some(path) => {
            let config =
                Config::load(&path).with_context(|| format!("Failed to load config from {}", path))?;
            info!(path = %path, stops = config.stops.len(), "Config loaded");
            Ok(config)
        }
        None => Ok(Config::from_json("{}")?),
    }
}

/// Runs the coordinator and notification checks until Ctrl-C.
#[tracing::instrument(skip_all, fields(stops = config.stops.len(), base_url = %config.base_url))]
async fn watch(client: TransitClient, config: Config, summary_every: u64) -> Result<()> {
    if config.stops.is_empty() {
        bail!("No stops configured; pass --config or set TAS_TRANSIT_CONFIG");
    }

    let coordinator = Arc::new(Coordinator::new(
        client,
        config.polling.clone(),
        config.stops.clone(),
    )?);

    if let Err(e) = coordinator.start().await {
        error!(error = %e, "Initial update failed, will retry on schedule");
    }

    let notifications = spawn_notifications(
        &coordinator,
        Arc::new(LogNotifier),
        Duration::from_secs(config.notification_interval_secs),
    );

    let mut summary = tokio::time::interval(Duration::from_secs(summary_every.max(1)));
    loop {
        tokio::select! {
            _ = summary.tick() => {
                let Some(snapshot) = coordinator.snapshot().await else {
                    continue;
                };
                print_pretty(&snapshot);
                for (stop_id, stop_snapshot) in snapshot.iter() {
                    if stop_snapshot.next_departure().is_none() {
                        debug!(stop_id, "No upcoming departures");
                    }
                }
                let stops = coordinator.stops();
                let summaries: Vec<_> = stops
                    .iter()
                    .map(|stop| StopSensors::new(stop, snapshot.get(&stop.stop_id)).summary())
                    .collect();
                print_summaries(&summaries);
                if !coordinator.last_update_success() {
                    warn!(updated_at = %snapshot.updated_at(), "Showing stale departures");
                }
            }
            res = tokio::signal::ctrl_c() => {
                res?;
                info!("Ctrl-C received, shutting down");
                break;
            }
        }
    }

    notifications.abort();
    coordinator.shutdown();
    Ok(())
}

//! Campus wayfinder - spoken walking guidance for visually impaired students
//!
//! Module structure:
//! - `domain/` - Core types (Location, Route, PositionSample, HistoryEntry), geometry
//! - `io/` - External interfaces (store, speech, positioning listener, status endpoint)
//! - `services/` - Navigation logic (Navigator, RoutePlayer, tick drivers)
//! - `infra/` - Infrastructure (Config, Metrics)

use anyhow::Context;
use campus_wayfinder::domain::types::{LocationId, PositionSample};
use campus_wayfinder::infra::{Config, Metrics};
use campus_wayfinder::io::{
    create_speech_queue, spawn_position_listener, start_status_server, Campus, CampusStore,
    FileStore, PositionSource, SpeechCmd, StatusContext,
};
use campus_wayfinder::services::{Navigator, SessionState};
use clap::{Parser, Subcommand};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Campus wayfinder - accessible campus navigation
#[derive(Parser, Debug)]
#[command(name = "wayfinder", version, about)]
struct Args {
    /// Path to TOML configuration file (default: $CONFIG_FILE or config/dev.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the navigator with the positioning listener and status endpoint (default)
    Serve,
    /// Navigate to a location and exit on arrival
    Navigate {
        /// Destination location id
        #[arg(long)]
        to: i64,
    },
    /// Announce places around a position
    Nearby {
        #[arg(long, requires = "lon")]
        lat: Option<f64>,
        #[arg(long, requires = "lat")]
        lon: Option<f64>,
        /// Search radius in meters (default from config)
        #[arg(long)]
        radius: Option<f64>,
    },
    /// List known locations
    Locations {
        #[arg(long)]
        category: Option<String>,
    },
    /// Show recent completed trips
    History {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Write the built-in sample campus dataset
    InitData {
        /// Overwrite an existing dataset
        #[arg(long)]
        force: bool,
    },
}

/// Navigator plus the speech worker rendering its announcements
struct Engine {
    navigator: Arc<Navigator>,
    store: Arc<dyn CampusStore>,
    speech: JoinHandle<()>,
}

impl Engine {
    fn build(
        config: &Config,
        metrics: Arc<Metrics>,
        live_source: Option<Arc<dyn PositionSource>>,
    ) -> anyhow::Result<Self> {
        let store = open_store(config)?;
        let (queue, worker) = create_speech_queue(
            config.speech_queue_size(),
            metrics.clone(),
            Box::new(|cmd| match cmd {
                SpeechCmd::Say { text, .. } => println!("[say] {text}"),
                SpeechCmd::Sound(cue) => println!("[sound] {}", cue.as_str()),
            }),
        );
        let speech = tokio::spawn(worker.run());
        let navigator =
            Navigator::new(config.clone(), store.clone(), Arc::new(queue), live_source, metrics);
        Ok(Self { navigator, store, speech })
    }

    /// Drop the navigator and wait for queued speech to be rendered
    async fn finish(self) {
        let Engine { navigator, store, speech } = self;
        drop(navigator);
        drop(store);
        if let Err(e) = speech.await {
            warn!(error = %e, "speech_worker_join_failed");
        }
    }
}

fn open_store(config: &Config) -> anyhow::Result<Arc<dyn CampusStore>> {
    let store = FileStore::open(config.campus_file(), config.history_file())
        .context("campus dataset unavailable (run `wayfinder init-data` to create the sample)")?;
    Ok(Arc::new(store))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with configurable level via RUST_LOG env var
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config_path = args.config.clone().unwrap_or_else(|| Config::resolve_config_path(&[]));
    let config = Config::load_from_path(&config_path);

    info!(
        config_file = %config.config_file(),
        campus_file = %config.campus_file(),
        instruction_radius_m = %config.instruction_radius_m(),
        arrival_radius_m = %config.arrival_radius_m(),
        synthetic_interval_ms = %config.synthetic_interval_ms(),
        positioning_enabled = %config.positioning_enabled(),
        status_port = %config.status_port(),
        "config_loaded"
    );

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Navigate { to } => navigate(config, to).await,
        Command::Nearby { lat, lon, radius } => nearby(config, lat.zip(lon), radius).await,
        Command::Locations { category } => locations(&config, category.as_deref()),
        Command::History { limit } => history(&config, limit),
        Command::InitData { force } => init_data(&config, force),
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    info!("wayfinder starting");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let metrics = Arc::new(Metrics::new());

    // Live positioning (optional). A port that cannot be bound leaves no live
    // source, so sessions play the route synthetically.
    let feed = if config.positioning_enabled() {
        spawn_position_listener(
            config.positioning_port(),
            64,
            metrics.clone(),
            shutdown_rx.clone(),
        )
        .await
    } else {
        None
    };
    let live_source = feed.clone().map(|f| Arc::new(f) as Arc<dyn PositionSource>);

    let engine = Engine::build(&config, metrics.clone(), live_source)?;
    let navigator = engine.navigator.clone();

    // Keep the current position fresh while idle
    if let Some(feed) = &feed {
        let mut rx = feed.subscribe()?;
        let observer = Arc::downgrade(&navigator);
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(sample) => {
                        let Some(navigator) = observer.upgrade() else { break };
                        navigator.record_position(sample);
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    // Status endpoint (if port > 0)
    let status_port = config.status_port();
    if status_port > 0 {
        let ctx = Arc::new(StatusContext {
            navigator: navigator.clone(),
            store: engine.store.clone(),
            metrics: metrics.clone(),
            default_radius_m: config.nearby_radius_m(),
        });
        let status_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = start_status_server(status_port, ctx, status_shutdown).await {
                error!(error = %e, "status_server_error");
            }
        });
    }

    // Periodic metrics log
    let metrics_clone = metrics.clone();
    let metrics_interval = config.metrics_interval_secs().max(1);
    let mut metrics_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(metrics_interval));
        interval.tick().await;
        loop {
            tokio::select! {
                _ = interval.tick() => metrics_clone.report().log(),
                _ = metrics_shutdown.changed() => break,
            }
        }
    });

    // Errors are already announced
    let _ = navigator.begin_destination_selection();
    info!("navigator_ready");

    tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    info!("shutdown_signal_received");
    let _ = shutdown_tx.send(true);
    navigator.stop();
    drop(navigator);

    // Open status connections may still hold the navigator
    if tokio::time::timeout(Duration::from_secs(2), engine.finish()).await.is_err() {
        warn!("speech_flush_timed_out");
    }

    info!("wayfinder shutdown complete");
    Ok(())
}

async fn navigate(config: Config, to: i64) -> anyhow::Result<()> {
    let metrics = Arc::new(Metrics::new());
    let engine = Engine::build(&config, metrics.clone(), None)?;

    let Some(destination) = engine.store.location(LocationId(to))? else {
        engine.finish().await;
        anyhow::bail!("unknown location id {to}");
    };

    if let Err(e) = engine.navigator.start(&destination) {
        engine.finish().await;
        return Err(e.into());
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                engine.navigator.stop();
                break;
            }
            _ = tokio::time::sleep(Duration::from_millis(200)) => {
                if engine.navigator.state() != SessionState::Navigating {
                    break;
                }
            }
        }
    }

    let outcome = engine.navigator.state();
    metrics.report().log();
    engine.finish().await;
    info!(outcome = %outcome.as_str(), "navigate_finished");
    Ok(())
}

async fn nearby(config: Config, at: Option<(f64, f64)>, radius: Option<f64>) -> anyhow::Result<()> {
    let engine = Engine::build(&config, Arc::new(Metrics::new()), None)?;
    let position = match at {
        Some((lat, lon)) => campus_wayfinder::domain::Coordinate::new(lat, lon),
        None => config.fallback_position(),
    };
    engine.navigator.record_position(PositionSample::new(
        position,
        0.0,
        campus_wayfinder::domain::trip::epoch_ms(),
    ));

    let found = engine.navigator.announce_nearby(radius.unwrap_or(config.nearby_radius_m()));
    engine.finish().await;

    for (location, d) in found {
        println!("{:>4}  {:<24} {:<12} {:>6.0} m", location.id.0, location.name, location.category, d);
    }
    Ok(())
}

fn locations(config: &Config, category: Option<&str>) -> anyhow::Result<()> {
    let store = open_store(config)?;
    for location in store.list_locations(category)? {
        println!(
            "{:>4}  {:<24} {:<12} {}  {}",
            location.id.0,
            location.name,
            location.category,
            location.coordinate,
            location.accessible_features
        );
    }
    Ok(())
}

fn history(config: &Config, limit: usize) -> anyhow::Result<()> {
    let store = open_store(config)?;
    for entry in store.recent_history(limit)? {
        println!(
            "{}  {} -> {}  ({}, {})",
            entry.recorded_at.to_rfc3339(),
            entry.start_label,
            entry.end_label,
            entry.route_name,
            entry.status.as_str()
        );
    }
    Ok(())
}

fn init_data(config: &Config, force: bool) -> anyhow::Result<()> {
    let path = Path::new(config.campus_file());
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }
    let campus = Campus::sample();
    campus.save(path)?;
    info!(
        path = %path.display(),
        locations = %campus.locations.len(),
        routes = %campus.routes.len(),
        "sample_campus_written"
    );
    Ok(())
}

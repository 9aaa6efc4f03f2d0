mod clock;
mod config;
mod geofence;
mod render;
mod service;
mod settings;
mod sync;

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::geofence::{collection_name_from_arn, tracker_topic, TrackingEvent};
use crate::render::MarkerLayer;
use crate::service::ReplayService;
use crate::settings::SettingsStore;
use crate::sync::{
    Coordinate, LocationUpdate, MemoryCheckpoint, SettingsCheckpoint, SyncCheckpoint, SyncOptions,
    SyncOutcome, SyncWorker, TrackSynchronizer,
};

#[derive(Parser)]
#[command(name = "track-sync")]
#[command(about = "Incremental device track synchronization")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a config file
    Validate { config: String },
    /// Turn tracking on
    Start { config: String },
    /// Turn tracking off
    Stop { config: String },
    /// Show persisted tracking state
    Status { config: String },
    /// Run one tracking pass against a recorded track
    Sync {
        config: String,
        /// Recorded device positions (YAML or JSON)
        track: PathBuf,
        /// Write rendered markers as GeoJSON
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Trigger a pass on every simulated location update
    Watch {
        config: String,
        track: PathBuf,
        #[arg(long, default_value = "5s")]
        interval: String,
        #[arg(long, default_value_t = 10)]
        count: u32,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Decode a geofence event payload
    GeofenceEvent { payload: PathBuf },
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { config } => validate(&config),
        Commands::Start { config } => set_tracking(&config, true),
        Commands::Stop { config } => set_tracking(&config, false),
        Commands::Status { config } => status(&config),
        Commands::Sync {
            config,
            track,
            output,
        } => sync_once(&config, track, output).await,
        Commands::Watch {
            config,
            track,
            interval,
            count,
            output,
        } => watch(&config, track, &interval, count, output).await,
        Commands::GeofenceEvent { payload } => geofence_event(&payload),
    }
}

fn load_config(path: &str) -> Option<Config> {
    match Config::from_file(path) {
        Ok(c) => Some(c),
        Err(e) => {
            eprintln!("Config error: {}", e);
            None
        }
    }
}

fn validate(path: &str) -> ExitCode {
    let Some(config) = load_config(path) else {
        return ExitCode::FAILURE;
    };

    println!("Config is valid");
    println!("  tracker: {}", config.tracker.name);
    if let Some(region) = &config.tracker.region {
        println!("  region: {}", region);
    }
    if let Some(pool) = &config.tracker.identity_pool_id {
        println!("  identity pool: {}", pool);
    }
    if let Some(map) = &config.map.name {
        println!("  map: {}", map);
    }
    println!("  lookback: {}", config.sync.lookback);
    println!("  page size: {}", config.sync.page_size);
    println!("  dedup: {:?}", config.dedup_policy());
    println!("  settings: {}", config.settings.path.display());
    if let Some(geofence) = &config.geofence {
        let name = collection_name_from_arn(&geofence.collection_arn).unwrap_or_default();
        println!("  geofence collection: {}", name);
        if let Some(url) = &geofence.websocket_url {
            println!("  notifications: wss://{}/mqtt", url);
        }
    }
    ExitCode::SUCCESS
}

fn set_tracking(path: &str, active: bool) -> ExitCode {
    let Some(config) = load_config(path) else {
        return ExitCode::FAILURE;
    };
    let store = SettingsStore::new(config.settings.path.clone());

    match store.update(|s| s.tracking_active = active) {
        Ok(settings) => {
            log::info!(
                "Tracking {} for device {}",
                if active { "started" } else { "stopped" },
                settings.device_id.unwrap_or_default()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Settings error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn status(path: &str) -> ExitCode {
    let Some(config) = load_config(path) else {
        return ExitCode::FAILURE;
    };
    let store = SettingsStore::new(config.settings.path.clone());

    let settings = match store.load() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Settings error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let device_id = settings.device_id.unwrap_or_default();
    println!("device: {}", device_id);
    println!("tracking active: {}", settings.tracking_active);
    match settings.last_sync_time {
        Some(t) => println!("last sync: {}", t),
        None => println!("last sync: never"),
    }
    if config.geofence.is_some() {
        println!("geofence topic: {}", tracker_topic(&device_id));
    }
    ExitCode::SUCCESS
}

struct Session {
    sync: Arc<TrackSynchronizer>,
    layer: Arc<MarkerLayer>,
    clock: Arc<SystemClock>,
}

fn build_session(config: &Config, track: PathBuf) -> Option<Session> {
    let store = SettingsStore::new(config.settings.path.clone());
    if let Err(e) = store.load() {
        eprintln!("Settings error: {}", e);
        return None;
    }

    let clock = Arc::new(SystemClock);
    let service = match ReplayService::open(track, clock.now()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error reading track: {}", e);
            return None;
        }
    };

    let checkpoint: Box<dyn SyncCheckpoint> = if config.settings.persist_last_sync {
        match SettingsCheckpoint::open(store) {
            Ok(c) => Box::new(c),
            Err(e) => {
                eprintln!("Settings error: {}", e);
                return None;
            }
        }
    } else {
        Box::new(MemoryCheckpoint::default())
    };

    let mut options = SyncOptions::new(config.tracker.name.clone());
    options.device_id = config.tracker.device_id.clone();
    options.page_size = config.sync.page_size;
    // Validated on load.
    if let Ok(lookback) = config.lookback() {
        options.lookback = lookback;
    }

    let layer = Arc::new(MarkerLayer::new(config.dedup_policy()));
    let sync = TrackSynchronizer::new(
        Arc::new(service),
        layer.clone(),
        checkpoint,
        clock.clone(),
        // Re-read on every pass, so `track-sync stop` reaches a running watch.
        Arc::new(SettingsStore::new(config.settings.path.clone())),
        options,
    );

    Some(Session {
        sync: Arc::new(sync),
        layer,
        clock,
    })
}

fn write_geojson(layer: &MarkerLayer, output: Option<PathBuf>) -> ExitCode {
    let Some(path) = output else {
        return ExitCode::SUCCESS;
    };
    let doc = match serde_json::to_string_pretty(&layer.to_geojson()) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("Error encoding markers: {}", e);
            return ExitCode::FAILURE;
        }
    };
    match std::fs::write(&path, doc) {
        Ok(()) => {
            log::info!("Wrote markers to {}", path.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error writing {}: {}", path.display(), e);
            ExitCode::FAILURE
        }
    }
}

async fn sync_once(path: &str, track: PathBuf, output: Option<PathBuf>) -> ExitCode {
    let Some(config) = load_config(path) else {
        return ExitCode::FAILURE;
    };
    let Some(session) = build_session(&config, track) else {
        return ExitCode::FAILURE;
    };

    match session.sync.sync().await {
        SyncOutcome::Skipped => {
            println!("Tracking is not active; run `track-sync start` first");
            ExitCode::SUCCESS
        }
        SyncOutcome::Busy => ExitCode::SUCCESS,
        SyncOutcome::Completed(report) => {
            println!(
                "Synced {} page(s): {} point(s) delivered, {} dropped, {} on map",
                report.pages,
                report.delivered,
                report.dropped,
                session.layer.tracking_points().len()
            );
            if let Some(t) = session.sync.last_sync() {
                println!("Next pass resumes from {}", t);
            }
            write_geojson(&session.layer, output)
        }
        SyncOutcome::Failed => ExitCode::FAILURE,
    }
}

async fn watch(
    path: &str,
    track: PathBuf,
    interval: &str,
    count: u32,
    output: Option<PathBuf>,
) -> ExitCode {
    let Some(config) = load_config(path) else {
        return ExitCode::FAILURE;
    };
    let interval = match humantime::parse_duration(interval.trim()) {
        Ok(d) if !d.is_zero() => d,
        Ok(_) => {
            eprintln!("Interval must be positive");
            return ExitCode::FAILURE;
        }
        Err(e) => {
            eprintln!("Invalid interval: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let filter = match config.update_filter() {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Config error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let Some(session) = build_session(&config, track) else {
        return ExitCode::FAILURE;
    };

    let mut worker = SyncWorker::new(session.sync.clone(), filter);
    if let Err(e) = worker.start(config.sync.queue_depth) {
        eprintln!("{}", e);
        return ExitCode::FAILURE;
    }

    let mut ticker = tokio::time::interval(interval);
    for _ in 0..count {
        ticker.tick().await;
        // The newest tracking point stands in for the device's own fix.
        let coordinate = session
            .layer
            .tracking_points()
            .last()
            .copied()
            .unwrap_or(Coordinate::new(0.0, 0.0));
        session.layer.set_location_change(coordinate);
        worker.trigger(LocationUpdate {
            coordinate,
            at: session.clock.now(),
        });
    }
    worker.stop().await;

    let status = worker.status();
    println!(
        "{} pass(es), {} point(s) delivered, {} on map",
        status.passes,
        status.points_delivered,
        session.layer.tracking_points().len()
    );
    if let Some(err) = status.last_error {
        println!("last error: {}", err);
    }
    write_geojson(&session.layer, output)
}

fn geofence_event(path: &Path) -> ExitCode {
    let payload = match std::fs::read(path) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error reading file: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let event = match TrackingEvent::from_payload(&payload) {
        Ok(e) => e,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let when = match event.event_time() {
        Ok(t) => t.to_string(),
        Err(_) => event.event_time.clone(),
    };
    println!(
        "{}: geofence {} ({}) at {}",
        event.tracker_event_type, event.geofence_id, event.source, when
    );
    ExitCode::SUCCESS
}

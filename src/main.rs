// src/main.rs
//! Run Tracker - record runs from a GPS feed and browse run history

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use run_tracker::{
    config::TrackerConfig,
    display::{self, RunDashboard},
    location::{self, serial::list_serial_ports},
    logging::{init_logging, LogTarget},
    run::{
        export,
        route_export::{RouteExporter, RouteFormat},
        stats, JsonRunStore, RunFinalizer, RunStore, SortOrder,
    },
    tracking::{SystemClock, TrackingOptions, TrackingService},
    TrackerError,
};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "run-tracker", version, about = "Record runs from a GPS feed and browse run history")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Config file (defaults to ~/.config/run-tracker/config.json)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Record a run with the live dashboard
    Track {
        /// Location source: gpsd, serial or replay
        #[arg(long)]
        source: Option<String>,

        /// Replay a recorded route file (JSON array of {latitude, longitude})
        #[arg(long)]
        replay: Option<PathBuf>,

        /// Serial device for NMEA input
        #[arg(long)]
        port: Option<String>,

        #[arg(long)]
        baud: Option<u32>,
    },

    /// List saved runs
    Runs {
        #[arg(long, value_enum, default_value_t = SortOrder::Date)]
        sort: SortOrder,
    },

    /// Totals, weekly distance and personal records
    Stats,

    /// Delete a saved run
    Delete { id: u64 },

    /// Write the route of a saved run to a file
    Route {
        id: u64,
        file: PathBuf,
        #[arg(long, value_enum, default_value_t = RouteFormat::Gpx)]
        format: RouteFormat,
    },

    /// Back up run history to a JSON file
    Export { file: PathBuf },

    /// Restore runs from a JSON backup, skipping ones already present
    Import { file: PathBuf },

    /// Show or change the runner profile
    Settings {
        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        weight: Option<f64>,
    },

    /// List available serial ports
    Ports,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = match cli.config {
        Some(path) => path,
        None => TrackerConfig::get_config_path()?,
    };
    let config = TrackerConfig::load_from(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    let log_target = match &cli.command {
        Command::Track { .. } => LogTarget::File(config.log_path()?),
        _ => LogTarget::Stderr,
    };
    let _log_guard = init_logging(&log_target)?;

    match cli.command {
        Command::Track { source, replay, port, baud } => {
            let mut config = config;
            if let Some(source) = source {
                config.update_source(&source);
            }
            if let Some(path) = replay {
                config.update_replay(path);
            }
            if let Some(port) = port {
                let baud = baud.or(config.serial_baudrate).unwrap_or(location::DEFAULT_BAUDRATE);
                config.update_serial(port, baud);
            }
            track(config).await
        }
        Command::Runs { sort } => {
            let store = open_store(&config)?;
            let runs = store.list(sort)?;
            if runs.is_empty() {
                println!("No runs yet.");
            }
            for run in &runs {
                println!("{}", display::format_run_row(run));
            }
            Ok(())
        }
        Command::Stats => print_stats(&open_store(&config)?),
        Command::Delete { id } => {
            let store = open_store(&config)?;
            if !store.delete(id)? {
                bail!("No run with id {}", id);
            }
            println!("Deleted run {}", id);
            Ok(())
        }
        Command::Route { id, file, format } => {
            let store = open_store(&config)?;
            let Some(run) = store.get(id)? else {
                bail!("No run with id {}", id);
            };
            RouteExporter::new(&run)?
                .export_to_file(&file, format)
                .with_context(|| format!("Failed to write {}", file.display()))?;
            println!("Wrote {} to {}", format.display_name(), file.display());
            Ok(())
        }
        Command::Export { file } => {
            let count = export::export_runs(&open_store(&config)?, &file)?;
            println!("Exported {} runs to {}", count, file.display());
            Ok(())
        }
        Command::Import { file } => {
            let count = export::import_runs(&open_store(&config)?, &file)
                .with_context(|| format!("Failed to import {}", file.display()))?;
            println!("Imported {} runs", count);
            Ok(())
        }
        Command::Settings { name, weight } => settings(config, &config_path, name, weight),
        Command::Ports => {
            for (name, kind) in list_serial_ports()? {
                println!("{:<20} {}", name, kind);
            }
            Ok(())
        }
    }
}

fn open_store(config: &TrackerConfig) -> anyhow::Result<JsonRunStore> {
    let path = config.database_path()?;
    JsonRunStore::open(&path).with_context(|| format!("Failed to open run history {}", path.display()))
}

async fn track(config: TrackerConfig) -> anyhow::Result<()> {
    config.validate()?;
    let source = location::source_from_config(&config)?;
    let source_name = source.name().to_string();
    let store: Arc<dyn RunStore> = Arc::new(open_store(&config)?);
    let finalizer = RunFinalizer::new(store, config.weight_kg);

    info!(source = %source_name, "Starting run");
    let handle = TrackingService::spawn(
        source,
        finalizer,
        Arc::new(SystemClock::new()),
        TrackingOptions::from(&config),
    );

    let dashboard = RunDashboard::new(config.runner_name.clone(), config.weight_kg, source_name);
    match dashboard.run(handle).await {
        Ok(Some(run)) => {
            println!("Run saved:");
            println!("{}", display::format_run_row(&run));
            Ok(())
        }
        Ok(None) => {
            println!("Run discarded.");
            Ok(())
        }
        Err(TrackerError::SaveFailed { record, reason }) => {
            warn!(%reason, "Run could not be saved");
            let fallback = std::env::temp_dir().join(format!(
                "run-{}.json",
                record.started_at.format("%Y%m%d-%H%M%S")
            ));
            std::fs::write(&fallback, serde_json::to_string_pretty(&[record.as_ref()])?)?;
            bail!(
                "Failed to save run ({}); wrote it to {} for `import`",
                reason,
                fallback.display()
            )
        }
        Err(e) => Err(e.into()),
    }
}

fn print_stats(store: &dyn RunStore) -> anyhow::Result<()> {
    let runs = store.list(SortOrder::Date)?;
    let totals = stats::RunTotals::from_runs(&runs);
    let (this_week, last_week) = stats::weekly_km(&runs, chrono::Local::now().date_naive());
    let records = stats::PersonalRecords::from_runs(&runs);

    println!("Runs:          {}", totals.runs);
    println!("Distance:      {:.2} km", totals.distance_m / 1000.0);
    println!("Time:          {}", stats::format_stopwatch(totals.duration_ms, false));
    println!("Calories:      {:.0} kcal", totals.calories);
    println!(
        "Avg speed:     {:.1} km/h ({:.2} min/km)",
        totals.avg_speed_kmh,
        stats::kmh_to_min_per_km(totals.avg_speed_kmh)
    );
    println!("This week:     {:.2} km", this_week);
    println!("Last week:     {:.2} km", last_week);

    for (label, run) in [
        ("Best 5K", &records.five_k),
        ("Best 10K", &records.ten_k),
        ("Best 21K", &records.half_marathon),
    ] {
        match run {
            Some(run) => println!("{:<14} {}", format!("{}:", label), display::format_run_row(run)),
            None => println!("{:<14} -", format!("{}:", label)),
        }
    }
    Ok(())
}

fn settings(
    mut config: TrackerConfig,
    path: &Path,
    name: Option<String>,
    weight: Option<f64>,
) -> anyhow::Result<()> {
    if name.is_some() || weight.is_some() {
        config.update_profile(name, weight)?;
        config.save_to(path)?;
        info!(path = %path.display(), "Settings saved");
    }

    println!("Runner:   {}", config.runner_name.as_deref().unwrap_or("-"));
    println!("Weight:   {} kg", config.weight_kg);
    println!("Source:   {}", config.source_type);
    println!("History:  {}", config.database_path()?.display());
    Ok(())
}

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use railtrack_core::live::{ArrivalsFeed, HttpFetcher, LiveTracker};
use railtrack_core::{ClockMode, Engine, LifecycleEvent, SimulationClock};
use railtrack_transit::prelude::*;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

mod dataset;

use dataset::{build_provider, read_config, read_dataset};

#[derive(Parser, Debug)]
#[command(
    name = "live-trains",
    author,
    version,
    about = "Run the railtrack engine against a timetable dataset or a live arrivals feed"
)]
struct Args {
    /// Dataset JSON (stations, railways, timetables, bus trips, flights)
    #[arg(short, long)]
    dataset: PathBuf,

    /// Engine and live tracking configuration JSON
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose output (show debug messages)
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay timetables on a simulated clock and log vehicle positions
    Playback {
        /// Simulation start (ms on the dataset's timebase)
        #[arg(long, default_value_t = 0.0)]
        start: f64,

        /// Simulation end (ms)
        #[arg(long)]
        until: f64,

        /// Simulated time between position reports (ms)
        #[arg(long, default_value_t = 60_000.0)]
        step: f64,
    },

    /// Poll the TfL arrivals feed for one line and log estimated positions
    Live {
        /// TfL line id, e.g. "victoria"
        #[arg(short, long)]
        line: String,

        /// TfL application key
        #[arg(long, env = "TFL_APP_KEY")]
        app_key: Option<String>,

        /// Seconds between polls
        #[arg(long, default_value_t = 30)]
        interval: u64,

        /// Stop after this many polls
        #[arg(long)]
        polls: Option<u64>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(if args.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .init();

    let config = read_config(args.config.as_deref())?;
    let provider = build_provider(read_dataset(&args.dataset)?)?;
    info!(
        railways = provider.all_railways().len(),
        timetables = provider.all_timetables().len(),
        "dataset loaded"
    );

    match args.command {
        Command::Playback { start, until, step } => {
            if step <= 0.0 {
                bail!("--step must be positive");
            }
            let mut engine_config = config.engine;
            engine_config.clock_mode = ClockMode::Playback;
            let mut engine = Engine::new(SimulationClock::new(start), provider, engine_config);
            playback(&mut engine, until, step);
            Ok(())
        }
        Command::Live {
            line,
            app_key,
            interval,
            polls,
        } => {
            let railway = provider
                .get_railway(&RailwayIdentifier::new(format!("tfl.{line}")))
                .or_else(|| provider.get_railway(&RailwayIdentifier::new(line.as_str())))
                .with_context(|| format!("No railway for line {line} in the dataset"))?;

            let stations: Vec<_> = railway
                .stations
                .iter()
                .filter_map(|id| provider.get_station(id))
                .collect();
            let lookup = StationLookup::from_stations(stations.iter().map(|s| &**s));
            if app_key.is_none() {
                warn!("no TfL app key, requests may be rate limited");
            }

            let fetcher = HttpFetcher::new(Duration::from_secs(20))?;
            let feed = ArrivalsFeed::new(line).with_app_key(app_key);
            let tracker = LiveTracker::new(feed, fetcher, railway, lookup, config.live);

            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .context("Failed to start runtime")?;
            runtime.block_on(live(tracker, Duration::from_secs(interval.max(1)), polls));
            Ok(())
        }
    }
}

fn playback(engine: &mut Engine<SimulationClock>, until: f64, step: f64) {
    let mut t = engine.now();
    while t <= until {
        engine.run_until(t);
        engine.tick();

        for event in engine.drain_events() {
            match event {
                LifecycleEvent::Started { vehicle, at } => info!(%vehicle, at, "started"),
                LifecycleEvent::Retired { vehicle, at } => info!(%vehicle, at, "retired"),
                LifecycleEvent::Advanced { vehicle, section, at } => {
                    debug!(%vehicle, index = section.index, length = section.length, at, "advanced")
                }
            }
        }
        for position in engine.positions() {
            info!(
                vehicle = %position.vehicle,
                section = position.position.section.index,
                progress = position.position.progress,
                "position"
            );
        }
        t += step;
    }
}

async fn live(mut tracker: LiveTracker<HttpFetcher>, interval: Duration, polls: Option<u64>) {
    let mut ticker = tokio::time::interval(interval);
    let mut count = 0;
    loop {
        ticker.tick().await;
        let now = chrono::Utc::now().timestamp_millis() as f64;

        // Failures are logged by the tracker; positions keep extrapolating
        if tracker.poll(now).await.is_ok() {
            for (record, position) in tracker.estimator().positions(now) {
                info!(
                    vehicle = %record.vehicle_id,
                    to = %record.arrival_station,
                    section = position.section.index,
                    progress = position.progress,
                    destination = record.destination.as_deref().unwrap_or("-"),
                    "position"
                );
            }
        }

        count += 1;
        if polls.is_some_and(|limit| count >= limit) {
            break;
        }
    }
}

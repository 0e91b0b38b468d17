//! Ambient Context Agent CLI
//!
//! Digital twin resolution and ambient sample aggregation for IoT device
//! event streams.

use ambient_context_agent::{
    config::Config,
    resolver::{BlockingResolver, StoryOptions, StorySource, TwinOptions},
    sampling::{IndicatorLevel, IndicatorThresholds},
    stats::create_shared_stats,
    stream::{DeviceSignature, Emulator, EmulatorConfig},
    tracker::{AmbientTracker, DeviceSummary, OccupancyTally},
    VERSION,
};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "ambient-context")]
#[command(version = VERSION)]
#[command(about = "Digital twin resolution and ambient sample aggregation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch an emulated dynamb stream and display ambient context
    Watch {
        /// Directory service base URL (defaults to the configured one)
        #[arg(long)]
        server: Option<String>,

        /// Sample window horizon in seconds
        #[arg(long)]
        horizon: Option<u64>,

        /// Stop after this many seconds (runs until Ctrl+C if omitted)
        #[arg(long)]
        duration: Option<u64>,
    },

    /// Resolve a device's digital twin
    Resolve {
        /// Device signature (deviceId/deviceIdType, e.g. aabbccddeeff/2)
        signature: String,

        /// Directory service base URL (defaults to the configured one)
        #[arg(long)]
        server: Option<String>,

        /// Resolve associations only, without fetching the story
        #[arg(long)]
        skip_story: bool,

        /// Also fetch the device's real-time context
        #[arg(long)]
        context: bool,
    },

    /// Resolve a story document by URL
    Story {
        /// Story URL
        url: String,

        /// Bypass the story cache
        #[arg(long)]
        force: bool,
    },

    /// Show configuration
    Config,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Watch {
            server,
            horizon,
            duration,
        } => {
            cmd_watch(server, horizon, duration);
        }
        Commands::Resolve {
            signature,
            server,
            skip_story,
            context,
        } => {
            cmd_resolve(&signature, server, skip_story, context);
        }
        Commands::Story { url, force } => {
            cmd_story(&url, force);
        }
        Commands::Config => {
            cmd_config();
        }
    }
}

fn cmd_watch(server: Option<String>, horizon: Option<u64>, duration: Option<u64>) {
    println!("Ambient Context Agent v{VERSION}");
    println!();

    let mut config = Config::load().unwrap_or_default();
    if let Some(server) = server {
        config.server_url = server;
    }
    if let Some(horizon) = horizon {
        config.sample_horizon = Duration::from_secs(horizon);
    }

    let resolver = match BlockingResolver::new(config.server_url.clone()) {
        Ok(resolver) => resolver,
        Err(e) => {
            eprintln!("Error creating resolver runtime: {e}");
            std::process::exit(1);
        }
    };

    println!("Watching emulated dynamb stream...");
    println!("  Directory service: {}", config.server_url);
    println!("  Sample horizon: {}s", config.sample_horizon.as_secs());
    println!("  Eviction interval: {}s", config.eviction_interval.as_secs());
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let mut emulator = Emulator::new(EmulatorConfig {
        cycle: config.emulator_cycle,
        ..EmulatorConfig::default()
    });
    if let Err(e) = emulator.start() {
        eprintln!("Error starting emulator: {e}");
        std::process::exit(1);
    }

    let mut tracker = AmbientTracker::new();
    let stats = create_shared_stats();

    let sample_horizon = chrono::Duration::milliseconds(config.sample_horizon.as_millis() as i64);
    let max_stale = chrono::Duration::milliseconds(config.max_stale.as_millis() as i64);

    // Set up Ctrl+C handler
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .expect("Error setting Ctrl+C handler");

    let receiver = emulator.receiver().clone();
    let started = std::time::Instant::now();
    let mut last_eviction = std::time::Instant::now();
    let mut last_display = std::time::Instant::now();

    while running.load(Ordering::SeqCst) {
        if let Some(limit) = duration {
            if started.elapsed() >= Duration::from_secs(limit) {
                break;
            }
        }

        match receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(event) => {
                stats.record_dynamb_event();
                let is_new_device = tracker.handle_dynamb(&event);

                if is_new_device {
                    stats.record_device_seen();
                    let signature = event.signature();
                    println!("[{}] Discovered {}", timestamp(), signature);

                    // One resolution attempt per device per session; a miss
                    // is not cached, so a restart retries naturally.
                    match resolver
                        .resolve_digital_twin(&signature.to_string(), TwinOptions::default())
                    {
                        Some(twin) => {
                            stats.record_twin_resolved();
                            if let Some(title) = twin.title() {
                                println!("[{}]   resolved as \"{title}\"", timestamp());
                            }
                            tracker.attach_twin(&signature, twin);
                        }
                        None => {
                            tracing::debug!(%signature, "no digital twin resolved");
                        }
                    }
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                eprintln!("Emulator disconnected unexpectedly");
                break;
            }
        }

        if last_eviction.elapsed() >= config.eviction_interval {
            let evicted = tracker.evict_stale(Utc::now(), sample_horizon);
            if evicted > 0 {
                stats.record_samples_evicted(evicted as u64);
                tracing::debug!(evicted, "evicted stale samples");
            }
            last_eviction = std::time::Instant::now();
        }

        if last_display.elapsed() >= config.display_interval {
            print_ambient_display(&tracker, stats.stats().events_per_second, max_stale);
            last_display = std::time::Instant::now();
        }
    }

    println!();
    println!("Stopping...");
    emulator.stop();

    print_ambient_display(&tracker, stats.stats().events_per_second, max_stale);
    println!();
    println!("{}", stats.summary());
}

fn cmd_resolve(signature: &str, server: Option<String>, skip_story: bool, context: bool) {
    let signature: DeviceSignature = match signature.parse() {
        Ok(signature) => signature,
        Err(e) => {
            eprintln!("Error: invalid device signature: {e}");
            std::process::exit(1);
        }
    };

    let config = Config::load().unwrap_or_default();
    let server_url = server.unwrap_or(config.server_url);
    let resolver = match BlockingResolver::new(server_url.clone()) {
        Ok(resolver) => resolver,
        Err(e) => {
            eprintln!("Error creating resolver runtime: {e}");
            std::process::exit(1);
        }
    };

    let options = TwinOptions {
        fetch_story: !skip_story,
        force_refetch: false,
    };

    match resolver.resolve_digital_twin(&signature.to_string(), options) {
        Some(twin) => {
            if let Some(title) = twin.title() {
                println!("{title}");
            }
            match serde_json::to_string_pretty(&twin) {
                Ok(json) => println!("{json}"),
                Err(e) => eprintln!("Error serializing twin: {e}"),
            }
        }
        None => {
            eprintln!("No associations resolved for {signature}");
            eprintln!("(The device may be unknown to {server_url}, or the service unreachable.)");
            std::process::exit(1);
        }
    }

    if context {
        match resolver.resolve_context(&signature.to_string()) {
            Some(device_context) => {
                if let Some(nearest) = device_context.nearest_device() {
                    println!();
                    println!("Nearest device: {nearest}");
                }
                if let Some(url) = device_context.story_url() {
                    println!("Context story URL: {url}");
                }
            }
            None => {
                eprintln!("No real-time context available for {signature}");
            }
        }
    }
}

fn cmd_story(url: &str, force: bool) {
    let config = Config::load().unwrap_or_default();
    let resolver = match BlockingResolver::new(config.server_url.clone()) {
        Ok(resolver) => resolver,
        Err(e) => {
            eprintln!("Error creating resolver runtime: {e}");
            std::process::exit(1);
        }
    };

    let options = StoryOptions {
        force_refetch: force,
    };

    match resolver.resolve_story(url, options) {
        Some((story, source)) => {
            if source == StorySource::Cache {
                println!("(from cache)");
            }
            if let Some(title) = story.title() {
                println!("Title: {title}");
            }
            if let Some(image_url) = story.image_url() {
                println!("Image: {image_url}");
            }
            match serde_json::to_string_pretty(story.as_value()) {
                Ok(json) => println!("{json}"),
                Err(e) => eprintln!("Error serializing story: {e}"),
            }
        }
        None => {
            eprintln!("No story resolved from {url}");
            std::process::exit(1);
        }
    }
}

fn cmd_config() {
    let config = Config::load().unwrap_or_default();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
    );
}

/// Print the current ambient context compilation.
fn print_ambient_display(tracker: &AmbientTracker, events_per_second: f64, max_stale: chrono::Duration) {
    let now = Utc::now();
    let summaries = tracker.summaries(now, max_stale);

    println!(
        "[{}] {} devices | {:.1} events/s",
        timestamp(),
        tracker.device_count(),
        events_per_second
    );

    for summary in &summaries {
        println!("  {}", format_device_line(summary));
    }

    let occupancy = tracker.occupancy();
    if !occupancy.is_empty() {
        println!("  {}", format_occupancy(&occupancy));
    }
    println!();
}

/// Render one device summary as a display line.
fn format_device_line(summary: &DeviceSummary) -> String {
    let mut line = String::new();

    match &summary.title {
        Some(title) => line.push_str(&format!("{} ({})", title, summary.signature)),
        None => line.push_str(&summary.signature.to_string()),
    }
    if !summary.tags.is_empty() {
        line.push_str(&format!(" [{}]", summary.tags.join(", ")));
    }
    if summary.is_stale {
        line.push_str(" (stale)");
    }

    for (property, aggregate) in &summary.aggregates {
        let rendered = match (
            IndicatorThresholds::for_property(property),
            aggregate.average,
        ) {
            (Some(thresholds), Some(average)) => {
                let marker = match thresholds.classify(average) {
                    IndicatorLevel::Normal => "",
                    IndicatorLevel::Below => " (low)",
                    IndicatorLevel::Above => " (high)",
                };
                format!(
                    "  {property}: {}{marker} (avg of {})",
                    thresholds.format(average),
                    aggregate.count
                )
            }
            _ => format!("  {property}: {}", aggregate.latest_value),
        };
        line.push_str(&rendered);
    }

    line
}

/// Render the occupancy tallies as a display line.
fn format_occupancy(occupancy: &OccupancyTally) -> String {
    format!(
        "Occupancy: chairs {}/{} | desks {}/{} | rooms {}/{}",
        occupancy.chairs.occupied,
        occupancy.chairs.total(),
        occupancy.desks.occupied,
        occupancy.desks.total(),
        occupancy.rooms.occupied,
        occupancy.rooms.total()
    )
}

/// Current wall-clock time for display.
fn timestamp() -> String {
    Utc::now().format("%H:%M:%S").to_string()
}

//! Demonstration of the ambient context pipeline, fully offline.
//!
//! This example shows how to:
//! 1. Start the dynamb emulator
//! 2. Feed events into the ambient tracker
//! 3. Evict stale samples on a timer
//! 4. Read per-property aggregates back out
//!
//! Run with: cargo run --example ambient_demo
//!
//! No directory service is contacted; digital twin resolution is covered
//! by the `watch` and `resolve` CLI commands.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ambient_context_agent::{
    sampling::IndicatorThresholds,
    stats::StreamStats,
    stream::{Emulator, EmulatorConfig},
    tracker::AmbientTracker,
};
use chrono::Utc;

fn main() {
    println!("Ambient Context Agent - Stream Demo");
    println!("===================================");
    println!();

    let mut emulator = Emulator::new(EmulatorConfig {
        cycle: Duration::from_millis(1_200),
        ..EmulatorConfig::default()
    });
    let mut tracker = AmbientTracker::new();
    let stats = StreamStats::new();

    println!("Emulating a dynamb stream for 20 seconds...");
    println!();

    if let Err(e) = emulator.start() {
        eprintln!("Error starting emulator: {e}");
        return;
    }

    // Set up Ctrl+C handler
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .expect("Error setting Ctrl+C handler");

    let horizon = chrono::Duration::seconds(10);
    let start = std::time::Instant::now();
    let receiver = emulator.receiver().clone();
    let mut last_eviction = std::time::Instant::now();

    while running.load(Ordering::SeqCst) && start.elapsed() < Duration::from_secs(20) {
        match receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(event) => {
                stats.record_dynamb_event();
                let signature = event.signature();

                if tracker.handle_dynamb(&event) {
                    stats.record_device_seen();
                    println!("  Discovered {signature}");
                }

                for (property, value) in &event.properties {
                    println!("    {signature}  {property} = {value}");
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        }

        if last_eviction.elapsed() >= Duration::from_secs(5) {
            let evicted = tracker.evict_stale(Utc::now(), horizon);
            if evicted > 0 {
                stats.record_samples_evicted(evicted as u64);
                println!("  (evicted {evicted} stale samples)");
            }
            last_eviction = std::time::Instant::now();
        }
    }

    println!();
    println!("Stopping emulator...");
    emulator.stop();

    println!();
    println!("=== Final Aggregates ===");
    for summary in tracker.summaries(Utc::now(), chrono::Duration::seconds(60)) {
        println!("  {}", summary.signature);
        for (property, aggregate) in &summary.aggregates {
            match (
                IndicatorThresholds::for_property(property),
                aggregate.average,
            ) {
                (Some(thresholds), Some(average)) => {
                    println!(
                        "    {property}: {} (avg of {})",
                        thresholds.format(average),
                        aggregate.count
                    );
                }
                _ => {
                    println!(
                        "    {property}: {} ({} samples)",
                        aggregate.latest_value, aggregate.count
                    );
                }
            }
        }
    }

    println!();
    println!("{}", stats.summary());
    println!();
    println!("Demo complete!");
}

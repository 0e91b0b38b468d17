//! Ambient Context Agent - digital twin resolution and sample aggregation
//! for IoT device event streams.
//!
//! This library consumes a stream of dynamic ambient (dynamb) events and
//! turns them into context a display layer can render: resolved device
//! metadata ("digital twins") and bounded-recency aggregates of sensor
//! readings.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Ambient Context Agent                     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐       │
//! │  │   Stream    │──▶│   Tracker   │──▶│  Sampling   │       │
//! │  │ (emulator)  │   │ (per-device)│   │  (windows)  │       │
//! │  └─────────────┘   └─────────────┘   └─────────────┘       │
//! │                           │                                 │
//! │                           ▼                                 │
//! │                    ┌─────────────┐   ┌─────────────┐       │
//! │                    │  Resolver   │──▶│  Directory  │       │
//! │                    │ (twin cache)│   │   service   │       │
//! │                    └─────────────┘   └─────────────┘       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use ambient_context_agent::{AssociationResolver, TwinOptions};
//!
//! # async fn example() {
//! let resolver = AssociationResolver::new("http://localhost:3001");
//!
//! // Resolve a device's associations and story in one call; a `None`
//! // means "temporarily unknown", never a cached failure.
//! if let Some(twin) = resolver
//!     .resolve_digital_twin("aabbccddeeff/2", TwinOptions::default())
//!     .await
//! {
//!     println!("{}", twin.title().unwrap_or("(untitled device)"));
//! }
//! # }
//! ```

pub mod config;
pub mod resolver;
pub mod sampling;
pub mod stats;
pub mod stream;
pub mod tracker;

// Re-export key types at crate root for convenience
pub use config::{Config, ConfigError};
pub use resolver::{
    AssociationResolver, Associations, BlockingResolver, DeviceContext, DigitalTwin,
    Story, StoryOptions, StorySource, TwinOptions,
};
pub use sampling::{IndicatorLevel, IndicatorThresholds, Sample, SampleAggregate, SampleWindow};
pub use stats::{create_shared_stats, SharedStreamStats, StreamStats, StreamStatsSnapshot};
pub use stream::{
    DeviceSignature, DynambEvent, EmulatedDevice, Emulator, EmulatorConfig, EmulatorError,
    PropertyValue, SignatureError,
};
pub use tracker::{AmbientTracker, AssetTally, DeviceSummary, OccupancyTally};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

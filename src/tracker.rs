//! Ambient context compilation from the dynamb stream.
//!
//! The tracker maintains one entry per device seen on the stream: its
//! sliding sample windows, latest-event bookkeeping, motion state and,
//! once resolved, its digital twin. It produces the per-device summaries
//! and occupancy tallies that the watch display renders.

use crate::resolver::types::DigitalTwin;
use crate::sampling::aggregate::SampleAggregate;
use crate::sampling::window::SampleWindow;
use crate::stream::types::{DeviceSignature, DynambEvent};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Dynamb property carrying motion detection flags.
const MOTION_PROPERTY: &str = "isMotionDetected";

/// Tags that participate in the occupancy tallies.
const CHAIR_TAG: &str = "chair";
const DESK_TAG: &str = "desk";
const ROOM_TAG: &str = "room";

/// Live state for one device on the stream.
#[derive(Debug, Default)]
struct DeviceState {
    windows: SampleWindow,
    last_event: Option<DateTime<Utc>>,
    twin: Option<DigitalTwin>,
    /// Latest motion assertion, when the device reports one
    motion: Option<bool>,
}

/// Per-device compilation of the ambient context.
#[derive(Debug, Default)]
pub struct AmbientTracker {
    devices: BTreeMap<DeviceSignature, DeviceState>,
}

impl AmbientTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a dynamb event into the compilation.
    ///
    /// Returns true when the device was not previously seen, so the caller
    /// can trigger digital twin resolution for it.
    pub fn handle_dynamb(&mut self, event: &DynambEvent) -> bool {
        let signature = event.signature();
        let observed_at = event.observed_at();
        let is_new_device = !self.devices.contains_key(&signature);

        let state = self.devices.entry(signature).or_default();
        for (property, value) in &event.properties {
            state.windows.add_sample(property, value.clone(), observed_at);
        }
        if let Some(value) = event.properties.get(MOTION_PROPERTY) {
            state.motion = Some(value.is_asserted());
        }
        if state.last_event.map_or(true, |last| observed_at > last) {
            state.last_event = Some(observed_at);
        }

        is_new_device
    }

    /// Attach a resolved digital twin to a device.
    pub fn attach_twin(&mut self, signature: &DeviceSignature, twin: DigitalTwin) {
        if let Some(state) = self.devices.get_mut(signature) {
            state.twin = Some(twin);
        }
    }

    /// Evict stale samples from every device's windows.
    ///
    /// Devices themselves are retained; summaries carry a staleness flag
    /// instead so a quiet device stays visible.
    pub fn evict_stale(&mut self, now: DateTime<Utc>, horizon: Duration) -> usize {
        self.devices
            .values_mut()
            .map(|state| state.windows.evict_stale(now, horizon))
            .sum()
    }

    /// Number of devices seen so far.
    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// Per-device summaries for display, ordered by signature.
    pub fn summaries(&self, now: DateTime<Utc>, max_stale: Duration) -> Vec<DeviceSummary> {
        self.devices
            .iter()
            .map(|(signature, state)| {
                let aggregates = state
                    .windows
                    .properties()
                    .filter_map(|property| {
                        state
                            .windows
                            .aggregate(property)
                            .map(|aggregate| (property.to_string(), aggregate))
                    })
                    .collect();

                let tags = state
                    .twin
                    .as_ref()
                    .and_then(|twin| twin.associations.tags.clone())
                    .unwrap_or_default();

                DeviceSummary {
                    signature: signature.clone(),
                    title: state
                        .twin
                        .as_ref()
                        .and_then(|twin| twin.title())
                        .map(|title| title.to_string()),
                    tags,
                    aggregates,
                    last_event: state.last_event,
                    is_stale: state
                        .last_event
                        .map_or(true, |last| now - last > max_stale),
                }
            })
            .collect()
    }

    /// Occupancy tallies over the tagged, motion-reporting devices.
    pub fn occupancy(&self) -> OccupancyTally {
        let mut tally = OccupancyTally::default();

        for state in self.devices.values() {
            let Some(is_occupied) = state.motion else {
                continue;
            };
            let Some(twin) = &state.twin else {
                continue;
            };

            if twin.associations.has_tag(CHAIR_TAG) {
                tally.chairs.record(is_occupied);
            }
            if twin.associations.has_tag(DESK_TAG) {
                tally.desks.record(is_occupied);
            }
            if twin.associations.has_tag(ROOM_TAG) {
                tally.rooms.record(is_occupied);
            }
        }

        tally
    }
}

/// Display summary for one device.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceSummary {
    pub signature: DeviceSignature,
    /// Story title, when a twin has been resolved
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub tags: Vec<String>,
    pub aggregates: Vec<(String, SampleAggregate)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_event: Option<DateTime<Utc>>,
    pub is_stale: bool,
}

/// Occupied/available counts for one asset tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AssetTally {
    pub occupied: u32,
    pub available: u32,
}

impl AssetTally {
    fn record(&mut self, is_occupied: bool) {
        if is_occupied {
            self.occupied += 1;
        } else {
            self.available += 1;
        }
    }

    /// Total number of tallied assets.
    pub fn total(&self) -> u32 {
        self.occupied + self.available
    }
}

/// Occupancy tallies for the well-known asset tags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OccupancyTally {
    pub chairs: AssetTally,
    pub desks: AssetTally,
    pub rooms: AssetTally,
}

impl OccupancyTally {
    /// Whether no tagged, motion-reporting device has been tallied.
    pub fn is_empty(&self) -> bool {
        self.chairs.total() == 0 && self.desks.total() == 0 && self.rooms.total() == 0
    }
}

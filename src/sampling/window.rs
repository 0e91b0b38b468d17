//! Sliding time windows of dynamb samples, per property.
//!
//! Samples accumulate as events arrive and are evicted on a periodic tick
//! rather than on insertion, so a quiet property still ages out. After an
//! eviction at time `now` with horizon `h`, every retained sample
//! satisfies `timestamp > now - h`; a property whose window empties is
//! removed entirely.

use crate::sampling::aggregate::SampleAggregate;
use crate::stream::types::PropertyValue;
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;

/// One observed value of one property.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub value: PropertyValue,
    pub timestamp: DateTime<Utc>,
}

/// Bounded-recency samples for the properties of one device.
#[derive(Debug, Clone, Default)]
pub struct SampleWindow {
    windows: BTreeMap<String, Vec<Sample>>,
}

impl SampleWindow {
    /// Create an empty window set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sample to the given property's window.
    pub fn add_sample(
        &mut self,
        property: &str,
        value: PropertyValue,
        timestamp: DateTime<Utc>,
    ) {
        self.windows
            .entry(property.to_string())
            .or_default()
            .push(Sample { value, timestamp });
    }

    /// Evict every sample at or beyond the horizon, across all properties.
    ///
    /// Returns the number of samples evicted. Not triggered by
    /// `add_sample`; call this from a recurring timer.
    pub fn evict_stale(&mut self, now: DateTime<Utc>, horizon: Duration) -> usize {
        let threshold = now - horizon;
        let mut evicted = 0;

        self.windows.retain(|_, samples| {
            let before = samples.len();
            samples.retain(|sample| sample.timestamp > threshold);
            evicted += before - samples.len();
            !samples.is_empty()
        });

        evicted
    }

    /// Aggregate the given property's window for display.
    ///
    /// `None` when the property has no samples. The average covers numeric
    /// samples only; flag and vector properties expose count and latest
    /// value alone.
    pub fn aggregate(&self, property: &str) -> Option<SampleAggregate> {
        let samples = self.windows.get(property)?;
        let latest = samples
            .iter()
            .max_by_key(|sample| sample.timestamp)?;

        let numeric: Vec<f64> = samples
            .iter()
            .filter_map(|sample| sample.value.as_number())
            .collect();
        let average = if numeric.is_empty() {
            None
        } else {
            Some(numeric.iter().sum::<f64>() / numeric.len() as f64)
        };

        Some(SampleAggregate {
            count: samples.len(),
            average,
            latest_value: latest.value.clone(),
            latest_timestamp: latest.timestamp,
        })
    }

    /// The properties currently holding samples.
    pub fn properties(&self) -> impl Iterator<Item = &str> {
        self.windows.keys().map(|property| property.as_str())
    }

    /// Whether no property holds any samples.
    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Total number of retained samples across all properties.
    pub fn sample_count(&self) -> usize {
        self.windows.values().map(|samples| samples.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at_millis(millis: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(millis).unwrap()
    }

    #[test]
    fn test_eviction_keeps_recent_samples_only() {
        let mut window = SampleWindow::new();
        for millis in [0, 5_000, 10_000] {
            window.add_sample(
                "temperature",
                PropertyValue::Number(20.0),
                at_millis(millis),
            );
        }

        let evicted = window.evict_stale(at_millis(11_000), Duration::milliseconds(6_000));

        assert_eq!(evicted, 2);
        let aggregate = window.aggregate("temperature").unwrap();
        assert_eq!(aggregate.count, 1);
        assert_eq!(aggregate.latest_timestamp, at_millis(10_000));
    }

    #[test]
    fn test_eviction_removes_emptied_properties() {
        let mut window = SampleWindow::new();
        window.add_sample("illuminance", PropertyValue::Number(400.0), at_millis(0));
        window.add_sample(
            "temperature",
            PropertyValue::Number(21.0),
            at_millis(9_000),
        );

        window.evict_stale(at_millis(10_000), Duration::milliseconds(5_000));

        assert!(window.aggregate("illuminance").is_none());
        assert_eq!(window.properties().collect::<Vec<_>>(), vec!["temperature"]);
        assert_eq!(window.sample_count(), 1);
    }

    #[test]
    fn test_numeric_aggregate_average() {
        let mut window = SampleWindow::new();
        window.add_sample("temperature", PropertyValue::Number(20.0), at_millis(0));
        window.add_sample("temperature", PropertyValue::Number(22.0), at_millis(1));

        let aggregate = window.aggregate("temperature").unwrap();
        assert_eq!(aggregate.count, 2);
        assert_eq!(aggregate.average, Some(21.0));
        assert_eq!(aggregate.latest_value, PropertyValue::Number(22.0));
        assert_eq!(aggregate.latest_timestamp, at_millis(1));
    }

    #[test]
    fn test_flag_aggregate_has_no_average() {
        let mut window = SampleWindow::new();
        window.add_sample(
            "isButtonPressed",
            PropertyValue::BooleanArray(vec![true]),
            at_millis(100),
        );
        window.add_sample(
            "isButtonPressed",
            PropertyValue::BooleanArray(vec![false]),
            at_millis(200),
        );

        let aggregate = window.aggregate("isButtonPressed").unwrap();
        assert_eq!(aggregate.count, 2);
        assert_eq!(aggregate.average, None);
        assert!(!aggregate.latest_value.is_asserted());
    }

    #[test]
    fn test_aggregate_of_unknown_property() {
        let window = SampleWindow::new();
        assert!(window.aggregate("temperature").is_none());
        assert!(window.is_empty());
    }
}

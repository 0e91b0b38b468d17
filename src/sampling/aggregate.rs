//! Display aggregates and indicator classification for sample windows.

use crate::stream::types::PropertyValue;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Aggregate view of one property's sample window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleAggregate {
    /// Number of retained samples
    pub count: usize,
    /// Mean of the numeric samples, when any exist
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average: Option<f64>,
    /// Most recently observed value
    pub latest_value: PropertyValue,
    /// Timestamp of the most recent sample
    pub latest_timestamp: DateTime<Utc>,
}

/// Classification of an averaged reading against indicator thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorLevel {
    Below,
    Normal,
    Above,
}

/// Comfort thresholds and display formatting for a numeric property.
#[derive(Debug, Clone)]
pub struct IndicatorThresholds {
    pub min: f64,
    pub max: f64,
    /// Decimal places shown when formatting a reading
    pub precision_digits: usize,
    /// Unit suffix appended to the formatted reading
    pub suffix: &'static str,
}

impl IndicatorThresholds {
    /// Thresholds for the well-known environmental properties, when any.
    pub fn for_property(property: &str) -> Option<Self> {
        match property {
            "temperature" => Some(Self {
                min: 19.0,
                max: 23.0,
                precision_digits: 1,
                suffix: "\u{2103}",
            }),
            "relativeHumidity" => Some(Self {
                min: 20.0,
                max: 80.0,
                precision_digits: 0,
                suffix: "%",
            }),
            "illuminance" => Some(Self {
                min: 300.0,
                max: 500.0,
                precision_digits: 0,
                suffix: " lux",
            }),
            _ => None,
        }
    }

    /// Classify a reading against the thresholds.
    pub fn classify(&self, value: f64) -> IndicatorLevel {
        if value < self.min {
            IndicatorLevel::Below
        } else if value > self.max {
            IndicatorLevel::Above
        } else {
            IndicatorLevel::Normal
        }
    }

    /// Render a reading with this indicator's precision and unit.
    pub fn format(&self, value: f64) -> String {
        format!(
            "{value:.precision$}{suffix}",
            precision = self.precision_digits,
            suffix = self.suffix
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_bounds() {
        let thresholds = IndicatorThresholds::for_property("temperature").unwrap();
        assert_eq!(thresholds.classify(18.9), IndicatorLevel::Below);
        assert_eq!(thresholds.classify(19.0), IndicatorLevel::Normal);
        assert_eq!(thresholds.classify(23.0), IndicatorLevel::Normal);
        assert_eq!(thresholds.classify(23.1), IndicatorLevel::Above);
    }

    #[test]
    fn test_formatting_precision_and_suffix() {
        let temperature = IndicatorThresholds::for_property("temperature").unwrap();
        assert_eq!(temperature.format(21.04), "21.0\u{2103}");

        let illuminance = IndicatorThresholds::for_property("illuminance").unwrap();
        assert_eq!(illuminance.format(412.6), "413 lux");
    }

    #[test]
    fn test_unknown_property_has_no_thresholds() {
        assert!(IndicatorThresholds::for_property("acceleration").is_none());
    }
}

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Selects which part of a beacon becomes the field key of the written point.
///
/// The other part becomes the measurement name. The field value is always the integer `1`.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldLayout {
    /// The metric key is the measurement, the reported value is the field key.
    #[default]
    Value,
    /// The reported value is the measurement, the metric key is the field key.
    Key,
}

impl fmt::Display for FieldLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value => f.write_str("value"),
            Self::Key => f.write_str("key"),
        }
    }
}

/// The precision of timestamps written to the time series store.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Deserialize, Serialize)]
pub enum TimestampPrecision {
    /// Whole seconds.
    #[serde(rename = "s")]
    Seconds,
    /// Milliseconds.
    #[default]
    #[serde(rename = "ms")]
    Milliseconds,
}

impl TimestampPrecision {
    /// Returns the precision as passed to the write API.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Seconds => "s",
            Self::Milliseconds => "ms",
        }
    }

    /// Converts a point in time into a timestamp of this precision.
    pub fn timestamp(self, time: DateTime<Utc>) -> i64 {
        match self {
            Self::Seconds => time.timestamp(),
            Self::Milliseconds => time.timestamp_millis(),
        }
    }
}

impl fmt::Display for TimestampPrecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Measurement and field key of a single beacon.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Placement<'a> {
    /// The measurement name.
    pub measurement: &'a str,
    /// The key of the integer field.
    pub field: &'a str,
}

/// Describes how beacons map onto time series points.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DataLayout {
    /// Which part of the beacon is written as field key.
    pub field: FieldLayout,
    /// The timestamp precision of written points.
    pub precision: TimestampPrecision,
}

impl DataLayout {
    /// Places a beacon's key and value into measurement and field.
    pub fn place<'a>(&self, key: &'a str, value: &'a str) -> Placement<'a> {
        match self.field {
            FieldLayout::Value => Placement {
                measurement: key,
                field: value,
            },
            FieldLayout::Key => Placement {
                measurement: value,
                field: key,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layout() {
        let layout = DataLayout::default();

        assert_eq!(
            layout.place("installAction", "install"),
            Placement {
                measurement: "installAction",
                field: "install"
            }
        );
        assert_eq!(layout.precision, TimestampPrecision::Milliseconds);
    }

    #[test]
    fn test_swapped_layout_from_config() {
        let layout: DataLayout =
            serde_json::from_str(r#"{"field": "key", "precision": "s"}"#).unwrap();

        assert_eq!(
            layout.place("installAction", "install"),
            Placement {
                measurement: "install",
                field: "installAction"
            }
        );
        assert_eq!(layout.precision.as_str(), "s");
    }

    #[test]
    fn test_precision_timestamp() {
        let time = DateTime::from_timestamp(1_700_000_000, 123_000_000).unwrap();

        assert_eq!(TimestampPrecision::Seconds.timestamp(time), 1_700_000_000);
        assert_eq!(
            TimestampPrecision::Milliseconds.timestamp(time),
            1_700_000_000_123
        );
    }
}

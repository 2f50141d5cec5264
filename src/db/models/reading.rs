//! Sensor reading data model.
//!
//! One `Sample` per transport message, stamped with the ingestion clock.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single proximity/volume observation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    /// Row id, assigned by the store on append.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub timestamp: DateTime<Utc>,
    /// Millimetres; lower is closer.
    pub distance: i64,
    pub volume: i64,
    pub frequency: Option<f64>,
    pub note: Option<String>,
    pub octave: Option<i32>,
}

impl Sample {
    pub fn new(timestamp: DateTime<Utc>, distance: i64, volume: i64) -> Self {
        Self {
            id: None,
            timestamp,
            distance,
            volume,
            frequency: None,
            note: None,
            octave: None,
        }
    }

    /// Maps distance onto a 0-100 closeness scale for charting.
    pub fn proximity(&self, threshold: i64, scale: f64) -> f64 {
        proximity(self.distance, threshold, scale)
    }
}

/// `clamp(0, 100, (threshold - distance) / scale)`.
pub fn proximity(distance: i64, threshold: i64, scale: f64) -> f64 {
    if scale <= 0.0 {
        return 0.0;
    }
    ((threshold - distance) as f64 / scale).clamp(0.0, 100.0)
}

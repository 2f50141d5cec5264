//! Normalizes raw transport payloads into [`Sample`]s.
//!
//! Devices publish either a JSON object or a free-form debug line such as
//! `distance: 182 volume: 171 frequency: 262 note: C octave: 4`. Both shapes
//! end up as the same `Sample`, stamped with the ingestion clock.

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::Sample;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IngestError {
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

/// A normalized sample plus the presence flag some devices compute on board.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestedReading {
    pub sample: Sample,
    pub presence_hint: Option<bool>,
}

/// Shape of an incoming payload, decided before any field is parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payload<'a> {
    Json(&'a str),
    Text(&'a str),
}

impl<'a> Payload<'a> {
    pub fn classify(raw: &'a str) -> Self {
        match raw.trim_start().chars().next() {
            Some('{') => Payload::Json(raw),
            _ => Payload::Text(raw),
        }
    }
}

pub fn ingest(raw: &str, now: DateTime<Utc>) -> Result<IngestedReading, IngestError> {
    match Payload::classify(raw) {
        Payload::Json(body) => ingest_json(body, now),
        Payload::Text(line) => ingest_text(line, now),
    }
}

/// Names a device uses for the canonical `distance` and `volume` fields.
///
/// The pigeon feeder logs `{"sensor": N}` lines, which map with
/// `{"distance": "sensor", "volume": null}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldMapping {
    pub distance: String,
    /// `None` for devices without a microphone; their readings carry volume 0.
    pub volume: Option<String>,
}

impl Default for FieldMapping {
    fn default() -> Self {
        Self {
            distance: "distance".into(),
            volume: Some("volume".into()),
        }
    }
}

impl FieldMapping {
    pub fn is_identity(&self) -> bool {
        *self == Self::default()
    }

    /// Renames a JSON object's fields to the canonical names. Text lines and
    /// unparseable bodies pass through untouched.
    pub fn apply(&self, raw: &str) -> String {
        if self.is_identity() {
            return raw.to_owned();
        }
        let Payload::Json(body) = Payload::classify(raw) else {
            return raw.to_owned();
        };
        let Ok(serde_json::Value::Object(mut fields)) = serde_json::from_str(body) else {
            return raw.to_owned();
        };

        if self.distance != "distance" {
            if let Some(value) = fields.remove(&self.distance) {
                fields.insert("distance".into(), value);
            }
        }
        match &self.volume {
            Some(name) if name != "volume" => {
                if let Some(value) = fields.remove(name) {
                    fields.insert("volume".into(), value);
                }
            }
            Some(_) => {}
            None => {
                fields
                    .entry("volume")
                    .or_insert(serde_json::Value::from(0));
            }
        }
        serde_json::Value::Object(fields).to_string()
    }
}

#[derive(Debug, Deserialize)]
struct JsonReading {
    distance: Option<i64>,
    volume: Option<i64>,
    frequency: Option<f64>,
    note: Option<String>,
    octave: Option<i32>,
    presence: Option<bool>,
}

pub fn ingest_json(body: &str, now: DateTime<Utc>) -> Result<IngestedReading, IngestError> {
    let parsed: JsonReading = serde_json::from_str(body)
        .map_err(|err| IngestError::MalformedPayload(format!("invalid JSON: {err}")))?;

    let (distance, volume) = match (parsed.distance, parsed.volume) {
        (Some(distance), Some(volume)) => (distance, volume),
        _ => {
            return Err(IngestError::MalformedPayload(
                "distance and volume are required".into(),
            ))
        }
    };

    Ok(IngestedReading {
        sample: Sample {
            id: None,
            timestamp: now,
            distance,
            volume,
            frequency: parsed.frequency,
            note: parsed.note,
            octave: parsed.octave,
        },
        presence_hint: parsed.presence,
    })
}

struct TextPatterns {
    distance: Regex,
    volume: Regex,
    frequency: Regex,
    note: Regex,
    octave: Regex,
}

fn patterns() -> &'static TextPatterns {
    static PATTERNS: OnceLock<TextPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| TextPatterns {
        distance: Regex::new(r"distance: (\d+)").expect("valid distance pattern"),
        volume: Regex::new(r"volume: (\d+)").expect("valid volume pattern"),
        frequency: Regex::new(r"frequency: (\d+)").expect("valid frequency pattern"),
        note: Regex::new(r"note: ([A-G]#?)").expect("valid note pattern"),
        octave: Regex::new(r"octave: (\d+)").expect("valid octave pattern"),
    })
}

fn capture<'h>(pattern: &Regex, line: &'h str) -> Option<&'h str> {
    pattern
        .captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

pub fn ingest_text(line: &str, now: DateTime<Utc>) -> Result<IngestedReading, IngestError> {
    let p = patterns();

    let distance = capture(&p.distance, line).and_then(|v| v.parse::<i64>().ok());
    let volume = capture(&p.volume, line).and_then(|v| v.parse::<i64>().ok());
    let (distance, volume) = match (distance, volume) {
        (Some(distance), Some(volume)) => (distance, volume),
        _ => {
            return Err(IngestError::MalformedPayload(format!(
                "no distance/volume in line: {}",
                line.trim()
            )))
        }
    };

    Ok(IngestedReading {
        sample: Sample {
            id: None,
            timestamp: now,
            distance,
            volume,
            frequency: capture(&p.frequency, line).and_then(|v| v.parse::<f64>().ok()),
            note: capture(&p.note, line).map(str::to_owned),
            octave: capture(&p.octave, line).and_then(|v| v.parse::<i32>().ok()),
        },
        presence_hint: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 4, 12, 18, 30, 0).unwrap()
    }

    #[test]
    fn classifies_by_first_non_blank_character() {
        assert!(matches!(Payload::classify("  \n{\"a\":1}"), Payload::Json(_)));
        assert!(matches!(Payload::classify("distance: 3"), Payload::Text(_)));
        assert!(matches!(Payload::classify(""), Payload::Text(_)));
    }

    #[test]
    fn field_mapping_renames_and_fills_volume() {
        let pigeon = FieldMapping {
            distance: "sensor".into(),
            volume: None,
        };
        let reading = ingest(&pigeon.apply(r#"{"sensor": 3500}"#), now()).unwrap();
        assert_eq!(reading.sample.distance, 3500);
        assert_eq!(reading.sample.volume, 0);

        let renamed = FieldMapping {
            distance: "mm".into(),
            volume: Some("db".into()),
        };
        let reading = ingest(&renamed.apply(r#"{"mm": 80, "db": 150}"#), now()).unwrap();
        assert_eq!((reading.sample.distance, reading.sample.volume), (80, 150));

        assert_eq!(pigeon.apply("distance: 3 volume: 4"), "distance: 3 volume: 4");
        assert!(FieldMapping::default().is_identity());
    }

    #[test]
    fn json_payload_with_all_fields() {
        let raw = r#"{"distance":182,"volume":171,"frequency":261.6,"note":"C","octave":4,"presence":true,"playing":true}"#;
        let reading = ingest(raw, now()).unwrap();
        assert_eq!(reading.sample.distance, 182);
        assert_eq!(reading.sample.volume, 171);
        assert_eq!(reading.sample.frequency, Some(261.6));
        assert_eq!(reading.sample.note.as_deref(), Some("C"));
        assert_eq!(reading.sample.octave, Some(4));
        assert_eq!(reading.sample.timestamp, now());
        assert_eq!(reading.presence_hint, Some(true));
    }

    #[test]
    fn json_payload_missing_volume_is_malformed() {
        let err = ingest(r#"{"distance":182}"#, now()).unwrap_err();
        assert!(matches!(err, IngestError::MalformedPayload(_)));
    }

    #[test]
    fn broken_json_is_malformed() {
        assert!(ingest("{\"distance\": 1,", now()).is_err());
    }

    #[test]
    fn text_line_is_parsed_with_first_matches() {
        let line = "distance: 95 volume: 170 frequency: 440 note: A# octave: 4 distance: 7";
        let reading = ingest(line, now()).unwrap();
        assert_eq!(reading.sample.distance, 95);
        assert_eq!(reading.sample.volume, 170);
        assert_eq!(reading.sample.frequency, Some(440.0));
        assert_eq!(reading.sample.note.as_deref(), Some("A#"));
        assert_eq!(reading.sample.octave, Some(4));
        assert_eq!(reading.presence_hint, None);
    }

    #[test]
    fn text_line_without_volume_is_malformed() {
        assert!(ingest("distance: 95 note: C", now()).is_err());
    }

    #[test]
    fn text_optional_fields_may_be_absent() {
        let reading = ingest("volume: 12, distance: 400", now()).unwrap();
        assert_eq!(reading.sample.distance, 400);
        assert!(reading.sample.note.is_none());
        assert!(reading.sample.frequency.is_none());
    }
}

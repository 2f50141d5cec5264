use anyhow::{Context, Result};
use chrono::{Duration, FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use std::{fs, net::SocketAddr, path::Path, path::PathBuf};

use crate::ingest::FieldMapping;
use crate::sensing::SmoothingConfig;
use crate::tracker::{SessionGate, TrackerConfig};

pub const CONFIG_ENV: &str = "PRESENCEWATCH_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "presencewatch.json";

/// Detection tuning for one monitored entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    /// Label for logs and status output, e.g. `piano` or `pigeon`.
    pub entity: String,
    /// Readings closer than this (mm) count as present.
    pub distance_threshold: i64,
    /// Divisor for the 0-100 proximity scale; `threshold / 100` when unset.
    pub proximity_scale: Option<f64>,
    pub volume_threshold: i64,
    pub loud_margin: i64,
    pub required_loud: usize,
    pub presence_window: usize,
    pub volume_window: usize,
    pub cooldown_ms: u64,
    pub absence_timeout_ms: u64,
    pub absence_check_ms: u64,
    pub reload_interval_secs: u64,
    pub session_gate: SessionGate,
    /// Minutes east of UTC used for daily buckets.
    pub day_offset_minutes: i32,
    pub persist_only_when_present: bool,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            entity: "piano".into(),
            distance_threshold: 250,
            proximity_scale: None,
            volume_threshold: 165,
            loud_margin: 20,
            required_loud: 2,
            presence_window: 5,
            volume_window: 3,
            cooldown_ms: 5000,
            absence_timeout_ms: 5000,
            absence_check_ms: 1000,
            reload_interval_secs: 300,
            session_gate: SessionGate::Presence,
            day_offset_minutes: 0,
            persist_only_when_present: false,
        }
    }
}

impl MonitorSettings {
    pub fn smoothing_config(&self) -> SmoothingConfig {
        SmoothingConfig {
            volume_threshold: self.volume_threshold,
            loud_margin: self.loud_margin,
            required_loud: self.required_loud,
            presence_window: self.presence_window,
            volume_window: self.volume_window,
        }
    }

    pub fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            cooldown: Duration::milliseconds(i64::try_from(self.cooldown_ms).unwrap_or(i64::MAX)),
            gate: self.session_gate,
            day_offset: self.day_offset(),
        }
    }

    pub fn proximity_scale(&self) -> f64 {
        self.proximity_scale
            .unwrap_or(self.distance_threshold as f64 / 100.0)
    }

    /// Falls back to UTC when the configured offset is out of range.
    pub fn day_offset(&self) -> FixedOffset {
        self.day_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .unwrap_or_else(|| Utc.fix())
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub backend: StoreBackend,
    pub sqlite_path: PathBuf,
    pub memory_capacity: usize,
    pub retention_hours: i64,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Sqlite,
            sqlite_path: PathBuf::from("presencewatch.sqlite3"),
            memory_capacity: 1000,
            retention_hours: 24,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    #[default]
    None,
    Mqtt,
    Poll,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub topic: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_prefix: String,
    pub keep_alive_secs: u64,
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 1883,
            topic: "conndev/piano".into(),
            username: None,
            password: None,
            client_prefix: "presencewatch".into(),
            keep_alive_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollSettings {
    /// URL of a JSON-lines log; the newest line is ingested.
    pub url: String,
    pub interval_ms: u64,
    /// Field names used by the logging device.
    pub fields: FieldMapping,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080/log.json".into(),
            interval_ms: 2000,
            fields: FieldMapping::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSettings {
    pub kind: TransportKind,
    pub reconnect_secs: u64,
    pub mqtt: MqttSettings,
    pub poll: PollSettings,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            kind: TransportKind::None,
            reconnect_secs: 5,
            mqtt: MqttSettings::default(),
            poll: PollSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: SocketAddr,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 3000)),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub monitor: MonitorSettings,
    pub store: StoreSettings,
    pub transport: TransportSettings,
    pub server: ServerSettings,
}

impl Settings {
    /// Reads `$PRESENCEWATCH_CONFIG` (or `presencewatch.json` when it exists)
    /// and applies environment overrides on top.
    pub fn load() -> Result<Self> {
        let path = std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        let mut settings = Self::from_file(&path)?;
        settings.apply_env(|key| std::env::var(key).ok())?;
        Ok(settings)
    }

    /// Missing file means defaults; a file that does not parse is an error.
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse settings in {}", path.display()))
    }

    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup("BIND_ADDR") {
            self.server.bind = addr
                .parse()
                .with_context(|| format!("BIND_ADDR is not a socket address: {addr}"))?;
        }
        if let Some(port) = lookup("PORT") {
            let port: u16 = port
                .parse()
                .with_context(|| format!("PORT is not a valid port: {port}"))?;
            self.server.bind.set_port(port);
        }
        if let Some(path) = lookup("DATABASE_PATH") {
            self.store.sqlite_path = PathBuf::from(path);
        }
        if let Some(host) = lookup("MQTT_HOST") {
            self.transport.mqtt.host = host;
        }
        if let Some(user) = lookup("MQTT_USER") {
            self.transport.mqtt.username = Some(user);
        }
        if let Some(password) = lookup("MQTT_PASSWORD") {
            self.transport.mqtt.password = Some(password);
        }
        if let Some(topic) = lookup("MQTT_TOPIC") {
            self.transport.mqtt.topic = topic;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("presencewatch.json");
        fs::write(
            &path,
            r#"{"monitor": {"entity": "pigeon", "distance_threshold": 4000, "session_gate": "presence_and_playing"},
                "transport": {"kind": "mqtt"}}"#,
        )
        .unwrap();

        let settings = Settings::from_file(&path).unwrap();
        assert_eq!(settings.monitor.entity, "pigeon");
        assert_eq!(settings.monitor.proximity_scale(), 40.0);
        assert_eq!(settings.monitor.session_gate, SessionGate::PresenceAndPlaying);
        assert_eq!(settings.monitor.cooldown_ms, 5000);
        assert_eq!(settings.transport.kind, TransportKind::Mqtt);
        assert_eq!(settings.transport.mqtt.topic, "conndev/piano");
        assert_eq!(settings.store.backend, StoreBackend::Sqlite);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::from_file(&dir.path().join("absent.json")).unwrap();
        assert_eq!(settings.server.bind.port(), 3000);
        assert_eq!(settings.monitor.proximity_scale(), 2.5);
    }

    #[test]
    fn broken_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(Settings::from_file(&path).is_err());
    }

    #[test]
    fn environment_overrides_file_values() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("PORT", "8081"),
            ("DATABASE_PATH", "/tmp/pw.sqlite3"),
            ("MQTT_HOST", "broker.local"),
            ("MQTT_USER", "sensor"),
            ("MQTT_TOPIC", "conndev/pigeon"),
        ]);
        let mut settings = Settings::default();
        settings
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(settings.server.bind.port(), 8081);
        assert_eq!(settings.store.sqlite_path, PathBuf::from("/tmp/pw.sqlite3"));
        assert_eq!(settings.transport.mqtt.host, "broker.local");
        assert_eq!(settings.transport.mqtt.username.as_deref(), Some("sensor"));
        assert_eq!(settings.transport.mqtt.topic, "conndev/pigeon");
        assert!(settings.transport.mqtt.password.is_none());
    }

    #[test]
    fn bad_port_is_rejected() {
        let mut settings = Settings::default();
        assert!(settings
            .apply_env(|key| (key == "PORT").then(|| "http".to_string()))
            .is_err());
    }

    #[test]
    fn day_offset_is_bounded() {
        let mut monitor = MonitorSettings::default();
        monitor.day_offset_minutes = -300;
        assert_eq!(monitor.day_offset().local_minus_utc(), -18_000);
        monitor.day_offset_minutes = 100_000;
        assert_eq!(monitor.day_offset().local_minus_utc(), 0);
    }
}

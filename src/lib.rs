#[macro_use]
mod utils;

pub mod api;
pub mod db;
pub mod ingest;
pub mod sensing;
pub mod settings;
pub mod state;
pub mod store;
pub mod tracker;
pub mod transport;

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Duration as ChronoDuration, Utc};
use log::{error, info, warn};
use tokio::sync::watch;
use tokio::time::Duration;

use db::Database;
use sensing::{LoopTiming, SensingController};
use settings::{Settings, StoreBackend, StoreSettings, TransportKind, TransportSettings};
use state::AppState;
use store::{AggregationStore, FallbackStore, MemoryLimits, MemoryStore, SqliteStore};
use tracker::Monitor;
use transport::{transport_loop, MqttTransport, PollTransport, Transport, TransportStatus};

fn memory_store(settings: &StoreSettings) -> MemoryStore {
    MemoryStore::new(MemoryLimits {
        sample_capacity: settings.memory_capacity,
        retention: ChronoDuration::hours(settings.retention_hours.max(1)),
        ..MemoryLimits::default()
    })
}

/// Opens the configured backend. A SQLite database that cannot be opened
/// leaves the process running on memory alone.
pub fn build_store(settings: &StoreSettings) -> Arc<dyn AggregationStore> {
    match settings.backend {
        StoreBackend::Memory => Arc::new(memory_store(settings)),
        StoreBackend::Sqlite => match Database::new(settings.sqlite_path.clone()) {
            Ok(db) => {
                info!("Using SQLite store at {}", settings.sqlite_path.display());
                let primary: Arc<dyn AggregationStore> = Arc::new(SqliteStore::new(db));
                Arc::new(FallbackStore::new(primary, memory_store(settings)))
            }
            Err(err) => {
                error!(
                    "Failed to open database at {}, keeping data in memory only: {err:#}",
                    settings.sqlite_path.display()
                );
                Arc::new(memory_store(settings))
            }
        },
    }
}

pub fn build_transport(settings: &TransportSettings) -> Option<Box<dyn Transport>> {
    match settings.kind {
        TransportKind::None => None,
        TransportKind::Mqtt => Some(Box::new(MqttTransport::new(&settings.mqtt))),
        TransportKind::Poll => Some(Box::new(PollTransport::new(&settings.poll))),
    }
}

/// Sessions left open by a previous process cannot be ended accurately;
/// they are closed at startup without touching the duration record.
pub async fn recover_open_sessions(store: &dyn AggregationStore) {
    match store.close_open_sessions(Utc::now()).await {
        Ok(0) => {}
        Ok(count) => warn!("Closed {count} session(s) left open by a previous run"),
        Err(err) => error!("Failed to close stale sessions: {err}"),
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

pub async fn run() -> Result<()> {
    // RUST_LOG overrides the default level
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let settings = Settings::load().context("failed to load settings")?;
    info!(
        "presencewatch starting for {} (store: {:?}, transport: {:?})",
        settings.monitor.entity, settings.store.backend, settings.transport.kind
    );

    let store = build_store(&settings.store);
    recover_open_sessions(store.as_ref()).await;

    let (monitor, live) = Monitor::new(settings.monitor.clone(), store.clone());
    let mut controller = SensingController::new();
    let handle = controller
        .start_monitor(monitor, LoopTiming::from_settings(&settings.monitor))
        .context("failed to start monitor")?;

    let (status_tx, status_rx) = watch::channel(TransportStatus::Idle);
    if let Some(transport) = build_transport(&settings.transport) {
        let token = controller
            .cancel_token()
            .context("monitor stopped before transport start")?;
        controller.attach(tokio::spawn(transport_loop(
            transport,
            handle.clone(),
            status_tx,
            Duration::from_secs(settings.transport.reconnect_secs),
            token,
        )));
    }

    let state = AppState::new(store, handle, live, status_rx, settings.monitor.clone());
    let app = api::create_app(state);

    let listener = tokio::net::TcpListener::bind(settings.server.bind)
        .await
        .with_context(|| format!("failed to bind {}", settings.server.bind))?;
    info!("Listening on http://{}", settings.server.bind);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed");

    controller.stop().await?;
    info!("presencewatch stopped");
    served
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unopenable_database_falls_back_to_memory() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"file").unwrap();

        let store = build_store(&StoreSettings {
            sqlite_path: blocker.join("db.sqlite3"),
            ..StoreSettings::default()
        });
        assert_eq!(store.backend_name(), "memory");
    }

    #[tokio::test]
    async fn sqlite_backend_is_wrapped_and_recovers_open_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let settings = StoreSettings {
            sqlite_path: dir.path().join("pw.sqlite3"),
            ..StoreSettings::default()
        };
        let store = build_store(&settings);
        assert_eq!(store.backend_name(), "sqlite");

        store.open_session(Utc::now()).await.unwrap();
        store.record_longest(10).await.unwrap();
        recover_open_sessions(store.as_ref()).await;

        let stats = store.global_stats().await.unwrap();
        assert!(!stats.currently_present);
        assert_eq!(stats.longest_duration_seconds, 10);
    }

    #[test]
    fn no_transport_by_default() {
        assert!(build_transport(&TransportSettings::default()).is_none());
    }
}

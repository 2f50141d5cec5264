//! Sources of raw sensor payloads feeding the monitor loop.

mod mqtt;
mod poll;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::ingest::ingest;
use crate::sensing::MonitorHandle;

pub use mqtt::MqttTransport;
pub use poll::{newest_line, PollTransport};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport disconnected: {0}")]
    Disconnected(String),

    #[error("transport closed")]
    Closed,
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransportStatus {
    /// No transport configured, or nothing received yet.
    #[default]
    Idle,
    Connected,
    Disconnected,
}

impl TransportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportStatus::Idle => "idle",
            TransportStatus::Connected => "connected",
            TransportStatus::Disconnected => "disconnected",
        }
    }
}

#[async_trait]
pub trait Transport: Send {
    fn name(&self) -> &'static str;

    /// Waits for the next raw payload. A `Disconnected` error is retried by
    /// the caller after the reconnect delay.
    async fn next_payload(&mut self) -> Result<String, TransportError>;
}

/// Pulls payloads from `transport`, normalizes them and forwards them to the
/// monitor. Malformed payloads are logged and dropped.
pub async fn transport_loop(
    mut transport: Box<dyn Transport>,
    monitor: MonitorHandle,
    status: watch::Sender<TransportStatus>,
    reconnect_delay: Duration,
    cancel_token: CancellationToken,
) {
    let name = transport.name();
    log_info!("{name} transport started");

    loop {
        let next = tokio::select! {
            next = transport.next_payload() => next,
            _ = cancel_token.cancelled() => break,
        };

        match next {
            Ok(raw) => {
                status.send_if_modified(|current| {
                    let changed = *current != TransportStatus::Connected;
                    *current = TransportStatus::Connected;
                    changed
                });
                match ingest(&raw, Utc::now()) {
                    Ok(reading) => {
                        if monitor.send(reading).await.is_err() {
                            log_warn!("{name} transport: monitor stopped, exiting");
                            break;
                        }
                    }
                    Err(err) => log_warn!("{name} transport dropped payload: {err}"),
                }
            }
            Err(TransportError::Disconnected(reason)) => {
                status.send_replace(TransportStatus::Disconnected);
                log_warn!("{name} transport disconnected ({reason}), retrying in {reconnect_delay:?}");
                tokio::select! {
                    _ = tokio::time::sleep(reconnect_delay) => {}
                    _ = cancel_token.cancelled() => break,
                }
                log_debug!("{name} transport reconnecting");
            }
            Err(TransportError::Closed) => {
                log_info!("{name} transport closed");
                break;
            }
        }
    }

    log_info!("{name} transport stopped");
}

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{
    ingest::IngestedReading,
    settings::MonitorSettings,
    tracker::{LiveState, Monitor},
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

pub enum MonitorCommand {
    Ingest {
        reading: IngestedReading,
        reply: Option<oneshot::Sender<LiveState>>,
    },
}

/// Timer periods driven by the monitor loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopTiming {
    /// Silence after which synthetic absent readings start.
    pub absence_timeout: Duration,
    pub absence_check: Duration,
    /// How often the store is probed and counters reloaded.
    pub reload_every: Duration,
}

impl LoopTiming {
    pub fn from_settings(settings: &MonitorSettings) -> Self {
        Self {
            absence_timeout: Duration::from_millis(settings.absence_timeout_ms),
            absence_check: Duration::from_millis(settings.absence_check_ms.max(1)),
            reload_every: Duration::from_secs(settings.reload_interval_secs.max(1)),
        }
    }
}

impl Default for LoopTiming {
    fn default() -> Self {
        Self::from_settings(&MonitorSettings::default())
    }
}

/// Processes readings in arrival order and drives the absence and reload
/// timers until cancelled or every command sender is gone.
pub async fn monitor_loop(
    mut monitor: Monitor,
    mut commands: mpsc::Receiver<MonitorCommand>,
    timing: LoopTiming,
    cancel_token: CancellationToken,
) {
    let mut absence_ticker = tokio::time::interval(timing.absence_check);
    absence_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut reload_ticker = tokio::time::interval(timing.reload_every);
    reload_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut last_sample = Instant::now();

    log_info!("[{}] monitor loop started", monitor.entity());

    loop {
        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else {
                    log_info!("[{}] command channel closed", monitor.entity());
                    break;
                };
                match command {
                    MonitorCommand::Ingest { reading, reply } => {
                        last_sample = Instant::now();
                        let state = monitor.handle_reading(reading).await;
                        if let Some(reply) = reply {
                            let _ = reply.send(state);
                        }
                    }
                }
            }
            _ = absence_ticker.tick() => {
                if last_sample.elapsed() > timing.absence_timeout {
                    log_debug!("[{}] no readings for {:?}, feeding absence", monitor.entity(), last_sample.elapsed());
                    monitor.handle_absence_tick(Utc::now()).await;
                }
            }
            _ = reload_ticker.tick() => {
                if let Err(err) = monitor.store().ping().await {
                    log_warn!("[{}] store ping failed: {err}", monitor.entity());
                }
                monitor.restore().await;
            }
            _ = cancel_token.cancelled() => {
                log_info!("[{}] monitor loop shutting down", monitor.entity());
                break;
            }
        }
    }
}

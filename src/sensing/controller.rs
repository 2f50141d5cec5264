use anyhow::{bail, Context, Result};
use log::info;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
    ingest::IngestedReading,
    tracker::{LiveState, Monitor},
};

use super::loop_worker::{monitor_loop, LoopTiming, MonitorCommand};

const COMMAND_BUFFER: usize = 256;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("monitor loop is not running")]
pub struct MonitorUnavailable;

/// Sending side of the monitor loop's command channel.
#[derive(Clone)]
pub struct MonitorHandle {
    tx: mpsc::Sender<MonitorCommand>,
}

impl MonitorHandle {
    /// Queues a reading and waits for the state it produced.
    pub async fn submit(&self, reading: IngestedReading) -> Result<LiveState, MonitorUnavailable> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(MonitorCommand::Ingest {
                reading,
                reply: Some(reply_tx),
            })
            .await
            .map_err(|_| MonitorUnavailable)?;
        reply_rx.await.map_err(|_| MonitorUnavailable)
    }

    /// Queues a reading without waiting for it to be processed.
    pub async fn send(&self, reading: IngestedReading) -> Result<(), MonitorUnavailable> {
        self.tx
            .send(MonitorCommand::Ingest {
                reading,
                reply: None,
            })
            .await
            .map_err(|_| MonitorUnavailable)
    }
}

/// Starts and stops the monitor loop and the tasks feeding it.
pub struct SensingController {
    handles: Vec<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl Default for SensingController {
    fn default() -> Self {
        Self::new()
    }
}

impl SensingController {
    pub fn new() -> Self {
        Self {
            handles: Vec::new(),
            cancel_token: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.cancel_token.is_some()
    }

    /// Token shared by every task started through this controller.
    pub fn cancel_token(&self) -> Option<CancellationToken> {
        self.cancel_token.clone()
    }

    pub fn start_monitor(&mut self, monitor: Monitor, timing: LoopTiming) -> Result<MonitorHandle> {
        if self.cancel_token.is_some() {
            bail!("monitor already active");
        }

        let cancel_token = CancellationToken::new();
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);

        info!("Starting monitor for {}", monitor.entity());
        let handle = tokio::spawn(monitor_loop(monitor, rx, timing, cancel_token.clone()));

        self.handles.push(handle);
        self.cancel_token = Some(cancel_token);
        Ok(MonitorHandle { tx })
    }

    /// Registers an extra task that honours [`cancel_token`](Self::cancel_token).
    pub fn attach(&mut self, handle: JoinHandle<()>) {
        self.handles.push(handle);
    }

    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        for handle in self.handles.drain(..) {
            handle.await.context("sensing task failed to join")?;
        }
        Ok(())
    }
}

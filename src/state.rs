//! Shared state handed to every route handler.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::watch;

use crate::{
    sensing::MonitorHandle,
    settings::MonitorSettings,
    store::AggregationStore,
    tracker::LiveState,
    transport::TransportStatus,
};

pub struct AppState {
    pub start_time: Instant,
    pub store: Arc<dyn AggregationStore>,
    /// Feeds `POST /api/readings` into the same queue as the transports.
    pub monitor: MonitorHandle,
    pub live: watch::Receiver<LiveState>,
    pub transport: watch::Receiver<TransportStatus>,
    pub settings: MonitorSettings,
}

impl AppState {
    pub fn new(
        store: Arc<dyn AggregationStore>,
        monitor: MonitorHandle,
        live: watch::Receiver<LiveState>,
        transport: watch::Receiver<TransportStatus>,
        settings: MonitorSettings,
    ) -> Arc<Self> {
        Arc::new(Self {
            start_time: Instant::now(),
            store,
            monitor,
            live,
            transport,
            settings,
        })
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn live(&self) -> LiveState {
        self.live.borrow().clone()
    }
}

pub mod config;
pub mod controller;
pub mod loop_worker;
pub mod smoothing;

pub use config::SmoothingConfig;
pub use controller::{MonitorHandle, MonitorUnavailable, SensingController};
pub use loop_worker::{LoopTiming, MonitorCommand};
pub use smoothing::{SmoothedState, SmoothingFilter};

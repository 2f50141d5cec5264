pub mod controller;
pub mod state;

pub use controller::{LiveState, Monitor};
pub use state::{PresenceStatus, SessionGate, SessionTracker, TrackerConfig, Transition};

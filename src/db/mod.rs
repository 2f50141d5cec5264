mod connection;
mod helpers;
mod migrations;
pub mod models;
mod repositories;

pub use connection::Database;
pub use models::{DailyCount, GlobalStats, RecordCounts, Sample, Session, SessionId};
pub use repositories::sessions::OpenedSession;

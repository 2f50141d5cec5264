pub mod reading;
pub mod session;
pub mod stats;

pub use reading::Sample;
pub use session::{duration_seconds, Session, SessionId};
pub use stats::{DailyCount, GlobalStats, RecordCounts};

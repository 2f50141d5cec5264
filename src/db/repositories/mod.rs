pub mod readings;
pub mod sessions;
pub mod stats;

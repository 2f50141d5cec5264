/// Thresholds and window sizes for the smoothing filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmoothingConfig {
    /// A window volume at or above this counts as loud.
    pub volume_threshold: i64,

    /// Newest volume above `volume_threshold + loud_margin` means playing immediately.
    pub loud_margin: i64,

    /// Loud readings needed in the volume window to report playing.
    pub required_loud: usize,

    /// Consecutive absent readings before presence drops.
    pub presence_window: usize,
    pub volume_window: usize,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            volume_threshold: 165,
            loud_margin: 20,
            required_loud: 2,
            presence_window: 5,
            volume_window: 3,
        }
    }
}

impl SmoothingConfig {
    pub fn override_level(&self) -> i64 {
        self.volume_threshold + self.loud_margin
    }
}

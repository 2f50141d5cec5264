use std::collections::VecDeque;

use serde::Serialize;

use super::config::SmoothingConfig;

/// Debounced output of the filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SmoothedState {
    pub presence: bool,
    pub playing: bool,
}

/// Trailing windows over raw presence and volume readings.
///
/// Presence is sticky: it only drops once the presence window is full and
/// every reading in it is absent. A partially filled window reports present.
#[derive(Debug, Clone)]
pub struct SmoothingFilter {
    config: SmoothingConfig,
    presence_window: VecDeque<bool>,
    volume_window: VecDeque<i64>,
    state: SmoothedState,
}

impl SmoothingFilter {
    pub fn new(config: SmoothingConfig) -> Self {
        let presence_capacity = config.presence_window.max(1);
        let volume_capacity = config.volume_window.max(1);
        Self {
            config: SmoothingConfig {
                presence_window: presence_capacity,
                volume_window: volume_capacity,
                ..config
            },
            presence_window: VecDeque::with_capacity(presence_capacity),
            volume_window: VecDeque::with_capacity(volume_capacity),
            state: SmoothedState::default(),
        }
    }

    pub fn config(&self) -> &SmoothingConfig {
        &self.config
    }

    /// Last state returned by [`update`](Self::update).
    pub fn state(&self) -> SmoothedState {
        self.state
    }

    pub fn update(&mut self, raw_presence: bool, raw_volume: i64) -> SmoothedState {
        push_bounded(&mut self.presence_window, raw_presence, self.config.presence_window);
        push_bounded(&mut self.volume_window, raw_volume, self.config.volume_window);

        self.state = SmoothedState {
            presence: self.presence(),
            playing: self.playing(raw_volume),
        };
        self.state
    }

    fn presence(&self) -> bool {
        let window_full = self.presence_window.len() == self.config.presence_window;
        !(window_full && self.presence_window.iter().all(|present| !present))
    }

    fn playing(&self, newest: i64) -> bool {
        if newest > self.config.override_level() {
            return true;
        }
        let loud = self
            .volume_window
            .iter()
            .filter(|volume| **volume >= self.config.volume_threshold)
            .count();
        loud >= self.config.required_loud
    }
}

fn push_bounded<T>(window: &mut VecDeque<T>, value: T, capacity: usize) {
    if window.len() == capacity {
        window.pop_front();
    }
    window.push_back(value);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> SmoothingFilter {
        SmoothingFilter::new(SmoothingConfig::default())
    }

    fn feed(filter: &mut SmoothingFilter, readings: &[(bool, i64)]) -> SmoothedState {
        readings
            .iter()
            .fold(SmoothedState::default(), |_, (presence, volume)| {
                filter.update(*presence, *volume)
            })
    }

    #[test]
    fn two_loud_readings_of_three_mean_playing() {
        let mut f = filter();
        let state = feed(&mut f, &[(true, 170), (true, 170), (true, 100)]);
        assert!(state.playing);
    }

    #[test]
    fn one_loud_reading_of_three_is_not_playing() {
        let mut f = filter();
        let state = feed(&mut f, &[(true, 170), (true, 100), (true, 100)]);
        assert!(!state.playing);
    }

    #[test]
    fn very_loud_newest_reading_overrides_the_window() {
        let mut f = filter();
        let state = feed(&mut f, &[(true, 0), (true, 0), (true, 186)]);
        assert!(state.playing);

        let mut f = filter();
        let state = feed(&mut f, &[(true, 0), (true, 0), (true, 185)]);
        assert!(!state.playing);
    }

    #[test]
    fn loud_readings_age_out_of_the_window() {
        let mut f = filter();
        assert!(feed(&mut f, &[(true, 170), (true, 170)]).playing);
        assert!(f.update(true, 100).playing);
        assert!(!f.update(true, 100).playing);
    }

    #[test]
    fn presence_needs_five_consecutive_absences() {
        let mut f = filter();
        feed(&mut f, &[(true, 0), (true, 0), (true, 0)]);
        for _ in 0..4 {
            assert!(f.update(false, 0).presence);
        }
        assert!(!f.update(false, 0).presence);
        assert!(f.update(true, 0).presence);
    }

    #[test]
    fn partial_window_of_absences_stays_present() {
        let mut f = filter();
        let state = feed(&mut f, &[(false, 0), (false, 0)]);
        assert!(state.presence);
    }

    #[test]
    fn distance_scenario_drops_presence_after_five_far_readings() {
        let threshold = 250;
        let mut f = filter();
        let distances = [200, 200, 200, 300, 300, 300, 300, 300];
        let states: Vec<SmoothedState> = distances
            .iter()
            .map(|d| f.update(*d < threshold, 0))
            .collect();

        assert!(states[..7].iter().all(|s| s.presence));
        assert!(!states[7].presence);
        assert_eq!(f.state(), states[7]);
    }
}

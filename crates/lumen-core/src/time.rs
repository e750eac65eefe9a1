//! Frame clock for the Lumen engine
//!
//! Turns raw wall-clock deltas into the clamped, scaled delta handed to systems.

use serde::{Deserialize, Serialize};

/// Configuration for the frame clock
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClockConfig {
    /// Multiplier applied to every delta (0.0 = frozen)
    pub time_scale: f32,
    /// Maximum delta handed to systems, prevents huge steps after a stall
    pub max_delta_time: f32,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            time_scale: 1.0,
            max_delta_time: 0.25,
        }
    }
}

/// Per-tick time tracking
#[derive(Debug, Clone, Default)]
pub struct FrameClock {
    /// Configuration
    pub config: ClockConfig,
    /// Scaled time since start in seconds
    pub total_time: f64,
    /// Delta for this tick (clamped and scaled)
    pub delta_time: f32,
    /// Clamped but unscaled delta
    pub unscaled_delta_time: f32,
    /// Tick counter
    pub frame_count: u64,
    /// Whether simulation time is paused
    pub paused: bool,
}

impl FrameClock {
    /// Create a clock with custom config
    pub fn new(config: ClockConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// Advance by the raw delta measured since the previous tick
    pub fn tick(&mut self, raw_delta: f32) -> f32 {
        self.unscaled_delta_time = raw_delta.clamp(0.0, self.config.max_delta_time);
        self.frame_count += 1;

        if self.paused {
            self.delta_time = 0.0;
            return 0.0;
        }

        self.delta_time = self.unscaled_delta_time * self.config.time_scale;
        self.total_time += self.delta_time as f64;
        self.delta_time
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    /// Set the time scale (negative values clamp to 0.0)
    pub fn set_time_scale(&mut self, scale: f32) {
        self.config.time_scale = scale.max(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_advances() {
        let mut clock = FrameClock::default();
        let dt = clock.tick(0.016);

        assert!(dt > 0.0);
        assert_eq!(clock.frame_count, 1);
        assert!((clock.total_time - 0.016).abs() < 1e-6);
    }

    #[test]
    fn delta_is_clamped() {
        let mut clock = FrameClock::default();
        assert_eq!(clock.tick(3.0), 0.25);
        assert_eq!(clock.tick(-1.0), 0.0);
    }

    #[test]
    fn pause_freezes_delta() {
        let mut clock = FrameClock::default();
        clock.pause();
        assert_eq!(clock.tick(0.016), 0.0);
        assert_eq!(clock.frame_count, 1);
        clock.resume();
        assert!(clock.tick(0.016) > 0.0);
    }
}

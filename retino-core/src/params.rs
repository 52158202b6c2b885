use serde::{Deserialize, Serialize};

/// Stimulus inputs in physical units. Immutable for a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StimulusParameters {
    pub square_size_deg: f64,
    /// Checkerboard contrast reversals happen at twice this rate.
    pub flip_rate_hz: f64,
    pub bar_width_deg: f64,
    pub bar_speed_deg_per_sec: f64,
    /// Trials per sweep direction.
    pub trial_num: usize,
    /// Stationary frames prepended to every trial.
    pub inter_trial_frame: usize,
    /// Frame rate the bar speed is divided by, in Hz. Also drives the
    /// free-running frame clock when no hardware counter is used.
    pub sample_rate_hz: f64,
}

impl Default for StimulusParameters {
    fn default() -> Self {
        Self {
            square_size_deg: 20.0,
            flip_rate_hz: 3.0,
            bar_width_deg: 15.0,
            bar_speed_deg_per_sec: 10.0,
            trial_num: 20,
            inter_trial_frame: 30,
            sample_rate_hz: 10.0,
        }
    }
}

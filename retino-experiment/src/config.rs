use retino_core::{MonitorGeometry, StimulusParameters};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to write default config {path}: {reason}")]
    WriteDefault { path: PathBuf, reason: String },

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Names the log files.
    #[serde(default = "SessionConfig::default_subject_id")]
    pub subject_id: String,
    #[serde(default)]
    pub experimenter: String,
    /// Logs go to the working directory when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save_dir: Option<PathBuf>,
    /// Trials per direction.
    #[serde(default = "SessionConfig::default_trial_num")]
    pub trial_num: usize,
    #[serde(default)]
    pub verbose: bool,
    /// Frames between verbose progress lines.
    #[serde(default = "SessionConfig::default_print_interval")]
    pub print_interval: u64,
}

impl SessionConfig {
    fn default_subject_id() -> String {
        "THYG6S0113Ma".to_string()
    }
    fn default_trial_num() -> usize {
        20
    }
    fn default_print_interval() -> u64 {
        10
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            subject_id: Self::default_subject_id(),
            experimenter: String::new(),
            save_dir: None,
            trial_num: Self::default_trial_num(),
            verbose: false,
            print_interval: Self::default_print_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HardwareConfig {
    /// Count imaging frames on a DAQ counter instead of the free-running clock.
    #[serde(default)]
    pub use_daq: bool,
    #[serde(default = "HardwareConfig::default_counter_port")]
    pub counter_port: String,
    /// Imaging frame rate in Hz; also paces the free-running clock.
    #[serde(default = "HardwareConfig::default_sample_rate")]
    pub sample_rate: f64,
}

impl HardwareConfig {
    fn default_counter_port() -> String {
        "Dev3/ctr0".to_string()
    }
    fn default_sample_rate() -> f64 {
        10.0
    }
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            use_daq: false,
            counter_port: Self::default_counter_port(),
            sample_rate: Self::default_sample_rate(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StimulusConfig {
    pub inter_trial_frame: usize,
    pub square_size_deg: f64,
    pub square_flip_rate: f64,
    pub bar_width_deg: f64,
    pub bar_speed_deg_per_sec: f64,
}

impl Default for StimulusConfig {
    fn default() -> Self {
        Self {
            inter_trial_frame: 30,
            square_size_deg: 20.0,
            square_flip_rate: 3.0,
            bar_width_deg: 15.0,
            bar_speed_deg_per_sec: 10.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub monitor_num: usize,
    pub monitor_name: String,
    pub resolution: (u32, u32),
    /// Visible area in cm, bezel excluded.
    pub size_cm: (f64, f64),
    pub gaze_center_cm: (f64, f64),
    pub distance_cm: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        let geometry = MonitorGeometry::default();
        Self {
            monitor_num: 0,
            monitor_name: String::new(),
            resolution: geometry.resolution,
            size_cm: geometry.size_cm,
            gaze_center_cm: geometry.gaze_center_cm,
            distance_cm: geometry.distance_cm,
        }
    }
}

/// Run-wide configuration, built once at startup and passed down explicitly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub hardware: HardwareConfig,
    #[serde(default)]
    pub stimulus: StimulusConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
}

impl RunConfig {
    pub fn from_toml_str(text: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Reads `path`, or writes a commented template of the defaults there and
    /// returns the defaults when it does not exist yet.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            let cfg = Self::from_toml_str(&text, path)?;
            info!(path = %path.display(), "config loaded");
            return Ok(cfg);
        }

        let cfg = Self::default();
        let write_err = |reason: String| ConfigError::WriteDefault {
            path: path.to_path_buf(),
            reason,
        };
        let text = toml::to_string_pretty(&cfg).map_err(|e| write_err(e.to_string()))?;
        fs::write(path, Self::commented(&text)).map_err(|e| write_err(e.to_string()))?;
        info!(path = %path.display(), "default config written");
        Ok(cfg)
    }

    /// Comments out every key so the template documents defaults without pinning them.
    fn commented(text: &str) -> String {
        let mut out = String::with_capacity(text.len() * 2);
        for line in text.lines() {
            let trimmed = line.trim();
            if !trimmed.is_empty() && !(trimmed.starts_with('[') && trimmed.ends_with(']')) {
                out.push_str("# ");
            }
            out.push_str(line);
            out.push('\n');
        }
        out
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));
        let s = &self.session;
        let h = &self.hardware;
        let st = &self.stimulus;
        let m = &self.monitor;

        if s.subject_id.trim().is_empty() {
            return invalid("session.subject_id must not be empty");
        }
        if s.trial_num == 0 {
            return invalid("session.trial_num must be at least 1");
        }
        if s.print_interval == 0 {
            return invalid("session.print_interval must be at least 1");
        }
        if !(h.sample_rate > 0.0) {
            return invalid("hardware.sample_rate must be positive");
        }
        if h.use_daq && h.counter_port.trim().is_empty() {
            return invalid("hardware.counter_port is required when use_daq is set");
        }
        if !(st.square_size_deg > 0.0 && st.square_size_deg < 90.0) {
            return invalid("stimulus.square_size_deg must be in (0, 90)");
        }
        if !(st.bar_width_deg > 0.0 && st.bar_width_deg < 90.0) {
            return invalid("stimulus.bar_width_deg must be in (0, 90)");
        }
        if !(st.bar_speed_deg_per_sec > 0.0 && st.bar_speed_deg_per_sec < 90.0) {
            return invalid("stimulus.bar_speed_deg_per_sec must be in (0, 90)");
        }
        if !(st.square_flip_rate > 0.0) {
            return invalid("stimulus.square_flip_rate must be positive");
        }
        if m.resolution.0 == 0 || m.resolution.1 == 0 {
            return invalid("monitor.resolution must be non-zero");
        }
        if !(m.size_cm.0 > 0.0 && m.size_cm.1 > 0.0) {
            return invalid("monitor.size_cm must be positive");
        }
        if !(m.distance_cm > 0.0) {
            return invalid("monitor.distance_cm must be positive");
        }
        Ok(())
    }

    pub fn geometry(&self) -> MonitorGeometry {
        MonitorGeometry {
            resolution: self.monitor.resolution,
            size_cm: self.monitor.size_cm,
            distance_cm: self.monitor.distance_cm,
            gaze_center_cm: self.monitor.gaze_center_cm,
        }
    }

    pub fn stimulus_parameters(&self) -> StimulusParameters {
        StimulusParameters {
            square_size_deg: self.stimulus.square_size_deg,
            flip_rate_hz: self.stimulus.square_flip_rate,
            bar_width_deg: self.stimulus.bar_width_deg,
            bar_speed_deg_per_sec: self.stimulus.bar_speed_deg_per_sec,
            trial_num: self.session.trial_num,
            inter_trial_frame: self.stimulus.inter_trial_frame,
            sample_rate_hz: self.hardware.sample_rate,
        }
    }
}

use crate::config::RunConfig;
use crate::sequencer::RunState;
use crate::session::ProtocolSession;
use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use retino_core::SweepPhase;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Frames a run may fall short of the expected total and still count as complete.
pub const INTERRUPT_TOLERANCE_FRAMES: u64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunOutcome {
    Complete,
    Interrupted,
}

impl RunOutcome {
    pub fn classify(total_frames: u64, real_frames: u64) -> Self {
        if total_frames > real_frames.saturating_add(INTERRUPT_TOLERANCE_FRAMES) {
            RunOutcome::Interrupted
        } else {
            RunOutcome::Complete
        }
    }
}

/// Realised timeline and parameter snapshot of one run, captured at loop exit.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRecord {
    pub subject_id: String,
    pub experimenter: String,
    pub date_time: String,
    pub date_time_stamp: String,

    pub total_frames: u64,
    pub real_frames: u64,
    /// Frames in a single vertical sweep, padding included.
    pub vertical_frames: usize,
    pub horizontal_frames: usize,
    pub trial_num: usize,
    pub inter_trial_frame: usize,
    /// Loop iterations spent in each sweep, ordered like `SweepPhase::SWEEPS`.
    pub sweep_iterations: [u64; 4],
    pub quit_requested: bool,

    pub square_size_deg: f64,
    pub square_size_px: f64,
    pub square_flip_rate: f64,
    pub bar_speed_deg_per_sec: f64,
    pub bar_speed_px_per_frame: f64,
    pub bar_speed_px_per_sec: f64,
    pub bar_width_deg: f64,

    pub monitor_name: String,
    pub monitor_resolution: (u32, u32),
    pub monitor_size_cm: (f64, f64),
    pub monitor_distance_cm: f64,
    pub gaze_center_cm: (f64, f64),
    pub visual_azimuth: (f64, f64),
    pub visual_elevation: (f64, f64),

    pub outcome: RunOutcome,
}

impl RunRecord {
    pub fn capture(
        config: &RunConfig,
        session: &ProtocolSession,
        state: &RunState,
        at: NaiveDateTime,
    ) -> Self {
        let schedule = session.sequencer.schedule();
        let total_frames = session.sequencer.total_frames();
        let real_frames = state.real_frame_count();
        let px_per_frame = session.displacement_per_frame();
        let geometry = &session.geometry;

        Self {
            subject_id: config.session.subject_id.clone(),
            experimenter: config.session.experimenter.clone(),
            date_time: at.format("%Y/%m/%d-%H:%M:%S").to_string(),
            date_time_stamp: at.format("%y%m%d%H%M").to_string(),

            total_frames,
            real_frames,
            vertical_frames: schedule.vertical_len(),
            horizontal_frames: schedule.horizontal_len(),
            trial_num: session.params.trial_num,
            inter_trial_frame: session.params.inter_trial_frame,
            sweep_iterations: state.iterations,
            quit_requested: state.quit,

            square_size_deg: session.params.square_size_deg,
            square_size_px: session.square_size_px(),
            square_flip_rate: session.params.flip_rate_hz,
            bar_speed_deg_per_sec: session.params.bar_speed_deg_per_sec,
            bar_speed_px_per_frame: px_per_frame,
            bar_speed_px_per_sec: px_per_frame * session.params.sample_rate_hz,
            bar_width_deg: session.params.bar_width_deg,

            monitor_name: config.monitor.monitor_name.clone(),
            monitor_resolution: geometry.resolution,
            monitor_size_cm: geometry.size_cm,
            monitor_distance_cm: geometry.distance_cm,
            gaze_center_cm: geometry.gaze_center_cm,
            visual_azimuth: geometry.visual_azimuth(),
            visual_elevation: geometry.visual_elevation(),

            outcome: RunOutcome::classify(total_frames, real_frames),
        }
    }

    pub fn log_file_name(&self) -> String {
        format!("RMlog-{}-{}.txt", self.subject_id, self.date_time_stamp)
    }

    pub fn snapshot_file_name(&self) -> String {
        format!("RMcnfg-{}-{}.json", self.subject_id, self.date_time_stamp)
    }

    /// Human-readable run log.
    pub fn log_text(&self) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail.
        let _ = self.write_log(&mut out);
        out
    }

    fn write_log(&self, out: &mut String) -> std::fmt::Result {
        writeln!(out, "########## RM-LOG ##########")?;

        writeln!(out, "######### BASIC INFO #########")?;
        writeln!(out, "subjectID = {}", self.subject_id)?;
        writeln!(out, "experimenter = {}", self.experimenter)?;
        writeln!(out, "dateTime = {}", self.date_time)?;
        writeln!(out, "dateTimeStamp = {}", self.date_time_stamp)?;
        writeln!(out)?;

        writeln!(out, "######## TRIAL CONFIG ########")?;
        writeln!(out, "totalFrame = {}", self.total_frames)?;
        writeln!(out, "realFrame = {}", self.real_frames)?;
        writeln!(out, "verticalFrame = {}", self.vertical_frames)?;
        writeln!(out, "horizontalFrame = {}", self.horizontal_frames)?;
        writeln!(out, "trialNum = {}", self.trial_num)?;
        writeln!(out, "interTrialFrame = {}", self.inter_trial_frame)?;
        writeln!(out)?;

        writeln!(out, "######## STIM CONFIG ########")?;
        writeln!(out, "squareSizeDeg = {} deg", self.square_size_deg)?;
        writeln!(out, "squareSizePix = {} pix", self.square_size_px)?;
        writeln!(out, "squareFlipRate = {} Hz", self.square_flip_rate)?;
        writeln!(out, "barSpdDegPerSec = {} deg/sec", self.bar_speed_deg_per_sec)?;
        writeln!(out, "barSpdPixPerFrame = {} pix/frame", self.bar_speed_px_per_frame)?;
        writeln!(out, "barSpdPixPerSec = {} pix/sec", self.bar_speed_px_per_sec)?;
        writeln!(out, "barWidthDeg = {} deg", self.bar_width_deg)?;
        writeln!(out)?;

        let (rx, ry) = self.monitor_resolution;
        let (sx, sy) = self.monitor_size_cm;
        let (gx, gy) = self.gaze_center_cm;
        let (az0, az1) = self.visual_azimuth;
        let (el0, el1) = self.visual_elevation;
        writeln!(out, "######## MONITOR INFO ########")?;
        writeln!(out, "monitorName = {}", self.monitor_name)?;
        writeln!(out, "monitorResolution = {rx} x {ry} pixel")?;
        writeln!(out, "monitorSize = {sx} x {sy} cm")?;
        writeln!(out, "monitorDistance = {} cm", self.monitor_distance_cm)?;
        writeln!(out, "gazeCenter = ({gx}, {gy}) cm")?;
        writeln!(out, "visualAzi = ({az0:.2}, {az1:.2}) deg")?;
        writeln!(out, "visualElv = ({el0:.2}, {el1:.2}) deg")?;
        writeln!(out)?;
        Ok(())
    }

    /// Machine-readable snapshot; keys come out sorted.
    pub fn snapshot(&self) -> BTreeMap<&'static str, Value> {
        BTreeMap::from([
            ("subjectID", json!(self.subject_id)),
            ("experimenter", json!(self.experimenter)),
            ("dateTime", json!(self.date_time)),
            ("dateTimeStamp", json!(self.date_time_stamp)),
            ("verticalFrame", json!(self.vertical_frames)),
            ("horizontalFrame", json!(self.horizontal_frames)),
            ("trialNum", json!(self.trial_num)),
            ("interTrialFrame", json!(self.inter_trial_frame)),
            ("totalFrame", json!(self.total_frames)),
            ("realFrame", json!(self.real_frames)),
            ("monitorName", json!(self.monitor_name)),
            ("monitorResolution", json!(self.monitor_resolution)),
            ("monitorSize", json!(self.monitor_size_cm)),
            ("monitorDistance", json!(self.monitor_distance_cm)),
            ("gazeCenter", json!(self.gaze_center_cm)),
            ("squareSizeDeg", json!(self.square_size_deg)),
            ("squareSizePix", json!(self.square_size_px)),
            ("squareFlipRate", json!(self.square_flip_rate)),
            ("barSpdPixPerFrame", json!(self.bar_speed_px_per_frame)),
            ("barSpdPixPerSec", json!(self.bar_speed_px_per_sec)),
            ("barSpdDegPerSec", json!(self.bar_speed_deg_per_sec)),
            ("barWidthDeg", json!(self.bar_width_deg)),
            ("visualAzi", json!(self.visual_azimuth)),
            ("visualElv", json!(self.visual_elevation)),
        ])
    }

    pub fn snapshot_json(&self) -> Result<String> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.snapshot()
            .serialize(&mut ser)
            .context("serializing run snapshot")?;
        Ok(String::from_utf8(buf)?)
    }

    /// End-of-run summary on the log stream.
    pub fn log_summary(&self) {
        info!(
            total = self.total_frames,
            real = self.real_frames,
            outcome = ?self.outcome,
            "run finished"
        );
        for (phase, n) in SweepPhase::SWEEPS.iter().zip(self.sweep_iterations) {
            info!(phase = phase.label(), iterations = n, "sweep");
        }
    }
}

/// Paths written for a complete run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedRun {
    pub log_path: PathBuf,
    pub snapshot_path: PathBuf,
}

/// Writes the log and snapshot of complete runs into one directory.
#[derive(Debug, Clone)]
pub struct RunRecorder {
    save_dir: PathBuf,
}

impl RunRecorder {
    /// `None` writes into the working directory.
    pub fn new(save_dir: Option<PathBuf>) -> Self {
        Self {
            save_dir: save_dir.unwrap_or_else(|| PathBuf::from(".")),
        }
    }

    pub fn save_dir(&self) -> &Path {
        &self.save_dir
    }

    /// Persists both files, or nothing at all for an interrupted run.
    pub fn persist(&self, record: &RunRecord) -> Result<Option<PersistedRun>> {
        if record.outcome == RunOutcome::Interrupted {
            warn!(
                total = record.total_frames,
                real = record.real_frames,
                "experiment is interrupted, logs not saved"
            );
            return Ok(None);
        }

        // Render both before touching the disk so a failure leaves no half-written run.
        let log = record.log_text();
        let snapshot = record.snapshot_json()?;

        fs::create_dir_all(&self.save_dir)
            .with_context(|| format!("creating save dir {}", self.save_dir.display()))?;
        let log_path = self.save_dir.join(record.log_file_name());
        let snapshot_path = self.save_dir.join(record.snapshot_file_name());
        fs::write(&log_path, log)
            .with_context(|| format!("writing run log {}", log_path.display()))?;
        fs::write(&snapshot_path, snapshot)
            .with_context(|| format!("writing run snapshot {}", snapshot_path.display()))?;

        info!(log = %log_path.display(), snapshot = %snapshot_path.display(), "run logged");
        Ok(Some(PersistedRun {
            log_path,
            snapshot_path,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn stamp() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 7)
            .unwrap()
            .and_hms_opt(14, 5, 9)
            .unwrap()
    }

    fn short_config() -> RunConfig {
        let mut cfg = RunConfig::default();
        cfg.session.subject_id = "M01".into();
        cfg.session.experimenter = "lab".into();
        cfg.session.trial_num = 1;
        cfg.stimulus.inter_trial_frame = 0;
        cfg.monitor.monitor_name = "testMonitor".into();
        cfg
    }

    fn record_with(real: u64) -> RunRecord {
        let cfg = short_config();
        let session = ProtocolSession::from_config(&cfg).unwrap();
        let mut state = session.sequencer.start();
        state.frame = real;
        RunRecord::capture(&cfg, &session, &state, stamp())
    }

    #[test]
    fn classification_tolerates_three_missing_frames() {
        assert_eq!(RunOutcome::classify(100, 98), RunOutcome::Complete);
        assert_eq!(RunOutcome::classify(100, 50), RunOutcome::Interrupted);
        assert_eq!(RunOutcome::classify(100, 97), RunOutcome::Complete);
        assert_eq!(RunOutcome::classify(100, 96), RunOutcome::Interrupted);
        assert_eq!(RunOutcome::classify(100, 140), RunOutcome::Complete);
        assert_eq!(RunOutcome::classify(0, 0), RunOutcome::Complete);
    }

    #[test]
    fn capture_derives_reference_values() {
        let rec = record_with(784);
        assert_eq!(rec.total_frames, 784);
        assert_eq!(rec.vertical_frames, 246);
        assert_eq!(rec.horizontal_frames, 146);
        assert_eq!(rec.square_size_px, 164.0);
        assert_eq!(rec.bar_speed_px_per_frame, 7.0);
        assert_eq!(rec.bar_speed_px_per_sec, 70.0);
        assert_eq!(rec.date_time, "2024/03/07-14:05:09");
        assert_eq!(rec.date_time_stamp, "2403071405");
        assert_eq!(rec.log_file_name(), "RMlog-M01-2403071405.txt");
        assert_eq!(rec.snapshot_file_name(), "RMcnfg-M01-2403071405.json");
        assert_eq!(rec.outcome, RunOutcome::Complete);
    }

    #[test]
    fn log_has_sections_in_order() {
        let text = record_with(784).log_text();
        let headers = [
            "########## RM-LOG ##########",
            "######### BASIC INFO #########",
            "######## TRIAL CONFIG ########",
            "######## STIM CONFIG ########",
            "######## MONITOR INFO ########",
        ];
        let mut last = 0;
        for h in headers {
            let at = text.find(h).unwrap_or_else(|| panic!("missing {h}"));
            assert!(at >= last);
            last = at;
        }
        assert!(text.contains("subjectID = M01\n"));
        assert!(text.contains("totalFrame = 784\n"));
        assert!(text.contains("realFrame = 784\n"));
        assert!(text.contains("squareSizePix = 164 pix\n"));
        assert!(text.contains("monitorResolution = 1600 x 900 pixel\n"));
        assert!(text.contains("monitorSize = 70.9 x 39.9 cm\n"));
    }

    #[test]
    fn snapshot_is_sorted_and_four_space_indented() {
        let json = record_with(784).snapshot_json().unwrap();
        assert!(json.starts_with("{\n    \"barSpdDegPerSec\": 10.0,"));
        assert!(json.contains("\n    \"monitorResolution\": [\n        1600,\n        900\n    ],"));

        let value: Value = serde_json::from_str(&json).unwrap();
        let obj = value.as_object().unwrap();
        assert_eq!(obj.len(), 24);
        assert_eq!(obj["subjectID"], "M01");
        assert_eq!(obj["totalFrame"], 784);
        assert_eq!(obj["verticalFrame"], 246);
        let keys: Vec<_> = obj.keys().cloned().collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn complete_run_writes_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = RunRecorder::new(Some(dir.path().join("logs")));
        let rec = record_with(782);

        let persisted = recorder.persist(&rec).unwrap().unwrap();
        assert!(persisted.log_path.ends_with("RMlog-M01-2403071405.txt"));
        let log = fs::read_to_string(&persisted.log_path).unwrap();
        assert!(log.starts_with("########## RM-LOG ##########\n"));
        let snap = fs::read_to_string(&persisted.snapshot_path).unwrap();
        assert!(snap.contains("\"realFrame\": 782"));
    }

    #[test]
    fn interrupted_run_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = RunRecorder::new(Some(dir.path().to_path_buf()));
        let rec = record_with(400);
        assert_eq!(rec.outcome, RunOutcome::Interrupted);

        assert!(recorder.persist(&rec).unwrap().is_none());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}

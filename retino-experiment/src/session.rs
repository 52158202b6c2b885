use crate::config::RunConfig;
use crate::schedule::{displacement_per_frame, CheckerboardTiling, ScheduleError, SweepSchedule};
use crate::sequencer::Sequencer;
use retino_core::{MonitorGeometry, StimulusParameters};
use tracing::info;

/// Everything precomputed before the first frame: geometry, parameters, the
/// sweep schedule, the checkerboard and the sequencer built on them.
#[derive(Debug, Clone)]
pub struct ProtocolSession {
    pub geometry: MonitorGeometry,
    pub params: StimulusParameters,
    pub tiling: CheckerboardTiling,
    pub sequencer: Sequencer,
}

impl ProtocolSession {
    pub fn new(
        geometry: MonitorGeometry,
        params: StimulusParameters,
    ) -> Result<Self, ScheduleError> {
        let schedule = SweepSchedule::build(&geometry, &params)?;
        let tiling = CheckerboardTiling::build(&geometry, &params)?;
        let sequencer = Sequencer::new(schedule, params.trial_num, params.flip_rate_hz);
        Ok(Self {
            geometry,
            params,
            tiling,
            sequencer,
        })
    }

    pub fn from_config(config: &RunConfig) -> Result<Self, ScheduleError> {
        let session = Self::new(config.geometry(), config.stimulus_parameters())?;
        let schedule = session.sequencer.schedule();
        info!(
            vertical_frames = schedule.vertical_len(),
            horizontal_frames = schedule.horizontal_len(),
            total_frames = session.sequencer.total_frames(),
            step_px = schedule.step_px,
            tiles = session.tiling.len(),
            "stimulation is ready to go"
        );
        Ok(session)
    }

    pub fn square_size_px(&self) -> f64 {
        self.tiling.square_size_px
    }

    pub fn displacement_per_frame(&self) -> f64 {
        displacement_per_frame(&self.geometry, &self.params)
    }
}

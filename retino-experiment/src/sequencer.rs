use crate::schedule::SweepSchedule;
use retino_core::{BarPair, FrameCommands, Orientation, Phase, Polarity, SweepPhase, MASK_GREY};

/// Cumulative frame counts at which each sweep ends.
///
/// With `V = trials * vertical_len` and `H = trials * horizontal_len`, the
/// sweeps own the frame brackets `[0, V]`, `(V, 2V]`, `(2V, 2V+H]` and
/// `(2V+H, 2V+2H]`; an upper bound belongs to the earlier sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseBoundaries {
    pub vertical_frames: u64,
    pub horizontal_frames: u64,
}

impl PhaseBoundaries {
    pub fn new(schedule: &SweepSchedule, trial_num: usize) -> Self {
        Self {
            vertical_frames: (trial_num * schedule.vertical_len()) as u64,
            horizontal_frames: (trial_num * schedule.horizontal_len()) as u64,
        }
    }

    /// Frames expected for a full run, `2V + 2H`.
    pub fn total(&self) -> u64 {
        2 * self.vertical_frames + 2 * self.horizontal_frames
    }

    /// Frame count at which the horizontal sweeps begin, `2V`.
    pub fn horizontal_onset(&self) -> u64 {
        2 * self.vertical_frames
    }

    /// Last frame belonging to `phase`.
    pub fn end_of(&self, phase: SweepPhase) -> u64 {
        let v = self.vertical_frames;
        let h = self.horizontal_frames;
        match phase {
            SweepPhase::LeftToRight => v,
            SweepPhase::RightToLeft => 2 * v,
            SweepPhase::BottomToTop => 2 * v + h,
            SweepPhase::TopToBottom | SweepPhase::Done => 2 * v + 2 * h,
        }
    }

    /// Sweep owning `frame`. Frames past the total stay in the last sweep.
    pub fn phase_at(&self, frame: u64) -> SweepPhase {
        SweepPhase::SWEEPS
            .into_iter()
            .find(|p| frame <= self.end_of(*p))
            .unwrap_or(SweepPhase::TopToBottom)
    }
}

/// Mutable per-run state; one writer (the sequencer) and read by the recorder
/// only after the loop exits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunState {
    pub frame: u64,
    pub phase: SweepPhase,
    pub quit: bool,
    /// Iterations drawn in each sweep, indexed like `SweepPhase::SWEEPS`.
    pub iterations: [u64; 4],
}

impl RunState {
    pub fn is_finished(&self) -> bool {
        self.phase.is_terminal()
    }

    /// Frame index observed when the loop ended.
    pub fn real_frame_count(&self) -> u64 {
        self.frame
    }

    pub fn total_iterations(&self) -> u64 {
        self.iterations.iter().sum()
    }
}

/// Maps frame indices onto sweep phases and bar positions.
#[derive(Debug, Clone)]
pub struct Sequencer {
    schedule: SweepSchedule,
    boundaries: PhaseBoundaries,
    flip_rate_hz: f64,
}

impl Sequencer {
    pub fn new(schedule: SweepSchedule, trial_num: usize, flip_rate_hz: f64) -> Self {
        let boundaries = PhaseBoundaries::new(&schedule, trial_num);
        Self {
            schedule,
            boundaries,
            flip_rate_hz,
        }
    }

    pub fn schedule(&self) -> &SweepSchedule {
        &self.schedule
    }

    pub fn boundaries(&self) -> PhaseBoundaries {
        self.boundaries
    }

    pub fn total_frames(&self) -> u64 {
        self.boundaries.total()
    }

    pub fn start(&self) -> RunState {
        RunState {
            frame: 0,
            phase: self.boundaries.phase_at(0),
            quit: false,
            iterations: [0; 4],
        }
    }

    /// Index into the phase's track for `frame`.
    ///
    /// Frames are numbered from 1 inside a sweep: vertical sweeps use
    /// `(f - 1) mod len`, horizontal sweeps `(f - 2V - 1) mod len`, both
    /// with a non-negative remainder (frame 0 maps to the last entry).
    pub fn intra_sweep_index(&self, frame: u64, orientation: Orientation) -> usize {
        let len = self.schedule.len_for(orientation) as i128;
        let offset = match orientation {
            Orientation::Vertical => 1,
            Orientation::Horizontal => self.boundaries.horizontal_onset() as i128 + 1,
        };
        (frame as i128 - offset).rem_euclid(len) as usize
    }

    /// Draw commands for the current state at `elapsed_secs` of wall-clock time.
    pub fn frame_commands(&self, state: &RunState, elapsed_secs: f64) -> FrameCommands {
        let bars = state.phase.orientation().and_then(|orientation| {
            let track = self.schedule.track(state.phase)?;
            let (leading, trailing) = track.at(self.intra_sweep_index(state.frame, orientation))?;
            Some(BarPair {
                orientation,
                leading,
                trailing,
                fill: MASK_GREY,
            })
        });
        FrameCommands {
            frame: state.frame,
            phase: state.phase,
            polarity: Polarity::at(elapsed_secs, self.flip_rate_hz),
            bars,
        }
    }

    /// State after an iteration drawn in `state` observed `frame` and `quit`.
    ///
    /// The frame index and phase never move backwards; the run is `Done`
    /// once `frame` reaches the total or a quit was requested.
    pub fn advance(&self, state: &RunState, frame: u64, quit: bool) -> RunState {
        let mut iterations = state.iterations;
        if let Some(i) = state.phase.sweep_index() {
            iterations[i] += 1;
        }
        let frame = frame.max(state.frame);
        let quit = state.quit || quit;
        let phase = if quit || frame >= self.total_frames() {
            SweepPhase::Done
        } else {
            self.boundaries.phase_at(frame).max(state.phase)
        };
        RunState {
            frame,
            phase,
            quit,
            iterations,
        }
    }
}

use crate::config::RunConfig;
use crate::display::{AbortSignal, Display};
use crate::sequencer::RunState;
use crate::session::ProtocolSession;
use anyhow::{Context, Result};
use retino_core::{Axis, BarPair, FrameCommands, MonitorGeometry, Orientation};
use retino_timing::{CalibrationStats, CounterError, FrameClock, HighPrecisionTimer, Timer};
use std::time::Duration;
use tracing::{info, warn};

/// Periodic bar-position lines while a run is in progress.
#[derive(Debug, Clone, Copy)]
pub struct ProgressReporter {
    enabled: bool,
    interval: u64,
}

impl ProgressReporter {
    pub fn new(enabled: bool, interval: u64) -> Self {
        Self {
            enabled,
            interval: interval.max(1),
        }
    }

    pub fn disabled() -> Self {
        Self::new(false, 1)
    }

    pub fn from_config(config: &RunConfig) -> Self {
        Self::new(config.session.verbose, config.session.print_interval)
    }

    /// Bar centre in degrees. Vertical bars are measured from the left edge
    /// of the covered field, horizontal bars from the horizon.
    pub fn bar_position_deg(geometry: &MonitorGeometry, bars: &BarPair) -> f64 {
        match bars.orientation {
            Orientation::Vertical => {
                let (neg, _) = geometry.coverage_extents(Axis::Horizontal);
                geometry.pixel_to_deg(bars.center(), Axis::Horizontal)
                    + geometry.pixel_to_deg(neg, Axis::Horizontal)
            }
            Orientation::Horizontal => geometry.pixel_to_deg(bars.center(), Axis::Vertical),
        }
    }

    fn report(&self, geometry: &MonitorGeometry, cmds: &FrameCommands) {
        if !self.enabled || cmds.frame % self.interval != 0 {
            return;
        }
        if let Some(bars) = &cmds.bars {
            info!(
                frame = cmds.frame,
                phase = cmds.phase.label(),
                "bar position: {:.1} deg",
                Self::bar_position_deg(geometry, bars)
            );
        }
    }
}

/// One run in progress: owns the frame clock and the wall clock driving the
/// checkerboard flicker, and holds the single mutable `RunState`.
pub struct ProtocolRun<'s, C: FrameClock> {
    session: &'s ProtocolSession,
    clock: C,
    timer: HighPrecisionTimer,
    state: RunState,
    progress: ProgressReporter,
    last_present_ns: Option<u64>,
}

impl<'s, C: FrameClock> ProtocolRun<'s, C> {
    pub fn start(session: &'s ProtocolSession, mut clock: C, progress: ProgressReporter) -> Self {
        clock.restart();
        info!(
            clock = %clock.describe(),
            total_frames = session.sequencer.total_frames(),
            "run started"
        );
        Self {
            session,
            clock,
            timer: HighPrecisionTimer::new(),
            state: session.sequencer.start(),
            progress,
            last_present_ns: None,
        }
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_finished()
    }

    /// Draw commands for this iteration.
    pub fn next_commands(&self) -> FrameCommands {
        let cmds = self
            .session
            .sequencer
            .frame_commands(&self.state, self.timer.elapsed_secs());
        self.progress.report(&self.session.geometry, &cmds);
        cmds
    }

    /// Closes an iteration after the frame was presented: re-reads the frame
    /// clock and folds in the abort poll. A counter error ends the run.
    pub fn complete_iteration(&mut self, quit: bool) -> Result<(), CounterError> {
        let now = self.timer.now();
        if let Some(prev) = self.last_present_ns.replace(now) {
            self.timer.record_frame(Duration::from_nanos(now.saturating_sub(prev)));
        }

        let frame = self.clock.current_frame()?;
        if frame < self.state.frame {
            warn!(frame, previous = self.state.frame, "frame clock went backwards");
        }
        let next = self.session.sequencer.advance(&self.state, frame, quit);
        if quit && !self.state.quit {
            info!(frame, "quit requested");
        }
        if next.phase != self.state.phase {
            info!(
                frame,
                from = self.state.phase.label(),
                to = next.phase.label(),
                "sweep phase changed"
            );
        }
        self.state = next;
        Ok(())
    }

    /// Refresh-interval statistics of the presented frames.
    pub fn present_stats(&self) -> CalibrationStats {
        self.timer.calibration_stats()
    }

    /// Releases the frame clock and hands back the final state.
    pub fn finish(mut self) -> Result<RunState, CounterError> {
        self.clock.release()?;
        info!(real_frames = self.state.frame, "stim over");
        Ok(self.state)
    }
}

/// Runs the protocol to completion or abort on a blocking display.
///
/// The frame clock is released on every exit path, including counter errors.
pub fn run_protocol<C, D, A>(
    session: &ProtocolSession,
    clock: C,
    display: &mut D,
    abort: &mut A,
    progress: ProgressReporter,
) -> Result<RunState>
where
    C: FrameClock,
    D: Display + ?Sized,
    A: AbortSignal + ?Sized,
{
    display.set_eyepoint(session.geometry.eyepoint());
    let mut run = ProtocolRun::start(session, clock, progress);
    let driven = drive(&mut run, session, display, abort);
    let stats = run.present_stats();
    let finished = run.finish();

    if let Err(e) = driven {
        if let Err(release) = finished {
            warn!("failed to release frame counter: {release}");
        }
        return Err(e);
    }
    info!(
        fps = format!("{:.1}", stats.effective_fps),
        jitter_ms = format!("{:.3}", stats.jitter_ns / 1e6),
        "presentation timing"
    );
    finished.context("releasing frame counter")
}

fn drive<C, D, A>(
    run: &mut ProtocolRun<'_, C>,
    session: &ProtocolSession,
    display: &mut D,
    abort: &mut A,
) -> Result<()>
where
    C: FrameClock,
    D: Display + ?Sized,
    A: AbortSignal + ?Sized,
{
    while !run.is_finished() {
        let cmds = run.next_commands();
        display.draw_checkerboard(&session.tiling, cmds.polarity)?;
        if let Some(bars) = &cmds.bars {
            display.draw_bars(bars)?;
        }
        display.present()?;
        let quit = abort.quit_requested();
        run.complete_iteration(quit)
            .context("reading frame counter")?;
    }
    Ok(())
}

use anyhow::Result;
use chrono::NaiveDate;
use retino_core::{BarPair, Orientation, Polarity, SweepPhase};
use retino_experiment::{
    run_protocol, AbortSignal, CheckerboardTiling, Display, ProgressReporter, ProtocolRun,
    ProtocolSession, RunConfig, RunOutcome, RunRecord, RunRecorder,
};
use retino_timing::{CounterError, FrameClock};
use std::cell::Cell;
use std::rc::Rc;

/// Advances by a fixed number of frames per read; optionally fails at a given read.
struct SteppingClock {
    frame: u64,
    step: u64,
    reads: u64,
    fail_at_read: Option<u64>,
    released: Rc<Cell<u32>>,
}

impl SteppingClock {
    fn new(step: u64) -> (Self, Rc<Cell<u32>>) {
        let released = Rc::new(Cell::new(0));
        (
            Self {
                frame: 0,
                step,
                reads: 0,
                fail_at_read: None,
                released: released.clone(),
            },
            released,
        )
    }
}

impl FrameClock for SteppingClock {
    fn current_frame(&mut self) -> Result<u64, CounterError> {
        self.reads += 1;
        if self.fail_at_read == Some(self.reads) {
            return Err(CounterError::Driver {
                call: "DAQmxReadCounterScalarU32",
                code: -200_279,
                message: "buffer overflow".into(),
            });
        }
        self.frame += self.step;
        Ok(self.frame)
    }

    fn release(&mut self) -> Result<(), CounterError> {
        self.released.set(self.released.get() + 1);
        Ok(())
    }

    fn describe(&self) -> String {
        format!("stepping clock (+{})", self.step)
    }
}

#[derive(Default)]
struct RecordingDisplay {
    eyepoint: Option<(f64, f64)>,
    checkerboards: Vec<Polarity>,
    bars: Vec<BarPair>,
    presents: usize,
}

impl Display for RecordingDisplay {
    fn resolution(&self) -> (u32, u32) {
        (1600, 900)
    }

    fn set_eyepoint(&mut self, eyepoint: (f64, f64)) {
        self.eyepoint = Some(eyepoint);
    }

    fn draw_checkerboard(&mut self, tiling: &CheckerboardTiling, polarity: Polarity) -> Result<()> {
        assert!(!tiling.is_empty());
        self.checkerboards.push(polarity);
        Ok(())
    }

    fn draw_bars(&mut self, bars: &BarPair) -> Result<()> {
        self.bars.push(*bars);
        Ok(())
    }

    fn present(&mut self) -> Result<()> {
        self.presents += 1;
        Ok(())
    }
}

struct AbortAfter(usize);

impl AbortSignal for AbortAfter {
    fn quit_requested(&mut self) -> bool {
        if self.0 == 0 {
            return true;
        }
        self.0 -= 1;
        false
    }
}

fn short_session() -> (RunConfig, ProtocolSession) {
    let mut cfg = RunConfig::default();
    cfg.session.subject_id = "IT01".into();
    cfg.session.trial_num = 1;
    cfg.stimulus.inter_trial_frame = 0;
    let session = ProtocolSession::from_config(&cfg).unwrap();
    (cfg, session)
}

#[test]
fn full_run_walks_all_sweeps_in_order_and_releases_once() {
    let (cfg, session) = short_session();
    let (clock, released) = SteppingClock::new(1);
    let mut display = RecordingDisplay::default();
    let mut abort = AbortAfter(usize::MAX);

    let state = run_protocol(
        &session,
        clock,
        &mut display,
        &mut abort,
        ProgressReporter::new(true, 100),
    )
    .unwrap();

    assert_eq!(released.get(), 1);
    assert!(state.is_finished());
    assert!(!state.quit);
    assert_eq!(state.real_frame_count(), 784);
    assert_eq!(state.total_iterations(), 784);
    // Frame 0 is drawn in the first sweep as well.
    assert_eq!(state.iterations, [247, 246, 146, 145]);

    assert_eq!(display.eyepoint, Some((0.5, 0.5)));
    assert_eq!(display.presents, 784);
    assert_eq!(display.checkerboards.len(), 784);
    assert_eq!(display.bars.len(), 784);

    let orientations: Vec<_> = display.bars.iter().map(|b| b.orientation).collect();
    let first_horizontal = orientations
        .iter()
        .position(|o| *o == Orientation::Horizontal)
        .unwrap();
    assert_eq!(first_horizontal, 493);
    assert!(orientations[first_horizontal..]
        .iter()
        .all(|o| *o == Orientation::Horizontal));

    let record = RunRecord::capture(
        &cfg,
        &session,
        &state,
        NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap(),
    );
    assert_eq!(record.outcome, RunOutcome::Complete);

    let dir = tempfile::tempdir().unwrap();
    let persisted = RunRecorder::new(Some(dir.path().to_path_buf()))
        .persist(&record)
        .unwrap()
        .unwrap();
    assert!(persisted.log_path.exists());
    assert!(persisted.snapshot_path.exists());
}

#[test]
fn quit_stops_the_run_and_suppresses_logs() {
    let (cfg, session) = short_session();
    let (clock, released) = SteppingClock::new(1);
    let mut display = RecordingDisplay::default();
    let mut abort = AbortAfter(50);

    let state = run_protocol(
        &session,
        clock,
        &mut display,
        &mut abort,
        ProgressReporter::disabled(),
    )
    .unwrap();

    assert_eq!(released.get(), 1);
    assert!(state.quit);
    assert_eq!(state.phase, SweepPhase::Done);
    assert_eq!(state.real_frame_count(), 51);
    assert_eq!(display.presents, 51);

    let record = RunRecord::capture(
        &cfg,
        &session,
        &state,
        NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap(),
    );
    assert_eq!(record.outcome, RunOutcome::Interrupted);
    let dir = tempfile::tempdir().unwrap();
    let recorder = RunRecorder::new(Some(dir.path().to_path_buf()));
    assert!(recorder.persist(&record).unwrap().is_none());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn counter_failure_aborts_but_still_releases() {
    let (_, session) = short_session();
    let (mut clock, released) = SteppingClock::new(1);
    clock.fail_at_read = Some(10);
    let mut display = RecordingDisplay::default();
    let mut abort = AbortAfter(usize::MAX);

    let err = run_protocol(
        &session,
        clock,
        &mut display,
        &mut abort,
        ProgressReporter::disabled(),
    )
    .unwrap_err();

    assert_eq!(released.get(), 1);
    assert_eq!(display.presents, 10);
    let counter = err.downcast_ref::<CounterError>().unwrap();
    assert!(matches!(counter, CounterError::Driver { code: -200_279, .. }));
}

#[test]
fn skipped_frames_jump_phases_without_going_back() {
    let (_, session) = short_session();
    let (clock, released) = SteppingClock::new(100);
    let mut run = ProtocolRun::start(&session, clock, ProgressReporter::disabled());

    let mut phases = vec![run.state().phase];
    while !run.is_finished() {
        let cmds = run.next_commands();
        assert_eq!(cmds.phase, run.state().phase);
        run.complete_iteration(false).unwrap();
        phases.push(run.state().phase);
    }
    assert!(phases.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(
        phases,
        vec![
            SweepPhase::LeftToRight,
            SweepPhase::LeftToRight,
            SweepPhase::LeftToRight,
            SweepPhase::RightToLeft,
            SweepPhase::RightToLeft,
            SweepPhase::BottomToTop,
            SweepPhase::BottomToTop,
            SweepPhase::TopToBottom,
            SweepPhase::Done,
        ]
    );

    let state = run.finish().unwrap();
    assert_eq!(state.real_frame_count(), 800);
    assert_eq!(released.get(), 1);
}

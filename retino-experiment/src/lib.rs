pub mod config;
pub mod display;
pub mod recorder;
pub mod runner;
pub mod schedule;
pub mod sequencer;
pub mod session;

pub use config::{ConfigError, RunConfig};
pub use display::{AbortFlag, AbortSignal, Display};
pub use recorder::{PersistedRun, RunOutcome, RunRecord, RunRecorder};
pub use runner::{run_protocol, ProgressReporter, ProtocolRun};
pub use schedule::{CheckerboardTiling, ScheduleError, SweepSchedule, SweepTrack, Tile};
pub use sequencer::{PhaseBoundaries, RunState, Sequencer};
pub use session::ProtocolSession;

pub mod clock;
pub mod counter;
pub mod daq;
pub mod error;
pub mod timer;

pub use clock::{FrameClock, FreeRunningClock};
pub use counter::{CounterClock, CounterDevice};
pub use daq::NiDaqCounter;
pub use error::CounterError;
pub use timer::{CalibrationStats, HighPrecisionTimer, Timer};

pub mod geometry;
pub mod params;
pub mod phase;
pub mod stimulus;

pub use geometry::{Axis, MonitorGeometry};
pub use params::StimulusParameters;
pub use phase::{Phase, SweepPhase};
pub use stimulus::{BarPair, FrameCommands, Orientation, Polarity, MASK_GREY};

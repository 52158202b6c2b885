use crate::geometry::Axis;
use crate::phase::SweepPhase;
use serde::{Deserialize, Serialize};

/// Fill of the two edge masks; matches the grey background so only the gap shows.
pub const MASK_GREY: [u8; 4] = [128, 128, 128, 255];

/// Contrast polarity of the checkerboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Polarity {
    Inverted,
    Normal,
}

impl Polarity {
    pub fn sign(self) -> i8 {
        match self {
            Polarity::Inverted => -1,
            Polarity::Normal => 1,
        }
    }

    /// Polarity at `elapsed_secs` of wall-clock time for a board flipping at
    /// `flip_rate_hz`: `floor((t * 2 * rate) mod 2)` selects [Inverted, Normal].
    pub fn at(elapsed_secs: f64, flip_rate_hz: f64) -> Self {
        let slot = (elapsed_secs * 2.0 * flip_rate_hz).rem_euclid(2.0).floor();
        // rem_euclid may round up to 2.0
        if slot < 1.0 {
            Polarity::Inverted
        } else {
            Polarity::Normal
        }
    }
}

/// Orientation of the visible bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Orientation {
    /// Vertical bar, sweeps along x.
    Vertical,
    /// Horizontal bar, sweeps along y.
    Horizontal,
}

impl Orientation {
    pub fn sweep_axis(self) -> Axis {
        match self {
            Orientation::Vertical => Axis::Horizontal,
            Orientation::Horizontal => Axis::Vertical,
        }
    }
}

/// Two full-screen masks whose gap forms the bar. Positions are centre-origin
/// pixels along the sweep axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BarPair {
    pub orientation: Orientation,
    pub leading: i64,
    pub trailing: i64,
    pub fill: [u8; 4],
}

impl BarPair {
    pub fn center(&self) -> f64 {
        0.5 * (self.leading + self.trailing) as f64
    }
}

/// Everything the display needs for one iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameCommands {
    pub frame: u64,
    pub phase: SweepPhase,
    pub polarity: Polarity,
    pub bars: Option<BarPair>,
}

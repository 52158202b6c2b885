use crate::schedule::CheckerboardTiling;
use anyhow::Result;
use retino_core::{BarPair, Polarity};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Drawable surface the stimulus is presented on.
pub trait Display {
    fn resolution(&self) -> (u32, u32);

    /// Normalised eye point for the surface's cylindrical warp.
    fn set_eyepoint(&mut self, _eyepoint: (f64, f64)) {}

    fn draw_checkerboard(&mut self, tiling: &CheckerboardTiling, polarity: Polarity)
        -> Result<()>;

    fn draw_bars(&mut self, bars: &BarPair) -> Result<()>;

    /// Shows the frame; blocks until the next display refresh.
    fn present(&mut self) -> Result<()>;
}

/// Reports whether a quit was requested since the last poll.
pub trait AbortSignal {
    fn quit_requested(&mut self) -> bool;
}

/// Shared quit flag set from an input handler or signal handler.
#[derive(Debug, Clone, Default)]
pub struct AbortFlag(Arc<AtomicBool>);

impl AbortFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl AbortSignal for AbortFlag {
    fn quit_requested(&mut self) -> bool {
        self.is_requested()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let flag = AbortFlag::new();
        let mut poller = flag.clone();
        assert!(!poller.quit_requested());
        flag.request();
        assert!(poller.quit_requested());
    }
}

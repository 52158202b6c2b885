use crate::stimulus::Orientation;
use serde::Serialize;

/// Ordered run phases that only ever move forward.
pub trait Phase: Copy + Clone + PartialEq + Send + Sync + std::fmt::Debug + Default {
    fn next(&self) -> Option<Self>;

    fn is_terminal(&self) -> bool {
        self.next().is_none()
    }
}

/// The four sweep directions of a run, in presentation order, then `Done`.
///
/// Positions are centre-origin with +y at the top of the screen, so the
/// forward horizontal sweep travels bottom to top.
#[derive(Copy, Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum SweepPhase {
    LeftToRight,
    RightToLeft,
    BottomToTop,
    TopToBottom,
    Done,
}

impl Default for SweepPhase {
    fn default() -> Self {
        SweepPhase::LeftToRight
    }
}

impl Phase for SweepPhase {
    fn next(&self) -> Option<Self> {
        use SweepPhase::*;
        Some(match self {
            LeftToRight => RightToLeft,
            RightToLeft => BottomToTop,
            BottomToTop => TopToBottom,
            TopToBottom => Done,
            Done => return None,
        })
    }
}

impl SweepPhase {
    pub const SWEEPS: [SweepPhase; 4] = [
        SweepPhase::LeftToRight,
        SweepPhase::RightToLeft,
        SweepPhase::BottomToTop,
        SweepPhase::TopToBottom,
    ];

    /// Position in `SWEEPS`, `None` for `Done`.
    pub fn sweep_index(&self) -> Option<usize> {
        Self::SWEEPS.iter().position(|p| p == self)
    }

    /// Orientation of the bar drawn during this phase.
    pub fn orientation(&self) -> Option<Orientation> {
        match self {
            SweepPhase::LeftToRight | SweepPhase::RightToLeft => Some(Orientation::Vertical),
            SweepPhase::BottomToTop | SweepPhase::TopToBottom => Some(Orientation::Horizontal),
            SweepPhase::Done => None,
        }
    }

    /// Mirrored sweeps reuse the forward track negated.
    pub fn is_reverse(&self) -> bool {
        matches!(self, SweepPhase::RightToLeft | SweepPhase::TopToBottom)
    }

    pub fn label(&self) -> &'static str {
        match self {
            SweepPhase::LeftToRight => "L2R",
            SweepPhase::RightToLeft => "R2L",
            SweepPhase::BottomToTop => "D2U",
            SweepPhase::TopToBottom => "U2D",
            SweepPhase::Done => "done",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_walk_forward_to_done() {
        let mut phase = SweepPhase::default();
        let mut seen = vec![phase];
        while let Some(next) = phase.next() {
            assert!(next > phase);
            phase = next;
            seen.push(phase);
        }
        assert_eq!(seen.len(), 5);
        assert!(phase.is_terminal());
        assert_eq!(phase.orientation(), None);
    }

    #[test]
    fn sweep_index_follows_presentation_order() {
        for (i, p) in SweepPhase::SWEEPS.iter().enumerate() {
            assert_eq!(p.sweep_index(), Some(i));
        }
        assert_eq!(SweepPhase::Done.sweep_index(), None);
        assert!(SweepPhase::RightToLeft.is_reverse());
        assert!(!SweepPhase::BottomToTop.is_reverse());
    }
}

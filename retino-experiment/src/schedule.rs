use retino_core::{Axis, MonitorGeometry, Orientation, SweepPhase, StimulusParameters};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScheduleError {
    /// Bar speed below one pixel per frame; the sweep would never advance.
    #[error("bar moves {px_per_frame:.3} px per frame; need at least 1")]
    ZeroDisplacement { px_per_frame: f64 },

    #[error("checkerboard square is {0:.3} px wide; need at least 1")]
    ZeroSquareSize(f64),
}

/// Leading and trailing mask positions for one trial of one direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepTrack {
    pub leading: Vec<i64>,
    pub trailing: Vec<i64>,
}

impl SweepTrack {
    pub fn len(&self) -> usize {
        self.leading.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leading.is_empty()
    }

    pub fn at(&self, index: usize) -> Option<(i64, i64)> {
        Some((*self.leading.get(index)?, *self.trailing.get(index)?))
    }

    /// Pointwise negation. Order is kept, so the mirrored sweep starts at
    /// the mirrored start point rather than replaying the forward one backwards.
    pub fn mirrored(&self) -> Self {
        Self {
            leading: self.leading.iter().map(|p| -p).collect(),
            trailing: self.trailing.iter().map(|p| -p).collect(),
        }
    }

    fn padded(mut self, pad: usize) -> Self {
        if let (Some(&lead), Some(&trail)) = (self.leading.first(), self.trailing.first()) {
            self.leading.splice(0..0, std::iter::repeat(lead).take(pad));
            self.trailing.splice(0..0, std::iter::repeat(trail).take(pad));
        }
        self
    }
}

/// Per-frame bar displacement in pixels, shared by both sweep axes.
pub fn displacement_per_frame(geometry: &MonitorGeometry, params: &StimulusParameters) -> f64 {
    (geometry.deg_to_pixel(params.bar_speed_deg_per_sec, Axis::Horizontal) / params.sample_rate_hz)
        .floor()
}

/// Bar width in pixels for bars sweeping along `axis`.
pub fn bar_width_px(geometry: &MonitorGeometry, params: &StimulusParameters, axis: Axis) -> f64 {
    geometry.deg_to_pixel(params.bar_width_deg, axis).floor()
}

/// Precomputed bar positions for the four sweep directions.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepSchedule {
    pub forward_vertical: SweepTrack,
    pub reverse_vertical: SweepTrack,
    pub forward_horizontal: SweepTrack,
    pub reverse_horizontal: SweepTrack,
    pub step_px: i64,
    pub vertical_bar_width_px: i64,
    pub horizontal_bar_width_px: i64,
}

impl SweepSchedule {
    pub fn build(
        geometry: &MonitorGeometry,
        params: &StimulusParameters,
    ) -> Result<Self, ScheduleError> {
        let step = displacement_per_frame(geometry, params);
        if !(step >= 1.0) {
            return Err(ScheduleError::ZeroDisplacement { px_per_frame: step });
        }
        let step = step as i64;
        let (forward_vertical, reverse_vertical) =
            Self::build_axis(geometry, params, Axis::Horizontal, step);
        let (forward_horizontal, reverse_horizontal) =
            Self::build_axis(geometry, params, Axis::Vertical, step);

        Ok(Self {
            forward_vertical,
            reverse_vertical,
            forward_horizontal,
            reverse_horizontal,
            step_px: step,
            vertical_bar_width_px: bar_width_px(geometry, params, Axis::Horizontal) as i64,
            horizontal_bar_width_px: bar_width_px(geometry, params, Axis::Vertical) as i64,
        })
    }

    /// Forward and mirrored tracks for bars sweeping along `axis`.
    ///
    /// Leading positions run `0, step, 2*step, ...` while below the sweep
    /// extent (resolution plus bar width); the last partial step is dropped.
    /// Trailing positions trail by exactly one extent.
    fn build_axis(
        geometry: &MonitorGeometry,
        params: &StimulusParameters,
        axis: Axis,
        step: i64,
    ) -> (SweepTrack, SweepTrack) {
        let extent = geometry.resolution_along(axis) as i64
            + bar_width_px(geometry, params, axis) as i64;
        let leading: Vec<i64> = (0..extent).step_by(step as usize).collect();
        let trailing = leading.iter().map(|p| p - extent).collect();
        let forward = SweepTrack { leading, trailing };
        let reverse = forward.mirrored();
        let pad = params.inter_trial_frame;
        (forward.padded(pad), reverse.padded(pad))
    }

    pub fn track(&self, phase: SweepPhase) -> Option<&SweepTrack> {
        match phase {
            SweepPhase::LeftToRight => Some(&self.forward_vertical),
            SweepPhase::RightToLeft => Some(&self.reverse_vertical),
            SweepPhase::BottomToTop => Some(&self.forward_horizontal),
            SweepPhase::TopToBottom => Some(&self.reverse_horizontal),
            SweepPhase::Done => None,
        }
    }

    /// Frames in one trial of a vertical-bar sweep.
    pub fn vertical_len(&self) -> usize {
        self.forward_vertical.len()
    }

    /// Frames in one trial of a horizontal-bar sweep.
    pub fn horizontal_len(&self) -> usize {
        self.forward_horizontal.len()
    }

    pub fn len_for(&self, orientation: Orientation) -> usize {
        match orientation {
            Orientation::Vertical => self.vertical_len(),
            Orientation::Horizontal => self.horizontal_len(),
        }
    }
}

/// One checkerboard square; centre in centre-origin pixels, y up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tile {
    pub x: f64,
    pub y: f64,
    pub sign: i8,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct AxisLayout {
    start: f64,
    stop: f64,
    count: usize,
}

impl AxisLayout {
    fn new(geometry: &MonitorGeometry, axis: Axis, square: f64) -> Self {
        let (neg, pos) = geometry.coverage_extents(axis);
        let neg_n = (neg / square).abs().ceil() + 1.0;
        let pos_n = (pos / square).abs().ceil() + 1.0;
        Self {
            start: -(neg_n + 0.5) * square - square / 2.0,
            stop: (pos_n + 0.5) * square,
            count: (neg_n + pos_n + 1.0) as usize,
        }
    }

    fn center(&self, i: usize, square: f64) -> f64 {
        self.start + i as f64 * square
    }
}

/// Alternating-sign square tiling covering the display plus the gaze-offset margins.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckerboardTiling {
    pub square_size_px: f64,
    pub columns: usize,
    pub rows: usize,
    /// Column-major: all rows of column 0, then column 1, ...
    pub tiles: Vec<Tile>,
    x_layout: AxisLayout,
    y_layout: AxisLayout,
}

impl CheckerboardTiling {
    pub fn build(
        geometry: &MonitorGeometry,
        params: &StimulusParameters,
    ) -> Result<Self, ScheduleError> {
        let square = geometry
            .deg_to_pixel(params.square_size_deg, Axis::Horizontal)
            .floor();
        if !(square >= 1.0) {
            return Err(ScheduleError::ZeroSquareSize(square));
        }
        let x_layout = AxisLayout::new(geometry, Axis::Horizontal, square);
        let y_layout = AxisLayout::new(geometry, Axis::Vertical, square);

        let mut tiles = Vec::with_capacity(x_layout.count * y_layout.count);
        for i in 0..x_layout.count {
            for j in 0..y_layout.count {
                tiles.push(Tile {
                    x: x_layout.center(i, square),
                    y: y_layout.center(j, square),
                    sign: if (i + j) % 2 == 0 { 1 } else { -1 },
                });
            }
        }

        Ok(Self {
            square_size_px: square,
            columns: x_layout.count,
            rows: y_layout.count,
            tiles,
            x_layout,
            y_layout,
        })
    }

    /// Half-open coordinate range the tile grid is laid out on along `axis`.
    pub fn bounds(&self, axis: Axis) -> (f64, f64) {
        let layout = match axis {
            Axis::Horizontal => &self.x_layout,
            Axis::Vertical => &self.y_layout,
        };
        (layout.start, layout.stop)
    }

    pub fn tile(&self, column: usize, row: usize) -> Option<&Tile> {
        if column >= self.columns || row >= self.rows {
            return None;
        }
        self.tiles.get(column * self.rows + row)
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }
}

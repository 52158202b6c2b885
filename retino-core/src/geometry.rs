use serde::{Deserialize, Serialize};

/// Screen axis. Horizontal is axis 0, vertical is axis 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    Horizontal,
    Vertical,
}

impl Axis {
    pub fn index(self) -> usize {
        match self {
            Axis::Horizontal => 0,
            Axis::Vertical => 1,
        }
    }

    fn pick<T: Copy>(self, pair: (T, T)) -> T {
        match self {
            Axis::Horizontal => pair.0,
            Axis::Vertical => pair.1,
        }
    }
}

/// Physical layout of the stimulation monitor relative to the eye.
///
/// Built once from configuration and never mutated during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorGeometry {
    /// Resolution in pixels, (width, height).
    pub resolution: (u32, u32),
    /// Visible area in cm, (width, height), bezel excluded.
    pub size_cm: (f64, f64),
    /// Eye to screen distance in cm.
    pub distance_cm: f64,
    /// Projection of the optical axis on the screen, in cm from the screen centre.
    pub gaze_center_cm: (f64, f64),
}

impl MonitorGeometry {
    pub fn resolution_along(&self, axis: Axis) -> f64 {
        axis.pick(self.resolution) as f64
    }

    pub fn size_along(&self, axis: Axis) -> f64 {
        axis.pick(self.size_cm)
    }

    /// Visual angle to on-screen distance.
    ///
    /// `angle_deg` must stay strictly inside (-90, 90); the tangent is not guarded.
    pub fn deg_to_pixel(&self, angle_deg: f64, axis: Axis) -> f64 {
        self.resolution_along(axis) * self.distance_cm * angle_deg.to_radians().tan()
            / self.size_along(axis)
    }

    /// On-screen distance to visual angle.
    pub fn pixel_to_deg(&self, pixels: f64, axis: Axis) -> f64 {
        let cm = self.size_along(axis) * pixels / self.resolution_along(axis);
        (cm / self.distance_cm).atan().to_degrees()
    }

    pub fn cm_to_pixel(&self, cm: f64, axis: Axis) -> f64 {
        cm * self.resolution_along(axis) / self.size_along(axis)
    }

    pub fn gaze_center_px(&self, axis: Axis) -> f64 {
        self.cm_to_pixel(axis.pick(self.gaze_center_cm), axis)
    }

    /// Extents (negative side, positive side) in pixels that the checkerboard
    /// has to cover around the gaze centre.
    pub fn coverage_extents(&self, axis: Axis) -> (f64, f64) {
        let res = self.resolution_along(axis);
        let gaze = self.gaze_center_px(axis);
        (res + gaze, res - gaze)
    }

    /// Normalised eye point used by the display's cylindrical warp; 0.5 is centred.
    pub fn eyepoint(&self) -> (f64, f64) {
        let along = |axis: Axis| {
            let size = self.size_along(axis);
            (axis.pick(self.gaze_center_cm) + size / 2.0) / size
        };
        (along(Axis::Horizontal), along(Axis::Vertical))
    }

    /// Azimuth range in degrees covered by the stimulus.
    pub fn visual_azimuth(&self) -> (f64, f64) {
        let (neg, pos) = self.coverage_extents(Axis::Horizontal);
        (
            0.0,
            self.pixel_to_deg(neg, Axis::Horizontal) + self.pixel_to_deg(pos, Axis::Horizontal),
        )
    }

    /// Elevation range in degrees covered by the stimulus.
    pub fn visual_elevation(&self) -> (f64, f64) {
        let (neg, pos) = self.coverage_extents(Axis::Vertical);
        (
            -self.pixel_to_deg(neg, Axis::Vertical),
            self.pixel_to_deg(pos, Axis::Vertical),
        )
    }
}

impl Default for MonitorGeometry {
    fn default() -> Self {
        Self {
            resolution: (1600, 900),
            size_cm: (70.9, 39.9),
            distance_cm: 20.0,
            gaze_center_cm: (0.0, 0.0),
        }
    }
}

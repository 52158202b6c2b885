use anyhow::{Context, Result};
use retino_core::{BarPair, Polarity};
use retino_experiment::{
    run_protocol, AbortFlag, CheckerboardTiling, Display, ProgressReporter, ProtocolSession,
    RunConfig, RunState,
};
use retino_render::SkiaRenderer;
use retino_timing::{FrameClock, HighPrecisionTimer, Timer};
use tracing::{debug, info};

pub const HEADLESS_REFRESH_HZ: f64 = 60.0;

/// Off-screen display: rasterises into a private buffer and paces presents
/// to a fixed refresh rate.
pub struct OffscreenDisplay {
    renderer: SkiaRenderer,
    frame: Vec<u8>,
    pacer: HighPrecisionTimer,
    refresh_hz: f64,
    presented: u64,
}

impl OffscreenDisplay {
    pub fn new(
        width: u32,
        height: u32,
        tiling: &CheckerboardTiling,
        refresh_hz: f64,
    ) -> Result<Self> {
        Ok(Self {
            renderer: SkiaRenderer::with_tiling(width, height, tiling)?,
            frame: vec![0; width as usize * height as usize * 4],
            pacer: HighPrecisionTimer::new(),
            refresh_hz,
            presented: 0,
        })
    }

    pub fn frame(&self) -> &[u8] {
        &self.frame
    }

    pub fn presented(&self) -> u64 {
        self.presented
    }
}

impl Display for OffscreenDisplay {
    fn resolution(&self) -> (u32, u32) {
        self.renderer.size()
    }

    fn set_eyepoint(&mut self, eyepoint: (f64, f64)) {
        debug!(?eyepoint, "no warp off-screen");
    }

    fn draw_checkerboard(&mut self, tiling: &CheckerboardTiling, polarity: Polarity) -> Result<()> {
        self.renderer.draw_checkerboard(tiling, polarity)
    }

    fn draw_bars(&mut self, bars: &BarPair) -> Result<()> {
        self.renderer.draw_bars(bars)
    }

    fn present(&mut self) -> Result<()> {
        self.renderer.copy_to(&mut self.frame)?;
        if self.presented == 0 {
            self.pacer.reset();
        }
        self.presented += 1;
        let tick = self.pacer.now();
        self.pacer
            .sleep_until_secs(self.presented as f64 / self.refresh_hz);
        let waited = self.pacer.elapsed(tick);
        self.pacer.record_frame(waited);
        Ok(())
    }
}

/// Runs the protocol without a window; Ctrl-C aborts at the next iteration.
pub fn run(
    config: &RunConfig,
    session: &ProtocolSession,
    clock: Box<dyn FrameClock>,
    progress: ProgressReporter,
) -> Result<RunState> {
    let mut abort = AbortFlag::new();
    let handler = abort.clone();
    ctrlc::set_handler(move || handler.request()).context("installing Ctrl-C handler")?;

    let (width, height) = config.monitor.resolution;
    let mut display = OffscreenDisplay::new(width, height, &session.tiling, HEADLESS_REFRESH_HZ)?;
    info!(width, height, refresh_hz = HEADLESS_REFRESH_HZ, "headless presentation");

    let state = run_protocol(session, clock, &mut display, &mut abort, progress)?;
    let presented = display.presented();
    info!(presented, "headless run ended");
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use retino_core::{MonitorGeometry, StimulusParameters, MASK_GREY};

    #[test]
    fn present_copies_canvas_and_paces() {
        let geometry = MonitorGeometry {
            resolution: (160, 90),
            ..MonitorGeometry::default()
        };
        let tiling = CheckerboardTiling::build(&geometry, &StimulusParameters::default()).unwrap();
        let mut display = OffscreenDisplay::new(160, 90, &tiling, 500.0).unwrap();
        assert_eq!(display.resolution(), (160, 90));

        display.draw_checkerboard(&tiling, Polarity::Normal).unwrap();
        let started = std::time::Instant::now();
        display.present().unwrap();
        display.present().unwrap();
        assert!(started.elapsed().as_secs_f64() >= 1.0 / 500.0);
        assert_eq!(display.presented(), 2);

        let centre = (45 * 160 + 80) * 4;
        assert_eq!(&display.frame()[centre..centre + 4], &[255, 255, 255, 255]);

        display
            .draw_bars(&BarPair {
                orientation: retino_core::Orientation::Vertical,
                leading: 0,
                trailing: -172,
                fill: MASK_GREY,
            })
            .unwrap();
        display.present().unwrap();
        assert_eq!(&display.frame()[centre..centre + 4], &MASK_GREY);
    }
}

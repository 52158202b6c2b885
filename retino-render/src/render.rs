use anyhow::{bail, Context, Result};
use bytemuck::cast_slice;
use retino_core::{BarPair, FrameCommands, Orientation, Polarity, MASK_GREY};
use retino_experiment::CheckerboardTiling;
use retino_timing::{CalibrationStats, HighPrecisionTimer, Timer};
use std::collections::HashMap;
use std::time::Duration;
use tiny_skia::{Color, Paint, Pixmap, Rect, Transform};

const WHITE: [u8; 4] = [255, 255, 255, 255];
const BLACK: [u8; 4] = [0, 0, 0, 255];

fn pack(rgba: [u8; 4]) -> u32 {
    u32::from_ne_bytes(rgba)
}

fn color(rgba: [u8; 4]) -> Color {
    Color::from_rgba8(rgba[0], rgba[1], rgba[2], rgba[3])
}

fn board_slot(polarity: Polarity) -> usize {
    match polarity {
        Polarity::Inverted => 0,
        Polarity::Normal => 1,
    }
}

/// Snaps a screen coordinate to a pixel edge inside `[0, limit]`.
fn clamp_px(v: f64, limit: usize) -> usize {
    v.floor().clamp(0.0, limit as f64) as usize
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FrameStats {
    pub checkerboard: Duration,
    pub bars: Duration,
    pub copy: Duration,
    pub total: Duration,
}

/// Software renderer for the checkerboard and the bar masks.
///
/// Both board polarities are rasterised once per tiling; a frame is a memcpy
/// of the active board followed by two mask fills.
pub struct SkiaRenderer {
    width: u32,
    height: u32,
    center: (f32, f32),

    canvas: Pixmap,
    boards: Vec<Pixmap>,
    board_tiling: Option<CheckerboardTiling>,
    bar_paint: Paint<'static>,

    component_timers: HashMap<&'static str, HighPrecisionTimer>,
    stopwatch: HighPrecisionTimer,
}

impl SkiaRenderer {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        let mut canvas = Pixmap::new(width, height)
            .with_context(|| format!("cannot allocate {width}x{height} canvas"))?;
        canvas.fill(color(MASK_GREY));

        let mut bar_paint = Paint::default();
        bar_paint.anti_alias = false;
        bar_paint.set_color(color(MASK_GREY));

        Ok(Self {
            width,
            height,
            center: (width as f32 / 2.0, height as f32 / 2.0),
            canvas,
            boards: Vec::with_capacity(2),
            board_tiling: None,
            bar_paint,
            component_timers: ["checkerboard", "bars", "copy", "total"]
                .iter()
                .map(|&k| (k, HighPrecisionTimer::new()))
                .collect(),
            stopwatch: HighPrecisionTimer::new(),
        })
    }

    pub fn with_tiling(width: u32, height: u32, tiling: &CheckerboardTiling) -> Result<Self> {
        let mut renderer = Self::new(width, height)?;
        renderer.prepare_checkerboard(tiling)?;
        Ok(renderer)
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn canvas(&self) -> &Pixmap {
        &self.canvas
    }

    /// Straight RGBA of a canvas pixel. The canvas is opaque, so this equals
    /// the premultiplied value.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        let p = self.canvas.pixel(x, y)?;
        Some([p.red(), p.green(), p.blue(), p.alpha()])
    }

    pub fn prepare_checkerboard(&mut self, tiling: &CheckerboardTiling) -> Result<()> {
        let inverted = self.rasterize_board(tiling, Polarity::Inverted)?;
        let normal = self.rasterize_board(tiling, Polarity::Normal)?;
        self.boards = vec![inverted, normal];
        self.board_tiling = Some(tiling.clone());
        Ok(())
    }

    fn rasterize_board(&self, tiling: &CheckerboardTiling, polarity: Polarity) -> Result<Pixmap> {
        let w = self.width as usize;
        let h = self.height as usize;
        let mut pixels = vec![pack(MASK_GREY); w * h];

        let half = tiling.square_size_px / 2.0;
        let cx = self.center.0 as f64;
        let cy = self.center.1 as f64;
        for tile in &tiling.tiles {
            // Board y points up, screen rows point down.
            let x0 = clamp_px(cx + tile.x - half, w);
            let x1 = clamp_px(cx + tile.x + half, w);
            let y0 = clamp_px(cy - tile.y - half, h);
            let y1 = clamp_px(cy - tile.y + half, h);
            if x0 >= x1 || y0 >= y1 {
                continue;
            }
            let value = if tile.sign * polarity.sign() > 0 {
                pack(WHITE)
            } else {
                pack(BLACK)
            };
            for row in y0..y1 {
                pixels[row * w + x0..row * w + x1].fill(value);
            }
        }

        let mut board = Pixmap::new(self.width, self.height)
            .context("cannot allocate checkerboard pixmap")?;
        board.data_mut().copy_from_slice(cast_slice(&pixels));
        Ok(board)
    }

    pub fn draw_checkerboard(
        &mut self,
        tiling: &CheckerboardTiling,
        polarity: Polarity,
    ) -> Result<()> {
        if self.board_tiling.as_ref() != Some(tiling) {
            self.prepare_checkerboard(tiling)?;
        }
        let board = &self.boards[board_slot(polarity)];
        self.canvas.data_mut().copy_from_slice(board.data());
        Ok(())
    }

    /// Fills both screen-sized masks; the uncovered gap between them is the bar.
    pub fn draw_bars(&mut self, bars: &BarPair) -> Result<()> {
        self.bar_paint.set_color(color(bars.fill));
        let (w, h) = (self.width as f32, self.height as f32);
        for pos in [bars.leading, bars.trailing] {
            let pos = pos as f32;
            let rect = match bars.orientation {
                Orientation::Vertical => Rect::from_xywh(self.center.0 + pos - w / 2.0, 0.0, w, h),
                Orientation::Horizontal => {
                    Rect::from_xywh(0.0, self.center.1 - pos - h / 2.0, w, h)
                }
            }
            .with_context(|| format!("invalid mask rect at {pos}"))?;
            self.canvas
                .fill_rect(rect, &self.bar_paint, Transform::identity(), None);
        }
        Ok(())
    }

    /// Copies the canvas into an RGBA8 frame buffer of the same size.
    pub fn copy_to(&self, frame_buffer: &mut [u8]) -> Result<()> {
        let src = self.canvas.data();
        if frame_buffer.len() != src.len() {
            bail!(
                "frame buffer holds {} bytes, canvas {}x{} needs {}",
                frame_buffer.len(),
                self.width,
                self.height,
                src.len()
            );
        }
        frame_buffer.copy_from_slice(src);
        Ok(())
    }

    pub fn render_frame(
        &mut self,
        tiling: &CheckerboardTiling,
        cmds: &FrameCommands,
        frame_buffer: &mut [u8],
    ) -> Result<FrameStats> {
        let t_board = {
            let t = self.stopwatch.now();
            self.draw_checkerboard(tiling, cmds.polarity)?;
            self.stopwatch.elapsed(t)
        };
        let t_bars = {
            let t = self.stopwatch.now();
            if let Some(bars) = &cmds.bars {
                self.draw_bars(bars)?;
            }
            self.stopwatch.elapsed(t)
        };
        let t_copy = {
            let t = self.stopwatch.now();
            self.copy_to(frame_buffer)?;
            self.stopwatch.elapsed(t)
        };

        let total = t_board + t_bars + t_copy;
        for (key, d) in [
            ("checkerboard", t_board),
            ("bars", t_bars),
            ("copy", t_copy),
            ("total", total),
        ] {
            if let Some(timer) = self.component_timers.get_mut(key) {
                timer.record_frame(d);
            }
        }

        Ok(FrameStats {
            checkerboard: t_board,
            bars: t_bars,
            copy: t_copy,
            total,
        })
    }

    /// Timing statistics for one of `checkerboard`, `bars`, `copy` or `total`.
    pub fn component_stats(&self, component: &str) -> Option<CalibrationStats> {
        self.component_timers
            .get(component)
            .map(|t| t.calibration_stats())
    }
}

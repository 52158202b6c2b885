use anyhow::{anyhow, Context, Result};
use pixels::{Pixels, SurfaceTexture};
use retino_experiment::{AbortFlag, ProgressReporter, ProtocolRun, ProtocolSession, RunConfig, RunState};
use retino_render::{FrameStats, SkiaRenderer};
use retino_timing::FrameClock;
use std::sync::Arc;
use tracing::{debug, error, warn};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Fullscreen, Window, WindowId},
};

type BoxedClock = Box<dyn FrameClock>;

/// Fullscreen presentation: one sequencer iteration per redraw, with
/// `Pixels::render` as the blocking present.
pub struct App<'s> {
    config: &'s RunConfig,
    session: &'s ProtocolSession,
    progress: ProgressReporter,

    clock: Option<BoxedClock>,
    run: Option<ProtocolRun<'s, BoxedClock>>,
    abort: AbortFlag,

    window: Option<Arc<Window>>,
    pixels: Option<Pixels<'static>>,
    renderer: Option<SkiaRenderer>,
    refresh_rate: Option<f64>,

    failure: Option<anyhow::Error>,
}

impl<'s> App<'s> {
    pub fn new(
        config: &'s RunConfig,
        session: &'s ProtocolSession,
        clock: BoxedClock,
        progress: ProgressReporter,
    ) -> Self {
        Self {
            config,
            session,
            progress,
            clock: Some(clock),
            run: None,
            abort: AbortFlag::new(),
            window: None,
            pixels: None,
            renderer: None,
            refresh_rate: None,
            failure: None,
        }
    }

    /// Runs the event loop until the protocol ends, then releases the clock.
    pub fn run(mut self) -> Result<RunState> {
        #[cfg(target_os = "windows")]
        {
            unsafe {
                windows::Win32::Media::timeBeginPeriod(1);
            }
        }

        println!("=== RETINOTOPIC MAPPING ===");
        println!("Platform: {}", std::env::consts::OS);
        println!("Subject: {}", self.config.session.subject_id);
        println!("Press ESC or Q to abort.\n");

        let looped = EventLoop::new()
            .map_err(anyhow::Error::from)
            .and_then(|event_loop| event_loop.run_app(&mut self).map_err(Into::into));

        #[cfg(target_os = "windows")]
        {
            unsafe {
                windows::Win32::Media::timeEndPeriod(1);
            }
        }

        let finished = match self.run.take() {
            Some(run) => Some(run.finish()),
            None => {
                if let Some(mut clock) = self.clock.take() {
                    clock.release()?;
                }
                None
            }
        };

        looped?;
        if let Some(e) = self.failure.take() {
            if let Some(Err(release)) = finished {
                warn!("failed to release frame counter: {release}");
            }
            return Err(e);
        }
        match finished {
            Some(state) => state.context("releasing frame counter"),
            None => Err(anyhow!("window closed before the run started")),
        }
    }

    fn create_window_and_surface(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let monitor_num = self.config.monitor.monitor_num;
        let monitor = event_loop
            .available_monitors()
            .nth(monitor_num)
            .or_else(|| {
                warn!(monitor_num, "monitor not found, using primary");
                event_loop.primary_monitor()
            })
            .ok_or_else(|| anyhow!("no monitor available"))?;

        self.refresh_rate = monitor
            .refresh_rate_millihertz()
            .map(|rate| rate as f64 / 1000.0);

        let window_attributes = Window::default_attributes()
            .with_title("Retinotopic mapping")
            .with_fullscreen(Some(Fullscreen::Borderless(Some(monitor.clone()))))
            .with_resizable(false);

        let window = Arc::new(event_loop.create_window(window_attributes)?);
        let physical_size = window.inner_size();
        let (width, height) = self.config.monitor.resolution;

        println!("Display Configuration:");
        println!("  Monitor: {}", monitor.name().unwrap_or_else(|| "unknown".into()));
        println!("  Physical size: {}×{}", physical_size.width, physical_size.height);
        println!("  Stimulus buffer: {width}×{height}");
        if let Some(refresh_rate) = self.refresh_rate {
            println!("  Refresh rate: {refresh_rate:.1} Hz");
        }
        let (ex, ey) = self.session.geometry.eyepoint();
        println!("  Warp eyepoint: ({ex:.3}, {ey:.3})");

        let surface_texture =
            SurfaceTexture::new(physical_size.width, physical_size.height, window.clone());
        self.pixels = Some(Pixels::new(width, height, surface_texture)?);
        self.renderer = Some(SkiaRenderer::with_tiling(width, height, &self.session.tiling)?);

        window.set_cursor_visible(false);
        window.request_redraw();
        self.window = Some(window);

        let clock = self
            .clock
            .take()
            .ok_or_else(|| anyhow!("frame clock already consumed"))?;
        self.run = Some(ProtocolRun::start(self.session, clock, self.progress));
        Ok(())
    }

    /// Draws, presents and closes one iteration. Returns whether the run has ended.
    fn frame(&mut self) -> Result<bool> {
        let session = self.session;
        let (Some(run), Some(renderer), Some(pixels)) =
            (self.run.as_mut(), self.renderer.as_mut(), self.pixels.as_mut())
        else {
            return Ok(true);
        };
        if run.is_finished() {
            return Ok(true);
        }

        let cmds = run.next_commands();
        let stats: FrameStats = renderer.render_frame(&session.tiling, &cmds, pixels.frame_mut())?;
        pixels.render().context("presenting frame")?;
        run.complete_iteration(self.abort.is_requested())
            .context("reading frame counter")?;

        debug!(
            frame = cmds.frame,
            board_ms = stats.checkerboard.as_secs_f64() * 1e3,
            bars_ms = stats.bars.as_secs_f64() * 1e3,
            copy_ms = stats.copy.as_secs_f64() * 1e3,
            "frame rendered"
        );
        Ok(run.is_finished())
    }

    fn handle_resize(&mut self, new_size: PhysicalSize<u32>) {
        if let Some(pixels) = &mut self.pixels {
            if let Err(e) = pixels.resize_surface(new_size.width, new_size.height) {
                warn!("failed to resize surface: {e}");
            }
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, e: anyhow::Error) {
        error!("{e:#}");
        self.failure = Some(e);
        self.exit(event_loop);
    }

    fn exit(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.set_cursor_visible(true);
        }
        event_loop.exit();
    }
}

impl ApplicationHandler for App<'_> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            if let Err(e) = self.create_window_and_surface(event_loop) {
                self.fail(event_loop, e.context("creating window and surface"));
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                self.abort.request();
                if self.run.is_none() {
                    self.exit(event_loop);
                }
            }
            WindowEvent::RedrawRequested => match self.frame() {
                Ok(true) => self.exit(event_loop),
                Ok(false) => {
                    if let Some(window) = &self.window {
                        window.request_redraw();
                    }
                }
                Err(e) => self.fail(event_loop, e),
            },
            WindowEvent::KeyboardInput { event, .. } if event.state.is_pressed() => {
                if let PhysicalKey::Code(KeyCode::Escape | KeyCode::KeyQ) = event.physical_key {
                    self.abort.request();
                }
            }
            WindowEvent::Resized(size) => self.handle_resize(size),
            _ => {}
        }
    }
}

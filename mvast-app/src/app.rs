use anyhow::{Context, Result};
use mvast_core::{RunState, Stimulus, StimulusDisplay, TaskError};
use mvast_experiment::{
    KeyboardQueue, RunConfig, SerialSource, SymbolSource, TaskSequencer, TimingRecorder,
    CANCEL_KEY, START_KEY,
};
use mvast_render::{SkiaRenderer, StimulusSources};
use mvast_timing::{Clock, MonotonicClock, COARSE_POLL_INTERVAL};
use pixels::{Pixels, SurfaceTexture};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use winit::{
    application::ApplicationHandler,
    event::{KeyEvent, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{Key, NamedKey},
    window::{Fullscreen, Window, WindowId},
};

/// How long the completion screen stays up before the window closes.
const COMPLETE_HOLD: Duration = Duration::from_secs(3);

/// Builds the renderer inputs for a screen of the given size.
pub fn stimulus_sources(config: &RunConfig, width: u32, height: u32) -> StimulusSources {
    StimulusSources {
        width,
        height,
        color_scheme: config.color_scheme,
        fixation_image: config.fixation_path(),
        checkerboard_images: config.checkerboard_paths(),
        instruction_image: config.instruction_path(),
        instruction_text: config.instruction_text().to_string(),
        waiting_text: config.waiting_message(),
        font_path: config.font_path.clone(),
    }
}

/// Opens the configured serial port, if any.
pub fn serial_source(config: &RunConfig) -> Option<Result<Box<dyn SymbolSource>, TaskError>> {
    if !config.use_serial_port {
        return None;
    }
    let port = config.serial_port.clone().unwrap_or_default();
    Some(
        SerialSource::open(port, config.serial_baud_rate)
            .map(|source| Box::new(source) as Box<dyn SymbolSource>),
    )
}

pub fn save_timing_log(recorder: Option<&TimingRecorder>, path: &Path) -> Result<()> {
    match recorder {
        Some(recorder) => recorder
            .write_json(path)
            .with_context(|| format!("writing timing log {}", path.display())),
        None => {
            log::warn!("Run never started; no timing log written");
            Ok(())
        }
    }
}

/// Window surface the sequencer presents on.
pub struct PixelsDisplay {
    renderer: SkiaRenderer,
    pixels: Pixels<'static>,
}

impl PixelsDisplay {
    /// Presents the current frame buffer again, after an expose or resize.
    pub fn present(&mut self) -> Result<(), TaskError> {
        self.pixels
            .render()
            .map_err(|e| TaskError::Display(e.to_string()))
    }
}

impl StimulusDisplay for PixelsDisplay {
    fn is_ready(&self, stimulus: Stimulus) -> bool {
        self.renderer.is_loaded(stimulus)
    }

    fn show(&mut self, stimulus: Stimulus) -> Result<(), TaskError> {
        self.renderer.draw_into(stimulus, self.pixels.frame_mut())?;
        self.present()
    }
}

pub struct App {
    config: RunConfig,
    timing_log: PathBuf,
    windowed: bool,
    clock: MonotonicClock,
    keyboard: KeyboardQueue,
    window: Option<Arc<Window>>,
    sequencer: Option<TaskSequencer<MonotonicClock, PixelsDisplay>>,
    completed_at: Option<Instant>,
    failure: Option<anyhow::Error>,
}

impl App {
    pub fn new(config: RunConfig, timing_log: PathBuf, windowed: bool) -> Self {
        Self {
            config,
            timing_log,
            windowed,
            clock: MonotonicClock::new(),
            keyboard: KeyboardQueue::new(),
            window: None,
            sequencer: None,
            completed_at: None,
            failure: None,
        }
    }

    pub fn run(mut self) -> Result<RunState> {
        #[cfg(target_os = "windows")]
        unsafe {
            windows::Win32::Media::timeBeginPeriod(1);
        }

        let event_loop = EventLoop::new()?;
        log::info!(
            "Platform: {} ({})",
            std::env::consts::OS,
            std::env::consts::ARCH
        );
        let result = event_loop.run_app(&mut self);

        #[cfg(target_os = "windows")]
        unsafe {
            windows::Win32::Media::timeEndPeriod(1);
        }

        if let Some(window) = &self.window {
            window.set_cursor_visible(true);
        }
        let state = match &self.sequencer {
            Some(seq) => {
                save_timing_log(seq.recorder(), &self.timing_log)?;
                seq.state()
            }
            None => RunState::Idle,
        };
        result?;
        match self.failure.take() {
            Some(err) => Err(err),
            None => Ok(state),
        }
    }

    fn create_window_and_surface(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let monitor = event_loop
            .primary_monitor()
            .or_else(|| event_loop.available_monitors().next())
            .ok_or_else(|| anyhow::anyhow!("No monitor available"))?;
        if let Some(mhz) = monitor.refresh_rate_millihertz() {
            log::info!("Refresh rate: {:.1} Hz", mhz as f64 / 1000.0);
        }

        let mut attributes = Window::default_attributes()
            .with_title("MVAST fMRI Visual Task")
            .with_resizable(false);
        if !self.windowed {
            attributes = attributes.with_fullscreen(Some(Fullscreen::Borderless(Some(monitor))));
        }
        let window = Arc::new(event_loop.create_window(attributes)?);
        let size = window.inner_size();
        log::info!(
            "Display: {}x{} physical, scale factor {:.2}",
            size.width,
            size.height,
            window.scale_factor()
        );

        let surface = SurfaceTexture::new(size.width, size.height, Arc::clone(&window));
        let pixels = Pixels::new(size.width, size.height, surface)?;
        let renderer = SkiaRenderer::load(&stimulus_sources(&self.config, size.width, size.height));
        let display = PixelsDisplay { renderer, pixels };

        let mut sequencer = TaskSequencer::new(self.config.clone(), self.clock.clone(), display)
            .with_keyboard(self.keyboard.clone());
        if let Some(serial) = serial_source(&self.config) {
            sequencer = sequencer.with_serial(serial);
        }

        window.set_cursor_visible(false);
        self.window = Some(window);
        let started = sequencer.start();
        self.sequencer = Some(sequencer);
        started.context("run could not start")?;
        Ok(())
    }

    fn handle_key(&mut self, event: &KeyEvent) {
        if event.repeat {
            return;
        }
        match &event.logical_key {
            Key::Named(NamedKey::Escape) => self.keyboard.push(CANCEL_KEY),
            Key::Named(NamedKey::Space) => self.keyboard.push(START_KEY),
            Key::Character(text) => self.keyboard.push_str(text),
            _ => {}
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        log::error!("{:#}", err);
        self.failure.get_or_insert(err);
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            if let Err(err) = self.create_window_and_surface(event_loop) {
                self.fail(event_loop, err);
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                self.keyboard.push(CANCEL_KEY);
                if self.sequencer.is_none() {
                    event_loop.exit();
                }
            }
            WindowEvent::KeyboardInput { event, .. } if event.state.is_pressed() => {
                self.handle_key(&event);
            }
            WindowEvent::RedrawRequested => {
                let presented = self
                    .sequencer
                    .as_mut()
                    .map(|seq| seq.display_mut().present());
                if let Some(Err(err)) = presented {
                    log::warn!("redraw failed: {}", err);
                }
            }
            WindowEvent::Resized(size) => {
                if let Some(seq) = self.sequencer.as_mut() {
                    if let Err(err) = seq.display_mut().pixels.resize_surface(size.width, size.height) {
                        log::warn!("Failed to resize surface: {}", err);
                    }
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let Some(seq) = self.sequencer.as_mut() else {
            return;
        };

        if let Err(err) = seq.tick() {
            let err = anyhow::Error::new(err).context("run aborted");
            self.fail(event_loop, err);
            return;
        }

        match seq.state() {
            RunState::Completed => {
                let since = *self.completed_at.get_or_insert_with(Instant::now);
                if since.elapsed() >= COMPLETE_HOLD {
                    event_loop.exit();
                } else {
                    event_loop.set_control_flow(ControlFlow::WaitUntil(since + COMPLETE_HOLD));
                }
            }
            RunState::Cancelled(_) => event_loop.exit(),
            _ => {
                let wake = seq.next_wakeup();
                let now = self.clock.now();
                if wake.saturating_sub(now) < COARSE_POLL_INTERVAL.as_nanos() as u64 {
                    // short waits spin to the deadline instead of trusting the OS timer
                    self.clock.sleep_until(wake);
                    event_loop.set_control_flow(ControlFlow::Poll);
                } else {
                    event_loop.set_control_flow(ControlFlow::WaitUntil(self.clock.instant_at(wake)));
                }
            }
        }
    }
}

use crate::text::{load_font, text_screen};
use bytemuck::cast_slice_mut;
use image::imageops::FilterType;
use mvast_core::{CheckerImage, ColorScheme, Stimulus, StimulusDisplay, TaskError};
use std::path::{Path, PathBuf};
use tiny_skia::{Color, IntSize, Paint, Pixmap, PixmapPaint, Rect, Transform};

pub const COMPLETE_TEXT: &str = "Task Complete!\n\nThank you.";

/// Everything needed to pre-render the stimulus set for one screen.
#[derive(Debug, Clone)]
pub struct StimulusSources {
    pub width: u32,
    pub height: u32,
    pub color_scheme: ColorScheme,
    /// `None` draws a fixation cross.
    pub fixation_image: Option<PathBuf>,
    pub checkerboard_images: [PathBuf; 2],
    /// Takes precedence over `instruction_text` when it loads.
    pub instruction_image: Option<PathBuf>,
    pub instruction_text: String,
    pub waiting_text: String,
    pub font_path: Option<PathBuf>,
}

/// Pre-rendered full-screen frames, one slot per [`Stimulus::cache_id`].
///
/// Showing a stimulus is a single copy of an opaque frame, so a checkerboard flip
/// costs the same at every toggle.
pub struct SkiaRenderer {
    width: u32,
    height: u32,
    frames: Vec<Option<Pixmap>>,
}

impl SkiaRenderer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            frames: vec![None; Stimulus::ALL.len()],
        }
    }

    /// Renders every stimulus. An asset that fails to load is logged and its slot
    /// stays empty; the sequencer's readiness check turns that into a resource error.
    pub fn load(sources: &StimulusSources) -> Self {
        let mut renderer = Self::new(sources.width, sources.height);
        let font = match &sources.font_path {
            Some(path) => match load_font(path) {
                Ok(font) => Some(font),
                Err(err) => {
                    log::warn!("{}; text screens will be blank", err);
                    None
                }
            },
            None => {
                log::warn!("No font configured; text screens will be blank");
                None
            }
        };
        let scheme = sources.color_scheme;
        let (w, h) = (sources.width, sources.height);

        let waiting = text_screen(&sources.waiting_text, w, h, BLACK, WHITE, font.as_ref());
        renderer.store(Stimulus::WaitingForStart, waiting);

        let complete = text_screen(COMPLETE_TEXT, w, h, BLACK, WHITE, font.as_ref());
        renderer.store(Stimulus::Complete, complete);

        let instruction = sources
            .instruction_image
            .as_deref()
            .and_then(|path| renderer.image_or_warn(path, scheme))
            .or_else(|| {
                text_screen(
                    &sources.instruction_text,
                    w,
                    h,
                    scheme.background(),
                    scheme.foreground(),
                    font.as_ref(),
                )
            });
        renderer.store(Stimulus::Instruction, instruction);

        let fixation = sources
            .fixation_image
            .as_deref()
            .and_then(|path| renderer.image_or_warn(path, scheme))
            .or_else(|| fixation_cross(w, h, scheme));
        renderer.store(Stimulus::Fixation, fixation);

        for (i, path) in sources.checkerboard_images.iter().enumerate() {
            let frame = renderer.image_or_warn(path, scheme);
            renderer.store(Stimulus::Checkerboard(CheckerImage::from_index(i)), frame);
        }

        let loaded = Stimulus::ALL.iter().filter(|s| renderer.is_loaded(**s)).count();
        log::info!(
            "Pre-rendered {}/{} stimuli at {}x{} ({:?})",
            loaded,
            Stimulus::ALL.len(),
            w,
            h,
            scheme
        );
        renderer
    }

    fn image_or_warn(&self, path: &Path, scheme: ColorScheme) -> Option<Pixmap> {
        match load_image_pixmap(path, self.width, self.height, scheme.background()) {
            Ok(pm) => Some(pm),
            Err(err) => {
                log::warn!("{}", err);
                None
            }
        }
    }

    fn store(&mut self, stimulus: Stimulus, frame: Option<Pixmap>) {
        if let Some(frame) = frame {
            self.frames[stimulus.cache_id()] = Some(frame);
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Replaces a slot. The frame must match the screen size.
    pub fn insert(&mut self, stimulus: Stimulus, frame: Pixmap) -> Result<(), TaskError> {
        if (frame.width(), frame.height()) != (self.width, self.height) {
            return Err(TaskError::Resource(format!(
                "{:?} frame is {}x{}, screen is {}x{}",
                stimulus,
                frame.width(),
                frame.height(),
                self.width,
                self.height
            )));
        }
        self.frames[stimulus.cache_id()] = Some(frame);
        Ok(())
    }

    pub fn is_loaded(&self, stimulus: Stimulus) -> bool {
        self.frames[stimulus.cache_id()].is_some()
    }

    pub fn pixmap(&self, stimulus: Stimulus) -> Option<&Pixmap> {
        self.frames[stimulus.cache_id()].as_ref()
    }

    /// Copies the stimulus into an RGBA8 frame buffer of the screen's size.
    ///
    /// Frames are opaque, so premultiplied and straight alpha coincide.
    pub fn draw_into(&self, stimulus: Stimulus, frame: &mut [u8]) -> Result<(), TaskError> {
        let src = self
            .pixmap(stimulus)
            .ok_or_else(|| TaskError::Display(format!("{:?} was never loaded", stimulus)))?;
        if src.data().len() != frame.len() {
            return Err(TaskError::Display(format!(
                "frame buffer holds {} bytes, {:?} has {}",
                frame.len(),
                stimulus,
                src.data().len()
            )));
        }
        frame.copy_from_slice(src.data());
        Ok(())
    }
}

const BLACK: [u8; 4] = [0, 0, 0, 255];
const WHITE: [u8; 4] = [255, 255, 255, 255];

fn background(width: u32, height: u32, color: [u8; 4]) -> Option<Pixmap> {
    let mut pm = Pixmap::new(width, height)?;
    pm.fill(Color::from_rgba8(color[0], color[1], color[2], color[3]));
    Some(pm)
}

/// Decodes an image, stretches it to the screen and flattens it onto `bg`.
pub fn load_image_pixmap(
    path: &Path,
    width: u32,
    height: u32,
    bg: [u8; 4],
) -> Result<Pixmap, TaskError> {
    let img = image::open(path)
        .map_err(|e| TaskError::Resource(format!("image {}: {e}", path.display())))?
        .resize_exact(width, height, FilterType::Triangle)
        .into_rgba8();

    let mut data = img.into_raw();
    for px in cast_slice_mut::<u8, [u8; 4]>(&mut data) {
        let a = px[3] as u16;
        for c in &mut px[..3] {
            *c = ((*c as u16 * a + 127) / 255) as u8;
        }
    }
    let size = IntSize::from_wh(width, height)
        .ok_or_else(|| TaskError::Resource(format!("invalid screen size {width}x{height}")))?;
    let layer = Pixmap::from_vec(data, size)
        .ok_or_else(|| TaskError::Resource(format!("image {}: bad pixel data", path.display())))?;

    let mut screen = background(width, height, bg)
        .ok_or_else(|| TaskError::Resource(format!("invalid screen size {width}x{height}")))?;
    screen.draw_pixmap(0, 0, layer.as_ref(), &PixmapPaint::default(), Transform::identity(), None);
    Ok(screen)
}

/// Centred plus sign in the scheme's foreground colour.
pub fn fixation_cross(width: u32, height: u32, scheme: ColorScheme) -> Option<Pixmap> {
    let mut pm = background(width, height, scheme.background())?;
    let size = (width.min(height) / 8) as f32;
    let stroke = (size / 20.0).max(3.0);
    let (cx, cy) = (width as f32 / 2.0, height as f32 / 2.0);

    let fg = scheme.foreground();
    let mut paint = Paint::default();
    paint.anti_alias = false;
    paint.set_color(Color::from_rgba8(fg[0], fg[1], fg[2], fg[3]));

    let bars = [
        Rect::from_xywh(cx - size / 2.0, cy - stroke / 2.0, size, stroke),
        Rect::from_xywh(cx - stroke / 2.0, cy - size / 2.0, stroke, size),
    ];
    for bar in bars.into_iter().flatten() {
        pm.fill_rect(bar, &paint, Transform::identity(), None);
    }
    Some(pm)
}

/// Renderer paired with an in-memory frame buffer; the headless presentation surface.
pub struct FrameBufferDisplay {
    renderer: SkiaRenderer,
    frame: Vec<u8>,
    shown: Option<Stimulus>,
    presented: u64,
}

impl FrameBufferDisplay {
    pub fn new(renderer: SkiaRenderer) -> Self {
        let frame = vec![0; renderer.width() as usize * renderer.height() as usize * 4];
        Self {
            renderer,
            frame,
            shown: None,
            presented: 0,
        }
    }

    pub fn frame(&self) -> &[u8] {
        &self.frame
    }

    pub fn shown(&self) -> Option<Stimulus> {
        self.shown
    }

    pub fn presented(&self) -> u64 {
        self.presented
    }
}

impl StimulusDisplay for FrameBufferDisplay {
    fn is_ready(&self, stimulus: Stimulus) -> bool {
        self.renderer.is_loaded(stimulus)
    }

    fn show(&mut self, stimulus: Stimulus) -> Result<(), TaskError> {
        self.renderer.draw_into(stimulus, &mut self.frame)?;
        self.shown = Some(stimulus);
        self.presented += 1;
        Ok(())
    }
}

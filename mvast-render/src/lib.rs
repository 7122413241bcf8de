pub mod render;
pub mod text;

pub use render::{
    fixation_cross, load_image_pixmap, FrameBufferDisplay, SkiaRenderer, StimulusSources,
    COMPLETE_TEXT,
};
pub use text::{font_size_for, load_font, render_text_pixmap, text_screen};

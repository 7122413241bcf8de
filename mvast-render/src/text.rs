use ab_glyph::{point, Font, FontVec, Glyph, PxScale, ScaleFont};
use mvast_core::TaskError;
use std::path::Path;
use tiny_skia::{Color, Pixmap, PixmapPaint, PremultipliedColorU8, Transform};

/// Vertical gap after a rendered line, and the height of a blank line.
const LINE_GAP: u32 = 10;
const BLANK_LINE: u32 = 20;

pub fn load_font(path: &Path) -> Result<FontVec, TaskError> {
    let bytes = std::fs::read(path)
        .map_err(|e| TaskError::Resource(format!("font {}: {e}", path.display())))?;
    FontVec::try_from_vec(bytes)
        .map_err(|e| TaskError::Resource(format!("font {}: {e}", path.display())))
}

/// Text size for full-screen messages: a 25th of the screen height, at least 24 px.
pub fn font_size_for(height: u32) -> f32 {
    (height / 25).max(24) as f32
}

/// Rasterizes one line of text onto a transparent pixmap sized to its advance width
/// and line height. `None` for an empty line.
pub fn render_text_pixmap<F: Font>(
    text: &str,
    font_size: f32,
    font: &F,
    color: [u8; 4],
) -> Option<Pixmap> {
    if text.is_empty() {
        return None;
    }
    let scale = PxScale::from(font_size);
    let sf = font.as_scaled(scale);

    let mut pen_x = 0.0f32;
    let mut glyphs = Vec::<Glyph>::new();
    for ch in text.chars() {
        let id = font.glyph_id(ch);
        if let Some(prev) = glyphs.last() {
            pen_x += sf.kern(prev.id, id);
        }
        glyphs.push(Glyph {
            id,
            scale,
            position: point(pen_x, sf.ascent()),
        });
        pen_x += sf.h_advance(id);
    }

    let w = pen_x.ceil().max(1.0) as u32;
    let h = sf.height().ceil().max(1.0) as u32;
    let mut pm = Pixmap::new(w, h)?;
    let stride = w as usize;
    let dst = pm.pixels_mut();

    for g in glyphs {
        let Some(out) = font.outline_glyph(g) else {
            continue;
        };
        let b = out.px_bounds();
        out.draw(|x, y, cov| {
            if cov <= f32::EPSILON {
                return;
            }
            let ix = (x as f32 + b.min.x).floor() as i32;
            let iy = (y as f32 + b.min.y).floor() as i32;
            if ix < 0 || iy < 0 || ix >= w as i32 || iy >= h as i32 {
                return;
            }
            let i = iy as usize * stride + ix as usize;

            // premultiply by coverage, then source-over onto what is already there
            let a = (cov * color[3] as f32 / 255.0).clamp(0.0, 1.0);
            let sa = (a * 255.0) as u8;
            let inv = 1.0 - sa as f32 / 255.0;
            let bg = dst[i];
            let blend = |s: u8, d: u8| s.saturating_add((d as f32 * inv) as u8);
            let px = PremultipliedColorU8::from_rgba(
                blend((color[0] as f32 * a) as u8, bg.red()),
                blend((color[1] as f32 * a) as u8, bg.green()),
                blend((color[2] as f32 * a) as u8, bg.blue()),
                blend(sa, bg.alpha()),
            );
            if let Some(px) = px {
                dst[i] = px;
            }
        });
    }

    Some(pm)
}

/// Full-screen message: lines centred horizontally, the block centred vertically.
///
/// Without a font only the background is drawn.
pub fn text_screen<F: Font>(
    text: &str,
    width: u32,
    height: u32,
    background: [u8; 4],
    foreground: [u8; 4],
    font: Option<&F>,
) -> Option<Pixmap> {
    let mut screen = Pixmap::new(width, height)?;
    screen.fill(Color::from_rgba8(
        background[0],
        background[1],
        background[2],
        background[3],
    ));
    let Some(font) = font else {
        return Some(screen);
    };

    let size = font_size_for(height);
    let lines: Vec<Option<Pixmap>> = text
        .lines()
        .map(|line| render_text_pixmap(line.trim(), size, font, foreground))
        .collect();
    let total: u32 = lines
        .iter()
        .map(|line| line.as_ref().map_or(BLANK_LINE, |pm| pm.height() + LINE_GAP))
        .sum();

    let mut y = (height as i32 - total as i32) / 2;
    for line in &lines {
        match line {
            Some(pm) => {
                let x = (width as i32 - pm.width() as i32) / 2;
                screen.draw_pixmap(
                    x,
                    y,
                    pm.as_ref(),
                    &PixmapPaint::default(),
                    Transform::identity(),
                    None,
                );
                y += (pm.height() + LINE_GAP) as i32;
            }
            None => y += BLANK_LINE as i32,
        }
    }
    Some(screen)
}

//! Flattens an ordered slide list into one downloadable PNG grid.
//!
//! Every slide decodes and renders its cell in an independent blocking task;
//! the tasks are joined with all-settled semantics and the finished cells are
//! pasted in slide order, so decode completion order never affects placement
//! and a single bad image degrades to a placeholder cell instead of failing
//! the composite.

use std::io::Cursor;
use std::sync::{Arc, OnceLock};

use base64::Engine;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};

use crate::error::CompositeError;
use crate::placeholder;
use storyboard_protocol::{Slide, SlideImage};

const CARD_WIDTH: u32 = 300;
const CARD_HEIGHT: u32 = 400;
const PADDING: u32 = 10;
const FONT_PX: f32 = 16.0;
const LINE_HEIGHT: u32 = 24;
const TEXT_INSET: u32 = 10;
const FIRST_BASELINE: u32 = 25;
const BOTTOM_GUARD: u32 = 15;

const CANVAS_BG: Rgba<u8> = Rgba([0x25, 0x27, 0x2e, 0xff]);
const CARD_BG: Rgba<u8> = Rgba([0xff, 0xff, 0xff, 0xff]);

/// Largest canvas edge we will allocate.
const MAX_DIM: u32 = 16_384;

/// Compose `slides` into a `columns`-wide grid, capped at `columns * columns`
/// cards, and return the encoded PNG.
pub async fn compose(slides: &[Slide], columns: u32) -> Result<Vec<u8>, CompositeError> {
    if columns == 0 {
        return Err(CompositeError::InvalidColumns);
    }
    if slides.is_empty() {
        return Err(CompositeError::NoSlides);
    }

    let max_cards = slides
        .len()
        .min((columns as usize).saturating_mul(columns as usize));
    let rows = (max_cards as u32).div_ceil(columns);
    let canvas_width = u64::from(columns) * u64::from(CARD_WIDTH + PADDING) - u64::from(PADDING);
    let canvas_height = u64::from(rows) * u64::from(CARD_HEIGHT + PADDING) - u64::from(PADDING);
    if canvas_width > u64::from(MAX_DIM) || canvas_height > u64::from(MAX_DIM) {
        return Err(CompositeError::Canvas(format!(
            "canvas too large: {canvas_width}x{canvas_height} (max {MAX_DIM})"
        )));
    }
    let (canvas_width, canvas_height) = (canvas_width as u32, canvas_height as u32);

    let mut canvas = RgbaImage::from_pixel(canvas_width, canvas_height, CANVAS_BG);

    let tasks: Vec<_> = slides[..max_cards]
        .iter()
        .cloned()
        .map(|slide| tokio::task::spawn_blocking(move || render_cell(&slide)))
        .collect();

    for (i, joined) in futures::future::join_all(tasks).await.into_iter().enumerate() {
        let cell = match joined {
            Ok(cell) => cell,
            Err(err) => {
                tracing::warn!("cell render task failed: {err}");
                error_cell()
            }
        };
        let col = (i as u32) % columns;
        let row = (i as u32) / columns;
        let x = col * (CARD_WIDTH + PADDING);
        let y = row * (CARD_HEIGHT + PADDING);
        image::imageops::overlay(&mut canvas, &cell, i64::from(x), i64::from(y));
    }

    let mut out = Vec::new();
    DynamicImage::ImageRgba8(canvas)
        .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
        .map_err(|err| CompositeError::Encode(err.to_string()))?;
    Ok(out)
}

/// Render one complete card into a private buffer: white image square on
/// top, caption band below. Never fails; bad images become placeholder art.
fn render_cell(slide: &Slide) -> RgbaImage {
    let mut cell = RgbaImage::from_pixel(CARD_WIDTH, CARD_HEIGHT, CANVAS_BG);
    fill_rect(&mut cell, 0, 0, CARD_WIDTH, CARD_WIDTH, CARD_BG);

    match cell_art(&slide.image) {
        Some(art) => {
            let x = (CARD_WIDTH - art.width().min(CARD_WIDTH)) / 2;
            image::imageops::overlay(&mut cell, &art, i64::from(x), 0);
        }
        None => {
            if let Some(error_art) = rasterize_svg(
                &placeholder::load_error_svg(CARD_WIDTH, CARD_WIDTH),
                CARD_WIDTH,
                CARD_WIDTH,
            ) {
                image::imageops::overlay(&mut cell, &error_art, 0, 0);
            }
        }
    }

    draw_caption(&mut cell, &slide.caption);
    cell
}

fn error_cell() -> RgbaImage {
    let mut cell = RgbaImage::from_pixel(CARD_WIDTH, CARD_HEIGHT, CANVAS_BG);
    if let Some(error_art) = rasterize_svg(
        &placeholder::load_error_svg(CARD_WIDTH, CARD_WIDTH),
        CARD_WIDTH,
        CARD_WIDTH,
    ) {
        image::imageops::overlay(&mut cell, &error_art, 0, 0);
    }
    cell
}

/// Decode a slide's art into a bitmap that fits the image square.
/// `None` means the load-error placeholder should be drawn instead.
fn cell_art(slide_image: &SlideImage) -> Option<RgbaImage> {
    match slide_image {
        SlideImage::Placeholder => rasterize_svg(
            &placeholder::text_only_svg(CARD_WIDTH, CARD_WIDTH),
            CARD_WIDTH,
            CARD_WIDTH,
        ),
        SlideImage::Inline { media_type, data } => {
            let bytes = match base64::engine::general_purpose::STANDARD.decode(data) {
                Ok(bytes) => bytes,
                Err(err) => {
                    tracing::warn!("invalid base64 in {media_type} slide image: {err}");
                    return None;
                }
            };
            match image::load_from_memory(&bytes) {
                Ok(decoded) => Some(scale_to_square(decoded.to_rgba8())),
                Err(err) => {
                    tracing::warn!("could not decode {media_type} slide image: {err}");
                    None
                }
            }
        }
    }
}

/// Fit the image inside the card's square, preserving aspect ratio and
/// clamping to the card width.
fn scale_to_square(img: RgbaImage) -> RgbaImage {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return img;
    }
    let scale = (f64::from(CARD_WIDTH) / f64::from(w)).min(f64::from(CARD_WIDTH) / f64::from(h));
    let new_w = ((f64::from(w) * scale).round() as u32).clamp(1, CARD_WIDTH);
    let new_h = ((f64::from(h) * scale).round() as u32).clamp(1, CARD_WIDTH);
    image::imageops::resize(&img, new_w, new_h, FilterType::Triangle)
}

fn draw_caption(cell: &mut RgbaImage, caption: &str) {
    let lines = caption_lines(caption);
    if lines.is_empty() {
        return;
    }
    let band_height = CARD_HEIGHT - CARD_WIDTH;
    if let Some(text_block) = rasterize_svg(&caption_svg(&lines), CARD_WIDTH, band_height) {
        image::imageops::overlay(cell, &text_block, 0, i64::from(CARD_WIDTH));
    }
}

/// Greedy word-wrap plus the height cap: lines that would run past the
/// bottom guard are cut and the last kept line gets a truncation marker.
fn caption_lines(caption: &str) -> Vec<String> {
    let band_height = CARD_HEIGHT - CARD_WIDTH;
    let max_lines = ((band_height - BOTTOM_GUARD - FIRST_BASELINE) / LINE_HEIGHT + 1) as usize;
    let max_width = (CARD_WIDTH - 2 * TEXT_INSET) as f32;
    let mut lines = wrap_caption(caption, max_width, FONT_PX);
    if lines.len() > max_lines {
        lines.truncate(max_lines);
        if let Some(last) = lines.last_mut() {
            last.push_str("...");
        }
    }
    lines
}

/// Accumulate words into a line while it still fits, committing on overflow.
/// A word wider than the line on its own is kept unbroken.
pub fn wrap_caption(text: &str, max_width: f32, font_px: f32) -> Vec<String> {
    let mut lines = Vec::new();
    let mut line = String::new();
    for word in text.split_whitespace() {
        let candidate = if line.is_empty() {
            word.to_string()
        } else {
            format!("{line} {word}")
        };
        if line.is_empty() || measure_text(&candidate, font_px) <= max_width {
            line = candidate;
        } else {
            lines.push(std::mem::take(&mut line));
            line = word.to_string();
        }
    }
    if !line.is_empty() {
        lines.push(line);
    }
    lines
}

/// Deterministic width estimate from per-character advance classes. Exact
/// font metrics are not needed here; the wrap only has to be stable and
/// close enough to the drawn size.
pub fn measure_text(text: &str, font_px: f32) -> f32 {
    text.chars().map(advance_em).sum::<f32>() * font_px
}

fn advance_em(c: char) -> f32 {
    match c {
        'i' | 'j' | 'l' | '\'' | '.' | ',' | ':' | ';' | '!' | '|' => 0.30,
        'f' | 't' | 'r' | 'I' | '(' | ')' | '[' | ']' => 0.38,
        'm' | 'w' | 'M' | 'W' | '@' => 0.85,
        ' ' => 0.33,
        c if c.is_ascii_uppercase() || c.is_ascii_digit() => 0.66,
        _ => 0.52,
    }
}

fn caption_svg(lines: &[String]) -> String {
    let width = CARD_WIDTH;
    let height = CARD_HEIGHT - CARD_WIDTH;
    let x = TEXT_INSET;
    let size = FONT_PX;
    let mut svg = format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="{height}">"#
    );
    for (i, line) in lines.iter().enumerate() {
        let y = FIRST_BASELINE + (i as u32) * LINE_HEIGHT;
        let line = xml_escape(line);
        svg.push_str(&format!(
            r##"<text x="{x}" y="{y}" font-family="sans-serif" font-size="{size}" fill="#e5e7eb">{line}</text>"##
        ));
    }
    svg.push_str("</svg>");
    svg
}

fn xml_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

/// Rasterize a small SVG document to a straight-alpha bitmap.
fn rasterize_svg(svg: &str, width: u32, height: u32) -> Option<RgbaImage> {
    let mut options = usvg::Options::default();
    options.fontdb = shared_fontdb();
    let tree = match usvg::Tree::from_data(svg.as_bytes(), &options) {
        Ok(tree) => tree,
        Err(err) => {
            tracing::warn!("could not parse generated svg: {err}");
            return None;
        }
    };
    let mut pixmap = resvg::tiny_skia::Pixmap::new(width, height)?;
    let sx = width as f32 / tree.size().width();
    let sy = height as f32 / tree.size().height();
    resvg::render(
        &tree,
        resvg::tiny_skia::Transform::from_scale(sx, sy),
        &mut pixmap.as_mut(),
    );
    let mut data = pixmap.data().to_vec();
    unpremultiply_rgba8_in_place(&mut data);
    RgbaImage::from_raw(width, height, data)
}

fn shared_fontdb() -> Arc<usvg::fontdb::Database> {
    static DB: OnceLock<Arc<usvg::fontdb::Database>> = OnceLock::new();
    DB.get_or_init(|| {
        let mut db = usvg::fontdb::Database::new();
        db.load_system_fonts();
        Arc::new(db)
    })
    .clone()
}

fn unpremultiply_rgba8_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = u16::from(px[3]);
        if a == 0 || a == 255 {
            continue;
        }
        for channel in px.iter_mut().take(3) {
            *channel = ((u16::from(*channel) * 255 + a / 2) / a).min(255) as u8;
        }
    }
}

fn fill_rect(img: &mut RgbaImage, x0: u32, y0: u32, w: u32, h: u32, color: Rgba<u8>) {
    for y in y0..(y0 + h).min(img.height()) {
        for x in x0..(x0 + w).min(img.width()) {
            img.put_pixel(x, y, color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_bytes(color: [u8; 4]) -> Vec<u8> {
        let img = RgbaImage::from_pixel(2, 2, Rgba(color));
        let mut buf = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    fn inline_slide(caption: &str, color: [u8; 4]) -> Slide {
        Slide {
            caption: caption.to_string(),
            markup: caption.to_string(),
            image: SlideImage::from_bytes(&png_bytes(color), "image/png"),
        }
    }

    fn placeholder_slide(caption: &str) -> Slide {
        Slide {
            caption: caption.to_string(),
            markup: caption.to_string(),
            image: SlideImage::Placeholder,
        }
    }

    fn broken_slide(caption: &str) -> Slide {
        Slide {
            caption: caption.to_string(),
            markup: caption.to_string(),
            image: SlideImage::from_bytes(b"definitely not an image", "image/png"),
        }
    }

    #[tokio::test]
    async fn five_slides_in_two_columns_make_three_rows() {
        let slides: Vec<Slide> = (0..5)
            .map(|i| placeholder_slide(&format!("Panel {i}")))
            .collect();
        let png = compose(&slides, 2).await.unwrap();
        let decoded = image::load_from_memory(&png).unwrap().to_rgba8();
        assert_eq!(decoded.width(), 2 * (300 + 10) - 10);
        assert_eq!(decoded.height(), 3 * (400 + 10) - 10);

        // Index 4 lands at row 2, col 0: its white image square is drawn.
        assert_eq!(*decoded.get_pixel(10, 2 * 410 + 10), Rgba([255, 255, 255, 255]));
        // The slot at row 2, col 1 stays canvas background.
        assert_eq!(*decoded.get_pixel(310 + 10, 2 * 410 + 10), Rgba([0x25, 0x27, 0x2e, 0xff]));
    }

    #[tokio::test]
    async fn bad_image_degrades_to_placeholder_cell_only() {
        let slides = vec![
            inline_slide("Good red.", [255, 0, 0, 255]),
            broken_slide("Bad."),
            inline_slide("Good blue.", [0, 0, 255, 255]),
        ];
        let png = compose(&slides, 2).await.unwrap();
        let decoded = image::load_from_memory(&png).unwrap().to_rgba8();
        assert_eq!(decoded.width(), 610);
        assert_eq!(decoded.height(), 810);

        // Healthy cells keep their decoded art.
        assert_eq!(*decoded.get_pixel(150, 150), Rgba([255, 0, 0, 255]));
        assert_eq!(*decoded.get_pixel(150, 410 + 150), Rgba([0, 0, 255, 255]));
        // The broken cell shows the load-error background.
        assert_eq!(*decoded.get_pixel(310 + 150, 150), Rgba([0x55, 0x55, 0x55, 0xff]));
    }

    #[tokio::test]
    async fn card_count_is_capped_at_columns_squared() {
        let slides: Vec<Slide> = (0..10)
            .map(|i| placeholder_slide(&format!("Panel {i}")))
            .collect();
        let png = compose(&slides, 2).await.unwrap();
        let decoded = image::load_from_memory(&png).unwrap().to_rgba8();
        // Only 4 of the 10 slides fit a 2x2 grid.
        assert_eq!(decoded.height(), 2 * 410 - 10);
    }

    #[tokio::test]
    async fn zero_slides_and_zero_columns_are_rejected() {
        assert!(matches!(
            compose(&[], 2).await,
            Err(CompositeError::NoSlides)
        ));
        let slides = vec![placeholder_slide("One.")];
        assert!(matches!(
            compose(&slides, 0).await,
            Err(CompositeError::InvalidColumns)
        ));
    }

    #[test]
    fn wrap_is_greedy() {
        let lines = wrap_caption("aa bb cc", 1000.0, FONT_PX);
        assert_eq!(lines, vec!["aa bb cc"]);

        let lines = wrap_caption("aa bb cc", 30.0, FONT_PX);
        assert_eq!(lines, vec!["aa", "bb", "cc"]);
    }

    #[test]
    fn overlong_word_is_kept_unbroken() {
        let lines = wrap_caption("supercalifragilistic", 10.0, FONT_PX);
        assert_eq!(lines, vec!["supercalifragilistic"]);
    }

    #[test]
    fn long_captions_truncate_with_marker() {
        let caption = "word ".repeat(60);
        let lines = caption_lines(&caption);
        assert_eq!(lines.len(), 3);
        assert!(lines[2].ends_with("..."));
    }

    #[test]
    fn short_captions_are_not_truncated() {
        let lines = caption_lines("A cat jumps.");
        assert_eq!(lines, vec!["A cat jumps."]);
    }

    #[test]
    fn xml_escape_handles_markup_characters() {
        assert_eq!(xml_escape("a < b & c"), "a &lt; b &amp; c");
    }
}

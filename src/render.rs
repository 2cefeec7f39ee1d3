use crate::label::{glyph_height, glyph_scale, measure_text_width, BadgeStyle, LabelPlacement};
use crate::scene::BoundingBox;
use anyhow::{Context, Result};
use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;

/// Highlight box appearance: translucent fill plus an opaque outline.
#[derive(Debug, Clone)]
pub struct HighlightStyle {
    pub fill: Rgba<u8>,
    pub stroke: Rgba<u8>,
    pub stroke_width: u32,
}

impl Default for HighlightStyle {
    fn default() -> Self {
        Self {
            fill: Rgba([255, 59, 48, 46]),
            stroke: Rgba([255, 59, 48, 255]),
            stroke_width: 2,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AnnotationStyle {
    pub highlight: HighlightStyle,
    pub badge: BadgeStyle,
}

/// Parse `#RRGGBB` / `#RRGGBBAA` (leading `#` optional).
pub fn parse_color(raw: &str) -> Option<Rgba<u8>> {
    let hex = raw.trim().trim_start_matches('#');
    if hex.len() != 6 && hex.len() != 8 {
        return None;
    }
    let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    let r = byte(0)?;
    let g = byte(2)?;
    let b = byte(4)?;
    let a = if hex.len() == 8 { byte(6)? } else { 255 };
    Some(Rgba([r, g, b, a]))
}

fn clamp_i32(value: i32, min_value: i32, max_value: i32) -> i32 {
    value.max(min_value).min(max_value)
}

fn blend_pixel(dst: Rgba<u8>, src: Rgba<u8>) -> Rgba<u8> {
    let a = f64::from(src[3]) / 255.0;
    if a <= 0.0 {
        return dst;
    }
    let inv = 1.0 - a;
    let channel = |d: u8, s: u8| {
        (f64::from(d) * inv + f64::from(s) * a)
            .round()
            .clamp(0.0, 255.0) as u8
    };
    let out_a = (f64::from(dst[3]) + f64::from(src[3]) * inv)
        .round()
        .clamp(0.0, 255.0) as u8;
    Rgba([
        channel(dst[0], src[0]),
        channel(dst[1], src[1]),
        channel(dst[2], src[2]),
        out_a,
    ])
}

fn fill_rect_alpha(img: &mut RgbaImage, x0: i32, y0: i32, x1: i32, y1: i32, color: Rgba<u8>) {
    if img.width() == 0 || img.height() == 0 {
        return;
    }
    let min_x = clamp_i32(x0.min(x1), 0, img.width() as i32 - 1);
    let max_x = clamp_i32(x0.max(x1), 0, img.width() as i32 - 1);
    let min_y = clamp_i32(y0.min(y1), 0, img.height() as i32 - 1);
    let max_y = clamp_i32(y0.max(y1), 0, img.height() as i32 - 1);
    for y in min_y..=max_y {
        for x in min_x..=max_x {
            let dst = *img.get_pixel(x as u32, y as u32);
            img.put_pixel(x as u32, y as u32, blend_pixel(dst, color));
        }
    }
}

fn draw_rect_outline(img: &mut RgbaImage, rect: &BoundingBox, color: Rgba<u8>, thickness: u32) {
    if rect.width <= 0.0 || rect.height <= 0.0 {
        return;
    }
    let img_w = img.width();
    let img_h = img.height();
    if img_w == 0 || img_h == 0 {
        return;
    }

    let x0 = (rect.x.round().max(0.0) as u32).min(img_w - 1);
    let y0 = (rect.y.round().max(0.0) as u32).min(img_h - 1);
    let x1 = ((rect.x + rect.width).round().max(1.0) as u32 - 1).min(img_w - 1);
    let y1 = ((rect.y + rect.height).round().max(1.0) as u32 - 1).min(img_h - 1);

    for t in 0..thickness.max(1) {
        let tx0 = x0.saturating_sub(t);
        let ty0 = y0.saturating_sub(t);
        let tx1 = (x1 + t).min(img_w - 1);
        let ty1 = (y1 + t).min(img_h - 1);

        for xx in tx0..=tx1 {
            img.put_pixel(xx, ty0, color);
            img.put_pixel(xx, ty1, color);
        }
        for yy in ty0..=ty1 {
            img.put_pixel(tx0, yy, color);
            img.put_pixel(tx1, yy, color);
        }
    }
}

fn point_in_rounded_rect(px: i32, py: i32, x0: i32, y0: i32, x1: i32, y1: i32, radius: f64) -> bool {
    if px < x0 || px >= x1 || py < y0 || py >= y1 {
        return false;
    }
    if radius <= 0.1 {
        return true;
    }
    // Radius never exceeds half the rectangle extent.
    let r = radius
        .min(f64::from((x1 - x0).abs()) / 2.0)
        .min(f64::from((y1 - y0).abs()) / 2.0);
    let fx = f64::from(px);
    let fy = f64::from(py);
    let (left, right) = (f64::from(x0), f64::from(x1));
    let (top, bottom) = (f64::from(y0), f64::from(y1));

    if (fx >= left + r && fx <= right - r) || (fy >= top + r && fy <= bottom - r) {
        return true;
    }

    let corners = [
        (left + r, top + r),
        (right - r, top + r),
        (left + r, bottom - r),
        (right - r, bottom - r),
    ];
    corners.iter().any(|(cx, cy)| {
        let dx = fx - cx;
        let dy = fy - cy;
        dx * dx + dy * dy <= r * r
    })
}

fn fill_rounded_rect(
    img: &mut RgbaImage,
    x0: i32,
    y0: i32,
    x1: i32,
    y1: i32,
    radius: f64,
    color: Rgba<u8>,
) {
    if img.width() == 0 || img.height() == 0 {
        return;
    }
    let min_x = clamp_i32(x0, 0, img.width() as i32 - 1);
    let max_x = clamp_i32(x1 - 1, 0, img.width() as i32 - 1);
    let min_y = clamp_i32(y0, 0, img.height() as i32 - 1);
    let max_y = clamp_i32(y1 - 1, 0, img.height() as i32 - 1);
    for y in min_y..=max_y {
        for x in min_x..=max_x {
            if point_in_rounded_rect(x, y, x0, y0, x1, y1, radius) {
                let dst = *img.get_pixel(x as u32, y as u32);
                img.put_pixel(x as u32, y as u32, blend_pixel(dst, color));
            }
        }
    }
}

/// Single-line bitmap text from the 8x8 font, upscaled by an integer factor.
fn draw_bitmap_text(img: &mut RgbaImage, x: i32, y: i32, text: &str, color: Rgba<u8>, scale: u32) {
    let scale_i = scale.max(1) as i32;
    let mut cursor_x = x;
    for ch in text.chars() {
        let Some(glyph) = BASIC_FONTS.get(ch).or_else(|| BASIC_FONTS.get('?')) else {
            cursor_x += 8 * scale_i;
            continue;
        };
        for (row_idx, row) in glyph.iter().enumerate() {
            let row_bits = *row;
            for col_idx in 0..8 {
                if (row_bits >> col_idx) & 1 == 0 {
                    continue;
                }
                let px = cursor_x + col_idx * scale_i;
                let py = y + row_idx as i32 * scale_i;
                for sy in 0..scale_i {
                    for sx in 0..scale_i {
                        let tx = px + sx;
                        let ty = py + sy;
                        if tx >= 0 && ty >= 0 && tx < img.width() as i32 && ty < img.height() as i32
                        {
                            let dst = *img.get_pixel(tx as u32, ty as u32);
                            img.put_pixel(tx as u32, ty as u32, blend_pixel(dst, color));
                        }
                    }
                }
            }
        }
        cursor_x += 8 * scale_i;
    }
}

fn draw_badge(img: &mut RgbaImage, label: &LabelPlacement, style: &BadgeStyle) {
    let x0 = label.x.round() as i32;
    let y0 = label.y.round() as i32;
    let x1 = (label.x + label.width).round() as i32;
    let y1 = (label.y + label.height).round() as i32;
    fill_rounded_rect(img, x0, y0, x1, y1, style.corner_radius, style.fill);

    let text = label.mark_id.to_string();
    let text_w = measure_text_width(&text, style.font_size);
    let text_h = glyph_height(style.font_size);
    let tx = (label.x + (label.width - text_w) / 2.0).round() as i32;
    let ty = (label.y + (label.height - text_h) / 2.0).round() as i32;
    draw_bitmap_text(img, tx, ty, &text, style.text_color, glyph_scale(style.font_size));
}

/// Composite highlights and badges over the base raster. Highlights draw
/// first (translucent fill, then opaque outline), badges last at their
/// optimized positions so they sit on top.
pub fn compose(
    base: &DynamicImage,
    highlights: &[BoundingBox],
    labels: &[LabelPlacement],
    style: &AnnotationStyle,
) -> RgbaImage {
    let mut img = base.to_rgba8();

    for bbox in highlights {
        fill_rect_alpha(
            &mut img,
            bbox.x.round() as i32,
            bbox.y.round() as i32,
            (bbox.x + bbox.width).round() as i32,
            (bbox.y + bbox.height).round() as i32,
            style.highlight.fill,
        );
        draw_rect_outline(&mut img, bbox, style.highlight.stroke, style.highlight.stroke_width);
    }

    for label in labels {
        draw_badge(&mut img, label, &style.badge);
    }

    img
}

/// Full compositor contract: annotate the base image and return PNG bytes.
/// Decode/encode failures propagate; there is no silent fallback.
pub fn render_annotated(
    base: &DynamicImage,
    highlights: &[BoundingBox],
    labels: &[LabelPlacement],
    style: &AnnotationStyle,
) -> Result<Vec<u8>> {
    let composed = compose(base, highlights, labels, style);
    let mut bytes = Vec::new();
    DynamicImage::ImageRgba8(composed)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .context("failed to encode annotated image as PNG")?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::label::initialize_labels;

    fn white_base(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, Rgba([255, 255, 255, 255])))
    }

    #[test]
    fn parse_color_handles_rgb_and_rgba() {
        assert_eq!(parse_color("#FF3B30"), Some(Rgba([255, 59, 48, 255])));
        assert_eq!(parse_color("0A84FF80"), Some(Rgba([10, 132, 255, 128])));
        assert_eq!(parse_color("#123"), None);
        assert_eq!(parse_color("not-a-color"), None);
    }

    #[test]
    fn blend_is_identity_for_transparent_source() {
        let dst = Rgba([10, 20, 30, 255]);
        assert_eq!(blend_pixel(dst, Rgba([255, 0, 0, 0])), dst);
        assert_eq!(blend_pixel(dst, Rgba([255, 0, 0, 255])), Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn rounded_rect_clamps_oversized_radius() {
        // Radius far larger than the rect: corners clamp to half-extent and
        // the center is still inside.
        assert!(point_in_rounded_rect(10, 5, 0, 0, 20, 10, 1000.0));
        assert!(!point_in_rounded_rect(0, 0, 0, 0, 20, 10, 1000.0));
    }

    #[test]
    fn highlight_tints_and_outlines_its_box() {
        let base = white_base(100, 100);
        let highlights = vec![BoundingBox::new(20.0, 20.0, 40.0, 30.0)];
        let img = compose(&base, &highlights, &[], &AnnotationStyle::default());
        // Interior picked up the translucent fill.
        let interior = img.get_pixel(40, 35);
        assert!(interior[0] == 255 && interior[1] < 255 && interior[2] < 255);
        // Outline is the opaque stroke color.
        assert_eq!(*img.get_pixel(20, 20), Rgba([255, 59, 48, 255]));
        // Far corner untouched.
        assert_eq!(*img.get_pixel(90, 90), Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn badge_renders_at_optimized_position_not_anchor() {
        let base = white_base(200, 200);
        let boxes = vec![BoundingBox::new(50.0, 80.0, 60.0, 40.0)];
        let mut labels = initialize_labels(&boxes, &BadgeStyle::default());
        // Pretend the optimizer moved the badge well away from its anchor.
        labels[0].x = 150.0;
        labels[0].y = 10.0;
        let img = compose(&base, &[], &labels, &AnnotationStyle::default());
        let moved = img.get_pixel(155, 15);
        assert_eq!(moved[0], 255);
        assert!(moved[1] < 255);
        // Nothing at the anchor spot.
        let at_anchor = img.get_pixel(52, 60);
        assert_eq!(*at_anchor, Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn render_annotated_produces_decodable_png() {
        let base = white_base(64, 48);
        let boxes = vec![BoundingBox::new(8.0, 24.0, 20.0, 12.0)];
        let labels = initialize_labels(&boxes, &BadgeStyle::default());
        let bytes =
            render_annotated(&base, &boxes, &labels, &AnnotationStyle::default()).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!(decoded.width(), 64);
        assert_eq!(decoded.height(), 48);
    }
}

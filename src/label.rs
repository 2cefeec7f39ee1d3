use crate::scene::BoundingBox;
use image::Rgba;
use serde::{Deserialize, Serialize};

/// One numeric badge attached to a highlight box. `mark_id` is assigned in
/// selection order starting at 1 and restarts per batch. The anchor is fixed
/// at creation; only (x, y) move during optimization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelPlacement {
    pub mark_id: u32,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub anchor_x: f64,
    pub anchor_y: f64,
}

impl LabelPlacement {
    pub fn rect(&self) -> BoundingBox {
        BoundingBox::new(self.x, self.y, self.width, self.height)
    }
}

/// Badge appearance. Glyphs come from the 8x8 bitmap font, so the effective
/// text size snaps to whole multiples of 8 px.
#[derive(Debug, Clone)]
pub struct BadgeStyle {
    pub font_size: f64,
    pub padding_x: f64,
    pub padding_y: f64,
    pub corner_radius: f64,
    pub fill: Rgba<u8>,
    pub text_color: Rgba<u8>,
}

impl Default for BadgeStyle {
    fn default() -> Self {
        Self {
            font_size: 12.0,
            padding_x: 6.0,
            padding_y: 4.0,
            corner_radius: 4.0,
            fill: Rgba([255, 59, 48, 255]),
            text_color: Rgba([255, 255, 255, 255]),
        }
    }
}

/// Integer upscale factor for the 8x8 glyph grid.
pub fn glyph_scale(font_size: f64) -> u32 {
    (font_size / 8.0).round().max(1.0) as u32
}

/// Rendered width of `text` in pixels: glyph cells are 8 px wide at scale 1.
pub fn measure_text_width(text: &str, font_size: f64) -> f64 {
    (text.chars().count() as f64) * 8.0 * f64::from(glyph_scale(font_size))
}

pub fn glyph_height(font_size: f64) -> f64 {
    8.0 * f64::from(glyph_scale(font_size))
}

/// Badge rectangle for a numeral: measured text plus fixed padding.
pub fn badge_size(text: &str, style: &BadgeStyle) -> (f64, f64) {
    let width = measure_text_width(text, style.font_size) + style.padding_x * 2.0;
    let height = glyph_height(style.font_size) + style.padding_y * 2.0;
    (width, height)
}

/// Assign markIds 1..=n in input order and seat each badge directly above
/// its highlight box, left-aligned. That seat doubles as the anchor the
/// optimizer is penalized for drifting away from.
pub fn initialize_labels(highlights: &[BoundingBox], style: &BadgeStyle) -> Vec<LabelPlacement> {
    highlights
        .iter()
        .enumerate()
        .map(|(idx, bbox)| {
            let mark_id = idx as u32 + 1;
            let (width, height) = badge_size(&mark_id.to_string(), style);
            let x = bbox.x;
            let y = bbox.y - height;
            LabelPlacement {
                mark_id,
                x,
                y,
                width,
                height,
                anchor_x: x,
                anchor_y: y,
            }
        })
        .collect()
}

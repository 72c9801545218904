use fontdue::{Font as FontdueFont, FontSettings, Metrics};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::{Canvas, TextRasterizer};
use crate::error::{RenderError, RenderResult};

/// TrueType/OpenType font rasterized with fontdue.
///
/// Text is laid out on a single line. The pen starts at `x` and the ascender
/// line sits at `y`, so drawing at (0, 0) puts the tallest glyphs flush with
/// the top-left corner of the canvas.
pub struct TrueTypeFont {
    font: Arc<FontdueFont>,
    font_size: f32,
    /// Distance from the top of the line box to the baseline, in pixels
    ascender_px: f32,
    glyph_cache: Mutex<HashMap<char, (Metrics, Vec<u8>)>>,
}

impl TrueTypeFont {
    /// Load a font file at `font_size` pixels.
    pub fn from_file(path: &Path, font_size: u32) -> RenderResult<Self> {
        let font_data = std::fs::read(path).map_err(|e| RenderError::Font {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_bytes(&font_data, font_size).map_err(|message| RenderError::Font {
            path: path.to_path_buf(),
            message,
        })
    }

    /// Parse a font from raw bytes.
    pub fn from_bytes(font_data: &[u8], font_size: u32) -> Result<Self, String> {
        let font = FontdueFont::from_bytes(font_data, FontSettings::default())
            .map_err(|e| format!("Failed to parse font: {}", e))?;

        let face = ttf_parser::Face::parse(font_data, 0)
            .map_err(|e| format!("Failed to parse font metrics: {:?}", e))?;

        let scale = font_size as f32 / face.units_per_em() as f32;
        let ascender_px = face.ascender() as f32 * scale;
        let descender_px = face.descender() as f32 * scale;

        tracing::debug!(
            font_size,
            ascender = ascender_px,
            descender = descender_px,
            "Loaded font metrics"
        );

        Ok(Self {
            font: Arc::new(font),
            font_size: font_size as f32,
            ascender_px,
            glyph_cache: Mutex::new(HashMap::new()),
        })
    }

    fn kern(&self, left: char, right: char) -> f32 {
        self.font
            .horizontal_kern(left, right, self.font_size)
            .unwrap_or(0.0)
    }

    /// Coverage bitmap for a character (cached)
    fn glyph(&self, ch: char) -> (Metrics, Vec<u8>) {
        let mut cache = self
            .glyph_cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        cache
            .entry(ch)
            .or_insert_with(|| self.font.rasterize(ch, self.font_size))
            .clone()
    }
}

impl TextRasterizer for TrueTypeFont {
    fn draw_text(&self, canvas: &mut Canvas, x: i32, y: i32, text: &str, color: [u8; 3]) {
        let baseline = y as f32 + self.ascender_px;
        let mut pen_x = x as f32;
        let mut previous = None;

        for ch in text.chars() {
            if let Some(prev) = previous {
                pen_x += self.kern(prev, ch);
            }
            let (metrics, bitmap) = self.glyph(ch);

            // fontdue's ymin is the distance from the baseline to the bottom of the glyph
            let left = pen_x.round() as i32 + metrics.xmin;
            let top = (baseline - metrics.ymin as f32 - metrics.height as f32).round() as i32;

            for gy in 0..metrics.height {
                for gx in 0..metrics.width {
                    let coverage = bitmap[gy * metrics.width + gx];
                    canvas.blend_pixel(left + gx as i32, top + gy as i32, color, coverage);
                }
            }

            pen_x += metrics.advance_width;
            previous = Some(ch);
        }
    }
}

/// Resolve a configured font path. Relative paths are taken as-is (relative to the working directory).
pub fn load_font(path: &Path, font_size: u32) -> RenderResult<TrueTypeFont> {
    if !path.is_file() {
        return Err(RenderError::Font {
            path: PathBuf::from(path),
            message: "no such font file".to_string(),
        });
    }
    let font = TrueTypeFont::from_file(path, font_size)?;
    tracing::info!(font = %path.display(), size = font_size, "Font loaded");
    Ok(font)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_font_file_is_a_font_error() {
        let err = load_font(Path::new("/nonexistent/dir/Nope.ttf"), 32)
            .err()
            .unwrap();
        assert!(matches!(err, RenderError::Font { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn garbage_bytes_do_not_parse() {
        assert!(TrueTypeFont::from_bytes(b"definitely not a font", 16).is_err());
    }
}

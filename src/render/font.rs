//! Font metrics and glyph generation for text fields.
//!
//! Uses the Spleen bitmap font family for the glyph shapes and scales them
//! to the cell size of the requested ZPL font.
//!
//! ## Built-in Fonts
//!
//! | Font | Cell (h × w) | Gap | Scaling |
//! |------|--------------|-----|---------|
//! | A | 9 × 5 | 1 | integer magnification |
//! | B | 11 × 7 | 2 | integer magnification |
//! | C, D | 18 × 10 | 2 | integer magnification |
//! | E | 28 × 15 | 5 | integer magnification |
//! | F | 26 × 13 | 3 | integer magnification |
//! | G | 60 × 40 | 8 | integer magnification |
//! | H | 21 × 13 | 6 | integer magnification |
//! | 0 | 15 × 12 | 0 | any size |

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use spleen_font::{FONT_6X12, FONT_8X16, FONT_12X24, PSF2Font};

use super::RenderError;
use super::bitmap::Field;
use crate::ir::FontSpec;

/// Native cell size of a ZPL font.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FontMetrics {
    pub char_height: usize,
    pub char_width: usize,
    /// Blank columns between characters
    pub gap: usize,
    /// Font `0` scales freely; bitmap fonts only by whole multiples
    pub scalable: bool,
}

impl FontMetrics {
    const fn bitmap(char_height: usize, char_width: usize, gap: usize) -> Self {
        Self {
            char_height,
            char_width,
            gap,
            scalable: false,
        }
    }

    pub const FONT_0: FontMetrics = FontMetrics {
        char_height: 15,
        char_width: 12,
        gap: 0,
        scalable: true,
    };

    pub const FONT_A: FontMetrics = Self::bitmap(9, 5, 1);
    pub const FONT_B: FontMetrics = Self::bitmap(11, 7, 2);
    pub const FONT_D: FontMetrics = Self::bitmap(18, 10, 2);
    pub const FONT_E: FontMetrics = Self::bitmap(28, 15, 5);
    pub const FONT_F: FontMetrics = Self::bitmap(26, 13, 3);
    pub const FONT_G: FontMetrics = Self::bitmap(60, 40, 8);
    pub const FONT_H: FontMetrics = Self::bitmap(21, 13, 6);

    /// Metrics for a ZPL font name, or `None` if the printer has no such font.
    pub fn for_font(name: char) -> Option<FontMetrics> {
        match name.to_ascii_uppercase() {
            '0' => Some(Self::FONT_0),
            'A' => Some(Self::FONT_A),
            'B' => Some(Self::FONT_B),
            'C' | 'D' => Some(Self::FONT_D),
            'E' => Some(Self::FONT_E),
            'F' => Some(Self::FONT_F),
            'G' => Some(Self::FONT_G),
            'H' => Some(Self::FONT_H),
            _ => None,
        }
    }
}

/// Resolved cell geometry for one text field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellSize {
    pub height: usize,
    pub width: usize,
    /// Horizontal distance from one character to the next
    pub advance: usize,
}

impl CellSize {
    /// Resolve the requested height/width against a font's metrics.
    pub fn resolve(spec: &FontSpec) -> Result<CellSize, RenderError> {
        let metrics = FontMetrics::for_font(spec.name).ok_or(RenderError::UnsupportedFont(spec.name))?;
        let requested_h = spec.height.map(|h| h as usize);
        let requested_w = spec.width.map(|w| w as usize);

        if metrics.scalable {
            let height = requested_h.unwrap_or(metrics.char_height).max(1);
            // Without an explicit width keep the font's native proportions.
            let width = requested_w
                .unwrap_or(height)
                .saturating_mul(metrics.char_width)
                .checked_div(metrics.char_height)
                .unwrap_or(1)
                .max(1);
            return Ok(CellSize {
                height,
                width,
                advance: width + metrics.gap,
            });
        }

        let magnify = |requested: Option<usize>, base: usize| {
            requested.map(|r| ((r + base / 2) / base).clamp(1, 10))
        };
        let mag_h = magnify(requested_h, metrics.char_height);
        let mag_w = magnify(requested_w, metrics.char_width);
        let (mag_h, mag_w) = match (mag_h, mag_w) {
            (Some(h), Some(w)) => (h, w),
            (Some(h), None) => (h, h),
            (None, Some(w)) => (w, w),
            (None, None) => (1, 1),
        };

        Ok(CellSize {
            height: metrics.char_height * mag_h,
            width: metrics.char_width * mag_w,
            advance: (metrics.char_width + metrics.gap) * mag_w,
        })
    }
}

/// Spleen source font picked for a target cell height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum SourceFont {
    S6x12,
    S8x16,
    S12x24,
}

impl SourceFont {
    fn for_height(height: usize) -> Self {
        match height {
            0..=14 => Self::S6x12,
            15..=20 => Self::S8x16,
            _ => Self::S12x24,
        }
    }

    fn size(self) -> (usize, usize) {
        match self {
            Self::S6x12 => (6, 12),
            Self::S8x16 => (8, 16),
            Self::S12x24 => (12, 24),
        }
    }

    fn data(self) -> &'static [u8] {
        match self {
            Self::S6x12 => FONT_6X12,
            Self::S8x16 => FONT_8X16,
            Self::S12x24 => FONT_12X24,
        }
    }
}

/// Lays out lines of text, caching source glyphs per render.
#[derive(Debug, Default)]
pub struct TextRenderer {
    glyphs: HashMap<(SourceFont, char), Vec<u8>>,
}

impl TextRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lay out `text` as a single unrotated line in the given font.
    pub fn layout<'a>(&'a mut self, spec: &FontSpec, text: &str) -> Result<TextField<'a>, RenderError> {
        let cell = CellSize::resolve(spec)?;
        let source = SourceFont::for_height(cell.height);

        for ch in text.chars() {
            if let Entry::Vacant(slot) = self.glyphs.entry((source, ch)) {
                slot.insert(generate_glyph(source, ch)?);
            }
        }

        let cache = &self.glyphs;
        let glyphs = text
            .chars()
            .map(|ch| {
                cache
                    .get(&(source, ch))
                    .map(Vec::as_slice)
                    .ok_or_else(|| RenderError::Glyph(format!("glyph cache miss for {ch:?}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(TextField {
            cell,
            source: source.size(),
            glyphs,
        })
    }
}

/// One line of text, scaled from the source glyphs on demand.
#[derive(Debug)]
pub struct TextField<'a> {
    cell: CellSize,
    source: (usize, usize),
    glyphs: Vec<&'a [u8]>,
}

impl Field for TextField<'_> {
    fn width(&self) -> usize {
        match self.glyphs.len() {
            0 => 0,
            n => self.cell.advance.saturating_mul(n - 1).saturating_add(self.cell.width),
        }
    }

    fn height(&self) -> usize {
        self.cell.height
    }

    fn is_black(&self, x: usize, y: usize) -> bool {
        let (src_w, src_h) = self.source;
        let (index, dx) = (x / self.cell.advance, x % self.cell.advance);
        let Some(glyph) = self.glyphs.get(index) else {
            return false;
        };
        if dx >= self.cell.width {
            return false;
        }
        // Nearest neighbor from the source glyph to the cell.
        let sx = dx * src_w / self.cell.width;
        let sy = y * src_h / self.cell.height;
        glyph.get(sy * src_w + sx).is_some_and(|&p| p != 0)
    }
}

/// Generate a source glyph bitmap. Each byte is 0 (white) or 1 (black).
fn generate_glyph(source: SourceFont, ch: char) -> Result<Vec<u8>, RenderError> {
    let (width, height) = source.size();
    let mut glyph = vec![0u8; width * height];

    if ch == ' ' {
        return Ok(glyph);
    }

    let mut spleen = PSF2Font::new(source.data())
        .map_err(|_| RenderError::Glyph("failed to load Spleen font".to_string()))?;
    let utf8_bytes = ch.to_string();

    if let Some(spleen_glyph) = spleen.glyph_for_utf8(utf8_bytes.as_bytes()) {
        for (row_y, row) in spleen_glyph.enumerate() {
            for (col_x, on) in row.enumerate() {
                if row_y < height && col_x < width {
                    glyph[row_y * width + col_x] = if on { 1 } else { 0 };
                }
            }
        }
    } else {
        // Unknown characters print as an empty box.
        draw_box(&mut glyph, width, height);
    }

    Ok(glyph)
}

/// Draw a box outline in the glyph buffer.
fn draw_box(glyph: &mut [u8], width: usize, height: usize) {
    for x in 1..width - 1 {
        glyph[2 * width + x] = 1;
        glyph[(height - 2) * width + x] = 1;
    }
    for y in 2..height - 1 {
        glyph[y * width + 1] = 1;
        glyph[y * width + width - 2] = 1;
    }
}

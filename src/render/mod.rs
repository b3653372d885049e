//! # Rasterizer
//!
//! Paints a parsed job ([`DrawCommand`]s) onto a 1-bit canvas sized from the
//! [`LabelConfiguration`].
//!
//! ## Coordinates
//!
//! ```text
//! (0,0) ──────────────► x (dots)
//!   │  ┌ label home (^LH)
//!   │  │    ┌ field origin (^FO / ^FT), relative to label home
//!   ▼  │    │
//!   y  └────┴─► field, rotated to its orientation
//! ```
//!
//! Each content command (text, barcode, box, circle) consumes the current
//! field origin; the origin then returns to (0,0). Fields are [`Field`]s
//! sampled pixel by pixel, and only the pixels that land on the canvas are
//! visited. A field far larger than the label costs no more than one the
//! size of the label.
//!
//! Rendering touches no shared state: the same commands and configuration
//! always produce the same bitmap.

pub mod barcode;
pub mod bitmap;
pub mod font;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::ir::{Anchor, DrawCommand, LineColor, Orientation};
use crate::printer::LabelConfiguration;

pub use bitmap::{Bitmap, Field, Ink};
pub use font::{FontMetrics, TextField, TextRenderer};

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("unsupported font: {0}")]
    UnsupportedFont(char),

    #[error("glyph error: {0}")]
    Glyph(String),

    #[error("canvas of {width} x {height} dots is too large")]
    CanvasTooLarge { width: usize, height: usize },

    /// The render task stopped before producing a bitmap
    #[error("render aborted: {0}")]
    Aborted(String),
}

/// A rendered label, ready to be stored.
#[derive(Debug, Clone)]
pub struct RenderedLabel {
    pub id: u64,
    pub bitmap: Bitmap,
    /// Requested print quantity (`^PQ`); recorded only.
    pub quantity: u32,
    pub created_at: DateTime<Utc>,
}

impl RenderedLabel {
    pub fn width_px(&self) -> usize {
        self.bitmap.width()
    }

    pub fn height_px(&self) -> usize {
        self.bitmap.height()
    }

    pub fn to_png(&self) -> Result<Vec<u8>, image::ImageError> {
        self.bitmap.to_png()
    }
}

/// Current field origin, relative to the label home.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Origin {
    x: i64,
    y: i64,
    anchor: Anchor,
}

impl Default for Origin {
    fn default() -> Self {
        Self {
            x: 0,
            y: 0,
            anchor: Anchor::TopLeft,
        }
    }
}

pub struct Rasterizer {
    width: usize,
    height: usize,
    text: TextRenderer,
}

impl Rasterizer {
    pub fn new(config: &LabelConfiguration) -> Self {
        Self {
            width: config.width_px(),
            height: config.height_px(),
            text: TextRenderer::new(),
        }
    }

    /// Render commands in order onto a fresh white canvas.
    pub fn render(&mut self, commands: &[DrawCommand]) -> Result<Bitmap, RenderError> {
        let mut canvas = Bitmap::new(self.width, self.height)?;
        let mut home = (0i64, 0i64);
        let mut origin = Origin::default();

        for cmd in commands {
            match cmd {
                DrawCommand::SetOrigin { x, y, anchor } => {
                    origin = Origin {
                        x: *x as i64,
                        y: *y as i64,
                        anchor: *anchor,
                    };
                }
                DrawCommand::SetLabelHome { x, y } => home = (*x as i64, *y as i64),
                DrawCommand::DrawText { font, text, reverse } => {
                    let line = self.text.layout(font, text)?;
                    place_field(&mut canvas, &line, font.orientation, home, origin, field_ink(*reverse, LineColor::Black));
                }
                DrawCommand::DrawBarcode { barcode, reverse } => {
                    if let Some(bars) = barcode::render_barcode(barcode, &mut self.text)? {
                        place_field(&mut canvas, &bars, barcode.orientation, home, origin, field_ink(*reverse, LineColor::Black));
                    }
                }
                DrawCommand::DrawBox {
                    width,
                    height,
                    thickness,
                    color,
                    rounding,
                    reverse,
                } => {
                    let shape = BoxShape::new(*width as usize, *height as usize, *thickness as usize, *rounding);
                    place_field(&mut canvas, &shape, Orientation::Normal, home, origin, field_ink(*reverse, *color));
                }
                DrawCommand::DrawCircle {
                    diameter,
                    thickness,
                    color,
                    reverse,
                } => {
                    let shape = CircleShape {
                        diameter: *diameter as usize,
                        thickness: *thickness as usize,
                    };
                    place_field(&mut canvas, &shape, Orientation::Normal, home, origin, field_ink(*reverse, *color));
                }
                DrawCommand::SetQuantity(_) | DrawCommand::Unknown { .. } => {}
            }

            if cmd.is_content() {
                origin = Origin::default();
            }
        }

        Ok(canvas)
    }
}

/// Render commands onto a canvas for `config`.
pub fn render(commands: &[DrawCommand], config: &LabelConfiguration) -> Result<Bitmap, RenderError> {
    Rasterizer::new(config).render(commands)
}

/// Render commands into a label with the given id.
pub fn render_label(commands: &[DrawCommand], config: &LabelConfiguration, id: u64) -> Result<RenderedLabel, RenderError> {
    let bitmap = render(commands, config)?;
    let quantity = commands
        .iter()
        .rev()
        .find_map(|cmd| match cmd {
            DrawCommand::SetQuantity(q) => Some(*q),
            _ => None,
        })
        .unwrap_or(1);

    Ok(RenderedLabel {
        id,
        bitmap,
        quantity,
        created_at: Utc::now(),
    })
}

fn field_ink(reverse: bool, color: LineColor) -> Ink {
    match (reverse, color) {
        (true, _) => Ink::Invert,
        (false, LineColor::Black) => Ink::Black,
        (false, LineColor::White) => Ink::White,
    }
}

/// Rotate a field and paint it at the current origin.
fn place_field(canvas: &mut Bitmap, field: &dyn Field, orientation: Orientation, home: (i64, i64), origin: Origin, ink: Ink) {
    let x = home.0 + origin.x;
    let mut y = home.1 + origin.y;
    // A baseline origin marks the bottom of an upright field.
    if origin.anchor == Anchor::Baseline && orientation == Orientation::Normal {
        y -= i64::try_from(field.height()).unwrap_or(i64::MAX);
    }
    canvas.draw(field, orientation, x, y, ink);
}

/// Box outline of the given thickness; a thickness covering the box fills it.
struct BoxShape {
    width: usize,
    height: usize,
    thickness: usize,
    /// Corner radius in dots, 0 for square corners
    radius: f64,
}

impl BoxShape {
    fn new(width: usize, height: usize, thickness: usize, rounding: u8) -> Self {
        Self {
            width,
            height,
            thickness: thickness.min(width).min(height),
            radius: rounding as f64 * width.min(height) as f64 / 16.0,
        }
    }
}

impl Field for BoxShape {
    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }

    fn is_black(&self, x: usize, y: usize) -> bool {
        let t = self.thickness;
        if self.radius == 0.0 {
            return x < t || y < t || x >= self.width - t || y >= self.height - t;
        }

        let (px, py) = (x as f64 + 0.5, y as f64 + 0.5);
        let inner_w = self.width.saturating_sub(2 * t) as f64;
        let inner_h = self.height.saturating_sub(2 * t) as f64;
        let inner_radius = (self.radius - t as f64).max(0.0);

        let outer = inside_rounded(px, py, 0.0, 0.0, self.width as f64, self.height as f64, self.radius);
        let inner = inner_w > 0.0
            && inner_h > 0.0
            && inside_rounded(px, py, t as f64, t as f64, inner_w, inner_h, inner_radius);
        outer && !inner
    }
}

/// Whether a point lies inside a rectangle with corners rounded to `radius`.
fn inside_rounded(px: f64, py: f64, x0: f64, y0: f64, w: f64, h: f64, radius: f64) -> bool {
    if px < x0 || py < y0 || px > x0 + w || py > y0 + h {
        return false;
    }
    let cx = px.clamp(x0 + radius, x0 + w - radius);
    let cy = py.clamp(y0 + radius, y0 + h - radius);
    let (dx, dy) = (px - cx, py - cy);
    dx * dx + dy * dy <= radius * radius
}

/// Circle ring of the given thickness inside a `diameter` square.
struct CircleShape {
    diameter: usize,
    thickness: usize,
}

impl Field for CircleShape {
    fn width(&self) -> usize {
        self.diameter
    }

    fn height(&self) -> usize {
        self.diameter
    }

    fn is_black(&self, x: usize, y: usize) -> bool {
        let outer = self.diameter as f64 / 2.0;
        let inner = outer - self.thickness as f64;
        let dx = x as f64 + 0.5 - outer;
        let dy = y as f64 + 0.5 - outer;
        let dist = (dx * dx + dy * dy).sqrt();
        dist <= outer && dist > inner
    }
}

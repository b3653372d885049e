//! 1-bit bitmap used as the label canvas, and the [`Field`] trait for
//! anything that can be painted onto it.
//!
//! Pixels are stored one byte each: 0 = white (background), 1 = black.

use image::error::{LimitError, LimitErrorKind};
use image::{GrayImage, ImageEncoder, ImageError, Luma};

use super::RenderError;
use crate::ir::Orientation;
use crate::printer::MAX_CANVAS_DOTS;

/// How a painted pixel combines with the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ink {
    Black,
    White,
    /// XOR with whatever is already there (`^FR` reverse fields)
    Invert,
}

/// An unrotated field answered pixel by pixel.
///
/// Fields never allocate their full extent; the canvas asks only for the
/// pixels it can show.
pub trait Field {
    fn width(&self) -> usize;
    fn height(&self) -> usize;
    /// Whether (x, y) is inked. Only called with x < width and y < height.
    fn is_black(&self, x: usize, y: usize) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    width: usize,
    height: usize,
    pixels: Vec<u8>,
}

impl Bitmap {
    /// Create an all-white bitmap of at most [`MAX_CANVAS_DOTS`] pixels.
    pub fn new(width: usize, height: usize) -> Result<Self, RenderError> {
        let len = width
            .checked_mul(height)
            .filter(|&len| len <= MAX_CANVAS_DOTS)
            .ok_or(RenderError::CanvasTooLarge { width, height })?;
        Ok(Self {
            width,
            height,
            pixels: vec![0u8; len],
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Raw pixels, row-major, 1 = black.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn is_black(&self, x: usize, y: usize) -> bool {
        x < self.width && y < self.height && self.pixels[y * self.width + x] != 0
    }

    pub fn count_black(&self) -> usize {
        self.pixels.iter().filter(|&&p| p != 0).count()
    }

    /// Paint one pixel. Coordinates outside the bitmap are clipped.
    pub fn paint(&mut self, x: i64, y: i64, ink: Ink) {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return;
        }
        let idx = y as usize * self.width + x as usize;
        self.pixels[idx] = match ink {
            Ink::Black => 1,
            Ink::White => 0,
            Ink::Invert => self.pixels[idx] ^ 1,
        };
    }

    /// Paint `field`, turned clockwise to `orientation`, with its top-left
    /// corner at (x, y).
    ///
    /// Only the part of the field that lands on the bitmap is visited, so
    /// the cost is bounded by the bitmap size whatever the field claims.
    pub fn draw(&mut self, field: &dyn Field, orientation: Orientation, x: i64, y: i64, ink: Ink) {
        let (fw, fh) = (field.width(), field.height());
        let (w, h) = match orientation {
            Orientation::Normal | Orientation::Inverted => (fw, fh),
            Orientation::Rotated | Orientation::Bottom => (fh, fw),
        };

        let x0 = x.max(0);
        let y0 = y.max(0);
        let x1 = x.saturating_add(extent(w)).min(self.width as i64);
        let y1 = y.saturating_add(extent(h)).min(self.height as i64);

        for cy in y0..y1 {
            for cx in x0..x1 {
                let (rx, ry) = ((cx - x) as usize, (cy - y) as usize);
                let (fx, fy) = match orientation {
                    Orientation::Normal => (rx, ry),
                    Orientation::Inverted => (fw - 1 - rx, fh - 1 - ry),
                    // (fx, fy) -> (fh - 1 - fy, fx)
                    Orientation::Rotated => (ry, fh - 1 - rx),
                    // (fx, fy) -> (fy, fw - 1 - fx)
                    Orientation::Bottom => (fw - 1 - ry, rx),
                };
                if field.is_black(fx, fy) {
                    self.paint(cx, cy, ink);
                }
            }
        }
    }

    /// Encode as an 8-bit grayscale PNG (black on white).
    pub fn to_png(&self) -> Result<Vec<u8>, ImageError> {
        let too_large = |_| ImageError::Limits(LimitError::from_kind(LimitErrorKind::DimensionError));
        let width = u32::try_from(self.width).map_err(too_large)?;
        let height = u32::try_from(self.height).map_err(too_large)?;

        let mut img = GrayImage::new(width, height);
        for (pixel, &dot) in img.pixels_mut().zip(&self.pixels) {
            *pixel = Luma([if dot != 0 { 0u8 } else { 255u8 }]);
        }

        let mut png_bytes = Vec::new();
        let encoder = image::codecs::png::PngEncoder::new(&mut png_bytes);
        encoder.write_image(img.as_raw(), width, height, image::ExtendedColorType::L8)?;

        Ok(png_bytes)
    }
}

impl Field for Bitmap {
    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }

    fn is_black(&self, x: usize, y: usize) -> bool {
        Bitmap::is_black(self, x, y)
    }
}

fn extent(size: usize) -> i64 {
    i64::try_from(size).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn l_shape() -> Bitmap {
        // X.
        // X.
        // XX
        let mut bmp = Bitmap::new(2, 3).unwrap();
        bmp.paint(0, 0, Ink::Black);
        bmp.paint(0, 1, Ink::Black);
        bmp.paint(0, 2, Ink::Black);
        bmp.paint(1, 2, Ink::Black);
        bmp
    }

    fn drawn(field: &dyn Field, orientation: Orientation) -> Bitmap {
        let mut canvas = Bitmap::new(3, 3).unwrap();
        canvas.draw(field, orientation, 0, 0, Ink::Black);
        canvas
    }

    /// Solid field that claims to be enormous.
    struct Endless;

    impl Field for Endless {
        fn width(&self) -> usize {
            usize::MAX
        }

        fn height(&self) -> usize {
            usize::MAX
        }

        fn is_black(&self, _x: usize, _y: usize) -> bool {
            true
        }
    }

    #[test]
    fn test_new_is_white() {
        let bmp = Bitmap::new(4, 3).unwrap();
        assert_eq!(bmp.pixels().len(), 12);
        assert_eq!(bmp.count_black(), 0);
    }

    #[test]
    fn test_new_refuses_oversized_canvas() {
        assert!(matches!(
            Bitmap::new(usize::MAX, 2),
            Err(RenderError::CanvasTooLarge { .. })
        ));
        assert!(Bitmap::new(32_000, 32_000).is_err());
    }

    #[test]
    fn test_paint_clips() {
        let mut bmp = Bitmap::new(2, 2).unwrap();
        bmp.paint(-1, 0, Ink::Black);
        bmp.paint(2, 0, Ink::Black);
        bmp.paint(0, 5, Ink::Black);
        assert_eq!(bmp.count_black(), 0);
    }

    #[test]
    fn test_invert_ink() {
        let mut bmp = Bitmap::new(3, 1).unwrap();
        bmp.paint(0, 0, Ink::Black);
        bmp.paint(1, 0, Ink::Black);
        bmp.paint(1, 0, Ink::Invert);
        bmp.paint(2, 0, Ink::Invert);
        assert!(bmp.is_black(0, 0));
        assert!(!bmp.is_black(1, 0));
        assert!(bmp.is_black(2, 0));
    }

    #[test]
    fn test_draw_rotations() {
        let bmp = l_shape();

        assert_eq!(drawn(&bmp, Orientation::Normal).count_black(), 4);

        let r = drawn(&bmp, Orientation::Rotated);
        // XXX
        // X..
        assert!(r.is_black(0, 0) && r.is_black(1, 0) && r.is_black(2, 0));
        assert!(r.is_black(0, 1) && !r.is_black(2, 1));
        assert_eq!(r.count_black(), 4);

        let i = drawn(&bmp, Orientation::Inverted);
        // XX
        // .X
        // .X
        assert!(i.is_black(0, 0) && i.is_black(1, 0) && !i.is_black(0, 1));
        assert!(i.is_black(1, 2));

        let b = drawn(&bmp, Orientation::Bottom);
        // ..X
        // XXX
        assert!(b.is_black(2, 0) && !b.is_black(0, 0));
        assert_eq!(b.count_black(), 4);
    }

    #[test]
    fn test_draw_clips_to_canvas() {
        let mut canvas = Bitmap::new(4, 4).unwrap();
        canvas.draw(&l_shape(), Orientation::Normal, 2, 2, Ink::Black);
        // The foot of the L falls off the bottom edge.
        assert!(canvas.is_black(2, 2) && canvas.is_black(2, 3));
        assert_eq!(canvas.count_black(), 2);

        canvas.draw(&l_shape(), Orientation::Normal, -1, -1, Ink::Black);
        assert!(canvas.is_black(0, 1));
        assert_eq!(canvas.count_black(), 3);
    }

    #[test]
    fn test_draw_huge_field_only_visits_canvas() {
        let mut canvas = Bitmap::new(5, 4).unwrap();
        canvas.draw(&Endless, Orientation::Normal, 1, 1, Ink::Black);
        assert_eq!(canvas.count_black(), 4 * 3);

        let mut canvas = Bitmap::new(5, 4).unwrap();
        canvas.draw(&Endless, Orientation::Inverted, -10, -10, Ink::Invert);
        assert_eq!(canvas.count_black(), 20);
    }

    #[test]
    fn test_png_dimensions() {
        let png = l_shape().to_png().unwrap();
        let img = image::load_from_memory(&png).unwrap();
        assert_eq!((img.width(), img.height()), (2, 3));
        assert_eq!(img.to_luma8().get_pixel(1, 2).0[0], 0);
        assert_eq!(img.to_luma8().get_pixel(1, 0).0[0], 255);
    }
}

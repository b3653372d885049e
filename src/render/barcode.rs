//! Barcode rasterization.
//!
//! Uses the barcoders crate for the linear symbologies (Code 39, Code 128,
//! EAN-13), qrcode for QR and pdf417 for PDF417. Every encoder returns an
//! unrotated [`ModuleGrid`]; the caller applies the field orientation.

use barcoders::sym::code39::Code39;
use barcoders::sym::code128::Code128;
use barcoders::sym::ean13::EAN13;
use tracing::debug;

use super::RenderError;
use super::bitmap::Field;
use super::font::{TextField, TextRenderer};
use crate::ir::{BarcodeSpec, FontSpec, InterpretationLine, Orientation, QrErrorLevel, Symbology};

/// Dots between the bars and the human-readable line.
const INTERPRETATION_GAP: usize = 2;

/// Encoded modules on a grid, each `module_width` × `module_height` dots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleGrid {
    columns: usize,
    rows: usize,
    /// Row-major, true = dark
    modules: Vec<bool>,
    module_width: usize,
    module_height: usize,
}

impl ModuleGrid {
    /// One row of bars (1 = bar) stretched to `height`.
    fn linear(bars: &[u8], module_width: usize, height: usize) -> Self {
        Self {
            columns: bars.len(),
            rows: 1,
            modules: bars.iter().map(|&b| b == 1).collect(),
            module_width,
            module_height: height,
        }
    }
}

impl Field for ModuleGrid {
    fn width(&self) -> usize {
        self.columns.saturating_mul(self.module_width)
    }

    fn height(&self) -> usize {
        self.rows.saturating_mul(self.module_height)
    }

    fn is_black(&self, x: usize, y: usize) -> bool {
        let (column, row) = (x / self.module_width, y / self.module_height);
        column < self.columns && self.modules.get(row * self.columns + column).copied().unwrap_or(false)
    }
}

/// A barcode with its optional human-readable line.
pub struct BarcodeField<'a> {
    bars: ModuleGrid,
    bars_at: (usize, usize),
    line: Option<(TextField<'a>, (usize, usize))>,
    width: usize,
    height: usize,
}

impl<'a> BarcodeField<'a> {
    fn bars_only(bars: ModuleGrid) -> Self {
        Self {
            width: bars.width(),
            height: bars.height(),
            bars,
            bars_at: (0, 0),
            line: None,
        }
    }

    /// Place the interpretation line above or below the bars, centered.
    fn with_line(bars: ModuleGrid, line: TextField<'a>, position: InterpretationLine) -> Self {
        let width = bars.width().max(line.width());
        let height = bars.height().saturating_add(INTERPRETATION_GAP).saturating_add(line.height());
        let bars_x = (width - bars.width()) / 2;
        let line_x = (width - line.width()) / 2;
        let (bars_y, line_y) = match position {
            InterpretationLine::Above => (line.height() + INTERPRETATION_GAP, 0),
            _ => (0, bars.height().saturating_add(INTERPRETATION_GAP)),
        };
        Self {
            bars,
            bars_at: (bars_x, bars_y),
            line: Some((line, (line_x, line_y))),
            width,
            height,
        }
    }
}

impl Field for BarcodeField<'_> {
    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }

    fn is_black(&self, x: usize, y: usize) -> bool {
        inside(&self.bars, self.bars_at, x, y)
            || self.line.as_ref().is_some_and(|(line, at)| inside(line, *at, x, y))
    }
}

/// Whether (x, y) hits an inked pixel of `field` placed at `at`.
fn inside(field: &dyn Field, at: (usize, usize), x: usize, y: usize) -> bool {
    match (x.checked_sub(at.0), y.checked_sub(at.1)) {
        (Some(fx), Some(fy)) if fx < field.width() && fy < field.height() => field.is_black(fx, fy),
        _ => false,
    }
}

/// Render a barcode field.
///
/// Returns `Ok(None)` when the data cannot be encoded in the requested
/// symbology; such fields print nothing.
pub fn render_barcode<'a>(spec: &BarcodeSpec, text: &'a mut TextRenderer) -> Result<Option<BarcodeField<'a>>, RenderError> {
    let module_width = spec.module_width.max(1) as usize;
    let height = spec.height.max(1) as usize;

    let encoded = match spec.symbology {
        Symbology::Code128 => encode_code128(&spec.data).map(|modules| (modules, spec.data.clone())),
        Symbology::Code39 => encode_code39(&spec.data).map(|modules| (modules, format!("*{}*", spec.data))),
        Symbology::Ean13 => {
            let digits = ean13_digits(&spec.data);
            encode_ean13(&digits).map(|modules| (modules, digits))
        }
        Symbology::QrCode { error_level } => {
            return Ok(render_qrcode(&spec.data, module_width, error_level).map(BarcodeField::bars_only));
        }
        Symbology::Pdf417 => {
            return Ok(render_pdf417(&spec.data, module_width, height).map(BarcodeField::bars_only));
        }
    };

    let Some((modules, human_readable)) = encoded else {
        debug!(symbology = ?spec.symbology, data = %spec.data, "Barcode data not encodable; skipping field");
        return Ok(None);
    };
    let bars = ModuleGrid::linear(&modules, module_width, height);

    if spec.interpretation == InterpretationLine::None {
        return Ok(Some(BarcodeField::bars_only(bars)));
    }
    let line = interpretation_line(&human_readable, module_width, text)?;
    Ok(Some(BarcodeField::with_line(bars, line, spec.interpretation)))
}

/// Encode as Code 128 modules (1 = bar).
fn encode_code128(data: &str) -> Option<Vec<u8>> {
    // Character set B covers all printable ASCII.
    let prefixed = format!("\u{0181}{data}");
    Code128::new(&prefixed).ok().map(|b| b.encode())
}

/// Encode as Code 39 modules (1 = bar).
fn encode_code39(data: &str) -> Option<Vec<u8>> {
    Code39::new(data.to_ascii_uppercase()).ok().map(|b| b.encode())
}

/// Encode twelve EAN-13 digits; the check digit is computed by the encoder.
fn encode_ean13(digits: &str) -> Option<Vec<u8>> {
    EAN13::new(digits).ok().map(|b| b.encode())
}

/// Normalize field data to the twelve digits EAN-13 encodes.
///
/// Short data is zero-padded on the left; anything past twelve digits
/// (typically a supplied check digit) is ignored.
fn ean13_digits(data: &str) -> String {
    let digits: String = data.chars().filter(char::is_ascii_digit).take(12).collect();
    format!("{digits:0>12}")
}

/// Human-readable text in font A, magnified with the module width.
fn interpretation_line<'a>(data: &str, module_width: usize, text: &'a mut TextRenderer) -> Result<TextField<'a>, RenderError> {
    let magnify = module_width.min(10) as u32;
    let font = FontSpec {
        name: 'A',
        orientation: Orientation::Normal,
        height: Some(9 * magnify),
        width: Some(5 * magnify),
    };
    text.layout(&font, data)
}

/// Encode a QR code, each module `magnification` dots square.
fn render_qrcode(data: &str, magnification: usize, error_level: QrErrorLevel) -> Option<ModuleGrid> {
    use qrcode::{EcLevel, QrCode};

    let ec_level = match error_level {
        QrErrorLevel::L => EcLevel::L,
        QrErrorLevel::M => EcLevel::M,
        QrErrorLevel::Q => EcLevel::Q,
        QrErrorLevel::H => EcLevel::H,
    };

    let code = match QrCode::with_error_correction_level(data, ec_level) {
        Ok(code) => code,
        Err(e) => {
            debug!(error = %e, "QR code generation failed; skipping field");
            return None;
        }
    };

    let size = code.width();
    let modules = code
        .to_colors()
        .into_iter()
        .map(|color| color == qrcode::Color::Dark)
        .collect();
    Some(ModuleGrid {
        columns: size,
        rows: size,
        modules,
        module_width: magnification,
        module_height: magnification,
    })
}

/// Encode a PDF417 symbol with `row_height` dots per row.
///
/// Tries progressively larger layouts until the data fits.
fn render_pdf417(data: &str, module_width: usize, row_height: usize) -> Option<ModuleGrid> {
    let symbol = encode_pdf417::<10, 4, 40>(data)
        .or_else(|| encode_pdf417::<20, 6, 120>(data))
        .or_else(|| encode_pdf417::<30, 10, 300>(data));

    let Some((modules, columns, rows)) = symbol else {
        debug!(bytes = data.len(), "PDF417 data too long; skipping field");
        return None;
    };

    Some(ModuleGrid {
        columns,
        rows,
        modules,
        module_width,
        module_height: row_height,
    })
}

/// Encode into a fixed `ROWS` × `COLS` layout (`N` = ROWS × COLS codewords).
///
/// Returns the row-major module bits with the symbol width and row count.
fn encode_pdf417<const ROWS: u8, const COLS: u8, const N: usize>(data: &str) -> Option<(Vec<bool>, usize, usize)> {
    use pdf417::{END_PATTERN, PDF417, PDF417Encoder, START_PATTERN};

    // start + left row indicator + data columns + right row indicator + end
    let width = START_PATTERN.size() as usize + 17 + (COLS as usize * 17) + 17 + END_PATTERN.size() as usize;

    let mut codewords = [0u16; N];
    let (level, filled) = PDF417Encoder::new(&mut codewords, false)
        .append_ascii(data)
        .fit_seal()?;

    let barcode = PDF417::new(filled, ROWS, COLS, level);
    let bits: Vec<bool> = barcode.bits().take(width * ROWS as usize).collect();
    Some((bits, width, ROWS as usize))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(symbology: Symbology, data: &str) -> BarcodeSpec {
        BarcodeSpec {
            symbology,
            orientation: Orientation::Normal,
            module_width: 2,
            height: 50,
            interpretation: InterpretationLine::None,
            data: data.to_string(),
        }
    }

    /// Rendered size and whether the barcode printed at all.
    fn size(spec: &BarcodeSpec) -> Option<(usize, usize)> {
        render_barcode(spec, &mut TextRenderer::new())
            .unwrap()
            .map(|field| (field.width(), field.height()))
    }

    #[test]
    fn test_code128_scales_modules() {
        let modules = encode_code128("Hello").unwrap();
        let mut text = TextRenderer::new();
        let bars = render_barcode(&spec(Symbology::Code128, "Hello"), &mut text).unwrap().unwrap();
        assert_eq!((bars.width(), bars.height()), (modules.len() * 2, 50));
        // First module of the start character is a bar.
        assert!(bars.is_black(0, 0) && bars.is_black(1, 49));
    }

    #[test]
    fn test_code39_accepts_lowercase() {
        assert!(size(&spec(Symbology::Code39, "abc123")).is_some());
    }

    #[test]
    fn test_unencodable_data_prints_nothing() {
        // Code 128 set B has no non-ASCII characters.
        assert!(size(&spec(Symbology::Code128, "héllo")).is_none());
    }

    #[test]
    fn test_ean13_digits() {
        assert_eq!(ean13_digits("123"), "000000000123");
        assert_eq!(ean13_digits("4006381333931"), "400638133393");
        assert!(size(&spec(Symbology::Ean13, "400638133393")).is_some());
    }

    #[test]
    fn test_interpretation_line_below_and_above() {
        let mut below = spec(Symbology::Code128, "12345");
        below.interpretation = InterpretationLine::Below;
        let (bars_w, _) = size(&spec(Symbology::Code128, "12345")).unwrap();

        let mut text = TextRenderer::new();
        let with_text = render_barcode(&below, &mut text).unwrap().unwrap();
        // Font A at magnification 2 is 18 dots tall.
        assert_eq!(with_text.height(), 50 + INTERPRETATION_GAP + 18);
        assert!(with_text.width() >= bars_w);
        assert!(with_text.is_black(0, 0));
        // Nothing is inked in the gap.
        assert!((0..with_text.width()).all(|x| !with_text.is_black(x, 50)));

        let mut above = below.clone();
        above.interpretation = InterpretationLine::Above;
        let mut text = TextRenderer::new();
        let flipped = render_barcode(&above, &mut text).unwrap().unwrap();
        assert_eq!(flipped.height(), with_text.height());
        // Top-left corner now holds text margin, bars start lower.
        assert!(flipped.is_black(0, 18 + INTERPRETATION_GAP));
    }

    #[test]
    fn test_qrcode_is_square_and_magnified() {
        let mut qr = spec(
            Symbology::QrCode {
                error_level: QrErrorLevel::M,
            },
            "https://example.com",
        );
        qr.module_width = 3;
        let mut text = TextRenderer::new();
        let field = render_barcode(&qr, &mut text).unwrap().unwrap();
        assert_eq!(field.width(), field.height());
        assert_eq!(field.width() % 3, 0);
        // Finder pattern corner.
        assert!(field.is_black(0, 0) && field.is_black(2, 2));
    }

    #[test]
    fn test_pdf417_uses_row_height() {
        let (_, height) = size(&spec(Symbology::Pdf417, "PDF417 test")).unwrap();
        assert_eq!(height % 50, 0);
    }

    #[test]
    fn test_tall_barcode_is_not_materialized() {
        let mut tall = spec(Symbology::Pdf417, "PDF417 test");
        tall.height = 32_000;
        let mut text = TextRenderer::new();
        let field = render_barcode(&tall, &mut text).unwrap().unwrap();
        assert_eq!(field.height(), 10 * 32_000);
        // Start pattern opens with a bar on every row.
        assert!(field.is_black(0, 0) && field.is_black(0, 9 * 32_000));
    }
}

//! # Draw Commands
//!
//! This module defines the intermediate representation between the ZPL
//! parser and the rasterizer. A job is parsed into an ordered list of
//! [`DrawCommand`]s; the rasterizer walks them in order, so later commands
//! paint over earlier ones.
//!
//! ## Design Philosophy
//!
//! ```text
//! Job bytes → Parser → Vec<DrawCommand> → Rasterizer → Bitmap
//! ```
//!
//! Field-level ZPL state (selected font, pending barcode, `^FR`, `^FH`) is
//! resolved by the parser, so every content command carries everything the
//! rasterizer needs. The only state the rasterizer keeps is the origin
//! cursor and the label home offset.

use serde::Serialize;

/// Field rotation, as given by the ZPL orientation parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Orientation {
    /// `N` - normal
    #[default]
    Normal,
    /// `R` - rotated 90° clockwise
    Rotated,
    /// `I` - inverted 180°
    Inverted,
    /// `B` - read from bottom up, 270°
    Bottom,
}

impl Orientation {
    /// Parse a ZPL orientation letter (`N`, `R`, `I`, `B`).
    pub fn from_code(code: char) -> Option<Self> {
        match code.to_ascii_uppercase() {
            'N' => Some(Self::Normal),
            'R' => Some(Self::Rotated),
            'I' => Some(Self::Inverted),
            'B' => Some(Self::Bottom),
            _ => None,
        }
    }
}

/// Which corner of a field the origin refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Anchor {
    /// `^FO` - origin is the top-left corner of the field
    #[default]
    TopLeft,
    /// `^FT` - origin is the bottom-left corner (text baseline)
    Baseline,
}

/// Line colour for graphic boxes and circles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum LineColor {
    #[default]
    Black,
    White,
}

impl LineColor {
    pub fn from_code(code: char) -> Option<Self> {
        match code.to_ascii_uppercase() {
            'B' => Some(Self::Black),
            'W' => Some(Self::White),
            _ => None,
        }
    }
}

/// Font selection for a text field.
///
/// `height` and `width` are in dots. `None` means the font's native size
/// (for bitmap fonts) or "same as the other dimension" (for font `0`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FontSpec {
    /// ZPL font name (`0`, `A`-`Z`)
    pub name: char,
    pub orientation: Orientation,
    pub height: Option<u32>,
    pub width: Option<u32>,
}

impl Default for FontSpec {
    fn default() -> Self {
        Self {
            name: 'A',
            orientation: Orientation::Normal,
            height: None,
            width: None,
        }
    }
}

/// QR code error correction level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum QrErrorLevel {
    /// ~7% recovery
    L,
    /// ~15% recovery
    #[default]
    M,
    /// ~25% recovery
    Q,
    /// ~30% recovery
    H,
}

impl QrErrorLevel {
    pub fn from_code(code: char) -> Option<Self> {
        match code.to_ascii_uppercase() {
            'L' => Some(Self::L),
            'M' => Some(Self::M),
            'Q' => Some(Self::Q),
            'H' => Some(Self::H),
            _ => None,
        }
    }
}

/// Barcode symbology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Symbology {
    /// `^BC`
    Code128,
    /// `^B3`
    Code39,
    /// `^BE`
    Ean13,
    /// `^BQ`
    QrCode { error_level: QrErrorLevel },
    /// `^B7`
    Pdf417,
}

/// Where the human-readable text of a linear barcode goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum InterpretationLine {
    None,
    #[default]
    Below,
    Above,
}

/// A fully resolved barcode field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BarcodeSpec {
    pub symbology: Symbology,
    pub orientation: Orientation,
    /// Narrow bar width (QR: magnification) in dots
    pub module_width: u32,
    /// Bar height in dots (PDF417: row height)
    pub height: u32,
    pub interpretation: InterpretationLine,
    pub data: String,
}

/// A single drawing operation produced by the parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum DrawCommand {
    /// Move the origin cursor; consumed by the next content command.
    SetOrigin { x: u32, y: u32, anchor: Anchor },

    /// Offset added to every subsequent origin (`^LH`).
    SetLabelHome { x: u32, y: u32 },

    /// Text field.
    DrawText {
        font: FontSpec,
        text: String,
        reverse: bool,
    },

    /// Barcode field.
    DrawBarcode { barcode: BarcodeSpec, reverse: bool },

    /// Graphic box (`^GB`). A thickness that covers the box fills it.
    DrawBox {
        width: u32,
        height: u32,
        thickness: u32,
        color: LineColor,
        /// Corner rounding 0 (square) to 8 (heaviest)
        rounding: u8,
        reverse: bool,
    },

    /// Graphic circle (`^GC`).
    DrawCircle {
        diameter: u32,
        thickness: u32,
        color: LineColor,
        reverse: bool,
    },

    /// Requested print quantity (`^PQ`). Recorded, never replicated.
    SetQuantity(u32),

    /// Unrecognized or malformed command. Rendering skips it.
    Unknown { mnemonic: String },
}

impl DrawCommand {
    /// Whether this command puts ink on the label.
    pub fn is_content(&self) -> bool {
        matches!(
            self,
            Self::DrawText { .. }
                | Self::DrawBarcode { .. }
                | Self::DrawBox { .. }
                | Self::DrawCircle { .. }
        )
    }
}

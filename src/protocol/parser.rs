//! # ZPL Command Parser
//!
//! Turns a job payload into an ordered list of [`DrawCommand`]s.
//!
//! ## Tokens
//!
//! A command starts at the format prefix `^` or the control prefix `~`,
//! followed by a two-character mnemonic and its comma-separated arguments:
//!
//! ```text
//! ^FO50,100^A0N,30,30^FDHello^FS
//! └──┬───┘ └────┬───┘└──┬──┘└┬┘
//!  origin     font     data  field separator
//! ```
//!
//! `^A` is the exception: its second character is the font name. Field data
//! (`^FD`, `^FV`) and comments (`^FX`) run until the next `^`, so they may
//! contain commas and tildes. Carriage returns and line feeds are ignored
//! everywhere, like a real printer does.
//!
//! ## Tolerance
//!
//! Parsing never fails. Unrecognized commands and commands with arguments
//! that do not parse become [`DrawCommand::Unknown`] and the rest of the job
//! still renders.

use tracing::debug;

use crate::ir::{
    Anchor, BarcodeSpec, DrawCommand, FontSpec, InterpretationLine, LineColor, Orientation,
    QrErrorLevel, Symbology,
};
use crate::printer::MAX_LABEL_DOTS;

/// Largest coordinate or size a command may carry.
const MAX_DOTS: u32 = MAX_LABEL_DOTS as u32;

/// Longest field data (`^FD`) a printer accepts, in bytes.
pub const MAX_FIELD_DATA: usize = 3072;

/// Result of parsing one job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedJob {
    /// Commands in job order
    pub commands: Vec<DrawCommand>,
    /// Effective print quantity (last `^PQ` wins, default 1)
    pub quantity: u32,
    /// Mnemonics that were skipped as unknown or malformed
    pub unknown: Vec<String>,
}

/// Parse a job payload. Never fails.
pub fn parse(payload: &[u8]) -> ParsedJob {
    let text: String = String::from_utf8_lossy(payload)
        .chars()
        .filter(|c| *c != '\r' && *c != '\n')
        .collect();

    let mut parser = Parser::default();
    for token in tokenize(&text) {
        parser.apply(&token);
    }
    parser.finish()
}

// ============================================================================
// TOKENIZER
// ============================================================================

/// A single command: prefix, upper-cased mnemonic and raw arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Token<'a> {
    prefix: char,
    mnemonic: String,
    args: &'a str,
}

impl Token<'_> {
    fn display(&self) -> String {
        format!("{}{}", self.prefix, self.mnemonic)
    }
}

fn is_prefix(c: char) -> bool {
    c == '^' || c == '~'
}

fn tokenize(text: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut rest = text;

    while let Some(start) = rest.find(is_prefix) {
        let prefix = if rest[start..].starts_with('^') { '^' } else { '~' };
        let body = &rest[start + 1..];

        let mnemonic_end = body
            .char_indices()
            .take_while(|(_, c)| !is_prefix(*c))
            .take(2)
            .last()
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);
        let mnemonic = body[..mnemonic_end].to_uppercase();
        let after = &body[mnemonic_end..];

        let free_text = prefix == '^' && matches!(mnemonic.as_str(), "FD" | "FV" | "FX");
        let args_end = if free_text {
            after.find('^')
        } else {
            after.find(is_prefix)
        }
        .unwrap_or(after.len());

        tokens.push(Token {
            prefix,
            mnemonic,
            args: &after[..args_end],
        });
        rest = &after[args_end..];
    }

    tokens
}

// ============================================================================
// ARGUMENTS
// ============================================================================

/// Marker for an argument that is present but unparsable.
#[derive(Debug)]
struct BadArgument;

type ArgResult<T> = Result<Option<T>, BadArgument>;

/// Comma-separated command arguments. Empty arguments mean "use the default".
struct Args<'a>(Vec<&'a str>);

impl<'a> Args<'a> {
    fn new(raw: &'a str) -> Self {
        Self(raw.split(',').map(str::trim).collect())
    }

    fn get(&self, index: usize) -> Option<&'a str> {
        self.0.get(index).copied().filter(|s| !s.is_empty())
    }

    fn number(&self, index: usize) -> ArgResult<u32> {
        match self.get(index) {
            None => Ok(None),
            Some(raw) => match raw.parse::<f64>() {
                Ok(value) if value.is_finite() && value >= 0.0 => {
                    Ok(Some(value.round().min(f64::from(u32::MAX)) as u32))
                }
                _ => Err(BadArgument),
            },
        }
    }

    /// A distance or size in dots, capped at what ZPL can address.
    fn dots(&self, index: usize) -> ArgResult<u32> {
        Ok(self.number(index)?.map(|n| n.min(MAX_DOTS)))
    }

    fn letter(&self, index: usize) -> ArgResult<char> {
        match self.get(index) {
            None => Ok(None),
            Some(raw) => {
                let mut chars = raw.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Ok(Some(c.to_ascii_uppercase())),
                    _ => Err(BadArgument),
                }
            }
        }
    }

    fn flag(&self, index: usize) -> ArgResult<bool> {
        match self.letter(index)? {
            None => Ok(None),
            Some('Y') => Ok(Some(true)),
            Some('N') => Ok(Some(false)),
            Some(_) => Err(BadArgument),
        }
    }

    fn orientation(&self, index: usize) -> ArgResult<Orientation> {
        match self.letter(index)? {
            None => Ok(None),
            Some(c) => Orientation::from_code(c).map(Some).ok_or(BadArgument),
        }
    }

    fn color(&self, index: usize) -> ArgResult<LineColor> {
        match self.letter(index)? {
            None => Ok(None),
            Some(c) => LineColor::from_code(c).map(Some).ok_or(BadArgument),
        }
    }
}

// ============================================================================
// PARSER STATE
// ============================================================================

/// `^BY` defaults shared by every following barcode in the job.
#[derive(Debug, Clone, Copy)]
struct BarcodeDefaults {
    module_width: u32,
    height: u32,
}

impl Default for BarcodeDefaults {
    fn default() -> Self {
        Self {
            module_width: 2,
            height: 10,
        }
    }
}

/// A barcode command waiting for its field data.
#[derive(Debug, Clone)]
struct PendingBarcode {
    symbology: Symbology,
    orientation: Orientation,
    module_width: Option<u32>,
    height: Option<u32>,
    interpretation: InterpretationLine,
}

/// State of the field currently being built (between origin and `^FS`).
#[derive(Debug, Default)]
struct FieldState {
    font: Option<FontSpec>,
    barcode: Option<PendingBarcode>,
    reverse: bool,
    hex_indicator: Option<char>,
    data: Option<String>,
}

#[derive(Debug, Default)]
struct Parser {
    default_font: FontSpec,
    barcode_defaults: BarcodeDefaults,
    field: FieldState,
    commands: Vec<DrawCommand>,
    quantity: Option<u32>,
    unknown: Vec<String>,
}

impl Parser {
    fn apply(&mut self, token: &Token<'_>) {
        if self.try_apply(token).is_err() {
            self.skip(token);
        }
    }

    fn skip(&mut self, token: &Token<'_>) {
        let mnemonic = token.display();
        debug!(command = %mnemonic, "Skipping unknown or malformed command");
        self.commands.push(DrawCommand::Unknown {
            mnemonic: mnemonic.clone(),
        });
        self.unknown.push(mnemonic);
    }

    fn try_apply(&mut self, token: &Token<'_>) -> Result<(), BadArgument> {
        if token.prefix == '~' {
            return Err(BadArgument);
        }

        let args = Args::new(token.args);
        let mnemonic = token.mnemonic.as_str();

        // ^A<font>o,h,w - font for the next field
        if let Some(font_name) = mnemonic.strip_prefix('A') {
            let mut chars = font_name.chars();
            let name = match (chars.next(), chars.next()) {
                (Some(c), None) if c.is_ascii_alphanumeric() => c.to_ascii_uppercase(),
                _ => return Err(BadArgument),
            };
            self.field.font = Some(FontSpec {
                name,
                orientation: args.orientation(0)?.unwrap_or_default(),
                height: args.dots(1)?.filter(|h| *h > 0),
                width: args.dots(2)?.filter(|w| *w > 0),
            });
            return Ok(());
        }

        match mnemonic {
            "FO" | "FT" => {
                let x = args.dots(0)?.unwrap_or(0);
                let y = args.dots(1)?.unwrap_or(0);
                let anchor = if mnemonic == "FO" {
                    Anchor::TopLeft
                } else {
                    Anchor::Baseline
                };
                self.commands.push(DrawCommand::SetOrigin { x, y, anchor });
            }
            "LH" => {
                let x = args.dots(0)?.unwrap_or(0);
                let y = args.dots(1)?.unwrap_or(0);
                self.commands.push(DrawCommand::SetLabelHome { x, y });
            }
            "CF" => {
                let name = match args.letter(0)? {
                    Some(c) if c.is_ascii_alphanumeric() => c,
                    Some(_) => return Err(BadArgument),
                    None => self.default_font.name,
                };
                let height = args.dots(1)?.filter(|h| *h > 0);
                let width = args.dots(2)?.filter(|w| *w > 0);
                self.default_font = FontSpec {
                    name,
                    orientation: self.default_font.orientation,
                    height: height.or(self.default_font.height),
                    width: width.or(if height.is_some() {
                        None
                    } else {
                        self.default_font.width
                    }),
                };
            }
            "BY" => {
                let module_width = args.number(0)?;
                // Wide-to-narrow ratio is validated but the encoders use their own.
                if let Some(ratio) = args.get(1) {
                    ratio.parse::<f64>().map_err(|_| BadArgument)?;
                }
                let height = args.dots(2)?;
                if let Some(w) = module_width {
                    self.barcode_defaults.module_width = w.clamp(1, 10);
                }
                if let Some(h) = height.filter(|h| *h > 0) {
                    self.barcode_defaults.height = h;
                }
            }
            "BC" => {
                self.field.barcode = Some(PendingBarcode {
                    symbology: Symbology::Code128,
                    orientation: args.orientation(0)?.unwrap_or_default(),
                    module_width: None,
                    height: args.dots(1)?,
                    interpretation: interpretation(args.flag(2)?, args.flag(3)?),
                });
            }
            "B3" => {
                args.flag(1)?;
                self.field.barcode = Some(PendingBarcode {
                    symbology: Symbology::Code39,
                    orientation: args.orientation(0)?.unwrap_or_default(),
                    module_width: None,
                    height: args.dots(2)?,
                    interpretation: interpretation(args.flag(3)?, args.flag(4)?),
                });
            }
            "BE" => {
                self.field.barcode = Some(PendingBarcode {
                    symbology: Symbology::Ean13,
                    orientation: args.orientation(0)?.unwrap_or_default(),
                    module_width: None,
                    height: args.dots(1)?,
                    interpretation: interpretation(args.flag(2)?, args.flag(3)?),
                });
            }
            "BQ" => {
                args.number(1)?;
                self.field.barcode = Some(PendingBarcode {
                    // The error level arrives with the field data.
                    symbology: Symbology::QrCode {
                        error_level: QrErrorLevel::default(),
                    },
                    orientation: args.orientation(0)?.unwrap_or_default(),
                    module_width: Some(args.number(2)?.unwrap_or(2).clamp(1, 10)),
                    height: None,
                    interpretation: InterpretationLine::None,
                });
            }
            "B7" => {
                self.field.barcode = Some(PendingBarcode {
                    symbology: Symbology::Pdf417,
                    orientation: args.orientation(0)?.unwrap_or_default(),
                    module_width: None,
                    height: args.dots(1)?,
                    interpretation: InterpretationLine::None,
                });
            }
            "GB" => {
                let thickness = args.dots(2)?.unwrap_or(1).max(1);
                let width = args.dots(0)?.unwrap_or(thickness).max(thickness);
                let height = args.dots(1)?.unwrap_or(thickness).max(thickness);
                let color = args.color(3)?.unwrap_or_default();
                let rounding = args.number(4)?.unwrap_or(0).min(8) as u8;
                self.commands.push(DrawCommand::DrawBox {
                    width,
                    height,
                    thickness,
                    color,
                    rounding,
                    reverse: self.field.reverse,
                });
            }
            "GC" => {
                let diameter = args.dots(0)?.unwrap_or(3).max(3);
                let thickness = args.dots(1)?.unwrap_or(1).max(1);
                let color = args.color(2)?.unwrap_or_default();
                self.commands.push(DrawCommand::DrawCircle {
                    diameter,
                    thickness,
                    color,
                    reverse: self.field.reverse,
                });
            }
            "FR" => self.field.reverse = true,
            "FH" => {
                let indicator = token.args.trim().chars().next().unwrap_or('_');
                self.field.hex_indicator = Some(indicator);
            }
            "FD" | "FV" => {
                let mut data = match self.field.hex_indicator {
                    Some(indicator) => decode_hex_escapes(token.args, indicator),
                    None => token.args.to_string(),
                };
                truncate_field_data(&mut data);
                self.field.data = Some(data);
            }
            "FS" => self.finish_field(),
            "PQ" => {
                let quantity = args.number(0)?.unwrap_or(1).max(1);
                self.quantity = Some(quantity);
                self.commands.push(DrawCommand::SetQuantity(quantity));
            }
            // Comments and stray job markers carry nothing to draw.
            "FX" | "XA" | "XZ" => {}
            _ => return Err(BadArgument),
        }

        Ok(())
    }

    /// Emit the pending field (text or barcode) and reset field state.
    fn finish_field(&mut self) {
        let field = std::mem::take(&mut self.field);
        let Some(data) = field.data else {
            return;
        };

        let command = match field.barcode {
            Some(pending) => DrawCommand::DrawBarcode {
                barcode: self.resolve_barcode(pending, data),
                reverse: field.reverse,
            },
            None => DrawCommand::DrawText {
                font: self.resolve_font(field.font),
                text: data,
                reverse: field.reverse,
            },
        };
        self.commands.push(command);
    }

    fn resolve_font(&self, font: Option<FontSpec>) -> FontSpec {
        match font {
            Some(font) if font.height.is_none() && font.width.is_none() => FontSpec {
                height: self.default_font.height,
                width: self.default_font.width,
                ..font
            },
            Some(font) => font,
            None => self.default_font,
        }
    }

    fn resolve_barcode(&self, pending: PendingBarcode, data: String) -> BarcodeSpec {
        let (symbology, data) = match pending.symbology {
            Symbology::QrCode { .. } => {
                let (error_level, content) = split_qr_data(&data);
                (Symbology::QrCode { error_level }, content.to_string())
            }
            other => (other, data),
        };

        BarcodeSpec {
            symbology,
            orientation: pending.orientation,
            module_width: pending
                .module_width
                .unwrap_or(self.barcode_defaults.module_width),
            height: pending
                .height
                .filter(|h| *h > 0)
                .unwrap_or(self.barcode_defaults.height),
            interpretation: pending.interpretation,
            data,
        }
    }

    fn finish(mut self) -> ParsedJob {
        // Printers flush a field left open at the end of the format.
        self.finish_field();
        ParsedJob {
            commands: self.commands,
            quantity: self.quantity.unwrap_or(1),
            unknown: self.unknown,
        }
    }
}

fn interpretation(print: Option<bool>, above: Option<bool>) -> InterpretationLine {
    match (print.unwrap_or(true), above.unwrap_or(false)) {
        (false, _) => InterpretationLine::None,
        (true, false) => InterpretationLine::Below,
        (true, true) => InterpretationLine::Above,
    }
}

/// Split `^BQ` field data of the form `<level><mode>,<content>`.
///
/// Manual mode (`M`) puts a character-mode letter before the content; it is
/// dropped. Data without the header is encoded as-is at level M.
fn split_qr_data(data: &str) -> (QrErrorLevel, &str) {
    let Some((header, content)) = data.split_once(',') else {
        return (QrErrorLevel::default(), data);
    };
    let mut chars = header.chars();
    let level = match chars.next().and_then(QrErrorLevel::from_code) {
        Some(level) if header.len() <= 2 => level,
        _ => return (QrErrorLevel::default(), data),
    };
    let content = match chars.next().map(|c| c.to_ascii_uppercase()) {
        Some('M') => content
            .strip_prefix(['A', 'N'])
            .unwrap_or(content),
        _ => content,
    };
    (level, content)
}

/// Cut field data to [`MAX_FIELD_DATA`] bytes on a character boundary.
fn truncate_field_data(data: &mut String) {
    if data.len() <= MAX_FIELD_DATA {
        return;
    }
    let end = (0..=MAX_FIELD_DATA)
        .rev()
        .find(|&i| data.is_char_boundary(i))
        .unwrap_or(0);
    debug!(bytes = data.len(), "Field data truncated to {} bytes", end);
    data.truncate(end);
}

/// Replace `<indicator>XX` hex escapes (`^FH`) with the bytes they encode.
fn decode_hex_escapes(data: &str, indicator: char) -> String {
    let mut bytes = Vec::with_capacity(data.len());
    let mut chars = data.chars().peekable();

    while let Some(c) = chars.next() {
        if c == indicator {
            let mut lookahead = chars.clone();
            let hex: String = lookahead.by_ref().take(2).collect();
            if hex.len() == 2 {
                if let Ok(byte) = u8::from_str_radix(&hex, 16) {
                    bytes.push(byte);
                    chars = lookahead;
                    continue;
                }
            }
        }
        let mut buf = [0u8; 4];
        bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
    }

    String::from_utf8_lossy(&bytes).into_owned()
}

// ============================================================================
// TESTS
// ============================================================================

//! # Label Configuration
//!
//! This module defines the print resolution and label geometry used to size
//! the raster canvas, plus the settings surface a front end hands to the
//! printer controller.
//!
//! ## Supported Resolutions
//!
//! | Dots/mm | DPI | Typical printhead |
//! |---------|-----|-------------------|
//! | 6 | 152 | low-end desktop |
//! | 8 | 203 | most desktop and industrial |
//! | 12 | 300 | high-density industrial |
//! | 24 | 600 | fine-print industrial |
//!
//! ## Usage
//!
//! ```
//! use vzpl::printer::{LabelConfiguration, Resolution};
//!
//! let config = LabelConfiguration::new(Resolution::Dpmm8, 4.0, 6.0).unwrap();
//! assert_eq!((config.width_px(), config.height_px()), (32, 48));
//! ```

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// # Print Resolution
///
/// The printhead density in dots per millimeter. Label printers only ship
/// with a handful of densities, so anything else is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum Resolution {
    /// 6 dots/mm (152 DPI)
    Dpmm6,
    /// 8 dots/mm (203 DPI)
    #[default]
    Dpmm8,
    /// 12 dots/mm (300 DPI)
    Dpmm12,
    /// 24 dots/mm (600 DPI)
    Dpmm24,
}

impl Resolution {
    /// Every resolution, lowest first.
    pub const ALL: [Resolution; 4] = [Self::Dpmm6, Self::Dpmm8, Self::Dpmm12, Self::Dpmm24];

    /// Dots per millimeter.
    #[inline]
    pub fn dots_per_mm(self) -> u32 {
        match self {
            Self::Dpmm6 => 6,
            Self::Dpmm8 => 8,
            Self::Dpmm12 => 12,
            Self::Dpmm24 => 24,
        }
    }

    /// Nominal dots per inch as printed on the printer's spec sheet.
    pub fn dpi(self) -> u32 {
        match self {
            Self::Dpmm6 => 152,
            Self::Dpmm8 => 203,
            Self::Dpmm12 => 300,
            Self::Dpmm24 => 600,
        }
    }
}

impl TryFrom<u32> for Resolution {
    type Error = ConfigError;

    fn try_from(dpmm: u32) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|r| r.dots_per_mm() == dpmm)
            .ok_or(ConfigError::UnsupportedResolution(dpmm))
    }
}

impl From<Resolution> for u32 {
    fn from(resolution: Resolution) -> Self {
        resolution.dots_per_mm()
    }
}

/// # Label Configuration
///
/// Immutable description of the label being printed. The canvas size in
/// pixels is the physical size multiplied by the resolution:
///
/// ```text
/// width_px  = round(label_width  × dots_per_mm)
/// height_px = round(label_height × dots_per_mm)
/// ```
///
/// Each side is limited to [`MAX_LABEL_DOTS`] and the whole canvas to
/// [`MAX_CANVAS_DOTS`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LabelConfiguration {
    resolution: Resolution,
    label_width: f64,
    label_height: f64,
}

impl LabelConfiguration {
    /// Create a configuration, rejecting non-positive, non-finite or
    /// oversized labels.
    pub fn new(
        resolution: Resolution,
        label_width: f64,
        label_height: f64,
    ) -> Result<Self, ConfigError> {
        check_dimension("width", label_width, resolution)?;
        check_dimension("height", label_height, resolution)?;
        let config = Self {
            resolution,
            label_width,
            label_height,
        };

        let (width_px, height_px) = (config.width_px(), config.height_px());
        if width_px * height_px > MAX_CANVAS_DOTS {
            return Err(ConfigError::CanvasTooLarge { width_px, height_px });
        }
        Ok(config)
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn label_width(&self) -> f64 {
        self.label_width
    }

    pub fn label_height(&self) -> f64 {
        self.label_height
    }

    /// Canvas width in pixels (at least 1).
    pub fn width_px(&self) -> usize {
        to_pixels(self.label_width, self.resolution)
    }

    /// Canvas height in pixels (at least 1).
    pub fn height_px(&self) -> usize {
        to_pixels(self.label_height, self.resolution)
    }
}

/// Longest label side ZPL can address, in dots.
pub const MAX_LABEL_DOTS: usize = 32_000;

/// Largest canvas the rasterizer allocates, in dots (one byte each).
pub const MAX_CANVAS_DOTS: usize = 64 * 1024 * 1024;

fn check_dimension(name: &'static str, value: f64, resolution: Resolution) -> Result<(), ConfigError> {
    let dots = value * f64::from(resolution.dots_per_mm());
    if value.is_finite() && value > 0.0 && dots.round() <= MAX_LABEL_DOTS as f64 {
        Ok(())
    } else {
        Err(ConfigError::InvalidDimension { name, value })
    }
}

fn to_pixels(size: f64, resolution: Resolution) -> usize {
    ((size * f64::from(resolution.dots_per_mm())).round() as usize).max(1)
}

// ============================================================================
// PRINTER SETTINGS
// ============================================================================

/// Default raw printing port used by network label printers.
pub const DEFAULT_PORT: u16 = 9100;

/// Everything needed to start a virtual printer.
///
/// This is the configuration surface a front end fills in; call
/// [`PrinterSettings::validate`] to turn it into a [`LabelConfiguration`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrinterSettings {
    /// Address to bind (defaults to all interfaces)
    pub bind_address: IpAddr,
    /// TCP port; must be greater than zero
    pub port: u16,
    /// Resolution in dots per millimeter
    pub dots_per_millimeter: u32,
    /// Label width in millimeters
    pub label_width: f64,
    /// Label height in millimeters
    pub label_height: f64,
    /// Directory where rendered labels are stored
    pub image_path: PathBuf,
    /// Start listening as soon as the controller is initialized
    pub auto_start: bool,
}

impl Default for PrinterSettings {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            dots_per_millimeter: Resolution::default().dots_per_mm(),
            label_width: 100.0,
            label_height: 150.0,
            image_path: PathBuf::from("labels"),
            auto_start: false,
        }
    }
}

impl PrinterSettings {
    /// Validate the settings and build the label configuration.
    pub fn validate(&self) -> Result<LabelConfiguration, ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        let resolution = Resolution::try_from(self.dots_per_millimeter)?;
        LabelConfiguration::new(resolution, self.label_width, self.label_height)
    }

    /// Socket address the acceptor binds to.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }
}

// ============================================================================
// TESTS
// ============================================================================

//! # Printer Module
//!
//! This module provides the label configuration and printer settings.
//!
//! ## Modules
//!
//! - [`config`]: Resolution, label geometry and settings

pub mod config;

pub use config::{DEFAULT_PORT, LabelConfiguration, MAX_CANVAS_DOTS, MAX_LABEL_DOTS, PrinterSettings, Resolution};

/// Sample label sent by `vzpl test-label`. `{id}` is replaced with an
/// eight-digit number before sending.
pub const SAMPLE_LABEL: &str = include_str!("sample.zpl");

//! # Error Types
//!
//! This module defines the error types surfaced by the printer core.
//!
//! Only starting/stopping the printer and the image store produce errors a
//! caller sees. Framing and parsing problems are absorbed where they happen,
//! and a render failure only aborts the job that caused it (see
//! [`crate::render::RenderError`]).

use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while binding or running the TCP listener.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// The listening socket could not be bound (port in use, permission denied)
    #[error("Failed to bind to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// An incoming connection could not be accepted
    #[error("Failed to accept connection: {0}")]
    Accept(#[source] std::io::Error),

    /// The bound socket did not report its local address
    #[error("Failed to read local address: {0}")]
    LocalAddr(#[source] std::io::Error),
}

/// Errors raised by the image store.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The image directory could not be created
    #[error("Failed to create image directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A label image could not be written
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The image directory or a stored image could not be read
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A stored image could not be deleted
    #[error("Failed to remove {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A PNG could not be encoded or its header read
    #[error("Image encoding error: {0}")]
    Encode(String),

    /// A file for this id already exists
    #[error("Label id {0} is already stored")]
    Collision(u64),
}

/// Invalid printer settings.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    /// Port 0 is not a usable printer port
    #[error("Port must be greater than zero")]
    InvalidPort,

    /// Only 6, 8, 12 and 24 dots per millimeter are supported
    #[error("Unsupported resolution: {0} dots/mm (expected 6, 8, 12 or 24)")]
    UnsupportedResolution(u32),

    /// Label width or height is zero, negative, not finite or longer than
    /// 32000 dots
    #[error("Invalid label {name}: {value}")]
    InvalidDimension { name: &'static str, value: f64 },

    /// The label is too large to rasterize
    #[error("Label canvas of {width_px} x {height_px} dots is too large")]
    CanvasTooLarge { width_px: usize, height_px: usize },
}

/// Errors returned by [`crate::server::PrinterController`].
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Start was called while the printer was not stopped
    #[error("Printer is already running")]
    AlreadyRunning,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Top-level error type used by the command-line front end.
#[derive(Debug, Error)]
pub enum VzplError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Controller(#[from] ControllerError),

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Render(#[from] crate::render::RenderError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error wrapper
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

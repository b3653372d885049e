//! # vzpl - Virtual ZPL Label Printer
//!
//! vzpl pretends to be a network label printer. Point any program that prints
//! ZPL at its TCP port and every label it sends is rasterized and saved as a
//! PNG. It provides:
//!
//! - **Job framing**: splits the raw byte stream into `^XA` … `^XZ` jobs
//! - **Command parsing**: ZPL text to typed draw commands
//! - **Rasterization**: text, barcodes and graphics on a 1-bit canvas
//! - **Storage**: one numbered PNG per label
//! - **Lifecycle**: start/stop with state and label events
//!
//! ## Quick Start
//!
//! ```
//! use vzpl::{
//!     printer::{LabelConfiguration, Resolution},
//!     protocol::{framer::split_jobs, parser::parse},
//!     render::render_label,
//! };
//!
//! // 4 x 6 mm at 8 dots/mm
//! let config = LabelConfiguration::new(Resolution::Dpmm8, 4.0, 6.0)?;
//!
//! for (id, job) in split_jobs(b"^XA^FO0,0^AAN^FD00000123^FS^XZ").iter().enumerate() {
//!     let parsed = parse(job.payload());
//!     let label = render_label(&parsed.commands, &config, id as u64 + 1)?;
//!     assert_eq!((label.width_px(), label.height_px()), (32, 48));
//! }
//!
//! # Ok::<(), vzpl::error::VzplError>(())
//! ```
//!
//! ## Module Overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`protocol`] | Job framing and ZPL parsing |
//! | [`ir`] | Draw commands shared by parser and rasterizer |
//! | [`render`] | Rasterizer, fonts and barcodes |
//! | [`store`] | PNG label storage and id allocation |
//! | [`server`] | TCP acceptor, sessions and lifecycle controller |
//! | [`printer`] | Label geometry and printer settings |
//! | [`error`] | Error types |

pub mod error;
pub mod ir;
pub mod printer;
pub mod protocol;
pub mod render;
pub mod server;
pub mod store;

// Re-exports for convenience
pub use error::VzplError;
pub use printer::{LabelConfiguration, PrinterSettings, Resolution};
pub use server::{PrinterController, PrinterEvent, RunningState};

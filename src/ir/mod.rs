//! # Intermediate Representation (IR)
//!
//! The IR is the typed form of a print job: the parser produces it from ZPL
//! text, the rasterizer consumes it.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌──────────────────┐     ┌──────────┐
//! │  Job bytes  │ ──► │   Parser    │ ──► │ Vec<DrawCommand> │ ──► │ Bitmap   │
//! │ (^XA...^XZ) │     │             │     │       (IR)       │     │          │
//! └─────────────┘     └─────────────┘     └──────────────────┘     └──────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use vzpl::ir::{Anchor, DrawCommand};
//! use vzpl::protocol::parser::parse;
//!
//! let job = parse(b"^FO10,20^FDHello^FS");
//! assert_eq!(
//!     job.commands[0],
//!     DrawCommand::SetOrigin { x: 10, y: 20, anchor: Anchor::TopLeft }
//! );
//! ```

mod ops;

pub use ops::*;

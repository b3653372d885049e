//! # ZPL Protocol
//!
//! Wire-level handling of the printer command language.
//!
//! - [`framer`]: splits a connection byte stream into `^XA` … `^XZ` jobs
//! - [`parser`]: turns one job's payload into [`DrawCommand`](crate::ir::DrawCommand)s
//!
//! ```
//! use vzpl::protocol::{framer::split_jobs, parser::parse};
//!
//! let jobs = split_jobs(b"^XA^FO10,10^ADN^FDHi^FS^XZ");
//! let parsed = parse(jobs[0].payload());
//! assert_eq!(parsed.commands.len(), 2);
//! ```

pub mod framer;
pub mod parser;

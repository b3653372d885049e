//! # Printer Server
//!
//! The network side of the virtual printer.
//!
//! ```text
//!                     ┌─────────────────────┐
//!  TCP :9100 ───────► │ Acceptor            │  one task
//!                     └──────────┬──────────┘
//!                                │ spawn per connection
//!                     ┌──────────▼──────────┐
//!                     │ Session             │  read → frame → parse
//!                     │   Pipeline          │  → render (blocking pool)
//!                     └──────────┬──────────┘  → store → LabelCreated
//!                                │
//!                     ┌──────────▼──────────┐
//!                     │ ImageStore          │  labels/00000001.png ...
//!                     └─────────────────────┘
//! ```
//!
//! [`PrinterController`] owns the acceptor and publishes [`PrinterEvent`]s.
//!
//! ## Usage
//!
//! ```no_run
//! use vzpl::printer::PrinterSettings;
//! use vzpl::server::PrinterController;
//!
//! # async fn example() -> Result<(), vzpl::error::ControllerError> {
//! let controller = PrinterController::default();
//! let mut events = controller.subscribe();
//!
//! let addr = controller.start(&PrinterSettings::default()).await?;
//! println!("listening on {addr}");
//!
//! while let Ok(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod acceptor;
pub mod controller;
pub mod events;
pub mod session;

pub use acceptor::{Acceptor, AcceptorHandle};
pub use controller::{DEFAULT_SHUTDOWN_GRACE, PrinterController};
pub use events::{PrinterEvent, RunningState};
pub use session::{JobOutcome, Pipeline};

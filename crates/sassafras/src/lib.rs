//! sassafras: an in-process host for an external Sass compiler.
//!
//! The compiler runs as a subprocess speaking a length-prefixed binary
//! protocol over its stdin/stdout. This crate supervises that process
//! and exposes a synchronous compile API:
//!
//! - [`Supervisor`] owns the child, drives the request/response exchange,
//!   and restarts the child when the exchange goes wrong;
//! - [`value::Value`] is the Sass value model flowing through host
//!   function callbacks;
//! - [`Importer`] and [`HostFunction`] let the stylesheet reach back into
//!   the host for imports and functions while a compilation is in flight.
//!
//! # Example
//!
//! ```no_run
//! use sassafras::{CompileOptions, Supervisor};
//! use sassafras::Syntax;
//!
//! let mut supervisor = Supervisor::new_from_name("sass-compiler", 60, vec![], vec![])?;
//! let output = supervisor.compile_text(
//!     "a { b: c }",
//!     Syntax::Scss,
//!     None,
//!     CompileOptions::default(),
//! )?;
//! assert!(output.css.starts_with("a {"));
//! # Ok::<(), sassafras::Error>(())
//! ```
//!
//! One compilation at a time per supervisor; host callbacks run on the
//! calling thread and may block freely. Multiple supervisors may run on
//! different threads.

#[cfg(unix)]
mod channel;
mod codec;
mod diagnostics;
mod error;
mod importer;
pub mod registry;
#[cfg(unix)]
mod supervisor;
pub mod value;

pub use diagnostics::{Diagnostic, Location, MessageKind, Span};
pub use error::{
    BoxError, CompilerError, Error, LifecycleError, ProtocolError, Result, ValueError,
};
pub use importer::{HostFunction, ImportResolver, Importer, ImporterPayload};
#[cfg(unix)]
pub use supervisor::{CompileOptions, CompileOutput, Supervisor, SupervisorState};
pub use value::Value;

// The option enums travel on the wire unchanged; re-export them so
// callers never need the protocol crate directly.
pub use sassafras_protocol::{ListSeparator, OutputStyle, Syntax};

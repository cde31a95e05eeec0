//! Error types for the compiler host.
//!
//! Four failure families with very different blast radii:
//!
//! - [`CompilerError`]: the compiler itself rejected the stylesheet. The
//!   supervisor stays healthy.
//! - [`ProtocolError`]: the exchange with the child went off the rails.
//!   The supervisor restarts the child before propagating.
//! - [`LifecycleError`]: the child could not be (re)started, or the
//!   supervisor was used in a state that forbids it.
//! - [`ValueError`]: a typed downcast on a [`Value`](crate::value::Value)
//!   failed inside a host callback. Reported back to the compiler as the
//!   text of an error response; never escapes `compile`.

use camino::Utf8PathBuf;

use crate::diagnostics::{Diagnostic, Span};

/// Boxed error type carried by host callbacks (importers, functions).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type for supervisor operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by the public compile API.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The compiler reported a failed compilation.
    #[error(transparent)]
    Compiler(#[from] CompilerError),

    /// The exchange with the compiler violated the protocol.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The compiler process could not be started or the supervisor was
    /// misused.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

/// A failed compilation as reported by the compiler.
///
/// Carries the diagnostics that accumulated before the failure; the
/// `Display` form renders them first, each on its own line, then the
/// error itself.
#[derive(Debug)]
pub struct CompilerError {
    pub message: String,
    pub span: Option<Span>,
    pub stack_trace: Option<String>,
    /// Compiler-rendered error text, source snippet and caret underline
    /// included. Preferred over composing our own when present.
    pub formatted: Option<String>,
    pub diagnostics: Vec<Diagnostic>,
}

impl std::fmt::Display for CompilerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for diagnostic in &self.diagnostics {
            writeln!(f, "{diagnostic}")?;
        }
        if let Some(formatted) = &self.formatted {
            return f.write_str(formatted);
        }
        if let Some(span) = &self.span {
            if let Some(url) = &span.url {
                write!(
                    f,
                    "{url}:{}:{}: ",
                    span.start.line + 1,
                    span.start.column + 1
                )?;
            }
        }
        write!(f, "Error: {}", self.message)?;
        if let Some(trace) = &self.stack_trace {
            for line in trace.lines() {
                write!(f, "\n    {line}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for CompilerError {}

/// A violation of the exchange with the compiler process.
///
/// Every variant corrupts the channel: the supervisor kills and respawns
/// the child before this error reaches the caller.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("I/O error on the compiler channel: {0}")]
    Io(#[from] std::io::Error),

    #[error("timed out waiting for the compiler")]
    Timeout,

    #[error("failed to encode message for the compiler: {0}")]
    Encode(String),

    #[error("malformed message from the compiler: {0}")]
    Decode(String),

    #[error("compilation id mismatch: expected {expected}, got {got}")]
    CompilationIdMismatch { expected: u32, got: u32 },

    #[error("importer id {0} is out of range for this compilation")]
    UnknownImporter(u32),

    #[error("importer id {0} is a load path; the compiler resolves those itself")]
    NotAnImporter(u32),

    #[error("no dynamic function with id {0} has ever been registered")]
    UnknownFunction(u32),

    #[error("malformed import url {0:?}")]
    MalformedUrl(String),

    #[error("required field {0} is missing")]
    MissingField(&'static str),

    #[error("the compiler reported a protocol error: {0}")]
    Remote(String),
}

/// The compiler process could not be started, or the supervisor was used
/// in a state that rejects the operation.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("failed to start compiler at {path}: {source}")]
    Spawn {
        path: Utf8PathBuf,
        source: std::io::Error,
    },

    #[error("compiler executable {0:?} not found on PATH")]
    NotFound(String),

    #[error("the supervisor is broken; construct a new one")]
    Broken,

    #[error("a compilation is already in progress on this supervisor")]
    CompileInProgress,
}

/// A typed downcast on a value failed, or a value-model invariant was
/// violated by wire data.
#[derive(Debug, thiserror::Error)]
pub enum ValueError {
    #[error("expected a {expected}, got a {actual}")]
    WrongType {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("map keys must be unique")]
    DuplicateKey,
}

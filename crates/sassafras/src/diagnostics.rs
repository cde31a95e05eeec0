//! Diagnostics produced during a compilation.
//!
//! The compiler emits non-fatal messages (warnings, deprecation warnings,
//! `@debug` output) while a compilation is in flight. The supervisor
//! collects them in arrival order and hands them back alongside the
//! result, or inside the [`CompilerError`](crate::error::CompilerError)
//! when the compilation fails.
//!
//! Locations are stored zero-based and rendered one-based.

use std::fmt;

/// How severe a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Warning,
    Deprecation,
    Debug,
}

impl MessageKind {
    pub fn tag(&self) -> &'static str {
        match self {
            MessageKind::Warning => "Warning",
            MessageKind::Deprecation => "Deprecation Warning",
            MessageKind::Debug => "Debug",
        }
    }
}

/// A position within a source file. All fields zero-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub offset: u32,
    pub line: u32,
    pub column: u32,
}

/// A region of a source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    /// The text the span covers, when the compiler sent it.
    pub text: Option<String>,
    /// Url of the source the span points into.
    pub url: Option<String>,
    pub start: Location,
    pub end: Option<Location>,
    /// Surrounding text, e.g. the whole line the span starts on.
    pub context: Option<String>,
}

/// One non-fatal message emitted by the compiler.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub kind: MessageKind,
    pub message: String,
    pub span: Option<Span>,
    pub stack_trace: Option<String>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
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
        write!(f, "{}: {}", self.kind.tag(), self.message)?;
        if let Some(trace) = &self.stack_trace {
            for line in trace.lines() {
                write!(f, "\n    {line}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span_at(line: u32, column: u32) -> Span {
        Span {
            text: None,
            url: Some("file:///srv/site/_vars.scss".to_string()),
            start: Location {
                offset: 0,
                line,
                column,
            },
            end: None,
            context: None,
        }
    }

    #[test]
    fn renders_one_based_location_prefix() {
        let diagnostic = Diagnostic {
            kind: MessageKind::Warning,
            message: "12 repetitions".to_string(),
            span: Some(span_at(0, 0)),
            stack_trace: None,
        };
        assert_eq!(
            diagnostic.to_string(),
            "file:///srv/site/_vars.scss:1:1: Warning: 12 repetitions"
        );
    }

    #[test]
    fn renders_indented_stack_trace() {
        let diagnostic = Diagnostic {
            kind: MessageKind::Deprecation,
            message: "!global assignments won't work".to_string(),
            span: None,
            stack_trace: Some("_vars.scss 1:1\nroot stylesheet".to_string()),
        };
        assert_eq!(
            diagnostic.to_string(),
            "Deprecation Warning: !global assignments won't work\n\
             \x20   _vars.scss 1:1\n\
             \x20   root stylesheet"
        );
    }

    #[test]
    fn debug_message_without_span_has_no_prefix() {
        let diagnostic = Diagnostic {
            kind: MessageKind::Debug,
            message: "here".to_string(),
            span: None,
            stack_trace: None,
        };
        assert_eq!(diagnostic.to_string(), "Debug: here");
    }
}

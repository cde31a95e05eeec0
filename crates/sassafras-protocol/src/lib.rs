//! Wire schema for the embedded Sass compiler protocol.
//!
//! This crate defines the messages exchanged between a host and the
//! external Sass compiler over the compiler's stdin/stdout, plus the
//! framing helpers.
//!
//! # Wire Protocol
//!
//! Messages are length-prefixed frames:
//! ```text
//! [length: u32 little-endian][payload: postcard-encoded message]
//! ```
//!
//! Frames are never interleaved: the host writes one whole frame at a
//! time and reads one whole frame at a time. Request/response correlation
//! uses the `id` carried by each request; a response always echoes the id
//! of the request it answers.
//!
//! Message direction follows the compiler's point of view: the host
//! writes [`InboundMessage`]s (inbound *to the compiler*) and reads
//! [`OutboundMessage`]s.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

// ============================================================================
// Framing
// ============================================================================

/// Encode a message into a length-prefixed frame.
pub fn encode_frame<T: Serialize>(message: &T) -> Result<Vec<u8>, EncodeError> {
    let payload = postcard::to_allocvec(message).map_err(|_| EncodeError::Serialize)?;
    let len = payload.len() as u32;
    let mut buf = Vec::with_capacity(4 + payload.len());
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(&payload);
    Ok(buf)
}

/// Decode a message from a frame payload (length prefix already stripped).
pub fn decode_frame<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, DecodeError> {
    postcard::from_bytes(bytes).map_err(|_| DecodeError::Deserialize)
}

/// Read the length prefix from a buffer, returns (length, bytes_consumed).
pub fn read_length_prefix(buf: &[u8]) -> Option<(u32, usize)> {
    if buf.len() < 4 {
        return None;
    }
    let len = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
    Some((len, 4))
}

#[derive(Debug)]
pub enum EncodeError {
    Serialize,
}

#[derive(Debug)]
pub enum DecodeError {
    Deserialize,
}

impl std::fmt::Display for EncodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EncodeError::Serialize => write!(f, "failed to serialize message"),
        }
    }
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::Deserialize => write!(f, "failed to deserialize message"),
        }
    }
}

impl std::error::Error for EncodeError {}
impl std::error::Error for DecodeError {}

// ============================================================================
// Message wrappers
// ============================================================================

/// Messages the host sends to the compiler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InboundMessage {
    CompileRequest(CompileRequest),
    CanonicalizeResponse(CanonicalizeResponse),
    ImportResponse(ImportResponse),
    FunctionCallResponse(FunctionCallResponse),
}

/// Messages the compiler sends to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OutboundMessage {
    CompileResponse(CompileResponse),
    LogEvent(LogEvent),
    CanonicalizeRequest(CanonicalizeRequest),
    ImportRequest(ImportRequest),
    FunctionCallRequest(FunctionCallRequest),

    /// The compiler detected a violation of the protocol on our side (or
    /// an internal error). Fatal for the current compilation.
    Error(ProtocolErrorEvent),
}

// ============================================================================
// Compilation
// ============================================================================

/// Kicks off one compilation. The `id` identifies the compilation in every
/// subsequent message until the matching [`CompileResponse`] arrives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompileRequest {
    pub id: u32,
    pub input: CompileInput,
    pub style: OutputStyle,
    pub source_map: bool,

    /// Importer slots, in resolution order. Slot `n` is addressed by the
    /// compiler as importer id `4000 + n`.
    pub importers: Vec<ImporterDescriptor>,

    /// Signatures of host functions callable from the stylesheet.
    pub global_functions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CompileInput {
    /// Inline stylesheet text.
    String {
        source: String,
        syntax: Syntax,
        /// Canonical url of the source, for error reporting and relative
        /// imports.
        url: Option<String>,
    },
    /// Absolute path of a stylesheet on disk; the compiler reads it.
    Path(String),
}

/// One importer slot of a compilation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ImporterDescriptor {
    /// A filesystem load path the compiler resolves by itself.
    Path(String),
    /// A host-side importer; the compiler calls back with this id.
    ImporterId(u32),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompileResponse {
    pub id: u32,
    /// Absent result is a protocol violation by the compiler.
    pub result: Option<CompileResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CompileResult {
    Success {
        css: String,
        source_map: Option<String>,
    },
    Failure {
        message: String,
        span: Option<SourceSpan>,
        stack_trace: Option<String>,
        /// Compiler-rendered error text, with the source snippet and
        /// caret underline already laid out.
        formatted: Option<String>,
    },
}

// ============================================================================
// Log events
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    pub compilation_id: u32,
    pub kind: LogEventKind,
    pub message: String,
    pub span: Option<SourceSpan>,
    pub stack_trace: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogEventKind {
    Warning,
    Deprecation,
    Debug,
}

// ============================================================================
// Importer callbacks
// ============================================================================

/// The compiler asks a host importer to turn a user-written url into a
/// canonical one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalizeRequest {
    pub id: u32,
    pub compilation_id: u32,
    pub importer_id: u32,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalizeResponse {
    pub id: u32,
    pub result: CanonicalizeResult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CanonicalizeResult {
    /// The importer recognized the url; here is its canonical form.
    Url(String),
    /// The importer does not handle this url; the compiler should try the
    /// next slot.
    NotHandled,
    /// The importer failed; aborts the compilation with this message.
    Error(String),
}

/// The compiler asks a host importer for the contents of a canonical url
/// it previously returned from canonicalize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportRequest {
    pub id: u32,
    pub compilation_id: u32,
    pub importer_id: u32,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportResponse {
    pub id: u32,
    pub result: ImportResult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ImportResult {
    Success {
        contents: String,
        syntax: Syntax,
        source_map_url: Option<String>,
    },
    Error(String),
}

// ============================================================================
// Function callbacks
// ============================================================================

/// The compiler invokes a host function mid-compilation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCallRequest {
    pub id: u32,
    pub compilation_id: u32,
    /// Absent identifier is a protocol violation by the compiler.
    pub identifier: Option<FunctionIdentifier>,
    pub arguments: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FunctionIdentifier {
    /// A dynamic function previously sent to the compiler as a value.
    Id(u32),
    /// A function declared up front in [`CompileRequest::global_functions`],
    /// addressed by its bare name.
    Name(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCallResponse {
    pub id: u32,
    pub result: FunctionCallResult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FunctionCallResult {
    Success(Value),
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolErrorEvent {
    pub message: String,
}

// ============================================================================
// Values
// ============================================================================

/// Wire form of a Sass value.
///
/// Maps travel as entry lists; a color travels as whichever representation
/// the host currently carries, never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    String {
        text: String,
        quoted: bool,
    },
    Number {
        value: f64,
        numerators: Vec<String>,
        denominators: Vec<String>,
    },
    RgbColor {
        red: u8,
        green: u8,
        blue: u8,
        alpha: f64,
    },
    HslColor {
        hue: f64,
        saturation: f64,
        lightness: f64,
        alpha: f64,
    },
    Bool(bool),
    Null,
    List {
        separator: ListSeparator,
        bracketed: bool,
        contents: Vec<Value>,
    },
    Map(Vec<MapEntry>),
    CompilerFunction {
        id: u32,
    },
    HostFunction {
        id: u32,
        signature: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapEntry {
    pub key: Value,
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ListSeparator {
    Comma,
    Space,
    Slash,
    /// A list that has not committed to a separator yet (empty or
    /// single-element).
    Undecided,
}

// ============================================================================
// Spans
// ============================================================================

/// A location within a source file. All fields are zero-based; display
/// code is expected to render them one-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub offset: u32,
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSpan {
    pub text: Option<String>,
    pub url: Option<String>,
    pub start: SourceLocation,
    pub end: Option<SourceLocation>,
    pub context: Option<String>,
}

// ============================================================================
// Options
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Syntax {
    #[default]
    Scss,
    Indented,
    Css,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum OutputStyle {
    #[default]
    Expanded,
    Nested,
    Compact,
    Compressed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_roundtrip() {
        let message = OutboundMessage::LogEvent(LogEvent {
            compilation_id: 1001,
            kind: LogEventKind::Warning,
            message: "hello world".to_string(),
            span: None,
            stack_trace: None,
        });

        let encoded = encode_frame(&message).unwrap();

        // Check length prefix
        let (len, consumed) = read_length_prefix(&encoded).unwrap();
        assert_eq!(consumed, 4);
        assert_eq!(len as usize, encoded.len() - 4);

        let decoded: OutboundMessage = decode_frame(&encoded[4..4 + len as usize]).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn test_value_roundtrip() {
        let value = Value::List {
            separator: ListSeparator::Comma,
            bracketed: true,
            contents: vec![
                Value::Number {
                    value: 12.0,
                    numerators: vec!["px".to_string()],
                    denominators: vec![],
                },
                Value::Map(vec![MapEntry {
                    key: Value::String {
                        text: "key".to_string(),
                        quoted: true,
                    },
                    value: Value::RgbColor {
                        red: 0x1e,
                        green: 0x90,
                        blue: 0xff,
                        alpha: 1.0,
                    },
                }]),
            ],
        };

        let bytes = postcard::to_allocvec(&value).unwrap();
        let back: Value = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_truncated_payload_rejected() {
        let message = InboundMessage::CompileRequest(CompileRequest {
            id: 1001,
            input: CompileInput::String {
                source: "a { b: c }".to_string(),
                syntax: Syntax::Scss,
                url: None,
            },
            style: OutputStyle::Expanded,
            source_map: false,
            importers: vec![ImporterDescriptor::ImporterId(4000)],
            global_functions: vec!["invert($color)".to_string()],
        });

        let encoded = encode_frame(&message).unwrap();
        let (len, _) = read_length_prefix(&encoded).unwrap();
        let truncated = &encoded[4..4 + (len as usize) / 2];
        assert!(decode_frame::<InboundMessage>(truncated).is_err());
    }

    #[test]
    fn test_length_prefix_requires_four_bytes() {
        assert!(read_length_prefix(&[1, 2, 3]).is_none());
        let (len, consumed) = read_length_prefix(&[7, 0, 0, 0, 9]).unwrap();
        assert_eq!((len, consumed), (7, 4));
    }
}

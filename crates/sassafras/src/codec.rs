//! Conversions between the native value model and the wire schema.
//!
//! Pure and stateless. Encoding walks the value with the visitor; a color
//! is sent in whichever representation it currently carries, the derived
//! one never travels. Decoding validates as it goes: duplicate map keys
//! and unknown function ids are protocol errors, not panics.

use sassafras_protocol as proto;

use crate::diagnostics::{Diagnostic, Location, MessageKind, Span};
use crate::error::{CompilerError, ProtocolError};
use crate::registry;
use crate::value::{
    CompilerFunction, DynamicFunction, SassColor, SassList, SassMap, SassNumber, SassString,
    Value, ValueVisitor,
};

// ============================================================================
// Values
// ============================================================================

pub(crate) fn encode_value(value: &Value) -> proto::Value {
    value.accept(&mut WireEncoder)
}

struct WireEncoder;

impl ValueVisitor for WireEncoder {
    type Output = proto::Value;

    fn visit_string(&mut self, string: &SassString) -> proto::Value {
        proto::Value::String {
            text: string.text().to_owned(),
            quoted: string.is_quoted(),
        }
    }

    fn visit_number(&mut self, number: &SassNumber) -> proto::Value {
        proto::Value::Number {
            value: number.value(),
            numerators: number.numerators().to_vec(),
            denominators: number.denominators().to_vec(),
        }
    }

    fn visit_color(&mut self, color: &SassColor) -> proto::Value {
        if color.is_hsl() {
            let (hue, saturation, lightness, alpha) = color.hsla();
            proto::Value::HslColor {
                hue,
                saturation,
                lightness,
                alpha,
            }
        } else {
            let (red, green, blue, alpha) = color.rgba();
            proto::Value::RgbColor {
                red,
                green,
                blue,
                alpha,
            }
        }
    }

    fn visit_bool(&mut self, value: bool) -> proto::Value {
        proto::Value::Bool(value)
    }

    fn visit_null(&mut self) -> proto::Value {
        proto::Value::Null
    }

    fn visit_list(&mut self, list: &SassList) -> proto::Value {
        proto::Value::List {
            separator: list.separator(),
            bracketed: list.is_bracketed(),
            contents: list.iter().map(|item| item.accept(self)).collect(),
        }
    }

    fn visit_map(&mut self, map: &SassMap) -> proto::Value {
        proto::Value::Map(
            map.iter()
                .map(|(key, value)| proto::MapEntry {
                    key: key.accept(self),
                    value: value.accept(self),
                })
                .collect(),
        )
    }

    fn visit_compiler_function(&mut self, function: &CompilerFunction) -> proto::Value {
        proto::Value::CompilerFunction { id: function.id() }
    }

    fn visit_dynamic_function(&mut self, function: &DynamicFunction) -> proto::Value {
        proto::Value::HostFunction {
            id: function.id(),
            signature: function.signature().to_owned(),
        }
    }
}

pub(crate) fn decode_value(wire: &proto::Value) -> Result<Value, ProtocolError> {
    Ok(match wire {
        proto::Value::String { text, quoted } => {
            Value::String(SassString::new(text.clone(), *quoted))
        }
        proto::Value::Number {
            value,
            numerators,
            denominators,
        } => Value::Number(SassNumber::new(
            *value,
            numerators.clone(),
            denominators.clone(),
        )),
        proto::Value::RgbColor {
            red,
            green,
            blue,
            alpha,
        } => Value::Color(SassColor::from_rgba(*red, *green, *blue, *alpha)),
        proto::Value::HslColor {
            hue,
            saturation,
            lightness,
            alpha,
        } => Value::Color(SassColor::from_hsla(*hue, *saturation, *lightness, *alpha)),
        proto::Value::Bool(value) => Value::Bool(*value),
        proto::Value::Null => Value::Null,
        proto::Value::List {
            separator,
            bracketed,
            contents,
        } => {
            let items = contents
                .iter()
                .map(decode_value)
                .collect::<Result<Vec<_>, _>>()?;
            Value::List(SassList::new(items, *separator, *bracketed))
        }
        proto::Value::Map(entries) => {
            let pairs = entries
                .iter()
                .map(|entry| Ok((decode_value(&entry.key)?, decode_value(&entry.value)?)))
                .collect::<Result<Vec<_>, ProtocolError>>()?;
            let map = SassMap::try_new(pairs)
                .map_err(|_| ProtocolError::Decode("map with duplicate keys".to_string()))?;
            Value::Map(map)
        }
        proto::Value::CompilerFunction { id } => {
            Value::CompilerFunction(CompilerFunction::new(*id))
        }
        proto::Value::HostFunction { id, .. } => {
            let function = registry::lookup(*id).ok_or(ProtocolError::UnknownFunction(*id))?;
            Value::DynamicFunction(function)
        }
    })
}

// ============================================================================
// Spans and diagnostics
// ============================================================================

pub(crate) fn decode_location(wire: proto::SourceLocation) -> Location {
    Location {
        offset: wire.offset,
        line: wire.line,
        column: wire.column,
    }
}

pub(crate) fn decode_span(wire: proto::SourceSpan) -> Span {
    Span {
        text: wire.text,
        url: wire.url,
        start: decode_location(wire.start),
        end: wire.end.map(decode_location),
        context: wire.context,
    }
}

pub(crate) fn decode_log_kind(wire: proto::LogEventKind) -> MessageKind {
    match wire {
        proto::LogEventKind::Warning => MessageKind::Warning,
        proto::LogEventKind::Deprecation => MessageKind::Deprecation,
        proto::LogEventKind::Debug => MessageKind::Debug,
    }
}

pub(crate) fn decode_log_event(wire: proto::LogEvent) -> Diagnostic {
    Diagnostic {
        kind: decode_log_kind(wire.kind),
        message: wire.message,
        span: wire.span.map(decode_span),
        stack_trace: wire.stack_trace,
    }
}

/// Build the terminal error for a failed compilation from the wire
/// failure fields plus the diagnostics accumulated so far.
pub(crate) fn failure_into_error(
    message: String,
    span: Option<proto::SourceSpan>,
    stack_trace: Option<String>,
    formatted: Option<String>,
    diagnostics: Vec<Diagnostic>,
) -> CompilerError {
    CompilerError {
        message,
        span: span.map(decode_span),
        stack_trace,
        formatted,
        diagnostics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sassafras_protocol::ListSeparator;

    fn round_trip(value: &Value) -> Value {
        decode_value(&encode_value(value)).expect("round trip decodes")
    }

    #[test]
    fn values_round_trip() {
        let values = [
            Value::String(SassString::quoted("hello")),
            Value::String(SassString::unquoted("bold")),
            Value::Number(SassNumber::new(
                1.5,
                vec!["px".to_string()],
                vec!["s".to_string()],
            )),
            Value::Color(SassColor::from_rgba(12, 34, 56, 0.5)),
            Value::Color(SassColor::from_hsla(210.0, 50.0, 40.0, 1.0)),
            Value::TRUE,
            Value::FALSE,
            Value::NULL,
            Value::List(SassList::new(
                vec![Value::from(1.0), Value::from(2.0)],
                ListSeparator::Slash,
                true,
            )),
            Value::Map(SassMap::new(vec![
                (
                    Value::String(SassString::quoted("a")),
                    Value::from(1.0),
                ),
                (
                    Value::String(SassString::quoted("b")),
                    Value::List(SassList::empty()),
                ),
            ])),
            Value::CompilerFunction(CompilerFunction::new(99)),
        ];
        for value in &values {
            assert_eq!(&round_trip(value), value);
        }
    }

    #[test]
    fn color_encodes_stored_representation_only() {
        let hsl = Value::Color(SassColor::from_hsla(120.0, 50.0, 50.0, 1.0));
        assert!(matches!(
            encode_value(&hsl),
            proto::Value::HslColor { hue, .. } if hue == 120.0
        ));

        let rgb = Value::Color(SassColor::from_rgba(3, 4, 5, 1.0));
        assert!(matches!(
            encode_value(&rgb),
            proto::Value::RgbColor { red: 3, .. }
        ));
    }

    #[test]
    fn dynamic_function_round_trips_through_the_registry() {
        let function = DynamicFunction::new("plus-one($n)", |args| {
            let n = args[0].as_number()?;
            Ok(Value::from(n.value() + 1.0))
        });
        let value = Value::DynamicFunction(function.clone());

        let wire = encode_value(&value);
        assert!(matches!(
            &wire,
            proto::Value::HostFunction { id, signature }
                if *id == function.id() && signature == "plus-one($n)"
        ));

        let back = decode_value(&wire).expect("known id decodes");
        assert_eq!(back, value);
    }

    #[test]
    fn unknown_host_function_id_is_a_protocol_error() {
        let wire = proto::Value::HostFunction {
            id: u32::MAX,
            signature: "ghost()".to_string(),
        };
        assert!(matches!(
            decode_value(&wire),
            Err(ProtocolError::UnknownFunction(id)) if id == u32::MAX
        ));
    }

    #[test]
    fn duplicate_wire_map_keys_are_a_protocol_error() {
        let wire = proto::Value::Map(vec![
            proto::MapEntry {
                key: proto::Value::Null,
                value: proto::Value::Bool(true),
            },
            proto::MapEntry {
                key: proto::Value::Null,
                value: proto::Value::Bool(false),
            },
        ]);
        assert!(matches!(decode_value(&wire), Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn log_event_maps_kind_and_span() {
        let event = proto::LogEvent {
            compilation_id: 1001,
            kind: proto::LogEventKind::Deprecation,
            message: "old syntax".to_string(),
            span: Some(proto::SourceSpan {
                text: None,
                url: Some("file:///x.scss".to_string()),
                start: proto::SourceLocation {
                    offset: 5,
                    line: 1,
                    column: 2,
                },
                end: None,
                context: None,
            }),
            stack_trace: Some("root stylesheet".to_string()),
        };
        let diagnostic = decode_log_event(event);
        assert_eq!(diagnostic.kind, MessageKind::Deprecation);
        let span = diagnostic.span.expect("span carried over");
        assert_eq!(span.start.line, 1);
        assert_eq!(span.url.as_deref(), Some("file:///x.scss"));
    }
}

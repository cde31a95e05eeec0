//! Visitor traversal over values.
//!
//! The wire encoder is the main consumer: it folds a [`Value`] into its
//! wire form without the value model knowing anything about the protocol.

use super::{
    CompilerFunction, DynamicFunction, SassColor, SassList, SassMap, SassNumber, SassString, Value,
};

/// One callback per value variant.
pub trait ValueVisitor {
    type Output;

    fn visit_string(&mut self, string: &SassString) -> Self::Output;
    fn visit_number(&mut self, number: &SassNumber) -> Self::Output;
    fn visit_color(&mut self, color: &SassColor) -> Self::Output;
    fn visit_bool(&mut self, value: bool) -> Self::Output;
    fn visit_null(&mut self) -> Self::Output;
    fn visit_list(&mut self, list: &SassList) -> Self::Output;
    fn visit_map(&mut self, map: &SassMap) -> Self::Output;
    fn visit_compiler_function(&mut self, function: &CompilerFunction) -> Self::Output;
    fn visit_dynamic_function(&mut self, function: &DynamicFunction) -> Self::Output;
}

impl Value {
    pub fn accept<V: ValueVisitor>(&self, visitor: &mut V) -> V::Output {
        match self {
            Value::String(string) => visitor.visit_string(string),
            Value::Number(number) => visitor.visit_number(number),
            Value::Color(color) => visitor.visit_color(color),
            Value::Bool(value) => visitor.visit_bool(*value),
            Value::Null => visitor.visit_null(),
            Value::List(list) => visitor.visit_list(list),
            Value::Map(map) => visitor.visit_map(map),
            Value::CompilerFunction(function) => visitor.visit_compiler_function(function),
            Value::DynamicFunction(function) => visitor.visit_dynamic_function(function),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sassafras_protocol::ListSeparator;

    struct TypeNames;

    impl ValueVisitor for TypeNames {
        type Output = &'static str;

        fn visit_string(&mut self, _: &SassString) -> &'static str {
            "string"
        }
        fn visit_number(&mut self, _: &SassNumber) -> &'static str {
            "number"
        }
        fn visit_color(&mut self, _: &SassColor) -> &'static str {
            "color"
        }
        fn visit_bool(&mut self, _: bool) -> &'static str {
            "bool"
        }
        fn visit_null(&mut self) -> &'static str {
            "null"
        }
        fn visit_list(&mut self, _: &SassList) -> &'static str {
            "list"
        }
        fn visit_map(&mut self, _: &SassMap) -> &'static str {
            "map"
        }
        fn visit_compiler_function(&mut self, _: &CompilerFunction) -> &'static str {
            "compiler function"
        }
        fn visit_dynamic_function(&mut self, _: &DynamicFunction) -> &'static str {
            "dynamic function"
        }
    }

    #[test]
    fn accept_dispatches_on_variant() {
        let mut visitor = TypeNames;
        let values = [
            Value::String(SassString::quoted("x")),
            Value::Number(SassNumber::unitless(1.0)),
            Value::Color(SassColor::from_rgba(0, 0, 0, 1.0)),
            Value::TRUE,
            Value::NULL,
            Value::List(SassList::new(vec![], ListSeparator::Comma, false)),
            Value::Map(SassMap::empty()),
            Value::CompilerFunction(CompilerFunction::new(7)),
        ];
        for value in &values {
            assert_eq!(value.accept(&mut visitor), value.type_name());
        }
    }
}

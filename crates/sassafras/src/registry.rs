//! Process-wide registry of dynamic functions.
//!
//! Ids are allocated strictly increasing from 2001 and stay valid for the
//! lifetime of the process: entries are never removed, so an id the
//! compiler saw once can never dangle, no matter how stale. One mutex
//! guards both the counter and the map.

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

use crate::value::DynamicFunction;

const FIRST_FUNCTION_ID: u32 = 2001;

struct FunctionRegistry {
    next_id: u32,
    entries: HashMap<u32, DynamicFunction>,
}

static REGISTRY: OnceLock<Mutex<FunctionRegistry>> = OnceLock::new();

fn registry() -> &'static Mutex<FunctionRegistry> {
    REGISTRY.get_or_init(|| {
        Mutex::new(FunctionRegistry {
            next_id: FIRST_FUNCTION_ID,
            entries: HashMap::new(),
        })
    })
}

/// Allocate a fresh function id.
pub(crate) fn next_id() -> u32 {
    let mut registry = registry().lock().expect("function registry poisoned");
    let id = registry.next_id;
    registry.next_id += 1;
    id
}

/// Store a function under its id.
pub(crate) fn register(function: DynamicFunction) {
    let mut registry = registry().lock().expect("function registry poisoned");
    registry.entries.insert(function.id(), function);
}

/// Look up a previously registered function.
pub fn lookup(id: u32) -> Option<DynamicFunction> {
    let registry = registry().lock().expect("function registry poisoned");
    registry.entries.get(&id).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn ids_are_monotonic_and_lookup_survives() {
        let first = DynamicFunction::new("one($a)", |_| Ok(Value::NULL));
        let second = DynamicFunction::new("two($a)", |_| Ok(Value::TRUE));
        assert!(first.id() >= FIRST_FUNCTION_ID);
        assert!(second.id() > first.id());

        let found = lookup(first.id()).expect("registered function");
        assert_eq!(found.signature(), "one($a)");
        assert_eq!(found, first);

        assert!(lookup(u32::MAX).is_none());
    }

    #[test]
    fn registered_entries_are_callable() {
        let function = DynamicFunction::new("answer()", |_| Ok(Value::from(42.0)));
        let result = lookup(function.id())
            .expect("registered function")
            .invoke(&[])
            .expect("callback succeeds");
        assert_eq!(result, Value::from(42.0));
    }
}

//! Function values: compiler-defined and host-defined.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::error::BoxError;
use crate::registry;
use crate::value::Value;

/// Signature of a host-side Sass function body.
pub type HostCallback = dyn Fn(&[Value]) -> Result<Value, BoxError> + Send + Sync;

/// A first-class function defined inside the stylesheet. The host cannot
/// call it; it only passes the reference back to the compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CompilerFunction {
    id: u32,
}

impl CompilerFunction {
    pub fn new(id: u32) -> Self {
        Self { id }
    }

    pub fn id(&self) -> u32 {
        self.id
    }
}

/// A host-defined Sass function created at runtime, e.g. returned from
/// another host function.
///
/// Creating one allocates a process-global id and registers the function
/// in the [`registry`](crate::registry); the compiler may call it by that
/// id for as long as the process lives.
#[derive(Clone)]
pub struct DynamicFunction {
    id: u32,
    signature: String,
    callback: Arc<HostCallback>,
}

impl DynamicFunction {
    pub fn new<F>(signature: impl Into<String>, callback: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, BoxError> + Send + Sync + 'static,
    {
        let function = Self {
            id: registry::next_id(),
            signature: signature.into(),
            callback: Arc::new(callback),
        };
        registry::register(function.clone());
        function
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// The full Sass signature, e.g. `darken($color, $amount)`.
    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn invoke(&self, arguments: &[Value]) -> Result<Value, BoxError> {
        (self.callback)(arguments)
    }

    pub(crate) fn callback(&self) -> Arc<HostCallback> {
        Arc::clone(&self.callback)
    }
}

impl std::fmt::Debug for DynamicFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicFunction")
            .field("id", &self.id)
            .field("signature", &self.signature)
            .finish_non_exhaustive()
    }
}

impl PartialEq for DynamicFunction {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for DynamicFunction {}

impl Hash for DynamicFunction {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

//! Host-provided importers and functions.
//!
//! An importer resolves `@use`/`@import` urls the compiler cannot resolve
//! by itself. It answers two questions, always in this order:
//!
//! 1. `canonicalize`: does this url belong to you, and if so, what is its
//!    canonical absolute form?
//! 2. `load`: what are the contents of that canonical url?
//!
//! Load paths are the degenerate case: the compiler walks them itself and
//! never calls back for them.

use std::sync::Arc;

use camino::Utf8PathBuf;
use url::Url;

use sassafras_protocol::Syntax;

use crate::error::BoxError;
use crate::value::{HostCallback, Value};

/// What an importer hands back from a successful load.
pub struct ImporterPayload {
    pub contents: String,
    pub syntax: Syntax,
    pub source_map_url: Option<Url>,
}

/// A host-side stylesheet importer.
pub trait Importer: Send + Sync {
    /// Turn a user-written url into its canonical absolute form.
    /// `Ok(None)` means "not mine, try the next importer".
    fn canonicalize(&self, url: &str) -> Result<Option<Url>, BoxError>;

    /// Fetch the contents of a url previously returned by
    /// [`canonicalize`](Importer::canonicalize).
    fn load(&self, url: &Url) -> Result<ImporterPayload, BoxError>;
}

/// One slot in a compilation's ordered importer list.
#[derive(Clone)]
pub enum ImportResolver {
    /// A directory the compiler searches by itself.
    LoadPath(Utf8PathBuf),
    /// A custom importer the compiler calls back into.
    Importer(Arc<dyn Importer>),
}

impl std::fmt::Debug for ImportResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImportResolver::LoadPath(path) => f.debug_tuple("LoadPath").field(path).finish(),
            ImportResolver::Importer(_) => f.write_str("Importer(..)"),
        }
    }
}

/// A host function exposed to the stylesheet by name, declared up front
/// with a full Sass signature.
#[derive(Clone)]
pub struct HostFunction {
    signature: String,
    callback: Arc<HostCallback>,
}

impl HostFunction {
    pub fn new<F>(signature: impl Into<String>, callback: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, BoxError> + Send + Sync + 'static,
    {
        Self {
            signature: signature.into(),
            callback: Arc::new(callback),
        }
    }

    /// The full signature, e.g. `invert($color, $weight: 100%)`.
    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// The dispatch name: everything before the argument list.
    pub fn name(&self) -> &str {
        match self.signature.split_once('(') {
            Some((name, _)) => name.trim(),
            None => self.signature.trim(),
        }
    }

    pub(crate) fn callback(&self) -> Arc<HostCallback> {
        Arc::clone(&self.callback)
    }
}

impl std::fmt::Debug for HostFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostFunction")
            .field("signature", &self.signature)
            .finish_non_exhaustive()
    }
}

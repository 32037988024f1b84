//! Exception reconstruction
//!
//! Replay rebuilds a thrown instance from the recorded
//! `(exceptionTypeName, exceptionMessage)` pair. Error types registered here
//! supply real constructors; everything else falls back to a synthetic
//! exception whose message accessor reports the recorded message, which
//! covers exception types without a usable public constructor.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use parking_lot::RwLock;
use thiserror::Error;
use tracing::trace;

use recap_core::Thrown;

/// Boxed error instance produced by reconstruction
pub type BoxedError = Box<dyn std::error::Error + Send + Sync>;

type MessageCtor = Arc<dyn Fn(String) -> BoxedError + Send + Sync>;
type NoArgCtor = Arc<dyn Fn() -> BoxedError + Send + Sync>;

/// Constructors registered for one exception type
#[derive(Clone, Default)]
pub struct ExceptionSpec {
    with_message: Option<MessageCtor>,
    no_arg: Option<NoArgCtor>,
}

impl ExceptionSpec {
    /// Start an empty spec
    pub fn new() -> Self {
        ExceptionSpec::default()
    }

    /// Register a single-message constructor
    pub fn with_message(mut self, ctor: impl Fn(String) -> BoxedError + Send + Sync + 'static) -> Self {
        self.with_message = Some(Arc::new(ctor));
        self
    }

    /// Register a no-argument constructor
    pub fn no_arg(mut self, ctor: impl Fn() -> BoxedError + Send + Sync + 'static) -> Self {
        self.no_arg = Some(Arc::new(ctor));
        self
    }
}

/// Registry of reconstructable exception types
pub struct ExceptionRegistry {
    entries: RwLock<HashMap<String, ExceptionSpec>>,
}

impl ExceptionRegistry {
    fn new() -> Self {
        ExceptionRegistry {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// The process-global registry instance
    pub fn global() -> &'static ExceptionRegistry {
        static GLOBAL: LazyLock<ExceptionRegistry> = LazyLock::new(ExceptionRegistry::new);
        &GLOBAL
    }

    /// Register constructors for an exception type; re-registering a name
    /// replaces the entry
    pub fn register(&self, type_name: impl Into<String>, spec: ExceptionSpec) {
        self.entries.write().insert(type_name.into(), spec);
    }

    /// Reconstruct a thrown instance from its recorded pair.
    ///
    /// A recorded message prefers the single-message constructor; a recorded
    /// pair without a message prefers the no-argument constructor. When the
    /// needed constructor is not registered, the synthetic fallback stands in
    /// and reports the recorded message from its accessor.
    pub fn materialize(&self, thrown: &Thrown) -> BoxedError {
        let spec = self.entries.read().get(&thrown.type_name).cloned();
        match (&thrown.message, spec) {
            (Some(message), Some(spec)) if spec.with_message.is_some() => {
                trace!(
                    type_name = thrown.type_name.as_str(),
                    "Building exception with message constructor"
                );
                spec.with_message
                    .map(|ctor| ctor(message.clone()))
                    .unwrap_or_else(|| synthetic(thrown))
            }
            (None, Some(spec)) if spec.no_arg.is_some() => {
                trace!(
                    type_name = thrown.type_name.as_str(),
                    "Building exception with no-argument constructor"
                );
                spec.no_arg.map(|ctor| ctor()).unwrap_or_else(|| synthetic(thrown))
            }
            _ => {
                trace!(
                    type_name = thrown.type_name.as_str(),
                    "No usable constructor; exception will be synthesized"
                );
                synthetic(thrown)
            }
        }
    }
}

fn synthetic(thrown: &Thrown) -> BoxedError {
    Box::new(SyntheticException {
        type_name: thrown.type_name.clone(),
        message: thrown.message.clone(),
    })
}

/// Stand-in exception for types lacking a usable registered constructor
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{type_name}: {}", .message.as_deref().unwrap_or("<no message>"))]
pub struct SyntheticException {
    /// The recorded exception type name
    pub type_name: String,
    /// The recorded exception message
    pub message: Option<String>,
}

impl SyntheticException {
    /// The recorded message, as the original exception's accessor reported it
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

/// Reconstruct a thrown instance through the global registry
pub fn materialize(thrown: &Thrown) -> BoxedError {
    ExceptionRegistry::global().materialize(thrown)
}

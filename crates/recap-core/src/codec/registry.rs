//! Global type registry
//!
//! `Named` descriptors resolve against this registry: registering a type
//! stores a normalizer that round-trips a payload through the concrete Rust
//! type, which both validates the payload shape and canonicalizes it for
//! value comparison. The registry doubles as the process-global
//! type-resolution cache; resolution of an unregistered name is the fatal
//! `TypeResolution` error.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use parking_lot::RwLock;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::descriptor::TypeDesc;
use crate::error::{RecapError, RecapResult};

/// A value shape the codec can carry portably
///
/// Implementations supply the canonical descriptor constructed at encode
/// time. Composite types use [`TypeDesc::named`] and must be registered
/// before any snapshot containing them is decoded.
pub trait Portable: Serialize + DeserializeOwned + 'static {
    /// Canonical descriptor for this type
    fn type_desc() -> TypeDesc;
}

type Normalizer = Arc<dyn Fn(&Value) -> Result<Value, serde_json::Error> + Send + Sync>;

/// One resolved entry: canonical name plus its payload normalizer
#[derive(Clone)]
pub(crate) struct ResolvedType {
    pub(crate) name: String,
    normalize: Normalizer,
}

impl ResolvedType {
    /// Round-trip a payload through the registered concrete type
    pub(crate) fn normalize(&self, payload: &Value) -> RecapResult<Value> {
        (self.normalize)(payload).map_err(|source| {
            RecapError::codec_from(
                format!("Payload does not match registered type `{}`", self.name),
                source,
            )
        })
    }
}

/// Registry of named composite types
pub struct TypeRegistry {
    entries: RwLock<HashMap<String, ResolvedType>>,
}

impl TypeRegistry {
    fn new() -> Self {
        TypeRegistry {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// The process-global registry instance
    pub fn global() -> &'static TypeRegistry {
        static GLOBAL: LazyLock<TypeRegistry> = LazyLock::new(TypeRegistry::new);
        &GLOBAL
    }

    /// Register a portable composite type under its canonical name.
    /// Re-registering a name replaces the previous entry.
    pub fn register<T: Portable>(&self) -> RecapResult<()> {
        let desc = T::type_desc();
        let Some(name) = desc.name() else {
            return Err(RecapError::config(format!(
                "Only named composite types can be registered, got `{desc}`"
            )));
        };
        let entry = ResolvedType {
            name: name.to_string(),
            normalize: Arc::new(|payload: &Value| {
                let concrete: T = serde_json::from_value(payload.clone())?;
                serde_json::to_value(&concrete)
            }),
        };
        tracing::debug!(type_name = %name, "Registered portable type");
        self.entries.write().insert(name.to_string(), entry);
        Ok(())
    }

    /// Whether a canonical name is registered
    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    /// Resolve a canonical name to its registered entry
    pub(crate) fn resolve(&self, name: &str) -> RecapResult<ResolvedType> {
        self.entries
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| RecapError::type_resolution(name))
    }
}

/// Register a portable composite type in the global registry
pub fn register_portable<T: Portable>() -> RecapResult<()> {
    TypeRegistry::global().register::<T>()
}

impl Portable for bool {
    fn type_desc() -> TypeDesc {
        TypeDesc::Bool
    }
}

impl Portable for i32 {
    fn type_desc() -> TypeDesc {
        TypeDesc::Int
    }
}

impl Portable for i64 {
    fn type_desc() -> TypeDesc {
        TypeDesc::Int
    }
}

impl Portable for u32 {
    fn type_desc() -> TypeDesc {
        TypeDesc::UInt
    }
}

impl Portable for u64 {
    fn type_desc() -> TypeDesc {
        TypeDesc::UInt
    }
}

impl Portable for f64 {
    fn type_desc() -> TypeDesc {
        TypeDesc::Float
    }
}

impl Portable for String {
    fn type_desc() -> TypeDesc {
        TypeDesc::String
    }
}

impl Portable for chrono::DateTime<chrono::Utc> {
    fn type_desc() -> TypeDesc {
        TypeDesc::Timestamp
    }
}

impl<T: Portable> Portable for Option<T> {
    fn type_desc() -> TypeDesc {
        TypeDesc::option(T::type_desc())
    }
}

impl<T: Portable> Portable for Vec<T> {
    fn type_desc() -> TypeDesc {
        TypeDesc::seq(T::type_desc())
    }
}

impl<T: Portable> Portable for std::collections::HashMap<String, T> {
    fn type_desc() -> TypeDesc {
        TypeDesc::map(TypeDesc::String, T::type_desc())
    }
}

impl<T: Portable> Portable for std::collections::BTreeMap<String, T> {
    fn type_desc() -> TypeDesc {
        TypeDesc::map(TypeDesc::String, T::type_desc())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Sample {
        data: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        count: Option<i64>,
    }

    impl Portable for Sample {
        fn type_desc() -> TypeDesc {
            TypeDesc::named("registry.Sample")
        }
    }

    #[test]
    fn registered_types_resolve_and_normalize() {
        register_portable::<Sample>().unwrap();
        let resolved = TypeRegistry::global().resolve("registry.Sample").unwrap();
        let payload = serde_json::json!({"data": "hi", "count": null});
        let normalized = resolved.normalize(&payload).unwrap();
        assert_eq!(normalized, serde_json::json!({"data": "hi"}));
    }

    #[test]
    fn unknown_names_fail_resolution() {
        let err = TypeRegistry::global()
            .resolve("registry.Nope")
            .map(|_| ())
            .unwrap_err();
        assert!(matches!(err, RecapError::TypeResolution { .. }));
    }

    #[test]
    fn mismatched_payloads_are_rejected() {
        register_portable::<Sample>().unwrap();
        let resolved = TypeRegistry::global().resolve("registry.Sample").unwrap();
        let err = resolved
            .normalize(&serde_json::json!({"data": 42}))
            .unwrap_err();
        assert!(matches!(err, RecapError::Codec { .. }));
    }

    #[test]
    fn only_named_types_can_register() {
        let err = TypeRegistry::global().register::<String>().unwrap_err();
        assert!(matches!(err, RecapError::Config { .. }));
    }
}

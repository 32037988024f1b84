//! Encoding and decoding of portable values
//!
//! `encode` pairs a payload with the canonical descriptor constructed from
//! the value's type; `decode` walks the descriptor, validates the payload
//! against it, and resolves `Named` descriptors through the global registry.
//! A null payload short-circuits before the structural decoder runs.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::descriptor::TypeDesc;
use super::registry::{Portable, TypeRegistry};
use crate::error::{RecapError, RecapResult};

/// A decoded portable value: normalized payload plus its descriptor
///
/// Equality is structural over both fields; this is the value equality used
/// by stand-in argument matching and replay assertions.
#[derive(Debug, Clone, PartialEq)]
pub struct DynValue {
    descriptor: TypeDesc,
    payload: Value,
}

impl DynValue {
    /// The explicit null value of the given type
    pub fn null(descriptor: TypeDesc) -> Self {
        DynValue {
            descriptor,
            payload: Value::Null,
        }
    }

    /// The unit value
    pub fn unit() -> Self {
        DynValue::null(TypeDesc::Unit)
    }

    /// Descriptor of this value
    pub fn descriptor(&self) -> &TypeDesc {
        &self.descriptor
    }

    /// Normalized payload of this value
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Whether this is a null payload
    pub fn is_null(&self) -> bool {
        self.payload.is_null()
    }

    /// Consume into the raw payload
    pub fn into_payload(self) -> Value {
        self.payload
    }
}

/// Portable value codec over the global type registry
#[derive(Debug, Clone, Copy, Default)]
pub struct Codec;

impl Codec {
    /// Create a codec
    pub fn new() -> Self {
        Codec
    }

    /// Encode a value into payload plus canonical descriptor
    pub fn encode<T: Portable>(&self, value: &T) -> RecapResult<DynValue> {
        let payload = serde_json::to_value(value)
            .map_err(|source| RecapError::codec_from("Value failed to serialize", source))?;
        Ok(DynValue {
            descriptor: T::type_desc(),
            payload,
        })
    }

    /// Decode a payload against a descriptor into a normalized value.
    ///
    /// Null payloads short-circuit without invoking the structural decoder.
    /// `Named` descriptors that are not registered fail with the fatal
    /// `TypeResolution` error.
    pub fn decode(&self, payload: &Value, descriptor: &TypeDesc) -> RecapResult<DynValue> {
        if payload.is_null() {
            return Ok(DynValue::null(descriptor.clone()));
        }
        let normalized = self.decode_value(payload, descriptor)?;
        Ok(DynValue {
            descriptor: descriptor.clone(),
            payload: normalized,
        })
    }

    /// Decode a payload against a descriptor, then convert to a concrete
    /// type. Returns `None` for a null payload.
    pub fn decode_to<T: DeserializeOwned>(
        &self,
        payload: &Value,
        descriptor: &TypeDesc,
    ) -> RecapResult<Option<T>> {
        let decoded = self.decode(payload, descriptor)?;
        if decoded.is_null() {
            return Ok(None);
        }
        serde_json::from_value(decoded.payload)
            .map(Some)
            .map_err(|source| {
                RecapError::codec_from(
                    format!("Decoded `{descriptor}` payload failed concrete conversion"),
                    source,
                )
            })
    }

    fn decode_value(&self, payload: &Value, descriptor: &TypeDesc) -> RecapResult<Value> {
        match descriptor {
            TypeDesc::Unit => Err(self.mismatch(payload, descriptor)),
            TypeDesc::Bool => match payload {
                Value::Bool(_) => Ok(payload.clone()),
                _ => Err(self.mismatch(payload, descriptor)),
            },
            TypeDesc::Int => match payload.as_i64() {
                Some(_) => Ok(payload.clone()),
                None => Err(self.mismatch(payload, descriptor)),
            },
            TypeDesc::UInt => match payload.as_u64() {
                Some(_) => Ok(payload.clone()),
                None => Err(self.mismatch(payload, descriptor)),
            },
            TypeDesc::Float => match payload.as_f64() {
                Some(_) => Ok(payload.clone()),
                None => Err(self.mismatch(payload, descriptor)),
            },
            TypeDesc::String => match payload {
                Value::String(_) => Ok(payload.clone()),
                _ => Err(self.mismatch(payload, descriptor)),
            },
            TypeDesc::Timestamp => {
                let text = payload
                    .as_str()
                    .ok_or_else(|| self.mismatch(payload, descriptor))?;
                let instant: DateTime<Utc> = text
                    .parse()
                    .map_err(|_| self.mismatch(payload, descriptor))?;
                Ok(Value::String(instant.to_rfc3339()))
            }
            TypeDesc::Option(inner) => self.decode_value(payload, inner),
            TypeDesc::Seq(element) => {
                let items = payload
                    .as_array()
                    .ok_or_else(|| self.mismatch(payload, descriptor))?;
                let mut decoded = Vec::with_capacity(items.len());
                for (index, item) in items.iter().enumerate() {
                    let value = self.decode_value(item, element).map_err(|err| {
                        RecapError::codec(format!(
                            "Sequence element {index} does not match `{element}`: {err}"
                        ))
                    })?;
                    decoded.push(value);
                }
                Ok(Value::Array(decoded))
            }
            TypeDesc::Map(key, value) => {
                if **key != TypeDesc::String {
                    return Err(RecapError::codec(format!(
                        "Map key type must be `string`, got `{key}`"
                    )));
                }
                let entries = payload
                    .as_object()
                    .ok_or_else(|| self.mismatch(payload, descriptor))?;
                let mut decoded = serde_json::Map::with_capacity(entries.len());
                for (entry_key, entry_value) in entries {
                    let normalized = self.decode_value(entry_value, value).map_err(|err| {
                        RecapError::codec(format!(
                            "Map entry `{entry_key}` does not match `{value}`: {err}"
                        ))
                    })?;
                    decoded.insert(entry_key.clone(), normalized);
                }
                Ok(Value::Object(decoded))
            }
            TypeDesc::Named(name) => {
                let resolved = TypeRegistry::global().resolve(name)?;
                resolved.normalize(payload)
            }
        }
    }

    fn mismatch(&self, payload: &Value, descriptor: &TypeDesc) -> RecapError {
        RecapError::codec(format!(
            "Payload `{payload}` does not match descriptor `{descriptor}`"
        ))
    }
}

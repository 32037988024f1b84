//! Snapshot data model
//!
//! The persisted shape of one recorded interaction: the subject's own call
//! (`main`), the dependency wiring map, the ordered dependent calls, and the
//! factory calls that produced further collaborators. A call either returns
//! or throws, never both; `exception_type_name` presence selects the flow, so
//! a legitimately-null return and a thrown call are not confused.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::codec::TypeDesc;
use crate::error::{RecapError, RecapResult};

/// Snapshot of a single observed method invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invocation {
    /// Canonical name of the type the call was observed on
    pub subject_type_name: String,
    /// Invoked method name
    pub method_name: String,
    /// Declared (static) parameter types, by position
    pub declared_parameter_types: Vec<TypeDesc>,
    /// Per-argument runtime refinements, present only where the declared
    /// type was too generic to reconstruct the value unambiguously
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_argument_types: Option<Vec<Option<TypeDesc>>>,
    /// Encoded argument payloads, by position
    pub arguments: Vec<Value>,
    /// Declared return type
    pub declared_return_type: TypeDesc,
    /// Runtime refinement of the result type, when it differs from declared
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_result_type: Option<TypeDesc>,
    /// Encoded result payload; null both for a null return and for the
    /// exception flow (`exception_type_name` decides which)
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub result: Value,
    /// Type name of the escaped exception, if the call threw
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception_type_name: Option<String>,
    /// Message of the escaped exception, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception_message: Option<String>,
}

impl Invocation {
    /// Whether this invocation ended in an exception
    pub fn is_exceptional(&self) -> bool {
        self.exception_type_name.is_some()
    }

    /// Effective type descriptor for the argument at `index`: the runtime
    /// refinement when recorded, the declared parameter type otherwise
    pub fn argument_type(&self, index: usize) -> RecapResult<&TypeDesc> {
        if let Some(runtime) = self
            .runtime_argument_types
            .as_ref()
            .and_then(|types| types.get(index))
            .and_then(Option::as_ref)
        {
            return Ok(runtime);
        }
        self.declared_parameter_types.get(index).ok_or_else(|| {
            RecapError::replay(format!(
                "Invocation of `{}.{}` has no parameter at index {}",
                self.subject_type_name, self.method_name, index
            ))
        })
    }

    /// Effective type descriptor for the result: runtime refinement first,
    /// declared return type as fallback
    pub fn result_type(&self) -> &TypeDesc {
        self.runtime_result_type
            .as_ref()
            .unwrap_or(&self.declared_return_type)
    }
}

/// Recording of a dependency call that produced another interceptable
/// collaborator rather than a terminal value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FactoryInvocation {
    /// Canonical name of the factory type the call was observed on
    pub subject_type_name: String,
    /// Invoked factory method name
    pub method_name: String,
    /// Declared (static) parameter types, by position
    pub declared_parameter_types: Vec<TypeDesc>,
    /// Per-argument runtime refinements, where recorded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_argument_types: Option<Vec<Option<TypeDesc>>>,
    /// Encoded argument payloads, by position
    pub arguments: Vec<Value>,
    /// Declared type of the produced collaborator
    pub declared_return_type: TypeDesc,
    /// Type name of the escaped exception, if the factory call threw
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception_type_name: Option<String>,
    /// Message of the escaped exception, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception_message: Option<String>,
}

impl FactoryInvocation {
    /// Effective type descriptor for the argument at `index`
    pub fn argument_type(&self, index: usize) -> RecapResult<&TypeDesc> {
        if let Some(runtime) = self
            .runtime_argument_types
            .as_ref()
            .and_then(|types| types.get(index))
            .and_then(Option::as_ref)
        {
            return Ok(runtime);
        }
        self.declared_parameter_types.get(index).ok_or_else(|| {
            RecapError::replay(format!(
                "Factory invocation of `{}.{}` has no parameter at index {}",
                self.subject_type_name, self.method_name, index
            ))
        })
    }
}

/// The unit of persistence: one main invocation plus everything the subject
/// did to its collaborators while it ran
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// The subject's own invocation, the one under test on replay
    pub main: Invocation,
    /// Wiring site (constructor parameter, field, or setter property name)
    /// to declared collaborator type name
    pub dependencies: BTreeMap<String, String>,
    /// Calls observed on collaborators, in call order
    pub dependents: Vec<Invocation>,
    /// Factory calls observed on collaborators, in call order
    pub factories: Vec<FactoryInvocation>,
}

impl Snapshot {
    /// Enforce the structural invariant: every dependent and factory
    /// invocation must be declared by a type present in the dependency map's
    /// value set, or by a type produced by an earlier factory call. Replay
    /// fails fast on violation.
    pub fn validate(&self) -> RecapResult<()> {
        let mut known: Vec<&str> = self.dependencies.values().map(String::as_str).collect();
        for factory in &self.factories {
            if !known.contains(&factory.subject_type_name.as_str()) {
                return Err(RecapError::replay(format!(
                    "Factory invocation on `{}` is not declared in the dependency map",
                    factory.subject_type_name
                )));
            }
            if let TypeDesc::Named(product) = &factory.declared_return_type {
                known.push(product.as_str());
            }
        }
        for dependent in &self.dependents {
            if !known.contains(&dependent.subject_type_name.as_str()) {
                return Err(RecapError::replay(format!(
                    "Dependent invocation on `{}` is not declared in the dependency map",
                    dependent.subject_type_name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invocation_on(type_name: &str) -> Invocation {
        Invocation {
            subject_type_name: type_name.to_string(),
            method_name: "get".to_string(),
            declared_parameter_types: vec![],
            runtime_argument_types: None,
            arguments: vec![],
            declared_return_type: TypeDesc::String,
            runtime_result_type: None,
            result: Value::String("ok".to_string()),
            exception_type_name: None,
            exception_message: None,
        }
    }

    fn snapshot_with(dependents: Vec<Invocation>) -> Snapshot {
        Snapshot {
            main: invocation_on("demo.Controller"),
            dependencies: [("service".to_string(), "demo.Service".to_string())]
                .into_iter()
                .collect(),
            dependents,
            factories: vec![],
        }
    }

    #[test]
    fn validate_accepts_declared_dependents() {
        let snapshot = snapshot_with(vec![invocation_on("demo.Service")]);
        assert!(snapshot.validate().is_ok());
    }

    #[test]
    fn validate_rejects_undeclared_dependents() {
        let snapshot = snapshot_with(vec![invocation_on("demo.Stranger")]);
        let err = snapshot.validate().unwrap_err();
        assert!(err.to_string().contains("demo.Stranger"));
    }

    #[test]
    fn validate_accepts_factory_products() {
        let mut snapshot = snapshot_with(vec![invocation_on("demo.Produced")]);
        snapshot
            .dependencies
            .insert("provider".to_string(), "demo.Provider".to_string());
        snapshot.factories.push(FactoryInvocation {
            subject_type_name: "demo.Provider".to_string(),
            method_name: "open".to_string(),
            declared_parameter_types: vec![],
            runtime_argument_types: None,
            arguments: vec![],
            declared_return_type: TypeDesc::named("demo.Produced"),
            exception_type_name: None,
            exception_message: None,
        });
        assert!(snapshot.validate().is_ok());
    }

    #[test]
    fn exception_flow_is_detected() {
        let mut invocation = invocation_on("demo.Service");
        invocation.result = Value::Null;
        invocation.exception_type_name = Some("demo.Unavailable".to_string());
        assert!(invocation.is_exceptional());
    }

    #[test]
    fn runtime_types_refine_declared_ones() {
        let mut invocation = invocation_on("demo.Service");
        invocation.declared_parameter_types = vec![TypeDesc::named("demo.Payload")];
        invocation.arguments = vec![Value::String("x".to_string())];
        invocation.runtime_argument_types = Some(vec![Some(TypeDesc::String)]);
        assert_eq!(invocation.argument_type(0).unwrap(), &TypeDesc::String);

        invocation.runtime_argument_types = None;
        assert_eq!(
            invocation.argument_type(0).unwrap(),
            &TypeDesc::named("demo.Payload")
        );
    }

    #[test]
    fn snapshot_round_trips_through_json() {
        let snapshot = snapshot_with(vec![invocation_on("demo.Service")]);
        let json = serde_json::to_string_pretty(&snapshot).unwrap();
        assert!(json.contains("\"subjectTypeName\""));
        assert!(json.contains("\"dependents\""));
        let back: Snapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
    }
}

//! Replay harness
//!
//! Turns a snapshot back into a running test: programs one stand-in per
//! recorded collaborator, reconstructs the subject around them, drives the
//! recorded main call, and compares the live outcome with the recorded one.
//! Configuration failures (missing stand-in, missing method, ambiguous
//! constructor) abort with a [`RecapError`] before any assertion runs;
//! recorded-vs-actual mismatches panic through the host test framework's
//! normal failure channel.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, instrument};

use recap_core::testsupport;
use recap_core::{
    Codec, DynValue, MethodSig, RecapError, RecapResult, Snapshot, Source, SubjectRegistry,
    SubjectSpec, Thrown, build_subject,
};

use crate::standin::{StandIn, StandInSet};

/// What the snapshot says the main call must do
#[derive(Debug, Clone, PartialEq)]
pub enum Expectation {
    /// The call returns this value
    Returns(DynValue),
    /// The call throws this exception
    Throws {
        /// Recorded exception type name
        type_name: String,
        /// Recorded exception message, asserted only when present
        message: Option<String>,
    },
}

/// Outcome of one replayed main call, ready for assertion
#[derive(Debug, Clone, PartialEq)]
pub struct Replayed {
    /// The recorded expectation
    pub expected: Expectation,
    /// The live outcome of driving the reconstructed subject
    pub actual: Result<DynValue, Thrown>,
}

/// Replay engine facade over one snapshot
pub struct ReplayHarness {
    source_name: String,
    snapshot: Arc<Snapshot>,
    spec: Arc<SubjectSpec>,
    stand_ins: StandInSet,
    manufacture: bool,
    codec: Codec,
}

impl ReplayHarness {
    /// Build a harness from a snapshot source (cached read), resolving the
    /// subject spec from the global registry and validating the snapshot's
    /// structural invariant up front
    pub fn from_source(source: &Source) -> RecapResult<Self> {
        let snapshot = testsupport::snap(source)?;
        Self::new(source.name(), snapshot)
    }

    /// Build a harness from an already-decoded snapshot
    pub fn from_snapshot(snapshot: Arc<Snapshot>) -> RecapResult<Self> {
        Self::new("<in-memory snapshot>".to_string(), snapshot)
    }

    fn new(source_name: String, snapshot: Arc<Snapshot>) -> RecapResult<Self> {
        snapshot.validate()?;
        let spec = SubjectRegistry::global().resolve(&snapshot.main.subject_type_name)?;
        Ok(ReplayHarness {
            source_name,
            snapshot,
            spec,
            stand_ins: StandInSet::new(),
            manufacture: true,
            codec: Codec::new(),
        })
    }

    /// Supply pre-existing stand-ins instead of manufacturing fresh ones.
    /// With a caller-supplied holder, a declared dependency type without a
    /// stand-in is a fatal configuration error.
    pub fn with_stand_ins(mut self, stand_ins: StandInSet) -> Self {
        self.stand_ins = stand_ins;
        self.manufacture = false;
        self
    }

    /// The stand-ins participating in this replay
    pub fn stand_ins(&self) -> &StandInSet {
        &self.stand_ins
    }

    /// The snapshot under replay
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// Program every stand-in from the recorded dependents and factories
    #[instrument(skip(self), fields(source = self.source_name.as_str()))]
    pub fn configure(&mut self) -> RecapResult<()> {
        info!(source = self.source_name.as_str(), "Configuring stand-ins");
        let snapshot = Arc::clone(&self.snapshot);

        for type_name in snapshot.dependencies.values() {
            if self.manufacture {
                self.stand_ins.ensure(type_name);
            } else if self.stand_ins.get(type_name).is_none() {
                return Err(RecapError::MissingStandIn {
                    type_name: type_name.clone(),
                });
            }
        }

        // Factories first: their products must exist before dependents
        // recorded on the produced collaborators are programmed.
        for factory in &snapshot.factories {
            let owner = self.lookup(&factory.subject_type_name)?;
            let product_type = factory.declared_return_type.name().ok_or_else(|| {
                RecapError::replay(format!(
                    "Factory `{}.{}` must produce a named collaborator type, got `{}`",
                    factory.subject_type_name, factory.method_name, factory.declared_return_type
                ))
            })?;
            let product = self.stand_ins.ensure(product_type);
            let mut args = Vec::with_capacity(factory.arguments.len());
            for (index, payload) in factory.arguments.iter().enumerate() {
                args.push(self.codec.decode(payload, factory.argument_type(index)?)?);
            }
            owner.declare_method(
                &factory.method_name,
                MethodSig::new(
                    factory.declared_parameter_types.clone(),
                    factory.declared_return_type.clone(),
                ),
            );
            owner.program_factory(&factory.method_name, args, product);
            debug!(
                factory = factory.subject_type_name.as_str(),
                method = factory.method_name.as_str(),
                "Stubbed dependency factory"
            );
        }

        for dependent in &snapshot.dependents {
            let stand_in = self.lookup(&dependent.subject_type_name)?;
            let mut args = Vec::with_capacity(dependent.arguments.len());
            for (index, payload) in dependent.arguments.iter().enumerate() {
                args.push(self.codec.decode(payload, dependent.argument_type(index)?)?);
            }
            stand_in.declare_method(
                &dependent.method_name,
                MethodSig::new(
                    dependent.declared_parameter_types.clone(),
                    dependent.declared_return_type.clone(),
                ),
            );
            if let Some(exception_type) = &dependent.exception_type_name {
                stand_in.program_raise(
                    &dependent.method_name,
                    args,
                    Thrown::new(exception_type.clone(), dependent.exception_message.clone()),
                );
                debug!(
                    dependency = dependent.subject_type_name.as_str(),
                    exception = exception_type.as_str(),
                    "Stubbed dependency invocation to throw"
                );
            } else {
                let result = self
                    .codec
                    .decode(&dependent.result, dependent.result_type())?;
                stand_in.program_return(&dependent.method_name, args, result);
                debug!(
                    dependency = dependent.subject_type_name.as_str(),
                    method = dependent.method_name.as_str(),
                    "Stubbed dependency invocation to return"
                );
            }
        }
        Ok(())
    }

    fn lookup(&mut self, type_name: &str) -> RecapResult<Arc<StandIn>> {
        // Factory products are manufactured on first reference even with a
        // caller-supplied holder; declared dependencies are not.
        if self.manufacture || self.snapshot_product_types().contains(&type_name.to_string()) {
            Ok(self.stand_ins.ensure(type_name))
        } else {
            self.stand_ins
                .get(type_name)
                .cloned()
                .ok_or_else(|| RecapError::MissingStandIn {
                    type_name: type_name.to_string(),
                })
        }
    }

    fn snapshot_product_types(&self) -> Vec<String> {
        self.snapshot
            .factories
            .iter()
            .filter_map(|factory| factory.declared_return_type.name())
            .map(str::to_string)
            .collect()
    }

    /// Reconstruct the subject, drive the recorded main call, and return the
    /// decoded expectation alongside the live outcome
    #[instrument(skip(self), fields(source = self.source_name.as_str()))]
    pub fn execute(&mut self) -> RecapResult<Replayed> {
        let snapshot = Arc::clone(&self.snapshot);
        let main = &snapshot.main;
        if self.spec.method_sig(&main.method_name).is_none() {
            return Err(RecapError::MissingMethod {
                type_name: main.subject_type_name.clone(),
                method: main.method_name.clone(),
            });
        }
        let mut subject = build_subject(&self.spec, &self.stand_ins.as_dependencies())?;
        debug!(subject = main.subject_type_name.as_str(), "Test subject built");

        let mut args = Vec::with_capacity(main.arguments.len());
        for (index, payload) in main.arguments.iter().enumerate() {
            args.push(self.codec.decode(payload, main.argument_type(index)?)?);
        }

        let expected = if let Some(exception_type) = &main.exception_type_name {
            Expectation::Throws {
                type_name: exception_type.clone(),
                message: main.exception_message.clone(),
            }
        } else {
            Expectation::Returns(self.codec.decode(&main.result, main.result_type())?)
        };

        info!(
            subject = main.subject_type_name.as_str(),
            method = main.method_name.as_str(),
            "Replaying main invocation"
        );
        let actual = subject.invoke(&main.method_name, &args);
        Ok(Replayed { expected, actual })
    }

    /// Configure, execute, and assert in one step
    pub fn run(mut self) -> RecapResult<()> {
        self.configure()?;
        let replayed = self.execute()?;
        assert_replayed(&replayed);
        Ok(())
    }
}

/// Structural deep equality with an explicit array-aware path
fn deep_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Array(left_items), Value::Array(right_items)) => {
            left_items.len() == right_items.len()
                && left_items
                    .iter()
                    .zip(right_items)
                    .all(|(l, r)| deep_eq(l, r))
        }
        (Value::Object(left_entries), Value::Object(right_entries)) => {
            left_entries.len() == right_entries.len()
                && left_entries.iter().all(|(key, l)| {
                    right_entries.get(key).map(|r| deep_eq(l, r)).unwrap_or(false)
                })
        }
        _ => left == right,
    }
}

/// Assert a replayed outcome against its recorded expectation.
///
/// Panics on mismatch, surfacing the failure through the host test
/// framework's normal channel.
pub fn assert_replayed(replayed: &Replayed) {
    match (&replayed.expected, &replayed.actual) {
        (Expectation::Returns(expected), Ok(actual)) => {
            if !deep_eq(expected.payload(), actual.payload()) {
                panic!(
                    "replayed result differs from recorded result\n  expected: {}\n  actual:   {}",
                    expected.payload(),
                    actual.payload()
                );
            }
        }
        (Expectation::Returns(expected), Err(thrown)) => {
            panic!(
                "replay expected a result but the subject threw {thrown}\n  expected: {}",
                expected.payload()
            );
        }
        (Expectation::Throws { type_name, message }, Err(thrown)) => {
            if &thrown.type_name != type_name {
                panic!(
                    "replayed exception type differs\n  expected: {type_name}\n  actual:   {}",
                    thrown.type_name
                );
            }
            if let Some(expected_message) = message {
                if thrown.message.as_deref() != Some(expected_message.as_str()) {
                    panic!(
                        "replayed exception message differs\n  expected: {expected_message}\n  actual:   {}",
                        thrown.message.as_deref().unwrap_or("<no message>")
                    );
                }
            }
        }
        (Expectation::Throws { type_name, .. }, Ok(actual)) => {
            panic!(
                "replay expected exception `{type_name}` but the subject returned {}",
                actual.payload()
            );
        }
    }
}

/// Read, configure, execute, and assert one snapshot test.
///
/// Configuration failures panic with a message clearly labeling them as
/// integration errors, distinct from assertion failures.
pub fn run_snapshot_test(source: &Source) {
    let harness = match ReplayHarness::from_source(source) {
        Ok(harness) => harness,
        Err(err) => panic!(
            "replay configuration error for `{}`: {err}",
            source.name()
        ),
    };
    if let Err(err) = harness.run() {
        panic!(
            "replay configuration error for `{}`: {err}",
            source.name()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(value: &str) -> DynValue {
        Codec::new().encode(&value.to_string()).unwrap()
    }

    #[test]
    fn deep_eq_walks_arrays_and_objects() {
        let left = serde_json::json!({"items": [1, 2, {"k": "v"}]});
        let right = serde_json::json!({"items": [1, 2, {"k": "v"}]});
        assert!(deep_eq(&left, &right));
        let different = serde_json::json!({"items": [1, 2, {"k": "other"}]});
        assert!(!deep_eq(&left, &different));
        assert!(!deep_eq(
            &serde_json::json!([1, 2]),
            &serde_json::json!([1, 2, 3])
        ));
    }

    #[test]
    fn matching_results_pass_assertion() {
        assert_replayed(&Replayed {
            expected: Expectation::Returns(text("same")),
            actual: Ok(text("same")),
        });
    }

    #[test]
    #[should_panic(expected = "replayed result differs")]
    fn differing_results_fail_assertion() {
        assert_replayed(&Replayed {
            expected: Expectation::Returns(text("recorded")),
            actual: Ok(text("live")),
        });
    }

    #[test]
    fn matching_exceptions_pass_assertion() {
        assert_replayed(&Replayed {
            expected: Expectation::Throws {
                type_name: "demo.Unavailable".to_string(),
                message: Some("down".to_string()),
            },
            actual: Err(Thrown::new("demo.Unavailable", Some("down".to_string()))),
        });
    }

    #[test]
    #[should_panic(expected = "replayed exception message differs")]
    fn differing_exception_messages_fail_assertion() {
        assert_replayed(&Replayed {
            expected: Expectation::Throws {
                type_name: "demo.Unavailable".to_string(),
                message: Some("down".to_string()),
            },
            actual: Err(Thrown::new("demo.Unavailable", Some("up".to_string()))),
        });
    }

    #[test]
    #[should_panic(expected = "expected exception")]
    fn returning_when_a_throw_was_recorded_fails() {
        assert_replayed(&Replayed {
            expected: Expectation::Throws {
                type_name: "demo.Unavailable".to_string(),
                message: None,
            },
            actual: Ok(text("fine")),
        });
    }
}

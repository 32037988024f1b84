//! Snapshot recorder
//!
//! Drives one intercepted main invocation: rebuilds the subject with every
//! collaborator wrapped for recording, runs the recorded method inside the
//! session lifecycle, assembles the [`Snapshot`] on both the return and the
//! throw path, persists it, and hands the original outcome back unchanged.
//! Recording must never break production behavior: when the wrapped subject
//! cannot be rebuilt, the call proceeds against the unwrapped collaborators
//! with a warning and no snapshot interception for them.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::codec::{DynValue, TypeDesc};
use crate::intercept::{
    Dependency, Interceptor, MethodSig, RecordingInterceptor, Thrown, runtime_refinements,
};
use crate::model::{Invocation, Snapshot};
use crate::session::InvocationStore;
use crate::store::SnapWriter;
use crate::subject::{SubjectSpec, build_subject};
use crate::error::RecapResult;

/// Records main invocations into snapshot files
pub struct SnapshotRecorder {
    writer: SnapWriter,
    store: Arc<InvocationStore>,
    interceptor: Arc<dyn Interceptor>,
}

impl SnapshotRecorder {
    /// Create a recorder writing through the given writer, using the
    /// in-crate recording interceptor
    pub fn new(writer: SnapWriter) -> Self {
        let store = Arc::new(InvocationStore::new());
        let interceptor = Arc::new(RecordingInterceptor::new(Arc::clone(&store)));
        SnapshotRecorder {
            writer,
            store,
            interceptor,
        }
    }

    /// Create a recorder with a custom interception capability
    pub fn with_interceptor(
        writer: SnapWriter,
        store: Arc<InvocationStore>,
        interceptor: Arc<dyn Interceptor>,
    ) -> Self {
        SnapshotRecorder {
            writer,
            store,
            interceptor,
        }
    }

    /// The session store this recorder reports into
    pub fn store(&self) -> &Arc<InvocationStore> {
        &self.store
    }

    /// Capture one main invocation.
    ///
    /// `dependencies` maps each wiring site to the real collaborator. The
    /// outer result carries engine failures (construction, persistence); the
    /// inner result is the subject's own outcome, returned to the caller
    /// exactly as the call produced it — an escaped subject error is
    /// re-raised after the snapshot is durably recorded, never swallowed.
    #[instrument(skip(self, spec, dependencies, args), fields(subject = spec.type_name.as_str()))]
    pub fn capture(
        &self,
        spec: &SubjectSpec,
        dependencies: &BTreeMap<String, Arc<dyn Dependency>>,
        method: &str,
        args: Vec<DynValue>,
    ) -> RecapResult<Result<DynValue, Thrown>> {
        let dependency_map: BTreeMap<String, String> = dependencies
            .iter()
            .map(|(site, dep)| (site.clone(), dep.declared_type().to_string()))
            .collect();

        let wrapped: HashMap<String, Arc<dyn Dependency>> = dependencies
            .values()
            .map(|dep| {
                (
                    dep.declared_type().to_string(),
                    self.interceptor.wrap(Arc::clone(dep), false),
                )
            })
            .collect();

        let mut subject = match build_subject(spec, &wrapped) {
            Ok(subject) => subject,
            Err(err) => {
                // Degrade to the unwrapped collaborators rather than break
                // the production call; the snapshot will see no dependents.
                warn!(
                    subject = spec.type_name.as_str(),
                    error = %err,
                    "Cannot build intercepted subject; recording with unwrapped dependencies"
                );
                let unwrapped: HashMap<String, Arc<dyn Dependency>> = dependencies
                    .values()
                    .map(|dep| (dep.declared_type().to_string(), Arc::clone(dep)))
                    .collect();
                build_subject(spec, &unwrapped)?
            }
        };

        self.store.start();
        let outcome = subject.invoke(method, &args);
        self.store.stop();

        let main = self.build_main(spec, method, &args, &outcome);
        let snapshot = Snapshot {
            main,
            dependencies: dependency_map,
            dependents: self.store.dependents(),
            factories: self.store.factories(),
        };
        let written = self.writer.write(&snapshot);
        self.store.reset();
        let path = written?;
        debug!(path = %path.display(), "Main invocation snapped");
        Ok(outcome)
    }

    fn build_main(
        &self,
        spec: &SubjectSpec,
        method: &str,
        args: &[DynValue],
        outcome: &Result<DynValue, Thrown>,
    ) -> Invocation {
        let sig = spec.method_sig(method).cloned().unwrap_or_else(|| {
            MethodSig::new(
                args.iter().map(|arg| arg.descriptor().clone()).collect(),
                outcome
                    .as_ref()
                    .map(|value| value.descriptor().clone())
                    .unwrap_or(TypeDesc::Unit),
            )
        });
        let (result, runtime_result_type, exception_type_name, exception_message) = match outcome {
            Ok(value) => {
                let refinement = (value.descriptor() != &sig.ret && !value.is_null())
                    .then(|| value.descriptor().clone());
                (value.payload().clone(), refinement, None, None)
            }
            Err(thrown) => (
                Value::Null,
                None,
                Some(thrown.type_name.clone()),
                thrown.message.clone(),
            ),
        };
        Invocation {
            subject_type_name: spec.type_name.clone(),
            method_name: method.to_string(),
            runtime_argument_types: runtime_refinements(args, &sig.params),
            arguments: args.iter().map(|arg| arg.payload().clone()).collect(),
            declared_parameter_types: sig.params,
            declared_return_type: sig.ret,
            runtime_result_type,
            result,
            exception_type_name,
            exception_message,
        }
    }
}

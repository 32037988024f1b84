//! Interception boundary
//!
//! Collaborators are dynamic ports: a [`Dependency`] answers calls by method
//! name with portable values, and declares which of its methods are factory
//! sites (calls that produce further collaborators). The [`Interceptor`]
//! capability wraps a dependency so that, while the owning session records,
//! every call is reported before it returns to the caller; the in-crate
//! implementation is [`RecordingInterceptor`]. Wrapped objects forward
//! transparently and are usable everywhere the original reference is used.

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tracing::trace;

use crate::codec::{DynValue, TypeDesc};
use crate::model::{FactoryInvocation, Invocation};
use crate::session::InvocationStore;

/// A thrown call outcome: exception type name plus optional message
///
/// This is the portable form an escaped error travels in, on both the
/// recording and the replay side.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{type_name}: {}", .message.as_deref().unwrap_or("<no message>"))]
pub struct Thrown {
    /// Canonical name of the exception type
    pub type_name: String,
    /// Exception message, if the type carries one
    pub message: Option<String>,
}

impl Thrown {
    /// Create a thrown outcome
    pub fn new(type_name: impl Into<String>, message: Option<String>) -> Self {
        Thrown {
            type_name: type_name.into(),
            message,
        }
    }

    /// Capture an arbitrary error under a canonical type name
    pub fn from_error(type_name: impl Into<String>, error: &dyn std::error::Error) -> Self {
        Thrown {
            type_name: type_name.into(),
            message: Some(error.to_string()),
        }
    }
}

/// One call on a collaborator port
#[derive(Debug, Clone, PartialEq)]
pub struct MethodCall {
    /// Invoked method name
    pub method: String,
    /// Argument values, by position
    pub args: Vec<DynValue>,
}

impl MethodCall {
    /// Create a call
    pub fn new(method: impl Into<String>, args: Vec<DynValue>) -> Self {
        MethodCall {
            method: method.into(),
            args,
        }
    }
}

/// Declared signature of a collaborator method
#[derive(Debug, Clone, PartialEq)]
pub struct MethodSig {
    /// Declared parameter types, by position
    pub params: Vec<TypeDesc>,
    /// Declared return type
    pub ret: TypeDesc,
}

impl MethodSig {
    /// Create a signature
    pub fn new(params: Vec<TypeDesc>, ret: TypeDesc) -> Self {
        MethodSig { params, ret }
    }
}

/// A collaborator the subject calls during the main invocation
///
/// Real collaborators implement this port directly; recording proxies and
/// replay stand-ins implement it too, which is what makes them usable
/// everywhere the original typed reference is used.
pub trait Dependency: Send + Sync {
    /// Canonical name of the declared collaborator type
    fn declared_type(&self) -> &str;

    /// Declared signature of a method, when known
    fn method_sig(&self, method: &str) -> Option<MethodSig>;

    /// Answer a value call
    fn invoke(&self, call: &MethodCall) -> Result<DynValue, Thrown>;

    /// Whether a method is a factory site producing another collaborator
    fn is_factory_site(&self, _method: &str) -> bool {
        false
    }

    /// Answer a factory call with the produced collaborator
    fn create(&self, call: &MethodCall) -> Result<Arc<dyn Dependency>, Thrown> {
        Err(Thrown::new(
            "recap.UnsupportedFactoryCall",
            Some(format!(
                "`{}` does not declare factory method `{}`",
                self.declared_type(),
                call.method
            )),
        ))
    }
}

/// Capability to wrap a dependency for call interposition
///
/// `factory_site` marks the whole wrapped object as a factory: every call on
/// it is reported as a factory invocation. Per-method factory sites are
/// declared by the dependency itself.
pub trait Interceptor: Send + Sync {
    /// Wrap a dependency so calls on it are observed
    fn wrap(&self, dependency: Arc<dyn Dependency>, factory_site: bool) -> Arc<dyn Dependency>;
}

/// The recording implementation of the interception capability
///
/// Proxies produced by this interceptor forward every call to the real
/// collaborator unchanged and report it to the shared [`InvocationStore`]
/// before returning; factory products are recursively wrapped so chains of
/// dynamically-produced collaborators record transparently.
pub struct RecordingInterceptor {
    store: Arc<InvocationStore>,
}

impl RecordingInterceptor {
    /// Create an interceptor reporting to the given store
    pub fn new(store: Arc<InvocationStore>) -> Self {
        RecordingInterceptor { store }
    }
}

impl Interceptor for RecordingInterceptor {
    fn wrap(&self, dependency: Arc<dyn Dependency>, factory_site: bool) -> Arc<dyn Dependency> {
        trace!(
            declared_type = dependency.declared_type(),
            factory_site, "Wrapping dependency"
        );
        Arc::new(Recorded {
            inner: dependency,
            store: Arc::clone(&self.store),
            all_factory: factory_site,
        })
    }
}

/// Per-argument runtime type refinements: recorded only where the observed
/// descriptor diverges from the declared parameter type
pub(crate) fn runtime_refinements(
    args: &[DynValue],
    declared: &[TypeDesc],
) -> Option<Vec<Option<TypeDesc>>> {
    let refinements: Vec<Option<TypeDesc>> = args
        .iter()
        .enumerate()
        .map(|(index, arg)| {
            let runtime = arg.descriptor();
            match declared.get(index) {
                Some(declared_type) if declared_type == runtime => None,
                _ => Some(runtime.clone()),
            }
        })
        .collect();
    if refinements.iter().all(Option::is_none) {
        None
    } else {
        Some(refinements)
    }
}

/// Transparent recording proxy around a real collaborator
struct Recorded {
    inner: Arc<dyn Dependency>,
    store: Arc<InvocationStore>,
    all_factory: bool,
}

impl Recorded {
    /// Declared signature when the dependency knows it; otherwise the
    /// observed runtime shapes stand in for the declared ones.
    fn effective_sig(&self, call: &MethodCall, observed_ret: Option<&TypeDesc>) -> MethodSig {
        self.inner.method_sig(&call.method).unwrap_or_else(|| {
            MethodSig::new(
                call.args.iter().map(|arg| arg.descriptor().clone()).collect(),
                observed_ret.cloned().unwrap_or(TypeDesc::Unit),
            )
        })
    }

    fn record_value_call(&self, call: &MethodCall, outcome: &Result<DynValue, Thrown>) {
        let observed_ret = outcome.as_ref().ok().map(DynValue::descriptor);
        let sig = self.effective_sig(call, observed_ret);
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
        self.store.record_dependent(Invocation {
            subject_type_name: self.inner.declared_type().to_string(),
            method_name: call.method.clone(),
            runtime_argument_types: runtime_refinements(&call.args, &sig.params),
            arguments: call.args.iter().map(|arg| arg.payload().clone()).collect(),
            declared_parameter_types: sig.params,
            declared_return_type: sig.ret,
            runtime_result_type,
            result,
            exception_type_name,
            exception_message,
        });
    }

    fn record_factory_call(&self, call: &MethodCall, product_type: &TypeDesc, thrown: Option<&Thrown>) {
        let sig = self.effective_sig(call, Some(product_type));
        self.store.record_factory(FactoryInvocation {
            subject_type_name: self.inner.declared_type().to_string(),
            method_name: call.method.clone(),
            runtime_argument_types: runtime_refinements(&call.args, &sig.params),
            arguments: call.args.iter().map(|arg| arg.payload().clone()).collect(),
            declared_parameter_types: sig.params,
            declared_return_type: product_type.clone(),
            exception_type_name: thrown.map(|t| t.type_name.clone()),
            exception_message: thrown.and_then(|t| t.message.clone()),
        });
    }
}

impl Dependency for Recorded {
    fn declared_type(&self) -> &str {
        self.inner.declared_type()
    }

    fn method_sig(&self, method: &str) -> Option<MethodSig> {
        self.inner.method_sig(method)
    }

    fn invoke(&self, call: &MethodCall) -> Result<DynValue, Thrown> {
        trace!(
            declared_type = self.inner.declared_type(),
            method = call.method.as_str(),
            "Dependency method invocation"
        );
        let outcome = self.inner.invoke(call);
        self.record_value_call(call, &outcome);
        outcome
    }

    fn is_factory_site(&self, method: &str) -> bool {
        self.all_factory || self.inner.is_factory_site(method)
    }

    fn create(&self, call: &MethodCall) -> Result<Arc<dyn Dependency>, Thrown> {
        trace!(
            declared_type = self.inner.declared_type(),
            method = call.method.as_str(),
            "Dependency factory invocation"
        );
        match self.inner.create(call) {
            Ok(product) => {
                let product_type = TypeDesc::named(product.declared_type());
                self.record_factory_call(call, &product_type, None);
                // The product must itself record, so the chain stays transparent.
                Ok(Arc::new(Recorded {
                    inner: product,
                    store: Arc::clone(&self.store),
                    all_factory: false,
                }))
            }
            Err(thrown) => {
                let declared = self
                    .inner
                    .method_sig(&call.method)
                    .map(|sig| sig.ret)
                    .unwrap_or(TypeDesc::Unit);
                self.record_factory_call(call, &declared, Some(&thrown));
                Err(thrown)
            }
        }
    }
}

//! Programmable stand-ins
//!
//! A [`StandIn`] substitutes for a real collaborator on replay. It answers
//! only the calls it was programmed with: a call matches when the method name
//! and every argument are value-equal to a programmed entry. Factory sites
//! are programmed to yield another stand-in, which is how nested collaborator
//! chains replay. Unmatched calls answer with a descriptive error rather
//! than a default value, so a drifted subject fails its replay pointedly.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use recap_core::{Dependency, DynValue, MethodCall, MethodSig, Thrown};

/// Exception type name reported for calls no programming matches
pub const UNMATCHED_CALL: &str = "recap.mock.UnmatchedCall";

/// A programmed answer for one recorded call
#[derive(Clone)]
enum Answer {
    Return(DynValue),
    Raise(Thrown),
    Yield(Arc<StandIn>),
}

struct ProgrammedCall {
    method: String,
    args: Vec<DynValue>,
    answer: Answer,
}

/// A replay-time substitute for a real collaborator
pub struct StandIn {
    type_name: String,
    calls: Mutex<Vec<ProgrammedCall>>,
    sigs: Mutex<BTreeMap<String, MethodSig>>,
}

impl StandIn {
    /// Create an unprogrammed stand-in for a collaborator type
    pub fn new(type_name: impl Into<String>) -> Arc<Self> {
        Arc::new(StandIn {
            type_name: type_name.into(),
            calls: Mutex::new(Vec::new()),
            sigs: Mutex::new(BTreeMap::new()),
        })
    }

    /// Record the declared signature of a method, for `method_sig` lookups
    pub fn declare_method(&self, method: impl Into<String>, sig: MethodSig) {
        self.sigs.lock().insert(method.into(), sig);
    }

    /// Program a call to return a value
    pub fn program_return(&self, method: impl Into<String>, args: Vec<DynValue>, result: DynValue) {
        let method = method.into();
        trace!(
            type_name = self.type_name.as_str(),
            method = method.as_str(),
            "Programming return"
        );
        self.calls.lock().push(ProgrammedCall {
            method,
            args,
            answer: Answer::Return(result),
        });
    }

    /// Program a call to raise an exception
    pub fn program_raise(&self, method: impl Into<String>, args: Vec<DynValue>, thrown: Thrown) {
        let method = method.into();
        trace!(
            type_name = self.type_name.as_str(),
            method = method.as_str(),
            exception = thrown.type_name.as_str(),
            "Programming raise"
        );
        self.calls.lock().push(ProgrammedCall {
            method,
            args,
            answer: Answer::Raise(thrown),
        });
    }

    /// Program a factory call to yield another stand-in
    pub fn program_factory(
        &self,
        method: impl Into<String>,
        args: Vec<DynValue>,
        product: Arc<StandIn>,
    ) {
        let method = method.into();
        trace!(
            type_name = self.type_name.as_str(),
            method = method.as_str(),
            product = product.type_name.as_str(),
            "Programming factory"
        );
        self.calls.lock().push(ProgrammedCall {
            method,
            args,
            answer: Answer::Yield(product),
        });
    }

    fn find(&self, call: &MethodCall) -> Option<Answer> {
        self.calls
            .lock()
            .iter()
            .find(|programmed| programmed.method == call.method && programmed.args == call.args)
            .map(|programmed| programmed.answer.clone())
    }

    fn unmatched(&self, call: &MethodCall) -> Thrown {
        let programmed_methods: Vec<String> = self
            .calls
            .lock()
            .iter()
            .map(|programmed| programmed.method.clone())
            .collect();
        Thrown::new(
            UNMATCHED_CALL,
            Some(format!(
                "No programmed call on `{}` matches `{}` with {} argument(s); programmed methods: {:?}",
                self.type_name,
                call.method,
                call.args.len(),
                programmed_methods
            )),
        )
    }
}

impl Dependency for StandIn {
    fn declared_type(&self) -> &str {
        &self.type_name
    }

    fn method_sig(&self, method: &str) -> Option<MethodSig> {
        self.sigs.lock().get(method).cloned()
    }

    fn invoke(&self, call: &MethodCall) -> Result<DynValue, Thrown> {
        match self.find(call) {
            Some(Answer::Return(value)) => Ok(value),
            Some(Answer::Raise(thrown)) => Err(thrown),
            Some(Answer::Yield(_)) => Err(Thrown::new(
                UNMATCHED_CALL,
                Some(format!(
                    "`{}.{}` is programmed as a factory site, not a value method",
                    self.type_name, call.method
                )),
            )),
            None => Err(self.unmatched(call)),
        }
    }

    fn is_factory_site(&self, method: &str) -> bool {
        self.calls
            .lock()
            .iter()
            .any(|programmed| {
                programmed.method == method && matches!(programmed.answer, Answer::Yield(_))
            })
    }

    fn create(&self, call: &MethodCall) -> Result<Arc<dyn Dependency>, Thrown> {
        match self.find(call) {
            Some(Answer::Yield(product)) => Ok(product),
            Some(_) => Err(Thrown::new(
                UNMATCHED_CALL,
                Some(format!(
                    "`{}.{}` is programmed as a value method, not a factory site",
                    self.type_name, call.method
                )),
            )),
            None => Err(self.unmatched(call)),
        }
    }
}

/// Holder for the stand-ins participating in one replay, keyed by declared
/// collaborator type name
#[derive(Default)]
pub struct StandInSet {
    stand_ins: HashMap<String, Arc<StandIn>>,
}

impl StandInSet {
    /// Create an empty set
    pub fn new() -> Self {
        StandInSet::default()
    }

    /// Add a caller-supplied stand-in, replacing any previous one of the
    /// same type
    pub fn insert(&mut self, stand_in: Arc<StandIn>) {
        self.stand_ins
            .insert(stand_in.type_name.clone(), stand_in);
    }

    /// Look up the stand-in for a collaborator type
    pub fn get(&self, type_name: &str) -> Option<&Arc<StandIn>> {
        self.stand_ins.get(type_name)
    }

    /// Get the stand-in for a type, manufacturing a fresh one on first use
    pub fn ensure(&mut self, type_name: &str) -> Arc<StandIn> {
        Arc::clone(
            self.stand_ins
                .entry(type_name.to_string())
                .or_insert_with(|| StandIn::new(type_name)),
        )
    }

    /// View the set as dependency ports keyed by type name
    pub fn as_dependencies(&self) -> HashMap<String, Arc<dyn Dependency>> {
        self.stand_ins
            .iter()
            .map(|(type_name, stand_in)| {
                (
                    type_name.clone(),
                    Arc::clone(stand_in) as Arc<dyn Dependency>,
                )
            })
            .collect()
    }

    /// Number of stand-ins in the set
    pub fn len(&self) -> usize {
        self.stand_ins.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.stand_ins.is_empty()
    }
}

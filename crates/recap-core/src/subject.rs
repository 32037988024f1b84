//! Subject descriptors and reconstruction
//!
//! Rust has no reflection, so the shape a subject can be built from is a
//! statically supplied [`SubjectSpec`]: constructor signatures with build
//! closures, injectable properties (field or setter kind), and the declared
//! method signatures of the subject itself. Constructor selection is the pure
//! function [`rank_constructors`], kept separate from the construction side
//! effect so the heuristic is testable on its own.

use std::any::Any;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, LazyLock};

use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::codec::DynValue;
use crate::error::{RecapError, RecapResult};
use crate::intercept::{Dependency, MethodSig, Thrown};

/// A reconstructed subject instance, drivable by method name
pub trait Subject: Any + Send {
    /// Canonical name of the subject type
    fn type_name(&self) -> &str;

    /// Invoke a subject method with portable arguments
    fn invoke(&mut self, method: &str, args: &[DynValue]) -> Result<DynValue, Thrown>;

    /// Downcast support for property injection closures
    fn as_any(&self) -> &dyn Any;

    /// Mutable downcast support for property injection closures
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// One constructor parameter: wiring-site name plus declared type name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSpec {
    /// Constructor parameter name (the wiring site)
    pub name: String,
    /// Declared collaborator type name
    pub type_name: String,
}

impl ParamSpec {
    /// Create a parameter spec
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        ParamSpec {
            name: name.into(),
            type_name: type_name.into(),
        }
    }
}

type BuildFn =
    Arc<dyn Fn(&[Arc<dyn Dependency>]) -> RecapResult<Box<dyn Subject>> + Send + Sync>;

/// A declared constructor: parameter list plus the closure that builds the
/// subject from dependencies supplied positionally
#[derive(Clone)]
pub struct ConstructorSpec {
    /// Parameters, by position
    pub params: Vec<ParamSpec>,
    build: BuildFn,
}

impl ConstructorSpec {
    /// Create a constructor spec
    pub fn new(
        params: Vec<ParamSpec>,
        build: impl Fn(&[Arc<dyn Dependency>]) -> RecapResult<Box<dyn Subject>>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        ConstructorSpec {
            params,
            build: Arc::new(build),
        }
    }

    fn param_types(&self) -> Vec<&str> {
        self.params.iter().map(|p| p.type_name.as_str()).collect()
    }

    fn has_distinct_types(&self) -> bool {
        let mut seen = HashSet::new();
        self.params.iter().all(|p| seen.insert(p.type_name.as_str()))
    }
}

impl std::fmt::Debug for ConstructorSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConstructorSpec")
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// How a leftover dependency is injected after construction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectionKind {
    /// Direct field assignment, bypassing normal access
    Field,
    /// Setter-convention method
    Setter,
}

type ProbeFn = Arc<dyn Fn(&dyn Subject) -> bool + Send + Sync>;
type InjectFn = Arc<dyn Fn(&mut dyn Subject, Arc<dyn Dependency>) -> RecapResult<()> + Send + Sync>;

/// An injectable property of the subject: a declared field or a setter
#[derive(Clone)]
pub struct PropertySpec {
    /// Property name (the wiring site)
    pub name: String,
    /// Declared collaborator type name
    pub type_name: String,
    /// Field or setter
    pub kind: InjectionKind,
    /// Whether the property is already set; `None` models a write-only
    /// property (no getter), which is injected unconditionally
    probe: Option<ProbeFn>,
    inject: InjectFn,
}

impl PropertySpec {
    /// Create a property spec with an is-set probe
    pub fn new(
        name: impl Into<String>,
        type_name: impl Into<String>,
        kind: InjectionKind,
        probe: impl Fn(&dyn Subject) -> bool + Send + Sync + 'static,
        inject: impl Fn(&mut dyn Subject, Arc<dyn Dependency>) -> RecapResult<()>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        PropertySpec {
            name: name.into(),
            type_name: type_name.into(),
            kind,
            probe: Some(Arc::new(probe)),
            inject: Arc::new(inject),
        }
    }

    /// Create a write-only property spec (no getter to consult)
    pub fn write_only(
        name: impl Into<String>,
        type_name: impl Into<String>,
        kind: InjectionKind,
        inject: impl Fn(&mut dyn Subject, Arc<dyn Dependency>) -> RecapResult<()>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        PropertySpec {
            name: name.into(),
            type_name: type_name.into(),
            kind,
            probe: None,
            inject: Arc::new(inject),
        }
    }
}

impl std::fmt::Debug for PropertySpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertySpec")
            .field("name", &self.name)
            .field("type_name", &self.type_name)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Statically supplied shape of a subject type
#[derive(Debug, Clone)]
pub struct SubjectSpec {
    /// Canonical subject type name
    pub type_name: String,
    /// Declared constructors
    pub constructors: Vec<ConstructorSpec>,
    /// Injectable properties, fields before setters
    pub properties: Vec<PropertySpec>,
    /// Declared subject method signatures
    pub methods: BTreeMap<String, MethodSig>,
}

impl SubjectSpec {
    /// Start building a spec for a subject type
    pub fn builder(type_name: impl Into<String>) -> SubjectSpecBuilder {
        SubjectSpecBuilder {
            type_name: type_name.into(),
            constructors: Vec::new(),
            properties: Vec::new(),
            methods: BTreeMap::new(),
        }
    }

    /// Declared signature of a subject method
    pub fn method_sig(&self, method: &str) -> Option<&MethodSig> {
        self.methods.get(method)
    }

    /// Wiring map of every declared dependency site: constructor parameter
    /// and property names to declared type names
    pub fn dependency_map(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        for ctor in &self.constructors {
            for param in &ctor.params {
                map.insert(param.name.clone(), param.type_name.clone());
            }
        }
        for property in &self.properties {
            map.insert(property.name.clone(), property.type_name.clone());
        }
        map
    }
}

/// Builder for [`SubjectSpec`]
pub struct SubjectSpecBuilder {
    type_name: String,
    constructors: Vec<ConstructorSpec>,
    properties: Vec<PropertySpec>,
    methods: BTreeMap<String, MethodSig>,
}

impl SubjectSpecBuilder {
    /// Add a constructor
    pub fn constructor(mut self, spec: ConstructorSpec) -> Self {
        self.constructors.push(spec);
        self
    }

    /// Add an injectable property
    pub fn property(mut self, spec: PropertySpec) -> Self {
        self.properties.push(spec);
        self
    }

    /// Declare a subject method signature
    pub fn method(mut self, name: impl Into<String>, sig: MethodSig) -> Self {
        self.methods.insert(name.into(), sig);
        self
    }

    /// Finish the spec; fields sort before setters so injection honors the
    /// field-first policy
    pub fn build(mut self) -> SubjectSpec {
        self.properties
            .sort_by_key(|p| matches!(p.kind, InjectionKind::Setter));
        SubjectSpec {
            type_name: self.type_name,
            constructors: self.constructors,
            properties: self.properties,
            methods: self.methods,
        }
    }
}

/// Outcome of constructor ranking
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstructorChoice {
    /// Index of the chosen constructor in the spec's list
    pub index: usize,
    /// How many parameters are covered by available dependency types
    pub covered: usize,
}

/// Rank declared constructors against the available dependency types.
///
/// Preference order: the widest constructor whose parameter types are
/// pairwise distinct and all covered by `available`. When no constructor is
/// fully covered, the best candidate's gaps are reported as a
/// `ConstructionAmbiguity` error instead of silently constructing with
/// unset dependencies.
pub fn rank_constructors(
    subject: &str,
    constructors: &[ConstructorSpec],
    available: &HashSet<&str>,
) -> RecapResult<ConstructorChoice> {
    if constructors.is_empty() {
        return Err(RecapError::replay(format!(
            "Subject `{subject}` declares no constructors"
        )));
    }
    let full_match = constructors
        .iter()
        .enumerate()
        .filter(|(_, ctor)| ctor.has_distinct_types())
        .filter(|(_, ctor)| {
            ctor.param_types()
                .iter()
                .all(|type_name| available.contains(type_name))
        })
        .max_by_key(|(_, ctor)| ctor.params.len());
    if let Some((index, ctor)) = full_match {
        trace!(subject, index, "Fully covered constructor selected");
        return Ok(ConstructorChoice {
            index,
            covered: ctor.params.len(),
        });
    }
    // Best effort would leave gaps; surface them instead of proceeding.
    let mut index = 0;
    let mut best_covered = 0;
    for (candidate, ctor) in constructors.iter().enumerate() {
        let covered = ctor
            .param_types()
            .iter()
            .filter(|type_name| available.contains(*type_name))
            .count();
        if covered > best_covered {
            index = candidate;
            best_covered = covered;
        }
    }
    let ctor = &constructors[index];
    let missing: Vec<String> = ctor
        .param_types()
        .iter()
        .filter(|type_name| !available.contains(*type_name))
        .map(|type_name| type_name.to_string())
        .collect();
    debug!(
        subject,
        index,
        ?missing,
        "No fully covered constructor; refusing ambiguous construction"
    );
    Err(RecapError::ConstructionAmbiguity {
        subject: subject.to_string(),
        missing,
    })
}

/// Construct a subject from its spec and the available dependencies, then
/// wire any dependency the chosen constructor did not consume.
///
/// Leftovers go to a same-typed field that is still unset, else to a setter
/// (write-only setters inject unconditionally). Dependencies matching no
/// property are silently left unwired.
pub fn build_subject(
    spec: &SubjectSpec,
    dependencies: &HashMap<String, Arc<dyn Dependency>>,
) -> RecapResult<Box<dyn Subject>> {
    let available: HashSet<&str> = dependencies.keys().map(String::as_str).collect();
    let choice = rank_constructors(&spec.type_name, &spec.constructors, &available)?;
    let ctor = &spec.constructors[choice.index];
    let args: Vec<Arc<dyn Dependency>> = ctor
        .params
        .iter()
        .map(|param| {
            dependencies
                .get(&param.type_name)
                .cloned()
                .ok_or_else(|| RecapError::MissingStandIn {
                    type_name: param.type_name.clone(),
                })
        })
        .collect::<RecapResult<_>>()?;
    let mut subject = (ctor.build)(&args)?;
    debug!(subject = spec.type_name.as_str(), "Subject instance constructed");

    let consumed: HashSet<&str> = ctor.params.iter().map(|p| p.type_name.as_str()).collect();
    for (type_name, dependency) in dependencies {
        if consumed.contains(type_name.as_str()) {
            continue;
        }
        let Some(property) = spec
            .properties
            .iter()
            .find(|p| p.type_name == *type_name)
        else {
            trace!(type_name, "Dependency matches no property; left unwired");
            continue;
        };
        let already_set = property
            .probe
            .as_ref()
            .map(|probe| probe(subject.as_ref()))
            .unwrap_or(false);
        if already_set {
            trace!(property = property.name.as_str(), "Property already set");
            continue;
        }
        trace!(
            property = property.name.as_str(),
            kind = ?property.kind,
            "Injecting leftover dependency"
        );
        (property.inject)(subject.as_mut(), Arc::clone(dependency))?;
    }
    Ok(subject)
}

/// Registry of subject specs by canonical type name
pub struct SubjectRegistry {
    specs: RwLock<HashMap<String, Arc<SubjectSpec>>>,
}

impl SubjectRegistry {
    fn new() -> Self {
        SubjectRegistry {
            specs: RwLock::new(HashMap::new()),
        }
    }

    /// The process-global registry instance
    pub fn global() -> &'static SubjectRegistry {
        static GLOBAL: LazyLock<SubjectRegistry> = LazyLock::new(SubjectRegistry::new);
        &GLOBAL
    }

    /// Register a subject spec; re-registering a name replaces the entry
    pub fn register(&self, spec: SubjectSpec) {
        debug!(subject = spec.type_name.as_str(), "Registered subject spec");
        self.specs
            .write()
            .insert(spec.type_name.clone(), Arc::new(spec));
    }

    /// Resolve a subject spec by type name
    pub fn resolve(&self, type_name: &str) -> RecapResult<Arc<SubjectSpec>> {
        self.specs.read().get(type_name).cloned().ok_or_else(|| {
            RecapError::replay(format!(
                "No subject spec registered for `{type_name}`"
            ))
        })
    }
}

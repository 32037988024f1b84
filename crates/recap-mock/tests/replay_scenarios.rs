//! End-to-end record/replay scenarios over a hello-style fixture app

use std::collections::BTreeMap;
use std::sync::{Arc, Once};

use serde::{Deserialize, Serialize};

use recap_core::{
    Codec, ConstructorSpec, Dependency, DynValue, MethodCall, MethodSig, ParamSpec, Portable,
    SnapWriter, SnapshotRecorder, Source, Subject, SubjectRegistry, SubjectSpec, Thrown, TypeDesc,
    register_portable,
};
use recap_mock::{
    ExceptionRegistry, ExceptionSpec, ReplayHarness, StandInSet, assert_replayed, materialize,
    run_snapshot_test,
};

const CONTROLLER_TYPE: &str = "hello.HelloController";
const PROVIDER_CONTROLLER_TYPE: &str = "hello.RelayController";
const SERVICE_TYPE: &str = "hello.HelloService";
const PROVIDER_TYPE: &str = "hello.ServiceProvider";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Greeting {
    data: String,
}

impl Portable for Greeting {
    fn type_desc() -> TypeDesc {
        TypeDesc::named("hello.Greeting")
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct Unavailable(String);

/// The real collaborator used while recording
struct LiveHelloService;

impl Dependency for LiveHelloService {
    fn declared_type(&self) -> &str {
        SERVICE_TYPE
    }

    fn method_sig(&self, method: &str) -> Option<MethodSig> {
        match method {
            "get" => Some(MethodSig::new(vec![], TypeDesc::String)),
            "fetch" => Some(MethodSig::new(
                vec![TypeDesc::String],
                Greeting::type_desc(),
            )),
            "oops" => Some(MethodSig::new(vec![], TypeDesc::String)),
            _ => None,
        }
    }

    fn invoke(&self, call: &MethodCall) -> Result<DynValue, Thrown> {
        let codec = Codec::new();
        match call.method.as_str() {
            "get" => codec
                .encode(&"Hello World".to_string())
                .map_err(|err| Thrown::from_error("hello.CodecFailure", &err)),
            "fetch" => {
                let name: String = call.args[0]
                    .payload()
                    .as_str()
                    .unwrap_or_default()
                    .to_string();
                codec
                    .encode(&Greeting { data: name })
                    .map_err(|err| Thrown::from_error("hello.CodecFailure", &err))
            }
            "oops" => Err(Thrown::new(
                "hello.Unavailable",
                Some("down for maintenance".to_string()),
            )),
            other => Err(Thrown::new("hello.NoSuchMethod", Some(other.to_string()))),
        }
    }
}

/// The real factory collaborator: produces the service lazily
struct LiveServiceProvider;

impl Dependency for LiveServiceProvider {
    fn declared_type(&self) -> &str {
        PROVIDER_TYPE
    }

    fn method_sig(&self, method: &str) -> Option<MethodSig> {
        match method {
            "open" => Some(MethodSig::new(vec![], TypeDesc::named(SERVICE_TYPE))),
            _ => None,
        }
    }

    fn invoke(&self, call: &MethodCall) -> Result<DynValue, Thrown> {
        Err(Thrown::new(
            "hello.NotAValueMethod",
            Some(call.method.clone()),
        ))
    }

    fn is_factory_site(&self, method: &str) -> bool {
        method == "open"
    }

    fn create(&self, _call: &MethodCall) -> Result<Arc<dyn Dependency>, Thrown> {
        Ok(Arc::new(LiveHelloService))
    }
}

/// The subject under test: forwards to its service collaborator
struct HelloController {
    service: Arc<dyn Dependency>,
}

impl HelloController {
    fn spec() -> SubjectSpec {
        SubjectSpec::builder(CONTROLLER_TYPE)
            .constructor(ConstructorSpec::new(
                vec![ParamSpec::new("service", SERVICE_TYPE)],
                |deps| {
                    Ok(Box::new(HelloController {
                        service: Arc::clone(&deps[0]),
                    }))
                },
            ))
            .method("get", MethodSig::new(vec![], TypeDesc::String))
            .method(
                "greet",
                MethodSig::new(vec![TypeDesc::String], Greeting::type_desc()),
            )
            .method("quiet", MethodSig::new(vec![], TypeDesc::String))
            .method("fragile", MethodSig::new(vec![], TypeDesc::String))
            .build()
    }
}

impl Subject for HelloController {
    fn type_name(&self) -> &str {
        CONTROLLER_TYPE
    }

    fn invoke(&mut self, method: &str, args: &[DynValue]) -> Result<DynValue, Thrown> {
        let codec = Codec::new();
        match method {
            "get" => self.service.invoke(&MethodCall::new("get", vec![])),
            "greet" => {
                let name = args
                    .first()
                    .cloned()
                    .ok_or_else(|| Thrown::new("hello.MissingArgument", None))?;
                self.service.invoke(&MethodCall::new("fetch", vec![name]))
            }
            // Never touches the collaborator: the no-dependents path.
            "quiet" => codec
                .encode(&"silence".to_string())
                .map_err(|err| Thrown::from_error("hello.CodecFailure", &err)),
            "fragile" => self.service.invoke(&MethodCall::new("oops", vec![])),
            other => Err(Thrown::new("hello.NoSuchMethod", Some(other.to_string()))),
        }
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

/// Subject reaching its service through the factory collaborator
struct RelayController {
    provider: Arc<dyn Dependency>,
}

impl RelayController {
    fn spec() -> SubjectSpec {
        SubjectSpec::builder(PROVIDER_CONTROLLER_TYPE)
            .constructor(ConstructorSpec::new(
                vec![ParamSpec::new("provider", PROVIDER_TYPE)],
                |deps| {
                    Ok(Box::new(RelayController {
                        provider: Arc::clone(&deps[0]),
                    }))
                },
            ))
            .method("relay", MethodSig::new(vec![], TypeDesc::String))
            .build()
    }
}

impl Subject for RelayController {
    fn type_name(&self) -> &str {
        PROVIDER_CONTROLLER_TYPE
    }

    fn invoke(&mut self, method: &str, _args: &[DynValue]) -> Result<DynValue, Thrown> {
        match method {
            "relay" => {
                let service = self.provider.create(&MethodCall::new("open", vec![]))?;
                service.invoke(&MethodCall::new("get", vec![]))
            }
            other => Err(Thrown::new("hello.NoSuchMethod", Some(other.to_string()))),
        }
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

fn init() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
        register_portable::<Greeting>().unwrap();
        SubjectRegistry::global().register(HelloController::spec());
        SubjectRegistry::global().register(RelayController::spec());
        ExceptionRegistry::global().register(
            "hello.Unavailable",
            ExceptionSpec::new().with_message(|message| Box::new(Unavailable(message))),
        );
    });
}

fn record(
    method: &str,
    args: Vec<DynValue>,
    dir: &std::path::Path,
    with_provider: bool,
) -> Source {
    let recorder = SnapshotRecorder::new(SnapWriter::new(dir));
    let spec = if with_provider {
        RelayController::spec()
    } else {
        HelloController::spec()
    };
    let mut dependencies: BTreeMap<String, Arc<dyn Dependency>> = BTreeMap::new();
    if with_provider {
        dependencies.insert("provider".to_string(), Arc::new(LiveServiceProvider));
    } else {
        dependencies.insert("service".to_string(), Arc::new(LiveHelloService));
    }
    let _ = recorder
        .capture(&spec, &dependencies, method, args)
        .expect("recording failed");
    let entry = std::fs::read_dir(dir)
        .unwrap()
        .filter_map(Result::ok)
        .find(|entry| entry.path().extension().is_some_and(|ext| ext == "json"))
        .expect("no snapshot file written");
    Source::path(entry.path())
}

#[test]
fn scenario_a_no_arguments_one_dependent() {
    init();
    let dir = tempfile::tempdir().unwrap();
    let source = record("get", vec![], dir.path(), false);

    let snapshot = recap_core::testsupport::snap(&source).unwrap();
    assert_eq!(snapshot.dependents.len(), 1);
    assert_eq!(snapshot.dependents[0].subject_type_name, SERVICE_TYPE);
    let recorded: Option<String> = recap_core::testsupport::subj_result(&source).unwrap();
    assert_eq!(recorded.as_deref(), Some("Hello World"));

    run_snapshot_test(&source);
}

#[test]
fn scenario_b_string_argument_composite_result() {
    init();
    let dir = tempfile::tempdir().unwrap();
    let codec = Codec::new();
    let argument = codec.encode(&"Hello test".to_string()).unwrap();
    let source = record("greet", vec![argument.clone()], dir.path(), false);

    let mut harness = ReplayHarness::from_source(&source).unwrap();
    harness.configure().unwrap();

    // The programmed stand-in answers the recorded call directly.
    let stand_in = harness.stand_ins().get(SERVICE_TYPE).unwrap();
    let answer = stand_in
        .invoke(&MethodCall::new("fetch", vec![argument]))
        .unwrap();
    let greeting: Greeting = serde_json::from_value(answer.payload().clone()).unwrap();
    assert_eq!(
        greeting,
        Greeting {
            data: "Hello test".to_string()
        }
    );

    let replayed = harness.execute().unwrap();
    assert_replayed(&replayed);
    let actual = replayed.actual.unwrap();
    assert_eq!(
        actual.payload(),
        &serde_json::json!({"data": "Hello test"})
    );
}

#[test]
fn scenario_c_no_dependents_recorded() {
    init();
    let dir = tempfile::tempdir().unwrap();
    let source = record("quiet", vec![], dir.path(), false);

    let snapshot = recap_core::testsupport::snap(&source).unwrap();
    assert_eq!(snapshot.dependents.len(), 0);

    run_snapshot_test(&source);
}

#[test]
fn scenario_d_factory_chain_two_levels_deep() {
    init();
    let dir = tempfile::tempdir().unwrap();
    let source = record("relay", vec![], dir.path(), true);

    let snapshot = recap_core::testsupport::snap(&source).unwrap();
    assert_eq!(snapshot.factories.len(), 1);
    assert_eq!(snapshot.factories[0].subject_type_name, PROVIDER_TYPE);
    assert_eq!(
        snapshot.factories[0].declared_return_type,
        TypeDesc::named(SERVICE_TYPE)
    );
    assert_eq!(snapshot.dependents.len(), 1);
    assert_eq!(snapshot.dependents[0].subject_type_name, SERVICE_TYPE);

    // Replay must wire provider stand-in -> nested service stand-in.
    let mut harness = ReplayHarness::from_source(&source).unwrap();
    harness.configure().unwrap();
    let provider = harness.stand_ins().get(PROVIDER_TYPE).unwrap();
    let produced = provider.create(&MethodCall::new("open", vec![])).unwrap();
    let nested = produced.invoke(&MethodCall::new("get", vec![])).unwrap();
    assert_eq!(nested.payload(), &serde_json::json!("Hello World"));

    let replayed = harness.execute().unwrap();
    assert_replayed(&replayed);
}

#[test]
fn exception_round_trip_reproduces_type_and_message() {
    init();
    let dir = tempfile::tempdir().unwrap();
    let source = record("fragile", vec![], dir.path(), false);

    let snapshot = recap_core::testsupport::snap(&source).unwrap();
    assert_eq!(
        snapshot.main.exception_type_name.as_deref(),
        Some("hello.Unavailable")
    );
    assert_eq!(snapshot.dependents.len(), 1);
    assert_eq!(
        snapshot.dependents[0].exception_type_name.as_deref(),
        Some("hello.Unavailable")
    );

    let mut harness = ReplayHarness::from_source(&source).unwrap();
    harness.configure().unwrap();
    let replayed = harness.execute().unwrap();
    assert_replayed(&replayed);

    let thrown = replayed.actual.unwrap_err();
    assert_eq!(thrown.type_name, "hello.Unavailable");
    assert_eq!(thrown.message.as_deref(), Some("down for maintenance"));

    // The registered constructor yields a downcastable concrete instance.
    let error = materialize(&thrown);
    let concrete = error.downcast_ref::<Unavailable>().unwrap();
    assert_eq!(concrete.to_string(), "down for maintenance");
}

#[test]
fn caller_supplied_stand_ins_are_used_and_checked() {
    init();
    let dir = tempfile::tempdir().unwrap();
    let source = record("get", vec![], dir.path(), false);

    // Supplying the right stand-in works.
    let mut set = StandInSet::new();
    set.insert(recap_mock::StandIn::new(SERVICE_TYPE));
    ReplayHarness::from_source(&source)
        .unwrap()
        .with_stand_ins(set)
        .run()
        .unwrap();

    // Supplying a holder without the declared dependency is fatal.
    let err = ReplayHarness::from_source(&source)
        .unwrap()
        .with_stand_ins(StandInSet::new())
        .run()
        .unwrap_err();
    assert!(matches!(
        err,
        recap_core::RecapError::MissingStandIn { .. }
    ));
}

#[test]
fn replaying_the_same_source_twice_is_cached_and_stable() {
    init();
    let dir = tempfile::tempdir().unwrap();
    let source = record("get", vec![], dir.path(), false);

    run_snapshot_test(&source);
    // Second replay hits the snapshot cache and must behave identically.
    run_snapshot_test(&source);
}

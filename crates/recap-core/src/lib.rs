//! Recap core recording engine
//!
//! Captures one real execution of a subject call together with every call it
//! makes on its wrapped collaborators, and persists that interaction as an
//! immutable JSON snapshot. The companion `recap-mock` crate replays a
//! snapshot as a deterministic unit test.

pub mod codec;
pub mod config;
pub mod error;
pub mod intercept;
pub mod model;
pub mod recorder;
pub mod session;
pub mod source;
pub mod store;
pub mod subject;
pub mod testsupport;

// Re-export commonly used types
pub use codec::{Codec, DynValue, Portable, TypeDesc, TypeRegistry, register_portable};
pub use config::RecordConfig;
pub use error::{RecapError, RecapResult};
pub use intercept::{Dependency, Interceptor, MethodCall, MethodSig, RecordingInterceptor, Thrown};
pub use model::{FactoryInvocation, Invocation, Snapshot};
pub use recorder::SnapshotRecorder;
pub use session::InvocationStore;
pub use source::Source;
pub use store::{SnapReader, SnapWriter, SnapshotFromSource};
pub use subject::{
    ConstructorSpec, InjectionKind, ParamSpec, PropertySpec, Subject, SubjectRegistry, SubjectSpec,
    build_subject, rank_constructors,
};

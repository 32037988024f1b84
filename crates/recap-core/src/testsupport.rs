//! Cached snapshot access for tests
//!
//! Snapshots are immutable once written and comparatively expensive to
//! decode, so reads are cached process-wide by source identity: repeated
//! replay of the same snapshot in a test run pays the decode cost once.
//! The typed accessors resolve each field's effective type (runtime
//! refinement first, declared type as fallback) through the codec.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::codec::Codec;
use crate::error::{RecapError, RecapResult};
use crate::intercept::Thrown;
use crate::model::{FactoryInvocation, Invocation, Snapshot};
use crate::source::Source;
use crate::store::SnapReader;

static SNAP_CACHE: LazyLock<Mutex<HashMap<Source, Arc<Snapshot>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Read a snapshot from a source, cached by source identity
pub fn snap(source: &Source) -> RecapResult<Arc<Snapshot>> {
    if let Some(snapshot) = SNAP_CACHE.lock().get(source) {
        return Ok(Arc::clone(snapshot));
    }
    // Concurrent first reads of the same source may duplicate the decode;
    // snapshots are immutable, so last-write-wins is harmless.
    let read = SnapReader::new().read(source)?;
    debug!(source = source.name().as_str(), "Snap read");
    SNAP_CACHE
        .lock()
        .insert(source.clone(), Arc::clone(&read.snapshot));
    Ok(read.snapshot)
}

fn argument<T: DeserializeOwned>(
    invocation: &Invocation,
    arg_index: usize,
) -> RecapResult<Option<T>> {
    let payload = invocation.arguments.get(arg_index).ok_or_else(|| {
        RecapError::replay(format!(
            "Invocation of `{}.{}` has no argument at index {arg_index}",
            invocation.subject_type_name, invocation.method_name
        ))
    })?;
    Codec::new().decode_to(payload, invocation.argument_type(arg_index)?)
}

fn dependent(snapshot: &Snapshot, dep_index: usize) -> RecapResult<&Invocation> {
    snapshot.dependents.get(dep_index).ok_or_else(|| {
        RecapError::replay(format!(
            "Snapshot has no dependent invocation at index {dep_index}"
        ))
    })
}

fn factory(snapshot: &Snapshot, dep_index: usize) -> RecapResult<&FactoryInvocation> {
    snapshot.factories.get(dep_index).ok_or_else(|| {
        RecapError::replay(format!(
            "Snapshot has no factory invocation at index {dep_index}"
        ))
    })
}

/// Main invocation argument at `arg_index`
pub fn subj_arg<T: DeserializeOwned>(source: &Source, arg_index: usize) -> RecapResult<Option<T>> {
    let snapshot = snap(source)?;
    debug!(
        source = source.name().as_str(),
        arg_index, "Reading subject invocation argument"
    );
    argument(&snapshot.main, arg_index)
}

/// Main invocation result
pub fn subj_result<T: DeserializeOwned>(source: &Source) -> RecapResult<Option<T>> {
    let snapshot = snap(source)?;
    debug!(source = source.name().as_str(), "Reading subject invocation result");
    Codec::new().decode_to(&snapshot.main.result, snapshot.main.result_type())
}

/// Exception recorded for the main invocation, if it threw
pub fn subj_thrown(source: &Source) -> RecapResult<Option<Thrown>> {
    let snapshot = snap(source)?;
    Ok(snapshot
        .main
        .exception_type_name
        .as_ref()
        .map(|type_name| Thrown::new(type_name.clone(), snapshot.main.exception_message.clone())))
}

/// Dependent invocation argument at `arg_index` of dependent `dep_index`
pub fn dep_arg<T: DeserializeOwned>(
    source: &Source,
    dep_index: usize,
    arg_index: usize,
) -> RecapResult<Option<T>> {
    let snapshot = snap(source)?;
    debug!(
        source = source.name().as_str(),
        dep_index, arg_index, "Reading dependency invocation argument"
    );
    argument(dependent(&snapshot, dep_index)?, arg_index)
}

/// Dependent invocation result of dependent `dep_index`
pub fn dep_result<T: DeserializeOwned>(source: &Source, dep_index: usize) -> RecapResult<Option<T>> {
    let snapshot = snap(source)?;
    let invocation = dependent(&snapshot, dep_index)?;
    debug!(
        source = source.name().as_str(),
        dep_index, "Reading dependency invocation result"
    );
    Codec::new().decode_to(&invocation.result, invocation.result_type())
}

/// Exception recorded for dependent `dep_index`, if it threw
pub fn dep_thrown(source: &Source, dep_index: usize) -> RecapResult<Option<Thrown>> {
    let snapshot = snap(source)?;
    let invocation = dependent(&snapshot, dep_index)?;
    Ok(invocation
        .exception_type_name
        .as_ref()
        .map(|type_name| Thrown::new(type_name.clone(), invocation.exception_message.clone())))
}

/// Factory invocation argument at `arg_index` of factory `dep_index`
pub fn fact_arg<T: DeserializeOwned>(
    source: &Source,
    dep_index: usize,
    arg_index: usize,
) -> RecapResult<Option<T>> {
    let snapshot = snap(source)?;
    let invocation = factory(&snapshot, dep_index)?;
    let payload = invocation.arguments.get(arg_index).ok_or_else(|| {
        RecapError::replay(format!(
            "Factory invocation of `{}.{}` has no argument at index {arg_index}",
            invocation.subject_type_name, invocation.method_name
        ))
    })?;
    debug!(
        source = source.name().as_str(),
        dep_index, arg_index, "Reading factory invocation argument"
    );
    Codec::new().decode_to(payload, invocation.argument_type(arg_index)?)
}

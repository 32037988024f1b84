//! Invocation recording session
//!
//! Pure bookkeeping for one logical execution: buffers of dependent and
//! factory invocations with a start/stop/reset lifecycle. Buffers are keyed
//! by execution context (the recording thread), so concurrent executions
//! never interleave their events. `record` outside the recording state is a
//! deliberate no-op: calls that happen before `start()` or after `stop()`
//! must not pollute the snapshot.

use std::thread::{self, ThreadId};

use dashmap::DashMap;

use crate::model::{FactoryInvocation, Invocation};

#[derive(Debug, Default)]
struct ContextBuffers {
    recording: bool,
    dependents: Vec<Invocation>,
    factories: Vec<FactoryInvocation>,
}

/// Execution-context-local storage for recorded dependency invocations
///
/// One store instance is shared by the recorder and every recording proxy;
/// all methods act on the calling context's buffers only. Within one context
/// buffer order equals call order. `start`/`stop` do not clear buffers (one
/// logical invocation may span several instrumented segments); only `reset`
/// does.
#[derive(Debug, Default)]
pub struct InvocationStore {
    contexts: DashMap<ThreadId, ContextBuffers>,
}

impl InvocationStore {
    /// Create an empty store
    pub fn new() -> Self {
        InvocationStore {
            contexts: DashMap::new(),
        }
    }

    /// Start recording in the current execution context
    pub fn start(&self) {
        self.contexts.entry(thread::current().id()).or_default().recording = true;
    }

    /// Stop recording in the current execution context, keeping buffers
    pub fn stop(&self) {
        if let Some(mut buffers) = self.contexts.get_mut(&thread::current().id()) {
            buffers.recording = false;
        }
    }

    /// Whether the current execution context is recording
    pub fn is_recording(&self) -> bool {
        self.contexts
            .get(&thread::current().id())
            .map(|buffers| buffers.recording)
            .unwrap_or(false)
    }

    /// Record a dependent invocation; no-op unless recording
    pub fn record_dependent(&self, invocation: Invocation) {
        if let Some(mut buffers) = self.contexts.get_mut(&thread::current().id()) {
            if buffers.recording {
                buffers.dependents.push(invocation);
            }
        }
    }

    /// Record a factory invocation; no-op unless recording
    pub fn record_factory(&self, invocation: FactoryInvocation) {
        if let Some(mut buffers) = self.contexts.get_mut(&thread::current().id()) {
            if buffers.recording {
                buffers.factories.push(invocation);
            }
        }
    }

    /// Buffered dependent invocations of the current context, in call order
    pub fn dependents(&self) -> Vec<Invocation> {
        self.contexts
            .get(&thread::current().id())
            .map(|buffers| buffers.dependents.clone())
            .unwrap_or_default()
    }

    /// Buffered factory invocations of the current context, in call order
    pub fn factories(&self) -> Vec<FactoryInvocation> {
        self.contexts
            .get(&thread::current().id())
            .map(|buffers| buffers.factories.clone())
            .unwrap_or_default()
    }

    /// Discard the current context's buffers and force it idle
    pub fn reset(&self) {
        self.contexts.remove(&thread::current().id());
    }
}

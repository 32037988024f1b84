//! Recap replay engine
//!
//! Replays a recorded snapshot as a deterministic, isolated unit test: the
//! subject is reconstructed from its registered spec, its collaborators are
//! replaced with programmable stand-ins answering only the exact recorded
//! calls, and the recorded result or exception is asserted against the live
//! outcome.

pub mod exceptions;
pub mod harness;
pub mod standin;

// Re-export commonly used types
pub use exceptions::{BoxedError, ExceptionRegistry, ExceptionSpec, SyntheticException, materialize};
pub use harness::{Expectation, Replayed, ReplayHarness, assert_replayed, run_snapshot_test};
pub use standin::{StandIn, StandInSet, UNMATCHED_CALL};

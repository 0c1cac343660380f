//! Source instrumentation for coverage-guided candidate selection.
//!
//! [`Instrumenter::instrument`] rewrites one Rust source unit so the target
//! function reports its own execution path, and suffixes the unit's
//! top-level items so the rewritten copy can be compiled next to the
//! pristine original. Calls to mocked callees inside the target can be
//! routed through the runtime's stand-in queue with
//! [`Instrumenter::instrument_with_mocks`]. [`signature`] extracts the target's parameter shapes
//! and the unit's type table for value synthesis.

mod probe;
mod rename;
pub mod rewrite;
pub mod signature;
mod stand_in;

pub use rewrite::{InstrumentError, Instrumented, Instrumenter, TargetPath};
pub use signature::{collect_types, describe_type, extract_signature, ParamSpec, Passing, TargetSignature};

/// Name of the recorder local inserted at function entry.
pub const RECORDER_IDENT: &str = "__lantern_rec";

/// Name of the local capturing the spawning candidate for background tasks.
pub const CANDIDATE_IDENT: &str = "__lantern_cand";

//! Support code linked into a compiled candidate suite.
//!
//! Instrumented functions create a [`PathRecorder`] on entry; its `Drop`
//! pushes one coverage event onto the feedback channel. [`run_suite`]
//! executes all candidates in parallel, selects survivors and prints the
//! wire records the orchestrator parses. [`mock`] holds the return
//! stand-ins candidates queue for mocked callees.

pub mod feedback;
pub mod harness;
pub mod mock;
pub mod panic_capture;
pub mod recorder;

pub use harness::{current_candidate, run_suite, Candidate, HarnessError, SuiteConfig, SuiteReport};
pub use recorder::{PathRecorder, TaskOrigin};

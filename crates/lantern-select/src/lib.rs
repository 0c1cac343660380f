//! Feedback aggregation and corpus selection.
//!
//! The [`Selector`] is the sole consumer of the coverage channel. It keeps,
//! per function identity, the first execution of every distinct path
//! signature plus every failed execution, and assembles them into a
//! size-bounded suite.

pub mod collect;
pub mod corpus;

pub use collect::{CollectStats, Selector, StopReason, DEFAULT_WINDOW};
pub use corpus::{Corpus, CorpusEntry, CorpusSet, Verdict};

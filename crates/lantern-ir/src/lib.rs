//! Shared data model for the lantern test generator: type descriptors,
//! coverage events, the stdout wire format and the suite handoff.

pub mod event;
pub mod handoff;
pub mod parse;
pub mod types;
pub mod wire;

pub use event::{CoverageEvent, FailureDetail, FunctionIdentity, PathSignature, ProbeSite};
pub use handoff::{CandidateSource, SuiteHandoff};
pub use parse::{parse_type_table, ParseError};
pub use types::{FieldDescriptor, KnownInterface, PrimitiveKind, TypeDescriptor, TypeError, TypeTable};
pub use wire::WireRecord;

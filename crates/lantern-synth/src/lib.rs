//! Value synthesis, mutation and rendering for generated candidates, plus
//! the namespace manager that keeps their imports collision-free.

pub mod context;
pub mod namespace;
pub mod render;
pub mod rng;
pub mod synthesize;
pub mod value;

pub use context::{InjectorEntry, InjectorTable, SynthConfig, SynthConfigError, SynthesisContext};
pub use namespace::{Binding, ImportBinding, NamespaceManager};
pub use render::{render, render_list};
pub use rng::candidate_rng;
pub use synthesize::{SynthError, Synthesizer};
pub use value::{InterfaceValue, Value};

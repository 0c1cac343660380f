//! Synthesis configuration, per-call context and the injector table.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Tunables for value synthesis and mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthConfig {
    /// Hard cap on struct-field nesting.
    pub max_depth: u32,
    /// Cap on `Named` resolutions along one branch, so shapes that loop
    /// without passing through a struct still terminate.
    pub max_named_hops: u32,
    /// Chance a nullable pointer is synthesized as `None`.
    pub nil_probability: f64,
    /// Integers are drawn / perturbed within `±int_delta`.
    pub int_delta: i64,
    /// Floats are drawn / perturbed within `±float_delta`.
    pub float_delta: f64,
    pub max_string_len: usize,
    pub bool_flip_probability: f64,
    /// Chance each existing collection element is mutated.
    pub element_mutate_probability: f64,
    /// Chance a fresh element is appended to a collection.
    pub append_probability: f64,
    /// Upper bound on elements synthesized into an empty collection.
    pub max_fresh_elements: usize,
    /// Upper bound on return stand-ins synthesized per mocked callee.
    pub max_mock_returns: usize,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            max_depth: 10,
            max_named_hops: 64,
            nil_probability: 0.2,
            int_delta: 100,
            float_delta: 10.0,
            max_string_len: 8,
            bool_flip_probability: 0.5,
            element_mutate_probability: 0.5,
            append_probability: 0.3,
            max_fresh_elements: 1,
            max_mock_returns: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SynthConfigError {
    #[error("{field} must lie in [0, 1], got {value}")]
    Probability { field: &'static str, value: f64 },
}

impl SynthConfig {
    /// Reject probabilities outside `[0, 1]`.
    pub fn validate(&self) -> Result<(), SynthConfigError> {
        let probabilities = [
            ("nil_probability", self.nil_probability),
            ("bool_flip_probability", self.bool_flip_probability),
            ("element_mutate_probability", self.element_mutate_probability),
            ("append_probability", self.append_probability),
        ];
        for (field, value) in probabilities {
            if !(0.0..=1.0).contains(&value) {
                return Err(SynthConfigError::Probability { field, value });
            }
        }
        Ok(())
    }
}

/// A caller-supplied value for one type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InjectorEntry {
    /// Sample value, kept for reporting.
    #[serde(default)]
    pub sample: serde_json::Value,
    /// Source literal emitted verbatim.
    pub literal: String,
    /// Item paths the literal needs in scope.
    #[serde(default)]
    pub imports: Vec<String>,
}

impl InjectorEntry {
    pub fn literal(literal: impl Into<String>) -> Self {
        Self {
            sample: serde_json::Value::Null,
            literal: literal.into(),
            imports: Vec::new(),
        }
    }
}

/// Overrides keyed by exact type name, consulted before generic synthesis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InjectorTable {
    entries: BTreeMap<String, Vec<InjectorEntry>>,
}

static EMPTY_INJECTORS: InjectorTable = InjectorTable {
    entries: BTreeMap::new(),
};

impl InjectorTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// A shared table with no overrides.
    pub fn empty() -> &'static InjectorTable {
        &EMPTY_INJECTORS
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn insert(&mut self, type_name: impl Into<String>, entry: InjectorEntry) {
        self.entries.entry(type_name.into()).or_default().push(entry);
    }

    pub fn lookup(&self, type_name: &str) -> Option<&[InjectorEntry]> {
        self.entries
            .get(type_name)
            .map(Vec::as_slice)
            .filter(|entries| !entries.is_empty())
    }

    /// Copy with keys renamed through `names`; unmapped keys are kept.
    pub fn renamed(&self, names: &BTreeMap<String, String>) -> Self {
        let entries = self
            .entries
            .iter()
            .map(|(name, entries)| {
                let name = names.get(name).unwrap_or(name);
                (name.clone(), entries.clone())
            })
            .collect();
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Per-call synthesis state, copied on every descent.
#[derive(Debug, Clone, Copy)]
pub struct SynthesisContext<'a> {
    /// Struct-field nesting depth.
    pub depth: u32,
    /// `Named` resolutions taken so far.
    pub hops: u32,
    /// Whether nullable pointers may come out as `None`.
    pub may_be_nil: bool,
    pub injectors: &'a InjectorTable,
}

impl<'a> SynthesisContext<'a> {
    pub fn new(injectors: &'a InjectorTable) -> Self {
        Self {
            depth: 0,
            hops: 0,
            may_be_nil: true,
            injectors,
        }
    }

    pub fn with_nil(self, may_be_nil: bool) -> Self {
        Self { may_be_nil, ..self }
    }

    /// Context for a struct field one level down.
    pub fn descend(self) -> Self {
        Self {
            depth: self.depth + 1,
            ..self
        }
    }

    pub(crate) fn hop(self) -> Self {
        Self {
            hops: self.hops + 1,
            ..self
        }
    }
}

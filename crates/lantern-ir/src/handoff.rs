//! Exchange format between the compiled suite and the orchestrator.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One generated candidate as source text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateSource {
    pub index: usize,
    /// Statement-level fragment exercising the target (valid Rust).
    pub fragment: String,
    /// Number of synthesized return stand-ins per mocked callee.
    #[serde(default)]
    pub mock_calls: BTreeMap<String, usize>,
}

/// Retained candidates per function, handed to the suite renderer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SuiteHandoff {
    /// Function full name -> retained fragments in discovery order.
    pub functions: BTreeMap<String, Vec<String>>,
    /// Function full name -> mocked callee -> call count, summed over the
    /// retained fragments.
    pub mock_calls: BTreeMap<String, BTreeMap<String, usize>>,
}

impl SuiteHandoff {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn fragment_count(&self) -> usize {
        self.functions.values().map(Vec::len).sum()
    }
}

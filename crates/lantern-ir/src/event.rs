//! Coverage feedback produced by instrumented executions.
//!
//! One [`CoverageEvent`] is emitted per path recorder per execution and
//! consumed exactly once by the selector.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Id of one instrumentable location, unique within a rewritten file.
pub type ProbeSite = u32;

/// Coverage ratio reported for an execution that panicked.
pub const FAILED_RATIO: f64 = -1.0;

/// Which function a recorder reports for.
///
/// Each task spawned inside a function body is tracked under its own
/// decorated identity (`task = Some(n)`, numbered in source order),
/// distinct from the direct one and from its sibling tasks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FunctionIdentity {
    pub name: String,
    #[serde(default)]
    pub receiver: Option<String>,
    #[serde(default)]
    pub task: Option<u32>,
}

impl FunctionIdentity {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            receiver: None,
            task: None,
        }
    }

    pub fn method(receiver: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            receiver: Some(receiver.into()),
            task: None,
        }
    }

    /// The decorated identity for the `index`-th task spawned from this
    /// function.
    pub fn as_task(&self, index: u32) -> Self {
        Self {
            task: Some(index),
            ..self.clone()
        }
    }

    pub fn is_background(&self) -> bool {
        self.task.is_some()
    }

    /// `Receiver::name` or `name`, suffixed with `$task<n>` for background
    /// identities.
    pub fn full_name(&self) -> String {
        let base = match &self.receiver {
            Some(receiver) => format!("{receiver}::{}", self.name),
            None => self.name.clone(),
        };
        match self.task {
            Some(index) => format!("{base}$task{index}"),
            None => base,
        }
    }
}

impl fmt::Display for FunctionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name())
    }
}

/// Canonical form of the set of probes hit during one execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PathSignature(String);

impl PathSignature {
    /// Flatten a `probe -> hit count` map; sites with a zero count are
    /// not part of the path.
    pub fn from_hits(hits: &BTreeMap<ProbeSite, u32>) -> Self {
        Self::from_sites(
            hits.iter()
                .filter(|(_, count)| **count > 0)
                .map(|(site, _)| *site),
        )
    }

    pub fn from_sites<I: IntoIterator<Item = ProbeSite>>(sites: I) -> Self {
        let mut sites: Vec<ProbeSite> = sites.into_iter().collect();
        sites.sort_unstable();
        sites.dedup();
        let joined = sites
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(",");
        PathSignature(joined)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The probe ids making up this path, ascending.
    pub fn sites(&self) -> Vec<ProbeSite> {
        self.0
            .split(',')
            .filter(|s| !s.is_empty())
            .filter_map(|s| s.parse().ok())
            .collect()
    }
}

impl fmt::Display for PathSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0)
    }
}

/// Panic details attached to a failed execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FailureDetail {
    pub message: String,
    pub stack: String,
}

/// One execution's coverage report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageEvent {
    pub identity: FunctionIdentity,
    pub file: String,
    /// Candidate that produced the execution, when known.
    pub candidate: Option<usize>,
    pub signature: PathSignature,
    pub hit_probes: u32,
    pub total_probes: u32,
    /// `hit / total`, or [`FAILED_RATIO`] for a panicked execution.
    pub ratio: f64,
    pub failed: bool,
    pub failure: Option<FailureDetail>,
}

impl CoverageEvent {
    pub fn completed(
        identity: FunctionIdentity,
        file: impl Into<String>,
        candidate: Option<usize>,
        hits: &BTreeMap<ProbeSite, u32>,
        total_probes: u32,
    ) -> Self {
        let signature = PathSignature::from_hits(hits);
        let hit_probes = signature.sites().len() as u32;
        Self {
            identity,
            file: file.into(),
            candidate,
            signature,
            hit_probes,
            total_probes,
            ratio: coverage_ratio(hit_probes, total_probes),
            failed: false,
            failure: None,
        }
    }

    pub fn failed(
        identity: FunctionIdentity,
        file: impl Into<String>,
        candidate: Option<usize>,
        hits: &BTreeMap<ProbeSite, u32>,
        total_probes: u32,
        failure: FailureDetail,
    ) -> Self {
        let mut event = Self::completed(identity, file, candidate, hits, total_probes);
        event.ratio = FAILED_RATIO;
        event.failed = true;
        event.failure = Some(failure);
        event
    }
}

/// Fraction of probes hit. A function without probes is fully covered
/// as soon as it runs.
pub fn coverage_ratio(hit: u32, total: u32) -> f64 {
    if total == 0 {
        1.0
    } else {
        hit as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_ignores_order_and_duplicates() {
        let a = PathSignature::from_sites([7, 3, 3, 0]);
        let b = PathSignature::from_sites([0, 7, 3]);
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "0,3,7");
        assert_eq!(a.sites(), vec![0, 3, 7]);
    }

    #[test]
    fn test_signature_skips_zero_counts() {
        let mut hits = BTreeMap::new();
        hits.insert(4, 2);
        hits.insert(1, 0);
        assert_eq!(PathSignature::from_hits(&hits).as_str(), "4");
    }

    #[test]
    fn test_empty_signature() {
        let sig = PathSignature::from_sites(Vec::new());
        assert!(sig.is_empty());
        assert!(sig.sites().is_empty());
    }

    #[test]
    fn test_full_name() {
        assert_eq!(FunctionIdentity::new("parse").full_name(), "parse");
        let method = FunctionIdentity::method("Parser", "next");
        assert_eq!(method.full_name(), "Parser::next");
        assert_eq!(method.as_task(0).full_name(), "Parser::next$task0");
        assert_ne!(method, method.as_task(0));
        assert_ne!(method.as_task(0), method.as_task(1));
        assert!(method.as_task(1).is_background());
        assert!(!method.is_background());
    }

    #[test]
    fn test_failed_event_uses_sentinel_ratio() {
        let mut hits = BTreeMap::new();
        hits.insert(0, 1);
        let event = CoverageEvent::failed(
            FunctionIdentity::new("f"),
            "lib.rs",
            Some(2),
            &hits,
            4,
            FailureDetail {
                message: "boom".into(),
                stack: String::new(),
            },
        );
        assert!(event.failed);
        assert_eq!(event.ratio, FAILED_RATIO);
        assert_eq!(event.hit_probes, 1);
    }

    #[test]
    fn test_ratio_without_probes() {
        assert_eq!(coverage_ratio(0, 0), 1.0);
        assert_eq!(coverage_ratio(1, 4), 0.25);
    }
}

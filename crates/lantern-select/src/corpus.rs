//! Per-identity corpora and final suite assembly.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use lantern_ir::{
    CandidateSource, CoverageEvent, FailureDetail, FunctionIdentity, PathSignature, ProbeSite,
    SuiteHandoff,
};
use serde::Serialize;

/// What the selector decided for one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Verdict {
    /// First sighting of its path signature.
    Novel,
    /// Signature already seen; the execution ran but is dropped.
    Duplicate,
    /// Panicked execution; always retained.
    Failure,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CorpusEntry {
    pub candidate: Option<usize>,
    pub signature: PathSignature,
    /// First execution to produce `signature`.
    pub alive: bool,
    pub failed: bool,
    pub failure: Option<FailureDetail>,
    pub ratio: f64,
}

impl CorpusEntry {
    pub fn retained(&self) -> bool {
        self.alive || self.failed
    }
}

/// Everything observed for one function identity, in discovery order.
#[derive(Debug, Clone)]
pub struct Corpus {
    identity: FunctionIdentity,
    /// Source file of the instrumented function.
    file: String,
    entries: Vec<CorpusEntry>,
    seen: HashSet<PathSignature>,
    /// Probes hit by any retained entry; only ever grows.
    covered: BTreeSet<ProbeSite>,
    total_probes: u32,
}

impl Corpus {
    pub fn new(identity: FunctionIdentity) -> Self {
        Self {
            identity,
            file: String::new(),
            entries: Vec::new(),
            seen: HashSet::new(),
            covered: BTreeSet::new(),
            total_probes: 0,
        }
    }

    pub fn identity(&self) -> &FunctionIdentity {
        &self.identity
    }

    pub fn record(&mut self, event: CoverageEvent) -> Verdict {
        if self.file.is_empty() {
            self.file = event.file.clone();
        }
        let novel = self.seen.insert(event.signature.clone());
        self.total_probes = self.total_probes.max(event.total_probes);
        if novel || event.failed {
            self.covered.extend(event.signature.sites());
        }

        let verdict = match (event.failed, novel) {
            (true, _) => Verdict::Failure,
            (false, true) => Verdict::Novel,
            (false, false) => Verdict::Duplicate,
        };
        self.entries.push(CorpusEntry {
            candidate: event.candidate,
            signature: event.signature,
            alive: novel,
            failed: event.failed,
            failure: event.failure,
            ratio: event.ratio,
        });
        verdict
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    pub fn entries(&self) -> &[CorpusEntry] {
        &self.entries
    }

    pub fn alive_count(&self) -> usize {
        self.entries.iter().filter(|e| e.alive).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &CorpusEntry> {
        self.entries.iter().filter(|e| e.failed)
    }

    pub fn covered(&self) -> &BTreeSet<ProbeSite> {
        &self.covered
    }

    pub fn total_probes(&self) -> u32 {
        self.total_probes
    }

    /// Cumulative probe coverage over retained entries.
    pub fn coverage_ratio(&self) -> f64 {
        lantern_ir::event::coverage_ratio(self.covered.len() as u32, self.total_probes)
    }

    /// Retained entries in discovery order: every failure, plus alive
    /// entries up to `max_suite_size`.
    pub fn assemble(&self, max_suite_size: usize) -> Vec<&CorpusEntry> {
        let mut kept = 0usize;
        self.entries
            .iter()
            .filter(|entry| {
                if entry.failed {
                    return true;
                }
                if entry.alive && kept < max_suite_size {
                    kept += 1;
                    return true;
                }
                false
            })
            .collect()
    }
}

/// All corpora of one collection run, keyed by identity.
#[derive(Debug, Clone, Default)]
pub struct CorpusSet {
    corpora: BTreeMap<FunctionIdentity, Corpus>,
}

impl CorpusSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, event: CoverageEvent) -> Verdict {
        self.corpora
            .entry(event.identity.clone())
            .or_insert_with(|| Corpus::new(event.identity.clone()))
            .record(event)
    }

    pub fn get(&self, identity: &FunctionIdentity) -> Option<&Corpus> {
        self.corpora.get(identity)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Corpus> {
        self.corpora.values()
    }

    pub fn len(&self) -> usize {
        self.corpora.len()
    }

    pub fn is_empty(&self) -> bool {
        self.corpora.is_empty()
    }

    /// `(total probes, covered probes)` summed over every identity.
    pub fn coverage_totals(&self) -> (u32, u32) {
        self.corpora.values().fold((0, 0), |(total, hit), corpus| {
            (
                total + corpus.total_probes(),
                hit + corpus.covered().len() as u32,
            )
        })
    }

    /// Full name -> retained entries.
    pub fn assemble(&self, max_suite_size: usize) -> BTreeMap<String, Vec<&CorpusEntry>> {
        self.corpora
            .values()
            .map(|c| (c.identity().full_name(), c.assemble(max_suite_size)))
            .collect()
    }

    /// Map retained entries back to their candidate source for the suite
    /// renderer. Entries without a known candidate are dropped.
    pub fn handoff(&self, candidates: &[CandidateSource], max_suite_size: usize) -> SuiteHandoff {
        let by_index: BTreeMap<usize, &CandidateSource> =
            candidates.iter().map(|c| (c.index, c)).collect();

        let mut handoff = SuiteHandoff::default();
        for (name, entries) in self.assemble(max_suite_size) {
            let mut fragments = Vec::new();
            let mut mock_calls: BTreeMap<String, usize> = BTreeMap::new();
            for entry in entries {
                let Some(source) = entry.candidate.and_then(|i| by_index.get(&i)) else {
                    continue;
                };
                if fragments.contains(&source.fragment) {
                    continue;
                }
                fragments.push(source.fragment.clone());
                for (callee, count) in &source.mock_calls {
                    *mock_calls.entry(callee.clone()).or_default() += count;
                }
            }
            if !mock_calls.is_empty() {
                handoff.mock_calls.insert(name.clone(), mock_calls);
            }
            handoff.functions.insert(name, fragments);
        }
        handoff
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(candidate: usize, sites: &[ProbeSite], failed: bool) -> CoverageEvent {
        let hits: BTreeMap<ProbeSite, u32> = sites.iter().map(|s| (*s, 1)).collect();
        let identity = FunctionIdentity::new("f");
        if failed {
            CoverageEvent::failed(
                identity,
                "f.rs",
                Some(candidate),
                &hits,
                4,
                FailureDetail {
                    message: "boom".into(),
                    stack: String::new(),
                },
            )
        } else {
            CoverageEvent::completed(identity, "f.rs", Some(candidate), &hits, 4)
        }
    }

    #[test]
    fn test_coverage_is_monotonic() {
        let mut corpus = Corpus::new(FunctionIdentity::new("f"));
        corpus.record(event(0, &[0, 1], false));
        corpus.record(event(1, &[2], false));
        corpus.record(event(2, &[0, 1], false));
        assert_eq!(corpus.covered().len(), 3);
        assert!((corpus.coverage_ratio() - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_cap_applies_to_alive_only() {
        let mut corpus = Corpus::new(FunctionIdentity::new("f"));
        corpus.record(event(0, &[0], false));
        corpus.record(event(1, &[1], false));
        corpus.record(event(2, &[1], true));
        corpus.record(event(3, &[2], false));
        let kept: Vec<Option<usize>> = corpus.assemble(1).iter().map(|e| e.candidate).collect();
        assert_eq!(kept, vec![Some(0), Some(2)]);
    }
}

//! Parallel candidate execution inside the compiled suite.

use std::cell::Cell;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel;
use lantern_ir::{CandidateSource, SuiteHandoff, WireRecord};
use lantern_select::{CollectStats, CorpusSet, Selector};
use rayon::prelude::*;

use crate::{feedback, mock, panic_capture};

/// Channel slots per candidate; one candidate may drive several recorders.
const EVENTS_PER_CANDIDATE: usize = 16;

thread_local! {
    static CURRENT: Cell<Option<usize>> = const { Cell::new(None) };
}

/// Candidate running on this thread, if any.
pub fn current_candidate() -> Option<usize> {
    CURRENT.with(Cell::get)
}

#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("failed to write suite handoff: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode suite handoff: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct SuiteConfig {
    pub collect_window: Duration,
    pub max_suite_size: usize,
    /// Where the [`SuiteHandoff`] JSON is written.
    pub handoff_path: Option<PathBuf>,
    /// Print wire records to stdout.
    pub print_records: bool,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            collect_window: lantern_select::DEFAULT_WINDOW,
            max_suite_size: 8,
            handoff_path: None,
            print_records: true,
        }
    }
}

type CandidateFn = Box<dyn Fn() + Send + Sync>;

/// One generated test case.
pub struct Candidate {
    index: usize,
    fragment: String,
    mock_calls: Vec<(String, usize)>,
    run: CandidateFn,
}

impl Candidate {
    pub fn new(
        index: usize,
        fragment: impl Into<String>,
        run: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        Self {
            index,
            fragment: fragment.into(),
            mock_calls: Vec::new(),
            run: Box::new(run),
        }
    }

    /// Record how many return stand-ins each mocked callee received.
    pub fn with_mocks(mut self, mocks: &[(&str, usize)]) -> Self {
        self.mock_calls = mocks.iter().map(|(n, c)| (n.to_string(), *c)).collect();
        self
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn source(&self) -> CandidateSource {
        CandidateSource {
            index: self.index,
            fragment: self.fragment.clone(),
            mock_calls: self.mock_calls.iter().cloned().collect(),
        }
    }

    /// Run with the panic boundary in place. Returns whether it passed.
    fn execute(&self) -> bool {
        let previous = CURRENT.with(|c| c.replace(Some(self.index)));
        panic_capture::clear();
        mock::clear();
        let passed = panic::catch_unwind(AssertUnwindSafe(|| (self.run)())).is_ok();
        mock::clear();
        CURRENT.with(|c| c.set(previous));
        passed
    }
}

/// Outcome of one suite run.
#[derive(Debug)]
pub struct SuiteReport {
    pub corpora: CorpusSet,
    pub stats: CollectStats,
    pub handoff: SuiteHandoff,
    pub records: Vec<WireRecord>,
    pub passed: u32,
    pub failed: u32,
}

/// Execute every candidate in parallel, select survivors and report.
///
/// Candidates still running when the collection window closes are not
/// waited for and contribute nothing.
pub fn run_suite(config: SuiteConfig, candidates: Vec<Candidate>) -> Result<SuiteReport, HarnessError> {
    panic_capture::install();
    let sources: Vec<CandidateSource> = candidates.iter().map(Candidate::source).collect();

    let (tx, rx) = channel::bounded(candidates.len().max(1) * EVENTS_PER_CANDIDATE);
    let (done_tx, done_rx) = channel::unbounded::<bool>();
    let generation = feedback::connect(tx);

    let started = Instant::now();
    thread::Builder::new()
        .name("lantern-runner".into())
        .spawn(move || {
            candidates.par_iter().for_each(|candidate| {
                let _ = done_tx.send(candidate.execute());
            });
            feedback::release(generation);
        })?;

    let mut selector = Selector::new();
    selector.collect(&rx, config.collect_window);
    feedback::release(generation);

    let (mut passed, mut failed) = (0u32, 0u32);
    for ok in done_rx.try_iter() {
        if ok {
            passed += 1;
        } else {
            failed += 1;
        }
    }
    let elapsed_secs = started.elapsed().as_secs_f64();

    let stats = selector.stats().clone();
    let corpora = selector.into_corpora();
    let records = wire_records(&corpora, passed, failed, elapsed_secs);
    if config.print_records {
        for record in &records {
            println!("{record}");
        }
    }

    let handoff = corpora.handoff(&sources, config.max_suite_size);
    if let Some(path) = &config.handoff_path {
        fs::write(path, handoff.to_json()?)?;
        log::info!("wrote suite handoff to {}", path.display());
    }

    Ok(SuiteReport {
        corpora,
        stats,
        handoff,
        records,
        passed,
        failed,
    })
}

fn wire_records(corpora: &CorpusSet, passed: u32, failed: u32, elapsed_secs: f64) -> Vec<WireRecord> {
    let (total, hit) = corpora.coverage_totals();
    let mut records = vec![WireRecord::Coverage { total, hit }];
    for corpus in corpora.iter() {
        for entry in corpus.failures() {
            let detail = entry.failure.clone().unwrap_or_default();
            records.push(WireRecord::Panic {
                function: corpus.identity().full_name(),
                file: corpus.file().to_string(),
                message: detail.message,
                stack: detail.stack,
            });
        }
    }
    records.push(WireRecord::CoverResult {
        passed,
        failed,
        elapsed_secs,
    });
    records
}

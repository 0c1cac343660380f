//! Draining the coverage channel under a wall-clock deadline.
//!
//! Candidates run in parallel and the selector cannot know which report is
//! the last one, so collection ends at whichever comes first: every sender
//! disconnected, or the window elapsed. Hitting the deadline is the normal
//! way out, not an error; reports still in flight are simply not counted.

use std::time::{Duration, Instant};

use crossbeam::channel::{self, select, Receiver};
use lantern_ir::CoverageEvent;
use serde::Serialize;

use crate::corpus::{CorpusSet, Verdict};

/// Default collection window.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(3);

/// Why a collection run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StopReason {
    Disconnected,
    Deadline,
}

/// Counters for one collection run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CollectStats {
    pub received: usize,
    pub novel: usize,
    pub duplicates: usize,
    pub failures: usize,
    /// Events still buffered when the deadline fired.
    pub unread: usize,
    pub stopped: Option<StopReason>,
    pub elapsed_secs: f64,
}

/// Sole consumer of the coverage channel.
#[derive(Debug, Default)]
pub struct Selector {
    corpora: CorpusSet,
    stats: CollectStats,
}

enum Step {
    Event(CoverageEvent),
    Closed,
    Deadline,
}

impl Selector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one event into its identity's corpus.
    pub fn observe(&mut self, event: CoverageEvent) -> Verdict {
        let identity = event.identity.full_name();
        let signature = event.signature.clone();
        let verdict = self.corpora.record(event);
        self.stats.received += 1;
        match verdict {
            Verdict::Novel => self.stats.novel += 1,
            Verdict::Duplicate => self.stats.duplicates += 1,
            Verdict::Failure => self.stats.failures += 1,
        }
        log::debug!("{identity} {signature}: {verdict:?}");
        verdict
    }

    /// Drain `rx` until it disconnects or `window` elapses.
    pub fn collect(&mut self, rx: &Receiver<CoverageEvent>, window: Duration) -> &CollectStats {
        let started = Instant::now();
        let timer = channel::at(started + window);

        let reason = loop {
            let step = select! {
                recv(rx) -> msg => match msg {
                    Ok(event) => Step::Event(event),
                    Err(_) => Step::Closed,
                },
                recv(timer) -> _ => Step::Deadline,
            };
            match step {
                Step::Event(event) => {
                    self.observe(event);
                }
                Step::Closed => break StopReason::Disconnected,
                Step::Deadline => {
                    self.stats.unread = rx.len();
                    break StopReason::Deadline;
                }
            }
        };

        self.stats.stopped = Some(reason);
        self.stats.elapsed_secs = started.elapsed().as_secs_f64();
        log::info!(
            "collected {} events ({} novel, {} duplicate, {} failed), stopped on {reason:?}",
            self.stats.received,
            self.stats.novel,
            self.stats.duplicates,
            self.stats.failures
        );
        if self.stats.unread > 0 {
            log::warn!("{} events arrived after the deadline", self.stats.unread);
        }
        &self.stats
    }

    pub fn corpora(&self) -> &CorpusSet {
        &self.corpora
    }

    pub fn stats(&self) -> &CollectStats {
        &self.stats
    }

    pub fn into_corpora(self) -> CorpusSet {
        self.corpora
    }
}

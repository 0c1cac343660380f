//! Per-execution path recorder.

use std::backtrace::Backtrace;
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};
use std::thread;

use lantern_ir::{CoverageEvent, FailureDetail, FunctionIdentity, ProbeSite};

use crate::{feedback, harness, panic_capture};

/// Collects the probes hit by one execution of an instrumented body and
/// reports them when dropped.
///
/// The hit map sits behind a mutex so borrowing closures that run on other
/// threads can share the recorder.
#[derive(Debug)]
pub struct PathRecorder {
    identity: FunctionIdentity,
    file: &'static str,
    total: u32,
    candidate: Option<usize>,
    hits: Mutex<BTreeMap<ProbeSite, u32>>,
}

impl PathRecorder {
    /// Recorder for a direct call, attributed to the candidate running on
    /// this thread.
    pub fn enter(
        name: &'static str,
        receiver: Option<&'static str>,
        file: &'static str,
        total: u32,
    ) -> Self {
        Self::new(identity(name, receiver), file, total, harness::current_candidate())
    }

    /// Recorder for the `task`-th body spawned from `name`, attributed to
    /// the candidate that spawned it.
    pub fn enter_task(
        name: &'static str,
        receiver: Option<&'static str>,
        task: u32,
        file: &'static str,
        total: u32,
        origin: TaskOrigin,
    ) -> Self {
        Self::new(identity(name, receiver).as_task(task), file, total, origin.candidate)
    }

    fn new(identity: FunctionIdentity, file: &'static str, total: u32, candidate: Option<usize>) -> Self {
        Self {
            identity,
            file,
            total,
            candidate,
            hits: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn hit(&self, site: ProbeSite) {
        let mut hits = self.hits.lock().unwrap_or_else(PoisonError::into_inner);
        *hits.entry(site).or_insert(0) += 1;
    }

    pub fn identity(&self) -> &FunctionIdentity {
        &self.identity
    }

    pub fn snapshot(&self) -> BTreeMap<ProbeSite, u32> {
        self.hits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn finish(&mut self) -> CoverageEvent {
        let identity = self.identity.clone();
        let hits = self.hits.get_mut().unwrap_or_else(PoisonError::into_inner);
        if thread::panicking() {
            let failure = FailureDetail {
                message: panic_capture::last_message()
                    .unwrap_or_else(|| "panicked".to_string()),
                stack: Backtrace::force_capture().to_string(),
            };
            CoverageEvent::failed(identity, self.file, self.candidate, hits, self.total, failure)
        } else {
            CoverageEvent::completed(identity, self.file, self.candidate, hits, self.total)
        }
    }
}

impl Drop for PathRecorder {
    fn drop(&mut self) {
        let event = self.finish();
        feedback::emit(event);
    }
}

/// The spawning candidate, taken on the spawning thread.
///
/// Neither `Copy` nor `Clone`: a task body handing it to
/// [`PathRecorder::enter_task`] moves it, so a non-`move` closure or async
/// block captures it by value and never borrows from the spawning frame.
#[derive(Debug)]
pub struct TaskOrigin {
    candidate: Option<usize>,
}

impl TaskOrigin {
    pub fn capture() -> Self {
        Self {
            candidate: harness::current_candidate(),
        }
    }

    pub fn candidate(&self) -> Option<usize> {
        self.candidate
    }
}

fn identity(name: &str, receiver: Option<&str>) -> FunctionIdentity {
    match receiver {
        Some(receiver) => FunctionIdentity::method(receiver, name),
        None => FunctionIdentity::new(name),
    }
}

//! Process-wide feedback channel endpoint.
//!
//! Recorders live inside user code and cannot be handed a sender, so the
//! harness installs one here for the duration of a suite run. Each
//! connection gets a generation number so a runner that outlives its suite
//! cannot close a newer connection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use crossbeam::channel::{SendTimeoutError, Sender};
use lantern_ir::CoverageEvent;

/// Longest a producer waits on a full channel before dropping its event.
pub const EMIT_TIMEOUT: Duration = Duration::from_secs(1);

static SINK: RwLock<Option<(u64, Sender<CoverageEvent>)>> = RwLock::new(None);
static GENERATION: AtomicU64 = AtomicU64::new(0);

/// Install `tx` as the event sink, replacing any previous one.
pub fn connect(tx: Sender<CoverageEvent>) -> u64 {
    let generation = GENERATION.fetch_add(1, Ordering::Relaxed) + 1;
    *SINK.write().unwrap_or_else(PoisonError::into_inner) = Some((generation, tx));
    generation
}

/// Drop the installed sender, so the consumer sees the channel close, if
/// `generation` is still the installed connection.
pub fn release(generation: u64) {
    let mut sink = SINK.write().unwrap_or_else(PoisonError::into_inner);
    if sink.as_ref().is_some_and(|(current, _)| *current == generation) {
        sink.take();
    }
}

pub fn is_connected() -> bool {
    SINK.read().unwrap_or_else(PoisonError::into_inner).is_some()
}

/// Push one event. Returns false when it was dropped: no consumer
/// connected, channel closed, or still full after [`EMIT_TIMEOUT`].
pub fn emit(event: CoverageEvent) -> bool {
    let sink = SINK.read().unwrap_or_else(PoisonError::into_inner);
    let Some((_, tx)) = sink.as_ref() else {
        log::debug!("no feedback consumer, dropping event for {}", event.identity);
        return false;
    };
    match tx.send_timeout(event, EMIT_TIMEOUT) {
        Ok(()) => true,
        Err(SendTimeoutError::Timeout(event)) => {
            log::warn!("feedback channel full, dropping event for {}", event.identity);
            false
        }
        Err(SendTimeoutError::Disconnected(event)) => {
            log::debug!("feedback consumer gone, dropping event for {}", event.identity);
            false
        }
    }
}

//! Return stand-ins for mocked callees.
//!
//! A candidate queues values with [`push`] before calling the target; the
//! instrumented call sites of a mocked callee take the next queued value
//! through [`next`] and only fall through to the real call once the queue
//! is empty. Queues are per thread, so stand-ins reach calls made on the
//! candidate's own thread only.

use std::any::Any;
use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};

thread_local! {
    static STAND_INS: RefCell<BTreeMap<String, VecDeque<Box<dyn Any>>>> =
        const { RefCell::new(BTreeMap::new()) };
}

/// Queue `value` as the next result of `callee` on this thread.
pub fn push<T: Any>(callee: &str, value: T) {
    STAND_INS.with(|queues| {
        queues
            .borrow_mut()
            .entry(callee.to_string())
            .or_default()
            .push_back(Box::new(value));
    });
}

/// Take the next queued result of `callee`.
///
/// A queued value of another type is left in place and `None` returned, so
/// the call site runs the real callee.
pub fn next<T: Any>(callee: &str) -> Option<T> {
    STAND_INS.with(|queues| {
        let mut queues = queues.borrow_mut();
        let queue = queues.get_mut(callee)?;
        if !queue.front()?.is::<T>() {
            log::warn!("stand-in queued for {callee} does not match the call site's type");
            return None;
        }
        let value = queue.pop_front()?.downcast::<T>().ok()?;
        Some(*value)
    })
}

/// Values still queued for `callee`.
pub fn pending(callee: &str) -> usize {
    STAND_INS.with(|queues| queues.borrow().get(callee).map_or(0, VecDeque::len))
}

/// Drop every queued stand-in on this thread.
pub fn clear() {
    STAND_INS.with(|queues| queues.borrow_mut().clear());
}

//! Panic payload capture.
//!
//! A recorder dropped during unwinding only knows that the thread is
//! panicking. The hook installed here stores the payload message where the
//! recorder can read it.

use std::any::Any;
use std::cell::RefCell;
use std::panic;
use std::sync::Once;

thread_local! {
    static LAST_PANIC: RefCell<Option<String>> = const { RefCell::new(None) };
}

static INSTALL: Once = Once::new();

/// Install the capturing hook once per process, chaining the previous one.
pub fn install() {
    INSTALL.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let mut message = payload_message(info.payload());
            if let Some(location) = info.location() {
                message = format!("{message} at {}:{}", location.file(), location.line());
            }
            LAST_PANIC.with(|slot| *slot.borrow_mut() = Some(message));
            previous(info);
        }));
    });
}

/// Message of the most recent panic on this thread.
pub fn last_message() -> Option<String> {
    LAST_PANIC.with(|slot| slot.borrow().clone())
}

pub fn clear() {
    LAST_PANIC.with(|slot| slot.borrow_mut().take());
}

/// Text of a panic payload: `&str` and `String` payloads verbatim.
pub fn payload_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hook_records_message() {
        install();
        clear();
        let result = panic::catch_unwind(|| panic!("kaboom {}", 7));
        assert!(result.is_err());
        let message = last_message().unwrap();
        assert!(message.starts_with("kaboom 7"), "{message}");
    }

    #[test]
    fn test_payload_message() {
        let boxed: Box<dyn Any + Send> = Box::new("plain");
        assert_eq!(payload_message(boxed.as_ref()), "plain");
        let boxed: Box<dyn Any + Send> = Box::new(3u8);
        assert_eq!(payload_message(boxed.as_ref()), "non-string panic payload");
    }
}

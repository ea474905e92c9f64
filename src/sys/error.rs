// src/sys/error.rs

//! Per-thread last-error string, the engine's only error channel besides
//! sentinel return values.
//!
//! A failing call sets the message; a succeeding call never clears it, so
//! callers must not infer success from an empty message. The message is
//! informational only; some failures do not set one.

use std::cell::RefCell;

use log::trace;

thread_local! {
    static LAST_ERROR: RefCell<String> = const { RefCell::new(String::new()) };
}

/// Records `msg` as the current thread's last error.
pub(crate) fn set_error(msg: impl Into<String>) {
    let msg = msg.into();
    trace!("engine error: {msg}");
    LAST_ERROR.with(|e| *e.borrow_mut() = msg);
}

/// Returns a copy of the current thread's last error message.
pub(crate) fn last_error() -> String {
    LAST_ERROR.with(|e| e.borrow().clone())
}

/// Clears the current thread's last error message.
pub(crate) fn clear_error() {
    LAST_ERROR.with(|e| e.borrow_mut().clear());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_should_keep_the_message_per_thread() {
        set_error("boom");
        assert_eq!(last_error(), "boom");
        let other = std::thread::spawn(last_error).join().unwrap();
        assert_eq!(other, "");
        clear_error();
        assert_eq!(last_error(), "");
    }
}

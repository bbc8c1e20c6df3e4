//! Signal-driven shutdown flag.
//!
//! The handler does the one thing it is safe to do from signal context:
//! flip an atomic. Everything else (closing the region, unmapping,
//! logging) happens back on the consumer's own thread once it next
//! checks the flag.

use std::sync::atomic::{AtomicBool, Ordering};

static EXIT_REQUESTED: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_signal(_signum: libc::c_int) {
    EXIT_REQUESTED.store(true, Ordering::SeqCst);
}

/// Installs handlers for `SIGINT` and `SIGTERM`.
pub fn install() {
    unsafe {
        libc::signal(libc::SIGINT, handle_signal as libc::sighandler_t);
        libc::signal(libc::SIGTERM, handle_signal as libc::sighandler_t);
    }
}

pub fn exit_requested() -> bool {
    EXIT_REQUESTED.load(Ordering::SeqCst)
}

#[cfg(test)]
pub fn reset_for_test() {
    EXIT_REQUESTED.store(false, Ordering::SeqCst);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_starts_clear_and_can_be_set() {
        reset_for_test();
        assert!(!exit_requested());
        handle_signal(libc::SIGINT);
        assert!(exit_requested());
        reset_for_test();
    }
}

//! Cooperative Ctrl-C handling.
//!
//! Long operations poll [`shutdown_requested`] between steps: `kill_all`
//! stops signalling further pids and reports them as skipped, `delete`
//! stops terminating processes before removing files. Registry writes
//! already under way are always completed.

use std::sync::atomic::{AtomicBool, Ordering};

static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

/// First Ctrl-C lets the current operation finish; a second one exits.
pub fn install_signal_handler() {
    let _ = ctrlc::set_handler(move || {
        if request_shutdown() {
            std::process::exit(130);
        }
        eprintln!("\nshutdown requested, finishing current operation...");
    });
}

/// Mark the process as shutting down. Returns whether it already was.
pub fn request_shutdown() -> bool {
    SHUTDOWN_REQUESTED.swap(true, Ordering::SeqCst)
}

pub fn shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::SeqCst)
}

#[cfg(test)]
mod tests {
    use super::*;

    // The flag is process-wide; setting it here would leak into other unit
    // tests, so the set path is covered by tests/shutdown.rs.
    #[test]
    fn shutdown_not_requested_by_default() {
        assert!(!shutdown_requested());
    }
}

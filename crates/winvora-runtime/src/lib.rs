//! Execution layer for Winvora.
//!
//! Everything that touches the external Wine runtime or live OS processes
//! lives here: the `Platform` capability (runtime search paths, default
//! directories, display variables per host), the `Invoker` that runs scoped
//! runtime commands with mandatory timeouts, the `ProcessMonitor` that lists
//! and terminates runtime-attributable processes, prerequisite checks, and
//! discovery of unpacked Wine builds.

pub mod invoker;
pub mod monitor;
pub mod platform;
pub mod prereq;
pub mod runtimes;

pub use invoker::{is_windows_path, BackgroundProcess, CommandOutput, Invocation, Invoker, Program, Scope};
pub use monitor::{
    current_owner, is_alive, owner_alive, start_time, KillOutcome, KillReport, ManagedProcess,
    ProcessMonitor,
};
pub use platform::{
    detect_platform, AndroidPlatform, LinuxPlatform, MacOsPlatform, Platform, PlatformPaths,
};
pub use prereq::{check_runtime_prereqs, format_missing, MissingPrereq};
pub use runtimes::{find_runtime, installed_runtimes, scan_runtimes_dir, InstalledRuntime};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("runtime I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Wine runtime not found: {0}")]
    RuntimeMissing(String),
    #[error("failed to start '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("'{command}' timed out after {seconds}s")]
    Timeout { command: String, seconds: u64 },
    #[error("'{command}' exited with code {code}: {stderr}")]
    ExitFailure {
        command: String,
        code: i32,
        stderr: String,
    },
    #[error("cannot signal pid {pid}: {reason}")]
    Signal { pid: u32, reason: String },
    #[error("permission denied: {0}")]
    PermissionDenied(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_display_names_command_and_bound() {
        let e = RuntimeError::Timeout {
            command: "wineboot -i".to_owned(),
            seconds: 180,
        };
        let msg = e.to_string();
        assert!(msg.contains("wineboot -i"));
        assert!(msg.contains("180s"));
    }

    #[test]
    fn exit_failure_display_includes_stderr() {
        let e = RuntimeError::ExitFailure {
            command: "reg add".to_owned(),
            code: 3,
            stderr: "access denied".to_owned(),
        };
        let msg = e.to_string();
        assert!(msg.contains("code 3"));
        assert!(msg.contains("access denied"));
    }
}

//! Prefix and application lifecycle management for Winvora.
//!
//! The `Manager` is the central API: it creates, inspects, configures and
//! deletes prefixes against the registry, installs and launches Windows
//! executables inside them through the runtime invoker, and lists or
//! terminates their processes. Settings, the lifecycle state machine, the
//! operation journal, builtin templates and Ctrl-C handling live alongside
//! it.

pub mod apps;
pub mod concurrency;
pub mod configure;
pub mod journal;
pub mod lifecycle;
pub mod manager;
pub mod settings;
pub mod template;

pub use apps::{LaunchOutcome, LaunchRequest, INSTALL_SUCCESS_CODES};
pub use concurrency::{install_signal_handler, request_shutdown, shutdown_requested};
pub use configure::{ConfigureRequest, VirtualDesktop, ALLOWED_DPI};
pub use journal::{JsonlJournal, MemorySink, OperationRecord, OperationSink};
pub use lifecycle::validate_transition;
pub use manager::{CreateOptions, DiscoveredPrefix, EnvStatus, Manager};
pub use settings::{Settings, SettingsError, Timeouts, SETTING_KEYS};
pub use template::{builtin_templates, find_template, PrefixTemplate};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use winvora_runtime::RuntimeError;
use winvora_store::StoreError;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid prefix name: {0}")]
    InvalidName(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("prefix not found: {0}")]
    NotFound(String),
    #[error("prefix '{name}' is not ready: {reason}")]
    EnvironmentNotReady { name: String, reason: String },
    #[error(
        "insufficient disk space at {path}: {available_mb} MB available, {required_mb} MB required"
    )]
    InsufficientSpace {
        path: String,
        available_mb: u64,
        required_mb: u64,
    },
    #[error("Wine runtime unavailable: {0}")]
    ExternalRuntimeMissing(String),
    #[error("{operation} on '{name}' timed out after {seconds}s")]
    Timeout {
        name: String,
        operation: String,
        seconds: u64,
    },
    #[error("{executable} exited with code {exit_code}: {stderr}")]
    LaunchFailed {
        executable: String,
        exit_code: i32,
        stderr: String,
    },
    #[error(
        "{operation} of '{name}' partially failed; completed: [{}]; failed: [{}]",
        .completed.join(", "),
        .failed.join(", ")
    )]
    PartialFailure {
        operation: String,
        name: String,
        completed: Vec<String>,
        failed: Vec<String>,
    },
    #[error("invalid option: {0}")]
    InvalidOption(String),
    #[error("executable not found: {0}")]
    ExecutableNotFound(String),
    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    #[error("store error: {0}")]
    Store(#[source] StoreError),
    #[error("{context}: {source}")]
    Runtime {
        context: String,
        #[source]
        source: RuntimeError,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("configuration error: {0}")]
    Settings(#[from] SettingsError),
}

impl CoreError {
    /// Attach the prefix and command class to a runtime failure.
    pub fn from_runtime(name: &str, operation: &str, err: RuntimeError) -> Self {
        match err {
            RuntimeError::Timeout { seconds, .. } => CoreError::Timeout {
                name: name.to_owned(),
                operation: operation.to_owned(),
                seconds,
            },
            RuntimeError::RuntimeMissing(msg) => CoreError::ExternalRuntimeMissing(msg),
            source => CoreError::Runtime {
                context: format!("{operation} on '{name}'"),
                source,
            },
        }
    }
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidName(msg) => CoreError::InvalidName(msg),
            StoreError::EnvNotFound(name) => CoreError::NotFound(name),
            StoreError::NameConflict(name) => {
                CoreError::AlreadyExists(format!("prefix '{name}' is already registered"))
            }
            StoreError::PathConflict { path, existing } => CoreError::AlreadyExists(format!(
                "path {path} is already used by prefix '{existing}'"
            )),
            StoreError::PathOverlap {
                path,
                existing,
                existing_path,
            } => CoreError::InvalidOption(format!(
                "{path} overlaps prefix '{existing}' at {existing_path}"
            )),
            other => CoreError::Store(other),
        }
    }
}

impl From<RuntimeError> for CoreError {
    fn from(err: RuntimeError) -> Self {
        match err {
            RuntimeError::RuntimeMissing(msg) => CoreError::ExternalRuntimeMissing(msg),
            source => CoreError::Runtime {
                context: "runtime".to_owned(),
                source,
            },
        }
    }
}

/// Outcome of a mutating operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OperationResult {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

impl OperationResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            exit_code: None,
        }
    }

    #[must_use]
    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = Some(code);
        self
    }
}

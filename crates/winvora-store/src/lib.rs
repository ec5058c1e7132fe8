//! Prefix registry persistence for Winvora.
//!
//! This crate owns the one piece of durable shared state in the system: the
//! registry of Wine prefixes. It provides the typed `EnvRecord`, name
//! validation, the `Layout` of configuration and prefix directories, the
//! `Registry` (a single JSON document written atomically and guarded by a
//! checksum), and the `RegistryLock` that serialises read-modify-write cycles
//! across threads and processes.

pub mod layout;
pub mod lock;
pub mod record;
pub mod registry;

pub use layout::Layout;
pub use lock::RegistryLock;
pub use record::{
    is_initialized_prefix, validate_env_name, Architecture, AudioDriver, EnvRecord, EnvState,
    OperationOwner, PrefixSettings, Renderer, WindowsVersion,
};
pub use registry::{ensure_unique, Registry, Records, REGISTRY_FORMAT_VERSION};

use std::path::Path;
use thiserror::Error;

/// Fsync a directory to ensure that a preceding `rename()` is durable.
///
/// POSIX does not guarantee a rename survives a crash until the parent
/// directory itself has been synced.
pub(crate) fn fsync_dir(dir: &Path) -> Result<(), std::io::Error> {
    let f = std::fs::File::open(dir)?;
    f.sync_all()
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("registry I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("registry is malformed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("invalid prefix name: {0}")]
    InvalidName(String),
    #[error("prefix '{0}' is already registered")]
    NameConflict(String),
    #[error("path '{path}' is already used by prefix '{existing}'")]
    PathConflict { path: String, existing: String },
    #[error("path '{path}' overlaps the tree of prefix '{existing}' at {existing_path}")]
    PathOverlap {
        path: String,
        existing: String,
        existing_path: String,
    },
    #[error("prefix not found: {0}")]
    EnvNotFound(String),
    #[error("registry integrity check failed: expected {expected}, got {actual}")]
    IntegrityFailure { expected: String, actual: String },
    #[error("registry format version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
    #[error("registry contains prefix '{0}' more than once")]
    DuplicateRecord(String),
    #[error("registry lock acquisition failed: {0}")]
    LockFailed(String),
}

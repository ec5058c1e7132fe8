use crate::StoreError;
use std::fs;
use std::path::{Path, PathBuf};

const REGISTRY_FILE: &str = "registry.json";
const LOCK_FILE: &str = ".registry.lock";
const SETTINGS_FILE: &str = "config.toml";

/// Directory layout for Winvora state.
///
/// The configuration directory holds the registry, its lock, the settings
/// file and operation logs. Prefixes live under a separate data directory so
/// they can be placed on a larger volume. Directories are created lazily by
/// [`initialize`](Self::initialize).
#[derive(Debug, Clone)]
pub struct Layout {
    config_dir: PathBuf,
    prefixes_dir: PathBuf,
}

impl Layout {
    pub fn new(config_dir: impl Into<PathBuf>, prefixes_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
            prefixes_dir: prefixes_dir.into(),
        }
    }

    #[inline]
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    #[inline]
    pub fn prefixes_dir(&self) -> &Path {
        &self.prefixes_dir
    }

    #[inline]
    pub fn registry_file(&self) -> PathBuf {
        self.config_dir.join(REGISTRY_FILE)
    }

    #[inline]
    pub fn lock_file(&self) -> PathBuf {
        self.config_dir.join(LOCK_FILE)
    }

    #[inline]
    pub fn settings_file(&self) -> PathBuf {
        self.config_dir.join(SETTINGS_FILE)
    }

    #[inline]
    pub fn logs_dir(&self) -> PathBuf {
        self.config_dir.join("logs")
    }

    /// Default root for a prefix that was created without a custom path.
    #[inline]
    pub fn default_prefix_path(&self, name: &str) -> PathBuf {
        self.prefixes_dir.join(name)
    }

    pub fn initialize(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.config_dir)?;
        fs::create_dir_all(&self.prefixes_dir)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths_are_correct() {
        let layout = Layout::new("/tmp/winvora-test/config", "/tmp/winvora-test/prefixes");
        assert_eq!(
            layout.registry_file(),
            PathBuf::from("/tmp/winvora-test/config/registry.json")
        );
        assert_eq!(
            layout.lock_file(),
            PathBuf::from("/tmp/winvora-test/config/.registry.lock")
        );
        assert_eq!(
            layout.settings_file(),
            PathBuf::from("/tmp/winvora-test/config/config.toml")
        );
        assert_eq!(
            layout.logs_dir(),
            PathBuf::from("/tmp/winvora-test/config/logs")
        );
        assert_eq!(
            layout.default_prefix_path("games"),
            PathBuf::from("/tmp/winvora-test/prefixes/games")
        );
    }

    #[test]
    fn initialize_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let layout = Layout::new(dir.path().join("cfg"), dir.path().join("pfx"));
        layout.initialize().unwrap();

        assert!(layout.config_dir().is_dir());
        assert!(layout.prefixes_dir().is_dir());
    }

    #[test]
    fn initialize_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let layout = Layout::new(dir.path().join("cfg"), dir.path().join("pfx"));
        layout.initialize().unwrap();
        layout.initialize().unwrap();
        assert!(layout.config_dir().is_dir());
    }
}

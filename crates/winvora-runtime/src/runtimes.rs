use crate::platform::{is_executable, Platform};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A Wine build that can be selected as the runtime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstalledRuntime {
    /// `system` for the build found by the platform search, otherwise the
    /// directory name under the runtimes dir.
    pub name: String,
    /// `system`, `staging`, `proton`, ... or `custom` when the directory name
    /// carries no variant.
    pub variant: String,
    pub version: Option<String>,
    pub binary: PathBuf,
}

/// Builds unpacked under `dir`, each as `<dir>/<variant>-<version>/bin/wine`.
/// Sorted by name; a missing directory yields nothing.
pub fn scan_runtimes_dir(dir: &Path) -> Vec<InstalledRuntime> {
    let Ok(entries) = fs::read_dir(dir) else {
        debug!("no runtimes directory at {}", dir.display());
        return Vec::new();
    };
    let mut found: Vec<InstalledRuntime> = entries
        .flatten()
        .filter_map(|entry| {
            let path = entry.path();
            let binary = path.join("bin").join("wine");
            if !is_executable(&binary) {
                return None;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let (variant, version) = match name.split_once('-') {
                Some((variant, version)) if !version.is_empty() => {
                    (variant.to_owned(), version.to_owned())
                }
                _ => ("custom".to_owned(), name.clone()),
            };
            Some(InstalledRuntime {
                name,
                variant,
                version: Some(version),
                binary,
            })
        })
        .collect();
    found.sort_by(|a, b| a.name.cmp(&b.name));
    found
}

/// The platform's own runtime (no override) followed by the unpacked builds.
pub fn installed_runtimes(platform: &dyn Platform, dir: &Path) -> Vec<InstalledRuntime> {
    let mut all = Vec::new();
    if let Some(binary) = platform.locate_runtime_binary(None) {
        all.push(InstalledRuntime {
            name: "system".to_owned(),
            variant: "system".to_owned(),
            version: None,
            binary,
        });
    }
    all.extend(scan_runtimes_dir(dir));
    all
}

/// Look up an unpacked build by its directory name.
pub fn find_runtime(dir: &Path, name: &str) -> Option<InstalledRuntime> {
    scan_runtimes_dir(dir).into_iter().find(|r| r.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn install(dir: &Path, name: &str) -> PathBuf {
        let bin = dir.join(name).join("bin");
        fs::create_dir_all(&bin).unwrap();
        let wine = bin.join("wine");
        fs::write(&wine, "#!/bin/sh\n").unwrap();
        fs::set_permissions(&wine, fs::Permissions::from_mode(0o755)).unwrap();
        wine
    }

    #[test]
    fn scan_splits_variant_and_version() {
        let dir = tempfile::tempdir().unwrap();
        install(dir.path(), "staging-9.5");
        install(dir.path(), "proton-8.0-5");
        install(dir.path(), "mybuild");

        let found = scan_runtimes_dir(dir.path());
        let summary: Vec<(&str, &str, Option<&str>)> = found
            .iter()
            .map(|r| (r.name.as_str(), r.variant.as_str(), r.version.as_deref()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("mybuild", "custom", Some("mybuild")),
                ("proton-8.0-5", "proton", Some("8.0-5")),
                ("staging-9.5", "staging", Some("9.5")),
            ]
        );
    }

    #[test]
    fn scan_skips_directories_without_binary() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("broken-1.0/bin")).unwrap();
        fs::write(dir.path().join("stray-file"), "x").unwrap();
        assert!(scan_runtimes_dir(dir.path()).is_empty());
    }

    #[test]
    fn missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(scan_runtimes_dir(&dir.path().join("absent")).is_empty());
    }

    #[test]
    fn find_runtime_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let wine = install(dir.path(), "staging-9.5");
        assert_eq!(
            find_runtime(dir.path(), "staging-9.5").map(|r| r.binary),
            Some(wine)
        );
        assert!(find_runtime(dir.path(), "staging-1.0").is_none());
    }
}

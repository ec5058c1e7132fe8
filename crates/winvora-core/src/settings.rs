use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use winvora_store::{Architecture, WindowsVersion};

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid settings file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("unknown setting '{0}'")]
    UnknownKey(String),
    #[error("invalid value '{value}' for '{key}': {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

/// Per-class bounds for foreground runtime calls, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Timeouts {
    pub quick_secs: u64,
    pub boot_secs: u64,
    pub configure_secs: u64,
    pub install_secs: u64,
    pub run_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            quick_secs: 10,
            boot_secs: 180,
            configure_secs: 30,
            install_secs: 300,
            run_secs: 300,
        }
    }
}

impl Timeouts {
    pub fn quick(&self) -> Duration {
        Duration::from_secs(self.quick_secs)
    }
    pub fn boot(&self) -> Duration {
        Duration::from_secs(self.boot_secs)
    }
    pub fn configure(&self) -> Duration {
        Duration::from_secs(self.configure_secs)
    }
    pub fn install(&self) -> Duration {
        Duration::from_secs(self.install_secs)
    }
    pub fn run(&self) -> Duration {
        Duration::from_secs(self.run_secs)
    }
}

/// User settings, read from `config.toml` in the configuration directory.
///
/// Built once by the entry point and handed to the manager; nothing reads
/// settings from a global.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Explicit runtime binary; otherwise located through the platform.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime_path: Option<PathBuf>,
    /// Where new prefixes go; otherwise the platform default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefixes_dir: Option<PathBuf>,
    /// Where unpacked Wine builds live; otherwise the platform default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtimes_dir: Option<PathBuf>,
    pub default_windows_version: WindowsVersion,
    pub default_architecture: Architecture,
    pub winedebug: String,
    pub min_free_space_mb: u64,
    pub kill_grace_ms: u64,
    pub timeouts: Timeouts,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            runtime_path: None,
            prefixes_dir: None,
            runtimes_dir: None,
            default_windows_version: WindowsVersion::default(),
            default_architecture: Architecture::default(),
            winedebug: "-all".to_owned(),
            min_free_space_mb: 1024,
            kill_grace_ms: 3000,
            timeouts: Timeouts::default(),
        }
    }
}

/// Keys accepted by [`Settings::set`].
pub const SETTING_KEYS: &[&str] = &[
    "runtime_path",
    "prefixes_dir",
    "runtimes_dir",
    "default_windows_version",
    "default_architecture",
    "winedebug",
    "min_free_space_mb",
    "kill_grace_ms",
    "timeouts.quick_secs",
    "timeouts.boot_secs",
    "timeouts.configure_secs",
    "timeouts.install_secs",
    "timeouts.run_secs",
];

impl Settings {
    /// Load from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e.into()),
        };
        let settings: Self = toml::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String, SettingsError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        let t = &self.timeouts;
        for (key, secs) in [
            ("timeouts.quick_secs", t.quick_secs),
            ("timeouts.boot_secs", t.boot_secs),
            ("timeouts.configure_secs", t.configure_secs),
            ("timeouts.install_secs", t.install_secs),
            ("timeouts.run_secs", t.run_secs),
        ] {
            if secs == 0 {
                return Err(invalid(key, "0", "timeouts must be at least one second"));
            }
        }
        if self.winedebug.contains(char::is_whitespace) {
            return Err(invalid(
                "winedebug",
                &self.winedebug,
                "must not contain whitespace",
            ));
        }
        Ok(())
    }

    /// Update one key from its string form. An empty value clears an
    /// optional path. On error `self` is left unchanged.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), SettingsError> {
        let mut next = self.clone();
        next.apply(key, value)?;
        next.validate()?;
        *self = next;
        Ok(())
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<(), SettingsError> {
        match key {
            "runtime_path" => self.runtime_path = optional_path(value),
            "prefixes_dir" => self.prefixes_dir = absolute_path(key, value)?,
            "runtimes_dir" => self.runtimes_dir = absolute_path(key, value)?,
            "default_windows_version" => {
                self.default_windows_version =
                    value.parse().map_err(|e: String| invalid(key, value, &e))?;
            }
            "default_architecture" => {
                self.default_architecture =
                    value.parse().map_err(|e: String| invalid(key, value, &e))?;
            }
            "winedebug" => value.clone_into(&mut self.winedebug),
            "min_free_space_mb" => self.min_free_space_mb = parse_u64(key, value)?,
            "kill_grace_ms" => self.kill_grace_ms = parse_u64(key, value)?,
            "timeouts.quick_secs" => self.timeouts.quick_secs = parse_u64(key, value)?,
            "timeouts.boot_secs" => self.timeouts.boot_secs = parse_u64(key, value)?,
            "timeouts.configure_secs" => self.timeouts.configure_secs = parse_u64(key, value)?,
            "timeouts.install_secs" => self.timeouts.install_secs = parse_u64(key, value)?,
            "timeouts.run_secs" => self.timeouts.run_secs = parse_u64(key, value)?,
            other => return Err(SettingsError::UnknownKey(other.to_owned())),
        }
        Ok(())
    }
}

fn optional_path(value: &str) -> Option<PathBuf> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| PathBuf::from(trimmed))
}

fn absolute_path(key: &str, value: &str) -> Result<Option<PathBuf>, SettingsError> {
    let path = optional_path(value);
    if path.as_deref().is_some_and(Path::is_relative) {
        return Err(invalid(key, value, "must be an absolute path"));
    }
    Ok(path)
}

fn parse_u64(key: &str, value: &str) -> Result<u64, SettingsError> {
    value
        .trim()
        .parse()
        .map_err(|e: std::num::ParseIntError| invalid(key, value, &e.to_string()))
}

fn invalid(key: &str, value: &str, reason: &str) -> SettingsError {
    SettingsError::InvalidValue {
        key: key.to_owned(),
        value: value.to_owned(),
        reason: reason.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let s = Settings::load(&dir.path().join("config.toml")).unwrap();
        assert_eq!(s, Settings::default());
        assert_eq!(s.timeouts.boot(), Duration::from_secs(180));
        assert_eq!(s.min_free_space_mb, 1024);
        assert_eq!(s.winedebug, "-all");
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "default_windows_version = \"win7\"\n[timeouts]\nboot_secs = 60\n",
        )
        .unwrap();
        let s = Settings::load(&path).unwrap();
        assert_eq!(s.default_windows_version, WindowsVersion::Win7);
        assert_eq!(s.timeouts.boot_secs, 60);
        assert_eq!(s.timeouts.install_secs, 300);
        assert_eq!(s.default_architecture, Architecture::Win64);
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut s = Settings::default();
        s.runtime_path = Some(PathBuf::from("/opt/wine/bin/wine"));
        s.kill_grace_ms = 500;
        s.save(&path).unwrap();
        assert_eq!(Settings::load(&path).unwrap(), s);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "default_windows_version = [").unwrap();
        assert!(matches!(
            Settings::load(&path).unwrap_err(),
            SettingsError::Parse(_)
        ));
    }

    #[test]
    fn unknown_field_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "wine_path = \"/usr/bin/wine\"\n").unwrap();
        assert!(Settings::load(&path).is_err());
    }

    #[test]
    fn zero_timeout_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[timeouts]\nrun_secs = 0\n").unwrap();
        assert!(matches!(
            Settings::load(&path).unwrap_err(),
            SettingsError::InvalidValue { .. }
        ));
    }

    #[test]
    fn set_updates_typed_values() {
        let mut s = Settings::default();
        s.set("default_windows_version", "winxp").unwrap();
        s.set("default_architecture", "win32").unwrap();
        s.set("timeouts.install_secs", "900").unwrap();
        s.set("runtime_path", "/usr/local/bin/wine").unwrap();
        assert_eq!(s.default_windows_version, WindowsVersion::WinXp);
        assert_eq!(s.default_architecture, Architecture::Win32);
        assert_eq!(s.timeouts.install(), Duration::from_secs(900));
        assert_eq!(s.runtime_path, Some(PathBuf::from("/usr/local/bin/wine")));

        s.set("runtime_path", "").unwrap();
        assert_eq!(s.runtime_path, None);
    }

    #[test]
    fn set_rejects_bad_input() {
        let mut s = Settings::default();
        assert!(matches!(
            s.set("nonsense", "1").unwrap_err(),
            SettingsError::UnknownKey(_)
        ));
        assert!(s.set("min_free_space_mb", "lots").is_err());
        assert!(s.set("default_windows_version", "win95").is_err());
        assert!(s.set("prefixes_dir", "relative/dir").is_err());
        assert!(s.set("runtimes_dir", "relative/dir").is_err());
        assert!(s.set("timeouts.boot_secs", "0").is_err());
        assert_eq!(s, Settings::default());
    }

    #[test]
    fn every_listed_key_is_settable() {
        let samples = [
            ("runtime_path", "/usr/bin/wine"),
            ("prefixes_dir", "/tmp/prefixes"),
            ("default_windows_version", "win10"),
            ("default_architecture", "win64"),
            ("winedebug", "warn+all"),
        ];
        let mut s = Settings::default();
        for key in SETTING_KEYS {
            let value = samples
                .iter()
                .find(|(k, _)| k == key)
                .map_or("42", |(_, v)| v);
            s.set(key, value)
                .unwrap_or_else(|e| panic!("{key} rejected {value}: {e}"));
        }
    }
}

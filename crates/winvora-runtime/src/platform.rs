use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

const TERMUX_ROOT: &str = "/data/data/com.termux/files";

/// Default locations for Winvora state on a platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformPaths {
    pub config_dir: PathBuf,
    pub prefixes_dir: PathBuf,
    /// Unpacked Wine builds, one directory per build (`<variant>-<version>`).
    pub runtimes_dir: PathBuf,
}

/// Host-specific knowledge: where the runtime lives, where state goes, and
/// which display variables a child needs.
pub trait Platform: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Well-known install locations, in preference order.
    fn runtime_search_paths(&self) -> Vec<PathBuf>;

    fn default_paths(&self) -> PlatformPaths;

    /// Display-related variables to add to a child environment. Never
    /// overrides a value already present in the parent.
    fn display_environment(&self) -> Vec<(String, String)>;

    /// Find the runtime binary: explicit override, then `PATH`, then the
    /// platform search paths.
    fn locate_runtime_binary(&self, override_path: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = override_path {
            return is_executable(path).then(|| path.to_path_buf());
        }
        if let Some(found) = search_path_var("wine") {
            debug!("runtime found on PATH: {}", found.display());
            return Some(found);
        }
        self.runtime_search_paths()
            .into_iter()
            .find(|p| is_executable(p))
    }
}

fn home() -> PathBuf {
    PathBuf::from(env::var("HOME").unwrap_or_else(|_| "/tmp".to_owned()))
}

fn xdg_dir(var: &str, fallback: &[&str]) -> PathBuf {
    match env::var(var) {
        Ok(v) if !v.is_empty() => PathBuf::from(v),
        _ => fallback.iter().fold(home(), |acc, part| acc.join(part)),
    }
}

fn default_display() -> Vec<(String, String)> {
    if env::var_os("DISPLAY").is_some() || env::var_os("WAYLAND_DISPLAY").is_some() {
        Vec::new()
    } else {
        vec![("DISPLAY".to_owned(), ":0".to_owned())]
    }
}

#[derive(Debug, Default)]
pub struct LinuxPlatform;

impl Platform for LinuxPlatform {
    fn name(&self) -> &'static str {
        "linux"
    }

    fn runtime_search_paths(&self) -> Vec<PathBuf> {
        vec![
            PathBuf::from("/usr/bin/wine"),
            PathBuf::from("/usr/local/bin/wine"),
            PathBuf::from("/opt/wine/bin/wine"),
            home().join(".local/bin/wine"),
            PathBuf::from("/usr/lib/wine/wine"),
        ]
    }

    fn default_paths(&self) -> PlatformPaths {
        let data = xdg_dir("XDG_DATA_HOME", &[".local", "share"]).join("winvora");
        PlatformPaths {
            config_dir: xdg_dir("XDG_CONFIG_HOME", &[".config"]).join("winvora"),
            prefixes_dir: data.join("prefixes"),
            runtimes_dir: data.join("wine-versions"),
        }
    }

    fn display_environment(&self) -> Vec<(String, String)> {
        default_display()
    }
}

#[derive(Debug, Default)]
pub struct MacOsPlatform;

impl Platform for MacOsPlatform {
    fn name(&self) -> &'static str {
        "macos"
    }

    fn runtime_search_paths(&self) -> Vec<PathBuf> {
        vec![
            PathBuf::from("/opt/homebrew/bin/wine"),
            PathBuf::from("/usr/local/bin/wine"),
            PathBuf::from("/opt/local/bin/wine"),
            home().join(".local/bin/wine"),
            PathBuf::from("/Applications/Wine Stable.app/Contents/Resources/wine/bin/wine"),
        ]
    }

    fn default_paths(&self) -> PlatformPaths {
        let base = home().join("Library/Application Support/Winvora");
        PlatformPaths {
            config_dir: base.clone(),
            prefixes_dir: base.join("prefixes"),
            runtimes_dir: base.join("wine-versions"),
        }
    }

    // Wine's macOS driver talks to Quartz directly.
    fn display_environment(&self) -> Vec<(String, String)> {
        Vec::new()
    }
}

#[derive(Debug)]
pub struct AndroidPlatform {
    termux: bool,
}

impl AndroidPlatform {
    pub fn new(termux: bool) -> Self {
        Self { termux }
    }

    pub fn is_termux(&self) -> bool {
        self.termux
    }
}

impl Platform for AndroidPlatform {
    fn name(&self) -> &'static str {
        "android"
    }

    fn runtime_search_paths(&self) -> Vec<PathBuf> {
        if self.termux {
            vec![
                PathBuf::from(format!("{TERMUX_ROOT}/usr/bin/wine")),
                PathBuf::from(format!("{TERMUX_ROOT}/usr/bin/wine64")),
                home().join(".local/bin/wine"),
            ]
        } else {
            vec![
                PathBuf::from("/system/bin/wine"),
                PathBuf::from("/data/local/wine/bin/wine"),
            ]
        }
    }

    fn default_paths(&self) -> PlatformPaths {
        if self.termux {
            PlatformPaths {
                config_dir: home().join(".config/winvora"),
                prefixes_dir: home().join(".local/share/winvora/prefixes"),
                runtimes_dir: home().join(".local/share/winvora/wine-versions"),
            }
        } else {
            let base = PathBuf::from("/data/data/com.winvora/files");
            PlatformPaths {
                config_dir: base.join("config"),
                prefixes_dir: base.join("prefixes"),
                runtimes_dir: base.join("wine-versions"),
            }
        }
    }

    fn display_environment(&self) -> Vec<(String, String)> {
        let mut vars = default_display();
        if self.termux {
            vars.push(("PREFIX".to_owned(), format!("{TERMUX_ROOT}/usr")));
        }
        vars
    }
}

/// Pick the platform for the running host.
pub fn detect_platform() -> Arc<dyn Platform> {
    if cfg!(target_os = "macos") {
        return Arc::new(MacOsPlatform);
    }
    let termux = Path::new(TERMUX_ROOT).exists();
    if cfg!(target_os = "android") || termux {
        return Arc::new(AndroidPlatform::new(termux));
    }
    Arc::new(LinuxPlatform)
}

pub(crate) fn search_path_var(binary: &str) -> Option<PathBuf> {
    let path = env::var_os("PATH")?;
    env::split_paths(&path)
        .map(|dir| dir.join(binary))
        .find(|candidate| is_executable(candidate))
}

pub(crate) fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

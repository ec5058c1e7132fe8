use crate::StoreError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Lifecycle state of a prefix as persisted in the registry.
///
/// `Creating` is never committed by a successful create (the record is written
/// last), but it is a legal value so that tooling can describe the transition.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EnvState {
    Creating,
    Ready,
    Configuring,
    Deleting,
}

impl fmt::Display for EnvState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvState::Creating => write!(f, "creating"),
            EnvState::Ready => write!(f, "ready"),
            EnvState::Configuring => write!(f, "configuring"),
            EnvState::Deleting => write!(f, "deleting"),
        }
    }
}

/// Windows version a prefix reports to applications.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum WindowsVersion {
    #[default]
    Win10,
    Win8,
    Win7,
    WinXp,
    Win2k,
}

impl WindowsVersion {
    pub const ALL: [WindowsVersion; 5] = [
        WindowsVersion::Win10,
        WindowsVersion::Win8,
        WindowsVersion::Win7,
        WindowsVersion::WinXp,
        WindowsVersion::Win2k,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            WindowsVersion::Win10 => "win10",
            WindowsVersion::Win8 => "win8",
            WindowsVersion::Win7 => "win7",
            WindowsVersion::WinXp => "winxp",
            WindowsVersion::Win2k => "win2k",
        }
    }
}

impl fmt::Display for WindowsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WindowsVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        WindowsVersion::ALL
            .into_iter()
            .find(|v| v.as_str() == lower)
            .ok_or_else(|| {
                format!("unsupported Windows version '{s}' (expected: win10, win8, win7, winxp, win2k)")
            })
    }
}

/// Prefix architecture, spelled the way `WINEARCH` expects it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    Win32,
    #[default]
    Win64,
}

impl Architecture {
    pub fn as_str(self) -> &'static str {
        match self {
            Architecture::Win32 => "win32",
            Architecture::Win64 => "win64",
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Architecture {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "win32" | "32" | "x86" => Ok(Architecture::Win32),
            "win64" | "64" | "x86_64" => Ok(Architecture::Win64),
            _ => Err(format!(
                "unsupported architecture '{s}' (expected: win32, win64)"
            )),
        }
    }
}

/// Direct3D renderer selected through `WINE_D3D_CONFIG`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Renderer {
    Gl,
    Vulkan,
    Gdi,
}

impl Renderer {
    pub fn as_str(self) -> &'static str {
        match self {
            Renderer::Gl => "gl",
            Renderer::Vulkan => "vulkan",
            Renderer::Gdi => "gdi",
        }
    }
}

impl fmt::Display for Renderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Renderer {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gl" | "opengl" => Ok(Renderer::Gl),
            "vulkan" | "vk" => Ok(Renderer::Vulkan),
            "gdi" => Ok(Renderer::Gdi),
            _ => Err(format!(
                "unsupported renderer '{s}' (expected: gl, vulkan, gdi)"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AudioDriver {
    Alsa,
    Pulse,
    CoreAudio,
    Oss,
}

impl AudioDriver {
    pub fn as_str(self) -> &'static str {
        match self {
            AudioDriver::Alsa => "alsa",
            AudioDriver::Pulse => "pulse",
            AudioDriver::CoreAudio => "coreaudio",
            AudioDriver::Oss => "oss",
        }
    }
}

impl fmt::Display for AudioDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AudioDriver {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "alsa" => Ok(AudioDriver::Alsa),
            "pulse" | "pulseaudio" => Ok(AudioDriver::Pulse),
            "coreaudio" => Ok(AudioDriver::CoreAudio),
            "oss" => Ok(AudioDriver::Oss),
            _ => Err(format!(
                "unsupported audio driver '{s}' (expected: alsa, pulse, coreaudio, oss)"
            )),
        }
    }
}

/// Display and graphics options applied by `configure`.
///
/// Every field is optional: `None` means "never configured, runtime default".
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PrefixSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dpi: Option<u32>,
    /// Virtual desktop resolution (`WxH`); `None` when disabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub virtual_desktop: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renderer: Option<Renderer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_driver: Option<AudioDriver>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub csmt: Option<bool>,
    /// Extra variables exported to every runtime command in the prefix.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

/// The process that moved a record into `Configuring` or `Deleting`.
///
/// `started_at` is the process start time in seconds since the epoch, so a
/// recycled pid is not mistaken for the original owner. 0 when unknown.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct OperationOwner {
    pub pid: u32,
    pub started_at: u64,
}

/// One registered prefix.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnvRecord {
    pub name: String,
    pub path: PathBuf,
    pub windows_version: WindowsVersion,
    pub architecture: Architecture,
    pub state: EnvState,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub settings: PrefixSettings,
    /// Builtin template the prefix was created from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    /// Set while a transient state is held; cleared on return to `Ready`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<OperationOwner>,
    /// Extension data owned by collaborators (library, shortcuts, sync).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl EnvRecord {
    pub fn new(
        name: &str,
        path: impl Into<PathBuf>,
        windows_version: WindowsVersion,
        architecture: Architecture,
    ) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            name: name.to_owned(),
            path: path.into(),
            windows_version,
            architecture,
            state: EnvState::Ready,
            created_at: now.clone(),
            updated_at: now,
            settings: PrefixSettings::default(),
            template: None,
            owner: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = chrono::Utc::now().to_rfc3339();
    }

    /// Whether the prefix root has been bootstrapped by the runtime.
    pub fn is_initialized(&self) -> bool {
        is_initialized_prefix(&self.path)
    }
}

/// A directory counts as an initialised prefix once `wineboot` created `drive_c`.
pub fn is_initialized_prefix(path: &Path) -> bool {
    path.join("drive_c").is_dir()
}

pub fn validate_env_name(name: &str) -> Result<(), StoreError> {
    if name.is_empty() || name.len() > 64 {
        return Err(StoreError::InvalidName(
            "prefix name must be 1-64 characters".to_owned(),
        ));
    }
    if !name
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
    {
        return Err(StoreError::InvalidName(format!(
            "'{name}' must match [a-zA-Z0-9_-]"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_env_name_valid_chars() {
        assert!(validate_env_name("my-prefix_123").is_ok());
        assert!(validate_env_name("a").is_ok());
        assert!(validate_env_name(&"x".repeat(64)).is_ok());
    }

    #[test]
    fn validate_env_name_rejects_empty() {
        assert!(validate_env_name("").is_err());
    }

    #[test]
    fn validate_env_name_rejects_too_long() {
        assert!(validate_env_name(&"x".repeat(65)).is_err());
    }

    #[test]
    fn validate_env_name_rejects_traversal_and_shell_chars() {
        assert!(validate_env_name("bad name!").is_err());
        assert!(validate_env_name("../etc").is_err());
        assert!(validate_env_name("has/slash").is_err());
        assert!(validate_env_name("a;rm").is_err());
        assert!(validate_env_name("$(id)").is_err());
    }

    #[test]
    fn windows_version_parses_case_insensitively() {
        assert_eq!("WIN7".parse::<WindowsVersion>(), Ok(WindowsVersion::Win7));
        assert_eq!("winxp".parse::<WindowsVersion>(), Ok(WindowsVersion::WinXp));
        assert!("win95".parse::<WindowsVersion>().is_err());
    }

    #[test]
    fn architecture_accepts_aliases() {
        assert_eq!("64".parse::<Architecture>(), Ok(Architecture::Win64));
        assert_eq!("x86".parse::<Architecture>(), Ok(Architecture::Win32));
        assert!("arm".parse::<Architecture>().is_err());
    }

    #[test]
    fn renderer_accepts_opengl_alias() {
        assert_eq!("opengl".parse::<Renderer>(), Ok(Renderer::Gl));
        assert!("directx".parse::<Renderer>().is_err());
    }

    #[test]
    fn enums_serialize_lowercase() {
        let json = serde_json::to_string(&WindowsVersion::WinXp).unwrap();
        assert_eq!(json, "\"winxp\"");
        let json = serde_json::to_string(&AudioDriver::CoreAudio).unwrap();
        assert_eq!(json, "\"coreaudio\"");
        let json = serde_json::to_string(&EnvState::Ready).unwrap();
        assert_eq!(json, "\"ready\"");
    }

    #[test]
    fn record_without_settings_or_metadata_deserializes() {
        let json = r#"{
            "name": "legacy",
            "path": "/tmp/legacy",
            "windows_version": "win7",
            "architecture": "win32",
            "state": "ready",
            "created_at": "2025-01-01T00:00:00Z",
            "updated_at": "2025-01-01T00:00:00Z"
        }"#;
        let rec: EnvRecord = serde_json::from_str(json).unwrap();
        assert_eq!(rec.settings, PrefixSettings::default());
        assert!(rec.metadata.is_empty());
        assert!(rec.owner.is_none());
        assert!(rec.template.is_none());
    }

    #[test]
    fn owner_survives_roundtrip_and_is_omitted_when_unset() {
        let mut rec = EnvRecord::new("p", "/tmp/p", WindowsVersion::Win10, Architecture::Win64);
        let json = serde_json::to_string(&rec).unwrap();
        assert!(!json.contains("owner"));

        rec.state = EnvState::Configuring;
        rec.owner = Some(OperationOwner {
            pid: 4242,
            started_at: 1_700_000_000,
        });
        let back: EnvRecord = serde_json::from_str(&serde_json::to_string(&rec).unwrap()).unwrap();
        assert_eq!(back.owner, rec.owner);
    }

    #[test]
    fn is_initialized_requires_drive_c() {
        let dir = tempfile::tempdir().unwrap();
        let rec = EnvRecord::new("p", dir.path(), WindowsVersion::Win10, Architecture::Win64);
        assert!(!rec.is_initialized());
        std::fs::create_dir(dir.path().join("drive_c")).unwrap();
        assert!(rec.is_initialized());
    }
}

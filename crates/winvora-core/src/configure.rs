use crate::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use winvora_store::{Architecture, AudioDriver, EnvRecord, Renderer, WindowsVersion};

/// DPI values offered by `winecfg`.
pub const ALLOWED_DPI: [u32; 4] = [96, 120, 144, 192];

const MAX_DESKTOP_EDGE: u32 = 16384;

const KEY_DESKTOP: &str = r"HKCU\Control Panel\Desktop";
const KEY_EXPLORER: &str = r"HKCU\Software\Wine\Explorer";
const KEY_DESKTOPS: &str = r"HKCU\Software\Wine\Explorer\Desktops";
const KEY_DIRECT3D: &str = r"HKCU\Software\Wine\Direct3D";
const KEY_DRIVERS: &str = r"HKCU\Software\Wine\Drivers";

/// Sparse set of prefix options. `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigureRequest {
    pub windows_version: Option<WindowsVersion>,
    pub architecture: Option<Architecture>,
    pub dpi: Option<u32>,
    /// `off` or `WxH`.
    pub virtual_desktop: Option<String>,
    pub renderer: Option<Renderer>,
    pub audio_driver: Option<AudioDriver>,
    pub csmt: Option<bool>,
}

impl ConfigureRequest {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VirtualDesktop {
    Off,
    Resolution { width: u32, height: u32 },
}

impl fmt::Display for VirtualDesktop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VirtualDesktop::Off => f.write_str("off"),
            VirtualDesktop::Resolution { width, height } => write!(f, "{width}x{height}"),
        }
    }
}

impl FromStr for VirtualDesktop {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        if matches!(lower.as_str(), "off" | "none" | "disabled") {
            return Ok(VirtualDesktop::Off);
        }
        let bad = || {
            CoreError::InvalidOption(format!(
                "virtual desktop '{s}' must be 'off' or WIDTHxHEIGHT (e.g. 1024x768)"
            ))
        };
        let (w, h) = lower.split_once('x').ok_or_else(bad)?;
        let width: u32 = w.parse().map_err(|_| bad())?;
        let height: u32 = h.parse().map_err(|_| bad())?;
        if width == 0 || height == 0 || width > MAX_DESKTOP_EDGE || height > MAX_DESKTOP_EDGE {
            return Err(bad());
        }
        Ok(VirtualDesktop::Resolution { width, height })
    }
}

/// One validated option, ready to apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ConfigStep {
    WindowsVersion(WindowsVersion),
    Architecture(Architecture),
    Dpi(u32),
    VirtualDesktop(VirtualDesktop),
    Renderer(Renderer),
    AudioDriver(AudioDriver),
    Csmt(bool),
}

/// A runtime command implementing (part of) a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StepCommand {
    pub args: Vec<String>,
    /// Non-zero exit is expected when there is nothing to undo (e.g. deleting
    /// a value that was never set).
    pub may_fail: bool,
}

fn reg_add(key: &str, value: &str, kind: &str, data: &str) -> StepCommand {
    StepCommand {
        args: [
            "reg", "add", key, "/v", value, "/t", kind, "/d", data, "/f",
        ]
        .map(str::to_owned)
        .to_vec(),
        may_fail: false,
    }
}

fn reg_delete(key: &str, value: &str) -> StepCommand {
    StepCommand {
        args: ["reg", "delete", key, "/v", value, "/f"]
            .map(str::to_owned)
            .to_vec(),
        may_fail: true,
    }
}

impl ConfigStep {
    pub fn label(&self) -> String {
        match self {
            ConfigStep::WindowsVersion(v) => format!("windows_version={v}"),
            ConfigStep::Architecture(a) => format!("architecture={a}"),
            ConfigStep::Dpi(d) => format!("dpi={d}"),
            ConfigStep::VirtualDesktop(vd) => format!("virtual_desktop={vd}"),
            ConfigStep::Renderer(r) => format!("renderer={r}"),
            ConfigStep::AudioDriver(a) => format!("audio_driver={a}"),
            ConfigStep::Csmt(c) => format!("csmt={c}"),
        }
    }

    /// Runtime commands to run for this step. Empty for record-only steps.
    pub fn commands(&self) -> Vec<StepCommand> {
        match self {
            ConfigStep::WindowsVersion(v) => vec![StepCommand {
                args: vec!["winecfg".to_owned(), format!("/v:{v}")],
                may_fail: false,
            }],
            // Only the current architecture gets this far.
            ConfigStep::Architecture(_) => Vec::new(),
            ConfigStep::Dpi(d) => vec![reg_add(KEY_DESKTOP, "LogPixels", "REG_DWORD", &d.to_string())],
            ConfigStep::VirtualDesktop(VirtualDesktop::Off) => vec![reg_delete(KEY_EXPLORER, "Desktop")],
            ConfigStep::VirtualDesktop(res @ VirtualDesktop::Resolution { .. }) => vec![
                reg_add(KEY_EXPLORER, "Desktop", "REG_SZ", "Default"),
                reg_add(KEY_DESKTOPS, "Default", "REG_SZ", &res.to_string()),
            ],
            ConfigStep::Renderer(r) => vec![reg_add(KEY_DIRECT3D, "renderer", "REG_SZ", r.as_str())],
            ConfigStep::AudioDriver(a) => vec![reg_add(KEY_DRIVERS, "Audio", "REG_SZ", a.as_str())],
            ConfigStep::Csmt(c) => vec![reg_add(
                KEY_DIRECT3D,
                "csmt",
                "REG_DWORD",
                if *c { "1" } else { "0" },
            )],
        }
    }

    pub fn apply_to(&self, record: &mut EnvRecord) {
        match self {
            ConfigStep::WindowsVersion(v) => record.windows_version = *v,
            ConfigStep::Architecture(a) => record.architecture = *a,
            ConfigStep::Dpi(d) => record.settings.dpi = Some(*d),
            ConfigStep::VirtualDesktop(VirtualDesktop::Off) => record.settings.virtual_desktop = None,
            ConfigStep::VirtualDesktop(res) => {
                record.settings.virtual_desktop = Some(res.to_string());
            }
            ConfigStep::Renderer(r) => record.settings.renderer = Some(*r),
            ConfigStep::AudioDriver(a) => record.settings.audio_driver = Some(*a),
            ConfigStep::Csmt(c) => record.settings.csmt = Some(*c),
        }
    }
}

/// Check the planned steps against the prefix they target. Wine cannot
/// convert an existing prefix, so only the current architecture is accepted.
pub(crate) fn check_against(steps: &[ConfigStep], record: &EnvRecord) -> Result<(), CoreError> {
    for step in steps {
        if let ConfigStep::Architecture(a) = step {
            if *a != record.architecture {
                return Err(CoreError::InvalidOption(format!(
                    "prefix '{}' is {}; Wine cannot convert it to {a}, create a new prefix instead",
                    record.name, record.architecture
                )));
            }
        }
    }
    Ok(())
}

/// Validate the whole request up front. Nothing is applied if any option is
/// invalid.
pub(crate) fn plan(req: &ConfigureRequest) -> Result<Vec<ConfigStep>, CoreError> {
    if req.is_empty() {
        return Err(CoreError::InvalidOption(
            "no configuration options given".to_owned(),
        ));
    }

    let mut steps = Vec::new();
    if let Some(v) = req.windows_version {
        steps.push(ConfigStep::WindowsVersion(v));
    }
    if let Some(a) = req.architecture {
        steps.push(ConfigStep::Architecture(a));
    }
    if let Some(d) = req.dpi {
        if !ALLOWED_DPI.contains(&d) {
            return Err(CoreError::InvalidOption(format!(
                "dpi {d} is not supported (expected one of 96, 120, 144, 192)"
            )));
        }
        steps.push(ConfigStep::Dpi(d));
    }
    if let Some(ref vd) = req.virtual_desktop {
        steps.push(ConfigStep::VirtualDesktop(vd.parse()?));
    }
    if let Some(r) = req.renderer {
        steps.push(ConfigStep::Renderer(r));
    }
    if let Some(a) = req.audio_driver {
        steps.push(ConfigStep::AudioDriver(a));
    }
    if let Some(c) = req.csmt {
        steps.push(ConfigStep::Csmt(c));
    }
    Ok(steps)
}

use crate::platform::{search_path_var, Platform};
use std::fmt;
use std::path::Path;

/// A missing prerequisite with actionable install instructions.
#[derive(Debug)]
pub struct MissingPrereq {
    pub name: &'static str,
    pub purpose: &'static str,
    pub install_hint: &'static str,
}

impl fmt::Display for MissingPrereq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "  - {}: {} (install: {})",
            self.name, self.purpose, self.install_hint
        )
    }
}

fn wine_install_hint(platform: &dyn Platform) -> &'static str {
    match platform.name() {
        "macos" => "brew install --cask wine-stable",
        "android" => "install a Wine build for Termux (x11-repo), or set runtime_path",
        _ => "apt install wine | dnf install wine | pacman -S wine | zypper install wine",
    }
}

/// Check what Winvora needs from the host to drive the runtime.
/// Returns the missing items; an empty list means the host is ready.
pub fn check_runtime_prereqs(
    platform: &dyn Platform,
    runtime_override: Option<&Path>,
) -> Vec<MissingPrereq> {
    let mut missing = Vec::new();

    let Some(wine) = platform.locate_runtime_binary(runtime_override) else {
        missing.push(MissingPrereq {
            name: "wine",
            purpose: "running Windows applications and bootstrapping prefixes",
            install_hint: wine_install_hint(platform),
        });
        return missing;
    };

    // wineserver ships next to wine; distro packages sometimes split it out.
    let sibling = wine.with_file_name("wineserver");
    if !sibling.is_file() && search_path_var("wineserver").is_none() {
        missing.push(MissingPrereq {
            name: "wineserver",
            purpose: "Wine session server shared by every process in a prefix",
            install_hint: wine_install_hint(platform),
        });
    }

    missing
}

/// Format a list of missing prerequisites into a user-friendly error message.
pub fn format_missing(missing: &[MissingPrereq]) -> String {
    use std::fmt::Write as _;
    let mut msg = String::from("missing prerequisites:\n");
    for m in missing {
        let _ = writeln!(msg, "{m}");
    }
    msg.push_str("\nWinvora wraps an installed Wine runtime; it does not bundle one.");
    msg
}

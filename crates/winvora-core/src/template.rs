//! Builtin prefix templates.
//!
//! A template picks the Windows version a prefix is created with, a set of
//! configure options applied right after bootstrap, and environment
//! variables stored on the record and exported to every runtime command in
//! the prefix. Component installs (winetricks packages, DXVK) are left to
//! the component installer.

use crate::configure::ConfigureRequest;
use crate::CoreError;
use serde::Serialize;
use std::collections::BTreeMap;
use winvora_store::{Renderer, WindowsVersion};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrefixTemplate {
    pub name: &'static str,
    pub description: &'static str,
    pub windows_version: WindowsVersion,
    /// Applied after `wineboot`; `windows_version` is never set here.
    pub options: ConfigureRequest,
    pub env: BTreeMap<String, String>,
}

impl PrefixTemplate {
    fn new(name: &'static str, description: &'static str, windows_version: WindowsVersion) -> Self {
        Self {
            name,
            description,
            windows_version,
            options: ConfigureRequest::default(),
            env: BTreeMap::new(),
        }
    }

    fn env(mut self, key: &str, value: &str) -> Self {
        self.env.insert(key.to_owned(), value.to_owned());
        self
    }
}

/// All builtin templates, in display order.
pub fn builtin_templates() -> Vec<PrefixTemplate> {
    let mut gaming = PrefixTemplate::new(
        "gaming",
        "Vulkan renderer with CSMT, FPS overlay for DXVK",
        WindowsVersion::Win10,
    )
    .env("DXVK_HUD", "fps")
    .env("STAGING_SHARED_MEMORY", "1");
    gaming.options.renderer = Some(Renderer::Vulkan);
    gaming.options.csmt = Some(true);

    let mut steam = PrefixTemplate::new(
        "steam",
        "Pre-configured for the Steam client",
        WindowsVersion::Win10,
    );
    steam.options.csmt = Some(true);

    let mut compatibility = PrefixTemplate::new(
        "compatibility",
        "Windows 7 with the OpenGL renderer for older applications",
        WindowsVersion::Win7,
    );
    compatibility.options.renderer = Some(Renderer::Gl);

    vec![
        gaming,
        steam,
        PrefixTemplate::new(
            "office",
            "Microsoft Office and other productivity applications",
            WindowsVersion::Win10,
        ),
        PrefixTemplate::new("development", "Development tools and IDEs", WindowsVersion::Win10),
        compatibility,
        PrefixTemplate::new("minimal", "Plain prefix, nothing extra", WindowsVersion::Win10),
    ]
}

pub fn find_template(name: &str) -> Result<PrefixTemplate, CoreError> {
    let all = builtin_templates();
    let names: Vec<&str> = all.iter().map(|t| t.name).collect();
    let known = names.join(", ");
    all.into_iter().find(|t| t.name == name).ok_or_else(|| {
        CoreError::InvalidOption(format!("unknown template '{name}' (known: {known})"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configure::plan;

    #[test]
    fn names_are_unique() {
        let all = builtin_templates();
        let mut names: Vec<&str> = all.iter().map(|t| t.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), all.len());
    }

    #[test]
    fn template_options_pass_validation() {
        for t in builtin_templates() {
            assert!(t.options.windows_version.is_none(), "{}", t.name);
            assert!(t.options.architecture.is_none(), "{}", t.name);
            if !t.options.is_empty() {
                assert!(plan(&t.options).is_ok(), "{} options invalid", t.name);
            }
        }
    }

    #[test]
    fn gaming_template_sets_vulkan_and_hud() {
        let t = find_template("gaming").unwrap();
        assert_eq!(t.options.renderer, Some(Renderer::Vulkan));
        assert_eq!(t.env.get("DXVK_HUD").map(String::as_str), Some("fps"));
    }

    #[test]
    fn unknown_template_lists_known_names() {
        let err = find_template("nope").unwrap_err();
        assert!(matches!(err, CoreError::InvalidOption(ref m) if m.contains("minimal")));
    }
}

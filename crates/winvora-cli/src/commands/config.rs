use super::{json_pretty, EXIT_SUCCESS};
use std::path::Path;
use winvora_core::{Settings, SETTING_KEYS};

fn load(path: &Path) -> Result<Settings, String> {
    Settings::load(path).map_err(|e| format!("configuration error: {e}"))
}

pub fn show(path: &Path, json: bool) -> Result<u8, String> {
    let settings = load(path)?;
    if json {
        println!("{}", json_pretty(&settings)?);
        return Ok(EXIT_SUCCESS);
    }
    let toml = settings
        .to_toml()
        .map_err(|e| format!("configuration error: {e}"))?;
    println!("# {}", path.display());
    print!("{toml}");
    if settings.runtime_path.is_none() {
        println!("# runtime_path unset: wine is searched on PATH and platform locations");
    }
    if settings.prefixes_dir.is_none() {
        println!("# prefixes_dir unset: platform default is used");
    }
    Ok(EXIT_SUCCESS)
}

pub fn set(path: &Path, key: &str, value: &str, json: bool) -> Result<u8, String> {
    let mut settings = load(path)?;
    settings.set(key, value).map_err(|e| match e {
        winvora_core::SettingsError::UnknownKey(_) => format!(
            "configuration error: {e} (known keys: {})",
            SETTING_KEYS.join(", ")
        ),
        other => format!("configuration error: {other}"),
    })?;
    settings
        .save(path)
        .map_err(|e| format!("failed to write {}: {e}", path.display()))?;
    if json {
        let payload = serde_json::json!({ "key": key, "value": value, "path": path });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!("{key} = {value}");
    }
    Ok(EXIT_SUCCESS)
}

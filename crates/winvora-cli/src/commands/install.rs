use super::{json_pretty, with_spinner, EXIT_FAILURE, EXIT_SUCCESS};
use std::path::Path;
use winvora_core::Manager;

pub fn run(
    manager: &Manager,
    name: &str,
    installer: &Path,
    silent: bool,
    json: bool,
) -> Result<u8, String> {
    let label = installer.file_name().map_or_else(
        || installer.display().to_string(),
        |f| f.to_string_lossy().into_owned(),
    );
    let result = with_spinner(
        json,
        &format!("installing {label} into '{name}'..."),
        &format!("installer {label} finished"),
        "install failed",
        || manager.install(name, installer, silent),
    )?;

    if json {
        println!("{}", json_pretty(&result)?);
    } else {
        println!("{}", result.message);
    }
    Ok(if result.success {
        EXIT_SUCCESS
    } else {
        EXIT_FAILURE
    })
}

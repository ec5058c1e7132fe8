use super::{json_pretty, with_spinner, EXIT_SUCCESS};
use winvora_core::{CreateOptions, Manager};

pub fn run(manager: &Manager, name: &str, opts: &CreateOptions, json: bool) -> Result<u8, String> {
    with_spinner(
        json,
        &format!("creating prefix '{name}' (this runs wineboot)..."),
        &format!("prefix '{name}' created"),
        "create failed",
        || manager.create(name, opts),
    )?;

    let record = manager.info(name).map_err(super::core_err)?;
    if json {
        let payload = serde_json::json!({
            "status": "created",
            "name": record.name,
            "path": record.path,
            "windows_version": record.windows_version,
            "architecture": record.architecture,
            "template": record.template,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!("path:     {}", record.path.display());
        println!(
            "windows:  {} ({})",
            record.windows_version, record.architecture
        );
        if let Some(ref template) = record.template {
            println!("template: {template}");
        }
    }
    Ok(EXIT_SUCCESS)
}

use super::{core_err, json_pretty, EXIT_SUCCESS};
use winvora_core::Manager;

pub fn run(manager: &Manager, name: &str, json: bool) -> Result<u8, String> {
    let pid = manager.open_winecfg(name).map_err(core_err)?;
    if json {
        let payload = serde_json::json!({ "name": name, "pid": pid });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!("winecfg started for '{name}' (pid {pid})");
    }
    Ok(EXIT_SUCCESS)
}

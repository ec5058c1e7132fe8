use super::{core_err, json_pretty, EXIT_SUCCESS};
use winvora_core::Manager;

pub fn run(manager: &Manager, json: bool) -> Result<u8, String> {
    let found = manager.discover().map_err(core_err)?;
    if json {
        println!("{}", json_pretty(&found)?);
    } else if found.is_empty() {
        println!("no unregistered prefixes found");
    } else {
        for p in &found {
            println!("{:<20} {}", p.name, p.path.display());
        }
        println!("\n{} unregistered prefix(es)", found.len());
    }
    Ok(EXIT_SUCCESS)
}

use super::{json_pretty, EXIT_SUCCESS};
use winvora_core::Manager;

pub fn run(manager: &Manager, json: bool) -> Result<u8, String> {
    let runtimes = manager.runtimes();
    if json {
        println!("{}", json_pretty(&runtimes)?);
    } else if runtimes.is_empty() {
        println!(
            "no Wine builds found (install one system-wide or unpack it under {})",
            manager.runtimes_dir().display()
        );
    } else {
        println!("{:<24} {:<10} {:<12} BINARY", "NAME", "VARIANT", "VERSION");
        for rt in &runtimes {
            println!(
                "{:<24} {:<10} {:<12} {}",
                rt.name,
                rt.variant,
                rt.version.as_deref().unwrap_or("-"),
                rt.binary.display()
            );
        }
    }
    Ok(EXIT_SUCCESS)
}

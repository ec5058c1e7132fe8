use super::{core_err, format_bytes, json_pretty, EXIT_SUCCESS};
use winvora_core::Manager;

pub fn run(manager: &Manager, name: Option<&str>, json: bool) -> Result<u8, String> {
    let procs = manager.processes(name).map_err(core_err)?;
    if json {
        println!("{}", json_pretty(&procs)?);
        return Ok(EXIT_SUCCESS);
    }
    if procs.is_empty() {
        match name {
            Some(n) => println!("no processes running in '{n}'"),
            None => println!("no Wine processes running"),
        }
        return Ok(EXIT_SUCCESS);
    }
    println!(
        "{:<8} {:<20} {:<16} {:>10} {:>6}  COMMAND",
        "PID", "NAME", "PREFIX", "MEMORY", "CPU%"
    );
    for p in &procs {
        let prefix = p
            .prefix_name
            .clone()
            .or_else(|| {
                p.prefix_path
                    .as_ref()
                    .and_then(|path| path.file_name())
                    .map(|n| n.to_string_lossy().into_owned())
            })
            .unwrap_or_else(|| "-".to_owned());
        println!(
            "{:<8} {:<20} {:<16} {:>10} {:>6.1}  {}",
            p.pid,
            p.name,
            prefix,
            format_bytes(p.memory_bytes),
            p.cpu_percent,
            p.command
        );
    }
    Ok(EXIT_SUCCESS)
}

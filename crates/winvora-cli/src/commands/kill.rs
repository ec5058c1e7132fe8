use super::{core_err, json_pretty, EXIT_SUCCESS};
use winvora_core::Manager;

pub fn run(manager: &Manager, pid: u32, json: bool) -> Result<u8, String> {
    let result = manager.kill(pid).map_err(core_err)?;
    if json {
        println!("{}", json_pretty(&result)?);
    } else {
        println!("{}", result.message);
    }
    Ok(EXIT_SUCCESS)
}

pub fn run_all(manager: &Manager, name: Option<&str>, json: bool) -> Result<u8, String> {
    let report = manager.kill_all(name).map_err(core_err)?;
    if json {
        println!("{}", json_pretty(&report)?);
    } else if report.total() == 0 {
        println!("no processes to stop");
    } else {
        println!(
            "stopped {} process(es) ({} had already exited)",
            report.total(),
            report.already_exited.len()
        );
    }
    Ok(EXIT_SUCCESS)
}

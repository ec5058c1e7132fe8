use super::{colorize_state, core_err, json_pretty, EXIT_SUCCESS};
use winvora_core::Manager;

const STATE_WIDTH: usize = 12;

pub fn run(manager: &Manager, json: bool) -> Result<u8, String> {
    let envs = manager.list().map_err(core_err)?;
    if json {
        println!("{}", json_pretty(&envs)?);
    } else if envs.is_empty() {
        println!("no prefixes found");
    } else {
        println!(
            "{:<20} {:<STATE_WIDTH$} {:<8} {:<6} PATH",
            "NAME", "STATE", "WINDOWS", "ARCH"
        );
        for env in &envs {
            // Pad outside the colour codes so columns stay aligned.
            let state = env.state.to_string();
            let pad = STATE_WIDTH.saturating_sub(state.len());
            println!(
                "{:<20} {}{:pad$} {:<8} {:<6} {}",
                env.name,
                colorize_state(&state),
                "",
                env.windows_version.as_str(),
                env.architecture.as_str(),
                env.path.display()
            );
        }
    }
    Ok(EXIT_SUCCESS)
}

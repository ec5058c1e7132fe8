use super::{json_pretty, with_spinner, EXIT_SUCCESS};
use dialoguer::Confirm;
use std::io::{stderr, stdin, IsTerminal};
use winvora_core::Manager;

fn confirm(name: &str, yes: bool) -> Result<(), String> {
    if yes {
        return Ok(());
    }
    if !(stdin().is_terminal() && stderr().is_terminal()) {
        return Err(format!(
            "invalid input: refusing to delete '{name}' without --yes (stdin is not a TTY)"
        ));
    }
    let proceed = Confirm::new()
        .with_prompt(format!(
            "delete prefix '{name}' and everything installed in it?"
        ))
        .default(false)
        .interact()
        .map_err(|e| format!("prompt failed: {e}"))?;
    if proceed {
        Ok(())
    } else {
        Err("aborted".to_owned())
    }
}

pub fn run(manager: &Manager, name: &str, yes: bool, json: bool) -> Result<u8, String> {
    // Fail on an unknown name before prompting.
    let record = manager.info(name).map_err(super::core_err)?;
    confirm(name, yes)?;

    let result = with_spinner(
        json,
        &format!("deleting prefix '{name}'..."),
        &format!("prefix '{name}' deleted"),
        "delete failed",
        || manager.delete(name),
    )?;
    if json {
        let payload = serde_json::json!({
            "status": "deleted",
            "name": name,
            "path": record.path,
            "message": result.message,
        });
        println!("{}", json_pretty(&payload)?);
    }
    Ok(EXIT_SUCCESS)
}

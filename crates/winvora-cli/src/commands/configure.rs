use super::{json_pretty, with_spinner, EXIT_SUCCESS};
use winvora_core::{ConfigureRequest, Manager};

#[allow(clippy::needless_pass_by_value)]
pub fn run(
    manager: &Manager,
    name: &str,
    request: ConfigureRequest,
    json: bool,
) -> Result<u8, String> {
    if request.is_empty() {
        return Err(
            "invalid input: nothing to configure (see `winvora configure --help`)".to_owned(),
        );
    }
    let result = with_spinner(
        json,
        &format!("configuring '{name}'..."),
        &format!("prefix '{name}' configured"),
        "configure failed",
        || manager.configure(name, &request),
    )?;
    if json {
        println!("{}", json_pretty(&result)?);
    } else {
        println!("{}", result.message);
    }
    Ok(EXIT_SUCCESS)
}

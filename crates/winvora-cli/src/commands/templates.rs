use super::{json_pretty, EXIT_SUCCESS};
use winvora_core::builtin_templates;

pub fn run(json: bool) -> Result<u8, String> {
    let templates = builtin_templates();
    if json {
        println!("{}", json_pretty(&templates)?);
        return Ok(EXIT_SUCCESS);
    }
    println!("{:<15} {:<8} DESCRIPTION", "NAME", "WINDOWS");
    for t in &templates {
        println!(
            "{:<15} {:<8} {}",
            t.name,
            t.windows_version.as_str(),
            t.description
        );
    }
    Ok(EXIT_SUCCESS)
}

use super::{colorize_state, core_err, json_pretty, EXIT_SUCCESS};
use winvora_core::Manager;

pub fn run(manager: &Manager, name: &str, json: bool) -> Result<u8, String> {
    let status = manager.status(name).map_err(core_err)?;
    if json {
        println!("{}", json_pretty(&status)?);
        return Ok(EXIT_SUCCESS);
    }

    let rec = &status.record;
    let s = &rec.settings;
    let or_default = |v: Option<String>| v.unwrap_or_else(|| "(default)".to_owned());
    println!("name:            {}", rec.name);
    println!("state:           {}", colorize_state(&rec.state.to_string()));
    println!("path:            {}", rec.path.display());
    println!(
        "initialized:     {}",
        if status.initialized { "yes" } else { "no (drive_c missing)" }
    );
    println!("windows_version: {}", rec.windows_version);
    println!("architecture:    {}", rec.architecture);
    println!("dpi:             {}", or_default(s.dpi.map(|d| d.to_string())));
    println!(
        "virtual_desktop: {}",
        s.virtual_desktop.as_deref().unwrap_or("off")
    );
    println!("renderer:        {}", or_default(s.renderer.map(|r| r.to_string())));
    println!("audio_driver:    {}", or_default(s.audio_driver.map(|a| a.to_string())));
    println!("csmt:            {}", or_default(s.csmt.map(|c| c.to_string())));
    println!("processes:       {}", status.running_processes);
    println!("created_at:      {}", rec.created_at);
    println!("updated_at:      {}", rec.updated_at);
    if let Some(ref template) = rec.template {
        println!("template:        {template}");
    }
    if let Some(owner) = rec.owner {
        println!("owner_pid:       {}", owner.pid);
    }
    for (key, value) in &s.env {
        println!("env.{key}: {value}");
    }
    for (key, value) in &rec.metadata {
        println!("meta.{key}: {value}");
    }
    Ok(EXIT_SUCCESS)
}

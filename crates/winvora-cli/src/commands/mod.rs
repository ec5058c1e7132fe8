pub mod completions;
pub mod config;
pub mod configure;
pub mod create;
pub mod delete;
pub mod discover;
pub mod doctor;
pub mod info;
pub mod install;
pub mod kill;
pub mod list;
pub mod man_pages;
pub mod ps;
pub mod run;
pub mod runtimes;
pub mod templates;
pub mod winecfg;

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use winvora_core::CoreError;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_INVALID_INPUT: u8 = 2;
pub const EXIT_STORE_ERROR: u8 = 3;
pub const EXIT_RUNTIME_MISSING: u8 = 4;

/// Messages starting with one of these are reported with
/// [`EXIT_INVALID_INPUT`].
const INVALID_INPUT_PREFIXES: &[&str] = &[
    "invalid prefix name:",
    "invalid option:",
    "invalid input:",
    "executable not found:",
    "already exists:",
    "prefix not found:",
    "configuration error:",
];

const STORE_PREFIXES: &[&str] = &["store error:", "registry"];

const RUNTIME_MISSING_PREFIXES: &[&str] = &["Wine runtime unavailable:", "runtime missing:"];

/// Map an error message to the process exit code.
pub fn exit_code_for(msg: &str) -> u8 {
    let starts = |prefixes: &[&str]| prefixes.iter().any(|p| msg.starts_with(p));
    if starts(INVALID_INPUT_PREFIXES) {
        EXIT_INVALID_INPUT
    } else if starts(STORE_PREFIXES) {
        EXIT_STORE_ERROR
    } else if starts(RUNTIME_MISSING_PREFIXES) {
        EXIT_RUNTIME_MISSING
    } else {
        EXIT_FAILURE
    }
}

#[allow(clippy::needless_pass_by_value)]
pub fn core_err(e: CoreError) -> String {
    e.to_string()
}

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
        pb.set_style(style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]));
    }
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn finish(pb: &ProgressBar, msg: String) {
    if let Ok(style) = ProgressStyle::with_template("{msg}") {
        pb.set_style(style);
    }
    pb.finish_with_message(msg);
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    finish(pb, format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    finish(pb, format!("✗ {msg}"));
}

/// Run `op` behind a spinner unless JSON output was requested.
pub fn with_spinner<T>(
    json: bool,
    working: &str,
    done: &str,
    failed: &str,
    op: impl FnOnce() -> Result<T, CoreError>,
) -> Result<T, String> {
    let pb = (!json).then(|| spinner(working));
    let result = op();
    if let Some(ref pb) = pb {
        match result {
            Ok(_) => spin_ok(pb, done),
            Err(_) => spin_fail(pb, failed),
        }
    }
    result.map_err(core_err)
}

pub fn colorize_state(state: &str) -> String {
    use console::Style;
    match state {
        "ready" => Style::new().green().apply_to(state).to_string(),
        "creating" => Style::new().yellow().apply_to(state).to_string(),
        "configuring" => Style::new().cyan().apply_to(state).to_string(),
        "deleting" => Style::new().red().apply_to(state).to_string(),
        other => other.to_owned(),
    }
}

pub fn format_bytes(bytes: u64) -> String {
    const MIB: u64 = 1024 * 1024;
    if bytes >= 1024 * MIB {
        format!("{:.1} GiB", bytes as f64 / (1024 * MIB) as f64)
    } else {
        format!("{:.1} MiB", bytes as f64 / MIB as f64)
    }
}

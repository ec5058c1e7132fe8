use super::{EXIT_FAILURE, EXIT_SUCCESS};
use std::path::Path;
use std::sync::Arc;
use winvora_core::Settings;
use winvora_runtime::{
    check_runtime_prereqs, format_missing, installed_runtimes, owner_alive, Invoker, Platform,
};
use winvora_store::{EnvState, Layout, Registry, RegistryLock};

pub fn run(
    config_dir: &Path,
    settings: &Settings,
    platform: Arc<dyn Platform>,
    json_output: bool,
) -> Result<u8, String> {
    let mut checks: Vec<Check> = Vec::new();
    let mut all_pass = true;

    checks.push(Check::info(
        "platform",
        &format!("Platform: {}", platform.name()),
    ));
    check_runtime(&platform, settings, &mut checks, &mut all_pass);
    let runtimes_dir = settings
        .runtimes_dir
        .clone()
        .unwrap_or_else(|| platform.default_paths().runtimes_dir);
    check_installed_runtimes(platform.as_ref(), &runtimes_dir, &mut checks);

    let prefixes_dir = settings
        .prefixes_dir
        .clone()
        .unwrap_or_else(|| platform.default_paths().prefixes_dir);
    let layout = Layout::new(config_dir, &prefixes_dir);
    if layout.registry_file().exists() {
        check_registry(&layout, &mut checks, &mut all_pass);
    } else {
        checks.push(Check::info(
            "registry",
            "Registry not initialized (will be created by the first `create`)",
        ));
    }
    check_disk_space(&prefixes_dir, settings.min_free_space_mb, &mut checks);

    print_results(&checks, all_pass, json_output)
}

fn check_runtime(
    platform: &Arc<dyn Platform>,
    settings: &Settings,
    checks: &mut Vec<Check>,
    all_pass: &mut bool,
) {
    let missing = check_runtime_prereqs(platform.as_ref(), settings.runtime_path.as_deref());
    if !missing.is_empty() {
        *all_pass = false;
        checks.push(Check::fail(
            "runtime_prereqs",
            &format!("Missing prerequisites: {}", format_missing(&missing)),
        ));
        return;
    }
    checks.push(Check::pass(
        "runtime_prereqs",
        "Wine and wineserver found",
    ));

    let invoker = Invoker::new(Arc::clone(platform), settings.runtime_path.clone());
    match invoker.version(settings.timeouts.quick()) {
        Ok(version) => checks.push(Check::pass(
            "runtime_version",
            &format!("Runtime version: {version}"),
        )),
        Err(e) => {
            *all_pass = false;
            checks.push(Check::fail(
                "runtime_version",
                &format!("Runtime did not report a version: {e}"),
            ));
        }
    }
}

fn check_installed_runtimes(platform: &dyn Platform, dir: &Path, checks: &mut Vec<Check>) {
    let found = installed_runtimes(platform, dir);
    let message = if found.is_empty() {
        format!("No Wine builds found (system or under {})", dir.display())
    } else {
        let names: Vec<&str> = found.iter().map(|r| r.name.as_str()).collect();
        format!("Wine builds: {}", names.join(", "))
    };
    checks.push(Check::info("installed_runtimes", &message));
}

fn check_registry(layout: &Layout, checks: &mut Vec<Check>, all_pass: &mut bool) {
    let registry = Registry::new(layout.clone());
    match registry.load() {
        Ok(records) => {
            checks.push(Check::pass(
                "registry_integrity",
                &format!("Registry OK ({} prefixes)", records.len()),
            ));
            let (running, interrupted): (Vec<_>, Vec<_>) = records
                .values()
                .filter(|r| r.state != EnvState::Ready)
                .partition(|r| r.owner.is_some_and(|o| owner_alive(&o)));
            if !running.is_empty() {
                let names: Vec<String> = running
                    .iter()
                    .map(|r| format!("{} ({})", r.name, r.state))
                    .collect();
                checks.push(Check::info(
                    "registry_state",
                    &format!("In progress: {}", names.join(", ")),
                ));
            }
            if !interrupted.is_empty() {
                checks.push(Check::warn(
                    "registry_state",
                    &format!(
                        "{} prefix(es) left mid-operation (recovered on next command)",
                        interrupted.len()
                    ),
                ));
            }
            let broken: Vec<&str> = records
                .values()
                .filter(|r| !r.is_initialized())
                .map(|r| r.name.as_str())
                .collect();
            if !broken.is_empty() {
                checks.push(Check::warn(
                    "prefix_roots",
                    &format!("Prefixes without drive_c: {}", broken.join(", ")),
                ));
            }
        }
        Err(e) => {
            *all_pass = false;
            checks.push(Check::fail(
                "registry_integrity",
                &format!("Registry check failed: {e}"),
            ));
        }
    }

    match registry.try_lock() {
        Ok(Some(_)) => checks.push(Check::pass("registry_lock", "Registry lock is free")),
        Ok(None) => {
            let holder = RegistryLock::holder(&layout.lock_file())
                .map_or_else(|| "another process".to_owned(), |pid| format!("pid {pid}"));
            checks.push(Check::warn(
                "registry_lock",
                &format!("Registry lock is held by {holder}"),
            ));
        }
        Err(e) => {
            *all_pass = false;
            checks.push(Check::fail(
                "registry_lock",
                &format!("Cannot check registry lock: {e}"),
            ));
        }
    }
}

fn check_disk_space(prefixes_dir: &Path, required_mb: u64, checks: &mut Vec<Check>) {
    let Some(existing) = prefixes_dir.ancestors().find(|p| p.exists()) else {
        return;
    };
    let Ok(avail_bytes) = fs2::available_space(existing) else {
        return;
    };
    let avail_mb = avail_bytes / (1024 * 1024);

    if avail_mb < required_mb {
        checks.push(Check::fail(
            "disk_space",
            &format!("Low disk space: {avail_mb} MB available, {required_mb} MB needed per prefix"),
        ));
    } else if avail_mb < required_mb.saturating_mul(4) {
        checks.push(Check::warn(
            "disk_space",
            &format!("Disk space: {avail_mb} MB available (consider freeing space)"),
        ));
    } else {
        checks.push(Check::pass(
            "disk_space",
            &format!("Disk space: {} GB available", avail_mb / 1024),
        ));
    }
}

fn print_results(checks: &[Check], all_pass: bool, json_output: bool) -> Result<u8, String> {
    if json_output {
        let json = serde_json::json!({
            "healthy": all_pass,
            "checks": checks.iter().map(|c| serde_json::json!({
                "name": c.name,
                "status": c.status.as_str(),
                "message": c.message,
            })).collect::<Vec<_>>(),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&json).map_err(|e| e.to_string())?
        );
    } else {
        println!("Winvora Doctor\n");
        for check in checks {
            println!("  {} {}", check.status.icon(), check.message);
        }
        println!();
        if all_pass {
            println!("All checks passed.");
        } else {
            println!("Some checks failed. See above for details.");
        }
    }
    Ok(if all_pass { EXIT_SUCCESS } else { EXIT_FAILURE })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Pass,
    Fail,
    Warn,
    Info,
}

impl Status {
    fn as_str(self) -> &'static str {
        match self {
            Status::Pass => "pass",
            Status::Fail => "fail",
            Status::Warn => "warn",
            Status::Info => "info",
        }
    }

    fn icon(self) -> &'static str {
        match self {
            Status::Pass => "✓",
            Status::Fail => "✗",
            Status::Warn => "⚠",
            Status::Info => "ℹ",
        }
    }
}

struct Check {
    name: &'static str,
    status: Status,
    message: String,
}

impl Check {
    fn new(name: &'static str, status: Status, message: &str) -> Self {
        Self {
            name,
            status,
            message: message.to_owned(),
        }
    }

    fn pass(name: &'static str, message: &str) -> Self {
        Self::new(name, Status::Pass, message)
    }

    fn fail(name: &'static str, message: &str) -> Self {
        Self::new(name, Status::Fail, message)
    }

    fn warn(name: &'static str, message: &str) -> Self {
        Self::new(name, Status::Warn, message)
    }

    fn info(name: &'static str, message: &str) -> Self {
        Self::new(name, Status::Info, message)
    }
}

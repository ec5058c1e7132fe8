use crate::RuntimeError;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use sysinfo::{Pid, Process, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, System, UpdateKind};
use tracing::{debug, warn};
use winvora_store::OperationOwner;

const WINE_BINARIES: &[&str] = &[
    "wine",
    "wine64",
    "wineserver",
    "wine-preloader",
    "wine64-preloader",
];

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const KILL_SETTLE: Duration = Duration::from_secs(1);

/// A live OS process attributed to the runtime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ManagedProcess {
    pub pid: u32,
    pub name: String,
    pub command: String,
    pub prefix_path: Option<PathBuf>,
    pub prefix_name: Option<String>,
    pub memory_bytes: u64,
    pub cpu_percent: f32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum KillOutcome {
    /// Exited within the grace period after `SIGTERM`.
    Terminated,
    /// Needed `SIGKILL`.
    Killed,
    /// Was already gone before any signal landed.
    AlreadyExited,
}

/// Aggregate result of signalling several processes.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct KillReport {
    pub terminated: Vec<u32>,
    pub already_exited: Vec<u32>,
    pub failed: Vec<(u32, String)>,
}

impl KillReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn total(&self) -> usize {
        self.terminated.len() + self.already_exited.len() + self.failed.len()
    }
}

/// Lists and terminates runtime processes. Reads live OS state only.
#[derive(Debug, Clone)]
pub struct ProcessMonitor {
    grace: Duration,
}

impl Default for ProcessMonitor {
    fn default() -> Self {
        Self::new(Duration::from_secs(3))
    }
}

impl ProcessMonitor {
    pub fn new(grace: Duration) -> Self {
        Self { grace }
    }

    /// Runtime-attributable processes, optionally only those whose
    /// `WINEPREFIX` is `prefix`. Sorted by pid.
    ///
    /// Best effort: a process whose environment cannot be read (another
    /// user's, or a sandboxed one) never matches a prefix filter. CPU usage
    /// is a single sample and reads 0 for processes first seen in this call.
    pub fn list(&self, prefix: Option<&Path>) -> Vec<ManagedProcess> {
        let mut system = System::new();
        system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing()
                .with_memory()
                .with_cpu()
                .with_cmd(UpdateKind::OnlyIfNotSet)
                .with_environ(UpdateKind::OnlyIfNotSet),
        );

        let own = std::process::id();
        let mut out: Vec<ManagedProcess> = system
            .processes()
            .iter()
            .filter(|(pid, proc_)| pid.as_u32() != own && proc_.status() != ProcessStatus::Zombie)
            .filter_map(|(pid, proc_)| attribute(*pid, proc_))
            .filter(|mp| match prefix {
                Some(filter) => mp.prefix_path.as_deref() == Some(filter),
                None => true,
            })
            .collect();
        out.sort_by_key(|mp| mp.pid);
        debug!("{} runtime process(es) visible", out.len());
        out
    }

    /// `SIGTERM`, wait up to the grace period, then `SIGKILL`.
    pub fn kill(&self, pid: u32) -> Result<KillOutcome, RuntimeError> {
        guard_target(pid)?;

        match send_signal(pid, libc::SIGTERM) {
            Ok(true) => {}
            Ok(false) => {
                debug!("pid {pid} already exited before SIGTERM");
                return Ok(KillOutcome::AlreadyExited);
            }
            Err(e) => return Err(e),
        }

        if wait_for_exit(pid, self.grace) {
            return Ok(KillOutcome::Terminated);
        }

        warn!("process {pid} did not exit after SIGTERM, sending SIGKILL");
        match send_signal(pid, libc::SIGKILL) {
            Ok(true) => {}
            Ok(false) => return Ok(KillOutcome::Terminated),
            Err(e) => return Err(e),
        }
        if !wait_for_exit(pid, KILL_SETTLE) {
            return Err(RuntimeError::Signal {
                pid,
                reason: "process survived SIGKILL".to_owned(),
            });
        }
        Ok(KillOutcome::Killed)
    }

    /// Kill every listed process matching `prefix`.
    pub fn kill_all<F>(&self, prefix: Option<&Path>, cancelled: F) -> KillReport
    where
        F: Fn() -> bool,
    {
        let pids: Vec<u32> = self.list(prefix).into_iter().map(|p| p.pid).collect();
        self.kill_pids(&pids, cancelled)
    }

    /// Kill each pid in turn. Never stops at the first failure; once
    /// `cancelled()` returns true the remaining pids are reported as failed.
    pub fn kill_pids<F>(&self, pids: &[u32], cancelled: F) -> KillReport
    where
        F: Fn() -> bool,
    {
        let mut report = KillReport::default();
        for &pid in pids {
            if cancelled() {
                report
                    .failed
                    .push((pid, "skipped: shutdown requested".to_owned()));
                continue;
            }
            match self.kill(pid) {
                Ok(KillOutcome::AlreadyExited) => report.already_exited.push(pid),
                Ok(_) => report.terminated.push(pid),
                Err(e) => {
                    warn!("failed to kill pid {pid}: {e}");
                    report.failed.push((pid, e.to_string()));
                }
            }
        }
        report
    }
}

fn attribute(pid: Pid, proc_: &Process) -> Option<ManagedProcess> {
    let name = proc_.name().to_string_lossy().into_owned();
    let cmd = proc_.cmd();
    let exe_name = cmd.first().map(|a| basename(&a.to_string_lossy()));
    let prefix_path = env_value(proc_.environ(), "WINEPREFIX").map(PathBuf::from);

    let wine_named = is_runtime_binary(&name)
        || exe_name.as_deref().is_some_and(is_runtime_binary);
    if prefix_path.is_none() && !wine_named {
        return None;
    }

    Some(ManagedProcess {
        pid: pid.as_u32(),
        command: cmd
            .iter()
            .map(|a| a.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" "),
        name,
        prefix_path,
        prefix_name: env_value(proc_.environ(), "WINVORA_PREFIX"),
        memory_bytes: proc_.memory(),
        cpu_percent: proc_.cpu_usage(),
    })
}

/// Wine binaries by name, and anything that looks like a Windows executable.
pub(crate) fn is_runtime_binary(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    WINE_BINARIES.contains(&lower.as_str())
        // comm is truncated to 15 bytes on Linux
        || lower.starts_with("wine64-preload")
        || lower.ends_with(".exe")
}

fn basename(arg: &str) -> String {
    arg.rsplit(['/', '\\']).next().unwrap_or(arg).to_owned()
}

fn env_value(environ: &[OsString], key: &str) -> Option<String> {
    environ.iter().find_map(|entry| {
        let entry = entry.to_string_lossy();
        let (k, v) = entry.split_once('=')?;
        (k == key && !v.is_empty()).then(|| v.to_owned())
    })
}

fn guard_target(pid: u32) -> Result<(), RuntimeError> {
    // 0 and negative pids address process groups; 1 is init.
    if pid <= 1 || i32::try_from(pid).is_err() {
        return Err(RuntimeError::Signal {
            pid,
            reason: "refusing to signal a reserved pid".to_owned(),
        });
    }
    if pid == std::process::id() {
        return Err(RuntimeError::Signal {
            pid,
            reason: "refusing to signal the calling process".to_owned(),
        });
    }
    Ok(())
}

/// `Ok(true)` when delivered, `Ok(false)` when the process does not exist.
fn send_signal(pid: u32, signal: libc::c_int) -> Result<bool, RuntimeError> {
    let raw = i32::try_from(pid).map_err(|_| RuntimeError::Signal {
        pid,
        reason: "pid exceeds i32 range".to_owned(),
    })?;
    // SAFETY: kill() with a validated positive pid and a valid signal number.
    #[allow(unsafe_code)]
    let ret = unsafe { libc::kill(raw, signal) };
    if ret == 0 {
        return Ok(true);
    }
    let errno = std::io::Error::last_os_error();
    match errno.raw_os_error() {
        Some(libc::ESRCH) => Ok(false),
        Some(libc::EPERM) => Err(RuntimeError::PermissionDenied(format!(
            "cannot signal pid {pid}: {errno}"
        ))),
        _ => Err(RuntimeError::Signal {
            pid,
            reason: errno.to_string(),
        }),
    }
}

fn wait_for_exit(pid: u32, within: Duration) -> bool {
    let deadline = Instant::now() + within;
    loop {
        if !is_alive(pid) {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Whether `pid` names a running (non-zombie) process.
pub fn is_alive(pid: u32) -> bool {
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    // SAFETY: signal 0 performs only the existence and permission check.
    #[allow(unsafe_code)]
    let ret = unsafe { libc::kill(raw, 0) };
    if ret != 0 {
        return std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM);
    }
    !is_zombie(pid)
}

/// Start time of `pid` in seconds since the epoch, as sysinfo reports it.
pub fn start_time(pid: u32) -> Option<u64> {
    let pid = Pid::from_u32(pid);
    let mut system = System::new();
    system.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[pid]),
        true,
        ProcessRefreshKind::nothing(),
    );
    system.process(pid).map(Process::start_time)
}

/// Owner marker for the calling process.
pub fn current_owner() -> OperationOwner {
    let pid = std::process::id();
    OperationOwner {
        pid,
        started_at: start_time(pid).unwrap_or(0),
    }
}

/// Whether the process that recorded `owner` is still running. A live pid
/// with a different start time has been recycled and does not count.
pub fn owner_alive(owner: &OperationOwner) -> bool {
    if !is_alive(owner.pid) {
        return false;
    }
    match start_time(owner.pid) {
        Some(t) if owner.started_at != 0 => t == owner.started_at,
        _ => true,
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn is_zombie(pid: u32) -> bool {
    // Field 3 of /proc/<pid>/stat, after the parenthesised comm.
    std::fs::read_to_string(format!("/proc/{pid}/stat"))
        .ok()
        .and_then(|stat| {
            let rest = &stat[stat.rfind(')')? + 1..];
            rest.split_whitespace().next().map(|s| s == "Z")
        })
        .unwrap_or(false)
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn is_zombie(_pid: u32) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::{Command, Stdio};

    fn spawn_reaped(cmd: &mut Command) -> u32 {
        let mut child = cmd
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .unwrap();
        let pid = child.id();
        thread::spawn(move || {
            let _ = child.wait();
        });
        pid
    }

    #[test]
    fn runtime_binary_names_recognised() {
        assert!(is_runtime_binary("wine"));
        assert!(is_runtime_binary("wineserver"));
        assert!(is_runtime_binary("wine64-preloade"));
        assert!(is_runtime_binary("Setup.EXE"));
        assert!(!is_runtime_binary("winecfg-helper.sh"));
        assert!(!is_runtime_binary("bash"));
    }

    #[test]
    fn basename_handles_windows_and_unix_separators() {
        assert_eq!(basename("C:\\Games\\game.exe"), "game.exe");
        assert_eq!(basename("/usr/bin/wine"), "wine");
        assert_eq!(basename("wine"), "wine");
    }

    #[test]
    fn env_value_parses_key_value_pairs() {
        let environ = vec![
            OsString::from("PATH=/usr/bin"),
            OsString::from("WINEPREFIX=/tmp/pfx"),
            OsString::from("EMPTY="),
        ];
        assert_eq!(env_value(&environ, "WINEPREFIX").as_deref(), Some("/tmp/pfx"));
        assert_eq!(env_value(&environ, "EMPTY"), None);
        assert_eq!(env_value(&environ, "MISSING"), None);
    }

    #[test]
    fn kill_already_exited_pid_is_success() {
        let mut child = Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();
        let outcome = ProcessMonitor::default().kill(pid).unwrap();
        assert_eq!(outcome, KillOutcome::AlreadyExited);
    }

    #[test]
    fn kill_terminates_sleeping_process() {
        let pid = spawn_reaped(Command::new("sleep").arg("30"));
        assert!(is_alive(pid));
        let outcome = ProcessMonitor::new(Duration::from_secs(2)).kill(pid).unwrap();
        assert_eq!(outcome, KillOutcome::Terminated);
        assert!(!is_alive(pid));
    }

    #[test]
    fn kill_escalates_when_sigterm_ignored() {
        let pid = spawn_reaped(Command::new("sh").args(["-c", "trap '' TERM; sleep 30"]));
        thread::sleep(Duration::from_millis(200));
        let outcome = ProcessMonitor::new(Duration::from_millis(300))
            .kill(pid)
            .unwrap();
        assert_eq!(outcome, KillOutcome::Killed);
    }

    #[test]
    fn current_owner_is_alive() {
        let owner = current_owner();
        assert_eq!(owner.pid, std::process::id());
        assert!(owner.started_at > 0);
        assert!(owner_alive(&owner));
    }

    #[test]
    fn exited_or_recycled_owner_is_not_alive() {
        let mut child = Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();
        assert!(!owner_alive(&OperationOwner { pid, started_at: 0 }));

        let mut recycled = current_owner();
        recycled.started_at -= 1;
        assert!(!owner_alive(&recycled));
    }

    #[test]
    fn kill_refuses_reserved_pids() {
        let monitor = ProcessMonitor::default();
        assert!(monitor.kill(0).is_err());
        assert!(monitor.kill(1).is_err());
        assert!(monitor.kill(std::process::id()).is_err());
    }

    #[test]
    fn list_filters_by_prefix_environment() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("pfx");
        let pid = spawn_reaped(
            Command::new("sleep")
                .arg("30")
                .env("WINEPREFIX", &prefix)
                .env("WINVORA_PREFIX", "listed"),
        );
        thread::sleep(Duration::from_millis(100));

        let monitor = ProcessMonitor::new(Duration::from_secs(2));
        let procs = monitor.list(Some(&prefix));
        let found = procs.iter().find(|p| p.pid == pid);
        assert!(found.is_some(), "pid {pid} not in {procs:?}");
        let found = found.unwrap();
        assert_eq!(found.prefix_name.as_deref(), Some("listed"));
        assert_eq!(found.prefix_path.as_deref(), Some(prefix.as_path()));

        let other = dir.path().join("other");
        assert!(monitor.list(Some(&other)).iter().all(|p| p.pid != pid));

        monitor.kill(pid).unwrap();
    }

    #[test]
    fn kill_all_reports_per_pid_outcomes() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("pfx");
        let live = spawn_reaped(Command::new("sleep").arg("30").env("WINEPREFIX", &prefix));
        let mut gone = Command::new("true").spawn().unwrap();
        let gone_pid = gone.id();
        gone.wait().unwrap();

        let report =
            ProcessMonitor::new(Duration::from_secs(2)).kill_pids(&[live, gone_pid], || false);
        assert!(report.is_success());
        assert_eq!(report.terminated, vec![live]);
        assert_eq!(report.already_exited, vec![gone_pid]);
        assert_eq!(report.total(), 2);
    }

    #[test]
    fn kill_pids_stops_when_cancelled() {
        let report = ProcessMonitor::default().kill_pids(&[123_456, 123_457], || true);
        assert_eq!(report.failed.len(), 2);
        assert!(!report.is_success());
    }
}

use crate::platform::Platform;
use crate::RuntimeError;
use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::io::Read;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use winvora_store::{Architecture, EnvRecord, Renderer};

const POLL_INTERVAL: Duration = Duration::from_millis(25);
/// Upper bound on waiting for pipe readers once the child has exited.
const OUTPUT_JOIN_TIMEOUT: Duration = Duration::from_secs(2);
const SPAWN_RETRIES: u32 = 5;

/// Environment scoping for a command that targets one prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    pub prefix_path: PathBuf,
    pub architecture: Architecture,
    pub prefix_name: Option<String>,
    pub renderer: Option<Renderer>,
    pub csmt: Option<bool>,
    /// Per-prefix variables. The prefix variables above always win.
    pub env: BTreeMap<String, String>,
}

impl Scope {
    pub fn new(prefix_path: impl Into<PathBuf>, architecture: Architecture) -> Self {
        Self {
            prefix_path: prefix_path.into(),
            architecture,
            prefix_name: None,
            renderer: None,
            csmt: None,
            env: BTreeMap::new(),
        }
    }

    /// Scope carrying the record's name and graphics settings.
    pub fn for_record(record: &EnvRecord) -> Self {
        Self {
            prefix_path: record.path.clone(),
            architecture: record.architecture,
            prefix_name: Some(record.name.clone()),
            renderer: record.settings.renderer,
            csmt: record.settings.csmt,
            env: record.settings.env.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Program {
    /// The located Wine binary.
    Runtime,
    Path(PathBuf),
}

/// One external command: what to run, in which prefix, for how long.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub program: Program,
    pub args: Vec<OsString>,
    pub scope: Option<Scope>,
    pub env: Vec<(String, String)>,
    pub working_dir: Option<PathBuf>,
    pub timeout: Duration,
}

impl Invocation {
    /// `wine <args...>`
    pub fn runtime<I, S>(args: I, timeout: Duration) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        Self {
            program: Program::Runtime,
            args: args.into_iter().map(|a| a.as_ref().to_owned()).collect(),
            scope: None,
            env: Vec::new(),
            working_dir: None,
            timeout,
        }
    }

    pub fn program(path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: Program::Path(path.into()),
            ..Self::runtime(Vec::<OsString>::new(), timeout)
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_owned());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_owned()));
        self
    }

    #[must_use]
    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = Some(scope);
        self
    }

    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Short human label used in logs and errors, e.g. `wine wineboot -i`.
    pub fn describe(&self) -> String {
        let head = match &self.program {
            Program::Runtime => "wine".to_owned(),
            Program::Path(p) => p
                .file_name()
                .map_or_else(|| p.display().to_string(), |n| n.to_string_lossy().into_owned()),
        };
        let mut label = head;
        for arg in self.args.iter().take(3) {
            label.push(' ');
            label.push_str(&arg.to_string_lossy());
        }
        if self.args.len() > 3 {
            label.push_str(" ...");
        }
        label
    }
}

/// Captured result of a foreground command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub command: String,
    /// Exit code; `128 + signo` when the child was killed by a signal.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Turn a non-zero exit into [`RuntimeError::ExitFailure`].
    pub fn check(self) -> Result<Self, RuntimeError> {
        if self.success() {
            Ok(self)
        } else {
            Err(RuntimeError::ExitFailure {
                command: self.command,
                code: self.exit_code,
                stderr: self.stderr.trim().to_owned(),
            })
        }
    }
}

/// A detached child. Reaped by a background thread once it exits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackgroundProcess {
    pub pid: u32,
    pub command: String,
}

/// Runs runtime commands with per-prefix environment scoping.
///
/// The runtime binary is located on every call so that a missing runtime is
/// reported at the operation that needs it, not at construction.
#[derive(Debug, Clone)]
pub struct Invoker {
    platform: Arc<dyn Platform>,
    runtime_override: Option<PathBuf>,
    winedebug: String,
}

impl Invoker {
    pub fn new(platform: Arc<dyn Platform>, runtime_override: Option<PathBuf>) -> Self {
        Self {
            platform,
            runtime_override,
            winedebug: "-all".to_owned(),
        }
    }

    #[must_use]
    pub fn with_winedebug(mut self, winedebug: impl Into<String>) -> Self {
        self.winedebug = winedebug.into();
        self
    }

    pub fn platform(&self) -> &dyn Platform {
        self.platform.as_ref()
    }

    pub fn locate_runtime(&self) -> Result<PathBuf, RuntimeError> {
        self.platform
            .locate_runtime_binary(self.runtime_override.as_deref())
            .ok_or_else(|| match &self.runtime_override {
                Some(p) => RuntimeError::RuntimeMissing(format!(
                    "{} does not exist or is not executable",
                    p.display()
                )),
                None => RuntimeError::RuntimeMissing(format!(
                    "'wine' is not on PATH or in any {} search path",
                    self.platform.name()
                )),
            })
    }

    /// Variables set on a child running inside `scope`.
    pub fn scoped_env(&self, scope: &Scope) -> Vec<(String, String)> {
        let mut env: Vec<(String, String)> = scope
            .env
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        env.extend([
            (
                "WINEPREFIX".to_owned(),
                scope.prefix_path.display().to_string(),
            ),
            ("WINEARCH".to_owned(), scope.architecture.as_str().to_owned()),
            ("WINEDEBUG".to_owned(), self.winedebug.clone()),
        ]);
        if let Some(ref name) = scope.prefix_name {
            env.push(("WINVORA_PREFIX".to_owned(), name.clone()));
        }
        if let Some(renderer) = scope.renderer {
            env.push((
                "WINE_D3D_CONFIG".to_owned(),
                format!("renderer={}", renderer.as_str()),
            ));
        }
        if let Some(csmt) = scope.csmt {
            env.push(("CSMT".to_owned(), if csmt { "1" } else { "0" }.to_owned()));
        }
        env.extend(self.platform.display_environment());
        env
    }

    fn command(&self, inv: &Invocation) -> Result<Command, RuntimeError> {
        let program = match &inv.program {
            Program::Runtime => self.locate_runtime()?,
            Program::Path(p) => p.clone(),
        };
        let mut cmd = Command::new(program);
        cmd.args(&inv.args);
        if let Some(ref scope) = inv.scope {
            cmd.envs(self.scoped_env(scope));
        }
        cmd.envs(inv.env.iter().map(|(k, v)| (k, v)));
        if let Some(ref dir) = inv.working_dir {
            cmd.current_dir(dir);
        }
        // Own process group so a timeout can take down everything the
        // runtime forked (wineserver helpers, installers).
        cmd.process_group(0);
        Ok(cmd)
    }

    /// Run a command to completion, capturing output, bounded by `inv.timeout`.
    pub fn run(&self, inv: &Invocation) -> Result<CommandOutput, RuntimeError> {
        let label = inv.describe();
        let mut cmd = self.command(inv)?;
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!("running {label} (timeout {}s)", inv.timeout.as_secs());
        let mut child = spawn_with_retry(&mut cmd, &label)?;
        let pid = child.id();
        let stdout_rx = drain(child.stdout.take());
        let stderr_rx = drain(child.stderr.take());

        let status = match wait_with_deadline(&mut child, Instant::now() + inv.timeout)? {
            Some(status) => status,
            None => {
                warn!("{label} exceeded {}s, killing process group {pid}", inv.timeout.as_secs());
                kill_process_group(pid);
                let _ = child.kill();
                let _ = child.wait();
                return Err(RuntimeError::Timeout {
                    command: label,
                    seconds: inv.timeout.as_secs(),
                });
            }
        };

        let join_deadline = Instant::now() + OUTPUT_JOIN_TIMEOUT;
        let output = CommandOutput {
            command: label,
            exit_code: exit_code(status),
            stdout: collect(&stdout_rx, join_deadline),
            stderr: collect(&stderr_rx, join_deadline),
        };
        debug!("{} exited with {}", output.command, output.exit_code);
        Ok(output)
    }

    /// Start a command without waiting for it.
    pub fn spawn(&self, inv: &Invocation) -> Result<BackgroundProcess, RuntimeError> {
        let label = inv.describe();
        let mut cmd = self.command(inv)?;
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        let mut child = spawn_with_retry(&mut cmd, &label)?;
        let pid = child.id();
        debug!("spawned {label} as pid {pid}");

        thread::Builder::new()
            .name(format!("reap-{pid}"))
            .spawn(move || {
                let _ = child.wait();
            })?;

        Ok(BackgroundProcess {
            pid,
            command: label,
        })
    }

    /// `wine --version`, trimmed.
    pub fn version(&self, timeout: Duration) -> Result<String, RuntimeError> {
        let out = self
            .run(&Invocation::runtime(["--version"], timeout))?
            .check()?;
        Ok(out.stdout.trim().to_owned())
    }
}

fn spawn_with_retry(cmd: &mut Command, label: &str) -> Result<Child, RuntimeError> {
    let mut attempt = 0;
    loop {
        match cmd.spawn() {
            Ok(child) => return Ok(child),
            // Binary still open for writing (e.g. just replaced); retry briefly.
            Err(e) if e.raw_os_error() == Some(libc::ETXTBSY) && attempt < SPAWN_RETRIES => {
                attempt += 1;
                debug!("{label}: text file busy, retry {attempt}");
                thread::sleep(Duration::from_millis(20 * u64::from(attempt)));
            }
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                return Err(RuntimeError::PermissionDenied(format!("{label}: {e}")));
            }
            Err(e) => {
                return Err(RuntimeError::Spawn {
                    command: label.to_owned(),
                    source: e,
                })
            }
        }
    }
}

fn wait_with_deadline(
    child: &mut Child,
    deadline: Instant,
) -> Result<Option<ExitStatus>, RuntimeError> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> mpsc::Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    if let Some(mut pipe) = pipe {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            let _ = tx.send(buf);
        });
    }
    rx
}

/// A grandchild that inherited the pipe may keep it open after the child
/// exits; give up on the rest of the output rather than block.
fn collect(rx: &mpsc::Receiver<Vec<u8>>, deadline: Instant) -> String {
    rx.recv_timeout(deadline.saturating_duration_since(Instant::now()))
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .or_else(|| status.signal().map(|s| 128 + s))
        .unwrap_or(-1)
}

fn kill_process_group(pid: u32) {
    let Ok(pgid) = i32::try_from(pid) else {
        return;
    };
    // SAFETY: killpg with a pgid we created via process_group(0) and a valid signal.
    #[allow(unsafe_code)]
    let ret = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if ret != 0 {
        let errno = std::io::Error::last_os_error();
        if errno.raw_os_error() != Some(libc::ESRCH) {
            warn!("failed to kill process group {pgid}: {errno}");
        }
    }
}

/// Whether `path` looks like a Windows path (`C:\...`) the runtime resolves itself.
pub fn is_windows_path(path: &Path) -> bool {
    let s = path.to_string_lossy();
    let b = s.as_bytes();
    b.len() >= 3 && b[0].is_ascii_alphabetic() && b[1] == b':' && (b[2] == b'\\' || b[2] == b'/')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::is_alive;
    use crate::platform::LinuxPlatform;

    fn invoker() -> Invoker {
        Invoker::new(Arc::new(LinuxPlatform), None)
    }

    fn sh(script: &str, timeout: Duration) -> Invocation {
        Invocation::program("/bin/sh", timeout).args(["-c", script])
    }

    #[test]
    fn run_captures_stdout_and_exit_code() {
        let out = invoker()
            .run(&sh("echo hello; echo oops >&2; exit 3", Duration::from_secs(10)))
            .unwrap();
        assert_eq!(out.exit_code, 3);
        assert_eq!(out.stdout.trim(), "hello");
        assert_eq!(out.stderr.trim(), "oops");
        assert!(!out.success());
    }

    #[test]
    fn check_maps_nonzero_exit_to_error() {
        let out = invoker()
            .run(&sh("echo bad >&2; exit 2", Duration::from_secs(10)))
            .unwrap();
        match out.check() {
            Err(RuntimeError::ExitFailure { code, stderr, .. }) => {
                assert_eq!(code, 2);
                assert_eq!(stderr, "bad");
            }
            other => panic!("expected ExitFailure, got {other:?}"),
        }
    }

    #[test]
    fn scope_sets_prefix_variables_on_child_only() {
        let mut scope = Scope::new("/tmp/some-prefix", Architecture::Win32);
        scope.prefix_name = Some("games".to_owned());
        scope.renderer = Some(Renderer::Vulkan);
        scope.csmt = Some(true);
        let inv = sh(
            "echo \"$WINEPREFIX|$WINEARCH|$WINVORA_PREFIX|$WINE_D3D_CONFIG|$CSMT|$WINEDEBUG\"",
            Duration::from_secs(10),
        )
        .scope(scope);
        let out = invoker().run(&inv).unwrap();
        assert_eq!(
            out.stdout.trim(),
            "/tmp/some-prefix|win32|games|renderer=vulkan|1|-all"
        );
        assert!(std::env::var_os("WINVORA_PREFIX").is_none());
    }

    #[test]
    fn scope_env_cannot_override_prefix_variables() {
        let mut scope = Scope::new("/tmp/owned", Architecture::Win64);
        scope.env.insert("DXVK_HUD".to_owned(), "fps".to_owned());
        scope.env.insert("WINEPREFIX".to_owned(), "/elsewhere".to_owned());
        let inv = sh("echo \"$DXVK_HUD|$WINEPREFIX\"", Duration::from_secs(10)).scope(scope);
        let out = invoker().run(&inv).unwrap();
        assert_eq!(out.stdout.trim(), "fps|/tmp/owned");
    }

    #[test]
    fn extra_env_overrides_scope() {
        let inv = sh("echo $WINEDEBUG", Duration::from_secs(10))
            .scope(Scope::new("/tmp/p", Architecture::Win64))
            .env("WINEDEBUG", "+relay");
        let out = invoker().run(&inv).unwrap();
        assert_eq!(out.stdout.trim(), "+relay");
    }

    #[test]
    fn working_dir_is_applied() {
        let dir = tempfile::tempdir().unwrap();
        let inv = sh("pwd", Duration::from_secs(10)).current_dir(dir.path());
        let out = invoker().run(&inv).unwrap();
        let expected = dir.path().canonicalize().unwrap();
        assert_eq!(
            PathBuf::from(out.stdout.trim()).canonicalize().unwrap(),
            expected
        );
    }

    #[test]
    fn timeout_kills_child_and_grandchildren() {
        let dir = tempfile::tempdir().unwrap();
        let pidfile = dir.path().join("grandchild.pid");
        let script = format!("sleep 30 & echo $! > {}; wait", pidfile.display());
        let start = Instant::now();
        let err = invoker()
            .run(&sh(&script, Duration::from_secs(1)))
            .unwrap_err();
        let elapsed = start.elapsed();
        assert!(matches!(err, RuntimeError::Timeout { seconds: 1, .. }));
        assert!(elapsed < Duration::from_secs(5), "took {elapsed:?}");

        let grandchild: u32 = std::fs::read_to_string(&pidfile)
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        let deadline = Instant::now() + Duration::from_secs(2);
        while is_alive(grandchild) && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(20));
        }
        assert!(!is_alive(grandchild), "grandchild {grandchild} survived");
    }

    #[test]
    fn lingering_pipe_holder_does_not_block() {
        // The background sleeper keeps stdout open after sh exits.
        let start = Instant::now();
        let out = invoker()
            .run(&sh("echo done; (sleep 5 &) ; exit 0", Duration::from_secs(10)))
            .unwrap();
        assert!(out.success());
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn spawn_returns_immediately() {
        let start = Instant::now();
        let bg = invoker()
            .spawn(&sh("sleep 5", Duration::from_secs(1)))
            .unwrap();
        assert!(start.elapsed() < Duration::from_secs(1));
        assert!(bg.pid > 0);
        assert!(is_alive(bg.pid));
        // SAFETY: test cleanup of our own child.
        #[allow(unsafe_code)]
        unsafe {
            libc::kill(bg.pid as i32, libc::SIGKILL);
        }
    }

    #[test]
    fn missing_program_is_spawn_error() {
        let err = invoker()
            .run(&Invocation::program(
                "/nonexistent/winvora-test-binary",
                Duration::from_secs(1),
            ))
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Spawn { .. }));
    }

    #[test]
    fn missing_runtime_override_is_runtime_missing() {
        let inv = Invoker::new(
            Arc::new(LinuxPlatform),
            Some(PathBuf::from("/nonexistent/wine")),
        );
        let err = inv
            .run(&Invocation::runtime(["--version"], Duration::from_secs(1)))
            .unwrap_err();
        assert!(matches!(err, RuntimeError::RuntimeMissing(_)));
    }

    #[test]
    fn describe_truncates_long_argument_lists() {
        let inv = Invocation::runtime(["reg", "add", "HKCU\\Software", "/v", "x"], Duration::ZERO);
        assert_eq!(inv.describe(), "wine reg add HKCU\\Software ...");
    }

    #[test]
    fn windows_paths_detected() {
        assert!(is_windows_path(Path::new("C:\\Program Files\\app.exe")));
        assert!(is_windows_path(Path::new("d:/games/run.exe")));
        assert!(!is_windows_path(Path::new("/home/user/app.exe")));
        assert!(!is_windows_path(Path::new("app.exe")));
    }
}

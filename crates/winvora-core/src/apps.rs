//! Installing and launching Windows executables inside a prefix.
//!
//! Both operations only read the registry. The prefix must be ready, and all
//! validation happens before the runtime is started.

use crate::manager::Manager;
use crate::{CoreError, OperationResult};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use winvora_runtime::{is_windows_path, Invocation, Scope};

/// Installer exit codes that mean the install went through: success, reboot
/// required and reboot initiated.
pub const INSTALL_SUCCESS_CODES: [i32; 3] = [0, 3010, 1641];

/// What to launch and how.
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    pub prefix: String,
    pub executable: PathBuf,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    /// Return right after spawning instead of waiting for exit.
    pub background: bool,
    pub env: Vec<(String, String)>,
    /// Overrides the configured run timeout for foreground launches.
    pub timeout: Option<Duration>,
}

impl LaunchRequest {
    pub fn new(prefix: impl Into<String>, executable: impl Into<PathBuf>) -> Self {
        Self {
            prefix: prefix.into(),
            executable: executable.into(),
            args: Vec::new(),
            working_dir: None,
            background: true,
            env: Vec::new(),
            timeout: None,
        }
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn foreground(mut self) -> Self {
        self.background = false;
        self
    }

    #[must_use]
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LaunchOutcome {
    Launched { pid: u32 },
    Completed { exit_code: i32, stdout: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InstallerKind {
    Msi,
    Exe,
}

fn installer_kind(path: &Path) -> Result<InstallerKind, CoreError> {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase());
    match ext.as_deref() {
        Some("msi") => Ok(InstallerKind::Msi),
        Some("exe") => Ok(InstallerKind::Exe),
        _ => Err(CoreError::InvalidOption(format!(
            "{} is not an installer (expected .exe or .msi)",
            path.display()
        ))),
    }
}

fn installer_args(kind: InstallerKind, path: &Path, silent: bool) -> Vec<String> {
    let path = path.display().to_string();
    let mut args = match kind {
        InstallerKind::Msi => vec!["msiexec".to_owned(), "/i".to_owned(), path],
        InstallerKind::Exe => vec![path],
    };
    if silent {
        args.push(match kind {
            InstallerKind::Msi => "/qn".to_owned(),
            InstallerKind::Exe => "/S".to_owned(),
        });
    }
    args
}

impl Manager {
    /// Run an installer to completion inside a prefix.
    ///
    /// A non-success exit is not an error: the exit code is reported in the
    /// result with `success == false`.
    pub fn install(
        &self,
        name: &str,
        installer: &Path,
        silent: bool,
    ) -> Result<OperationResult, CoreError> {
        let result = self.install_inner(name, installer, silent);
        self.journal("install", name, &result, |r| r.message.clone());
        result
    }

    fn install_inner(
        &self,
        name: &str,
        installer: &Path,
        silent: bool,
    ) -> Result<OperationResult, CoreError> {
        let record = self.ready_record(name)?;
        if !installer.is_file() {
            return Err(CoreError::ExecutableNotFound(
                installer.display().to_string(),
            ));
        }
        let kind = installer_kind(installer)?;

        info!("installing {} into '{name}'", installer.display());
        let mut inv = Invocation::runtime(
            installer_args(kind, installer, silent),
            self.settings().timeouts.install(),
        )
        .scope(Scope::for_record(&record));
        if let Some(dir) = installer.parent().filter(|d| d.is_dir()) {
            inv = inv.current_dir(dir);
        }

        let out = self
            .invoker()
            .run(&inv)
            .map_err(|e| CoreError::from_runtime(name, "install", e))?;

        let file = installer.file_name().map_or_else(
            || installer.display().to_string(),
            |f| f.to_string_lossy().into_owned(),
        );
        let success = INSTALL_SUCCESS_CODES.contains(&out.exit_code);
        let message = match out.exit_code {
            0 => format!("installed {file} into '{name}'"),
            3010 | 1641 => format!("installed {file} into '{name}' (reboot requested)"),
            code => format!("installer {file} exited with code {code}"),
        };
        Ok(OperationResult {
            success,
            message,
            exit_code: Some(out.exit_code),
        })
    }

    /// Launch an executable inside a prefix.
    pub fn run(&self, request: &LaunchRequest) -> Result<LaunchOutcome, CoreError> {
        let result = self.run_inner(request);
        self.journal("run", &request.prefix, &result, |o| match o {
            LaunchOutcome::Launched { pid } => {
                format!("{} launched as pid {pid}", request.executable.display())
            }
            LaunchOutcome::Completed { exit_code, .. } => {
                format!("{} exited with {exit_code}", request.executable.display())
            }
        });
        result
    }

    fn run_inner(&self, request: &LaunchRequest) -> Result<LaunchOutcome, CoreError> {
        let name = request.prefix.as_str();
        let record = self.ready_record(name)?;
        let exe = request.executable.as_path();
        let windows_path = is_windows_path(exe);
        if !windows_path && !exe.is_file() {
            return Err(CoreError::ExecutableNotFound(exe.display().to_string()));
        }

        let working_dir = match request.working_dir {
            Some(ref dir) => {
                if !dir.is_dir() {
                    return Err(CoreError::InvalidOption(format!(
                        "working directory {} does not exist",
                        dir.display()
                    )));
                }
                Some(dir.clone())
            }
            None if windows_path => None,
            None => exe.parent().filter(|d| d.is_dir()).map(Path::to_path_buf),
        };

        let timeout = request
            .timeout
            .unwrap_or_else(|| self.settings().timeouts.run());
        let mut inv = Invocation::runtime([exe.as_os_str()], timeout)
            .args(&request.args)
            .scope(Scope::for_record(&record));
        for (key, value) in &request.env {
            inv = inv.env(key.clone(), value.clone());
        }
        if let Some(dir) = working_dir {
            inv = inv.current_dir(dir);
        }

        if request.background {
            let bg = self
                .invoker()
                .spawn(&inv)
                .map_err(|e| CoreError::from_runtime(name, "run", e))?;
            info!("launched {} in '{name}' as pid {}", exe.display(), bg.pid);
            return Ok(LaunchOutcome::Launched { pid: bg.pid });
        }

        info!("running {} in '{name}'", exe.display());
        let out = self
            .invoker()
            .run(&inv)
            .map_err(|e| CoreError::from_runtime(name, "run", e))?;
        if !out.success() {
            return Err(CoreError::LaunchFailed {
                executable: exe.display().to_string(),
                exit_code: out.exit_code,
                stderr: out.stderr.trim().to_owned(),
            });
        }
        Ok(LaunchOutcome::Completed {
            exit_code: out.exit_code,
            stdout: out.stdout,
        })
    }
}

use crate::concurrency::shutdown_requested;
use crate::configure::{check_against, plan, ConfigStep, ConfigureRequest};
use crate::journal::{JsonlJournal, OperationRecord, OperationSink};
use crate::lifecycle::validate_transition;
use crate::settings::Settings;
use crate::template::{find_template, PrefixTemplate};
use crate::{CoreError, OperationResult};
use serde::Serialize;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use winvora_runtime::{
    check_runtime_prereqs, current_owner, installed_runtimes, owner_alive, CommandOutput,
    InstalledRuntime, Invocation, Invoker, KillOutcome, KillReport, ManagedProcess, MissingPrereq,
    Platform, ProcessMonitor, RuntimeError, Scope,
};
use winvora_store::{
    ensure_unique, is_initialized_prefix, validate_env_name, Architecture, EnvRecord, EnvState,
    Layout, Registry, StoreError, WindowsVersion,
};

const MIB: u64 = 1024 * 1024;

/// Optional parameters for [`Manager::create`]. Unset fields fall back to
/// the settings defaults.
#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    pub path: Option<PathBuf>,
    pub windows_version: Option<WindowsVersion>,
    pub architecture: Option<Architecture>,
    /// Builtin template name. An explicit `windows_version` still wins over
    /// the template's.
    pub template: Option<String>,
}

/// Registry record plus what the filesystem and process table say about it.
#[derive(Debug, Clone, Serialize)]
pub struct EnvStatus {
    #[serde(flatten)]
    pub record: EnvRecord,
    pub root_exists: bool,
    pub initialized: bool,
    pub running_processes: usize,
}

impl EnvStatus {
    pub fn is_ready(&self) -> bool {
        self.record.state == EnvState::Ready && self.initialized
    }
}

/// An initialised prefix directory under the prefixes dir with no record.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DiscoveredPrefix {
    pub name: String,
    pub path: PathBuf,
}

/// Owns the registry and drives the runtime for every prefix operation.
pub struct Manager {
    settings: Settings,
    layout: Layout,
    registry: Registry,
    invoker: Invoker,
    monitor: ProcessMonitor,
    sink: Box<dyn OperationSink>,
}

impl Manager {
    /// Open the registry under `config_dir` and finish any operation a
    /// previous process left half-done.
    pub fn new(
        config_dir: impl Into<PathBuf>,
        settings: Settings,
        platform: Arc<dyn Platform>,
    ) -> Result<Self, CoreError> {
        settings.validate()?;
        let prefixes_dir = settings
            .prefixes_dir
            .clone()
            .unwrap_or_else(|| platform.default_paths().prefixes_dir);
        let layout = Layout::new(config_dir, prefixes_dir);
        layout.initialize()?;

        let invoker = Invoker::new(platform, settings.runtime_path.clone())
            .with_winedebug(settings.winedebug.clone());
        let monitor = ProcessMonitor::new(settings.kill_grace());
        let sink: Box<dyn OperationSink> = Box::new(JsonlJournal::new(layout.logs_dir()));

        let manager = Self {
            settings,
            registry: Registry::new(layout.clone()),
            layout,
            invoker,
            monitor,
            sink,
        };
        manager.recover()?;
        Ok(manager)
    }

    #[must_use]
    pub fn with_sink(mut self, sink: Box<dyn OperationSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// The invoker, for collaborators that run their own runtime commands.
    pub fn invoker(&self) -> &Invoker {
        &self.invoker
    }

    pub(crate) fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Reset interrupted configures and finish interrupted deletes.
    ///
    /// Only records whose owner process is gone count as interrupted; an
    /// operation still running in another process keeps its state. Skipped
    /// entirely when the registry lock is busy.
    fn recover(&self) -> Result<(), CoreError> {
        let Some(lock) = self.registry.try_lock()? else {
            debug!("registry busy, skipping recovery");
            return Ok(());
        };
        self.registry.transaction_locked(&lock, |records| {
            let mut finished = Vec::new();
            for rec in records.values_mut() {
                if rec.state == EnvState::Ready {
                    continue;
                }
                if let Some(owner) = rec.owner.filter(owner_alive) {
                    debug!(
                        "'{}' is {} by live pid {}, leaving it",
                        rec.name, rec.state, owner.pid
                    );
                    continue;
                }
                match rec.state {
                    EnvState::Configuring => {
                        warn!("recovery: '{}' was left configuring, marking ready", rec.name);
                        rec.state = EnvState::Ready;
                        rec.owner = None;
                        rec.touch();
                    }
                    EnvState::Creating | EnvState::Deleting => {
                        warn!("recovery: finishing removal of '{}'", rec.name);
                        if let Err(e) = remove_tree(&rec.path) {
                            warn!("recovery: could not remove {}: {e}", rec.path.display());
                        }
                        finished.push(rec.name.clone());
                    }
                    EnvState::Ready => {}
                }
            }
            for name in finished {
                records.remove(&name);
            }
            Ok::<_, CoreError>(())
        })
    }

    pub(crate) fn journal<T>(
        &self,
        operation: &str,
        target: &str,
        result: &Result<T, CoreError>,
        detail: impl FnOnce(&T) -> String,
    ) {
        let record = match result {
            Ok(v) => OperationRecord::new(operation, target, true, detail(v)),
            Err(e) => OperationRecord::new(operation, target, false, e.to_string()),
        };
        if let Err(e) = self.sink.record(&record) {
            warn!("failed to write operation journal: {e}");
        }
    }

    // --- Lifecycle ---

    pub fn create(&self, name: &str, opts: &CreateOptions) -> Result<OperationResult, CoreError> {
        let result = self.create_inner(name, opts);
        self.journal("create", name, &result, |r| r.message.clone());
        result
    }

    fn create_inner(&self, name: &str, opts: &CreateOptions) -> Result<OperationResult, CoreError> {
        validate_env_name(name)?;
        let template = opts.template.as_deref().map(find_template).transpose()?;
        let version = opts
            .windows_version
            .or(template.as_ref().map(|t| t.windows_version))
            .unwrap_or(self.settings.default_windows_version);
        let arch = opts
            .architecture
            .unwrap_or(self.settings.default_architecture);
        let root = match opts.path {
            Some(ref p) => normalize_path(p)?,
            None => self.layout.default_prefix_path(name),
        };
        self.ensure_outside_config(&root)?;
        info!("creating prefix '{name}' ({version}, {arch}) at {}", root.display());

        {
            let _lock = self.registry.lock()?;
            let records = self.registry.load()?;
            ensure_unique(&records, name, &root)?;
            self.invoker.locate_runtime()?;
            self.ensure_free_space(&root)?;
            if let Some(parent) = root.parent() {
                fs::create_dir_all(parent)?;
            }
            // Atomic reservation: a concurrent create of the same root fails here.
            match fs::create_dir(&root) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    return Err(CoreError::AlreadyExists(format!(
                        "{} already exists on disk",
                        root.display()
                    )));
                }
                Err(e) => return Err(e.into()),
            }
        }

        let mut record = EnvRecord::new(name, &root, version, arch);
        if let Some(ref t) = template {
            record.template = Some(t.name.to_owned());
            record.settings.env.clone_from(&t.env);
        }
        if let Err(e) = self.bootstrap(&record) {
            return Err(rollback_create(name, &root, e));
        }
        if let Some(ref t) = template {
            self.apply_template(&mut record, t);
        }

        let committed = self.registry.transaction(|records| {
            ensure_unique(records, name, &root)?;
            records.insert(name.to_owned(), record.clone());
            Ok::<_, StoreError>(())
        });
        if let Err(e) = committed {
            return Err(rollback_create(name, &root, e.into()));
        }

        info!("prefix '{name}' ready");
        Ok(OperationResult::ok(format!(
            "created prefix '{name}' at {}",
            root.display()
        )))
    }

    fn bootstrap(&self, record: &EnvRecord) -> Result<(), CoreError> {
        let name = record.name.as_str();
        let scope = Scope::for_record(record);

        let boot = Invocation::runtime(["wineboot", "-i"], self.settings.timeouts.boot())
            .scope(scope.clone());
        self.invoker
            .run(&boot)
            .and_then(CommandOutput::check)
            .map_err(|e| CoreError::from_runtime(name, "wineboot", e))?;

        if !is_initialized_prefix(&record.path) {
            return Err(CoreError::EnvironmentNotReady {
                name: name.to_owned(),
                reason: "wineboot finished but drive_c was not created".to_owned(),
            });
        }

        let winecfg = Invocation::runtime(
            ["winecfg".to_owned(), format!("/v:{}", record.windows_version)],
            self.settings.timeouts.configure(),
        )
        .scope(scope);
        match self.invoker.run(&winecfg).and_then(CommandOutput::check) {
            Ok(_) => {}
            Err(e) => warn!(
                "prefix '{name}' created but setting Windows version {} failed: {e}",
                record.windows_version
            ),
        }
        Ok(())
    }

    /// Template options are best effort: a failing step is logged and left
    /// out of the record, the prefix is still created.
    fn apply_template(&self, record: &mut EnvRecord, template: &PrefixTemplate) {
        if template.options.is_empty() {
            return;
        }
        let steps = match plan(&template.options) {
            Ok(steps) => steps,
            Err(e) => {
                warn!("template '{}' has invalid options: {e}", template.name);
                return;
            }
        };
        let scope = Scope::for_record(record);
        for step in &steps {
            match self.apply_step(&record.name, &scope, step) {
                Ok(()) => step.apply_to(record),
                Err(e) => warn!(
                    "template '{}' on '{}': {} failed: {e}",
                    template.name,
                    record.name,
                    step.label()
                ),
            }
        }
    }

    /// Prefix roots must not contain, or sit inside, the configuration
    /// directory: deleting the prefix would take the registry with it.
    fn ensure_outside_config(&self, root: &Path) -> Result<(), CoreError> {
        let config = normalize_path(self.layout.config_dir())
            .unwrap_or_else(|_| self.layout.config_dir().to_path_buf());
        if root.starts_with(&config) || config.starts_with(root) {
            return Err(CoreError::InvalidOption(format!(
                "{} overlaps the configuration directory {}",
                root.display(),
                config.display()
            )));
        }
        Ok(())
    }

    fn ensure_free_space(&self, target: &Path) -> Result<(), CoreError> {
        let required_mb = self.settings.min_free_space_mb;
        if required_mb == 0 {
            return Ok(());
        }
        let existing = target
            .ancestors()
            .find(|p| p.exists())
            .unwrap_or_else(|| Path::new("/"));
        let available_mb = fs2::available_space(existing)? / MIB;
        debug!("{available_mb} MB free at {}", existing.display());
        if available_mb < required_mb {
            return Err(CoreError::InsufficientSpace {
                path: existing.display().to_string(),
                available_mb,
                required_mb,
            });
        }
        Ok(())
    }

    /// All prefixes, ordered by name.
    pub fn list(&self) -> Result<Vec<EnvRecord>, CoreError> {
        Ok(self.registry.list()?)
    }

    pub fn info(&self, name: &str) -> Result<EnvRecord, CoreError> {
        Ok(self.registry.get(name)?)
    }

    pub fn status(&self, name: &str) -> Result<EnvStatus, CoreError> {
        let record = self.info(name)?;
        Ok(EnvStatus {
            root_exists: record.path.is_dir(),
            initialized: record.is_initialized(),
            running_processes: self.monitor.list(Some(&record.path)).len(),
            record,
        })
    }

    pub fn delete(&self, name: &str) -> Result<OperationResult, CoreError> {
        let result = self.delete_inner(name);
        self.journal("delete", name, &result, |r| r.message.clone());
        result
    }

    fn delete_inner(&self, name: &str) -> Result<OperationResult, CoreError> {
        info!("deleting prefix '{name}'");
        let record = self.registry.transaction(|records| {
            let rec = records
                .get_mut(name)
                .ok_or_else(|| CoreError::NotFound(name.to_owned()))?;
            validate_transition(rec.state, EnvState::Deleting)?;
            rec.state = EnvState::Deleting;
            rec.owner = Some(current_owner());
            rec.touch();
            Ok::<_, CoreError>(rec.clone())
        })?;

        let mut completed = vec!["marked deleting".to_owned()];
        let mut failed = Vec::new();

        let running = self.monitor.list(Some(&record.path));
        if !running.is_empty() {
            warn!(
                "{} process(es) still running in '{name}', terminating",
                running.len()
            );
            let pids: Vec<u32> = running.iter().map(|p| p.pid).collect();
            let report = self.monitor.kill_pids(&pids, shutdown_requested);
            if report.is_success() {
                completed.push(format!("terminated {} process(es)", report.total()));
            } else {
                warn!(
                    "could not terminate {} process(es) in '{name}', removing files anyway",
                    report.failed.len()
                );
                failed.extend(
                    report
                        .failed
                        .iter()
                        .map(|(pid, e)| format!("terminate pid {pid}: {e}")),
                );
            }
        }

        match remove_tree(&record.path) {
            Ok(()) => completed.push(format!("removed {}", record.path.display())),
            Err(e) => {
                warn!("failed to remove {}: {e}", record.path.display());
                failed.push(format!("remove {}: {e}", record.path.display()));
            }
        }

        // Terminal: the record goes even when the tree could not be removed.
        match self.registry.transaction(|records| {
            records.remove(name);
            Ok::<_, StoreError>(())
        }) {
            Ok(()) => completed.push("removed registry record".to_owned()),
            Err(e) => failed.push(format!("remove registry record: {e}")),
        }

        if failed.is_empty() {
            info!("prefix '{name}' deleted");
            Ok(OperationResult::ok(format!("deleted prefix '{name}'")))
        } else {
            Err(CoreError::PartialFailure {
                operation: "delete".to_owned(),
                name: name.to_owned(),
                completed,
                failed,
            })
        }
    }

    pub fn configure(
        &self,
        name: &str,
        request: &ConfigureRequest,
    ) -> Result<OperationResult, CoreError> {
        let result = self.configure_inner(name, request);
        self.journal("configure", name, &result, |r| r.message.clone());
        result
    }

    fn configure_inner(
        &self,
        name: &str,
        request: &ConfigureRequest,
    ) -> Result<OperationResult, CoreError> {
        let steps = plan(request)?;
        let record = self.registry.transaction(|records| {
            let rec = records
                .get_mut(name)
                .ok_or_else(|| CoreError::NotFound(name.to_owned()))?;
            if !rec.is_initialized() {
                return Err(not_initialized(rec));
            }
            check_against(&steps, rec)?;
            validate_transition(rec.state, EnvState::Configuring)?;
            rec.state = EnvState::Configuring;
            rec.owner = Some(current_owner());
            rec.touch();
            Ok(rec.clone())
        })?;
        info!("configuring prefix '{name}' ({} option(s))", steps.len());

        let scope = Scope::for_record(&record);
        let mut applied = Vec::new();
        let mut failures: Vec<(String, CoreError)> = Vec::new();
        for step in &steps {
            match self.apply_step(name, &scope, step) {
                Ok(()) => applied.push(step),
                Err(e) => {
                    warn!("configure '{name}': {} failed: {e}", step.label());
                    failures.push((step.label(), e));
                }
            }
        }

        self.registry.transaction(|records| {
            if let Some(rec) = records.get_mut(name) {
                for step in &applied {
                    step.apply_to(rec);
                }
                validate_transition(rec.state, EnvState::Ready)?;
                rec.state = EnvState::Ready;
                rec.owner = None;
                rec.touch();
            }
            Ok::<_, CoreError>(())
        })?;

        let completed: Vec<String> = applied.iter().map(|s| s.label()).collect();
        if failures.is_empty() {
            return Ok(OperationResult::ok(format!(
                "configured '{name}': {}",
                completed.join(", ")
            )));
        }
        if completed.is_empty() && failures.len() == 1 {
            return Err(failures.remove(0).1);
        }
        Err(CoreError::PartialFailure {
            operation: "configure".to_owned(),
            name: name.to_owned(),
            completed,
            failed: failures
                .into_iter()
                .map(|(label, e)| format!("{label}: {e}"))
                .collect(),
        })
    }

    fn apply_step(
        &self,
        name: &str,
        scope: &Scope,
        step: &ConfigStep,
    ) -> Result<(), CoreError> {
        for cmd in step.commands() {
            let inv = Invocation::runtime(&cmd.args, self.settings.timeouts.configure())
                .scope(scope.clone());
            let out = self
                .invoker
                .run(&inv)
                .map_err(|e| CoreError::from_runtime(name, "configure", e))?;
            if !out.success() {
                if cmd.may_fail {
                    debug!("{} exited {} (ignored)", out.command, out.exit_code);
                    continue;
                }
                return Err(CoreError::from_runtime(
                    name,
                    "configure",
                    RuntimeError::ExitFailure {
                        command: out.command,
                        code: out.exit_code,
                        stderr: out.stderr.trim().to_owned(),
                    },
                ));
            }
        }
        Ok(())
    }

    // --- Runtime and discovery ---

    /// `wine --version` of the located runtime.
    pub fn runtime_version(&self) -> Result<String, CoreError> {
        self.invoker
            .version(self.settings.timeouts.quick())
            .map_err(|e| CoreError::from_runtime("runtime", "wine --version", e))
    }

    pub fn check_runtime(&self) -> Vec<MissingPrereq> {
        check_runtime_prereqs(
            self.invoker.platform(),
            self.settings.runtime_path.as_deref(),
        )
    }

    /// The platform's runtime plus the Wine builds unpacked under the
    /// runtimes directory.
    pub fn runtimes(&self) -> Vec<InstalledRuntime> {
        installed_runtimes(self.invoker.platform(), &self.runtimes_dir())
    }

    pub fn runtimes_dir(&self) -> PathBuf {
        self.settings
            .runtimes_dir
            .clone()
            .unwrap_or_else(|| self.invoker.platform().default_paths().runtimes_dir)
    }

    /// Initialised prefix directories under the prefixes dir that are not
    /// registered, e.g. left by another tool or a lost registry.
    pub fn discover(&self) -> Result<Vec<DiscoveredPrefix>, CoreError> {
        let records = self.registry.load()?;
        let entries = match fs::read_dir(self.layout.prefixes_dir()) {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut found = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if !is_initialized_prefix(&path) || records.values().any(|r| r.path == path) {
                continue;
            }
            let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                continue;
            };
            found.push(DiscoveredPrefix { name, path });
        }
        found.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(found)
    }

    /// Open the Wine configuration dialog for a prefix without waiting.
    pub fn open_winecfg(&self, name: &str) -> Result<u32, CoreError> {
        let result = self.open_winecfg_inner(name);
        self.journal("winecfg", name, &result, |pid| format!("pid {pid}"));
        result
    }

    fn open_winecfg_inner(&self, name: &str) -> Result<u32, CoreError> {
        let record = self.ready_record(name)?;
        let inv = Invocation::runtime(["winecfg"], self.settings.timeouts.quick())
            .scope(Scope::for_record(&record));
        let bg = self
            .invoker
            .spawn(&inv)
            .map_err(|e| CoreError::from_runtime(name, "winecfg", e))?;
        Ok(bg.pid)
    }

    /// The record, provided the prefix can host application operations.
    pub(crate) fn ready_record(&self, name: &str) -> Result<EnvRecord, CoreError> {
        let record = self.info(name)?;
        if record.state != EnvState::Ready {
            return Err(CoreError::EnvironmentNotReady {
                name: name.to_owned(),
                reason: format!("state is {}", record.state),
            });
        }
        if !record.is_initialized() {
            return Err(not_initialized(&record));
        }
        Ok(record)
    }

    // --- Processes ---

    /// Runtime processes, restricted to one prefix when `name` is given.
    pub fn processes(&self, name: Option<&str>) -> Result<Vec<ManagedProcess>, CoreError> {
        match name {
            Some(n) => {
                let record = self.info(n)?;
                Ok(self.monitor.list(Some(&record.path)))
            }
            None => Ok(self.monitor.list(None)),
        }
    }

    pub fn kill(&self, pid: u32) -> Result<OperationResult, CoreError> {
        let result = self
            .monitor
            .kill(pid)
            .map(|outcome| {
                OperationResult::ok(match outcome {
                    KillOutcome::Terminated => format!("process {pid} terminated"),
                    KillOutcome::Killed => format!("process {pid} killed"),
                    KillOutcome::AlreadyExited => format!("process {pid} had already exited"),
                })
            })
            .map_err(|e| CoreError::from_runtime(&pid.to_string(), "kill", e));
        self.journal("kill", &pid.to_string(), &result, |r| r.message.clone());
        result
    }

    /// Terminate every runtime process, or only those of one prefix.
    pub fn kill_all(&self, name: Option<&str>) -> Result<KillReport, CoreError> {
        let target = name.unwrap_or("*");
        let result = self.kill_all_inner(name, target);
        self.journal("kill_all", target, &result, |r| {
            format!("{} process(es) stopped", r.total())
        });
        result
    }

    fn kill_all_inner(&self, name: Option<&str>, target: &str) -> Result<KillReport, CoreError> {
        let filter = match name {
            Some(n) => Some(self.info(n)?.path),
            None => None,
        };
        let report = self.monitor.kill_all(filter.as_deref(), shutdown_requested);
        if report.is_success() {
            return Ok(report);
        }
        Err(CoreError::PartialFailure {
            operation: "kill_all".to_owned(),
            name: target.to_owned(),
            completed: report
                .terminated
                .iter()
                .chain(&report.already_exited)
                .map(|pid| format!("pid {pid}"))
                .collect(),
            failed: report
                .failed
                .iter()
                .map(|(pid, e)| format!("pid {pid}: {e}"))
                .collect(),
        })
    }
}

fn not_initialized(record: &EnvRecord) -> CoreError {
    CoreError::EnvironmentNotReady {
        name: record.name.clone(),
        reason: format!("{} has no drive_c", record.path.display()),
    }
}

fn rollback_create(name: &str, root: &Path, cause: CoreError) -> CoreError {
    warn!("create of '{name}' failed ({cause}), removing {}", root.display());
    match remove_tree(root) {
        Ok(()) => cause,
        Err(e) => CoreError::PartialFailure {
            operation: "create".to_owned(),
            name: name.to_owned(),
            completed: Vec::new(),
            failed: vec![
                cause.to_string(),
                format!("leftover directory {}: {e}", root.display()),
            ],
        },
    }
}

/// Remove a prefix tree. Missing is success. Retries once after making
/// directories writable, since installers leave read-only entries behind.
fn remove_tree(path: &Path) -> std::io::Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            debug!("permission denied removing {}, relaxing modes", path.display());
            make_dirs_writable(path);
            fs::remove_dir_all(path)
        }
        Err(e) => Err(e),
    }
}

// dosdevices/z: links to `/`; never follow symlinks here.
fn make_dirs_writable(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    let Ok(meta) = fs::symlink_metadata(path) else {
        return;
    };
    if !meta.is_dir() {
        return;
    }
    let mode = meta.permissions().mode() | 0o700;
    let _ = fs::set_permissions(path, fs::Permissions::from_mode(mode));
    if let Ok(entries) = fs::read_dir(path) {
        for entry in entries.flatten() {
            make_dirs_writable(&entry.path());
        }
    }
}

/// Absolute, lexically normalised form of a user-supplied prefix root.
fn normalize_path(path: &Path) -> Result<PathBuf, CoreError> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    let mut out = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    if out.parent().is_none() {
        return Err(CoreError::InvalidOption(format!(
            "'{}' cannot be used as a prefix root",
            path.display()
        )));
    }
    Ok(out)
}

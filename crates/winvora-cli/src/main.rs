mod commands;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::{exit_code_for, EXIT_RUNTIME_MISSING};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use winvora_core::{install_signal_handler, CreateOptions, Manager, Settings};
use winvora_runtime::{check_runtime_prereqs, detect_platform, find_runtime, format_missing, Platform};
use winvora_store::{Architecture, AudioDriver, Renderer, WindowsVersion};

#[derive(Debug, Parser)]
#[command(
    name = "winvora",
    version,
    about = "Manage Wine prefixes and the Windows applications inside them"
)]
struct Cli {
    /// Configuration directory (registry, settings, logs).
    #[arg(long, env = "WINVORA_CONFIG_DIR", global = true)]
    config_dir: Option<PathBuf>,

    /// Wine binary, or the name of a build listed by `runtimes`, to use
    /// instead of searching for one.
    #[arg(long, global = true)]
    runtime: Option<PathBuf>,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create and bootstrap a new prefix.
    Create {
        name: String,
        /// Prefix root; defaults to <prefixes_dir>/<name>.
        #[arg(long)]
        path: Option<PathBuf>,
        /// Windows version to report (win10, win8, win7, winxp, win2k).
        #[arg(long = "windows-version", short = 'w')]
        windows_version: Option<WindowsVersion>,
        /// Prefix architecture (win32, win64).
        #[arg(long)]
        arch: Option<Architecture>,
        /// Builtin template (see `templates`).
        #[arg(long, short = 't')]
        template: Option<String>,
    },
    /// List all registered prefixes.
    List,
    /// Show a prefix's record and live status.
    Info { name: String },
    /// Delete a prefix, its files and its running processes.
    Delete {
        name: String,
        /// Do not ask for confirmation.
        #[arg(long, short = 'y', default_value_t = false)]
        yes: bool,
    },
    /// Change prefix options. Only the given options are touched.
    Configure {
        name: String,
        #[arg(long = "windows-version", short = 'w')]
        windows_version: Option<WindowsVersion>,
        /// Must match the prefix's architecture; Wine cannot convert a prefix.
        #[arg(long)]
        arch: Option<Architecture>,
        /// Screen DPI (96, 120, 144, 192).
        #[arg(long)]
        dpi: Option<u32>,
        /// Virtual desktop resolution (WIDTHxHEIGHT) or `off`.
        #[arg(long = "virtual-desktop")]
        virtual_desktop: Option<String>,
        /// Direct3D renderer (gl, vulkan, gdi).
        #[arg(long)]
        renderer: Option<Renderer>,
        /// Audio driver (alsa, pulse, coreaudio, oss).
        #[arg(long)]
        audio: Option<AudioDriver>,
        /// Command-stream multithreading.
        #[arg(long)]
        csmt: Option<bool>,
    },
    /// Run an .exe or .msi installer inside a prefix.
    Install {
        name: String,
        installer: PathBuf,
        /// Pass the unattended-install flag (/S or /qn).
        #[arg(long, default_value_t = false)]
        silent: bool,
    },
    /// Launch a Windows executable inside a prefix (use -- to pass arguments).
    Run {
        name: String,
        executable: PathBuf,
        #[arg(last = true)]
        args: Vec<String>,
        /// Wait for the program to exit instead of detaching.
        #[arg(long, default_value_t = false)]
        wait: bool,
        /// Working directory; defaults to the executable's directory.
        #[arg(long)]
        cwd: Option<PathBuf>,
        /// Extra environment variable (KEY=VALUE); may be repeated.
        #[arg(long = "env", short = 'e')]
        env: Vec<String>,
        /// Timeout in seconds when waiting.
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Open the Wine configuration dialog for a prefix.
    Winecfg { name: String },
    /// List Wine processes, optionally of one prefix.
    Ps { name: Option<String> },
    /// Terminate one process (SIGTERM, then SIGKILL after the grace period).
    Kill { pid: u32 },
    /// Terminate every Wine process, or all processes of one prefix.
    KillAll { name: Option<String> },
    /// Find initialised prefixes under the prefixes directory that are not registered.
    Discover,
    /// List the builtin prefix templates.
    Templates,
    /// List Wine builds: the system one and those under the runtimes directory.
    Runtimes,
    /// Run diagnostic checks on the host, runtime and registry.
    Doctor,
    /// Show or change settings.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
    /// Generate man pages in the specified directory.
    ManPages {
        /// Output directory for man pages.
        #[arg(default_value = "man")]
        dir: PathBuf,
    },
}

#[derive(Debug, Subcommand)]
enum ConfigAction {
    /// Print the effective settings.
    Show,
    /// Set one key (see `config show` for names); an empty value clears a path.
    Set { key: String, value: String },
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("WINVORA_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    install_signal_handler();

    match dispatch(cli) {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            ExitCode::from(exit_code_for(&msg))
        }
    }
}

fn dispatch(cli: Cli) -> Result<u8, String> {
    let json = cli.json;
    match cli.command {
        Commands::Completions { shell } => return commands::completions::run::<Cli>(shell),
        Commands::ManPages { ref dir } => return commands::man_pages::run::<Cli>(dir),
        Commands::Templates => return commands::templates::run(json),
        _ => {}
    }

    let platform = detect_platform();
    let config_dir = cli
        .config_dir
        .clone()
        .unwrap_or_else(|| platform.default_paths().config_dir);
    let settings_path = config_dir.join("config.toml");
    tracing::debug!(
        "platform {}, config dir {}",
        platform.name(),
        config_dir.display()
    );

    if let Commands::Config { action } = cli.command {
        return match action {
            ConfigAction::Show => commands::config::show(&settings_path, json),
            ConfigAction::Set { key, value } => {
                commands::config::set(&settings_path, &key, &value, json)
            }
        };
    }

    let mut settings =
        Settings::load(&settings_path).map_err(|e| format!("configuration error: {e}"))?;
    if let Some(runtime) = cli.runtime {
        settings.runtime_path = Some(resolve_runtime(runtime, &settings, platform.as_ref()));
    }

    if matches!(cli.command, Commands::Doctor) {
        return commands::doctor::run(&config_dir, &settings, platform, json);
    }

    let needs_runtime = matches!(
        cli.command,
        Commands::Create { .. }
            | Commands::Configure { .. }
            | Commands::Install { .. }
            | Commands::Run { .. }
            | Commands::Winecfg { .. }
    );
    if needs_runtime && std::env::var("WINVORA_SKIP_PREREQS").as_deref() != Ok("1") {
        let missing = check_runtime_prereqs(platform.as_ref(), settings.runtime_path.as_deref());
        if !missing.is_empty() {
            eprintln!("error: runtime missing: {}", format_missing(&missing));
            return Ok(EXIT_RUNTIME_MISSING);
        }
    }

    let manager = open_manager(config_dir, settings, platform)?;

    match cli.command {
        Commands::Create {
            name,
            path,
            windows_version,
            arch,
            template,
        } => commands::create::run(
            &manager,
            &name,
            &CreateOptions {
                path,
                windows_version,
                architecture: arch,
                template,
            },
            json,
        ),
        Commands::List => commands::list::run(&manager, json),
        Commands::Info { name } => commands::info::run(&manager, &name, json),
        Commands::Delete { name, yes } => commands::delete::run(&manager, &name, yes, json),
        Commands::Configure {
            name,
            windows_version,
            arch,
            dpi,
            virtual_desktop,
            renderer,
            audio,
            csmt,
        } => commands::configure::run(
            &manager,
            &name,
            winvora_core::ConfigureRequest {
                windows_version,
                architecture: arch,
                dpi,
                virtual_desktop,
                renderer,
                audio_driver: audio,
                csmt,
            },
            json,
        ),
        Commands::Install {
            name,
            installer,
            silent,
        } => commands::install::run(&manager, &name, &installer, silent, json),
        Commands::Run {
            name,
            executable,
            args,
            wait,
            cwd,
            env,
            timeout,
        } => commands::run::run(
            &manager,
            commands::run::RunArgs {
                name,
                executable,
                args,
                wait,
                cwd,
                env,
                timeout,
            },
            json,
        ),
        Commands::Winecfg { name } => commands::winecfg::run(&manager, &name, json),
        Commands::Ps { name } => commands::ps::run(&manager, name.as_deref(), json),
        Commands::Kill { pid } => commands::kill::run(&manager, pid, json),
        Commands::KillAll { name } => commands::kill::run_all(&manager, name.as_deref(), json),
        Commands::Discover => commands::discover::run(&manager, json),
        Commands::Runtimes => commands::runtimes::run(&manager, json),
        Commands::Doctor
        | Commands::Templates
        | Commands::Config { .. }
        | Commands::Completions { .. }
        | Commands::ManPages { .. } => unreachable!("handled before the manager is opened"),
    }
}

/// A bare name that is not a file refers to an unpacked build.
fn resolve_runtime(runtime: PathBuf, settings: &Settings, platform: &dyn Platform) -> PathBuf {
    if runtime.components().count() != 1 || runtime.exists() {
        return runtime;
    }
    let dir = settings
        .runtimes_dir
        .clone()
        .unwrap_or_else(|| platform.default_paths().runtimes_dir);
    match runtime.to_str().and_then(|name| find_runtime(&dir, name)) {
        Some(found) => {
            tracing::debug!("runtime '{}' resolved to {}", found.name, found.binary.display());
            found.binary
        }
        None => runtime,
    }
}

fn open_manager(
    config_dir: PathBuf,
    settings: Settings,
    platform: Arc<dyn Platform>,
) -> Result<Manager, String> {
    Manager::new(config_dir, settings, platform).map_err(commands::core_err)
}

use super::{core_err, json_pretty, EXIT_SUCCESS};
use std::path::PathBuf;
use std::time::Duration;
use winvora_core::{LaunchOutcome, LaunchRequest, Manager};

pub struct RunArgs {
    pub name: String,
    pub executable: PathBuf,
    pub args: Vec<String>,
    pub wait: bool,
    pub cwd: Option<PathBuf>,
    pub env: Vec<String>,
    pub timeout: Option<u64>,
}

fn parse_env(pairs: &[String]) -> Result<Vec<(String, String)>, String> {
    pairs
        .iter()
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) if !key.is_empty() => Ok((key.to_owned(), value.to_owned())),
            _ => Err(format!("invalid input: --env expects KEY=VALUE, got '{pair}'")),
        })
        .collect()
}

fn build_request(args: RunArgs) -> Result<LaunchRequest, String> {
    let mut request = LaunchRequest::new(args.name, args.executable).args(args.args);
    request.env = parse_env(&args.env)?;
    if args.wait {
        request = request.foreground();
    }
    if let Some(dir) = args.cwd {
        request = request.working_dir(dir);
    }
    match args.timeout {
        Some(0) => return Err("invalid input: --timeout must be at least 1".to_owned()),
        Some(secs) => request = request.timeout(Duration::from_secs(secs)),
        None => {}
    }
    Ok(request)
}

#[allow(clippy::needless_pass_by_value)]
pub fn run(manager: &Manager, args: RunArgs, json: bool) -> Result<u8, String> {
    let request = build_request(args)?;
    let outcome = manager.run(&request).map_err(core_err)?;
    if json {
        println!("{}", json_pretty(&outcome)?);
        return Ok(EXIT_SUCCESS);
    }
    match outcome {
        LaunchOutcome::Launched { pid } => {
            println!(
                "launched {} in '{}' (pid {pid})",
                request.executable.display(),
                request.prefix
            );
        }
        LaunchOutcome::Completed { stdout, .. } => {
            print!("{stdout}");
        }
    }
    Ok(EXIT_SUCCESS)
}

//! Binary entry point for the `ansible-vagrant` CLI.

use std::fmt::Write as _;
use std::io::{self, Write};
use std::process;

use camino::Utf8PathBuf;
use clap::Parser;
use serde_json::Value;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use ansible_vagrant::{
    ConfigError, ExtraVars, HarnessConfig, OrchestratorError, RunRequest, ShutdownPolicyError,
    VagrantFixture, VagrantOrchestrator,
};

mod cli;

use cli::{Cli, RunCommand, TeardownCommand};

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Shutdown(#[from] ShutdownPolicyError),
    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),
    #[error("invalid extra var {0:?}: expected KEY=VALUE")]
    InvalidExtraVar(String),
    #[error("cannot determine working directory: {0}")]
    WorkingDirectory(String),
    #[error("failed to write output: {0}")]
    Output(String),
}

fn main() {
    init_tracing();
    let cli = Cli::parse();
    let exit_code = match dispatch(cli) {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();
}

fn dispatch(cli: Cli) -> Result<(), CliError> {
    let config = HarnessConfig::load_without_cli_args()?;
    match cli {
        Cli::Run(command) => run_command(config, &command),
        Cli::Teardown(command) => teardown_command(config, &command),
    }
}

fn run_command(mut config: HarnessConfig, args: &RunCommand) -> Result<(), CliError> {
    apply_overrides(&mut config, args.project_dir.as_deref(), None);
    if let Some(artifact_dir) = &args.artifact_dir {
        config.artifact_dir = Some(artifact_dir.clone());
    }
    if let Some(provider) = &args.provider {
        config.provider.clone_from(provider);
    }
    config.validate()?;
    let policy = config.shutdown_policy(args.shutdown.as_deref())?;
    let request = build_request(args)?;

    let orchestrator = VagrantOrchestrator::from_config(&config, &working_dir()?)?;
    let mut fixture = VagrantFixture::new(orchestrator, policy);
    fixture.run(&request)?;
    let report = render_hosts(&fixture)?;
    write_stdout(&report)
}

fn teardown_command(mut config: HarnessConfig, args: &TeardownCommand) -> Result<(), CliError> {
    apply_overrides(
        &mut config,
        args.project_dir.as_deref(),
        args.vagrant_file.as_deref(),
    );
    config.validate()?;
    let policy = config.shutdown_policy(args.shutdown.as_deref())?;

    let mut orchestrator = VagrantOrchestrator::from_config(&config, &working_dir()?)?;
    orchestrator.attach(None)?;
    orchestrator.teardown(policy);
    Ok(())
}

fn apply_overrides(
    config: &mut HarnessConfig,
    project_dir: Option<&str>,
    vagrant_file: Option<&str>,
) {
    if let Some(dir) = project_dir {
        config.project_dir = Some(dir.to_owned());
    }
    if let Some(file) = vagrant_file {
        config.vagrant_file = Some(file.to_owned());
    }
}

fn build_request(args: &RunCommand) -> Result<RunRequest, CliError> {
    let mut request =
        RunRequest::new(args.playbook.clone()).extra_vars(parse_extra_vars(&args.extra_vars)?);
    if let Some(file) = &args.vagrant_file {
        request = request.vagrant_file(file.clone());
    }
    if let Some(inventory) = &args.inventory {
        request = request.inventory(inventory.clone());
    }
    if let Some(target) = &args.target {
        request = request.target(target.clone());
    }
    Ok(request)
}

fn parse_extra_vars(pairs: &[String]) -> Result<ExtraVars, CliError> {
    let mut vars = ExtraVars::new();
    for pair in pairs {
        let Some((key, value)) = pair.split_once('=') else {
            return Err(CliError::InvalidExtraVar(pair.clone()));
        };
        let name = key.trim();
        if name.is_empty() {
            return Err(CliError::InvalidExtraVar(pair.clone()));
        }
        vars.insert(name.to_owned(), Value::String(value.to_owned()));
    }
    Ok(vars)
}

fn render_hosts(orchestrator: &VagrantOrchestrator) -> Result<String, CliError> {
    let mut report = String::new();
    for (alias, descriptor) in orchestrator.ssh_configs()?.iter() {
        writeln!(
            report,
            "{alias} {} {}",
            descriptor.uri(),
            descriptor.identity_file()
        )
        .map_err(|err| CliError::Output(err.to_string()))?;
    }
    Ok(report)
}

fn working_dir() -> Result<Utf8PathBuf, CliError> {
    let cwd = std::env::current_dir().map_err(|err| CliError::WorkingDirectory(err.to_string()))?;
    Utf8PathBuf::from_path_buf(cwd)
        .map_err(|path| CliError::WorkingDirectory(path.display().to_string()))
}

fn write_stdout(report: &str) -> Result<(), CliError> {
    io::stdout()
        .write_all(report.as_bytes())
        .map_err(|err| CliError::Output(err.to_string()))
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}

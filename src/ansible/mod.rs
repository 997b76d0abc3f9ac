//! Playbook execution via `ansible-playbook`.
//!
//! Each run records its command line, output, return code and status in a
//! fresh artifact directory named by a random UUID.

use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::inventory::ExtraVars;
use crate::process::{CommandError, CommandOutput, CommandRunner, CommandSpec, ProcessCommandRunner};

/// Default playbook runner binary name.
pub const DEFAULT_ANSIBLE_PLAYBOOK_BIN: &str = "ansible-playbook";

/// Where the runner finds its hosts.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum InventorySource {
    /// Inventory file on disk.
    File(Utf8PathBuf),
    /// Ad-hoc comma separated host list such as `web,db,`.
    HostList(String),
}

impl InventorySource {
    /// Classifies a caller reference: absolute paths are files, anything else
    /// is a host list.
    #[must_use]
    pub fn from_reference(reference: String) -> Self {
        if Utf8Path::new(&reference).is_absolute() {
            Self::File(Utf8PathBuf::from(reference))
        } else {
            Self::HostList(reference)
        }
    }

    /// Value passed to `-i`.
    #[must_use]
    pub fn as_arg(&self) -> &str {
        match self {
            Self::File(path) => path.as_str(),
            Self::HostList(hosts) => hosts,
        }
    }
}

/// Everything the runner needs for one playbook execution.
#[derive(Clone, Debug, PartialEq)]
pub struct PlaybookRequest {
    /// Absolute playbook path.
    pub playbook: Utf8PathBuf,
    /// Project root used as working directory.
    pub project_dir: Utf8PathBuf,
    /// Roles search path.
    pub roles_path: Utf8PathBuf,
    /// Inventory to target.
    pub inventory: InventorySource,
    /// Extra variables passed as JSON.
    pub extra_vars: ExtraVars,
    /// Directory receiving per-run artifacts.
    pub artifact_dir: Utf8PathBuf,
}

/// Final state reported by a run.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PlaybookStatus {
    /// Exit code zero.
    Successful,
    /// Non-zero exit code.
    Failed,
    /// Terminated without an exit code.
    Canceled,
}

impl PlaybookStatus {
    /// Lower-case label as written to the `status` artifact.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Successful => "successful",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        }
    }
}

impl fmt::Display for PlaybookStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status and return code of a finished run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PlaybookOutcome {
    /// Reported status.
    pub status: PlaybookStatus,
    /// Return code, `-1` when the process had none.
    pub rc: i32,
    /// Directory holding this run's artifacts.
    pub artifacts: Utf8PathBuf,
}

impl PlaybookOutcome {
    /// Derives the outcome from process output.
    #[must_use]
    pub fn from_output(output: &CommandOutput, artifacts: Utf8PathBuf) -> Self {
        let (status, rc) = match output.code {
            Some(0) => (PlaybookStatus::Successful, 0),
            Some(code) => (PlaybookStatus::Failed, code),
            None => (PlaybookStatus::Canceled, -1),
        };
        Self {
            status,
            rc,
            artifacts,
        }
    }

    /// Only a successful status with return code zero counts.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == PlaybookStatus::Successful && self.rc == 0
    }
}

/// Errors raised while running a playbook.
#[derive(Debug, Error)]
pub enum PlaybookError {
    /// Raised when extra variables cannot be serialised.
    #[error("failed to encode extra vars: {0}")]
    ExtraVars(#[from] serde_json::Error),
    /// Raised when artifacts cannot be written.
    #[error("failed to write playbook artifacts under {path}: {message}")]
    Artifacts {
        /// Directory being written.
        path: Utf8PathBuf,
        /// Operating system error string.
        message: String,
    },
    /// Raised when the runner cannot be spawned.
    #[error(transparent)]
    Runner(#[from] CommandError),
}

/// Executes playbooks against prepared inventories.
pub trait PlaybookRunner {
    /// Runs the playbook described by `request`.
    ///
    /// A failed play is reported through [`PlaybookOutcome`], not as an
    /// error.
    ///
    /// # Errors
    ///
    /// Returns [`PlaybookError`] when the run cannot be started or its
    /// artifacts cannot be written.
    fn run(&self, request: &PlaybookRequest) -> Result<PlaybookOutcome, PlaybookError>;
}

/// [`PlaybookRunner`] backed by the `ansible-playbook` CLI.
#[derive(Clone, Debug)]
pub struct AnsiblePlaybook<R: CommandRunner> {
    program: String,
    runner: R,
}

impl AnsiblePlaybook<ProcessCommandRunner> {
    /// Creates a runner wired to the real process runner.
    #[must_use]
    pub fn with_process_runner(program: impl Into<String>) -> Self {
        Self::new(program, ProcessCommandRunner)
    }
}

impl<R: CommandRunner> AnsiblePlaybook<R> {
    /// Creates a runner using the supplied command runner.
    #[must_use]
    pub fn new(program: impl Into<String>, runner: R) -> Self {
        Self {
            program: program.into(),
            runner,
        }
    }

    /// Builds the `ansible-playbook` invocation for `request`.
    ///
    /// # Errors
    ///
    /// Returns [`PlaybookError::ExtraVars`] when the variables cannot be
    /// encoded.
    pub fn command(&self, request: &PlaybookRequest) -> Result<CommandSpec, PlaybookError> {
        let extra_vars = serde_json::to_string(&request.extra_vars)?;
        Ok(CommandSpec::new(self.program.clone())
            .arg("-i")
            .arg(request.inventory.as_arg())
            .arg("--extra-vars")
            .arg(extra_vars)
            .arg(request.playbook.as_str())
            .env("ANSIBLE_ROLES_PATH", request.roles_path.as_str())
            .env("ANSIBLE_HOST_KEY_CHECKING", "False")
            .current_dir(request.project_dir.clone()))
    }
}

impl<R: CommandRunner> PlaybookRunner for AnsiblePlaybook<R> {
    fn run(&self, request: &PlaybookRequest) -> Result<PlaybookOutcome, PlaybookError> {
        let spec = self.command(request)?;
        let run_dir = request.artifact_dir.join(Uuid::new_v4().to_string());
        info!(
            playbook = %request.playbook,
            inventory = request.inventory.as_arg(),
            "running playbook"
        );
        debug!(command = %spec.command_line(), artifacts = %run_dir, "ansible-playbook invocation");

        let output = self.runner.run(&spec)?;
        let outcome = PlaybookOutcome::from_output(&output, run_dir);
        write_artifacts(&outcome, &spec, &output)?;
        Ok(outcome)
    }
}

fn write_artifacts(
    outcome: &PlaybookOutcome,
    spec: &CommandSpec,
    output: &CommandOutput,
) -> Result<(), PlaybookError> {
    let path = &outcome.artifacts;
    let to_error = |err: std::io::Error| PlaybookError::Artifacts {
        path: path.clone(),
        message: err.to_string(),
    };
    Dir::create_ambient_dir_all(path, ambient_authority()).map_err(to_error)?;
    let dir = Dir::open_ambient_dir(path, ambient_authority()).map_err(to_error)?;
    let files = [
        ("command", spec.command_line()),
        ("stdout", output.stdout.clone()),
        ("stderr", output.stderr.clone()),
        ("rc", outcome.rc.to_string()),
        ("status", outcome.status.to_string()),
    ];
    for (name, contents) in files {
        dir.write(name, contents).map_err(to_error)?;
    }
    Ok(())
}

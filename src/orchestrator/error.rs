//! Errors surfaced by the lifecycle orchestrator.

use camino::Utf8PathBuf;
use thiserror::Error;

use crate::ansible::{PlaybookError, PlaybookStatus};
use crate::inventory::InventoryError;
use crate::layout::LayoutError;
use crate::playbook::PlaybookFileError;
use crate::remote::HandleError;
use crate::ssh_config::SshConfigError;
use crate::vagrant::ProviderError;

/// Errors returned by [`super::LifecycleOrchestrator`].
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Raised when the project root lacks `tests/` or `roles/`.
    #[error(transparent)]
    StructuralLayout(#[from] LayoutError),
    /// Raised when the resolved control file does not exist.
    #[error("Vagrantfile not found at: {path:?}")]
    ControlFileNotFound {
        /// Absolute path that was checked.
        path: Utf8PathBuf,
    },
    /// Raised when the playbook cannot be located.
    #[error(transparent)]
    PlaybookNotFound(PlaybookFileError),
    /// Raised when the playbook cannot be read for host patterns.
    #[error(transparent)]
    PlaybookFile(PlaybookFileError),
    /// Raised when a requested alias is not among the known hosts.
    #[error("host {alias:?} not found; available: [{}]", .available.join(", "))]
    HostNotFound {
        /// Alias that was requested.
        alias: String,
        /// Aliases that are present.
        available: Vec<String>,
    },
    /// Raised when required host binaries are absent.
    #[error("Missing required binaries: {}", .names.join(", "))]
    MissingDependency {
        /// Every binary that could not be found.
        names: Vec<String>,
    },
    /// Raised when ssh-config output yields no usable descriptor.
    #[error(transparent)]
    Parse(#[from] SshConfigError),
    /// Raised when a provider command exits unsuccessfully.
    #[error("{program} {subcommand} exited with status {status_text}: {stderr}")]
    CommandFailed {
        /// Program that failed.
        program: String,
        /// Provider subcommand.
        subcommand: String,
        /// Human readable representation of the exit status.
        status_text: String,
        /// Stderr captured from the command.
        stderr: String,
    },
    /// Raised when the playbook run does not succeed.
    #[error("play failed: status={status}, rc={rc}")]
    PlaybookFailed {
        /// Status reported by the runner.
        status: PlaybookStatus,
        /// Return code reported by the runner.
        rc: i32,
    },
    /// Raised when an accessor is used before a run has completed.
    #[error("environment has not been provisioned yet; call run first")]
    NotInvoked,
    /// Raised when a generated inventory cannot be written.
    #[error(transparent)]
    Inventory(#[from] InventoryError),
    /// Raised when a remote handle cannot be built.
    #[error(transparent)]
    Handle(#[from] HandleError),
    /// Raised when a provider command cannot be run at all.
    #[error(transparent)]
    Provider(ProviderError),
    /// Raised when the playbook runner cannot be run at all.
    #[error(transparent)]
    Playbook(#[from] PlaybookError),
}

impl From<ProviderError> for OrchestratorError {
    fn from(value: ProviderError) -> Self {
        match value {
            ProviderError::MissingBinaries { names } => Self::MissingDependency { names },
            ProviderError::CommandFailed {
                program,
                subcommand,
                status_text,
                stderr,
                ..
            } => Self::CommandFailed {
                program,
                subcommand,
                status_text,
                stderr,
            },
            other => Self::Provider(other),
        }
    }
}

//! Vagrant command surface.
//!
//! Every invocation pins `VAGRANT_CWD` and `VAGRANT_VAGRANTFILE` so the
//! provider never depends on the caller's working directory.

use camino::Utf8Path;
use thiserror::Error;
use tracing::{debug, info};

use crate::process::{CommandError, CommandOutput, CommandRunner, CommandSpec, ProcessCommandRunner};

/// Default Vagrant CLI binary name.
pub const DEFAULT_VAGRANT_BIN: &str = "vagrant";

/// Default provider back-end.
pub const DEFAULT_BACKEND: &str = "libvirt";

/// Binaries the libvirt back-end needs on the host.
pub const LIBVIRT_BINARIES: [&str; 2] = ["virsh", "qemu-system-x86_64"];

/// Errors raised by provider operations.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ProviderError {
    /// Raised when required host binaries are absent.
    #[error("Missing required binaries: {}", .names.join(", "))]
    MissingBinaries {
        /// Every binary that could not be found.
        names: Vec<String>,
    },
    /// Raised when a provider command exits unsuccessfully.
    #[error("{program} {subcommand} exited with status {status_text}: {stderr}")]
    CommandFailed {
        /// Program that failed.
        program: String,
        /// Provider subcommand, for example `up`.
        subcommand: String,
        /// Exit status reported by the OS.
        status: Option<i32>,
        /// Human readable representation of the exit status.
        status_text: String,
        /// Stderr captured from the command.
        stderr: String,
    },
    /// Raised when the control file path has no directory or file name.
    #[error("invalid control file path: {path}")]
    InvalidControlFile {
        /// Offending path.
        path: String,
    },
    /// Raised when the command cannot be spawned.
    #[error(transparent)]
    Runner(#[from] CommandError),
}

/// Operations the orchestrator needs from a virtualization provider.
pub trait Provider {
    /// Brings up every machine declared by `control_file`.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::MissingBinaries`] before running anything
    /// when host tooling is absent, or [`ProviderError::CommandFailed`] when
    /// start-up fails.
    fn start(&self, control_file: &Utf8Path, backend: &str) -> Result<(), ProviderError>;

    /// Stops the machines, keeping their disks. A non-zero exit is returned,
    /// not raised.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Runner`] when the command cannot be spawned.
    fn halt(&self, control_file: &Utf8Path) -> Result<CommandOutput, ProviderError>;

    /// Force-removes the machines. A non-zero exit is returned, not raised.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Runner`] when the command cannot be spawned.
    fn destroy(&self, control_file: &Utf8Path) -> Result<CommandOutput, ProviderError>;

    /// Dumps SSH connection configuration for every machine.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::CommandFailed`] on a non-zero exit.
    fn ssh_config(&self, control_file: &Utf8Path) -> Result<String, ProviderError>;
}

/// Settings for [`VagrantCli`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VagrantSettings {
    /// Path to the `vagrant` binary.
    pub vagrant_bin: String,
    /// Binaries checked before start-up, in addition to back-end tooling.
    pub required_binaries: Vec<String>,
}

impl VagrantSettings {
    /// Settings requiring the provider and playbook binaries.
    #[must_use]
    pub fn new(vagrant_bin: impl Into<String>, ansible_playbook_bin: impl Into<String>) -> Self {
        let vagrant = vagrant_bin.into();
        Self {
            required_binaries: vec![vagrant.clone(), ansible_playbook_bin.into()],
            vagrant_bin: vagrant,
        }
    }

    /// Binaries required for `backend`, deduplicated in check order.
    #[must_use]
    pub fn binaries_for(&self, backend: &str) -> Vec<String> {
        let extra: &[&str] = if backend == DEFAULT_BACKEND {
            &LIBVIRT_BINARIES
        } else {
            &[]
        };
        let mut names: Vec<String> = Vec::new();
        for name in self
            .required_binaries
            .iter()
            .map(String::as_str)
            .chain(extra.iter().copied())
        {
            if !names.iter().any(|seen| seen == name) {
                names.push(name.to_owned());
            }
        }
        names
    }
}

impl Default for VagrantSettings {
    fn default() -> Self {
        Self::new(DEFAULT_VAGRANT_BIN, "ansible-playbook")
    }
}

/// [`Provider`] implementation that shells out to `vagrant`.
#[derive(Clone, Debug)]
pub struct VagrantCli<R: CommandRunner> {
    settings: VagrantSettings,
    runner: R,
}

impl VagrantCli<ProcessCommandRunner> {
    /// Creates a provider wired to the real process runner.
    #[must_use]
    pub const fn with_process_runner(settings: VagrantSettings) -> Self {
        Self::new(settings, ProcessCommandRunner)
    }
}

impl<R: CommandRunner> VagrantCli<R> {
    /// Creates a provider using the supplied runner.
    #[must_use]
    pub const fn new(settings: VagrantSettings, runner: R) -> Self {
        Self { settings, runner }
    }

    /// Settings in use.
    #[must_use]
    pub const fn settings(&self) -> &VagrantSettings {
        &self.settings
    }

    /// Checks every binary and reports all absent ones together.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::MissingBinaries`] listing each missing name.
    pub fn require_binaries(&self, names: &[String]) -> Result<(), ProviderError> {
        let missing: Vec<String> = names
            .iter()
            .filter(|name| !self.runner.is_available(name))
            .cloned()
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ProviderError::MissingBinaries { names: missing })
        }
    }

    fn command(
        &self,
        control_file: &Utf8Path,
        subcommand: &[&str],
    ) -> Result<CommandSpec, ProviderError> {
        let (Some(dir), Some(name)) = (control_file.parent(), control_file.file_name()) else {
            return Err(ProviderError::InvalidControlFile {
                path: control_file.to_string(),
            });
        };
        Ok(CommandSpec::new(self.settings.vagrant_bin.clone())
            .args(subcommand.iter().copied())
            .env("VAGRANT_CWD", dir.as_str())
            .env("VAGRANT_VAGRANTFILE", name))
    }

    fn run(
        &self,
        control_file: &Utf8Path,
        subcommand: &[&str],
    ) -> Result<CommandOutput, ProviderError> {
        let spec = self.command(control_file, subcommand)?;
        debug!(command = %spec.command_line(), control_file = %control_file, "running vagrant");
        Ok(self.runner.run(&spec)?)
    }

    fn check(
        &self,
        output: CommandOutput,
        subcommand: &str,
    ) -> Result<CommandOutput, ProviderError> {
        if output.is_success() {
            return Ok(output);
        }
        Err(ProviderError::CommandFailed {
            program: self.settings.vagrant_bin.clone(),
            subcommand: subcommand.to_owned(),
            status: output.code,
            status_text: output.status_text(),
            stderr: output.stderr,
        })
    }
}

impl<R: CommandRunner> Provider for VagrantCli<R> {
    fn start(&self, control_file: &Utf8Path, backend: &str) -> Result<(), ProviderError> {
        self.require_binaries(&self.settings.binaries_for(backend))?;
        info!(control_file = %control_file, backend, "starting vagrant environment");
        let output = self.run(control_file, &["up", "--provider", backend])?;
        self.check(output, "up").map(|_| ())
    }

    fn halt(&self, control_file: &Utf8Path) -> Result<CommandOutput, ProviderError> {
        self.run(control_file, &["halt"])
    }

    fn destroy(&self, control_file: &Utf8Path) -> Result<CommandOutput, ProviderError> {
        self.run(control_file, &["destroy", "-f"])
    }

    fn ssh_config(&self, control_file: &Utf8Path) -> Result<String, ProviderError> {
        let output = self.run(control_file, &["ssh-config"])?;
        self.check(output, "ssh-config").map(|out| out.stdout)
    }
}

//! Live SSH handles for asserting on provisioned machines.

use std::ffi::OsString;

use camino::{Utf8Path, Utf8PathBuf};
use shell_escape::unix::escape;
use thiserror::Error;

use crate::descriptor::ConnectionDescriptor;
use crate::process::{CommandError, CommandOutput, CommandRunner, CommandSpec, ProcessCommandRunner};

/// Default SSH client binary name.
pub const DEFAULT_SSH_BIN: &str = "ssh";

/// Host key policy for handles: trust on first use.
pub const ACCEPT_NEW_HOST_KEYS: &str = "accept-new";

/// Known hosts file that never persists entries.
pub const DISCARD_KNOWN_HOSTS: &str = "/dev/null";

/// Where and how to reach one machine over SSH.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SshTarget {
    /// Remote login user.
    pub user: String,
    /// Host name or address.
    pub host: String,
    /// SSH port.
    pub port: u16,
    /// Private key used for authentication.
    pub identity_file: Utf8PathBuf,
    /// Value for `UserKnownHostsFile`.
    pub known_hosts_file: String,
    /// Value for `StrictHostKeyChecking`.
    pub strict_host_key_checking: String,
}

impl SshTarget {
    /// Target for a descriptor that accepts unseen keys and never stores them.
    #[must_use]
    pub fn from_descriptor(descriptor: &ConnectionDescriptor) -> Self {
        Self {
            user: descriptor.user().to_owned(),
            host: descriptor.hostname().to_owned(),
            port: descriptor.port(),
            identity_file: descriptor.identity_file().to_path_buf(),
            known_hosts_file: String::from(DISCARD_KNOWN_HOSTS),
            strict_host_key_checking: String::from(ACCEPT_NEW_HOST_KEYS),
        }
    }

    /// Connection URI in the `ssh://user@host:port` form.
    #[must_use]
    pub fn uri(&self) -> String {
        format!("ssh://{}@{}:{}", self.user, self.host, self.port)
    }

    /// Extra SSH arguments expressing the host-key policy.
    #[must_use]
    pub fn extra_args(&self) -> String {
        format!(
            "-o StrictHostKeyChecking={} -o UserKnownHostsFile={}",
            self.strict_host_key_checking, self.known_hosts_file
        )
    }
}

/// Errors raised by remote handles.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum HandleError {
    /// Raised when a remote command exits unsuccessfully.
    #[error("remote command `{command}` on {uri} exited with status {status_text}: {stderr}")]
    CommandFailed {
        /// Target URI.
        uri: String,
        /// Remote command line.
        command: String,
        /// Human readable representation of the exit status.
        status_text: String,
        /// Stderr captured from the command.
        stderr: String,
    },
    /// Raised when the target cannot be connected to.
    #[error("cannot create handle for {uri}: {message}")]
    Connect {
        /// Target URI.
        uri: String,
        /// Reason the handle could not be built.
        message: String,
    },
    /// Raised when `ssh` cannot be spawned.
    #[error(transparent)]
    Runner(#[from] CommandError),
}

/// Builds handles for provisioned machines.
pub trait HandleFactory {
    /// Handle type returned to callers.
    type Handle;

    /// Creates a handle for `target`.
    ///
    /// # Errors
    ///
    /// Returns [`HandleError`] when the handle cannot be built.
    fn connect(&self, target: &SshTarget) -> Result<Self::Handle, HandleError>;
}

/// Factory producing [`SshHost`] handles.
#[derive(Clone, Debug)]
pub struct SshHostFactory<R: CommandRunner + Clone> {
    ssh_bin: String,
    runner: R,
}

impl SshHostFactory<ProcessCommandRunner> {
    /// Creates a factory wired to the real process runner.
    #[must_use]
    pub fn with_process_runner(ssh_bin: impl Into<String>) -> Self {
        Self::new(ssh_bin, ProcessCommandRunner)
    }
}

impl<R: CommandRunner + Clone> SshHostFactory<R> {
    /// Creates a factory using the supplied runner.
    #[must_use]
    pub fn new(ssh_bin: impl Into<String>, runner: R) -> Self {
        Self {
            ssh_bin: ssh_bin.into(),
            runner,
        }
    }
}

impl<R: CommandRunner + Clone> HandleFactory for SshHostFactory<R> {
    type Handle = SshHost<R>;

    fn connect(&self, target: &SshTarget) -> Result<Self::Handle, HandleError> {
        if self.ssh_bin.trim().is_empty() {
            return Err(HandleError::Connect {
                uri: target.uri(),
                message: String::from("ssh binary is not configured"),
            });
        }
        Ok(SshHost {
            ssh_bin: self.ssh_bin.clone(),
            target: target.clone(),
            runner: self.runner.clone(),
        })
    }
}

/// A live handle that runs commands on one machine through `ssh`.
#[derive(Clone, Debug)]
pub struct SshHost<R: CommandRunner> {
    ssh_bin: String,
    target: SshTarget,
    runner: R,
}

impl<R: CommandRunner> SshHost<R> {
    /// Target this handle talks to.
    #[must_use]
    pub const fn target(&self) -> &SshTarget {
        &self.target
    }

    /// Connection URI of the target.
    #[must_use]
    pub fn uri(&self) -> String {
        self.target.uri()
    }

    /// Runs `command` remotely and returns its raw output.
    ///
    /// # Errors
    ///
    /// Returns [`HandleError::Runner`] when `ssh` cannot be spawned.
    pub fn run(&self, command: &str) -> Result<CommandOutput, HandleError> {
        let spec = CommandSpec::new(self.ssh_bin.clone()).args(self.ssh_args(command));
        Ok(self.runner.run(&spec)?)
    }

    /// Runs `command` and returns stdout, failing on a non-zero exit.
    ///
    /// # Errors
    ///
    /// Returns [`HandleError::CommandFailed`] on a non-zero exit.
    pub fn check_output(&self, command: &str) -> Result<String, HandleError> {
        let output = self.run(command)?;
        if output.is_success() {
            return Ok(output.stdout);
        }
        Err(self.failure(command, output))
    }

    /// Reports whether `path` exists on the machine.
    ///
    /// # Errors
    ///
    /// Returns [`HandleError::CommandFailed`] when the test itself fails.
    pub fn file_exists(&self, path: &Utf8Path) -> Result<bool, HandleError> {
        self.test_path("-e", path)
    }

    /// Reports whether `path` is a directory on the machine.
    ///
    /// # Errors
    ///
    /// Returns [`HandleError::CommandFailed`] when the test itself fails.
    pub fn is_directory(&self, path: &Utf8Path) -> Result<bool, HandleError> {
        self.test_path("-d", path)
    }

    fn test_path(&self, flag: &str, path: &Utf8Path) -> Result<bool, HandleError> {
        let command = format!("test {flag} {}", escape(path.as_str().into()));
        let output = self.run(&command)?;
        match output.code {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => Err(self.failure(&command, output)),
        }
    }

    fn failure(&self, command: &str, output: CommandOutput) -> HandleError {
        HandleError::CommandFailed {
            uri: self.target.uri(),
            command: command.to_owned(),
            status_text: output.status_text(),
            stderr: output.stderr,
        }
    }

    fn ssh_args(&self, remote_command: &str) -> Vec<OsString> {
        let target = &self.target;
        vec![
            OsString::from("-p"),
            OsString::from(target.port.to_string()),
            OsString::from("-i"),
            OsString::from(target.identity_file.as_str()),
            OsString::from("-o"),
            OsString::from("BatchMode=yes"),
            OsString::from("-o"),
            OsString::from(format!(
                "StrictHostKeyChecking={}",
                target.strict_host_key_checking
            )),
            OsString::from("-o"),
            OsString::from(format!("UserKnownHostsFile={}", target.known_hosts_file)),
            OsString::from(format!("{}@{}", target.user, target.host)),
            OsString::from(remote_command),
        ]
    }
}

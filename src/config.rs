//! Harness configuration loaded via `ortho-config`.
//!
//! Values merge defaults, `ansible-vagrant.toml`, and `ANSIBLE_VAGRANT_*`
//! environment variables. The CLI layers its own flags on top.

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::ansible::DEFAULT_ANSIBLE_PLAYBOOK_BIN;
use crate::remote::DEFAULT_SSH_BIN;
use crate::shutdown::{ShutdownPolicy, ShutdownPolicyError};
use crate::vagrant::{DEFAULT_BACKEND, DEFAULT_VAGRANT_BIN, VagrantSettings};

/// Settings shared by every environment the harness provisions.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "ANSIBLE_VAGRANT",
    discovery(
        app_name = "ansible-vagrant",
        env_var = "ANSIBLE_VAGRANT_CONFIG_PATH",
        config_file_name = "ansible-vagrant.toml",
        dotfile_name = ".ansible-vagrant.toml",
        project_file_name = "ansible-vagrant.toml"
    )
)]
pub struct HarnessConfig {
    /// Explicit project root. When unset the root is inferred from the
    /// caller's location.
    pub project_dir: Option<String>,
    /// Control-file override that wins over per-run values.
    pub vagrant_file: Option<String>,
    /// Artifact directory override that wins over per-run values.
    pub artifact_dir: Option<String>,
    /// Default teardown policy: `halt`, `destroy` or `none`.
    #[ortho_config(default = "destroy".to_owned())]
    pub shutdown: String,
    /// Default provider back-end passed to `vagrant up --provider`.
    #[ortho_config(default = DEFAULT_BACKEND.to_owned())]
    pub provider: String,
    /// Path to the `vagrant` executable.
    #[ortho_config(default = DEFAULT_VAGRANT_BIN.to_owned())]
    pub vagrant_bin: String,
    /// Path to the `ansible-playbook` executable.
    #[ortho_config(default = DEFAULT_ANSIBLE_PLAYBOOK_BIN.to_owned())]
    pub ansible_playbook_bin: String,
    /// Path to the `ssh` executable used by handles.
    #[ortho_config(default = DEFAULT_SSH_BIN.to_owned())]
    pub ssh_bin: String,
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a configuration field is blank.
    #[error(
        "missing {field}: set ANSIBLE_VAGRANT_{env_suffix} or add {field} to ansible-vagrant.toml",
        env_suffix = field.to_uppercase()
    )]
    MissingField {
        /// Configuration field that failed validation.
        field: String,
    },
    /// Indicates the shutdown policy is not recognised.
    #[error(transparent)]
    Shutdown(#[from] ShutdownPolicyError),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}

impl HarnessConfig {
    /// Loads configuration without attempting to parse CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("ansible-vagrant")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Ensures required values are non-blank and the shutdown policy parses.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] naming the env var and TOML key
    /// to set, or [`ConfigError::Shutdown`] for an unknown policy.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::require_value(&self.provider, "provider")?;
        Self::require_value(&self.vagrant_bin, "vagrant_bin")?;
        Self::require_value(&self.ansible_playbook_bin, "ansible_playbook_bin")?;
        Self::require_value(&self.ssh_bin, "ssh_bin")?;
        Self::require_optional_value(self.project_dir.as_deref(), "project_dir")?;
        Self::require_optional_value(self.vagrant_file.as_deref(), "vagrant_file")?;
        Self::require_optional_value(self.artifact_dir.as_deref(), "artifact_dir")?;
        self.shutdown_policy(None)?;
        Ok(())
    }

    /// Resolves the active policy: per-run override, then the configured
    /// default.
    ///
    /// # Errors
    ///
    /// Returns [`ShutdownPolicyError`] when the chosen value is unknown.
    pub fn shutdown_policy(
        &self,
        override_value: Option<&str>,
    ) -> Result<ShutdownPolicy, ShutdownPolicyError> {
        ShutdownPolicy::resolve(override_value, &self.shutdown)
    }

    /// Provider settings derived from the configured binaries.
    #[must_use]
    pub fn vagrant_settings(&self) -> VagrantSettings {
        VagrantSettings::new(self.vagrant_bin.clone(), self.ansible_playbook_bin.clone())
    }

    fn require_optional_value(value: Option<&str>, field: &str) -> Result<(), ConfigError> {
        match value {
            Some(v) if v.trim().is_empty() => Err(ConfigError::MissingField {
                field: field.to_owned(),
            }),
            _ => Ok(()),
        }
    }

    fn require_value(value: &str, field: &str) -> Result<(), ConfigError> {
        Self::require_optional_value(Some(value), field)
    }
}

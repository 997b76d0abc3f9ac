//! Teardown strategies applied when an environment goes out of scope.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// What happens to provisioned machines at teardown.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ShutdownPolicy {
    /// Stop the machines and keep their disks.
    Halt,
    /// Remove the machines and their state.
    #[default]
    Destroy,
    /// Leave the machines running.
    None,
}

/// Raised when a policy name is not recognised.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("Invalid vagrant_shutdown={value:?}. Must be one of: halt, destroy, none")]
pub struct ShutdownPolicyError {
    /// Value that failed to parse.
    pub value: String,
}

impl ShutdownPolicy {
    /// Canonical lower-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Halt => "halt",
            Self::Destroy => "destroy",
            Self::None => "none",
        }
    }

    /// Picks the per-run override when present, otherwise the declared
    /// default.
    ///
    /// # Errors
    ///
    /// Returns [`ShutdownPolicyError`] when the chosen value is unknown.
    pub fn resolve(
        override_value: Option<&str>,
        default: &str,
    ) -> Result<Self, ShutdownPolicyError> {
        override_value
            .filter(|value| !value.trim().is_empty())
            .unwrap_or(default)
            .parse()
    }
}

impl FromStr for ShutdownPolicy {
    type Err = ShutdownPolicyError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "halt" => Ok(Self::Halt),
            "destroy" => Ok(Self::Destroy),
            "none" => Ok(Self::None),
            _ => Err(ShutdownPolicyError {
                value: value.to_owned(),
            }),
        }
    }
}

impl fmt::Display for ShutdownPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

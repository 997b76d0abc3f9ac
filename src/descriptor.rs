//! Validated connection parameters for provisioned hosts.

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

/// Connection parameters for one provider-managed machine.
///
/// All four fields are required and validated on construction; there is no
/// partially populated descriptor.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConnectionDescriptor {
    hostname: String,
    port: u16,
    user: String,
    identity_file: Utf8PathBuf,
}

/// Errors raised when a descriptor field is invalid.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum DescriptorError {
    /// Raised when a string field is empty after trimming.
    #[error("missing or empty field: {0}")]
    EmptyField(&'static str),
    /// Raised when the port is outside 1-65535.
    #[error("port must be between 1 and 65535, got {0}")]
    InvalidPort(i64),
}

impl ConnectionDescriptor {
    /// Builds a descriptor, trimming string inputs.
    ///
    /// The identity file does not need to exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`DescriptorError`] when a field is blank or the port is out
    /// of range.
    pub fn new(
        hostname: impl Into<String>,
        port: i64,
        user: impl Into<String>,
        identity_file: impl Into<Utf8PathBuf>,
    ) -> Result<Self, DescriptorError> {
        let hostname_value = hostname.into().trim().to_owned();
        let user_value = user.into().trim().to_owned();
        let identity_value = identity_file.into();

        if hostname_value.is_empty() {
            return Err(DescriptorError::EmptyField("hostname"));
        }
        if user_value.is_empty() {
            return Err(DescriptorError::EmptyField("user"));
        }
        if identity_value.as_str().trim().is_empty() {
            return Err(DescriptorError::EmptyField("identity_file"));
        }
        let port_value = u16::try_from(port)
            .ok()
            .filter(|value| *value != 0)
            .ok_or(DescriptorError::InvalidPort(port))?;

        Ok(Self {
            hostname: hostname_value,
            port: port_value,
            user: user_value,
            identity_file: identity_value,
        })
    }

    /// Host name or address to connect to.
    #[must_use]
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// TCP port for SSH.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Remote login user.
    #[must_use]
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Private key used for authentication.
    #[must_use]
    pub fn identity_file(&self) -> &Utf8Path {
        &self.identity_file
    }

    /// Connection URI in the `ssh://user@host:port` form.
    #[must_use]
    pub fn uri(&self) -> String {
        format!("ssh://{}@{}:{}", self.user, self.hostname, self.port)
    }
}

/// Ordered mapping from host alias to descriptor.
///
/// Iteration follows insertion order, which mirrors the order host blocks
/// appear in the provider output. Inserting an existing alias replaces its
/// descriptor in place.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct HostMap {
    entries: Vec<(String, ConnectionDescriptor)>,
}

impl HostMap {
    /// Creates an empty mapping.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Inserts or replaces the descriptor for `alias`.
    pub fn insert(&mut self, alias: impl Into<String>, descriptor: ConnectionDescriptor) {
        let key = alias.into();
        if let Some(slot) = self.entries.iter_mut().find(|(name, _)| *name == key) {
            slot.1 = descriptor;
        } else {
            self.entries.push((key, descriptor));
        }
    }

    /// Looks up a descriptor by alias.
    #[must_use]
    pub fn get(&self, alias: &str) -> Option<&ConnectionDescriptor> {
        self.entries
            .iter()
            .find(|(name, _)| name == alias)
            .map(|(_, descriptor)| descriptor)
    }

    /// Returns `true` when `alias` is present.
    #[must_use]
    pub fn contains(&self, alias: &str) -> bool {
        self.get(alias).is_some()
    }

    /// Number of hosts in the mapping.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when no hosts are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First host in insertion order.
    #[must_use]
    pub fn first(&self) -> Option<(&str, &ConnectionDescriptor)> {
        self.entries
            .first()
            .map(|(alias, descriptor)| (alias.as_str(), descriptor))
    }

    /// Aliases in insertion order.
    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(alias, _)| alias.as_str())
    }

    /// Alias and descriptor pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ConnectionDescriptor)> {
        self.entries
            .iter()
            .map(|(alias, descriptor)| (alias.as_str(), descriptor))
    }

    /// Comma separated alias list used in error messages.
    #[must_use]
    pub fn alias_list(&self) -> String {
        self.aliases().collect::<Vec<_>>().join(", ")
    }

    /// Returns a mapping containing only `alias`, if present.
    #[must_use]
    pub fn only(&self, alias: &str) -> Option<Self> {
        self.get(alias).map(|descriptor| {
            let mut narrowed = Self::new();
            narrowed.insert(alias, descriptor.clone());
            narrowed
        })
    }
}

impl FromIterator<(String, ConnectionDescriptor)> for HostMap {
    fn from_iter<T: IntoIterator<Item = (String, ConnectionDescriptor)>>(iter: T) -> Self {
        let mut map = Self::new();
        for (alias, descriptor) in iter {
            map.insert(alias, descriptor);
        }
        map
    }
}

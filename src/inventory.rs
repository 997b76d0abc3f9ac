//! Inventory synthesis for freshly provisioned hosts.
//!
//! A single host targeted by named play patterns is expressed as inline
//! connection variables over an ad-hoc host list. Anything else becomes a
//! generated INI inventory with one line per alias.

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use serde_json::{Map, Value};
use shell_escape::unix::escape;
use thiserror::Error;

use crate::descriptor::{ConnectionDescriptor, HostMap};

/// Extra variables handed to the playbook runner.
pub type ExtraVars = Map<String, Value>;

/// Group that every generated inventory line belongs to.
pub const INVENTORY_GROUP: &str = "vagrant";

/// File name used when a generated inventory is written to disk.
pub const INVENTORY_FILE_NAME: &str = "vagrant-inventory.ini";

/// Alias used when a playbook declares no host patterns.
pub const SYNTHETIC_HOST_ALIAS: &str = "vagrant_host";

/// SSH options that let the runner reach never-before-seen hosts.
pub const SSH_COMMON_ARGS: &str = "-o StrictHostKeyChecking=no -o UserKnownHostsFile=/dev/null";

/// Interpreter path used on the provisioned guests.
pub const PYTHON_INTERPRETER: &str = "/usr/bin/python3";

/// Variable names carrying connection parameters.
pub const CONNECTION_VAR_NAMES: [&str; 7] = [
    "ansible_connection",
    "ansible_host",
    "ansible_port",
    "ansible_user",
    "ansible_ssh_private_key_file",
    "ansible_ssh_common_args",
    "ansible_python_interpreter",
];

/// One pattern entry of an inline inventory.
#[derive(Clone, Debug, PartialEq)]
pub struct InlineHost {
    /// Host pattern as declared by the playbook.
    pub pattern: String,
    /// Connection variables applied to the pattern.
    pub vars: ExtraVars,
}

/// Result of inventory synthesis.
#[derive(Clone, Debug, PartialEq)]
pub enum Inventory {
    /// Connection variables expressed per play pattern.
    Inline(Vec<InlineHost>),
    /// Rendered INI inventory document.
    Generated {
        /// Document contents.
        content: String,
    },
}

impl Inventory {
    /// Ad-hoc host list (`web,db,`) for the inline form.
    #[must_use]
    pub fn host_list(&self) -> Option<String> {
        match self {
            Self::Inline(hosts) => Some(
                hosts
                    .iter()
                    .map(|host| format!("{},", host.pattern))
                    .collect(),
            ),
            Self::Generated { .. } => None,
        }
    }

    /// Connection variables of the inline form.
    #[must_use]
    pub fn inline_vars(&self) -> Option<&ExtraVars> {
        match self {
            Self::Inline(hosts) => hosts.first().map(|host| &host.vars),
            Self::Generated { .. } => None,
        }
    }

    /// Looks up the inline entry for `pattern`.
    #[must_use]
    pub fn inline_host(&self, pattern: &str) -> Option<&InlineHost> {
        match self {
            Self::Inline(hosts) => hosts.iter().find(|host| host.pattern == pattern),
            Self::Generated { .. } => None,
        }
    }
}

/// Errors raised while persisting a generated inventory.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// Raised when the artifact directory or file cannot be written.
    #[error("failed to write inventory {path}: {message}")]
    Io {
        /// Path that could not be written.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
}

/// Connection variables for a single descriptor.
#[must_use]
pub fn connection_vars(descriptor: &ConnectionDescriptor) -> ExtraVars {
    let mut vars = ExtraVars::new();
    vars.insert(String::from("ansible_connection"), Value::from("ssh"));
    vars.insert(
        String::from("ansible_host"),
        Value::from(descriptor.hostname()),
    );
    vars.insert(String::from("ansible_port"), Value::from(descriptor.port()));
    vars.insert(String::from("ansible_user"), Value::from(descriptor.user()));
    vars.insert(
        String::from("ansible_ssh_private_key_file"),
        Value::from(descriptor.identity_file().as_str()),
    );
    vars.insert(
        String::from("ansible_ssh_common_args"),
        Value::from(SSH_COMMON_ARGS),
    );
    vars.insert(
        String::from("ansible_python_interpreter"),
        Value::from(PYTHON_INTERPRETER),
    );
    vars
}

/// Chooses the inventory form for the target hosts.
///
/// Exactly one host with at least one pattern yields [`Inventory::Inline`];
/// every other combination yields [`Inventory::Generated`].
#[must_use]
pub fn build_inventory(hosts: &HostMap, patterns: &[String]) -> Inventory {
    if let (1, Some((_, descriptor))) = (hosts.len(), hosts.first())
        && !patterns.is_empty()
    {
        let vars = connection_vars(descriptor);
        return Inventory::Inline(
            patterns
                .iter()
                .map(|pattern| InlineHost {
                    pattern: pattern.clone(),
                    vars: vars.clone(),
                })
                .collect(),
        );
    }

    Inventory::Generated {
        content: render_inventory(hosts),
    }
}

/// Renders the INI document listing every alias in one group.
#[must_use]
pub fn render_inventory(hosts: &HostMap) -> String {
    let mut content = format!("[{INVENTORY_GROUP}]\n");
    for (alias, descriptor) in hosts.iter() {
        content.push_str(alias);
        for (key, value) in connection_vars(descriptor) {
            if key == "ansible_connection" {
                continue;
            }
            let rendered = match value {
                Value::String(text) => text,
                other => other.to_string(),
            };
            content.push(' ');
            content.push_str(&key);
            content.push('=');
            let escaped = escape(rendered.as_str().into());
            content.push_str(&escaped);
        }
        content.push('\n');
    }
    content
}

/// Writes `content` to [`INVENTORY_FILE_NAME`] under `dir`, creating it.
///
/// # Errors
///
/// Returns [`InventoryError::Io`] when the directory cannot be created or
/// the file cannot be written.
pub fn write_inventory(dir: &Utf8Path, content: &str) -> Result<Utf8PathBuf, InventoryError> {
    let path = dir.join(INVENTORY_FILE_NAME);
    Dir::create_ambient_dir_all(dir, ambient_authority()).map_err(|err| InventoryError::Io {
        path: dir.to_path_buf(),
        message: err.to_string(),
    })?;
    let handle = Dir::open_ambient_dir(dir, ambient_authority()).map_err(|err| {
        InventoryError::Io {
            path: dir.to_path_buf(),
            message: err.to_string(),
        }
    })?;
    handle
        .write(INVENTORY_FILE_NAME, content)
        .map_err(|err| InventoryError::Io {
            path: path.clone(),
            message: err.to_string(),
        })?;
    Ok(path)
}

/// Layers connection variables over caller variables.
///
/// Caller values are applied first and connection values second, so a
/// caller can never shadow how the runner reaches a host.
#[must_use]
pub fn merge_extra_vars(caller: &ExtraVars, connection: &ExtraVars) -> ExtraVars {
    let mut merged = ExtraVars::new();
    for (key, value) in caller {
        merged.insert(key.clone(), value.clone());
    }
    for (key, value) in connection {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// Removes caller variables that would shadow generated inventory values.
///
/// Returns the filtered variables and the names that were dropped.
#[must_use]
pub fn strip_connection_vars(caller: &ExtraVars) -> (ExtraVars, Vec<String>) {
    let mut kept = ExtraVars::new();
    let mut dropped = Vec::new();
    for (key, value) in caller {
        if CONNECTION_VAR_NAMES.contains(&key.as_str()) {
            dropped.push(key.clone());
        } else {
            kept.insert(key.clone(), value.clone());
        }
    }
    (kept, dropped)
}

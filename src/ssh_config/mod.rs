//! Parsing of `vagrant ssh-config` output into connection descriptors.
//!
//! The provider dump is loosely formatted: arbitrary indentation, optional
//! quoting, blank lines and directives we do not care about. The scanner is
//! forgiving about that noise and strict about which fields make a usable
//! descriptor once a block is flushed.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;
use tracing::debug;

use crate::descriptor::{ConnectionDescriptor, DescriptorError, HostMap};

#[expect(
    clippy::expect_used,
    reason = "pattern is a compile-time constant covered by unit tests"
)]
static HOST_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*Host\s+(\S+)\s*$").expect("host pattern should compile")
});

#[expect(
    clippy::expect_used,
    reason = "pattern is a compile-time constant covered by unit tests"
)]
static FIELD_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(HostName|User|Port|IdentityFile)\s+(.+?)\s*$")
        .expect("field pattern should compile")
});

/// Errors raised while turning ssh-config text into descriptors.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum SshConfigError {
    /// Raised when a block lacks required keys.
    #[error("ssh-config missing: {}", .fields.join(", "))]
    MissingFields {
        /// Alias of the offending block.
        alias: String,
        /// Canonical names of the absent keys.
        fields: Vec<&'static str>,
    },
    /// Raised when the `Port` value is not an integer.
    #[error("ssh-config invalid Port: {value:?}")]
    InvalidPort {
        /// Alias of the offending block.
        alias: String,
        /// Literal value found in the text.
        value: String,
    },
    /// Raised when the parsed values do not form a valid descriptor.
    #[error("ssh-config invalid host {alias}: {source}")]
    InvalidDescriptor {
        /// Alias of the offending block.
        alias: String,
        /// Validation failure.
        #[source]
        source: DescriptorError,
    },
    /// Raised when no block yields a usable descriptor.
    #[error("ssh-config contains no valid host blocks{}", rejection_note(.rejected))]
    NoValidHostBlocks {
        /// Validation messages for the blocks that were dropped.
        rejected: Vec<String>,
    },
    /// Raised when a requested alias is not declared.
    #[error("host {alias:?} not found in ssh-config; available: [{}]", .available.join(", "))]
    HostNotFound {
        /// Alias that was requested.
        alias: String,
        /// Aliases that parsed successfully.
        available: Vec<String>,
    },
}

fn rejection_note(rejected: &[String]) -> String {
    if rejected.is_empty() {
        String::new()
    } else {
        format!(" ({})", rejected.join("; "))
    }
}

/// Key/value fields captured for one host block.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BlockFields {
    /// `HostName` value.
    pub hostname: Option<String>,
    /// `User` value.
    pub user: Option<String>,
    /// `Port` value, unparsed.
    pub port: Option<String>,
    /// `IdentityFile` value.
    pub identity_file: Option<String>,
}

impl BlockFields {
    /// Returns `true` when no recognised key was captured.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.hostname.is_none()
            && self.user.is_none()
            && self.port.is_none()
            && self.identity_file.is_none()
    }

    fn record(&mut self, key: &str, value: &str) {
        let unquoted = unquote(value).to_owned();
        match key.to_ascii_lowercase().as_str() {
            "hostname" => self.hostname = Some(unquoted),
            "user" => self.user = Some(unquoted),
            "port" => self.port = Some(unquoted),
            "identityfile" => self.identity_file = Some(unquoted),
            _ => {}
        }
    }

    fn missing(&self) -> Vec<&'static str> {
        [
            ("HostName", self.hostname.is_none()),
            ("User", self.user.is_none()),
            ("Port", self.port.is_none()),
            ("IdentityFile", self.identity_file.is_none()),
        ]
        .into_iter()
        .filter_map(|(name, absent)| absent.then_some(name))
        .collect()
    }
}

/// A host declaration with the fields found beneath it.
#[derive(Clone, Debug, Eq, PartialEq)]
struct RawBlock {
    alias: String,
    fields: BlockFields,
}

enum ScanState {
    Outside,
    Inside(RawBlock),
}

/// Validates one block's fields into a descriptor.
///
/// # Errors
///
/// Returns [`SshConfigError::MissingFields`] naming every absent key,
/// [`SshConfigError::InvalidPort`] for a non-numeric port, or
/// [`SshConfigError::InvalidDescriptor`] when a value is out of range.
pub fn parse_block(
    alias: &str,
    fields: &BlockFields,
) -> Result<ConnectionDescriptor, SshConfigError> {
    let (Some(hostname), Some(user), Some(port_text), Some(identity_file)) = (
        fields.hostname.as_deref(),
        fields.user.as_deref(),
        fields.port.as_deref(),
        fields.identity_file.as_deref(),
    ) else {
        return Err(SshConfigError::MissingFields {
            alias: alias.to_owned(),
            fields: fields.missing(),
        });
    };

    let port = port_text
        .parse::<i64>()
        .map_err(|_| SshConfigError::InvalidPort {
            alias: alias.to_owned(),
            value: port_text.to_owned(),
        })?;

    ConnectionDescriptor::new(hostname, port, user, identity_file).map_err(|source| {
        SshConfigError::InvalidDescriptor {
            alias: alias.to_owned(),
            source,
        }
    })
}

/// Parses every host block, dropping blocks that fail validation.
///
/// Blocks appear in the returned mapping in source order. Empty or invalid
/// blocks are skipped so one broken machine does not hide the others.
#[must_use]
pub fn parse_all(text: &str) -> HostMap {
    let mut hosts = HostMap::new();
    for block in scan_blocks(text) {
        match parse_block(&block.alias, &block.fields) {
            Ok(descriptor) => hosts.insert(block.alias, descriptor),
            Err(err) => debug!(alias = %block.alias, error = %err, "dropping ssh-config block"),
        }
    }
    hosts
}

/// Parses a single descriptor from ssh-config text.
///
/// Without `alias` the first valid block wins. With `alias` that block's
/// own validation error is surfaced as-is.
///
/// # Errors
///
/// Returns [`SshConfigError::NoValidHostBlocks`] when nothing usable is
/// found, [`SshConfigError::HostNotFound`] listing the valid aliases when the
/// requested alias is absent, or the block's validation error.
pub fn parse_one(text: &str, alias: Option<&str>) -> Result<ConnectionDescriptor, SshConfigError> {
    let blocks = scan_blocks(text);

    if let Some(wanted) = alias {
        if let Some(block) = blocks.iter().find(|block| block.alias == wanted) {
            return parse_block(&block.alias, &block.fields);
        }
        let available = blocks
            .iter()
            .filter(|block| parse_block(&block.alias, &block.fields).is_ok())
            .map(|block| block.alias.clone())
            .collect();
        return Err(SshConfigError::HostNotFound {
            alias: wanted.to_owned(),
            available,
        });
    }

    let mut rejected = Vec::new();
    for block in &blocks {
        match parse_block(&block.alias, &block.fields) {
            Ok(descriptor) => return Ok(descriptor),
            Err(err) => rejected.push(format!("{}: {err}", block.alias)),
        }
    }
    Err(SshConfigError::NoValidHostBlocks { rejected })
}

/// Splits text into non-empty host blocks in source order.
fn scan_blocks(text: &str) -> Vec<RawBlock> {
    let (mut blocks, state) = text.lines().fold(
        (Vec::new(), ScanState::Outside),
        |(mut blocks, state), line| {
            if let Some(captures) = HOST_PATTERN.captures(line) {
                flush(&mut blocks, state);
                let alias = captures.get(1).map_or("", |m| m.as_str()).to_owned();
                return (
                    blocks,
                    ScanState::Inside(RawBlock {
                        alias,
                        fields: BlockFields::default(),
                    }),
                );
            }

            match state {
                ScanState::Outside => (blocks, ScanState::Outside),
                ScanState::Inside(mut block) => {
                    if let Some(captures) = FIELD_PATTERN.captures(line) {
                        let key = captures.get(1).map_or("", |m| m.as_str());
                        let value = captures.get(2).map_or("", |m| m.as_str());
                        block.fields.record(key, value.trim());
                    }
                    (blocks, ScanState::Inside(block))
                }
            }
        },
    );
    flush(&mut blocks, state);
    blocks
}

fn flush(blocks: &mut Vec<RawBlock>, state: ScanState) {
    if let ScanState::Inside(block) = state
        && !block.fields.is_empty()
    {
        blocks.push(block);
    }
}

/// Strips one pair of matching single or double quotes.
fn unquote(value: &str) -> &str {
    ['"', '\'']
        .into_iter()
        .find_map(|quote| {
            value
                .strip_prefix(quote)
                .and_then(|rest| rest.strip_suffix(quote))
        })
        .unwrap_or(value)
}

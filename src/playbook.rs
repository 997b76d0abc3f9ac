//! Playbook and inventory path resolution plus play host introspection.

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use serde_yaml::Value;
use thiserror::Error;

/// Errors raised while locating or reading a playbook.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum PlaybookFileError {
    /// Raised when an absolute playbook path does not exist.
    #[error("playbook not found: {playbook:?}")]
    NotFound {
        /// Path as supplied by the caller.
        playbook: String,
    },
    /// Raised when a relative playbook is absent under the project root.
    #[error(
        "playbook not found relative to project_dir. project_dir={project_dir:?}, playbook={playbook:?}, tried={tried:?}"
    )]
    NotFoundRelative {
        /// Project root the playbook was resolved against.
        project_dir: Utf8PathBuf,
        /// Path as supplied by the caller.
        playbook: String,
        /// Candidate that was checked.
        tried: Utf8PathBuf,
    },
    /// Raised when the playbook cannot be read.
    #[error("failed to read playbook {path}: {message}")]
    Read {
        /// Playbook path.
        path: Utf8PathBuf,
        /// Operating system error string.
        message: String,
    },
    /// Raised when the playbook is not valid YAML.
    #[error("failed to parse playbook {path}: {message}")]
    Yaml {
        /// Playbook path.
        path: Utf8PathBuf,
        /// Parser error string.
        message: String,
    },
}

/// Resolves `playbook` against `project_dir`.
///
/// # Errors
///
/// Returns [`PlaybookFileError::NotFound`] for a missing absolute path and
/// [`PlaybookFileError::NotFoundRelative`] for a missing relative one.
pub fn resolve_playbook_path(
    project_dir: &Utf8Path,
    playbook: &str,
) -> Result<Utf8PathBuf, PlaybookFileError> {
    let path = Utf8Path::new(playbook);
    if path.is_absolute() {
        return if path.exists() {
            Ok(path.to_path_buf())
        } else {
            Err(PlaybookFileError::NotFound {
                playbook: playbook.to_owned(),
            })
        };
    }

    let candidate = project_dir.join(path);
    if candidate.exists() {
        Ok(candidate)
    } else {
        Err(PlaybookFileError::NotFoundRelative {
            project_dir: project_dir.to_path_buf(),
            playbook: playbook.to_owned(),
            tried: candidate,
        })
    }
}

/// Resolves a caller-supplied inventory reference.
///
/// Blank input yields `None`. Absolute paths pass through, relative paths
/// that exist under the project root are joined to it, and anything else
/// is returned verbatim so it can be used as an ad-hoc host list.
#[must_use]
pub fn resolve_inventory_path(project_dir: &Utf8Path, inventory: Option<&str>) -> Option<String> {
    let value = inventory.filter(|value| !value.is_empty())?;
    if Utf8Path::new(value).is_absolute() {
        return Some(value.to_owned());
    }
    let candidate = project_dir.join(value);
    if candidate.exists() {
        Some(candidate.into_string())
    } else {
        Some(value.to_owned())
    }
}

/// Reads the playbook at `path` and returns its declared host patterns.
///
/// # Errors
///
/// Returns [`PlaybookFileError::Read`] or [`PlaybookFileError::Yaml`] when
/// the file cannot be loaded.
pub fn extract_play_hosts(path: &Utf8Path) -> Result<Vec<String>, PlaybookFileError> {
    let text = read_playbook(path).map_err(|message| PlaybookFileError::Read {
        path: path.to_path_buf(),
        message,
    })?;
    let document: Value = serde_yaml::from_str(&text).map_err(|err| PlaybookFileError::Yaml {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;
    Ok(play_hosts(&document))
}

fn read_playbook(path: &Utf8Path) -> Result<String, String> {
    let (dir_path, file_name) = match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) if !parent.as_str().is_empty() => (parent, name),
        (_, Some(name)) => (Utf8Path::new("."), name),
        _ => return Err(format!("path has no file name: {path}")),
    };
    let dir =
        Dir::open_ambient_dir(dir_path, ambient_authority()).map_err(|err| err.to_string())?;
    dir.read_to_string(file_name).map_err(|err| err.to_string())
}

/// Collects string `hosts` fields across plays, trimmed, de-duplicated and
/// in first-seen order.
///
/// A sequence document is treated as a list of plays; a mapping document as
/// a single play. Anything else has no plays.
#[must_use]
pub fn play_hosts(document: &Value) -> Vec<String> {
    let plays: Vec<&Value> = match document {
        Value::Sequence(items) => items.iter().filter(|item| item.is_mapping()).collect(),
        Value::Mapping(_) => vec![document],
        _ => return Vec::new(),
    };

    let mut patterns: Vec<String> = Vec::new();
    for play in plays {
        let Some(hosts) = play.get("hosts").and_then(Value::as_str) else {
            continue;
        };
        let trimmed = hosts.trim();
        if !trimmed.is_empty() && !patterns.iter().any(|seen| seen == trimmed) {
            patterns.push(trimmed.to_owned());
        }
    }
    patterns
}

//! Project root discovery and control-file/artifact path precedence.

use std::path::absolute;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

/// Default control-file name looked up under the project root.
pub const DEFAULT_CONTROL_FILE: &str = "Vagrantfile";

/// Default artifact directory name under the project root.
pub const DEFAULT_ARTIFACT_DIR: &str = ".artifacts";

/// Directory name that marks the test collection of a project.
pub const TESTS_DIR: &str = "tests";

/// Directory name holding the project's roles.
pub const ROLES_DIR: &str = "roles";

/// Errors raised while resolving the project layout.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum LayoutError {
    /// Raised when the root lacks the expected sibling directories.
    #[error(
        "Invalid ansible project layout. Expected sibling 'tests' and 'roles' under project_dir; resolved project_dir={root:?}"
    )]
    Structural {
        /// Resolved project root.
        root: Utf8PathBuf,
    },
    /// Raised when a path cannot be made absolute or is not UTF-8.
    #[error("cannot resolve path {path}: {message}")]
    Path {
        /// Path that failed to resolve.
        path: String,
        /// Underlying error string.
        message: String,
    },
}

/// A validated project root containing `tests/` and `roles/`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProjectLayout {
    root: Utf8PathBuf,
}

impl ProjectLayout {
    /// Makes `root` absolute and checks for the required directories.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::Structural`] when either directory is missing
    /// and [`LayoutError::Path`] when the root cannot be made absolute.
    pub fn validate(root: &Utf8Path) -> Result<Self, LayoutError> {
        let resolved = make_absolute(root)?;
        let complete = resolved.is_dir()
            && resolved.join(TESTS_DIR).is_dir()
            && resolved.join(ROLES_DIR).is_dir();
        if complete {
            Ok(Self { root: resolved })
        } else {
            Err(LayoutError::Structural { root: resolved })
        }
    }

    /// Infers the root from `origin` and validates it.
    ///
    /// # Errors
    ///
    /// Propagates [`ProjectLayout::validate`] failures.
    pub fn discover(origin: &Utf8Path) -> Result<Self, LayoutError> {
        let absolute_origin = make_absolute(origin)?;
        Self::validate(&infer_project_dir(&absolute_origin))
    }

    /// Absolute project root.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Roles search path handed to the playbook runner.
    #[must_use]
    pub fn roles_dir(&self) -> Utf8PathBuf {
        self.root.join(ROLES_DIR)
    }

    /// Control file location; see [`resolve_control_file`].
    #[must_use]
    pub fn control_file(&self, configured: Option<&str>, per_call: Option<&str>) -> Utf8PathBuf {
        resolve_control_file(&self.root, configured, per_call)
    }

    /// Artifact directory; see [`resolve_artifact_dir`].
    #[must_use]
    pub fn artifact_dir(&self, configured: Option<&str>, per_call: Option<&str>) -> Utf8PathBuf {
        resolve_artifact_dir(&self.root, configured, per_call)
    }
}

/// Walks up from the test file `origin` to the first directory named `tests`
/// and returns its parent. Falls back to the grandparent of `origin`.
#[must_use]
pub fn infer_project_dir(origin: &Utf8Path) -> Utf8PathBuf {
    let start = origin.parent().unwrap_or(origin);
    enclosing_tests_parent(start)
        .or_else(|| origin.parent().and_then(Utf8Path::parent))
        .unwrap_or(origin)
        .to_path_buf()
}

/// Project root for a process started in `working_dir`: the parent of the
/// nearest enclosing `tests` directory, else `working_dir` itself.
#[must_use]
pub fn infer_project_dir_from_cwd(working_dir: &Utf8Path) -> Utf8PathBuf {
    enclosing_tests_parent(working_dir)
        .unwrap_or(working_dir)
        .to_path_buf()
}

fn enclosing_tests_parent(start: &Utf8Path) -> Option<&Utf8Path> {
    start
        .ancestors()
        .find(|dir| dir.file_name() == Some(TESTS_DIR))
        .and_then(Utf8Path::parent)
}

/// Control file precedence: configured override, per-call value, then
/// [`DEFAULT_CONTROL_FILE`]. Relative results are joined to `root`.
#[must_use]
pub fn resolve_control_file(
    root: &Utf8Path,
    configured: Option<&str>,
    per_call: Option<&str>,
) -> Utf8PathBuf {
    let chosen = first_non_blank([configured, per_call]).unwrap_or(DEFAULT_CONTROL_FILE);
    anchor(root, chosen)
}

/// Artifact directory precedence: configured override, per-call value, then
/// `<root>/.artifacts`. Relative results are joined to `root`.
#[must_use]
pub fn resolve_artifact_dir(
    root: &Utf8Path,
    configured: Option<&str>,
    per_call: Option<&str>,
) -> Utf8PathBuf {
    let chosen = first_non_blank([configured, per_call]).unwrap_or(DEFAULT_ARTIFACT_DIR);
    anchor(root, chosen)
}

fn first_non_blank<'a>(candidates: [Option<&'a str>; 2]) -> Option<&'a str> {
    candidates
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|value| !value.is_empty())
}

fn anchor(root: &Utf8Path, value: &str) -> Utf8PathBuf {
    let path = Utf8Path::new(value);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

fn make_absolute(path: &Utf8Path) -> Result<Utf8PathBuf, LayoutError> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let resolved = absolute(path).map_err(|err| LayoutError::Path {
        path: path.to_string(),
        message: err.to_string(),
    })?;
    Utf8PathBuf::from_path_buf(resolved).map_err(|raw| LayoutError::Path {
        path: raw.display().to_string(),
        message: String::from("path is not valid UTF-8"),
    })
}

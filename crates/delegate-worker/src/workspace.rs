//! Repository workspaces.
//!
//! A workspace is the directory holding one checkout of one repository at
//! one revision: `<root>/<repository-name>/<revision>`. The mapping from
//! (name, revision) to path is pure string/path concatenation.
//!
//! Readiness is existence of that directory. A directory left behind by an
//! interrupted clone is also "ready"; nothing here inspects its contents.

use std::fs;
use std::path::{Component, Path, PathBuf};

use delegate_protocol::BootstrapCode;
use thiserror::Error;

/// Directory component used when no revision was requested.
pub const UNSPECIFIED_REVISION_DIR: &str = "HEAD";

/// Build subdirectory inside every workspace.
pub const BUILD_DIR: &str = "build";

/// Errors from workspace derivation. All are detected before any I/O.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkspaceError {
    #[error("URL has no '/' before the repository name: {0}")]
    MissingSeparator(String),

    #[error("URL does not end in a repository name: {0}")]
    EmptyName(String),

    #[error("revision is not usable as a directory name: {0}")]
    InvalidRevision(String),
}

pub type WorkspaceResult<T> = Result<T, WorkspaceError>;

impl WorkspaceError {
    /// Response code reported to the coordinator.
    pub fn code(&self) -> BootstrapCode {
        match self {
            Self::MissingSeparator(_) | Self::EmptyName(_) => BootstrapCode::BadUrl,
            Self::InvalidRevision(_) => BootstrapCode::BadRevision,
        }
    }
}

/// Repository name from a clone URL: the segment after the last `/`,
/// without a trailing `.git`.
pub fn extract_repository_name(url: &str) -> WorkspaceResult<&str> {
    let slash = url
        .rfind('/')
        .ok_or_else(|| WorkspaceError::MissingSeparator(url.to_string()))?;
    let segment = &url[slash + 1..];
    let name = segment.strip_suffix(".git").unwrap_or(segment);

    if name.is_empty() || name == "." || name == ".." {
        return Err(WorkspaceError::EmptyName(url.to_string()));
    }
    Ok(name)
}

/// Reject revisions that would escape the repository directory or be
/// parsed as an option by git.
pub fn validate_revision(revision: &str) -> WorkspaceResult<()> {
    let invalid = || WorkspaceError::InvalidRevision(revision.to_string());

    if revision.is_empty() {
        return Ok(());
    }
    if revision.starts_with('-') || revision.contains('\0') {
        return Err(invalid());
    }
    let escapes = Path::new(revision).components().any(|c| {
        matches!(
            c,
            Component::ParentDir | Component::CurDir | Component::RootDir | Component::Prefix(_)
        )
    });
    if escapes {
        return Err(invalid());
    }
    Ok(())
}

/// Relative workspace path for (name, revision). Pure; performs no I/O.
pub fn derive_path(name: &str, revision: &str) -> PathBuf {
    let revision_dir = if revision.is_empty() {
        UNSPECIFIED_REVISION_DIR
    } else {
        revision
    };
    Path::new(name).join(revision_dir)
}

/// Whether `path` exists as a directory.
pub fn is_ready(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.is_dir()).unwrap_or(false)
}

/// A resolved (repository, revision) workspace under a root directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryWorkspace {
    name: String,
    revision: String,
    relative: PathBuf,
    path: PathBuf,
}

impl RepositoryWorkspace {
    /// Resolve the workspace for `url` at `revision` under `root`.
    pub fn resolve(root: &Path, url: &str, revision: &str) -> WorkspaceResult<Self> {
        let name = extract_repository_name(url)?;
        validate_revision(revision)?;
        let relative = derive_path(name, revision);
        Ok(Self {
            name: name.to_string(),
            revision: revision.to_string(),
            path: root.join(&relative),
            relative,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Requested revision; empty when none was supplied.
    pub fn revision(&self) -> &str {
        &self.revision
    }

    /// `<name>/<revision>`, relative to the workspace root.
    pub fn relative(&self) -> &Path {
        &self.relative
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn build_dir(&self) -> PathBuf {
        self.path.join(BUILD_DIR)
    }

    pub fn is_ready(&self) -> bool {
        is_ready(&self.path)
    }

    /// Flat identifier for per-workspace lock files.
    pub fn lock_key(&self) -> String {
        let revision = if self.revision.is_empty() {
            UNSPECIFIED_REVISION_DIR
        } else {
            self.revision.as_str()
        };
        format!("{}@{}", self.name, revision.replace(['/', '\\'], "%2F"))
    }
}

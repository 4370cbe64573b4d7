//! Repository bootstrap payloads.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Instruction to materialize a repository at a revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapRequest {
    /// Clone URL of the repository.
    pub url: String,
    /// Revision to check out. Empty means "whatever the clone left checked out".
    #[serde(default)]
    pub rev: String,
    /// Extra build-generator options for this project.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

impl BootstrapRequest {
    pub fn new(url: impl Into<String>, rev: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            rev: rev.into(),
            options: Vec::new(),
        }
    }
}

/// Result codes for a bootstrap step.
///
/// These codes are stable and interpreted by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BootstrapCode {
    /// Workspace is checked out and configured.
    Ok,
    /// URL was malformed or the clone failed.
    BadUrl,
    /// Checkout of the requested revision failed.
    BadRevision,
    /// The build-system generator failed.
    ConfigFailed,
    /// A bounded step (lock, clone, checkout, configure) ran past its deadline.
    TimedOut,
}

impl BootstrapCode {
    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }
}

impl fmt::Display for BootstrapCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "OK"),
            Self::BadUrl => write!(f, "BAD_URL"),
            Self::BadRevision => write!(f, "BAD_REVISION"),
            Self::ConfigFailed => write!(f, "CONFIG_FAILED"),
            Self::TimedOut => write!(f, "TIMED_OUT"),
        }
    }
}

/// Worker's answer to a bootstrap request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapResponse {
    pub code: BootstrapCode,
}

impl BootstrapResponse {
    pub fn new(code: BootstrapCode) -> Self {
        Self { code }
    }
}

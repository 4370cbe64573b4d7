//! Repository bootstrap: clone + checkout into a workspace, idempotently.
//!
//! The sequence for a bootstrap request is:
//! 1. Derive the workspace from the URL and revision (BAD_URL / BAD_REVISION
//!    without spawning anything if that fails)
//! 2. Take the per-workspace lock
//! 3. If the workspace directory already exists, reuse it as-is
//! 4. Otherwise `git clone -- <url> <path>` (failure: BAD_URL)
//! 5. If a revision was given, `git checkout <rev>` inside it (failure: BAD_REVISION)
//!
//! Existing directories are never deleted or modified.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use delegate_protocol::BootstrapCode;
use tracing::{debug, info, warn};

use crate::config::{BootstrapSettings, WorkerConfig};
use crate::launcher::Launcher;
use crate::lock::{LockError, WorkspaceLock};
use crate::process::{run_to_completion, CommandSpec, ProcessError, WaitOutcome};
use crate::workspace::RepositoryWorkspace;

/// Length of a full SHA-1 commit id in hex.
pub const COMMIT_HASH_LEN: usize = 40;

/// Lines of git stderr kept in failure logs.
const STDERR_TAIL_LINES: usize = 5;

/// Detailed result of a bootstrap.
#[derive(Debug, Clone)]
pub struct BootstrapOutcome {
    pub code: BootstrapCode,
    /// Resolved workspace, present whenever URL and revision were usable.
    pub workspace: Option<RepositoryWorkspace>,
    /// Whether this call performed a clone (false when the workspace was reused).
    pub cloned: bool,
    /// Commit checked out, when `report_head` is enabled.
    pub head: Option<String>,
}

impl BootstrapOutcome {
    fn rejected(code: BootstrapCode, workspace: Option<RepositoryWorkspace>) -> Self {
        Self {
            code,
            workspace,
            cloned: false,
            head: None,
        }
    }
}

/// Drives git to materialize repositories under the workspace root.
pub struct RepositoryBootstrapper {
    launcher: Arc<dyn Launcher>,
    root: PathBuf,
    settings: BootstrapSettings,
    lock_timeout: Duration,
    grace: Duration,
}

impl RepositoryBootstrapper {
    pub fn new(launcher: Arc<dyn Launcher>, config: &WorkerConfig) -> Self {
        Self {
            launcher,
            root: config.workspace_root.clone(),
            settings: config.bootstrap.clone(),
            lock_timeout: config.lock_timeout,
            grace: config.terminate_grace,
        }
    }

    /// Bootstrap `url` at `revision`, returning only the response code.
    pub fn bootstrap(&self, url: &str, revision: &str) -> BootstrapCode {
        self.prepare(url, revision).code
    }

    /// Bootstrap `url` at `revision`.
    pub fn prepare(&self, url: &str, revision: &str) -> BootstrapOutcome {
        let workspace = match RepositoryWorkspace::resolve(&self.root, url, revision) {
            Ok(ws) => ws,
            Err(e) => {
                warn!(url, revision, error = %e, "rejecting bootstrap request");
                return BootstrapOutcome::rejected(e.code(), None);
            }
        };
        info!(
            repository = workspace.name(),
            revision,
            path = %workspace.path().display(),
            "bootstrapping workspace"
        );

        let _lock = match WorkspaceLock::acquire(&self.root, &workspace.lock_key(), self.lock_timeout) {
            Ok(lock) => lock,
            Err(LockError::Timeout(waited)) => {
                warn!(path = %workspace.path().display(), ?waited, "timed out waiting for workspace lock");
                return BootstrapOutcome::rejected(BootstrapCode::TimedOut, Some(workspace));
            }
            Err(e) => {
                warn!(root = %self.root.display(), error = %e, "workspace root unusable");
                return BootstrapOutcome::rejected(BootstrapCode::BadUrl, Some(workspace));
            }
        };

        if workspace.is_ready() {
            info!(path = %workspace.path().display(), "workspace already exists, reusing it");
            return BootstrapOutcome {
                code: BootstrapCode::Ok,
                workspace: Some(workspace),
                cloned: false,
                head: None,
            };
        }

        if let Err(code) = self.clone_into(url, &workspace) {
            return BootstrapOutcome::rejected(code, Some(workspace));
        }

        if !workspace.revision().is_empty() {
            if let Err(code) = self.checkout(&workspace) {
                return BootstrapOutcome {
                    code,
                    workspace: Some(workspace),
                    cloned: true,
                    head: None,
                };
            }
        }

        let head = if self.settings.report_head {
            match self.resolve_head(&workspace) {
                Ok(hash) => Some(hash),
                Err(code) => {
                    return BootstrapOutcome {
                        code,
                        workspace: Some(workspace),
                        cloned: true,
                        head: None,
                    }
                }
            }
        } else {
            None
        };

        info!(
            repository = workspace.name(),
            head = head.as_deref().unwrap_or(workspace.revision()),
            "workspace initialized"
        );
        BootstrapOutcome {
            code: BootstrapCode::Ok,
            workspace: Some(workspace),
            cloned: true,
            head,
        }
    }

    fn clone_into(&self, url: &str, workspace: &RepositoryWorkspace) -> Result<(), BootstrapCode> {
        if let Some(parent) = workspace.path().parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                warn!(path = %parent.display(), error = %e, "cannot create repository directory");
                return Err(BootstrapCode::BadUrl);
            }
        }

        let spec = CommandSpec::new(&self.settings.git)
            .arg("clone")
            .arg("--")
            .arg(url)
            .arg(workspace.path().to_string_lossy());

        self.run_git(&spec, self.settings.clone_timeout, BootstrapCode::BadUrl)
    }

    fn checkout(&self, workspace: &RepositoryWorkspace) -> Result<(), BootstrapCode> {
        let spec = CommandSpec::new(&self.settings.git)
            .arg("checkout")
            .arg(workspace.revision())
            .current_dir(workspace.path());

        self.run_git(&spec, self.settings.checkout_timeout, BootstrapCode::BadRevision)
    }

    /// Run one git step, mapping every failure to `failure` except timeouts.
    fn run_git(
        &self,
        spec: &CommandSpec,
        timeout: Duration,
        failure: BootstrapCode,
    ) -> Result<(), BootstrapCode> {
        let output = match run_to_completion(self.launcher.as_ref(), spec, timeout, self.grace) {
            Ok(output) => output,
            Err(e) => {
                warn!(command = %spec, error = %e, "git step could not run");
                return Err(failure);
            }
        };

        match output.outcome {
            WaitOutcome::TimedOut => Err(BootstrapCode::TimedOut),
            outcome if outcome.success() => {
                debug!(command = %spec, "git step succeeded");
                Ok(())
            }
            outcome => {
                warn!(
                    command = %spec,
                    %outcome,
                    stderr = %output.stderr_tail(STDERR_TAIL_LINES),
                    "git step failed"
                );
                Err(failure)
            }
        }
    }

    /// Read the checked-out commit id via `git rev-parse HEAD`.
    fn resolve_head(&self, workspace: &RepositoryWorkspace) -> Result<String, BootstrapCode> {
        let spec = CommandSpec::new(&self.settings.git)
            .args(["rev-parse", "HEAD"])
            .current_dir(workspace.path());

        let mut handle = self.launcher.launch(&spec);
        if !handle.is_valid() {
            warn!(command = %spec, "could not start git to resolve HEAD");
            return Err(BootstrapCode::BadRevision);
        }

        let read = handle.read_prefix(COMMIT_HASH_LEN);
        let waited = handle.wait_with_deadline(self.settings.checkout_timeout, self.grace);
        handle.close();

        let bytes = match read {
            Ok(bytes) => bytes,
            Err(ProcessError::ShortRead { expected, actual }) => {
                warn!(expected, actual, "git rev-parse produced a truncated commit id");
                return Err(BootstrapCode::BadRevision);
            }
            Err(e) => {
                warn!(error = %e, "failed reading git rev-parse output");
                return Err(BootstrapCode::BadRevision);
            }
        };

        match waited {
            Ok(WaitOutcome::TimedOut) => return Err(BootstrapCode::TimedOut),
            Ok(outcome) if !outcome.success() => {
                warn!(%outcome, "git rev-parse failed");
                return Err(BootstrapCode::BadRevision);
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "failed waiting for git rev-parse");
                return Err(BootstrapCode::BadRevision);
            }
        }

        let hash = String::from_utf8_lossy(&bytes).into_owned();
        if !hash.chars().all(|c| c.is_ascii_hexdigit()) {
            warn!(output = %hash, "git rev-parse output is not a commit id");
            return Err(BootstrapCode::BadRevision);
        }
        Ok(hash)
    }
}

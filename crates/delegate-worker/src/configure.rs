//! Build-system generation inside a workspace.
//!
//! Runs the configured generator (cmake by default) in `<workspace>/build`
//! with the configured default options followed by the options the
//! coordinator sent for this project. The build directory is the child's
//! working directory; the worker's own current directory is never changed.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use delegate_protocol::BootstrapCode;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{ConfigureSettings, WorkerConfig};
use crate::launcher::Launcher;
use crate::process::{run_to_completion, CommandSpec, ProcessError, WaitOutcome};

/// Lines of generator stderr kept in failure messages.
const STDERR_TAIL_LINES: usize = 10;

/// Configure result type
pub type ConfigureResult<T> = Result<T, ConfigureError>;

/// Errors from the configure step
#[derive(Debug, Error)]
pub enum ConfigureError {
    #[error("invalid generator option {0:?}: options must be non-empty and free of whitespace")]
    InvalidOption(String),

    #[error("cannot create build directory {path}: {source}")]
    BuildDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("generator could not be started: {0}")]
    Spawn(#[source] ProcessError),

    #[error("generator exited with {outcome}: {stderr}")]
    Failed { outcome: WaitOutcome, stderr: String },

    #[error("generator did not finish within {0:?}")]
    TimedOut(Duration),
}

impl ConfigureError {
    /// Response code reported to the coordinator.
    pub fn code(&self) -> BootstrapCode {
        match self {
            Self::TimedOut(_) => BootstrapCode::TimedOut,
            _ => BootstrapCode::ConfigFailed,
        }
    }
}

/// Check that `option` can be passed as exactly one argument.
pub fn validate_option(option: &str) -> ConfigureResult<()> {
    if option.is_empty() || option.contains('\0') || option.chars().any(char::is_whitespace) {
        return Err(ConfigureError::InvalidOption(option.to_string()));
    }
    Ok(())
}

/// Runs the build-system generator.
pub struct BuildConfigurer {
    launcher: Arc<dyn Launcher>,
    settings: ConfigureSettings,
    grace: Duration,
}

impl BuildConfigurer {
    pub fn new(launcher: Arc<dyn Launcher>, config: &WorkerConfig) -> Self {
        Self {
            launcher,
            settings: config.configure.clone(),
            grace: config.terminate_grace,
        }
    }

    /// Whether the session should run this step at all.
    pub fn enabled(&self) -> bool {
        self.settings.enabled
    }

    /// Generator invocation for `build_dir` with `options` after the defaults.
    ///
    /// Every option is validated before anything is built, so a rejected
    /// request never reaches the filesystem or the launcher.
    pub fn command(&self, build_dir: &Path, options: &[String]) -> ConfigureResult<CommandSpec> {
        for option in self.settings.options.iter().chain(options) {
            validate_option(option)?;
        }
        Ok(CommandSpec::new(&self.settings.program)
            .args(self.settings.args.iter().cloned())
            .args(self.settings.options.iter().cloned())
            .args(options.iter().cloned())
            .current_dir(build_dir))
    }

    /// Generate the build system for the workspace at `workspace_path`.
    pub fn configure(&self, workspace_path: &Path, options: &[String]) -> ConfigureResult<()> {
        let build_dir = workspace_path.join(crate::workspace::BUILD_DIR);
        let spec = self.command(&build_dir, options)?;

        fs::create_dir_all(&build_dir).map_err(|source| ConfigureError::BuildDir {
            path: build_dir.clone(),
            source,
        })?;

        debug!(command = %spec, cwd = %build_dir.display(), "running build generator");
        let output = run_to_completion(self.launcher.as_ref(), &spec, self.settings.timeout, self.grace)
            .map_err(ConfigureError::Spawn)?;

        match output.outcome {
            WaitOutcome::TimedOut => {
                warn!(command = %spec, "build generator timed out");
                Err(ConfigureError::TimedOut(self.settings.timeout))
            }
            outcome if outcome.success() => {
                info!(build_dir = %build_dir.display(), "build system generated");
                Ok(())
            }
            outcome => Err(ConfigureError::Failed {
                outcome,
                stderr: output.stderr_tail(STDERR_TAIL_LINES),
            }),
        }
    }
}

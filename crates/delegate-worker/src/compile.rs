//! Compile execution.
//!
//! Each requested file identifier is handed to the build driver
//! (`make VERBOSE=1 <file>` by default) inside the workspace build
//! directory. Failures of any kind become diagnostic text in the
//! [`CompileResponse`]; nothing here aborts the session.

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use delegate_protocol::CompileResponse;
use tracing::{debug, info, warn};

use crate::config::{CompileSettings, WorkerConfig};
use crate::launcher::Launcher;
use crate::process::{run_to_completion, CommandSpec, WaitOutcome};
use crate::workspace::RepositoryWorkspace;

/// Lines of driver stderr kept in diagnostics.
const STDERR_TAIL_LINES: usize = 20;

/// Why a file identifier cannot be handed to the driver.
pub fn invalid_identifier(file: &str) -> Option<&'static str> {
    if file.is_empty() {
        return Some("file identifier is empty");
    }
    if file.starts_with('-') {
        return Some("file identifier must not start with '-'");
    }
    if file.contains('\0') {
        return Some("file identifier contains NUL");
    }
    let path = Path::new(file);
    if path.is_absolute() {
        return Some("file identifier must be relative to the build directory");
    }
    if path.components().any(|c| matches!(c, Component::ParentDir)) {
        return Some("file identifier must not contain '..'");
    }
    None
}

/// Locate the artifact the driver produced for `file`.
///
/// Scans the driver's verbose output for the last `-o <path>` whose path
/// ends with `file`; falls back to `<build_dir>/<file>`. Relative paths
/// resolve against `build_dir`.
pub fn locate_artifact(stdout: &str, build_dir: &Path, file: &str) -> PathBuf {
    let tokens: Vec<&str> = stdout.split_whitespace().collect();
    let reported = tokens
        .windows(2)
        .rev()
        .find(|pair| pair[0] == "-o" && Path::new(pair[1]).ends_with(file))
        .map(|pair| pair[1]);

    match reported {
        Some(path) => build_dir.join(path),
        None => build_dir.join(file),
    }
}

/// Runs the build driver and gathers artifacts.
pub struct CompileExecutor {
    launcher: Arc<dyn Launcher>,
    settings: CompileSettings,
    grace: Duration,
}

impl CompileExecutor {
    pub fn new(launcher: Arc<dyn Launcher>, config: &WorkerConfig) -> Self {
        Self {
            launcher,
            settings: config.compile.clone(),
            grace: config.terminate_grace,
        }
    }

    /// Build every file in `files`, one response each, in request order.
    pub fn compile(&self, workspace: &RepositoryWorkspace, files: &[String]) -> Vec<CompileResponse> {
        let build_dir = workspace.build_dir();
        files
            .iter()
            .map(|file| self.compile_file(&build_dir, file))
            .collect()
    }

    /// Build a single file inside `build_dir`.
    pub fn compile_file(&self, build_dir: &Path, file: &str) -> CompileResponse {
        if let Some(reason) = invalid_identifier(file) {
            warn!(file, reason, "rejecting compile request");
            return CompileResponse::failure(file, reason);
        }

        let spec = CommandSpec::new(&self.settings.program)
            .args(self.settings.args.iter().cloned())
            .arg(file)
            .current_dir(build_dir);

        debug!(command = %spec, "running build driver");
        let output = match run_to_completion(
            self.launcher.as_ref(),
            &spec,
            self.settings.timeout,
            self.grace,
        ) {
            Ok(output) => output,
            Err(e) => {
                warn!(command = %spec, error = %e, "build driver could not run");
                return CompileResponse::failure(file, format!("failed to run {}: {}", spec.program, e));
            }
        };

        match output.outcome {
            WaitOutcome::TimedOut => {
                warn!(file, timeout_secs = self.settings.timeout.as_secs(), "compile timed out");
                return CompileResponse::failure(
                    file,
                    format!("compile timed out after {}s", self.settings.timeout.as_secs()),
                );
            }
            outcome if !outcome.success() => {
                let stderr = output.stderr_tail(STDERR_TAIL_LINES);
                warn!(file, %outcome, "compile failed");
                let error = if stderr.is_empty() {
                    format!("{} {}", spec.program, outcome)
                } else {
                    format!("{} {}:\n{}", spec.program, outcome, stderr)
                };
                return CompileResponse::failure(file, error);
            }
            _ => {}
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let artifact = locate_artifact(&stdout, build_dir, file);
        match self.read_artifact(&artifact) {
            Ok(data) => {
                info!(file, artifact = %artifact.display(), bytes = data.len(), "compiled");
                CompileResponse::success(file, data)
            }
            Err(error) => {
                warn!(file, artifact = %artifact.display(), %error, "artifact unavailable");
                CompileResponse::failure(file, error)
            }
        }
    }

    fn read_artifact(&self, path: &Path) -> Result<Vec<u8>, String> {
        let metadata = fs::metadata(path)
            .map_err(|e| format!("artifact {} not found: {}", path.display(), e))?;
        if !metadata.is_file() {
            return Err(format!("artifact {} is not a regular file", path.display()));
        }
        if metadata.len() > self.settings.max_artifact_bytes {
            return Err(format!(
                "artifact {} is {} bytes, limit is {}",
                path.display(),
                metadata.len(),
                self.settings.max_artifact_bytes
            ));
        }
        fs::read(path).map_err(|e| format!("cannot read artifact {}: {}", path.display(), e))
    }
}

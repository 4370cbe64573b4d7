//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

use delegate_protocol::PROTOCOL_VERSION;

/// Worker configuration settings.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Protocol version announced at registration.
    pub protocol_version: i32,
    /// Directory under which `<name>/<revision>` workspaces are created.
    pub workspace_root: PathBuf,
    /// How long to wait for another worker holding the same workspace lock.
    pub lock_timeout: Duration,
    /// Repository bootstrap settings.
    pub bootstrap: BootstrapSettings,
    /// Build-system generator settings.
    pub configure: ConfigureSettings,
    /// Build driver settings.
    pub compile: CompileSettings,
    /// Grace period between SIGTERM and SIGKILL for a timed-out child.
    pub terminate_grace: Duration,
}

/// Settings for the version-control client.
#[derive(Debug, Clone)]
pub struct BootstrapSettings {
    /// Version-control executable, resolved via `PATH`.
    pub git: String,
    /// Resolve and log the checked-out commit after checkout.
    pub report_head: bool,
    pub clone_timeout: Duration,
    pub checkout_timeout: Duration,
}

/// Settings for the build-system generator.
#[derive(Debug, Clone)]
pub struct ConfigureSettings {
    /// Run the generator after bootstrap.
    pub enabled: bool,
    pub program: String,
    /// Fixed leading arguments (the source directory for cmake).
    pub args: Vec<String>,
    /// Default options, followed by any options from the bootstrap request.
    pub options: Vec<String>,
    pub timeout: Duration,
}

/// Settings for the compile driver.
#[derive(Debug, Clone)]
pub struct CompileSettings {
    pub program: String,
    /// Arguments placed before the file identifier.
    pub args: Vec<String>,
    /// Artifacts larger than this are reported as failures.
    pub max_artifact_bytes: u64,
    pub timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            workspace_root: PathBuf::from("workspaces"),
            lock_timeout: Duration::from_secs(600),
            bootstrap: BootstrapSettings::default(),
            configure: ConfigureSettings::default(),
            compile: CompileSettings::default(),
            terminate_grace: Duration::from_secs(10),
        }
    }
}

impl Default for BootstrapSettings {
    fn default() -> Self {
        Self {
            git: "git".to_string(),
            report_head: false,
            clone_timeout: Duration::from_secs(1800),
            checkout_timeout: Duration::from_secs(300),
        }
    }
}

impl Default for ConfigureSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            program: "cmake".to_string(),
            args: vec!["..".to_string()],
            options: vec!["-DCMAKE_BUILD_TYPE=RELEASE".to_string()],
            timeout: Duration::from_secs(600),
        }
    }
}

impl Default for CompileSettings {
    fn default() -> Self {
        Self {
            program: "make".to_string(),
            args: vec!["VERBOSE=1".to_string()],
            max_artifact_bytes: 256 * 1024 * 1024, // 256 MB
            timeout: Duration::from_secs(1800),
        }
    }
}

//! Built-in node defaults (layer 1)
//!
//! Typed configuration sections. Every key the node understands appears
//! here; unknown keys in a config file are rejected.

use delegate_worker::WorkerConfig;
use serde::{Deserialize, Serialize};

/// Complete node configuration, as deserialized from the merged layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeSettings {
    /// Protocol version announced at registration
    pub protocol_version: i32,
    pub workspace: WorkspaceSection,
    pub bootstrap: BootstrapSection,
    pub configure: ConfigureSection,
    pub compile: CompileSection,
    pub timeouts: TimeoutSection,
    pub log: LogSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkspaceSection {
    /// Directory holding `<name>/<revision>` workspaces
    pub root: String,
    /// Wait limit for a workspace lock held by another worker
    pub lock_timeout_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BootstrapSection {
    /// Version-control executable
    pub git: String,
    /// Resolve and log the checked-out commit
    pub report_head: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigureSection {
    pub enabled: bool,
    pub program: String,
    pub args: Vec<String>,
    pub options: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompileSection {
    pub program: String,
    pub args: Vec<String>,
    pub max_artifact_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeoutSection {
    pub connect_seconds: u64,
    pub clone_seconds: u64,
    pub checkout_seconds: u64,
    pub configure_seconds: u64,
    pub compile_seconds: u64,
    pub terminate_grace_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogSection {
    /// Filter directive used when `RUST_LOG` is unset (e.g. "info", "delegate_worker=debug")
    pub level: String,
}

/// Connect timeout (default: 30 seconds)
pub const DEFAULT_CONNECT_SECONDS: u64 = 30;

/// Log filter (default: "info")
pub const DEFAULT_LOG_LEVEL: &str = "info";

impl Default for NodeSettings {
    fn default() -> Self {
        let worker = WorkerConfig::default();
        Self {
            protocol_version: worker.protocol_version,
            workspace: WorkspaceSection {
                root: worker.workspace_root.to_string_lossy().into_owned(),
                lock_timeout_seconds: worker.lock_timeout.as_secs(),
            },
            bootstrap: BootstrapSection {
                git: worker.bootstrap.git,
                report_head: worker.bootstrap.report_head,
            },
            configure: ConfigureSection {
                enabled: worker.configure.enabled,
                program: worker.configure.program,
                args: worker.configure.args,
                options: worker.configure.options,
            },
            compile: CompileSection {
                program: worker.compile.program,
                args: worker.compile.args,
                max_artifact_bytes: worker.compile.max_artifact_bytes,
            },
            timeouts: TimeoutSection {
                connect_seconds: DEFAULT_CONNECT_SECONDS,
                clone_seconds: worker.bootstrap.clone_timeout.as_secs(),
                checkout_seconds: worker.bootstrap.checkout_timeout.as_secs(),
                configure_seconds: worker.configure.timeout.as_secs(),
                compile_seconds: worker.compile.timeout.as_secs(),
                terminate_grace_seconds: worker.terminate_grace.as_secs(),
            },
            log: LogSection {
                level: DEFAULT_LOG_LEVEL.to_string(),
            },
        }
    }
}

impl NodeSettings {
    /// Convert to JSON Value for merging
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "protocol_version": self.protocol_version,
            "workspace": {
                "root": self.workspace.root,
                "lock_timeout_seconds": self.workspace.lock_timeout_seconds
            },
            "bootstrap": {
                "git": self.bootstrap.git,
                "report_head": self.bootstrap.report_head
            },
            "configure": {
                "enabled": self.configure.enabled,
                "program": self.configure.program,
                "args": self.configure.args,
                "options": self.configure.options
            },
            "compile": {
                "program": self.compile.program,
                "args": self.compile.args,
                "max_artifact_bytes": self.compile.max_artifact_bytes
            },
            "timeouts": {
                "connect_seconds": self.timeouts.connect_seconds,
                "clone_seconds": self.timeouts.clone_seconds,
                "checkout_seconds": self.timeouts.checkout_seconds,
                "configure_seconds": self.timeouts.configure_seconds,
                "compile_seconds": self.timeouts.compile_seconds,
                "terminate_grace_seconds": self.timeouts.terminate_grace_seconds
            },
            "log": {
                "level": self.log.level
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let defaults = NodeSettings::default();
        assert_eq!(defaults.protocol_version, 1);
        assert_eq!(defaults.workspace.root, "workspaces");
        assert_eq!(defaults.bootstrap.git, "git");
        assert_eq!(defaults.configure.program, "cmake");
        assert_eq!(defaults.configure.options, vec!["-DCMAKE_BUILD_TYPE=RELEASE"]);
        assert_eq!(defaults.compile.args, vec!["VERBOSE=1"]);
        assert_eq!(defaults.timeouts.connect_seconds, 30);
        assert_eq!(defaults.log.level, "info");
    }

    #[test]
    fn test_to_value_round_trips_through_serde() {
        let defaults = NodeSettings::default();
        let value = defaults.to_value();

        assert_eq!(value["workspace"]["root"], "workspaces");
        assert_eq!(value["compile"]["program"], "make");
        let parsed: NodeSettings = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, defaults);
    }
}

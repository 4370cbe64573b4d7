//! Effective node configuration with provenance
//!
//! The merged configuration plus the sources that contributed to it, so a
//! node can log exactly which file (and which bytes of it) it ran with.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use delegate_worker::{BootstrapSettings, CompileSettings, ConfigureSettings, WorkerConfig};

use super::defaults::NodeSettings;
use super::merge::merge_layers;

/// Config file looked up in the current directory when none is named.
pub const DEFAULT_CONFIG_FILE: &str = "delegate-node.toml";

/// Upper bound for any timeout setting (one day).
const MAX_TIMEOUT_SECONDS: u64 = 86_400;

/// Origin of a configuration source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOrigin {
    Builtin,
    File,
    Cli,
}

/// A contributing config source with provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSource {
    pub origin: ConfigOrigin,

    /// File path (None for builtin/cli)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// SHA-256 digest of raw file bytes (None for builtin/cli)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

/// CLI-level overrides, applied last.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub workspace_root: Option<PathBuf>,
    pub log_level: Option<String>,
}

impl CliOverrides {
    fn to_value(&self) -> Option<Value> {
        let mut layer = serde_json::Map::new();
        if let Some(root) = &self.workspace_root {
            layer.insert(
                "workspace".to_string(),
                serde_json::json!({ "root": root.to_string_lossy() }),
            );
        }
        if let Some(level) = &self.log_level {
            layer.insert("log".to_string(), serde_json::json!({ "level": level }));
        }
        if layer.is_empty() {
            None
        } else {
            Some(Value::Object(layer))
        }
    }
}

/// Effective configuration with provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// When this config was computed
    pub created_at: DateTime<Utc>,

    pub settings: NodeSettings,

    /// Contributing sources in precedence order
    pub sources: Vec<ConfigSource>,
}

impl NodeConfig {
    /// Build the effective config.
    ///
    /// `file` must exist when given; otherwise `./delegate-node.toml` is
    /// used if present.
    pub fn load(file: Option<&Path>, cli: &CliOverrides) -> ConfigResult<Self> {
        let file = match file {
            Some(path) if !path.exists() => {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Some(path) => Some(path.to_path_buf()),
            None => {
                let fallback = PathBuf::from(DEFAULT_CONFIG_FILE);
                fallback.is_file().then_some(fallback)
            }
        };
        Self::build(file.as_deref(), cli.to_value())
    }

    /// Build the effective config from explicit layers.
    pub fn build(file: Option<&Path>, cli_overrides: Option<Value>) -> ConfigResult<Self> {
        let mut layers = Vec::new();
        let mut sources = Vec::new();

        layers.push(NodeSettings::default().to_value());
        sources.push(ConfigSource {
            origin: ConfigOrigin::Builtin,
            path: None,
            digest: None,
        });

        if let Some(path) = file {
            let (value, digest) = Self::load_toml_file(path)?;
            layers.push(value);
            sources.push(ConfigSource {
                origin: ConfigOrigin::File,
                path: Some(path.to_string_lossy().to_string()),
                digest: Some(digest),
            });
        }

        if let Some(cli) = cli_overrides {
            layers.push(cli);
            sources.push(ConfigSource {
                origin: ConfigOrigin::Cli,
                path: None,
                digest: None,
            });
        }

        let merged = merge_layers(layers);
        let settings: NodeSettings = serde_json::from_value(merged)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        Self::validate(&settings)?;

        Ok(Self {
            created_at: Utc::now(),
            settings,
            sources,
        })
    }

    /// Load and parse a TOML file, returning the value and digest
    fn load_toml_file(path: &Path) -> ConfigResult<(Value, String)> {
        let bytes = fs::read(path).map_err(|e| ConfigError::IoError(e.to_string()))?;

        let digest = hex::encode(Sha256::digest(&bytes));

        let contents = String::from_utf8(bytes)
            .map_err(|e| ConfigError::ParseError(format!("Invalid UTF-8: {}", e)))?;
        let table: toml::Table = toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseError(format!("TOML parse error: {}", e)))?;

        Ok((Self::toml_to_json(toml::Value::Table(table)), digest))
    }

    fn toml_to_json(toml: toml::Value) -> Value {
        match toml {
            toml::Value::String(s) => Value::String(s),
            toml::Value::Integer(i) => Value::Number(i.into()),
            toml::Value::Float(f) => serde_json::Number::from_f64(f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            toml::Value::Boolean(b) => Value::Bool(b),
            toml::Value::Datetime(dt) => Value::String(dt.to_string()),
            toml::Value::Array(arr) => Value::Array(arr.into_iter().map(Self::toml_to_json).collect()),
            toml::Value::Table(table) => Value::Object(
                table
                    .into_iter()
                    .map(|(k, v)| (k, Self::toml_to_json(v)))
                    .collect(),
            ),
        }
    }

    fn validate(settings: &NodeSettings) -> ConfigResult<()> {
        let timeouts = [
            ("workspace.lock_timeout_seconds", settings.workspace.lock_timeout_seconds),
            ("timeouts.connect_seconds", settings.timeouts.connect_seconds),
            ("timeouts.clone_seconds", settings.timeouts.clone_seconds),
            ("timeouts.checkout_seconds", settings.timeouts.checkout_seconds),
            ("timeouts.configure_seconds", settings.timeouts.configure_seconds),
            ("timeouts.compile_seconds", settings.timeouts.compile_seconds),
        ];
        for (key, value) in timeouts {
            if value == 0 || value > MAX_TIMEOUT_SECONDS {
                return Err(ConfigError::ValidationError(format!(
                    "{} must be in (0, {}]",
                    key, MAX_TIMEOUT_SECONDS
                )));
            }
        }
        if settings.timeouts.terminate_grace_seconds > MAX_TIMEOUT_SECONDS {
            return Err(ConfigError::ValidationError(format!(
                "timeouts.terminate_grace_seconds must be at most {}",
                MAX_TIMEOUT_SECONDS
            )));
        }

        let programs = [
            ("bootstrap.git", &settings.bootstrap.git),
            ("configure.program", &settings.configure.program),
            ("compile.program", &settings.compile.program),
            ("workspace.root", &settings.workspace.root),
        ];
        for (key, value) in programs {
            if value.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!("{} must not be empty", key)));
            }
        }

        for option in &settings.configure.options {
            delegate_worker::configure::validate_option(option)
                .map_err(|e| ConfigError::ValidationError(format!("configure.options: {}", e)))?;
        }

        if settings.compile.max_artifact_bytes == 0 {
            return Err(ConfigError::ValidationError(
                "compile.max_artifact_bytes must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.settings.timeouts.connect_seconds)
    }

    pub fn log_level(&self) -> &str {
        &self.settings.log.level
    }

    /// Settings handed to the worker session.
    pub fn worker_config(&self) -> WorkerConfig {
        let s = &self.settings;
        WorkerConfig {
            protocol_version: s.protocol_version,
            workspace_root: PathBuf::from(&s.workspace.root),
            lock_timeout: Duration::from_secs(s.workspace.lock_timeout_seconds),
            bootstrap: BootstrapSettings {
                git: s.bootstrap.git.clone(),
                report_head: s.bootstrap.report_head,
                clone_timeout: Duration::from_secs(s.timeouts.clone_seconds),
                checkout_timeout: Duration::from_secs(s.timeouts.checkout_seconds),
            },
            configure: ConfigureSettings {
                enabled: s.configure.enabled,
                program: s.configure.program.clone(),
                args: s.configure.args.clone(),
                options: s.configure.options.clone(),
                timeout: Duration::from_secs(s.timeouts.configure_seconds),
            },
            compile: CompileSettings {
                program: s.compile.program.clone(),
                args: s.compile.args.clone(),
                max_artifact_bytes: s.compile.max_artifact_bytes,
                timeout: Duration::from_secs(s.timeouts.compile_seconds),
            },
            terminate_grace: Duration::from_secs(s.timeouts.terminate_grace_seconds),
        }
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

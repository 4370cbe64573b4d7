//! Node configuration
//!
//! Three layers, later layers winning:
//! 1. Built-in defaults
//! 2. Config file (`--config`, `$DELEGATE_NODE_CONFIG`, or `./delegate-node.toml`)
//! 3. CLI flags

mod defaults;
mod effective;
mod merge;

pub use defaults::{
    BootstrapSection, CompileSection, ConfigureSection, LogSection, NodeSettings, TimeoutSection,
    WorkspaceSection,
};
pub use effective::{
    CliOverrides, ConfigError, ConfigOrigin, ConfigResult, ConfigSource, NodeConfig, DEFAULT_CONFIG_FILE,
};
pub use merge::{deep_merge, merge_layers};

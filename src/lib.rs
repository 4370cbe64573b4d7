//! Delegate Node - build-farm worker node
//!
//! Connects to a coordinator, registers, bootstraps the requested
//! repository revision, configures its build system and answers compile
//! requests. The session logic lives in `delegate-worker`; this crate adds
//! the configuration layers, logging setup and exit-code taxonomy used by
//! the `delegate-node` binary.

pub mod config;
pub mod exit;
pub mod telemetry;

pub use config::{CliOverrides, ConfigError, NodeConfig, NodeSettings};
pub use exit::{session_exit_code, ExitCode, FailureKind};

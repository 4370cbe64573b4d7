//! Spawning seam.
//!
//! Every subprocess the worker runs goes through a [`Launcher`], so tests
//! can observe and script invocations without touching git or cmake.

use crate::process::{CommandSpec, ProcessHandle};

/// Starts child processes.
pub trait Launcher: Send + Sync {
    /// Start `spec`. Failure is reported as an invalid handle.
    fn launch(&self, spec: &CommandSpec) -> ProcessHandle;
}

/// Launcher that starts real OS processes, resolving programs via `PATH`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLauncher;

impl Launcher for SystemLauncher {
    fn launch(&self, spec: &CommandSpec) -> ProcessHandle {
        ProcessHandle::spawn(spec)
    }
}

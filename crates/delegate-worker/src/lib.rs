//! Delegate Worker Library
//!
//! Implements the worker side of a build-farm session:
//! - Registration with the coordinator
//! - Repository bootstrap into per-revision workspaces
//! - Build-system generation
//! - Compile execution and artifact collection
//!
//! Every subprocess goes through a [`Launcher`], and the coordinator
//! connection through a [`Transport`], so the session can be driven
//! end-to-end in tests with the scripted stand-ins in [`mock`].

pub mod bootstrap;
pub mod compile;
pub mod config;
pub mod configure;
pub mod launcher;
pub mod lock;
pub mod mock;
pub mod process;
pub mod session;
pub mod transport;
pub mod workspace;

pub use bootstrap::{BootstrapOutcome, RepositoryBootstrapper};
pub use compile::CompileExecutor;
pub use config::{BootstrapSettings, CompileSettings, ConfigureSettings, WorkerConfig};
pub use configure::{BuildConfigurer, ConfigureError};
pub use launcher::{Launcher, SystemLauncher};
pub use lock::{LockError, WorkspaceLock};
pub use process::{CommandSpec, ProcessError, ProcessHandle, ProcessOutput, WaitOutcome};
pub use session::{SessionError, SessionOutcome, SessionState, WorkerSession};
pub use transport::{Endpoint, Transport, TransportError, TransportResult, WebSocketTransport};
pub use workspace::{RepositoryWorkspace, WorkspaceError, WorkspaceResult};

//! Worker session state machine.
//!
//! One session is one coordinator connection:
//!
//! ```text
//! Connected → Registering → AwaitingBootstrap → Bootstrapping
//!           → AwaitingCompile ⇄ Compiling → Done
//! ```
//!
//! Any non-success response moves the session to `Failed` and closes the
//! connection. Every step is synchronous: a response is fully sent before
//! the next message is read.

use std::fmt;
use std::sync::Arc;

use delegate_protocol::{
    BootstrapCode, BootstrapRequest, BootstrapResponse, Message, RegistrationRequest,
};
use thiserror::Error;
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

use crate::bootstrap::RepositoryBootstrapper;
use crate::compile::CompileExecutor;
use crate::config::WorkerConfig;
use crate::configure::BuildConfigurer;
use crate::launcher::Launcher;
use crate::transport::{Transport, TransportError};
use crate::workspace::RepositoryWorkspace;

/// Session states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    Registering,
    AwaitingBootstrap,
    Bootstrapping,
    AwaitingCompile,
    Compiling,
    Done,
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connected => "connected",
            Self::Registering => "registering",
            Self::AwaitingBootstrap => "awaiting-bootstrap",
            Self::Bootstrapping => "bootstrapping",
            Self::AwaitingCompile => "awaiting-compile",
            Self::Compiling => "compiling",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// How a session ended when the protocol itself was followed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// All compile requests were answered.
    Completed { compiled: usize, failed: usize },
    /// The coordinator refused the registration.
    RegistrationRejected { code: i32 },
    /// The bootstrap step reported a non-OK code.
    BootstrapFailed { code: BootstrapCode },
}

impl SessionOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// Session result type
pub type SessionResult<T> = Result<T, SessionError>;

/// Faults that abort a session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("coordinator closed the connection while {state}")]
    Disconnected { state: SessionState },

    #[error("unexpected {kind} message while {state}")]
    UnexpectedMessage {
        state: SessionState,
        kind: &'static str,
    },
}

impl SessionError {
    /// Whether the coordinator broke the message sequence, as opposed to
    /// the connection failing.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, Self::UnexpectedMessage { .. })
    }
}

/// A single coordinator session.
pub struct WorkerSession<T: Transport> {
    id: Uuid,
    transport: T,
    state: SessionState,
    protocol_version: i32,
    bootstrapper: RepositoryBootstrapper,
    configurer: BuildConfigurer,
    executor: CompileExecutor,
}

impl<T: Transport> WorkerSession<T> {
    pub fn new(transport: T, launcher: Arc<dyn Launcher>, config: &WorkerConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            transport,
            state: SessionState::Connected,
            protocol_version: config.protocol_version,
            bootstrapper: RepositoryBootstrapper::new(launcher.clone(), config),
            configurer: BuildConfigurer::new(launcher.clone(), config),
            executor: CompileExecutor::new(launcher, config),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Drive the session to completion. The transport is closed on return.
    pub fn run(&mut self) -> SessionResult<SessionOutcome> {
        let span = info_span!("session", id = %self.id);
        let _enter = span.enter();

        let result = self.drive();
        let end = match &result {
            Ok(outcome) if outcome.is_completed() => SessionState::Done,
            _ => SessionState::Failed,
        };
        self.transition(end);

        if let Err(e) = self.transport.close() {
            warn!(error = %e, "failed to close transport");
        }
        match &result {
            Ok(outcome) => info!(?outcome, "session finished"),
            Err(e) => warn!(error = %e, "session aborted"),
        }
        result
    }

    fn drive(&mut self) -> SessionResult<SessionOutcome> {
        self.transition(SessionState::Registering);
        let registration = RegistrationRequest {
            version: self.protocol_version,
        };
        self.transport.send(&registration.into())?;

        let response = match self.recv_required()? {
            Message::RegistrationResponse(response) => response,
            other => return Err(self.unexpected(&other)),
        };
        if !response.is_success() {
            warn!(
                code = response.code,
                message = response.message.as_deref().unwrap_or(""),
                "registration rejected"
            );
            return Ok(SessionOutcome::RegistrationRejected {
                code: response.code,
            });
        }
        info!("registered with coordinator");

        self.transition(SessionState::AwaitingBootstrap);
        let request = match self.recv_required()? {
            Message::BootstrapRequest(request) => request,
            other => return Err(self.unexpected(&other)),
        };

        self.transition(SessionState::Bootstrapping);
        let prepared = self.prepare(&request);
        let code = match &prepared {
            Ok(_) => BootstrapCode::Ok,
            Err(code) => *code,
        };
        self.transport.send(&BootstrapResponse::new(code).into())?;
        let workspace = match prepared {
            Ok(workspace) => workspace,
            Err(code) => {
                warn!(%code, url = %request.url, "bootstrap failed");
                return Ok(SessionOutcome::BootstrapFailed { code });
            }
        };

        self.transition(SessionState::AwaitingCompile);
        self.compile_loop(&workspace)
    }

    /// Bootstrap, then configure when enabled.
    fn prepare(&self, request: &BootstrapRequest) -> Result<RepositoryWorkspace, BootstrapCode> {
        let outcome = self.bootstrapper.prepare(&request.url, &request.rev);
        if !outcome.code.is_ok() {
            return Err(outcome.code);
        }
        let workspace = outcome.workspace.ok_or(BootstrapCode::BadUrl)?;

        if self.configurer.enabled() {
            if let Err(e) = self.configurer.configure(workspace.path(), &request.options) {
                warn!(error = %e, "build configuration failed");
                return Err(e.code());
            }
        }
        Ok(workspace)
    }

    fn compile_loop(&mut self, workspace: &RepositoryWorkspace) -> SessionResult<SessionOutcome> {
        let build_dir = workspace.build_dir();
        let mut compiled = 0;
        let mut failed = 0;

        loop {
            let request = match self.transport.recv()? {
                None => {
                    info!("coordinator closed the connection");
                    break;
                }
                Some(Message::CompileRequest(request)) => request,
                Some(other) => return Err(self.unexpected(&other)),
            };
            if request.is_end_of_project() {
                info!("end of project");
                break;
            }

            self.transition(SessionState::Compiling);
            for file in &request.files {
                let response = self.executor.compile_file(&build_dir, file);
                if response.is_success() {
                    compiled += 1;
                } else {
                    failed += 1;
                }
                self.transport.send(&response.into())?;
            }
            self.transition(SessionState::AwaitingCompile);
        }

        Ok(SessionOutcome::Completed { compiled, failed })
    }

    fn recv_required(&mut self) -> SessionResult<Message> {
        self.transport
            .recv()?
            .ok_or(SessionError::Disconnected { state: self.state })
    }

    fn unexpected(&self, message: &Message) -> SessionError {
        SessionError::UnexpectedMessage {
            state: self.state,
            kind: message.kind(),
        }
    }

    fn transition(&mut self, next: SessionState) {
        debug!(from = %self.state, to = %next, "session transition");
        self.state = next;
    }
}

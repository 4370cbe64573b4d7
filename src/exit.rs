//! Failure taxonomy and stable process exit codes

use delegate_worker::{SessionError, SessionOutcome};

/// Failure kind - categorizes why the node stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Command-line arguments were missing or malformed
    Usage,
    /// Configuration could not be loaded or validated
    Config,
    /// Connect, handshake, read or write failure
    Transport,
    /// Coordinator refused the registration
    RegistrationRejected,
    /// Bootstrap step reported a non-OK code
    BootstrapFailed,
    /// Coordinator sent a message out of sequence
    ProtocolViolation,
}

impl FailureKind {
    /// Get the stable exit code for this failure kind
    pub fn exit_code(&self) -> ExitCode {
        match self {
            FailureKind::Usage => ExitCode::Usage,
            FailureKind::Config => ExitCode::Config,
            FailureKind::Transport => ExitCode::Transport,
            FailureKind::RegistrationRejected => ExitCode::RegistrationRejected,
            FailureKind::BootstrapFailed => ExitCode::BootstrapFailed,
            FailureKind::ProtocolViolation => ExitCode::ProtocolViolation,
        }
    }

    /// Human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            FailureKind::Usage => "Usage error",
            FailureKind::Config => "Configuration error",
            FailureKind::Transport => "Transport fault",
            FailureKind::RegistrationRejected => "Registration rejected",
            FailureKind::BootstrapFailed => "Bootstrap failed",
            FailureKind::ProtocolViolation => "Protocol violation",
        }
    }

    /// Classify a session fault.
    pub fn from_session_error(error: &SessionError) -> Self {
        if error.is_protocol_violation() {
            FailureKind::ProtocolViolation
        } else {
            FailureKind::Transport
        }
    }

    /// Classify a session that ran to a protocol-level end. `None` means success.
    pub fn from_outcome(outcome: &SessionOutcome) -> Option<Self> {
        match outcome {
            SessionOutcome::Completed { .. } => None,
            SessionOutcome::RegistrationRejected { .. } => Some(FailureKind::RegistrationRejected),
            SessionOutcome::BootstrapFailed { .. } => Some(FailureKind::BootstrapFailed),
        }
    }
}

/// Stable exit codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Session completed
    Success = 0,
    /// Usage error (same status clap uses)
    Usage = 2,
    /// Configuration error
    Config = 3,
    /// Transport fault
    Transport = 20,
    /// Registration rejected
    RegistrationRejected = 30,
    /// Bootstrap failed
    BootstrapFailed = 40,
    /// Protocol violation
    ProtocolViolation = 50,
}

impl ExitCode {
    /// Get the integer value of the exit code
    pub fn as_i32(&self) -> i32 {
        *self as i32
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExitCode::Success)
    }
}

/// Exit code for a finished session run.
pub fn session_exit_code(result: &Result<SessionOutcome, SessionError>) -> ExitCode {
    let kind = match result {
        Ok(outcome) => FailureKind::from_outcome(outcome),
        Err(error) => Some(FailureKind::from_session_error(error)),
    };
    kind.map_or(ExitCode::Success, |k| k.exit_code())
}

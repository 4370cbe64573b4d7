//! In-process stand-ins for the launcher and the coordinator.
//!
//! [`ScriptedLauncher`] records every [`CommandSpec`] it is asked to run and
//! substitutes a tiny `/bin/sh` script with scripted behavior, so tests can
//! count spawns and control exit codes without git, cmake or make.
//!
//! [`ScriptedCoordinator`] implements [`Transport`] over an in-memory queue
//! and keeps an ordered event log of everything sent and received.

use std::collections::VecDeque;
use std::io;
use std::sync::Mutex;

use delegate_protocol::Message;

use crate::launcher::Launcher;
use crate::process::{CommandSpec, ProcessHandle};
use crate::transport::{Transport, TransportError, TransportResult};

/// Behavior of one scripted program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Script {
    /// Exit with the given status.
    Exit(i32),
    /// Create the directory named by the last argument and exit 0, the
    /// observable effect of a successful clone.
    CreateTarget,
    /// Print to stdout and stderr, then exit.
    Output {
        stdout: String,
        stderr: String,
        code: i32,
    },
    /// Write `contents` to the file named by the last argument (relative to
    /// the working directory), print `stdout`, exit 0.
    Produce { contents: String, stdout: String },
    /// Never exit on its own.
    Hang,
    /// Never exit on its own, with the hang in a child process that shares
    /// the output pipes, like git waiting on `git-remote-https`.
    HangInChild,
    /// Fail to start, as if the executable were missing.
    SpawnFailure,
}

impl Script {
    pub fn output(stdout: &str, stderr: &str, code: i32) -> Self {
        Self::Output {
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            code,
        }
    }

    pub fn produce(contents: &str, stdout: &str) -> Self {
        Self::Produce {
            contents: contents.to_string(),
            stdout: stdout.to_string(),
        }
    }

    /// The `/bin/sh` invocation standing in for `spec`.
    fn stand_in(&self, spec: &CommandSpec) -> CommandSpec {
        let last = spec.args.last().cloned().unwrap_or_default();
        let (script, params): (String, Vec<String>) = match self {
            Self::Exit(code) => (format!("exit {}", code), vec![]),
            Self::CreateTarget => ("mkdir -p -- \"$1\"".to_string(), vec![last]),
            Self::Output {
                stdout,
                stderr,
                code,
            } => (
                format!("printf '%s' \"$1\"; printf '%s' \"$2\" >&2; exit {}", code),
                vec![stdout.clone(), stderr.clone()],
            ),
            Self::Produce { contents, stdout } => (
                "printf '%s' \"$2\" > \"$1\" && printf '%s' \"$3\"".to_string(),
                vec![last, contents.clone(), stdout.clone()],
            ),
            Self::Hang => ("exec sleep 60".to_string(), vec![]),
            Self::HangInChild => ("sleep 60; true".to_string(), vec![]),
            Self::SpawnFailure => (String::new(), vec![]),
        };

        let mut stand_in = CommandSpec::new("/bin/sh")
            .arg("-c")
            .arg(script)
            .arg(spec.program.clone())
            .args(params);
        stand_in.cwd = spec.cwd.clone();
        stand_in.env = spec.env.clone();
        stand_in
    }
}

#[derive(Debug)]
struct Rule {
    program: String,
    subcommand: Option<String>,
    script: Script,
}

impl Rule {
    fn matches(&self, spec: &CommandSpec) -> bool {
        self.program == spec.program
            && match &self.subcommand {
                Some(sub) => spec.subcommand() == Some(sub.as_str()),
                None => true,
            }
    }
}

/// Launcher that records invocations and runs scripted stand-ins.
///
/// Rules added later take precedence. A spec with no matching rule exits 0.
#[derive(Debug, Default)]
pub struct ScriptedLauncher {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl ScriptedLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`set`](Self::set).
    pub fn on(self, program: &str, subcommand: Option<&str>, script: Script) -> Self {
        self.set(program, subcommand, script);
        self
    }

    /// Script `program` (optionally only for one subcommand).
    pub fn set(&self, program: &str, subcommand: Option<&str>, script: Script) {
        let mut rules = self.rules.lock().unwrap_or_else(|e| e.into_inner());
        rules.push(Rule {
            program: program.to_string(),
            subcommand: subcommand.map(str::to_string),
            script,
        });
    }

    /// Every spec launched so far, in order.
    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn spawn_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Number of launches of `program` with the given subcommand.
    pub fn count(&self, program: &str, subcommand: Option<&str>) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|spec| {
                spec.program == program && subcommand.map_or(true, |s| spec.subcommand() == Some(s))
            })
            .count()
    }

    pub fn reset_calls(&self) {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    fn script_for(&self, spec: &CommandSpec) -> Script {
        let rules = self.rules.lock().unwrap_or_else(|e| e.into_inner());
        rules
            .iter()
            .rev()
            .find(|rule| rule.matches(spec))
            .map(|rule| rule.script.clone())
            .unwrap_or(Script::Exit(0))
    }
}

impl Launcher for ScriptedLauncher {
    fn launch(&self, spec: &CommandSpec) -> ProcessHandle {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(spec.clone());

        match self.script_for(spec) {
            Script::SpawnFailure => ProcessHandle::invalid(&spec.program),
            script => ProcessHandle::spawn(&script.stand_in(spec)),
        }
    }
}

/// One entry in a [`ScriptedCoordinator`]'s event log.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The worker sent this message.
    Send(Message),
    /// The worker received this message.
    Recv(Message),
    /// The worker asked for a message and found the queue empty.
    PeerClosed,
    /// The worker closed the transport.
    Closed,
}

/// In-memory coordinator.
#[derive(Debug, Default)]
pub struct ScriptedCoordinator {
    inbound: VecDeque<Message>,
    events: Vec<TransportEvent>,
    closed: bool,
    fail_when_drained: bool,
}

impl ScriptedCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Coordinator that will deliver `messages` in order.
    pub fn with_inbound<I, M>(messages: I) -> Self
    where
        I: IntoIterator<Item = M>,
        M: Into<Message>,
    {
        Self {
            inbound: messages.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn push(&mut self, message: impl Into<Message>) {
        self.inbound.push_back(message.into());
    }

    /// Once the inbound queue is empty, fail reads with a connection reset
    /// instead of reporting a clean close.
    pub fn fail_when_drained(mut self) -> Self {
        self.fail_when_drained = true;
        self
    }

    pub fn events(&self) -> &[TransportEvent] {
        &self.events
    }

    /// Messages the worker sent, in order.
    pub fn sent(&self) -> Vec<&Message> {
        self.events
            .iter()
            .filter_map(|event| match event {
                TransportEvent::Send(message) => Some(message),
                _ => None,
            })
            .collect()
    }

    /// Inbound messages not yet read by the worker.
    pub fn pending(&self) -> usize {
        self.inbound.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Transport for ScriptedCoordinator {
    fn send(&mut self, message: &Message) -> TransportResult<()> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.events.push(TransportEvent::Send(message.clone()));
        Ok(())
    }

    fn recv(&mut self) -> TransportResult<Option<Message>> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        match self.inbound.pop_front() {
            Some(message) => {
                self.events.push(TransportEvent::Recv(message.clone()));
                Ok(Some(message))
            }
            None if self.fail_when_drained => Err(TransportError::Io(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "coordinator went away",
            ))),
            None => {
                self.events.push(TransportEvent::PeerClosed);
                Ok(None)
            }
        }
    }

    fn close(&mut self) -> TransportResult<()> {
        if !self.closed {
            self.closed = true;
            self.events.push(TransportEvent::Closed);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use delegate_protocol::{RegistrationRequest, RegistrationResponse};

    #[test]
    fn test_unscripted_program_exits_zero() {
        let launcher = ScriptedLauncher::new();
        let mut handle = launcher.launch(&CommandSpec::new("git").arg("status"));
        assert!(handle.is_valid());
        assert!(handle.wait_for_exit().unwrap().success());
        assert_eq!(launcher.count("git", Some("status")), 1);
        assert_eq!(launcher.count("git", Some("clone")), 0);
    }

    #[test]
    fn test_later_rules_take_precedence() {
        let launcher = ScriptedLauncher::new()
            .on("git", None, Script::Exit(0))
            .on("git", Some("checkout"), Script::Exit(1));

        let mut checkout = launcher.launch(&CommandSpec::new("git").args(["checkout", "x"]));
        assert_eq!(checkout.wait_for_exit().unwrap().code(), Some(1));
        let mut clone = launcher.launch(&CommandSpec::new("git").args(["clone", "u", "p"]));
        assert_eq!(clone.wait_for_exit().unwrap().code(), Some(0));
    }

    #[test]
    fn test_spawn_failure_is_recorded_but_invalid() {
        let launcher = ScriptedLauncher::new().on("cmake", None, Script::SpawnFailure);
        let handle = launcher.launch(&CommandSpec::new("cmake"));
        assert!(!handle.is_valid());
        assert_eq!(launcher.spawn_count(), 1);
    }

    #[test]
    fn test_coordinator_logs_events_in_order() {
        let mut coordinator =
            ScriptedCoordinator::with_inbound([RegistrationResponse::accepted()]);
        coordinator
            .send(&Message::from(RegistrationRequest::default()))
            .unwrap();
        assert!(coordinator.recv().unwrap().is_some());
        assert!(coordinator.recv().unwrap().is_none());
        coordinator.close().unwrap();
        coordinator.close().unwrap();

        assert!(matches!(coordinator.events()[0], TransportEvent::Send(_)));
        assert!(matches!(coordinator.events()[1], TransportEvent::Recv(_)));
        assert_eq!(coordinator.events()[2], TransportEvent::PeerClosed);
        assert_eq!(coordinator.events()[3], TransportEvent::Closed);
        assert_eq!(coordinator.events().len(), 4);
        assert!(matches!(
            coordinator.send(&Message::from(RegistrationRequest::default())),
            Err(TransportError::Closed)
        ));
    }

    #[test]
    fn test_fail_when_drained() {
        let mut coordinator = ScriptedCoordinator::new().fail_when_drained();
        assert!(matches!(coordinator.recv(), Err(TransportError::Io(_))));
    }
}

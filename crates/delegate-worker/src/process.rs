//! Owned child-process handle.
//!
//! A [`ProcessHandle`] owns exactly one spawned child and the three pipes
//! connected to its standard streams. Handles that failed to spawn are
//! *invalid*: they own nothing, and every I/O call on them returns
//! [`ProcessError::InvalidHandle`] instead of touching a stream.
//!
//! Resources are released exactly once. [`ProcessHandle::close`] drops the
//! pipes and reaps the child; calling it again, or dropping the handle
//! afterwards, is a no-op.
//!
//! On unix every child leads its own process group. Termination signals go
//! to the whole group, so helpers the child started (`git-remote-https`,
//! the compiler under `make`) die with it and release the output pipes.

use std::fmt;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, warn};

/// How often a deadline-bounded wait polls the child.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Minimum time output pipes get to reach end-of-stream once the child is gone.
const SETTLE_FLOOR: Duration = Duration::from_secs(1);

/// Errors from process operations.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("process handle for '{program}' is invalid")]
    InvalidHandle { program: String },

    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{stream} of '{program}' is not available")]
    StreamClosed {
        program: String,
        stream: &'static str,
    },

    #[error("short read: expected {expected} bytes, got {actual}")]
    ShortRead { expected: usize, actual: usize },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for process operations.
pub type ProcessResult<T> = Result<T, ProcessError>;

/// One program invocation: executable, explicit argument vector and
/// optional working directory. Never interpreted by a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// First argument, which is the subcommand for tools like git.
    pub fn subcommand(&self) -> Option<&str> {
        self.args.first().map(String::as_str)
    }

    fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(ref cwd) = self.cwd {
            command.current_dir(cwd);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }
        command
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// How a bounded wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Exited(ExitStatus),
    /// The deadline passed; the child was terminated and reaped.
    TimedOut,
}

impl WaitOutcome {
    pub fn success(&self) -> bool {
        matches!(self, Self::Exited(status) if status.success())
    }

    pub fn code(&self) -> Option<i32> {
        match self {
            Self::Exited(status) => status.code(),
            Self::TimedOut => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut)
    }
}

impl fmt::Display for WaitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exited(status) => match status.code() {
                Some(code) => write!(f, "exit status {}", code),
                None => write!(f, "terminated by signal"),
            },
            Self::TimedOut => write!(f, "timed out"),
        }
    }
}

/// Everything a finished child produced.
#[derive(Debug)]
pub struct ProcessOutput {
    pub outcome: WaitOutcome,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.outcome.success()
    }

    /// Last `max_lines` lines of stderr, lossily decoded.
    pub fn stderr_tail(&self, max_lines: usize) -> String {
        let text = String::from_utf8_lossy(&self.stderr);
        let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
        let start = lines.len().saturating_sub(max_lines);
        lines[start..].join("\n")
    }
}

/// Owned handle to a spawned child process.
pub struct ProcessHandle {
    program: String,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
    status: Option<ExitStatus>,
}

impl ProcessHandle {
    /// Spawn `spec`, returning an invalid handle if the child could not be
    /// started. Callers must check [`is_valid`](Self::is_valid).
    pub fn spawn(spec: &CommandSpec) -> Self {
        match Self::try_spawn(spec) {
            Ok(handle) => handle,
            Err(e) => {
                warn!(command = %spec, error = %e, "spawn failed");
                Self::invalid(&spec.program)
            }
        }
    }

    /// Spawn `spec`, surfacing the reason on failure.
    pub fn try_spawn(spec: &CommandSpec) -> ProcessResult<Self> {
        debug!(
            command = %spec,
            cwd = %spec.cwd.as_deref().unwrap_or_else(|| Path::new(".")).display(),
            "spawning process"
        );

        let mut child = spec.to_command().spawn().map_err(|source| ProcessError::Spawn {
            program: spec.program.clone(),
            source,
        })?;

        Ok(Self {
            program: spec.program.clone(),
            stdin: child.stdin.take(),
            stdout: child.stdout.take(),
            stderr: child.stderr.take(),
            child: Some(child),
            status: None,
        })
    }

    /// A handle that owns nothing.
    pub fn invalid(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            child: None,
            stdin: None,
            stdout: None,
            stderr: None,
            status: None,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.child.is_some()
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// OS process id, or `None` for an invalid handle.
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    /// Move ownership out of `self`, leaving `self` invalid.
    pub fn take(&mut self) -> Self {
        let empty = Self::invalid(self.program.clone());
        std::mem::replace(self, empty)
    }

    /// Write to the child's standard input.
    pub fn write(&mut self, buf: &[u8]) -> ProcessResult<usize> {
        self.ensure_valid()?;
        let program = &self.program;
        let stdin = self.stdin.as_mut().ok_or_else(|| ProcessError::StreamClosed {
            program: program.clone(),
            stream: "stdin",
        })?;
        Ok(stdin.write(buf)?)
    }

    pub fn write_all(&mut self, buf: &[u8]) -> ProcessResult<()> {
        let mut written = 0;
        while written < buf.len() {
            match self.write(&buf[written..]) {
                Ok(0) => {
                    return Err(ProcessError::Io(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "child stopped accepting input",
                    )))
                }
                Ok(n) => written += n,
                Err(ProcessError::Io(e)) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Close the child's standard input so it observes end-of-file.
    pub fn close_input(&mut self) {
        self.stdin = None;
    }

    /// Single read from standard output. May return fewer bytes than
    /// `buf.len()`; 0 means end-of-stream.
    pub fn read(&mut self, buf: &mut [u8]) -> ProcessResult<usize> {
        self.ensure_valid()?;
        let program = &self.program;
        let stdout = self.stdout.as_mut().ok_or_else(|| ProcessError::StreamClosed {
            program: program.clone(),
            stream: "stdout",
        })?;
        Ok(stdout.read(buf)?)
    }

    /// Single read from standard error.
    pub fn read_error(&mut self, buf: &mut [u8]) -> ProcessResult<usize> {
        self.ensure_valid()?;
        let program = &self.program;
        let stderr = self.stderr.as_mut().ok_or_else(|| ProcessError::StreamClosed {
            program: program.clone(),
            stream: "stderr",
        })?;
        Ok(stderr.read(buf)?)
    }

    /// Read standard output until `len` bytes arrived or the stream closed.
    pub fn read_exact_or_eof(&mut self, len: usize) -> ProcessResult<Vec<u8>> {
        self.ensure_valid()?;
        let program = &self.program;
        let stdout = self.stdout.as_mut().ok_or_else(|| ProcessError::StreamClosed {
            program: program.clone(),
            stream: "stdout",
        })?;
        Ok(fill_from(stdout, len)?)
    }

    /// Like [`read_exact_or_eof`](Self::read_exact_or_eof), but a stream that
    /// closes before `len` bytes is an error.
    pub fn read_prefix(&mut self, len: usize) -> ProcessResult<Vec<u8>> {
        let bytes = self.read_exact_or_eof(len)?;
        if bytes.len() < len {
            return Err(ProcessError::ShortRead {
                expected: len,
                actual: bytes.len(),
            });
        }
        Ok(bytes)
    }

    /// Block until the child exits. Standard input is closed first.
    pub fn wait_for_exit(&mut self) -> ProcessResult<ExitStatus> {
        if let Some(status) = self.status {
            return Ok(status);
        }
        self.close_input();
        let child = self.child_mut()?;
        let status = child.wait()?;
        self.status = Some(status);
        Ok(status)
    }

    /// Wait at most `timeout` for the child to exit. On expiry the child
    /// gets SIGTERM, then SIGKILL after `grace`, and is reaped.
    pub fn wait_with_deadline(
        &mut self,
        timeout: Duration,
        grace: Duration,
    ) -> ProcessResult<WaitOutcome> {
        if let Some(status) = self.status {
            return Ok(WaitOutcome::Exited(status));
        }
        self.close_input();

        let start = Instant::now();
        let program = &self.program;
        let child = self.child.as_mut().ok_or_else(|| ProcessError::InvalidHandle {
            program: program.clone(),
        })?;
        loop {
            if let Some(status) = child.try_wait()? {
                self.status = Some(status);
                return Ok(WaitOutcome::Exited(status));
            }
            if start.elapsed() >= timeout {
                break;
            }
            thread::sleep(POLL_INTERVAL.min(timeout.saturating_sub(start.elapsed())));
        }

        warn!(program = %self.program, timeout_secs = timeout.as_secs(), "deadline exceeded, terminating");
        let child = self.child_mut()?;
        let status = terminate_child(child, grace)?;
        self.status = Some(status);
        Ok(WaitOutcome::TimedOut)
    }

    /// Drain stdout and stderr while waiting for exit under a deadline.
    ///
    /// Both streams are read on helper threads so a child that fills one
    /// pipe never blocks on it. Descendants that outlive the child and keep
    /// a pipe open are killed once the settle period passes; whatever was
    /// read by then is returned.
    pub fn collect(&mut self, timeout: Duration, grace: Duration) -> ProcessResult<ProcessOutput> {
        self.ensure_valid()?;
        let mut stdout = Drain::start(self.stdout.take());
        let mut stderr = Drain::start(self.stderr.take());

        let outcome = self.wait_with_deadline(timeout, grace)?;

        let settle = grace.max(SETTLE_FLOOR);
        if !Drain::settle_all(&mut stdout, &mut stderr, Instant::now() + settle)? {
            warn!(program = %self.program, "descendants still hold output pipes, killing process group");
            if let Some(child) = self.child.as_mut() {
                signal_group(child, true);
            }
            if !Drain::settle_all(&mut stdout, &mut stderr, Instant::now() + settle)? {
                warn!(program = %self.program, "output pipes still open, returning partial output");
            }
        }

        Ok(ProcessOutput {
            outcome,
            stdout: stdout.take(),
            stderr: stderr.take(),
        })
    }

    /// Release the pipes and reap the child. Idempotent.
    pub fn close(&mut self) {
        self.stdin = None;
        self.stdout = None;
        self.stderr = None;

        let Some(mut child) = self.child.take() else {
            return;
        };
        if self.status.is_some() {
            return;
        }
        match child.try_wait() {
            Ok(Some(status)) => self.status = Some(status),
            Ok(None) => {
                debug!(program = %self.program, pid = child.id(), "killing child still running at close");
                signal_group(&mut child, true);
                let _ = child.kill();
                match child.wait() {
                    Ok(status) => self.status = Some(status),
                    Err(e) => warn!(program = %self.program, error = %e, "failed to reap child"),
                }
            }
            Err(e) => warn!(program = %self.program, error = %e, "failed to poll child"),
        }
    }

    fn ensure_valid(&self) -> ProcessResult<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(ProcessError::InvalidHandle {
                program: self.program.clone(),
            })
        }
    }

    fn child_mut(&mut self) -> ProcessResult<&mut Child> {
        let program = &self.program;
        self.child.as_mut().ok_or_else(|| ProcessError::InvalidHandle {
            program: program.clone(),
        })
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("program", &self.program)
            .field("pid", &self.pid())
            .field("status", &self.status)
            .finish()
    }
}

/// Spawn `spec` through `launcher`, then collect its output under a deadline.
pub fn run_to_completion(
    launcher: &dyn crate::launcher::Launcher,
    spec: &CommandSpec,
    timeout: Duration,
    grace: Duration,
) -> ProcessResult<ProcessOutput> {
    let mut handle = launcher.launch(spec);
    if !handle.is_valid() {
        return Err(ProcessError::InvalidHandle {
            program: spec.program.clone(),
        });
    }
    let output = handle.collect(timeout, grace);
    handle.close();
    output
}

/// Read from `reader` until `len` bytes or end-of-stream.
pub(crate) fn fill_from<R: Read>(reader: &mut R, len: usize) -> io::Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    let mut filled = 0;
    while filled < len {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    buf.truncate(filled);
    Ok(buf)
}

/// Background reader for one output pipe. Bytes land in a shared buffer
/// so a reader that never sees end-of-stream can be abandoned without
/// losing what it already read.
struct Drain {
    buffer: Arc<Mutex<Vec<u8>>>,
    done: Option<mpsc::Receiver<io::Result<()>>>,
}

impl Drain {
    fn start<R: Read + Send + 'static>(reader: Option<R>) -> Self {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let Some(mut reader) = reader else {
            return Self { buffer, done: None };
        };

        let (tx, rx) = mpsc::channel();
        let sink = Arc::clone(&buffer);
        thread::spawn(move || {
            let mut chunk = [0u8; 8192];
            let result = loop {
                match reader.read(&mut chunk) {
                    Ok(0) => break Ok(()),
                    Ok(n) => match sink.lock() {
                        Ok(mut bytes) => bytes.extend_from_slice(&chunk[..n]),
                        Err(_) => break Ok(()),
                    },
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => break Err(e),
                }
            };
            let _ = tx.send(result);
        });
        Self {
            buffer,
            done: Some(rx),
        }
    }

    /// Wait for end-of-stream until `deadline`. `Ok(false)` if still open.
    fn settle(&mut self, deadline: Instant) -> io::Result<bool> {
        let Some(done) = self.done.as_ref() else {
            return Ok(true);
        };
        match done.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
            Ok(result) => {
                self.done = None;
                result.map(|()| true)
            }
            Err(RecvTimeoutError::Timeout) => Ok(false),
            Err(RecvTimeoutError::Disconnected) => {
                self.done = None;
                Err(io::Error::new(io::ErrorKind::Other, "output reader thread panicked"))
            }
        }
    }

    fn settle_all(stdout: &mut Drain, stderr: &mut Drain, deadline: Instant) -> io::Result<bool> {
        let out = stdout.settle(deadline)?;
        let err = stderr.settle(deadline)?;
        Ok(out && err)
    }

    fn take(&self) -> Vec<u8> {
        self.buffer
            .lock()
            .map(|mut bytes| std::mem::take(&mut *bytes))
            .unwrap_or_default()
    }
}

/// Signal the child's whole process group: SIGTERM, or SIGKILL when `force`.
#[cfg(unix)]
fn signal_group(child: &mut Child, force: bool) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let signal = if force { Signal::SIGKILL } else { Signal::SIGTERM };
    if let Err(e) = killpg(Pid::from_raw(child.id() as i32), signal) {
        debug!(pgid = child.id(), error = %e, "process group already gone");
    }
}

#[cfg(not(unix))]
fn signal_group(child: &mut Child, _force: bool) {
    let _ = child.kill();
}

/// Terminate a child and its descendants gracefully then forcefully,
/// returning the child's final status.
fn terminate_child(child: &mut Child, grace: Duration) -> io::Result<ExitStatus> {
    signal_group(child, false);

    let start = Instant::now();
    while start.elapsed() < grace {
        if let Some(status) = child.try_wait()? {
            // helpers that ignored SIGTERM must not outlive the child
            signal_group(child, true);
            return Ok(status);
        }
        thread::sleep(POLL_INTERVAL);
    }

    signal_group(child, true);
    let _ = child.kill();
    child.wait()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Reader that hands out at most `chunk` bytes per call.
    struct Trickle {
        inner: Cursor<Vec<u8>>,
        chunk: usize,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = buf.len().min(self.chunk);
            self.inner.read(&mut buf[..n])
        }
    }

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new("/bin/sh").arg("-c").arg(script)
    }

    #[test]
    fn test_fill_from_loops_over_short_reads() {
        let hash = "0123456789abcdef0123456789abcdef01234567\n";
        let mut reader = Trickle {
            inner: Cursor::new(hash.as_bytes().to_vec()),
            chunk: 3,
        };
        let bytes = fill_from(&mut reader, 40).unwrap();
        assert_eq!(bytes, &hash.as_bytes()[..40]);
    }

    #[test]
    fn test_fill_from_stops_at_eof() {
        let mut reader = Cursor::new(b"abc".to_vec());
        let bytes = fill_from(&mut reader, 40).unwrap();
        assert_eq!(bytes, b"abc");
    }

    #[test]
    fn test_command_spec_display() {
        let spec = CommandSpec::new("git").args(["clone", "https://x/foo.git", "foo/abc"]);
        assert_eq!(spec.to_string(), "git clone https://x/foo.git foo/abc");
        assert_eq!(spec.subcommand(), Some("clone"));
    }

    #[test]
    fn test_spawn_failure_yields_invalid_handle() {
        let mut handle = ProcessHandle::spawn(&CommandSpec::new("/nonexistent/definitely-not-here"));
        assert!(!handle.is_valid());
        assert!(handle.pid().is_none());

        let mut buf = [0u8; 8];
        assert!(matches!(handle.read(&mut buf), Err(ProcessError::InvalidHandle { .. })));
        assert!(matches!(handle.read_error(&mut buf), Err(ProcessError::InvalidHandle { .. })));
        assert!(matches!(handle.write(b"x"), Err(ProcessError::InvalidHandle { .. })));
        assert!(matches!(handle.wait_for_exit(), Err(ProcessError::InvalidHandle { .. })));
    }

    #[test]
    fn test_try_spawn_reports_reason() {
        let err = ProcessHandle::try_spawn(&CommandSpec::new("/nonexistent/definitely-not-here"))
            .unwrap_err();
        assert!(matches!(err, ProcessError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_take_leaves_source_invalid() {
        let mut original = ProcessHandle::spawn(&sh("exit 0"));
        assert!(original.is_valid());
        let pid = original.pid();

        let mut moved = original.take();
        assert!(!original.is_valid());
        assert_eq!(moved.pid(), pid);
        assert!(moved.wait_for_exit().unwrap().success());
    }

    #[cfg(unix)]
    #[test]
    fn test_close_twice_is_noop() {
        let mut handle = ProcessHandle::spawn(&sh("exit 0"));
        handle.wait_for_exit().unwrap();
        handle.close();
        handle.close();
        assert!(!handle.is_valid());

        let mut never_spawned = ProcessHandle::invalid("git");
        never_spawned.close();
        never_spawned.close();
    }

    #[cfg(unix)]
    #[test]
    fn test_exit_status_propagates() {
        let mut handle = ProcessHandle::spawn(&sh("exit 3"));
        let status = handle.wait_for_exit().unwrap();
        assert_eq!(status.code(), Some(3));
        // cached on second call
        assert_eq!(handle.wait_for_exit().unwrap().code(), Some(3));
    }

    #[cfg(unix)]
    #[test]
    fn test_stdin_roundtrip_through_cat() {
        let mut handle = ProcessHandle::spawn(&CommandSpec::new("cat"));
        handle.write_all(b"hello").unwrap();
        handle.close_input();
        let bytes = handle.read_exact_or_eof(64).unwrap();
        assert_eq!(bytes, b"hello");
        assert!(handle.wait_for_exit().unwrap().success());
    }

    #[cfg(unix)]
    #[test]
    fn test_read_prefix_short_stream_fails() {
        let mut handle = ProcessHandle::spawn(&sh("printf abc"));
        let err = handle.read_prefix(40).unwrap_err();
        assert!(matches!(err, ProcessError::ShortRead { expected: 40, actual: 3 }));
    }

    #[cfg(unix)]
    #[test]
    fn test_read_error_stream() {
        let mut handle = ProcessHandle::spawn(&sh("printf oops >&2"));
        handle.wait_for_exit().unwrap();
        let mut buf = [0u8; 16];
        let n = handle.read_error(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"oops");
    }

    #[cfg(unix)]
    #[test]
    fn test_collect_captures_both_streams() {
        let mut handle = ProcessHandle::spawn(&sh("echo out; echo err >&2; exit 4"));
        let output = handle
            .collect(Duration::from_secs(10), Duration::from_secs(1))
            .unwrap();
        assert_eq!(output.outcome.code(), Some(4));
        assert_eq!(output.stdout, b"out\n");
        assert_eq!(output.stderr_tail(5), "err");
    }

    #[cfg(unix)]
    #[test]
    fn test_deadline_terminates_hung_child() {
        let mut handle = ProcessHandle::spawn(&sh("sleep 30"));
        let start = Instant::now();
        let outcome = handle
            .wait_with_deadline(Duration::from_millis(200), Duration::from_secs(2))
            .unwrap();
        assert!(outcome.is_timeout());
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[cfg(unix)]
    #[test]
    fn test_deadline_reaches_grandchild_holding_pipes() {
        // `sleep` is a child of the shell and shares its stdout.
        let mut handle = ProcessHandle::spawn(&sh("sleep 8; true"));
        let start = Instant::now();
        let output = handle
            .collect(Duration::from_millis(300), Duration::from_millis(100))
            .unwrap();
        assert!(output.outcome.is_timeout());
        assert!(start.elapsed() < Duration::from_secs(3), "took {:?}", start.elapsed());
    }

    #[cfg(unix)]
    #[test]
    fn test_lingering_background_child_does_not_block_collect() {
        let mut handle = ProcessHandle::spawn(&sh("sleep 8 & echo done"));
        let start = Instant::now();
        let output = handle
            .collect(Duration::from_secs(10), Duration::from_millis(100))
            .unwrap();
        assert!(output.success());
        assert_eq!(output.stdout, b"done\n");
        assert!(start.elapsed() < Duration::from_secs(4), "took {:?}", start.elapsed());
    }

    #[cfg(unix)]
    #[test]
    fn test_working_directory_is_per_invocation() {
        let dir = tempfile::TempDir::new().unwrap();
        let before = std::env::current_dir().unwrap();

        let mut handle = ProcessHandle::spawn(&sh("pwd").current_dir(dir.path()));
        let output = handle
            .collect(Duration::from_secs(10), Duration::from_secs(1))
            .unwrap();
        let printed = String::from_utf8(output.stdout).unwrap();
        let expected = dir.path().canonicalize().unwrap();
        assert_eq!(Path::new(printed.trim()).canonicalize().unwrap(), expected);
        assert_eq!(std::env::current_dir().unwrap(), before);
    }
}

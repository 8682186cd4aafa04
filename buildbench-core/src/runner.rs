//! Build Process Runner
//!
//! Launches a build command as the leader of its own process group and waits
//! for it with a timeout. On timeout the whole group receives SIGTERM, then
//! SIGKILL after a grace window, so nested tool processes are reclaimed too.
//!
//! The wait happens on a dedicated waiter thread that blocks on the child;
//! the caller blocks on a channel with a deadline. This keeps the measured
//! duration independent of any polling cadence.

use crate::BuildCommand;
use chrono::{DateTime, Utc};
use std::os::fd::AsFd;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

/// Characters after which the leading word is no longer a plain program name
const SHELL_SYNTAX: &[char] = &[
    '$', '`', '\'', '"', '\\', '(', ')', '{', '}', '<', '>', '|', ';', '&', '*', '?', '~',
];

/// Errors raised while running a build command
#[derive(Debug, Error)]
pub enum RunError {
    /// The command could not be started
    #[error("Failed to launch {command}: {source}")]
    SpawnFailure {
        /// Command and working directory
        command: String,
        /// Underlying launch error
        #[source]
        source: std::io::Error,
    },

    /// The build ran past its timeout and its process group was killed
    #[error("Build exceeded timeout of {timeout_ms} ms and was killed")]
    TimeoutExceeded {
        /// Timeout that was exceeded
        timeout_ms: u64,
    },

    /// Waiting on the child failed
    #[error("Failed waiting on build process: {0}")]
    Wait(#[source] std::io::Error),
}

/// Outcome of a build process that ran to completion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// Exit code, or `128 + signal` when terminated by a signal
    pub exit_code: i32,
    /// Wall-clock duration from spawn to exit
    pub duration_ms: u64,
    /// When the process was spawned
    pub started_at: DateTime<Utc>,
}

/// Send a signal to every process in a group. A group that no longer exists is not an error.
fn signal_group(pgid: u32, signal: libc::c_int) -> Result<(), std::io::Error> {
    let ret = unsafe { libc::killpg(pgid as libc::pid_t, signal) };
    if ret == -1 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ESRCH) {
            return Ok(());
        }
        return Err(err);
    }
    Ok(())
}

fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .or_else(|| status.signal().map(|sig| 128 + sig))
        .unwrap_or(-1)
}

/// Where a build's standard output goes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuildOutput {
    /// Share the harness's standard output
    #[default]
    Inherit,
    /// Send it to the harness's standard error, keeping standard output for reports
    Stderr,
}

/// Launches build commands with timeout enforcement
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    timeout: Duration,
    kill_grace: Duration,
    output: BuildOutput,
}

impl ProcessRunner {
    /// Create a runner with the given timeout and the default kill grace window
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            kill_grace: Duration::from_millis(crate::DEFAULT_KILL_GRACE_MS),
            output: BuildOutput::default(),
        }
    }

    /// Choose where the build's standard output goes
    #[must_use]
    pub fn with_output(mut self, output: BuildOutput) -> Self {
        self.output = output;
        self
    }

    /// Set the window between SIGTERM and SIGKILL on timeout
    #[must_use]
    pub fn with_kill_grace(mut self, kill_grace: Duration) -> Self {
        self.kill_grace = kill_grace;
        self
    }

    /// Spawn the command via `sh -c` in a fresh process group.
    ///
    /// The command's leading program is resolved first, so a command that
    /// cannot start is a [`RunError::SpawnFailure`] while a build that starts
    /// and later exits 126/127 is an ordinary exit code. Standard error is
    /// inherited; standard output follows [`BuildOutput`].
    pub fn spawn(&self, command: &BuildCommand) -> Result<RunningBuild, RunError> {
        self.check_program(command)?;

        let stdout = match self.output {
            BuildOutput::Inherit => Stdio::inherit(),
            BuildOutput::Stderr => std::io::stderr()
                .as_fd()
                .try_clone_to_owned()
                .map(Stdio::from)
                .map_err(|source| RunError::SpawnFailure {
                    command: command.to_string(),
                    source,
                })?,
        };

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(&command.command)
            .current_dir(&command.working_directory)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(Stdio::inherit())
            .process_group(0);

        let started = Instant::now();
        let started_at = Utc::now();
        let mut child = cmd.spawn().map_err(|source| RunError::SpawnFailure {
            command: command.to_string(),
            source,
        })?;
        let pid = child.id();
        debug!(pid, command = %command, "Spawned build process");

        let (tx, rx) = mpsc::channel();
        let waiter = std::thread::Builder::new()
            .name(format!("buildbench-wait-{pid}"))
            .spawn(move || {
                let status = child.wait();
                let _ = tx.send((status, Instant::now()));
            });

        let waiter = match waiter {
            Ok(handle) => handle,
            Err(source) => {
                let _ = signal_group(pid, libc::SIGKILL);
                return Err(RunError::SpawnFailure {
                    command: command.to_string(),
                    source,
                });
            }
        };

        Ok(RunningBuild {
            pid,
            command: command.to_string(),
            started,
            started_at,
            timeout: self.timeout,
            kill_grace: self.kill_grace,
            exit_rx: rx,
            waiter: Some(waiter),
        })
    }

    /// Spawn the command and wait for it to finish
    pub fn run(&self, command: &BuildCommand) -> Result<ProcessOutcome, RunError> {
        self.spawn(command)?.wait()
    }

    /// Ask the shell whether the leading program exists, from the command's directory
    fn check_program(&self, command: &BuildCommand) -> Result<(), RunError> {
        let Some(program) = leading_program(&command.command) else {
            return Ok(());
        };

        let status = Command::new("sh")
            .arg("-c")
            .arg("command -v -- \"$1\" >/dev/null 2>&1")
            .arg("sh")
            .arg(program)
            .current_dir(&command.working_directory)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|source| RunError::SpawnFailure {
                command: command.to_string(),
                source,
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(RunError::SpawnFailure {
                command: command.to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("'{program}' not found"),
                ),
            })
        }
    }
}

/// First word of a command line that names a program.
///
/// Leading `NAME=value` assignments are skipped. Returns `None` when the word
/// uses shell syntax the check cannot resolve without running it.
fn leading_program(command: &str) -> Option<&str> {
    let word = command
        .split_whitespace()
        .find(|w| !is_assignment(w))?;
    (!word.contains(SHELL_SYNTAX)).then_some(word)
}

fn is_assignment(word: &str) -> bool {
    match word.split_once('=') {
        Some((name, _)) => {
            !name.is_empty()
                && !name.starts_with(|c: char| c.is_ascii_digit())
                && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    }
}

type ExitMessage = (std::io::Result<ExitStatus>, Instant);

/// A spawned build process that has not been waited on yet
pub struct RunningBuild {
    pid: u32,
    command: String,
    started: Instant,
    started_at: DateTime<Utc>,
    timeout: Duration,
    kill_grace: Duration,
    exit_rx: Receiver<ExitMessage>,
    waiter: Option<JoinHandle<()>>,
}

impl RunningBuild {
    /// PID of the direct child, which is also the process group id
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Monotonic spawn instant
    pub fn started(&self) -> Instant {
        self.started
    }

    /// Block until the process exits or the timeout elapses.
    ///
    /// On timeout the process group is terminated and reaped before
    /// `TimeoutExceeded` is returned.
    pub fn wait(mut self) -> Result<ProcessOutcome, RunError> {
        match self.exit_rx.recv_timeout(self.timeout) {
            Ok((status, exited)) => {
                self.join_waiter();
                let status = status.map_err(RunError::Wait)?;
                let code = exit_code(status);
                let duration_ms = exited.duration_since(self.started).as_millis() as u64;
                debug!(pid = self.pid, command = %self.command, code, duration_ms, "Build process exited");

                Ok(ProcessOutcome {
                    exit_code: code,
                    duration_ms,
                    started_at: self.started_at,
                })
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    pid = self.pid,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Build timed out, terminating process group"
                );
                self.terminate_group();
                Err(RunError::TimeoutExceeded {
                    timeout_ms: self.timeout.as_millis() as u64,
                })
            }
            Err(RecvTimeoutError::Disconnected) => {
                self.terminate_group();
                Err(RunError::Wait(std::io::Error::other(
                    "waiter thread exited without reporting a status",
                )))
            }
        }
    }

    /// SIGTERM the group, wait out the grace window, then SIGKILL and reap.
    fn terminate_group(&mut self) {
        // Ignore errors: the group may already be gone
        let _ = signal_group(self.pid, libc::SIGTERM);

        let exited = self.exit_rx.recv_timeout(self.kill_grace).is_ok();

        // Grandchildren can outlive the leader, so the group is killed either way
        let _ = signal_group(self.pid, libc::SIGKILL);
        if !exited {
            let _ = self.exit_rx.recv();
        }
        self.join_waiter();
    }

    fn join_waiter(&mut self) {
        if let Some(handle) = self.waiter.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for RunningBuild {
    fn drop(&mut self) {
        if self.waiter.is_some() {
            let _ = signal_group(self.pid, libc::SIGKILL);
            let _ = self.exit_rx.recv();
            self.join_waiter();
        }
    }
}

//! Supervision of the walker server child process.
//!
//! [`ServerHandle`] is the only owner of the child. It starts the process
//! without waiting for readiness, answers liveness queries without
//! blocking, and stops the process in two steps: SIGTERM followed by a
//! bounded wait, then SIGKILL followed by another bounded wait.
//!
//! Stopping never returns an error. A process that outlives SIGKILL is
//! logged and reported as [`StopOutcome::Unkillable`], so cleanup can never
//! hide the failure that triggered it.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::error::HarnessError;
use crate::launch::LaunchCommand;
use crate::probe::PortReady;

/// Poll cadence while waiting for the child to exit.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Lifecycle of a supervised server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Spawned, port not yet confirmed
    Starting,
    /// Port accepted a connection
    Ready,
    /// Stop in progress
    Terminating,
    /// Exited after being asked to stop
    Stopped,
    /// Exited on its own, or could not be killed
    Crashed,
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Starting => write!(f, "starting"),
            Self::Ready => write!(f, "ready"),
            Self::Terminating => write!(f, "terminating"),
            Self::Stopped => write!(f, "stopped"),
            Self::Crashed => write!(f, "crashed"),
        }
    }
}

/// How long to wait after each termination signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopPolicy {
    /// Wait after SIGTERM
    pub grace: Duration,
    /// Wait after SIGKILL
    pub kill: Duration,
}

impl Default for StopPolicy {
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(15),
            kill: Duration::from_secs(5),
        }
    }
}

/// Result of [`ServerHandle::stop`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum StopOutcome {
    /// The process had already exited before any signal was sent
    AlreadyExited { code: Option<i32> },
    /// Exited within the grace period after SIGTERM
    Graceful { code: Option<i32> },
    /// Needed SIGKILL
    Killed { code: Option<i32> },
    /// `stop` had already run for this handle
    AlreadyStopped,
    /// Still alive after SIGKILL and the kill wait
    Unkillable { pid: u32 },
}

impl StopOutcome {
    /// `true` when the process could not be reaped.
    pub fn is_cleanup_failure(&self) -> bool {
        matches!(self, Self::Unkillable { .. })
    }
}

/// Everything needed to start the server.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub command: LaunchCommand,
    /// Entry-point file passed after `start`, relative to `working_dir`
    pub entrypoint: String,
    /// Fixture directory the server runs in
    pub working_dir: PathBuf,
    /// Host the server will be probed and queried on
    pub host: String,
    pub port: u16,
    /// Extra environment on top of the inherited one
    pub env: BTreeMap<String, String>,
    /// Forward server stdout and stderr to our stderr; otherwise discard.
    /// Our stdout is reserved for reports.
    pub inherit_output: bool,
    /// Used when the handle is dropped without an explicit stop
    pub stop_policy: StopPolicy,
}

impl LaunchSpec {
    pub fn new(command: LaunchCommand, working_dir: impl Into<PathBuf>, port: u16) -> Self {
        Self {
            command,
            entrypoint: "main.jac".to_string(),
            working_dir: working_dir.into(),
            host: "127.0.0.1".to_string(),
            port,
            env: BTreeMap::new(),
            inherit_output: true,
            stop_policy: StopPolicy::default(),
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_entrypoint(mut self, entrypoint: impl Into<String>) -> Self {
        self.entrypoint = entrypoint.into();
        self
    }

    pub fn with_stop_policy(mut self, policy: StopPolicy) -> Self {
        self.stop_policy = policy;
        self
    }

    pub fn quiet(mut self) -> Self {
        self.inherit_output = false;
        self
    }
}

/// Exclusive owner of a running server process.
#[derive(Debug)]
pub struct ServerHandle {
    child: Option<Child>,
    pid: u32,
    host: String,
    port: u16,
    state: LifecycleState,
    exit: Option<ExitStatus>,
    stop_attempted: bool,
    stop_policy: StopPolicy,
}

impl ServerHandle {
    /// Spawn the server described by `spec` and return immediately.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Launch`] if the process cannot be spawned
    /// (missing executable, missing working directory, permissions).
    pub fn start(spec: &LaunchSpec) -> Result<Self, HarnessError> {
        let args = spec.command.server_args(&spec.entrypoint, spec.port);

        let mut cmd = Command::new(&spec.command.program);
        cmd.args(&args)
            .current_dir(&spec.working_dir)
            .envs(&spec.env)
            .stdin(Stdio::null());
        if spec.inherit_output {
            cmd.stdout(Stdio::from(std::io::stderr()));
        } else {
            cmd.stdout(Stdio::null()).stderr(Stdio::null());
        }

        let child = cmd.spawn().map_err(|source| HarnessError::Launch {
            program: spec.command.program.clone(),
            working_dir: spec.working_dir.clone(),
            source,
        })?;
        let pid = child.id();
        info!(
            pid,
            port = spec.port,
            program = %spec.command.program.display(),
            ?args,
            "server process started"
        );

        Ok(Self {
            child: Some(child),
            pid,
            host: spec.host.clone(),
            port: spec.port,
            state: LifecycleState::Starting,
            exit: None,
            stop_attempted: false,
            stop_policy: spec.stop_policy,
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Exit code recorded so far, if the process has exited with one.
    pub fn exit_code(&self) -> Option<i32> {
        self.exit.and_then(|s| s.code())
    }

    /// Non-blocking check for process exit.
    ///
    /// Returns the exit status once the process has exited. A process that
    /// exits without being asked to moves the handle to `Crashed`.
    pub fn poll_exit(&mut self) -> Option<ExitStatus> {
        if self.exit.is_some() {
            return self.exit;
        }
        let child = self.child.as_mut()?;
        match child.try_wait() {
            Ok(Some(status)) => {
                self.exit = Some(status);
                if matches!(self.state, LifecycleState::Starting | LifecycleState::Ready) {
                    warn!(pid = self.pid, code = ?status.code(), "server exited on its own");
                    self.state = LifecycleState::Crashed;
                }
                Some(status)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(pid = self.pid, error = %e, "failed to poll server process");
                None
            }
        }
    }

    /// `true` while the process is running. Never blocks.
    pub fn is_alive(&mut self) -> bool {
        self.child.is_some() && self.poll_exit().is_none()
    }

    /// Record a successful readiness probe.
    ///
    /// Only a handle in `Starting` moves to `Ready`.
    pub fn mark_ready(&mut self, ready: &PortReady) {
        debug_assert_eq!(ready.port, self.port, "probe result is for another port");
        if self.state == LifecycleState::Starting {
            info!(pid = self.pid, port = self.port, waited = ?ready.waited, "server is ready");
            self.state = LifecycleState::Ready;
        }
    }

    /// Stop the process: SIGTERM, wait `grace`, SIGKILL, wait `kill`.
    ///
    /// Idempotent: every call after the first returns
    /// [`StopOutcome::AlreadyStopped`]. The child handle is released before
    /// returning so no descriptors outlive the call.
    pub fn stop(&mut self, grace: Duration, kill: Duration) -> StopOutcome {
        if self.stop_attempted {
            debug!(pid = self.pid, state = %self.state, "stop already ran");
            return StopOutcome::AlreadyStopped;
        }
        self.stop_attempted = true;

        if let Some(status) = self.poll_exit() {
            self.child = None;
            return StopOutcome::AlreadyExited {
                code: status.code(),
            };
        }
        let Some(mut child) = self.child.take() else {
            return StopOutcome::AlreadyStopped;
        };

        self.state = LifecycleState::Terminating;
        debug!(pid = self.pid, "sending SIGTERM");
        if let Err(e) = send_terminate(&mut child) {
            warn!(pid = self.pid, error = %e, "failed to send SIGTERM");
        }
        if let Some(status) = wait_for_exit(&mut child, grace) {
            info!(pid = self.pid, code = ?status.code(), "server stopped");
            self.exit = Some(status);
            self.state = LifecycleState::Stopped;
            return StopOutcome::Graceful {
                code: status.code(),
            };
        }

        warn!(pid = self.pid, ?grace, "server ignored SIGTERM, forcing kill");
        if let Err(e) = child.kill() {
            warn!(pid = self.pid, error = %e, "failed to send SIGKILL");
        }
        if let Some(status) = wait_for_exit(&mut child, kill) {
            info!(pid = self.pid, "server killed");
            self.exit = Some(status);
            self.state = LifecycleState::Stopped;
            return StopOutcome::Killed {
                code: status.code(),
            };
        }

        error!(
            pid = self.pid,
            ?kill,
            "server survived SIGKILL; process may be leaked"
        );
        self.state = LifecycleState::Crashed;
        StopOutcome::Unkillable { pid: self.pid }
    }

    /// Stop using the policy from the launch spec.
    pub fn stop_with_policy(&mut self) -> StopOutcome {
        let policy = self.stop_policy;
        self.stop(policy.grace, policy.kill)
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if !self.stop_attempted {
            let outcome = self.stop_with_policy();
            debug!(pid = self.pid, ?outcome, "server stopped on drop");
        }
    }
}

fn wait_for_exit(child: &mut Child, timeout: Duration) -> Option<ExitStatus> {
    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Some(status),
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, "failed to poll child while stopping");
                return None;
            }
        }
        let now = Instant::now();
        if now >= deadline {
            return None;
        }
        thread::sleep(EXIT_POLL_INTERVAL.min(deadline - now));
    }
}

#[cfg(unix)]
fn send_terminate(child: &mut Child) -> std::io::Result<()> {
    let pid = child.id() as libc::pid_t;
    // SAFETY: the child has not been reaped yet (we hold the only `Child`
    // and have not observed its exit), so `pid` still names our process.
    let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
    if rc == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn send_terminate(child: &mut Child) -> std::io::Result<()> {
    // No graceful signal on this platform; the kill wait is skipped in practice.
    child.kill()
}

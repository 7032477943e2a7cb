//! TCP readiness probing.
//!
//! A server is considered ready as soon as a plain TCP connect to its port
//! succeeds. Polling is deadline-driven: every attempt uses a short connect
//! timeout, and the sleep between attempts is clamped to the time remaining,
//! so a call never overruns `timeout + interval`.

use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::HarnessError;

/// Default per-attempt connect timeout.
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_millis(500);
/// Default pause between failed attempts.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(500);

/// Proof that a port accepted a connection.
///
/// Only [`Prober`] hands these out, and
/// [`crate::ServerHandle::mark_ready`] requires one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortReady {
    pub host: String,
    pub port: u16,
    /// Time spent polling before the first successful connect
    pub waited: Duration,
    pub attempts: u32,
}

/// The deadline passed (or the caller stopped waiting) without a connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeTimeout {
    pub host: String,
    pub port: u16,
    pub waited: Duration,
    pub attempts: u32,
}

impl From<ProbeTimeout> for HarnessError {
    fn from(t: ProbeTimeout) -> Self {
        HarnessError::ReadinessTimeout {
            host: t.host,
            port: t.port,
            waited: t.waited,
            attempts: t.attempts,
        }
    }
}

/// Polls a `(host, port)` pair until it accepts TCP connections.
#[derive(Debug, Clone, Copy)]
pub struct Prober {
    attempt_timeout: Duration,
    interval: Duration,
}

impl Default for Prober {
    fn default() -> Self {
        Self {
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            interval: DEFAULT_INTERVAL,
        }
    }
}

impl Prober {
    pub fn new(attempt_timeout: Duration, interval: Duration) -> Self {
        Self {
            attempt_timeout,
            interval,
        }
    }

    /// Block until `host:port` accepts a connection or `timeout` elapses.
    pub fn wait_for_port(
        &self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<PortReady, ProbeTimeout> {
        self.wait_while(host, port, timeout, || true)
    }

    /// Like [`Prober::wait_for_port`], but gives up early once `keep_waiting`
    /// returns `false`.
    ///
    /// The predicate runs before every attempt. The orchestrator passes the
    /// server's liveness check here so a crashed server does not consume the
    /// whole deadline.
    pub fn wait_while(
        &self,
        host: &str,
        port: u16,
        timeout: Duration,
        mut keep_waiting: impl FnMut() -> bool,
    ) -> Result<PortReady, ProbeTimeout> {
        let start = Instant::now();
        let deadline = start + timeout;
        let mut attempts = 0u32;

        loop {
            if !keep_waiting() {
                debug!(host, port, attempts, "probe abandoned by caller");
                break;
            }

            attempts += 1;
            if self.try_connect(host, port) {
                let waited = start.elapsed();
                debug!(host, port, attempts, ?waited, "port is accepting connections");
                return Ok(PortReady {
                    host: host.to_string(),
                    port,
                    waited,
                    attempts,
                });
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }
            // Clamped so the final attempt lands at the deadline, not past it.
            thread::sleep(self.interval.min(deadline - now));
        }

        Err(ProbeTimeout {
            host: host.to_string(),
            port,
            waited: start.elapsed(),
            attempts,
        })
    }

    fn try_connect(&self, host: &str, port: u16) -> bool {
        let addrs: Vec<SocketAddr> = match (host, port).to_socket_addrs() {
            Ok(addrs) => addrs.collect(),
            Err(e) => {
                debug!(host, port, error = %e, "probe address resolution failed");
                return false;
            }
        };
        addrs.iter().any(|addr| {
            match TcpStream::connect_timeout(addr, self.attempt_timeout) {
                Ok(stream) => {
                    drop(stream);
                    true
                }
                Err(e) => {
                    debug!(%addr, error = %e, "probe attempt failed");
                    false
                }
            }
        })
    }
}

//! Ephemeral port allocation.
//!
//! The OS picks a free port when binding to port 0. The listener is dropped
//! before returning, so a different process may still claim the port before
//! the server binds it; that race shows up later as a readiness failure.

use std::net::TcpListener;

use tracing::debug;

use crate::error::HarnessError;

/// Bind address used when the caller does not care about the interface.
pub const ANY_INTERFACE: &str = "0.0.0.0";

/// Ask the OS for a currently-free TCP port on `host`.
///
/// # Errors
///
/// Returns [`HarnessError::PortAllocation`] if the bind itself fails.
pub fn allocate_port(host: &str) -> Result<u16, HarnessError> {
    let listener =
        TcpListener::bind((host, 0)).map_err(|source| HarnessError::PortAllocation {
            host: host.to_string(),
            source,
        })?;
    let port = listener
        .local_addr()
        .map_err(|source| HarnessError::PortAllocation {
            host: host.to_string(),
            source,
        })?
        .port();
    drop(listener);
    debug!(host, port, "allocated ephemeral port");
    Ok(port)
}

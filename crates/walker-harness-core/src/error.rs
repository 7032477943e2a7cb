//! Error types for harness operations

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::config::ConfigError;
use crate::validate::ValidationError;

/// Errors raised while booting, probing or querying a walker server.
///
/// Cleanup problems are not errors: a server that survives a forced kill is
/// reported through [`crate::StopOutcome::Unkillable`] and never replaces the
/// failure that preceded it.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// The OS refused to hand out an ephemeral port
    #[error("Failed to allocate a free port on {host}: {source}")]
    PortAllocation {
        host: String,
        source: std::io::Error,
    },

    /// The server executable could not be spawned
    #[error("Failed to launch `{}` in {}: {source}", .program.display(), .working_dir.display())]
    Launch {
        program: PathBuf,
        working_dir: PathBuf,
        source: std::io::Error,
    },

    /// The port never accepted a connection before the deadline
    #[error("Timed out after {waited:?} waiting for {host}:{port} ({attempts} attempts)")]
    ReadinessTimeout {
        host: String,
        port: u16,
        waited: Duration,
        attempts: u32,
    },

    /// The server process died before it became ready (or while serving)
    #[error("Server exited prematurely with {}", describe_exit(.code))]
    ProcessExited { code: Option<i32> },

    /// Network failure while sending the request or reading the response
    #[error("Request to {url} failed: {source}")]
    RequestTransport {
        url: String,
        source: reqwest::Error,
    },

    /// The server answered with any status other than 200
    #[error("Request to {url} returned HTTP {status}\n{body}")]
    RequestStatus {
        url: String,
        status: u16,
        body: String,
    },

    /// A 200 body that could not be parsed as JSON
    #[error("Response from {url} is not valid JSON ({reason}): {body}")]
    ResponseDecode {
        url: String,
        reason: String,
        body: String,
    },

    /// The response was well-formed but semantically wrong
    #[error("{case}: {source}")]
    Validation {
        case: String,
        source: ValidationError,
    },

    /// Configuration could not be loaded
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl HarnessError {
    /// Short machine-readable kind, used in JSON reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PortAllocation { .. } | Self::Launch { .. } => "launch_failure",
            Self::ReadinessTimeout { .. } | Self::ProcessExited { .. } => "readiness_timeout",
            Self::RequestTransport { .. } | Self::ResponseDecode { .. } => "request_transport",
            Self::RequestStatus { .. } => "request_status",
            Self::Validation { .. } => "validation_failure",
            Self::Config(_) => "config",
        }
    }
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_exited_names_the_exit_code() {
        let err = HarnessError::ProcessExited { code: Some(3) };
        assert_eq!(err.to_string(), "Server exited prematurely with exit code 3");
        assert_eq!(err.kind(), "readiness_timeout");
    }

    #[test]
    fn process_exited_by_signal_is_described() {
        let err = HarnessError::ProcessExited { code: None };
        assert!(err.to_string().contains("terminated by signal"));
    }

    #[test]
    fn request_status_carries_status_and_body() {
        let err = HarnessError::RequestStatus {
            url: "http://127.0.0.1:1/walker/Supervisor".to_string(),
            status: 500,
            body: "walker crashed".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("HTTP 500"));
        assert!(msg.contains("walker crashed"));
        assert_eq!(err.kind(), "request_status");
    }

    #[test]
    fn validation_error_names_the_case() {
        let err = HarnessError::Validation {
            case: "math".to_string(),
            source: ValidationError::EmptyReports,
        };
        assert!(err.to_string().starts_with("math: "));
        assert_eq!(err.kind(), "validation_failure");
    }
}

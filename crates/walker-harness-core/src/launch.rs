//! Resolution of the command that starts the walker server.
//!
//! The server is started as `<cmd> start <entrypoint> -p <port>`. `<cmd>` is
//! the configured program (normally `jac`) when it can be found on `PATH`,
//! otherwise the fallback invocation (normally `python3 -m jaclang`).

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use tracing::debug;

/// Default server executable name.
pub const DEFAULT_PROGRAM: &str = "jac";

/// Default fallback invocation used when [`DEFAULT_PROGRAM`] is not on `PATH`.
pub fn default_fallback() -> Vec<String> {
    vec![
        "python3".to_string(),
        "-m".to_string(),
        "jaclang".to_string(),
    ]
}

/// A resolved program plus any arguments that precede `start`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    pub program: PathBuf,
    pub prefix_args: Vec<String>,
}

impl LaunchCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            prefix_args: Vec::new(),
        }
    }

    pub fn with_prefix_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prefix_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Full argument vector for starting `entrypoint` on `port`.
    pub fn server_args(&self, entrypoint: &str, port: u16) -> Vec<String> {
        let mut args = self.prefix_args.clone();
        args.extend([
            "start".to_string(),
            entrypoint.to_string(),
            "-p".to_string(),
            port.to_string(),
        ]);
        args
    }
}

/// Resolve `program` against the current `PATH`, falling back to `fallback`.
pub fn resolve_launch_command(program: &str, fallback: &[String]) -> LaunchCommand {
    let path_var = std::env::var_os("PATH").unwrap_or_default();
    resolve_with_path(program, fallback, &path_var)
}

fn resolve_with_path(program: &str, fallback: &[String], path_var: &OsStr) -> LaunchCommand {
    let as_path = Path::new(program);
    if as_path.components().count() > 1 {
        // Explicit path: use as given, spawn reports if it is missing.
        return LaunchCommand::new(as_path);
    }

    if let Some(found) = find_in_path(program, path_var) {
        debug!(program, path = %found.display(), "resolved server program on PATH");
        return LaunchCommand::new(found);
    }

    match fallback.split_first() {
        Some((fallback_program, rest)) => {
            debug!(program, fallback = ?fallback, "program not on PATH, using fallback");
            LaunchCommand::new(fallback_program).with_prefix_args(rest.iter().cloned())
        }
        None => LaunchCommand::new(program),
    }
}

fn find_in_path(binary: &str, path_var: &OsStr) -> Option<PathBuf> {
    for segment in std::env::split_paths(path_var) {
        let candidate = segment.join(binary);
        if candidate.is_file() {
            return Some(candidate);
        }
        #[cfg(windows)]
        {
            let exe = segment.join(format!("{binary}.exe"));
            if exe.is_file() {
                return Some(exe);
            }
        }
    }
    None
}

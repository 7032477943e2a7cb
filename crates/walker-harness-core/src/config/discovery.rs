//! Configuration discovery and resolution

use super::types::HarnessConfig;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// File name searched for from the current directory upward.
pub const CONFIG_FILE_NAME: &str = "walker-harness.toml";

/// Overrides `server.fixture_dir`.
pub const ENV_FIXTURE_DIR: &str = "WALKER_HARNESS_FIXTURE_DIR";
/// Overrides `server.program`.
pub const ENV_PROGRAM: &str = "WALKER_HARNESS_PROGRAM";
/// Overrides `gate.credential_env`.
pub const ENV_CREDENTIAL: &str = "WALKER_HARNESS_CREDENTIAL_ENV";

/// Configuration error
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error reading a config file
    #[error("I/O error reading {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// TOML parsing error
    #[error("TOML parsing error in {}: {source}", .path.display())]
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// Explicitly requested config file does not exist
    #[error("Configuration not found: {}", .0.display())]
    NotFound(PathBuf),

    /// A `[[cases]]` entry cannot be turned into a query case
    #[error("Invalid case '{name}': {reason}")]
    InvalidCase { name: String, reason: String },
}

/// Command-line overrides for configuration
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    /// Explicit config file; must exist
    pub config_path: Option<PathBuf>,
    pub fixture_dir: Option<PathBuf>,
    pub program: Option<String>,
    pub credential_env: Option<String>,
    pub host: Option<String>,
    pub inherit_output: Option<bool>,
}

/// Resolve configuration from all sources
///
/// Priority (highest to lowest):
/// 1. Command-line overrides
/// 2. Environment variables
/// 3. Config file (explicit path, or `walker-harness.toml` upward from `current_dir`)
/// 4. Defaults
///
/// Relative `fixture_dir` values are anchored to the config file's
/// directory when they come from a file, otherwise to `current_dir`.
pub fn resolve_config(
    overrides: &ConfigOverrides,
    current_dir: &Path,
) -> Result<HarnessConfig, ConfigError> {
    // 3. Config file
    let mut config = match &overrides.config_path {
        Some(path) => {
            let path = if path.is_absolute() {
                path.clone()
            } else {
                current_dir.join(path)
            };
            if !path.exists() {
                return Err(ConfigError::NotFound(path));
            }
            load_config_file(&path)?
        }
        None => match find_config_file(current_dir) {
            Some(path) => match load_config_file(&path) {
                Ok(config) => config,
                Err(e) => {
                    warn!("Ignoring unreadable config at {}: {e}", path.display());
                    anchored_default(current_dir)
                }
            },
            None => anchored_default(current_dir),
        },
    };

    // 2. Environment variables
    apply_env_overrides(&mut config, current_dir);

    // 1. Command-line overrides
    apply_cli_overrides(&mut config, overrides, current_dir);

    Ok(config)
}

/// Load a config file, anchoring relative paths to its directory.
pub fn load_config_file(path: &Path) -> Result<HarnessConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut config: HarnessConfig =
        toml::from_str(&contents).map_err(|source| ConfigError::TomlParse {
            path: path.to_path_buf(),
            source,
        })?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    config.server.fixture_dir = anchor(base, &config.server.fixture_dir);
    debug!("Loaded config from {}", path.display());
    Ok(config)
}

fn anchored_default(current_dir: &Path) -> HarnessConfig {
    let mut config = HarnessConfig::default();
    config.server.fixture_dir = anchor(current_dir, &config.server.fixture_dir);
    config
}

/// Search `current_dir` and its parents, stopping at the git root.
fn find_config_file(current_dir: &Path) -> Option<PathBuf> {
    let mut dir = current_dir;
    loop {
        let candidate = dir.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            return Some(candidate);
        }
        if dir.join(".git").exists() {
            return None;
        }
        dir = dir.parent()?;
    }
}

fn apply_env_overrides(config: &mut HarnessConfig, current_dir: &Path) {
    if let Some(dir) = non_empty_env(ENV_FIXTURE_DIR) {
        config.server.fixture_dir = anchor(current_dir, Path::new(&dir));
    }
    if let Some(program) = non_empty_env(ENV_PROGRAM) {
        config.server.program = program;
    }
    if let Some(var) = non_empty_env(ENV_CREDENTIAL) {
        config.gate.credential_env = var;
    }
}

fn apply_cli_overrides(config: &mut HarnessConfig, overrides: &ConfigOverrides, current_dir: &Path) {
    if let Some(dir) = &overrides.fixture_dir {
        config.server.fixture_dir = anchor(current_dir, dir);
    }
    if let Some(program) = &overrides.program {
        config.server.program = program.clone();
    }
    if let Some(var) = &overrides.credential_env {
        config.gate.credential_env = var.clone();
    }
    if let Some(host) = &overrides.host {
        config.server.host = host.clone();
    }
    if let Some(inherit) = overrides.inherit_output {
        config.server.inherit_output = inherit;
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn anchor(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

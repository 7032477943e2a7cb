//! Configuration resolution
//!
//! Resolves harness configuration from multiple sources with priority:
//! 1. Command-line flags (passed as [`ConfigOverrides`])
//! 2. Environment variables (`WALKER_HARNESS_*`)
//! 3. Config file (`--config`, or `walker-harness.toml` found upward from the cwd)
//! 4. Defaults

mod discovery;
mod types;

pub use discovery::{
    CONFIG_FILE_NAME, ConfigError, ConfigOverrides, ENV_CREDENTIAL, ENV_FIXTURE_DIR, ENV_PROGRAM,
    load_config_file, resolve_config,
};
pub use types::{CaseConfig, GateConfig, HarnessConfig, ServerConfig, TimeoutConfig};

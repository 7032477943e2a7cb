//! Configuration types

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use super::ConfigError;
use crate::client::DEFAULT_ROUTE;
use crate::gate::DEFAULT_CREDENTIAL_ENV;
use crate::launch::{DEFAULT_PROGRAM, default_fallback};
use crate::validate::{
    DEFAULT_HANDLER_FIELD, Expectation, FieldRequirement, QueryCase, ReportExpectation,
    default_cases,
};

/// Complete harness configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// How to start the walker server
    #[serde(default)]
    pub server: ServerConfig,
    /// Deadlines and poll cadences
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    /// Credential gating
    #[serde(default)]
    pub gate: GateConfig,
    /// Query cases: [[cases]]. Empty means the built-in routing cases.
    #[serde(default)]
    pub cases: Vec<CaseConfig>,
}

impl HarnessConfig {
    /// Build the query cases to run, falling back to the built-in set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidCase`] for a case with neither `query`
    /// nor `payload`, or with both.
    pub fn query_cases(&self) -> Result<Vec<QueryCase>, ConfigError> {
        if self.cases.is_empty() {
            return Ok(default_cases());
        }
        self.cases.iter().map(CaseConfig::to_case).collect()
    }
}

/// Server launch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Executable looked up on PATH
    pub program: String,
    /// Invocation used when `program` is not on PATH
    pub fallback: Vec<String>,
    /// Entry-point file passed after `start`
    pub entrypoint: String,
    /// Directory the server runs in
    pub fixture_dir: PathBuf,
    /// Host used for probing and requests
    pub host: String,
    /// Routing endpoint path
    pub route: String,
    /// Extra environment variables for the server process
    pub env: BTreeMap<String, String>,
    /// Forward server stdout/stderr
    pub inherit_output: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            program: DEFAULT_PROGRAM.to_string(),
            fallback: default_fallback(),
            entrypoint: "main.jac".to_string(),
            fixture_dir: PathBuf::from("fixtures/integration_byllm"),
            host: "127.0.0.1".to_string(),
            route: DEFAULT_ROUTE.to_string(),
            env: BTreeMap::new(),
            inherit_output: true,
        }
    }
}

/// Timeouts. Seconds for coarse deadlines, milliseconds for poll cadences.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub startup_secs: u64,
    pub request_secs: u64,
    pub grace_secs: u64,
    pub kill_secs: u64,
    pub probe_attempt_ms: u64,
    pub probe_interval_ms: u64,
    /// Pause after teardown so the OS can release the port
    pub settle_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            startup_secs: 60,
            request_secs: 90,
            grace_secs: 15,
            kill_secs: 5,
            probe_attempt_ms: 500,
            probe_interval_ms: 500,
            settle_ms: 1000,
        }
    }
}

impl TimeoutConfig {
    pub fn startup(&self) -> Duration {
        Duration::from_secs(self.startup_secs)
    }

    pub fn request(&self) -> Duration {
        Duration::from_secs(self.request_secs)
    }

    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.grace_secs)
    }

    pub fn kill(&self) -> Duration {
        Duration::from_secs(self.kill_secs)
    }

    pub fn probe_attempt(&self) -> Duration {
        Duration::from_millis(self.probe_attempt_ms)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

/// Credential gate configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// When false the suite runs regardless of the credential
    pub enabled: bool,
    /// Variable that must be set and non-empty
    pub credential_env: String,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            credential_env: DEFAULT_CREDENTIAL_ENV.to_string(),
        }
    }
}

fn default_handler_field() -> String {
    DEFAULT_HANDLER_FIELD.to_string()
}

/// One `[[cases]]` entry
///
/// ```toml
/// [[cases]]
/// name = "research_agent"
/// query = "Compare supervised fine-tuning and prompt engineering"
/// handler = "ResearchAgent"
/// fields = [{ name = "summary" }]
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseConfig {
    pub name: String,
    /// Shorthand for `payload = { query = "..." }`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    /// Arbitrary JSON payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    /// Expected agent; absent means any non-empty answer passes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handler: Option<String>,
    #[serde(default = "default_handler_field")]
    pub handler_field: String,
    #[serde(default)]
    pub fields: Vec<FieldRequirement>,
    #[serde(default)]
    pub require_reports: bool,
}

impl CaseConfig {
    pub fn to_case(&self) -> Result<QueryCase, ConfigError> {
        let payload = match (&self.query, &self.payload) {
            (Some(query), None) => serde_json::json!({ "query": query }),
            (None, Some(payload)) => payload.clone(),
            (Some(_), Some(_)) => {
                return Err(ConfigError::InvalidCase {
                    name: self.name.clone(),
                    reason: "set either `query` or `payload`, not both".to_string(),
                });
            }
            (None, None) => {
                return Err(ConfigError::InvalidCase {
                    name: self.name.clone(),
                    reason: "missing `query` or `payload`".to_string(),
                });
            }
        };

        let expect = match &self.handler {
            Some(handler) => Expectation::Report(ReportExpectation {
                handler_field: self.handler_field.clone(),
                handler: handler.clone(),
                fields: self.fields.clone(),
                require_reports: self.require_reports,
            }),
            None => Expectation::NonEmpty,
        };

        Ok(QueryCase {
            name: self.name.clone(),
            payload,
            expect,
        })
    }
}

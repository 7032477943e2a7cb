//! Suite orchestration: allocate → start → probe → request cycles → teardown.
//!
//! [`ServerFixture`] is the single owner of the server process for the whole
//! suite. Scenarios only ever see its [`Endpoint`]. Teardown is explicit via
//! [`ServerFixture::teardown`], and the underlying [`ServerHandle`] stops
//! itself on drop, so a panic mid-suite still reaps the child.
//!
//! Phase log for a clean run:
//!
//! ```text
//! Idle → PortAllocated → ProcessStarted → Ready → RequestCycle(0..n) → TornDown
//! ```
//!
//! `Failed` is recorded before `TornDown` whenever setup or any cycle failed.

use std::thread;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::client::{Endpoint, RoutedResponse, RoutingClient};
use crate::config::{HarnessConfig, TimeoutConfig};
use crate::error::HarnessError;
use crate::gate::{GateDecision, check_credential};
use crate::launch::resolve_launch_command;
use crate::port::{ANY_INTERFACE, allocate_port};
use crate::probe::Prober;
use crate::supervisor::{LaunchSpec, ServerHandle, StopOutcome, StopPolicy};
use crate::validate::{QueryCase, validate};

/// Name of the synthetic scenario covering server startup.
pub const STARTUP_SCENARIO: &str = "server_starts";

/// Orchestrator phase, recorded in order for every suite run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HarnessPhase {
    Idle,
    PortAllocated,
    ProcessStarted,
    Ready,
    /// Index into the case list
    RequestCycle(usize),
    Failed,
    TornDown,
}

/// Result of one scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScenarioOutcome {
    Passed,
    Failed { kind: String, reason: String },
    Skipped { reason: String },
}

impl ScenarioOutcome {
    fn from_error(err: &HarnessError) -> Self {
        Self::Failed {
            kind: err.kind().to_string(),
            reason: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub name: String,
    #[serde(flatten)]
    pub outcome: ScenarioOutcome,
    pub elapsed_ms: u64,
}

/// Everything a suite run produced.
#[derive(Debug, Clone, Serialize)]
pub struct SuiteReport {
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    pub phases: Vec<HarnessPhase>,
    pub scenarios: Vec<ScenarioReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub teardown: Option<StopOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub setup_error: Option<String>,
}

impl SuiteReport {
    fn count(&self, pred: impl Fn(&ScenarioOutcome) -> bool) -> usize {
        self.scenarios.iter().filter(|s| pred(&s.outcome)).count()
    }

    pub fn passed(&self) -> usize {
        self.count(|o| matches!(o, ScenarioOutcome::Passed))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, ScenarioOutcome::Failed { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, ScenarioOutcome::Skipped { .. }))
    }

    /// No scenario failed. An all-skipped suite counts as success.
    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    pub fn scenario(&self, name: &str) -> Option<&ScenarioReport> {
        self.scenarios.iter().find(|s| s.name == name)
    }
}

/// Setup did not reach `Ready`. Teardown has already run.
#[derive(Debug)]
pub struct SetupFailure {
    pub error: HarnessError,
    pub port: Option<u16>,
    pub pid: Option<u32>,
    pub phases: Vec<HarnessPhase>,
    pub teardown: Option<StopOutcome>,
}

/// What [`ServerFixture::teardown`] observed.
#[derive(Debug, Clone)]
pub struct Teardown {
    pub outcome: StopOutcome,
    pub phases: Vec<HarnessPhase>,
}

/// Build the launch spec for `port` from configuration.
pub fn launch_spec(config: &HarnessConfig, port: u16) -> LaunchSpec {
    let server = &config.server;
    let command = resolve_launch_command(&server.program, &server.fallback);
    let mut spec = LaunchSpec::new(command, server.fixture_dir.clone(), port)
        .with_entrypoint(server.entrypoint.clone())
        .with_stop_policy(stop_policy(&config.timeouts));
    spec.host = server.host.clone();
    spec.env = server.env.clone();
    spec.inherit_output = server.inherit_output;
    spec
}

fn stop_policy(timeouts: &TimeoutConfig) -> StopPolicy {
    StopPolicy {
        grace: timeouts.grace(),
        kill: timeouts.kill(),
    }
}

/// Suite-scoped owner of a ready server.
#[derive(Debug)]
pub struct ServerFixture {
    handle: ServerHandle,
    endpoint: Endpoint,
    phases: Vec<HarnessPhase>,
    timeouts: TimeoutConfig,
    failed: bool,
}

impl ServerFixture {
    /// Allocate a port, start the server and wait until it accepts
    /// connections.
    ///
    /// On failure the process (if any) is already stopped, and the error is
    /// the most specific one available: a server that exited during startup
    /// is reported with its exit code rather than as a timeout.
    pub fn launch(config: &HarnessConfig) -> Result<Self, Box<SetupFailure>> {
        let mut phases = vec![HarnessPhase::Idle];
        let timeouts = config.timeouts.clone();

        let port = match allocate_port(ANY_INTERFACE) {
            Ok(port) => port,
            Err(error) => return Err(setup_failed(error, phases, None, None)),
        };
        phases.push(HarnessPhase::PortAllocated);

        let spec = launch_spec(config, port);
        let mut handle = match ServerHandle::start(&spec) {
            Ok(handle) => handle,
            Err(error) => return Err(setup_failed(error, phases, Some(port), None)),
        };
        phases.push(HarnessPhase::ProcessStarted);

        let prober = Prober::new(timeouts.probe_attempt(), timeouts.probe_interval());
        let probe = prober.wait_while(&spec.host, port, timeouts.startup(), || handle.is_alive());

        let failure = match probe {
            Ok(ready) if handle.is_alive() => {
                handle.mark_ready(&ready);
                phases.push(HarnessPhase::Ready);
                return Ok(Self {
                    endpoint: Endpoint::new(spec.host.clone(), port),
                    handle,
                    phases,
                    timeouts,
                    failed: false,
                });
            }
            // Bound the port and then died before we could use it.
            Ok(_) => HarnessError::ProcessExited {
                code: handle.exit_code(),
            },
            Err(timeout) => match handle.poll_exit() {
                Some(status) => HarnessError::ProcessExited {
                    code: status.code(),
                },
                None => timeout.into(),
            },
        };

        error!(port, pid = handle.pid(), "server did not become ready: {failure}");
        let pid = handle.pid();
        let outcome = stop_and_settle(&mut handle, &timeouts);
        Err(setup_failed(failure, phases, Some(port), Some((pid, outcome))))
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn pid(&self) -> u32 {
        self.handle.pid()
    }

    pub fn phases(&self) -> &[HarnessPhase] {
        &self.phases
    }

    /// Fail fast if the server died since the last check.
    pub fn check_alive(&mut self) -> Result<(), HarnessError> {
        match self.handle.poll_exit() {
            Some(status) => Err(HarnessError::ProcessExited {
                code: status.code(),
            }),
            None => Ok(()),
        }
    }

    pub fn begin_cycle(&mut self, index: usize) {
        self.phases.push(HarnessPhase::RequestCycle(index));
    }

    pub fn mark_failed(&mut self) {
        self.failed = true;
    }

    /// Stop the server and release its resources. Never fails.
    pub fn teardown(mut self) -> Teardown {
        if self.failed {
            self.phases.push(HarnessPhase::Failed);
        }
        let outcome = stop_and_settle(&mut self.handle, &self.timeouts);
        self.phases.push(HarnessPhase::TornDown);
        Teardown {
            outcome,
            phases: std::mem::take(&mut self.phases),
        }
    }
}

fn setup_failed(
    error: HarnessError,
    mut phases: Vec<HarnessPhase>,
    port: Option<u16>,
    stopped: Option<(u32, StopOutcome)>,
) -> Box<SetupFailure> {
    phases.push(HarnessPhase::Failed);
    phases.push(HarnessPhase::TornDown);
    let (pid, teardown) = match stopped {
        Some((pid, outcome)) => (Some(pid), Some(outcome)),
        None => (None, None),
    };
    Box::new(SetupFailure {
        error,
        port,
        pid,
        phases,
        teardown,
    })
}

fn stop_and_settle(handle: &mut ServerHandle, timeouts: &TimeoutConfig) -> StopOutcome {
    let outcome = handle.stop(timeouts.grace(), timeouts.kill());
    if outcome.is_cleanup_failure() {
        error!(pid = handle.pid(), "cleanup failure: server could not be killed");
    }
    let settle = timeouts.settle();
    if !settle.is_zero() {
        thread::sleep(settle);
    }
    outcome
}

/// Send one case and validate the answer.
pub fn run_cycle(
    client: &RoutingClient,
    endpoint: &Endpoint,
    case: &QueryCase,
) -> Result<RoutedResponse, HarnessError> {
    let response = client.send(endpoint, &case.payload)?;
    validate(&response.body, case).map_err(|source| HarnessError::Validation {
        case: case.name.clone(),
        source,
    })?;
    Ok(response)
}

/// Run every case against one shared server.
///
/// Skips everything without spawning when the credential gate is closed.
/// Setup failures fail every scenario with the setup error. Cycle failures
/// are recorded per scenario and do not stop later cycles.
pub fn run_suite(config: &HarnessConfig, cases: &[QueryCase]) -> SuiteReport {
    let started_at = Utc::now();
    let mut report = SuiteReport {
        started_at,
        port: None,
        pid: None,
        phases: vec![HarnessPhase::Idle],
        scenarios: Vec::new(),
        teardown: None,
        setup_error: None,
    };

    let decision = if config.gate.enabled {
        check_credential(&config.gate.credential_env)
    } else {
        GateDecision::Run
    };
    if let GateDecision::Skip { reason } = decision {
        info!("{reason}");
        report.scenarios = all_scenarios(cases)
            .map(|name| ScenarioReport {
                name,
                outcome: ScenarioOutcome::Skipped {
                    reason: reason.clone(),
                },
                elapsed_ms: 0,
            })
            .collect();
        return report;
    }

    let setup_started = Instant::now();
    let client = match RoutingClient::new(config.server.route.clone(), config.timeouts.request()) {
        Ok(client) => client,
        Err(err) => {
            report.phases.extend([HarnessPhase::Failed, HarnessPhase::TornDown]);
            return fail_setup(report, &err, cases, setup_started);
        }
    };
    let mut fixture = match ServerFixture::launch(config) {
        Ok(fixture) => fixture,
        Err(failure) => {
            let failure = *failure;
            report.port = failure.port;
            report.pid = failure.pid;
            report.phases = failure.phases;
            report.teardown = failure.teardown;
            return fail_setup(report, &failure.error, cases, setup_started);
        }
    };

    report.port = Some(fixture.endpoint().port);
    report.pid = Some(fixture.pid());
    report.scenarios.push(ScenarioReport {
        name: STARTUP_SCENARIO.to_string(),
        outcome: ScenarioOutcome::Passed,
        elapsed_ms: elapsed_ms(setup_started),
    });
    info!(port = fixture.endpoint().port, "server ready, running {} cases", cases.len());

    for (index, case) in cases.iter().enumerate() {
        fixture.begin_cycle(index);
        let started = Instant::now();
        let result = fixture
            .check_alive()
            .and_then(|()| run_cycle(&client, fixture.endpoint(), case));
        let outcome = match result {
            Ok(_) => {
                info!(case = %case.name, "scenario passed");
                ScenarioOutcome::Passed
            }
            Err(err) => {
                warn!(case = %case.name, "scenario failed: {err}");
                fixture.mark_failed();
                ScenarioOutcome::from_error(&err)
            }
        };
        report.scenarios.push(ScenarioReport {
            name: case.name.clone(),
            outcome,
            elapsed_ms: elapsed_ms(started),
        });
    }

    // Release pooled connections before the server goes away.
    drop(client);
    let teardown = fixture.teardown();
    report.phases = teardown.phases;
    report.teardown = Some(teardown.outcome);
    report
}

fn fail_setup(
    mut report: SuiteReport,
    err: &HarnessError,
    cases: &[QueryCase],
    setup_started: Instant,
) -> SuiteReport {
    warn!("suite setup failed: {err}");
    let outcome = ScenarioOutcome::from_error(err);
    report.setup_error = Some(err.to_string());
    report.scenarios = all_scenarios(cases)
        .map(|name| ScenarioReport {
            name,
            outcome: outcome.clone(),
            elapsed_ms: 0,
        })
        .collect();
    if let Some(startup) = report.scenarios.first_mut() {
        startup.elapsed_ms = elapsed_ms(setup_started);
    }
    report
}

fn all_scenarios(cases: &[QueryCase]) -> impl Iterator<Item = String> + '_ {
    std::iter::once(STARTUP_SCENARIO.to_string()).chain(cases.iter().map(|c| c.name.clone()))
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

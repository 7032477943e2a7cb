//! Core library for walker-harness.
//!
//! Boots a walker routing server on an ephemeral port, waits for it to accept
//! connections, drives its `/walker/Supervisor` endpoint with routing queries
//! and checks that each answer was produced by the expected agent.
//!
//! The pieces compose leaf-first:
//!
//! - [`port`] picks a free TCP port
//! - [`supervisor`] owns the child server process
//! - [`probe`] polls the port until it accepts connections
//! - [`client`] posts JSON queries to the routing endpoint
//! - [`validate`] checks response shape and agent attribution
//! - [`orchestrator`] ties them together with guaranteed teardown

pub mod client;
pub mod config;
pub mod error;
pub mod gate;
pub mod launch;
pub mod logging;
pub mod orchestrator;
pub mod port;
pub mod probe;
pub mod supervisor;
pub mod validate;

pub use client::{Endpoint, RoutedResponse, RoutingClient};
pub use config::{ConfigOverrides, HarnessConfig, resolve_config};
pub use error::HarnessError;
pub use gate::GateDecision;
pub use orchestrator::{
    HarnessPhase, ScenarioOutcome, ScenarioReport, ServerFixture, SuiteReport, run_cycle, run_suite,
};
pub use probe::{PortReady, ProbeTimeout, Prober};
pub use supervisor::{LaunchSpec, LifecycleState, ServerHandle, StopOutcome};
pub use validate::{Expectation, FieldRequirement, QueryCase, ReportExpectation, ValidationError};

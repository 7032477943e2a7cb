//! Run command implementation - the full suite against one server

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use tracing::debug;
use walker_harness_core::{ConfigOverrides, QueryCase, resolve_config, run_suite};

use super::report::print_report;

/// Start the server and run the routing scenarios
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Config file (default: walker-harness.toml searched upward)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding the walker entrypoint
    #[arg(long)]
    fixture_dir: Option<PathBuf>,

    /// Server executable
    #[arg(long)]
    program: Option<String>,

    /// Credential variable that gates the suite
    #[arg(long)]
    credential_env: Option<String>,

    /// Run only the named case (repeatable)
    #[arg(long = "case", value_name = "NAME")]
    cases: Vec<String>,

    /// Run even when the credential is missing
    #[arg(long)]
    no_gate: bool,

    /// Discard server stdout/stderr
    #[arg(long)]
    quiet_server: bool,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

/// Execute the run command
pub fn execute(args: RunArgs) -> Result<()> {
    let current_dir = std::env::current_dir()?;

    let overrides = ConfigOverrides {
        config_path: args.config.clone(),
        fixture_dir: args.fixture_dir.clone(),
        program: args.program.clone(),
        credential_env: args.credential_env.clone(),
        host: None,
        inherit_output: args.quiet_server.then_some(false),
    };
    let mut config =
        resolve_config(&overrides, &current_dir).context("failed to resolve configuration")?;
    if args.no_gate {
        config.gate.enabled = false;
    }

    let cases = select_cases(config.query_cases()?, &args.cases)?;
    debug!(
        program = %config.server.program,
        fixture_dir = %config.server.fixture_dir.display(),
        cases = cases.len(),
        gate = config.gate.enabled,
        "resolved run configuration"
    );
    let report = run_suite(&config, &cases);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if !report.is_success() {
        anyhow::bail!(
            "{} of {} scenarios failed",
            report.failed(),
            report.scenarios.len()
        );
    }
    Ok(())
}

/// Keep only the requested cases, in catalogue order.
fn select_cases(all: Vec<QueryCase>, names: &[String]) -> Result<Vec<QueryCase>> {
    if names.is_empty() {
        return Ok(all);
    }
    if let Some(unknown) = names.iter().find(|n| !all.iter().any(|c| &c.name == *n)) {
        let available: Vec<&str> = all.iter().map(|c| c.name.as_str()).collect();
        anyhow::bail!(
            "Unknown case '{unknown}' (available: {})",
            available.join(", ")
        );
    }
    Ok(all.into_iter().filter(|c| names.contains(&c.name)).collect())
}

//! Query command implementation - one routed request against a running server

use anyhow::{Context, Result};
use clap::Args;
use serde_json::json;
use std::time::Duration;
use tracing::debug;
use walker_harness_core::client::DEFAULT_ROUTE;
use walker_harness_core::validate::{DEFAULT_HANDLER_FIELD, validate};
use walker_harness_core::{Endpoint, FieldRequirement, HarnessError, QueryCase, RoutingClient};

/// Send one query to an already running server
#[derive(Args, Debug)]
pub struct QueryArgs {
    /// Server port
    #[arg(long)]
    port: u16,

    /// Query text, sent as {"query": TEXT}
    #[arg(long)]
    text: String,

    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    #[arg(long, default_value = DEFAULT_ROUTE)]
    route: String,

    /// Agent expected to answer; enables validation
    #[arg(long)]
    handler: Option<String>,

    /// Report field naming the answering agent
    #[arg(long, default_value = DEFAULT_HANDLER_FIELD)]
    handler_field: String,

    /// Field the report must carry with a non-empty value (repeatable)
    #[arg(long = "field", value_name = "NAME")]
    fields: Vec<String>,

    /// Reject answers without a `reports` array
    #[arg(long)]
    require_reports: bool,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 90)]
    timeout: u64,
}

/// Execute the query command
pub fn execute(args: QueryArgs) -> Result<()> {
    let client = RoutingClient::new(args.route.clone(), Duration::from_secs(args.timeout))?;
    let endpoint = Endpoint::new(args.host.clone(), args.port);
    let case = build_case(&args);

    debug!(url = %endpoint.url(client.route()), expect = ?case.expect, "sending query");
    let response = client.send(&endpoint, &case.payload)?;
    println!(
        "{}",
        serde_json::to_string_pretty(&response.body).context("failed to render response")?
    );

    validate(&response.body, &case).map_err(|source| HarnessError::Validation {
        case: case.name.clone(),
        source,
    })?;
    Ok(())
}

fn build_case(args: &QueryArgs) -> QueryCase {
    let Some(handler) = &args.handler else {
        return QueryCase::any_answer("query", json!({ "query": args.text }));
    };
    let mut case = QueryCase::routed("query", &args.text, handler.clone());
    if let walker_harness_core::Expectation::Report(report) = &mut case.expect {
        report.handler_field = args.handler_field.clone();
    }
    for field in &args.fields {
        case = case.with_field(FieldRequirement::non_empty(field.clone()));
    }
    if args.require_reports {
        case = case.requiring_reports();
    }
    case
}

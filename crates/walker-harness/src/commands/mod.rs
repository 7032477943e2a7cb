//! CLI command dispatch and execution

use anyhow::Result;
use clap::{Parser, Subcommand};

mod free_port;
mod query;
mod report;
mod run;
mod wait_port;

/// walker-harness - integration harness for walker routing servers
#[derive(Parser, Debug)]
#[command(
    name = "walker-harness",
    version,
    about = "Integration harness for walker routing servers",
    long_about = "Boots a walker server on an ephemeral port, waits for readiness and \
                  validates that routing queries reach the expected agents"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the server and run the routing scenarios
    Run(run::RunArgs),

    /// Print a free TCP port
    FreePort(free_port::FreePortArgs),

    /// Wait until a port accepts connections
    WaitPort(wait_port::WaitPortArgs),

    /// Send one query to an already running server
    Query(query::QueryArgs),
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> Result<()> {
        walker_harness_core::logging::init();

        match self.command {
            Commands::Run(args) => run::execute(args),
            Commands::FreePort(args) => free_port::execute(args),
            Commands::WaitPort(args) => wait_port::execute(args),
            Commands::Query(args) => query::execute(args),
        }
    }
}

//! walker-harness - boot a walker routing server and check its agent routing
//!
//! Starts the server on a free port, waits for it to accept connections,
//! sends routing queries to `/walker/Supervisor` and reports which agent
//! answered each one.

use clap::Parser;

mod commands;

use commands::Cli;

fn main() {
    let cli = Cli::parse();

    if let Err(e) = cli.execute() {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

//! Free-port command implementation

use anyhow::Result;
use clap::Args;
use walker_harness_core::port::{ANY_INTERFACE, allocate_port};

/// Print a free TCP port
#[derive(Args, Debug)]
pub struct FreePortArgs {
    /// Interface to allocate on
    #[arg(long, default_value = ANY_INTERFACE)]
    host: String,
}

/// Execute the free-port command
pub fn execute(args: FreePortArgs) -> Result<()> {
    let port = allocate_port(&args.host)?;
    println!("{port}");
    Ok(())
}

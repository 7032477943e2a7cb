//! Wait-port command implementation

use anyhow::Result;
use clap::Args;
use std::time::Duration;
use walker_harness_core::probe::DEFAULT_ATTEMPT_TIMEOUT;
use walker_harness_core::{HarnessError, Prober};

/// Wait until a port accepts connections
#[derive(Args, Debug)]
pub struct WaitPortArgs {
    /// Port to probe
    #[arg(long)]
    port: u16,

    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Overall deadline in seconds
    #[arg(long, default_value_t = 60)]
    timeout: u64,

    /// Delay between attempts in milliseconds
    #[arg(long, default_value_t = 500)]
    interval_ms: u64,
}

/// Execute the wait-port command
pub fn execute(args: WaitPortArgs) -> Result<()> {
    let prober = Prober::new(DEFAULT_ATTEMPT_TIMEOUT, Duration::from_millis(args.interval_ms));
    match prober.wait_for_port(&args.host, args.port, Duration::from_secs(args.timeout)) {
        Ok(ready) => {
            println!(
                "{}:{} ready after {:?} ({} attempts)",
                ready.host, ready.port, ready.waited, ready.attempts
            );
            Ok(())
        }
        Err(timeout) => Err(HarnessError::from(timeout).into()),
    }
}

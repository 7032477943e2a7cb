//! Human-readable suite report

use walker_harness_core::{ScenarioOutcome, StopOutcome, SuiteReport};

pub fn print_report(report: &SuiteReport) {
    print!("{}", render(report));
}

fn render(report: &SuiteReport) -> String {
    let mut out = format!(
        "Walker harness run started {}\n",
        report.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    if let Some(port) = report.port {
        match report.pid {
            Some(pid) => out.push_str(&format!("Server: port {port}, pid {pid}\n")),
            None => out.push_str(&format!("Server: port {port}\n")),
        }
    }
    out.push('\n');

    for scenario in &report.scenarios {
        let line = match &scenario.outcome {
            ScenarioOutcome::Passed => {
                format!("  PASS  {} ({} ms)", scenario.name, scenario.elapsed_ms)
            }
            ScenarioOutcome::Failed { reason, .. } => {
                format!("  FAIL  {} ({} ms)\n        {}", scenario.name, scenario.elapsed_ms, indent(reason))
            }
            ScenarioOutcome::Skipped { reason } => format!("  SKIP  {}: {reason}", scenario.name),
        };
        out.push_str(&line);
        out.push('\n');
    }

    if let Some(teardown) = &report.teardown {
        out.push_str(&format!("\nTeardown: {}\n", describe_teardown(teardown)));
    }
    out.push_str(&format!(
        "\n{} passed, {} failed, {} skipped\n",
        report.passed(),
        report.failed(),
        report.skipped()
    ));
    out
}

fn indent(text: &str) -> String {
    text.replace('\n', "\n        ")
}

fn describe_teardown(outcome: &StopOutcome) -> String {
    match outcome {
        StopOutcome::AlreadyExited { code } => format!("server had already exited ({code:?})"),
        StopOutcome::Graceful { .. } => "stopped after SIGTERM".to_string(),
        StopOutcome::Killed { .. } => "killed after ignoring SIGTERM".to_string(),
        StopOutcome::AlreadyStopped => "already stopped".to_string(),
        StopOutcome::Unkillable { pid } => {
            format!("CLEANUP FAILURE: pid {pid} survived SIGKILL")
        }
    }
}

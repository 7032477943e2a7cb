//! Credential gating.
//!
//! The walker fixture calls an LLM provider, so the suite only runs when the
//! provider credential is present. A missing credential skips every
//! scenario; it is never a failure.

/// Credential checked when none is configured.
pub const DEFAULT_CREDENTIAL_ENV: &str = "OPENAI_API_KEY";

/// Whether the suite may run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Run,
    Skip { reason: String },
}

impl GateDecision {
    pub fn is_run(&self) -> bool {
        matches!(self, Self::Run)
    }
}

/// Check the process environment for a non-empty `var`.
pub fn check_credential(var: &str) -> GateDecision {
    check_with(var, |name| std::env::var(name).ok())
}

/// Same as [`check_credential`] with an injectable lookup.
pub fn check_with(var: &str, lookup: impl Fn(&str) -> Option<String>) -> GateDecision {
    match lookup(var) {
        Some(value) if !value.is_empty() => GateDecision::Run,
        _ => GateDecision::Skip {
            reason: format!(
                "{var} not set - skipping walker scenarios. Set the environment variable to run them."
            ),
        },
    }
}

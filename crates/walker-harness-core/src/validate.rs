//! Response validation for routed queries.
//!
//! The walker server answers in one of two shapes:
//!
//! ```json
//! {"reports": [{"agent": "MathAgent", "response": "35"}]}
//! ```
//!
//! or any other non-empty JSON value. Which checks apply is declared per
//! [`QueryCase`] through its [`Expectation`]; the validator never guesses a
//! schema from the payload.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

/// Attribution field carried by each report.
pub const DEFAULT_HANDLER_FIELD: &str = "agent";

fn default_handler_field() -> String {
    DEFAULT_HANDLER_FIELD.to_string()
}

fn default_true() -> bool {
    true
}

/// A field the first report must carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRequirement {
    pub name: String,
    /// Also require non-zero length
    #[serde(default = "default_true")]
    pub non_empty: bool,
}

impl FieldRequirement {
    pub fn non_empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            non_empty: true,
        }
    }

    pub fn present(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            non_empty: false,
        }
    }
}

/// Checks applied when the body is a `reports` envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportExpectation {
    #[serde(default = "default_handler_field")]
    pub handler_field: String,
    /// Agent expected to have answered
    pub handler: String,
    #[serde(default)]
    pub fields: Vec<FieldRequirement>,
    /// Reject fallback-shaped bodies instead of accepting any non-empty value
    #[serde(default)]
    pub require_reports: bool,
}

/// Declared response schema for a case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "schema", rename_all = "snake_case")]
pub enum Expectation {
    /// `reports` envelope attributed to a specific handler
    Report(ReportExpectation),
    /// Any non-empty body
    NonEmpty,
}

/// One routed query and what its answer must look like.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryCase {
    pub name: String,
    pub payload: Value,
    pub expect: Expectation,
}

impl QueryCase {
    /// `{"query": <query>}` expected to be answered by `handler`.
    pub fn routed(name: impl Into<String>, query: &str, handler: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            payload: json!({ "query": query }),
            expect: Expectation::Report(ReportExpectation {
                handler_field: default_handler_field(),
                handler: handler.into(),
                fields: Vec::new(),
                require_reports: false,
            }),
        }
    }

    /// Case that only requires some non-empty answer.
    pub fn any_answer(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            payload,
            expect: Expectation::NonEmpty,
        }
    }

    /// Add a field requirement. Ignored for [`Expectation::NonEmpty`].
    pub fn with_field(mut self, field: FieldRequirement) -> Self {
        if let Expectation::Report(ref mut report) = self.expect {
            report.fields.push(field);
        }
        self
    }

    pub fn requiring_reports(mut self) -> Self {
        if let Expectation::Report(ref mut report) = self.expect {
            report.require_reports = true;
        }
        self
    }

    /// The `query` text of the payload, when there is one.
    pub fn query_text(&self) -> Option<&str> {
        self.payload.get("query").and_then(Value::as_str)
    }
}

/// The three routing checks the walker fixture is expected to pass.
pub fn default_cases() -> Vec<QueryCase> {
    vec![
        QueryCase::routed(
            "concept_agent",
            "Explain machine learning in simple terms",
            "ConceptAgent",
        )
        .with_field(FieldRequirement::non_empty("response")),
        QueryCase::routed("math_agent", "What is (15 + 5) * 2 - (10 / 2)?", "MathAgent")
            .with_field(FieldRequirement::non_empty("response")),
        QueryCase::routed(
            "research_agent",
            "Compare supervised fine-tuning and prompt engineering in large language models",
            "ResearchAgent",
        )
        .with_field(FieldRequirement::non_empty("summary")),
    ]
}

/// Why a well-formed response was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("`reports` must be an array, got {found}")]
    ReportsNotArray { found: &'static str },

    #[error("`reports` is empty; expected at least one report")]
    EmptyReports,

    #[error("first report must be an object, got {found}")]
    ReportNotObject { found: &'static str },

    #[error("expected {expected}, got {} (field `{field}`)", .actual.as_deref().unwrap_or("<missing>"))]
    HandlerMismatch {
        field: String,
        expected: String,
        actual: Option<String>,
    },

    #[error("{handler} report is missing field `{field}`")]
    MissingField { handler: String, field: String },

    #[error("{handler} report field `{field}` is empty")]
    EmptyField { handler: String, field: String },

    #[error("{handler} report field `{field}` is {found}, which has no length")]
    UnmeasurableField {
        handler: String,
        field: String,
        found: &'static str,
    },

    #[error("expected a `reports` envelope from {handler}, got a body without one")]
    MissingReports { handler: String },

    #[error("response body is empty ({found})")]
    EmptyBody { found: &'static str },
}

/// Check `body` against the expectation declared by `case`.
pub fn validate(body: &Value, case: &QueryCase) -> Result<(), ValidationError> {
    match body.get("reports") {
        Some(reports) => {
            let first = first_report(reports)?;
            match &case.expect {
                Expectation::Report(expect) => check_report(first, expect),
                Expectation::NonEmpty => Ok(()),
            }
        }
        None => {
            if let Expectation::Report(expect) = &case.expect {
                if expect.require_reports {
                    return Err(ValidationError::MissingReports {
                        handler: expect.handler.clone(),
                    });
                }
            }
            match measure(body) {
                Length::NonEmpty => Ok(()),
                Length::Empty | Length::Unmeasurable => Err(ValidationError::EmptyBody {
                    found: kind_of(body),
                }),
            }
        }
    }
}

fn first_report(reports: &Value) -> Result<&serde_json::Map<String, Value>, ValidationError> {
    let list = reports
        .as_array()
        .ok_or(ValidationError::ReportsNotArray {
            found: kind_of(reports),
        })?;
    let first = list.first().ok_or(ValidationError::EmptyReports)?;
    first.as_object().ok_or(ValidationError::ReportNotObject {
        found: kind_of(first),
    })
}

fn check_report(
    report: &serde_json::Map<String, Value>,
    expect: &ReportExpectation,
) -> Result<(), ValidationError> {
    let actual = report.get(&expect.handler_field);
    if actual.and_then(Value::as_str) != Some(expect.handler.as_str()) {
        return Err(ValidationError::HandlerMismatch {
            field: expect.handler_field.clone(),
            expected: expect.handler.clone(),
            actual: actual.map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            }),
        });
    }

    for field in &expect.fields {
        let value = report
            .get(&field.name)
            .ok_or_else(|| ValidationError::MissingField {
                handler: expect.handler.clone(),
                field: field.name.clone(),
            })?;
        if !field.non_empty {
            continue;
        }
        match measure(value) {
            Length::NonEmpty => {}
            Length::Empty => {
                return Err(ValidationError::EmptyField {
                    handler: expect.handler.clone(),
                    field: field.name.clone(),
                });
            }
            Length::Unmeasurable => {
                return Err(ValidationError::UnmeasurableField {
                    handler: expect.handler.clone(),
                    field: field.name.clone(),
                    found: kind_of(value),
                });
            }
        }
    }
    Ok(())
}

enum Length {
    Empty,
    NonEmpty,
    /// Numbers and booleans
    Unmeasurable,
}

fn measure(value: &Value) -> Length {
    let len = match value {
        Value::Null => 0,
        Value::String(s) => s.len(),
        Value::Array(a) => a.len(),
        Value::Object(o) => o.len(),
        Value::Bool(_) | Value::Number(_) => return Length::Unmeasurable,
    };
    if len == 0 { Length::Empty } else { Length::NonEmpty }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

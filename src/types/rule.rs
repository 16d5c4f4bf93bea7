use std::fmt;

use super::error::{EvaluationError, RuleValidationError};
use super::expr::CompiledExpr;
use super::{Context, Value};

/// A rule as written in the configuration tree: a literal boolean or an
/// expression string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleSource {
    Bool(bool),
    Expression(String),
}

impl RuleSource {
    #[must_use]
    pub fn as_expression(&self) -> Option<&str> {
        match self {
            RuleSource::Bool(_) => None,
            RuleSource::Expression(source) => Some(source),
        }
    }
}

impl TryFrom<&serde_json::Value> for RuleSource {
    type Error = RuleValidationError;

    fn try_from(value: &serde_json::Value) -> Result<Self, Self::Error> {
        match value {
            serde_json::Value::Bool(b) => Ok(RuleSource::Bool(*b)),
            serde_json::Value::String(s) => Ok(RuleSource::Expression(s.clone())),
            _ => Err(RuleValidationError::NotAString),
        }
    }
}

impl From<bool> for RuleSource {
    fn from(b: bool) -> Self {
        RuleSource::Bool(b)
    }
}

impl From<&str> for RuleSource {
    fn from(s: &str) -> Self {
        RuleSource::Expression(s.to_owned())
    }
}

impl fmt::Display for RuleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleSource::Bool(b) => write!(f, "{b}"),
            RuleSource::Expression(source) => write!(f, "{source}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Predicate {
    Constant(bool),
    Expression(CompiledExpr),
}

/// Executable form of one rule plus the data it needs.
///
/// Produced by [`compile`](crate::compile()). Evaluation is pure, so a run
/// can be repeated once more records are loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledRule {
    pub(crate) source: String,
    pub(crate) predicate: Predicate,
    pub(crate) has_data: bool,
    pub(crate) has_old_data: bool,
    pub(crate) locals: usize,
}

impl CompiledRule {
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Whether the rule reads `data`.
    #[must_use]
    pub fn has_data(&self) -> bool {
        self.has_data
    }

    /// Whether the rule reads `oldData`.
    #[must_use]
    pub fn has_old_data(&self) -> bool {
        self.has_old_data
    }

    /// The fixed outcome of a rule with no free inputs, e.g. `"true"`.
    #[must_use]
    pub fn constant(&self) -> Option<bool> {
        match self.predicate {
            Predicate::Constant(b) => Some(b),
            Predicate::Expression(_) => None,
        }
    }

    /// Run the predicate once against `ctx`.
    #[must_use]
    pub fn evaluate(&self, ctx: &Context) -> Evaluation {
        match &self.predicate {
            Predicate::Constant(b) => Evaluation::Done(Value::Bool(*b)),
            Predicate::Expression(expr) => crate::evaluate::evaluate(expr, ctx, self.locals),
        }
    }
}

/// Outcome of a single rule run.
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    /// Every referenced record was available; the raw result value.
    Done(Value),
    /// These records were referenced but not loaded. The result of this run
    /// is meaningless and the rule has to run again once they are.
    NeedsRecords(Vec<String>),
    /// The run failed with every referenced record available.
    Failed(EvaluationError),
}

impl Evaluation {
    /// `Some(allowed)` for a finished run.
    #[must_use]
    pub fn allowed(&self) -> Option<bool> {
        match self {
            Evaluation::Done(value) => Some(value.truthy()),
            Evaluation::NeedsRecords(_) | Evaluation::Failed(_) => None,
        }
    }
}

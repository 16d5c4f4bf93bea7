use thiserror::Error;

use crate::parse::ParseError;

/// Static rejection of operator-authored rule text.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuleValidationError {
    #[error("rule must be a string")]
    NotAString,

    #[error("rule can't be empty")]
    Empty,

    #[error("rule can't contain the new keyword")]
    NewKeyword,

    #[error("rule can't contain user functions")]
    UserFunction,

    #[error("function {name} is not supported")]
    UnsupportedFunction { name: String },

    #[error(transparent)]
    Syntax(#[from] ParseError),

    #[error("rule {rule_type} for {section} does not support oldData")]
    OldDataNotSupported { section: String, rule_type: String },

    #[error("rule {rule_type} for {section} does not support data")]
    DataNotSupported { section: String, rule_type: String },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    #[error(transparent)]
    Syntax(#[from] ParseError),

    #[error("ReferenceError: {name} is not defined")]
    UndefinedIdentifier { name: String },

    #[error("function {callee} is not supported")]
    UnsupportedCall { callee: String },

    #[error("function {function} expects {expected} argument(s), got {found}")]
    Arity {
        function: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("can't assign to {target}")]
    InvalidAssignment { target: String },

    #[error("cross reference function _ can only be called")]
    BareCrossReference,
}

/// Raised while a compiled predicate runs. Always turns into a denial.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvaluationError {
    #[error("TypeError: Cannot read property '{property}' of {target}")]
    NullishProperty {
        property: String,
        target: &'static str,
    },

    #[error("TypeError: {receiver}.{method} is not a function")]
    NotAFunction {
        method: &'static str,
        receiver: &'static str,
    },

    #[error("crossreference got unsupported type {found}")]
    CrossReferenceType { found: &'static str },

    #[error("SyntaxError: Invalid regular expression /{pattern}/: {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

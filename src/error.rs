use std::time::Duration;

use thiserror::Error;

use crate::path::PathError;
use crate::store::StorageError;
use crate::{Action, CompileError, EvaluationError, RuleType, RuleValidationError, Section, Topic};

/// Why a decision could not be reached. Any `ValveError` means the action
/// is denied.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValveError {
    #[error("no permission rule type for {action} messages on topic {topic}")]
    UnmappedAction { topic: Topic, action: Action },

    #[error(transparent)]
    RuleValidation(#[from] RuleValidationError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error("Exceeded max iteration count")]
    IterationLimit,

    #[error("error when executing {rule} for {name}: {source}")]
    Evaluation {
        name: String,
        rule: String,
        #[source]
        source: EvaluationError,
    },

    #[error("failed to load record {record} for permissioning: {source}")]
    DependencyFetch {
        record: String,
        #[source]
        source: StorageError,
    },

    #[error("error when converting message data {reason}")]
    MessageData { reason: String },

    #[error("permission evaluation timed out after {after:?}")]
    Timeout { after: Duration },
}

/// A rule configuration or set of options that can't be used. Fatal at
/// startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config should be an object literal, but was of type {found}")]
    NotAnObject { found: &'static str },

    #[error("missing configuration section \"{section}\"")]
    MissingSection { section: Section },

    #[error("unexpected configuration section \"{section}\"")]
    UnexpectedSection { section: String },

    #[error("section \"{section}\" should be an object literal, but was of type {found}")]
    SectionNotAnObject {
        section: Section,
        found: &'static str,
    },

    #[error("empty section \"{section}\"")]
    EmptySection { section: Section },

    #[error("missing root entry \"*\" for section {section}")]
    MissingRootEntry { section: Section },

    #[error("{source} for path {path} in section {section}")]
    InvalidPath {
        path: String,
        section: Section,
        #[source]
        source: PathError,
    },

    #[error("path {path} in section {section} must map rule types to rules")]
    NotARuleMap { path: String, section: Section },

    #[error("unknown rule type {rule_type} in section {section}")]
    UnknownRuleType { rule_type: String, section: Section },

    #[error(transparent)]
    InvalidRule(#[from] RuleValidationError),

    #[error("{source} in rule {rule_type} for path {path} in section {section}")]
    Compile {
        path: String,
        section: Section,
        rule_type: RuleType,
        #[source]
        source: CompileError,
    },

    #[error("Maximum rule iteration has to be at least one")]
    MaxRuleIterations,

    #[error("cache evacuation interval has to be at least one millisecond")]
    CacheEvacuationInterval,

    #[error("invalid config json: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

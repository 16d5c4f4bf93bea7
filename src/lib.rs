mod cache;
mod compile;
mod config;
mod error;
mod evaluate;
pub mod parse;
mod path;
mod rules_map;
mod store;
mod types;
mod validate;
mod valve;

pub use cache::{CachedRule, RuleCache};
pub use compile::compile;
pub use config::{PathRules, ValveConfig, ValveOptions, ROOT_PATH};
pub use error::{ConfigError, ValveError};
pub use path::{PathError, PathTemplate};
pub use rules_map::{rule_specification, RuleSpecification, RuleType, Section};
pub use store::{MemoryStore, RecordStore, StorageError, StoredRecord};
pub use types::{
    Action, BinaryOp, CompileError, CompiledRule, Context, Evaluation, EvaluationError, Expr,
    Message, Property, RuleSource, RuleValidationError, Topic, UnaryOp, Value, OPEN_USER,
};
pub use validate::{validate, validate_value};
pub use valve::PermissionValve;

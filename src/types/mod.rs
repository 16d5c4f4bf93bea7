mod context;
mod error;
mod expr;
mod message;
mod rule;
mod value;

pub use context::{Context, OPEN_USER};
pub use error::{CompileError, EvaluationError, RuleValidationError};
pub use expr::{BinaryOp, Expr, Property, UnaryOp};
pub use message::{Action, Message, Topic};
pub use rule::{CompiledRule, Evaluation, RuleSource};
pub use value::Value;

pub(crate) use expr::{Builtin, CompiledExpr, CompiledProperty, Method};
pub(crate) use rule::Predicate;

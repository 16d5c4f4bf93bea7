use once_cell::sync::Lazy;
use regex::Regex;

use crate::parse::parse;
use crate::{Expr, RuleSource, RuleType, RuleValidationError, Section};

static NEW_KEYWORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|[^\w$])new(?:$|[^\w$])").expect("new keyword pattern is valid"));

static USER_FUNCTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|[^\w$])function(?:$|[^\w$])|=>").expect("user function pattern is valid")
});

// Lexical callee extraction: the word right before `(`, plus a closing
// quote and bracket for `x['name'](`
static FUNCTION_CALL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(\w+(?:['"`]\])?)\s*\("#).expect("function call pattern is valid"));

const SUPPORTED_FUNCTIONS: [&str; 9] = [
    "_",
    "startsWith",
    "endsWith",
    "includes",
    "indexOf",
    "match",
    "toUpperCase",
    "toLowerCase",
    "trim",
];

/// Statically check a rule before it is ever compiled.
///
/// Boolean rules always pass.
///
/// # Errors
///
/// The first failed check, in order: empty source, the `new` keyword, user
/// function literals, calls to anything outside the supported functions,
/// syntax errors, then `data`/`oldData` references the rule type can't see.
pub fn validate(
    rule: &RuleSource,
    section: Section,
    rule_type: RuleType,
) -> Result<(), RuleValidationError> {
    match rule {
        RuleSource::Bool(_) => Ok(()),
        RuleSource::Expression(source) => check(source, section, rule_type).map(|_| ()),
    }
}

/// [`validate`] for a rule that arrived as arbitrary JSON.
///
/// # Errors
///
/// [`RuleValidationError::NotAString`] for anything but a string or boolean,
/// otherwise as [`validate`].
pub fn validate_value(
    rule: &serde_json::Value,
    section: Section,
    rule_type: RuleType,
) -> Result<(), RuleValidationError> {
    validate(&RuleSource::try_from(rule)?, section, rule_type)
}

/// Validate `source` and hand back the parse tree for compilation.
pub(crate) fn check(
    source: &str,
    section: Section,
    rule_type: RuleType,
) -> Result<Expr, RuleValidationError> {
    if source.trim().is_empty() {
        return Err(RuleValidationError::Empty);
    }
    if NEW_KEYWORD.is_match(source) {
        return Err(RuleValidationError::NewKeyword);
    }
    if USER_FUNCTION.is_match(source) {
        return Err(RuleValidationError::UserFunction);
    }
    for call in FUNCTION_CALL.captures_iter(source) {
        let name = &call[1];
        if !SUPPORTED_FUNCTIONS.contains(&name) {
            return Err(RuleValidationError::UnsupportedFunction {
                name: name.to_owned(),
            });
        }
    }

    let expr = parse(source)?;

    if expr.references("oldData") && !rule_type.supports_old_data() {
        return Err(RuleValidationError::OldDataNotSupported {
            section: section.to_string(),
            rule_type: rule_type.to_string(),
        });
    }
    if expr.references("data") && !rule_type.supports_data() {
        return Err(RuleValidationError::DataNotSupported {
            section: section.to_string(),
            rule_type: rule_type.to_string(),
        });
    }

    Ok(expr)
}

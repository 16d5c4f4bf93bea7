mod error;
mod grammar;

pub use error::ParseError;

use crate::Expr;

/// Parse rule source into an [`Expr`] tree.
///
/// # Errors
///
/// Returns [`ParseError`] if the input is not a single well-formed expression.
pub fn parse(input: &str) -> Result<Expr, ParseError> {
    use winnow::Parser;
    grammar::rule.parse(grammar::input(input)).map_err(|e| {
        let offset = e.offset();
        let message = match e.input().state.exceeded {
            Some(grammar::Limit::Nesting) => format!(
                "Expression nested more than {} levels deep",
                grammar::MAX_NESTING
            ),
            Some(grammar::Limit::Nodes) => format!(
                "Expression has more than {} operations",
                grammar::MAX_NODES
            ),
            None => match input.get(offset..).and_then(|rest| rest.chars().next()) {
                Some(token) => format!("Unexpected token '{token}'"),
                None => "Unexpected end of input".to_owned(),
            },
        };
        ParseError::new(message, offset)
    })
}

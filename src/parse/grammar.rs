use winnow::combinator::{alt, cut_err, delimited, not, opt, preceded, repeat, separated, terminated};
use winnow::error::{ContextError, ErrMode, ModalResult, StrContext, StrContextValue};
use winnow::prelude::*;
use winnow::stream::Stateful;
use winnow::token::{any, one_of, take_while};

use crate::{BinaryOp, Expr, Property, UnaryOp, Value};

/// Deepest run of nested groups, operands and arguments a rule may contain.
pub(crate) const MAX_NESTING: usize = 64;
/// Most operator, member, call, array and assignment nodes one rule may build.
pub(crate) const MAX_NODES: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Limit {
    Nesting,
    Nodes,
}

/// Parser bookkeeping. `nesting` tracks the current recursion depth and
/// `nodes` only grows, so every built tree is at most `MAX_NODES` deep.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Limits {
    nesting: usize,
    nodes: usize,
    pub(crate) exceeded: Option<Limit>,
}

pub(crate) type Input<'i> = Stateful<&'i str, Limits>;

pub(crate) fn input(source: &str) -> Input<'_> {
    Stateful {
        input: source,
        state: Limits::default(),
    }
}

fn exceed<O>(input: &mut Input<'_>, limit: Limit) -> ModalResult<O> {
    input.state.exceeded = Some(limit);
    Err(ErrMode::from_input(input).cut())
}

/// Run `parser` one recursion level deeper.
fn nested<'i, O>(
    input: &mut Input<'i>,
    mut parser: impl Parser<Input<'i>, O, ErrMode<ContextError>>,
) -> ModalResult<O> {
    if input.state.nesting >= MAX_NESTING {
        return exceed(input, Limit::Nesting);
    }
    input.state.nesting += 1;
    let result = parser.parse_next(input);
    input.state.nesting -= 1;
    result
}

/// Account for `count` new tree nodes.
fn grow(input: &mut Input<'_>, count: usize) -> ModalResult<()> {
    input.state.nodes = input.state.nodes.saturating_add(count);
    if input.state.nodes > MAX_NODES {
        return exceed(input, Limit::Nodes);
    }
    Ok(())
}

// -- Whitespace -------------------------------------------------------------

fn ws(input: &mut Input<'_>) -> ModalResult<()> {
    take_while(0.., |c: char| c.is_whitespace())
        .void()
        .parse_next(input)
}

// -- Identifiers ------------------------------------------------------------

fn identifier<'i>(input: &mut Input<'i>) -> ModalResult<&'i str> {
    (
        one_of(|c: char| c.is_ascii_alphabetic() || c == '_' || c == '$'),
        take_while(0.., |c: char| c.is_ascii_alphanumeric() || c == '_' || c == '$'),
    )
        .take()
        .parse_next(input)
}

fn is_literal_keyword(name: &str) -> bool {
    matches!(name, "true" | "false" | "null" | "undefined")
}

fn name_or_keyword(input: &mut Input<'_>) -> ModalResult<Expr> {
    identifier
        .map(|name: &str| match name {
            "true" => Expr::Literal(Value::Bool(true)),
            "false" => Expr::Literal(Value::Bool(false)),
            "null" => Expr::Literal(Value::Null),
            "undefined" => Expr::Literal(Value::Undefined),
            _ => Expr::Ident(name.to_owned()),
        })
        .parse_next(input)
}

// -- Literals ---------------------------------------------------------------

fn digits<'i>(input: &mut Input<'i>) -> ModalResult<&'i str> {
    take_while(1.., |c: char| c.is_ascii_digit()).parse_next(input)
}

fn exponent(input: &mut Input<'_>) -> ModalResult<()> {
    (one_of(['e', 'E']), opt(one_of(['+', '-'])), digits)
        .void()
        .parse_next(input)
}

fn number(input: &mut Input<'_>) -> ModalResult<f64> {
    alt((
        (digits, opt(('.', opt(digits))), opt(exponent)).take(),
        ('.', digits, opt(exponent)).take(),
    ))
    .try_map(|s: &str| s.parse::<f64>())
    .parse_next(input)
}

fn unicode_escape(input: &mut Input<'_>) -> ModalResult<char> {
    let hex = take_while(4, |c: char| c.is_ascii_hexdigit()).parse_next(input)?;
    u32::from_str_radix(hex, 16)
        .ok()
        .and_then(char::from_u32)
        .ok_or_else(|| ErrMode::from_input(input).cut())
}

fn string_literal(input: &mut Input<'_>) -> ModalResult<String> {
    let quote = one_of(['\'', '"', '`']).parse_next(input)?;
    let mut s = String::new();
    loop {
        let ch = cut_err(any).parse_next(input)?;
        match ch {
            c if c == quote => return Ok(s),
            '\\' => {
                let esc = cut_err(any).parse_next(input)?;
                match esc {
                    'n' => s.push('\n'),
                    't' => s.push('\t'),
                    'r' => s.push('\r'),
                    'b' => s.push('\u{8}'),
                    'f' => s.push('\u{c}'),
                    'v' => s.push('\u{b}'),
                    '0' => s.push('\0'),
                    'u' => s.push(cut_err(unicode_escape).parse_next(input)?),
                    other => s.push(other),
                }
            }
            c => s.push(c),
        }
    }
}

fn array_literal(input: &mut Input<'_>) -> ModalResult<Expr> {
    '['.parse_next(input)?;
    let items: Vec<Expr> = nested(input, separated(0.., assignment, (ws, ',')))?;
    let _ = opt((ws, ',')).parse_next(input)?;
    cut_err((ws, ']')).parse_next(input)?;
    grow(input, 1)?;
    Ok(Expr::Array(items))
}

// -- Expressions ------------------------------------------------------------
//
// Lowest to highest: assignment, conditional, ||, &&, equality, relational,
// additive, multiplicative, unary, postfix, primary.

fn primary(input: &mut Input<'_>) -> ModalResult<Expr> {
    ws.parse_next(input)?;
    alt((
        number.map(|n| Expr::Literal(Value::Number(n))),
        string_literal.map(|s| Expr::Literal(Value::String(s))),
        array_literal,
        delimited('(', cut_err(group), cut_err((ws, ')'))),
        name_or_keyword,
    ))
    .context(StrContext::Expected(StrContextValue::Description(
        "expression",
    )))
    .parse_next(input)
}

fn group(input: &mut Input<'_>) -> ModalResult<Expr> {
    nested(input, assignment)
}

fn call_arguments(input: &mut Input<'_>) -> ModalResult<Vec<Expr>> {
    let args: Vec<Expr> = nested(input, separated(0.., assignment, (ws, ',')))?;
    cut_err((ws, ')')).parse_next(input)?;
    Ok(args)
}

fn postfix(input: &mut Input<'_>) -> ModalResult<Expr> {
    let mut expr = primary(input)?;
    loop {
        let checkpoint = input.checkpoint();
        ws.parse_next(input)?;
        if opt('.').parse_next(input)?.is_some() {
            ws.parse_next(input)?;
            let name = cut_err(identifier)
                .context(StrContext::Expected(StrContextValue::Description(
                    "property name",
                )))
                .parse_next(input)?;
            grow(input, 1)?;
            expr = Expr::Member {
                object: Box::new(expr),
                property: Property::Named(name.to_owned()),
            };
        } else if opt('[').parse_next(input)?.is_some() {
            let key = nested(input, cut_err(assignment))?;
            cut_err((ws, ']')).parse_next(input)?;
            grow(input, 1)?;
            expr = Expr::Member {
                object: Box::new(expr),
                property: Property::Computed(Box::new(key)),
            };
        } else if opt('(').parse_next(input)?.is_some() {
            let args = call_arguments(input)?;
            grow(input, 1)?;
            expr = Expr::Call {
                callee: Box::new(expr),
                args,
            };
        } else {
            input.reset(&checkpoint);
            return Ok(expr);
        }
    }
}

fn unary(input: &mut Input<'_>) -> ModalResult<Expr> {
    ws.parse_next(input)?;
    let op = opt(alt((
        '!'.value(UnaryOp::Not),
        '-'.value(UnaryOp::Negate),
        '+'.value(UnaryOp::Plus),
    )))
    .parse_next(input)?;
    match op {
        Some(op) => {
            let operand = nested(input, cut_err(unary))?;
            grow(input, 1)?;
            Ok(Expr::Unary {
                op,
                operand: Box::new(operand),
            })
        }
        None => postfix(input),
    }
}

/// Left-associative fold of `operand (operator operand)*`.
fn binary_level(
    input: &mut Input<'_>,
    operand: fn(&mut Input<'_>) -> ModalResult<Expr>,
    operator: fn(&mut Input<'_>) -> ModalResult<BinaryOp>,
) -> ModalResult<Expr> {
    let first = operand(input)?;
    let rest: Vec<(BinaryOp, Expr)> =
        repeat(0.., (preceded(ws, operator), cut_err(operand))).parse_next(input)?;
    grow(input, rest.len())?;
    Ok(rest.into_iter().fold(first, |left, (op, right)| Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }))
}

fn multiplicative_op(input: &mut Input<'_>) -> ModalResult<BinaryOp> {
    alt((
        '*'.value(BinaryOp::Mul),
        '/'.value(BinaryOp::Div),
        '%'.value(BinaryOp::Rem),
    ))
    .parse_next(input)
}

fn additive_op(input: &mut Input<'_>) -> ModalResult<BinaryOp> {
    alt(('+'.value(BinaryOp::Add), '-'.value(BinaryOp::Sub))).parse_next(input)
}

fn relational_op(input: &mut Input<'_>) -> ModalResult<BinaryOp> {
    alt((
        "<=".value(BinaryOp::Lte),
        ">=".value(BinaryOp::Gte),
        '<'.value(BinaryOp::Lt),
        '>'.value(BinaryOp::Gt),
    ))
    .parse_next(input)
}

fn equality_op(input: &mut Input<'_>) -> ModalResult<BinaryOp> {
    alt((
        "===".value(BinaryOp::StrictEq),
        "!==".value(BinaryOp::StrictNeq),
        "==".value(BinaryOp::Eq),
        "!=".value(BinaryOp::Neq),
    ))
    .parse_next(input)
}

fn and_op(input: &mut Input<'_>) -> ModalResult<BinaryOp> {
    "&&".value(BinaryOp::And).parse_next(input)
}

fn or_op(input: &mut Input<'_>) -> ModalResult<BinaryOp> {
    "||".value(BinaryOp::Or).parse_next(input)
}

fn multiplicative(input: &mut Input<'_>) -> ModalResult<Expr> {
    binary_level(input, unary, multiplicative_op)
}

fn additive(input: &mut Input<'_>) -> ModalResult<Expr> {
    binary_level(input, multiplicative, additive_op)
}

fn relational(input: &mut Input<'_>) -> ModalResult<Expr> {
    binary_level(input, additive, relational_op)
}

fn equality(input: &mut Input<'_>) -> ModalResult<Expr> {
    binary_level(input, relational, equality_op)
}

fn logical_and(input: &mut Input<'_>) -> ModalResult<Expr> {
    binary_level(input, equality, and_op)
}

fn logical_or(input: &mut Input<'_>) -> ModalResult<Expr> {
    binary_level(input, logical_and, or_op)
}

fn conditional(input: &mut Input<'_>) -> ModalResult<Expr> {
    let test = logical_or(input)?;
    if opt((ws, '?')).parse_next(input)?.is_none() {
        return Ok(test);
    }
    let (consequent, alternate) =
        nested(input, cut_err((assignment, preceded((ws, ':'), assignment))))?;
    grow(input, 1)?;
    Ok(Expr::Conditional {
        test: Box::new(test),
        consequent: Box::new(consequent),
        alternate: Box::new(alternate),
    })
}

fn assignment(input: &mut Input<'_>) -> ModalResult<Expr> {
    ws.parse_next(input)?;
    let target = opt(terminated(
        identifier.verify(|name: &str| !is_literal_keyword(name)),
        (ws, '=', not('=')),
    ))
    .parse_next(input)?;
    match target {
        Some(target) => {
            let value = nested(input, cut_err(assignment))?;
            grow(input, 1)?;
            Ok(Expr::Assign {
                target: target.to_owned(),
                value: Box::new(value),
            })
        }
        None => conditional(input),
    }
}

// -- Top-level parser -------------------------------------------------------

/// A whole rule: one expression with an optional trailing semicolon.
pub(crate) fn rule(input: &mut Input<'_>) -> ModalResult<Expr> {
    terminated(assignment, (ws, opt(';'), ws)).parse_next(input)
}

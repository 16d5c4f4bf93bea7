use std::borrow::Cow;
use std::cmp::Ordering;

use regex::Regex;

use crate::types::{BinaryOp, CompiledExpr, CompiledProperty, Method, UnaryOp};
use crate::{Context, Evaluation, EvaluationError, Value};

const UNDEFINED: &str = "undefined";
static UNDEFINED_VALUE: Value = Value::Undefined;

pub(crate) fn evaluate(expr: &CompiledExpr, ctx: &Context, locals: usize) -> Evaluation {
    let mut run = Run {
        ctx,
        locals: vec![Value::Undefined; locals],
        pending: Vec::new(),
    };
    let result = run.eval(expr).map(Cow::into_owned);
    if !run.pending.is_empty() {
        return Evaluation::NeedsRecords(run.pending);
    }
    match result {
        Ok(value) => Evaluation::Done(value),
        Err(err) => Evaluation::Failed(err),
    }
}

/// State of one pass over the tree.
///
/// Unloaded cross references read as `undefined` and are queued in
/// `pending`; errors raised while anything is pending are not final.
struct Run<'a> {
    ctx: &'a Context,
    locals: Vec<Value>,
    pending: Vec<String>,
}

type Eval<'a> = Result<Cow<'a, Value>, EvaluationError>;

impl<'a> Run<'a> {
    fn eval(&mut self, expr: &'a CompiledExpr) -> Eval<'a> {
        let ctx: &'a Context = self.ctx;
        match expr {
            CompiledExpr::Literal(value) => Ok(Cow::Borrowed(value)),
            CompiledExpr::Array(items) => {
                let values = items
                    .iter()
                    .map(|item| self.eval(item).map(Cow::into_owned))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Cow::Owned(Value::Array(values)))
            }
            CompiledExpr::Builtin(builtin) => Ok(Cow::Borrowed(ctx.builtin(*builtin))),
            CompiledExpr::Variable(index) => Ok(Cow::Borrowed(ctx.variable(*index))),
            CompiledExpr::Local(slot) => Ok(Cow::Owned(self.locals[*slot].clone())),
            CompiledExpr::Member { object, property } => {
                let target = self.eval(object)?;
                let key = match property {
                    CompiledProperty::Named(name) => Cow::Borrowed(name.as_str()),
                    CompiledProperty::Computed(key) => Cow::Owned(self.eval(key)?.to_js_string()),
                };
                match target {
                    Cow::Borrowed(value) => value.member(&key),
                    Cow::Owned(value) => Ok(Cow::Owned(value.member(&key)?.into_owned())),
                }
            }
            CompiledExpr::CrossReference(argument) => {
                let argument = self.eval(argument)?;
                self.cross_reference(&argument)
            }
            CompiledExpr::Method {
                receiver,
                method,
                args,
            } => {
                let receiver = self.eval(receiver)?;
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                call_method(&receiver, *method, &args).map(Cow::Owned)
            }
            CompiledExpr::Unary { op, operand } => {
                let operand = self.eval(operand)?;
                Ok(Cow::Owned(match op {
                    UnaryOp::Not => Value::Bool(!operand.truthy()),
                    UnaryOp::Negate => Value::Number(-operand.to_number()),
                    UnaryOp::Plus => Value::Number(operand.to_number()),
                }))
            }
            CompiledExpr::Binary {
                op: BinaryOp::And,
                left,
                right,
            } => {
                let left = self.eval(left)?;
                if left.truthy() {
                    self.eval(right)
                } else {
                    Ok(left)
                }
            }
            CompiledExpr::Binary {
                op: BinaryOp::Or,
                left,
                right,
            } => {
                let left = self.eval(left)?;
                if left.truthy() {
                    Ok(left)
                } else {
                    self.eval(right)
                }
            }
            CompiledExpr::Binary { op, left, right } => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                Ok(Cow::Owned(binary(*op, &left, &right)))
            }
            CompiledExpr::Conditional {
                test,
                consequent,
                alternate,
            } => {
                if self.eval(test)?.truthy() {
                    self.eval(consequent)
                } else {
                    self.eval(alternate)
                }
            }
            CompiledExpr::Assign { slot, value } => {
                let value = self.eval(value)?.into_owned();
                self.locals[*slot] = value.clone();
                Ok(Cow::Owned(value))
            }
        }
    }

    fn cross_reference(&mut self, argument: &Value) -> Eval<'a> {
        let ctx: &'a Context = self.ctx;
        match argument {
            Value::Undefined => Ok(Cow::Owned(Value::Undefined)),
            Value::String(name) if name.contains(UNDEFINED) => Ok(Cow::Owned(Value::Undefined)),
            Value::String(name) => match ctx.record(name) {
                Some(data) => Ok(Cow::Borrowed(data)),
                None => {
                    if !self.pending.contains(name) {
                        self.pending.push(name.clone());
                    }
                    Ok(Cow::Owned(Value::Undefined))
                }
            },
            // typeof null is "object"
            Value::Null => Err(EvaluationError::CrossReferenceType { found: "object" }),
            other => Err(EvaluationError::CrossReferenceType {
                found: other.type_name(),
            }),
        }
    }
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> Value {
    match op {
        BinaryOp::Add => add(left, right),
        BinaryOp::Sub => Value::Number(left.to_number() - right.to_number()),
        BinaryOp::Mul => Value::Number(left.to_number() * right.to_number()),
        BinaryOp::Div => Value::Number(left.to_number() / right.to_number()),
        BinaryOp::Rem => Value::Number(left.to_number() % right.to_number()),
        BinaryOp::Lt => Value::Bool(left.relational_cmp(right) == Some(Ordering::Less)),
        BinaryOp::Lte => Value::Bool(matches!(
            left.relational_cmp(right),
            Some(Ordering::Less | Ordering::Equal)
        )),
        BinaryOp::Gt => Value::Bool(left.relational_cmp(right) == Some(Ordering::Greater)),
        BinaryOp::Gte => Value::Bool(matches!(
            left.relational_cmp(right),
            Some(Ordering::Greater | Ordering::Equal)
        )),
        BinaryOp::StrictEq => Value::Bool(left.strict_equals(right)),
        BinaryOp::StrictNeq => Value::Bool(!left.strict_equals(right)),
        BinaryOp::Eq => Value::Bool(left.loose_equals(right)),
        BinaryOp::Neq => Value::Bool(!left.loose_equals(right)),
        // short-circuit forms are handled before both sides are evaluated
        BinaryOp::And => {
            if left.truthy() {
                right.clone()
            } else {
                left.clone()
            }
        }
        BinaryOp::Or => {
            if left.truthy() {
                left.clone()
            } else {
                right.clone()
            }
        }
    }
}

/// `+` concatenates as soon as either side isn't a number-like primitive.
fn add(left: &Value, right: &Value) -> Value {
    let concatenates = |v: &Value| matches!(v, Value::String(_) | Value::Array(_) | Value::Object(_));
    if concatenates(left) || concatenates(right) {
        let mut s = left.to_js_string();
        s.push_str(&right.to_js_string());
        Value::String(s)
    } else {
        Value::Number(left.to_number() + right.to_number())
    }
}

fn call_method(receiver: &Value, method: Method, args: &[Cow<'_, Value>]) -> Result<Value, EvaluationError> {
    let arg: &Value = args.first().map_or(&UNDEFINED_VALUE, |a| &**a);
    match (receiver, method) {
        (Value::Undefined | Value::Null, _) => Err(EvaluationError::NullishProperty {
            property: method.name().to_owned(),
            target: receiver.type_name(),
        }),
        (Value::String(s), Method::StartsWith) => Ok(Value::Bool(s.starts_with(&arg.to_js_string()))),
        (Value::String(s), Method::EndsWith) => Ok(Value::Bool(s.ends_with(&arg.to_js_string()))),
        (Value::String(s), Method::Includes) => Ok(Value::Bool(s.contains(&arg.to_js_string()))),
        (Value::String(s), Method::IndexOf) => Ok(Value::Number(
            s.find(&arg.to_js_string())
                .map_or(-1.0, |byte| char_count(&s[..byte])),
        )),
        (Value::String(s), Method::Match) => regex_match(s, &arg.to_js_string()),
        (Value::String(s), Method::ToUpperCase) => Ok(Value::String(s.to_uppercase())),
        (Value::String(s), Method::ToLowerCase) => Ok(Value::String(s.to_lowercase())),
        (Value::String(s), Method::Trim) => Ok(Value::String(s.trim().to_owned())),
        (Value::Array(items), Method::Includes) => {
            Ok(Value::Bool(items.iter().any(|item| same_value_zero(item, arg))))
        }
        (Value::Array(items), Method::IndexOf) => Ok(Value::Number(
            items
                .iter()
                .position(|item| item.strict_equals(arg))
                .map_or(-1.0, index_to_number),
        )),
        _ => Err(EvaluationError::NotAFunction {
            method: method.name(),
            receiver: receiver.type_name(),
        }),
    }
}

/// `includes` treats `NaN` as equal to itself, unlike `===`.
fn same_value_zero(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) if x.is_nan() && y.is_nan() => true,
        _ => a.strict_equals(b),
    }
}

fn regex_match(haystack: &str, pattern: &str) -> Result<Value, EvaluationError> {
    let re = Regex::new(pattern).map_err(|e| EvaluationError::InvalidPattern {
        pattern: pattern.to_owned(),
        reason: e.to_string(),
    })?;
    Ok(re.captures(haystack).map_or(Value::Null, |caps| {
        Value::Array(
            caps.iter()
                .map(|group| group.map_or(Value::Undefined, |m| Value::from(m.as_str())))
                .collect(),
        )
    }))
}

#[allow(clippy::cast_precision_loss)]
fn char_count(s: &str) -> f64 {
    s.chars().count() as f64
}

#[allow(clippy::cast_precision_loss)]
fn index_to_number(index: usize) -> f64 {
    index as f64
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::{compile, Context, Evaluation, EvaluationError, Value};

    fn run(source: &str, ctx: &Context) -> Evaluation {
        compile(source, &[]).unwrap().evaluate(ctx)
    }

    fn run_vars(source: &str, vars: &[&str], ctx: &Context) -> Evaluation {
        let names: Vec<String> = vars.iter().map(|v| (*v).to_owned()).collect();
        compile(source, &names).unwrap().evaluate(ctx)
    }

    fn done(source: &str, ctx: &Context) -> Value {
        match run(source, ctx) {
            Evaluation::Done(value) => value,
            other => panic!("expected Done for {source}, got {other:?}"),
        }
    }

    #[test]
    fn user_id_matches_path_variable() {
        let ctx = Context::new()
            .with_user("42", Value::Null)
            .with_variables(["42"]);
        assert_eq!(
            run_vars("user.id === $id", &["$id"], &ctx).allowed(),
            Some(true)
        );
        let ctx = Context::new()
            .with_user("7", Value::Null)
            .with_variables(["42"]);
        assert_eq!(
            run_vars("user.id === $id", &["$id"], &ctx).allowed(),
            Some(false)
        );
    }

    #[test]
    fn arithmetic_and_comparison() {
        let ctx = Context::new().with_data(Value::from(json!({"price": 15})));
        assert_eq!(done("data.price * 2 + 1", &ctx), Value::Number(31.0));
        assert_eq!(done("data.price % 4", &ctx), Value::Number(3.0));
        assert_eq!(done("data.price >= 15", &ctx), Value::Bool(true));
        assert_eq!(done("data.price < 10", &ctx), Value::Bool(false));
    }

    #[test]
    fn plus_concatenates_strings() {
        let ctx = Context::new();
        assert_eq!(done("'a' + 1", &ctx), Value::from("a1"));
        assert_eq!(done("1 + 2 + 'c'", &ctx), Value::from("3c"));
        assert_eq!(done("undefined + 'x'", &ctx), Value::from("undefinedx"));
    }

    #[test]
    fn logical_operators_return_operands() {
        let ctx = Context::new();
        assert_eq!(done("0 || 'fallback'", &ctx), Value::from("fallback"));
        assert_eq!(done("'a' && 'b'", &ctx), Value::from("b"));
        assert_eq!(done("null && data.thing", &ctx), Value::Null);
    }

    #[test]
    fn loose_and_strict_equality() {
        let ctx = Context::new();
        assert_eq!(done("1 == '1'", &ctx), Value::Bool(true));
        assert_eq!(done("1 === '1'", &ctx), Value::Bool(false));
        assert_eq!(done("null == undefined", &ctx), Value::Bool(true));
        assert_eq!(done("null === undefined", &ctx), Value::Bool(false));
    }

    #[test]
    fn conditional_picks_branch() {
        let ctx = Context::new().with_data(Value::from(json!({"vip": true})));
        assert_eq!(done("data.vip ? 'gold' : 'plain'", &ctx), Value::from("gold"));
    }

    #[test]
    fn member_of_undefined_fails() {
        let ctx = Context::new().with_data(Value::from(json!({})));
        match run("data.missing.deep", &ctx) {
            Evaluation::Failed(EvaluationError::NullishProperty { property, target }) => {
                assert_eq!(property, "deep");
                assert_eq!(target, "undefined");
            }
            other => panic!("expected NullishProperty, got {other:?}"),
        }
    }

    #[test]
    fn computed_member_and_length() {
        let ctx = Context::new().with_data(Value::from(json!({"tags": ["x", "y"], "key": "tags"})));
        assert_eq!(done("data[data.key].length", &ctx), Value::Number(2.0));
        assert_eq!(done("data.tags[1]", &ctx), Value::from("y"));
        assert_eq!(done("'hello'.length", &ctx), Value::Number(5.0));
    }

    #[test]
    fn string_methods() {
        let ctx = Context::new().with_data(Value::from(json!({"name": "  Egon  "})));
        assert_eq!(done("data.name.trim().toUpperCase()", &ctx), Value::from("EGON"));
        assert_eq!(done("data.name.trim().toLowerCase()", &ctx), Value::from("egon"));
        assert_eq!(done("data.name.trim().startsWith('Eg')", &ctx), Value::Bool(true));
        assert_eq!(done("data.name.trim().endsWith('on')", &ctx), Value::Bool(true));
        assert_eq!(done("data.name.includes('go')", &ctx), Value::Bool(true));
        assert_eq!(done("data.name.indexOf('g')", &ctx), Value::Number(3.0));
        assert_eq!(done("data.name.indexOf('z')", &ctx), Value::Number(-1.0));
    }

    #[test]
    fn array_methods() {
        let ctx = Context::new().with_data(Value::from(json!({"roles": ["admin", "dev"]})));
        assert_eq!(done("data.roles.includes('dev')", &ctx), Value::Bool(true));
        assert_eq!(done("data.roles.indexOf('dev')", &ctx), Value::Number(1.0));
    }

    #[test]
    fn regex_match_returns_captures() {
        let ctx = Context::new().with_name("users/egon-42");
        assert_eq!(
            done("name.match('users/([a-z]+)-([0-9]+)')", &ctx),
            Value::Array(vec![
                Value::from("users/egon-42"),
                Value::from("egon"),
                Value::from("42"),
            ])
        );
        assert_eq!(done("name.match('^posts/')", &ctx), Value::Null);
    }

    #[test]
    fn invalid_regex_fails() {
        let ctx = Context::new().with_name("a");
        assert!(matches!(
            run("name.match('(')", &ctx),
            Evaluation::Failed(EvaluationError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn method_on_wrong_type_fails() {
        let ctx = Context::new().with_data(Value::from(json!({"n": 5})));
        match run("data.n.trim()", &ctx) {
            Evaluation::Failed(err) => {
                assert_eq!(err.to_string(), "TypeError: number.trim is not a function");
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[test]
    fn method_on_undefined_fails() {
        let ctx = Context::new();
        match run("data.trim()", &ctx) {
            Evaluation::Failed(err) => assert_eq!(
                err.to_string(),
                "TypeError: Cannot read property 'trim' of undefined"
            ),
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[test]
    fn cross_reference_reads_loaded_record() {
        let ctx = Context::new().with_record("item/a", Value::from(json!({"ok": true})));
        assert_eq!(done("_('item/a').ok", &ctx), Value::Bool(true));
    }

    #[test]
    fn cross_reference_missing_record_is_null() {
        let ctx = Context::new().with_record("item/a", Value::Null);
        assert_eq!(done("_('item/a')", &ctx), Value::Null);
    }

    #[test]
    fn cross_reference_unloaded_collects_all_names() {
        let ctx = Context::new();
        assert_eq!(
            run("_('a') || _('b') || _('a')", &ctx),
            Evaluation::NeedsRecords(vec!["a".into(), "b".into()])
        );
    }

    #[test]
    fn pending_masks_errors() {
        // _('a') is undefined until loaded, so `.x` throws, but the run is not final
        let ctx = Context::new();
        assert_eq!(
            run("_('a').x === 1", &ctx),
            Evaluation::NeedsRecords(vec!["a".into()])
        );
    }

    #[test]
    fn cross_reference_undefined_argument() {
        let ctx = Context::new();
        assert_eq!(done("_(undefined)", &ctx), Value::Undefined);
        assert_eq!(done("_('item/' + undefined)", &ctx), Value::Undefined);
    }

    #[test]
    fn cross_reference_rejects_non_strings() {
        let ctx = Context::new();
        match run("_(12)", &ctx) {
            Evaluation::Failed(err) => {
                assert_eq!(err.to_string(), "crossreference got unsupported type number");
            }
            other => panic!("expected Failed, got {other:?}"),
        }
        match run("_(null)", &ctx) {
            Evaluation::Failed(err) => {
                assert_eq!(err.to_string(), "crossreference got unsupported type object");
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[test]
    fn nested_cross_reference() {
        let ctx = Context::new()
            .with_record("a", Value::from("b"))
            .with_record("b", Value::from(json!({"v": 1})));
        assert_eq!(done("_(_('a')).v", &ctx), Value::Number(1.0));
    }

    #[test]
    fn assignment_binds_local() {
        let ctx = Context::new();
        assert_eq!(done("$new = 'foo'", &ctx), Value::from("foo"));
        assert_eq!(done("(x = 2) && x * 3", &ctx), Value::Number(6.0));
    }

    #[test]
    fn now_and_action_are_readable() {
        let ctx = Context::new().with_now(1000.0).with_action("write");
        assert_eq!(done("now > 0 && action === 'write'", &ctx), Value::Bool(true));
    }
}

use crate::parse::parse;
use crate::types::{Builtin, CompiledExpr, CompiledProperty, Method, Predicate};
use crate::{CompileError, CompiledRule, Expr, Property};

const CROSS_REFERENCE: &str = "_";

/// Compile rule source for a path template with the given variable names.
///
/// `variables` are the template's `$name` tokens in capture order; the rule
/// reads them by position at evaluation time.
///
/// # Errors
///
/// Returns [`CompileError`] for syntax errors, unknown identifiers, calls
/// other than `_(name)` and the whitelisted methods, and assignments to
/// anything but a fresh local name.
pub fn compile(source: &str, variables: &[String]) -> Result<CompiledRule, CompileError> {
    let expr = parse(source)?;
    compile_expr(source, &expr, variables)
}

pub(crate) fn compile_expr(
    source: &str,
    expr: &Expr,
    variables: &[String],
) -> Result<CompiledRule, CompileError> {
    let mut locals = Vec::new();
    collect_locals(expr, variables, &mut locals)?;

    let scope = Scope {
        variables,
        locals: &locals,
    };
    let predicate = match scope.lower(expr)? {
        CompiledExpr::Literal(value) => Predicate::Constant(value.truthy()),
        compiled => Predicate::Expression(compiled),
    };

    Ok(CompiledRule {
        source: source.to_owned(),
        predicate,
        has_data: expr.references("data"),
        has_old_data: expr.references("oldData"),
        locals: locals.len(),
    })
}

fn collect_locals(
    expr: &Expr,
    variables: &[String],
    locals: &mut Vec<String>,
) -> Result<(), CompileError> {
    match expr {
        Expr::Literal(_) | Expr::Ident(_) => Ok(()),
        Expr::Array(items) => items
            .iter()
            .try_for_each(|item| collect_locals(item, variables, locals)),
        Expr::Member { object, property } => {
            collect_locals(object, variables, locals)?;
            match property {
                Property::Named(_) => Ok(()),
                Property::Computed(key) => collect_locals(key, variables, locals),
            }
        }
        Expr::Call { callee, args } => {
            collect_locals(callee, variables, locals)?;
            args.iter()
                .try_for_each(|arg| collect_locals(arg, variables, locals))
        }
        Expr::Unary { operand, .. } => collect_locals(operand, variables, locals),
        Expr::Binary { left, right, .. } => {
            collect_locals(left, variables, locals)?;
            collect_locals(right, variables, locals)
        }
        Expr::Conditional {
            test,
            consequent,
            alternate,
        } => {
            collect_locals(test, variables, locals)?;
            collect_locals(consequent, variables, locals)?;
            collect_locals(alternate, variables, locals)
        }
        Expr::Assign { target, value } => {
            let reserved = target == CROSS_REFERENCE
                || Builtin::from_name(target).is_some()
                || variables.contains(target);
            if reserved {
                return Err(CompileError::InvalidAssignment {
                    target: target.clone(),
                });
            }
            if !locals.contains(target) {
                locals.push(target.clone());
            }
            collect_locals(value, variables, locals)
        }
    }
}

struct Scope<'s> {
    variables: &'s [String],
    locals: &'s [String],
}

impl Scope<'_> {
    fn lower(&self, expr: &Expr) -> Result<CompiledExpr, CompileError> {
        Ok(match expr {
            Expr::Literal(value) => CompiledExpr::Literal(value.clone()),
            Expr::Array(items) => CompiledExpr::Array(self.lower_all(items)?),
            Expr::Ident(name) => self.resolve(name)?,
            Expr::Member { object, property } => CompiledExpr::Member {
                object: Box::new(self.lower(object)?),
                property: match property {
                    Property::Named(name) => CompiledProperty::Named(name.clone()),
                    Property::Computed(key) => CompiledProperty::Computed(Box::new(self.lower(key)?)),
                },
            },
            Expr::Call { callee, args } => self.lower_call(callee, args)?,
            Expr::Unary { op, operand } => CompiledExpr::Unary {
                op: *op,
                operand: Box::new(self.lower(operand)?),
            },
            Expr::Binary { op, left, right } => CompiledExpr::Binary {
                op: *op,
                left: Box::new(self.lower(left)?),
                right: Box::new(self.lower(right)?),
            },
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => CompiledExpr::Conditional {
                test: Box::new(self.lower(test)?),
                consequent: Box::new(self.lower(consequent)?),
                alternate: Box::new(self.lower(alternate)?),
            },
            Expr::Assign { target, value } => CompiledExpr::Assign {
                slot: position(self.locals, target).ok_or_else(|| {
                    CompileError::InvalidAssignment {
                        target: target.clone(),
                    }
                })?,
                value: Box::new(self.lower(value)?),
            },
        })
    }

    fn lower_all(&self, exprs: &[Expr]) -> Result<Vec<CompiledExpr>, CompileError> {
        exprs.iter().map(|e| self.lower(e)).collect()
    }

    fn resolve(&self, name: &str) -> Result<CompiledExpr, CompileError> {
        if let Some(builtin) = Builtin::from_name(name) {
            return Ok(CompiledExpr::Builtin(builtin));
        }
        if let Some(index) = position(self.variables, name) {
            return Ok(CompiledExpr::Variable(index));
        }
        if let Some(slot) = position(self.locals, name) {
            return Ok(CompiledExpr::Local(slot));
        }
        if name == CROSS_REFERENCE {
            return Err(CompileError::BareCrossReference);
        }
        Err(CompileError::UndefinedIdentifier {
            name: name.to_owned(),
        })
    }

    fn lower_call(&self, callee: &Expr, args: &[Expr]) -> Result<CompiledExpr, CompileError> {
        match callee {
            Expr::Ident(name) if name == CROSS_REFERENCE => match args {
                [argument] => Ok(CompiledExpr::CrossReference(Box::new(self.lower(argument)?))),
                _ => Err(CompileError::Arity {
                    function: CROSS_REFERENCE,
                    expected: 1,
                    found: args.len(),
                }),
            },
            Expr::Member {
                object,
                property: Property::Named(name),
            } => {
                let method = Method::from_name(name).ok_or_else(|| CompileError::UnsupportedCall {
                    callee: callee.to_string(),
                })?;
                if args.len() != method.arity() {
                    return Err(CompileError::Arity {
                        function: method.name(),
                        expected: method.arity(),
                        found: args.len(),
                    });
                }
                Ok(CompiledExpr::Method {
                    receiver: Box::new(self.lower(object)?),
                    method,
                    args: self.lower_all(args)?,
                })
            }
            _ => Err(CompileError::UnsupportedCall {
                callee: callee.to_string(),
            }),
        }
    }
}

fn position(names: &[String], name: &str) -> Option<usize> {
    names.iter().position(|n| n == name)
}

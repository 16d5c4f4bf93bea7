use std::fmt;

use super::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Negate,
    Plus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Mul,
    Div,
    Rem,
    Add,
    Sub,
    Lt,
    Lte,
    Gt,
    Gte,
    StrictEq,
    StrictNeq,
    Eq,
    Neq,
    And,
    Or,
}

/// Right-hand side of a member access.
#[derive(Debug, Clone, PartialEq)]
pub enum Property {
    /// `a.b`
    Named(String),
    /// `a[expr]`
    Computed(Box<Expr>),
}

/// Parsed rule expression. Identifiers are still plain strings.
/// Transformed into [`CompiledExpr`] during compilation.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Array(Vec<Expr>),
    Ident(String),
    Member {
        object: Box<Expr>,
        property: Property,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Conditional {
        test: Box<Expr>,
        consequent: Box<Expr>,
        alternate: Box<Expr>,
    },
    Assign {
        target: String,
        value: Box<Expr>,
    },
}

impl Expr {
    /// Whether the bare identifier `name` is read anywhere in this tree.
    ///
    /// Member names (`user.data`) and string contents don't count.
    #[must_use]
    pub fn references(&self, name: &str) -> bool {
        match self {
            Expr::Literal(_) => false,
            Expr::Ident(ident) => ident == name,
            Expr::Array(items) => items.iter().any(|e| e.references(name)),
            Expr::Member { object, property } => {
                object.references(name)
                    || matches!(property, Property::Computed(key) if key.references(name))
            }
            Expr::Call { callee, args } => {
                callee.references(name) || args.iter().any(|e| e.references(name))
            }
            Expr::Unary { operand, .. } => operand.references(name),
            Expr::Binary { left, right, .. } => left.references(name) || right.references(name),
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => {
                test.references(name) || consequent.references(name) || alternate.references(name)
            }
            Expr::Assign { value, .. } => value.references(name),
        }
    }
}

/// Context slots every rule can read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    User,
    AuthData,
    Data,
    OldData,
    Now,
    Action,
    Name,
}

impl Builtin {
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "user" => Builtin::User,
            "authData" => Builtin::AuthData,
            "data" => Builtin::Data,
            "oldData" => Builtin::OldData,
            "now" => Builtin::Now,
            "action" => Builtin::Action,
            "name" => Builtin::Name,
            _ => return None,
        })
    }
}

/// Whitelisted accessor methods callable on record fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    StartsWith,
    EndsWith,
    Includes,
    IndexOf,
    Match,
    ToUpperCase,
    ToLowerCase,
    Trim,
}

impl Method {
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "startsWith" => Method::StartsWith,
            "endsWith" => Method::EndsWith,
            "includes" => Method::Includes,
            "indexOf" => Method::IndexOf,
            "match" => Method::Match,
            "toUpperCase" => Method::ToUpperCase,
            "toLowerCase" => Method::ToLowerCase,
            "trim" => Method::Trim,
            _ => return None,
        })
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Method::StartsWith => "startsWith",
            Method::EndsWith => "endsWith",
            Method::Includes => "includes",
            Method::IndexOf => "indexOf",
            Method::Match => "match",
            Method::ToUpperCase => "toUpperCase",
            Method::ToLowerCase => "toLowerCase",
            Method::Trim => "trim",
        }
    }

    #[must_use]
    pub fn arity(self) -> usize {
        match self {
            Method::StartsWith
            | Method::EndsWith
            | Method::Includes
            | Method::IndexOf
            | Method::Match => 1,
            Method::ToUpperCase | Method::ToLowerCase | Method::Trim => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum CompiledProperty {
    Named(String),
    Computed(Box<CompiledExpr>),
}

/// Compiled expression with identifiers resolved to context slots, path
/// variable positions or local slots, and calls resolved to the only two
/// call forms a rule may use.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum CompiledExpr {
    Literal(Value),
    Array(Vec<CompiledExpr>),
    Builtin(Builtin),
    Variable(usize),
    Local(usize),
    Member {
        object: Box<CompiledExpr>,
        property: CompiledProperty,
    },
    CrossReference(Box<CompiledExpr>),
    Method {
        receiver: Box<CompiledExpr>,
        method: Method,
        args: Vec<CompiledExpr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<CompiledExpr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<CompiledExpr>,
        right: Box<CompiledExpr>,
    },
    Conditional {
        test: Box<CompiledExpr>,
        consequent: Box<CompiledExpr>,
        alternate: Box<CompiledExpr>,
    },
    Assign {
        slot: usize,
        value: Box<CompiledExpr>,
    },
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnaryOp::Not => write!(f, "!"),
            UnaryOp::Negate => write!(f, "-"),
            UnaryOp::Plus => write!(f, "+"),
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Lt => "<",
            BinaryOp::Lte => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Gte => ">=",
            BinaryOp::StrictEq => "===",
            BinaryOp::StrictNeq => "!==",
            BinaryOp::Eq => "==",
            BinaryOp::Neq => "!=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        };
        write!(f, "{symbol}")
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(value) => write!(f, "{value}"),
            Expr::Array(items) => {
                write!(f, "[")?;
                write_list(f, items)?;
                write!(f, "]")
            }
            Expr::Ident(name) => write!(f, "{name}"),
            Expr::Member {
                object,
                property: Property::Named(name),
            } => write!(f, "{object}.{name}"),
            Expr::Member {
                object,
                property: Property::Computed(key),
            } => write!(f, "{object}[{key}]"),
            Expr::Call { callee, args } => {
                write!(f, "{callee}(")?;
                write_list(f, args)?;
                write!(f, ")")
            }
            Expr::Unary { op, operand } => write!(f, "({op}{operand})"),
            Expr::Binary { op, left, right } => write!(f, "({left} {op} {right})"),
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => write!(f, "({test} ? {consequent} : {alternate})"),
            Expr::Assign { target, value } => write!(f, "({target} = {value})"),
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Expr]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

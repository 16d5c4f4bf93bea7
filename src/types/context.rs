use std::collections::HashMap;

use super::expr::Builtin;
use super::Value;

/// User id the connection layer assigns to unauthenticated clients.
pub const OPEN_USER: &str = "open";

/// Everything a single rule run can read.
///
/// Built once per decision and extended with each batch of loaded records
/// between runs.
#[derive(Debug, Clone, Default)]
pub struct Context {
    user: Value,
    auth_data: Value,
    data: Value,
    old_data: Value,
    now: Value,
    action: Value,
    name: Value,
    variables: Vec<Value>,
    records: HashMap<String, Value>,
}

impl Context {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `user` to `{ isAuthenticated, id, data }` and `authData` to `auth_data`.
    #[must_use]
    pub fn with_user(mut self, id: &str, auth_data: Value) -> Self {
        self.user = Value::object([
            ("isAuthenticated", Value::Bool(id != OPEN_USER)),
            ("id", Value::from(id)),
            ("data", auth_data.clone()),
        ]);
        self.auth_data = auth_data;
        self
    }

    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    #[must_use]
    pub fn with_old_data(mut self, old_data: Value) -> Self {
        self.old_data = old_data;
        self
    }

    /// Epoch milliseconds exposed as `now`.
    #[must_use]
    pub fn with_now(mut self, now_ms: f64) -> Self {
        self.now = Value::Number(now_ms);
        self
    }

    #[must_use]
    pub fn with_action(mut self, action: &str) -> Self {
        self.action = Value::from(action);
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Value::from(name);
        self
    }

    /// Path variable bindings, in template order.
    #[must_use]
    pub fn with_variables<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.variables = values
            .into_iter()
            .map(|v| Value::String(v.into()))
            .collect();
        self
    }

    /// Make a loaded record visible to `_(name)`. Missing records are `Null`.
    pub fn insert_record(&mut self, name: impl Into<String>, data: Value) {
        self.records.insert(name.into(), data);
    }

    #[must_use]
    pub fn with_record(mut self, name: impl Into<String>, data: Value) -> Self {
        self.insert_record(name, data);
        self
    }

    #[must_use]
    pub fn record(&self, name: &str) -> Option<&Value> {
        self.records.get(name)
    }

    pub(crate) fn builtin(&self, builtin: Builtin) -> &Value {
        match builtin {
            Builtin::User => &self.user,
            Builtin::AuthData => &self.auth_data,
            Builtin::Data => &self.data,
            Builtin::OldData => &self.old_data,
            Builtin::Now => &self.now,
            Builtin::Action => &self.action,
            Builtin::Name => &self.name,
        }
    }

    pub(crate) fn variable(&self, index: usize) -> &Value {
        static UNDEFINED: Value = Value::Undefined;
        self.variables.get(index).unwrap_or(&UNDEFINED)
    }
}

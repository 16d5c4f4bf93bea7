use proptest::prelude::*;
use valve::{Context, Value, OPEN_USER};

// --- Fixed data schema ---
// data.n      : number (-50..=50)
// data.s      : string, one of NAMES
// data.flag   : bool
// data.tags   : array of NAMES
// user.id     : one of NAMES or "open"

pub const NAMES: &[&str] = &["egon", "peter", "ray", "winston"];
const USERS: &[&str] = &["egon", "peter", "ray", "winston", OPEN_USER];

/// A path template made only of literal characters.
pub fn arb_literal_path() -> impl Strategy<Value = String> {
    "[a-z0-9_-][a-z0-9/_.-]{0,24}"
}

/// Generate a context that aligns with the fixed data schema.
pub fn arb_context() -> impl Strategy<Value = Context> {
    (
        -50_i64..=50,
        prop::sample::select(NAMES),
        any::<bool>(),
        prop::collection::vec(prop::sample::select(NAMES), 0..4),
        prop::sample::select(USERS),
    )
        .prop_map(|(n, s, flag, tags, user)| {
            let data = Value::object([
                ("n", Value::from(n)),
                ("s", Value::from(s)),
                ("flag", Value::Bool(flag)),
                (
                    "tags",
                    Value::Array(tags.into_iter().map(Value::from).collect()),
                ),
            ]);
            Context::new().with_user(user, Value::Null).with_data(data)
        })
}

fn arb_operand() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("data.n".to_owned()),
        Just("data.s".to_owned()),
        Just("data.flag".to_owned()),
        Just("data.tags.length".to_owned()),
        Just("user.id".to_owned()),
        Just("user.isAuthenticated".to_owned()),
        Just("null".to_owned()),
        Just("undefined".to_owned()),
        (-50_i64..=50).prop_map(|n| n.to_string()),
        prop::sample::select(NAMES).prop_map(|s| format!("'{s}'")),
    ]
}

fn arb_leaf() -> impl Strategy<Value = String> {
    prop_oneof![
        arb_operand(),
        (
            arb_operand(),
            prop::sample::select(&["===", "!==", "==", "!=", "<", "<=", ">", ">=", "+", "-", "*", "%"][..]),
            arb_operand(),
        )
            .prop_map(|(l, op, r)| format!("{l} {op} {r}")),
        prop::sample::select(NAMES).prop_map(|s| format!("data.tags.includes('{s}')")),
        prop::sample::select(NAMES).prop_map(|s| format!("data.s.startsWith('{}')", &s[..1])),
        Just("data.s.toUpperCase().length > 3".to_owned()),
    ]
}

/// Rule source built from the schema fields, operators and methods.
pub fn arb_rule_source() -> impl Strategy<Value = String> {
    arb_leaf().prop_recursive(4, 32, 3, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone()).prop_map(|(l, r)| format!("({l}) && ({r})")),
            (inner.clone(), inner.clone()).prop_map(|(l, r)| format!("({l}) || ({r})")),
            inner.clone().prop_map(|e| format!("!({e})")),
            (inner.clone(), inner.clone(), inner).prop_map(|(c, a, b)| format!("({c}) ? ({a}) : ({b})")),
        ]
    })
}

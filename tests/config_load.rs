use std::path::PathBuf;
use std::sync::Arc;

use serde_json::json;
use valve::{
    Action, ConfigError, MemoryStore, Message, PermissionValve, RuleType, RuleValidationError,
    Section, ValveConfig, ValveOptions,
};

fn fixture() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/permissions.json")
}

#[test]
fn loads_fixture_file_in_declaration_order() {
    let config = ValveConfig::from_file(fixture()).unwrap();
    let paths: Vec<&str> = config
        .section(Section::Record)
        .iter()
        .map(|p| p.template().raw())
        .collect();
    assert_eq!(paths, ["profile/$userId", "game-comment/$gameId/$userId/*", "*"]);
    assert!(config.require_root_entries().is_ok());
}

#[test]
fn missing_file_is_io_error() {
    let err = ValveConfig::from_file("tests/fixtures/does-not-exist.json").unwrap_err();
    assert!(matches!(err, ConfigError::Io(_)));
}

#[test]
fn malformed_json_is_json_error() {
    assert!(matches!(
        ValveConfig::from_json_str("{ \"record\": "),
        Err(ConfigError::Json(_))
    ));
}

#[tokio::test]
async fn fixture_rules_decide() {
    let store = Arc::new(
        MemoryStore::new()
            .with_record("game/g1", json!({ "open": true }))
            .with_record("game/g2", json!({ "open": false })),
    );
    let valve = PermissionValve::new(
        ValveConfig::from_file(fixture()).unwrap(),
        ValveOptions {
            require_root_entries: true,
            ..ValveOptions::default()
        },
        store,
    )
    .unwrap();

    let profile = Message::record(Action::Update, "profile/alice").with_data("{}");
    assert!(valve.authorize("alice", &profile, json!(null)).await.unwrap());
    assert!(!valve.authorize("bob", &profile, json!(null)).await.unwrap());
    assert!(!valve
        .authorize("alice", &Message::record(Action::Delete, "profile/alice"), json!(null))
        .await
        .unwrap());

    let comment = Message::record(Action::Update, "game-comment/g1/alice/c7").with_data("{}");
    assert!(valve.authorize("alice", &comment, json!(null)).await.unwrap());
    let closed = Message::record(Action::Update, "game-comment/g2/alice/c7").with_data("{}");
    assert!(!valve.authorize("alice", &closed, json!(null)).await.unwrap());

    let news = Message::event(Action::Emit, "news/today");
    assert!(valve
        .authorize("e", &news, json!({ "role": "editor" }))
        .await
        .unwrap());
    assert!(!valve.authorize("r", &news, json!({ "role": "reader" })).await.unwrap());
    assert!(valve
        .authorize("r", &Message::event(Action::Emit, "chat"), json!(null))
        .await
        .unwrap());
}

#[test]
fn root_entries_enforced_when_required() {
    let config = ValveConfig::from_value(json!({
        "record": { "a": { "read": true } },
        "event": { "*": { "publish": true } },
        "rpc": { "*": { "request": true } }
    }))
    .unwrap();
    let options = ValveOptions {
        require_root_entries: true,
        ..ValveOptions::default()
    };
    let err = PermissionValve::new(config, options, Arc::new(MemoryStore::new())).unwrap_err();
    assert_eq!(
        err.to_string(),
        "missing root entry \"*\" for section record"
    );
}

#[test]
fn invalid_options_rejected_by_valve() {
    let options = ValveOptions {
        max_rule_iterations: 0,
        ..ValveOptions::default()
    };
    let err = PermissionValve::new(ValveConfig::default(), options, Arc::new(MemoryStore::new()))
        .unwrap_err();
    assert!(matches!(err, ConfigError::MaxRuleIterations));
}

#[tokio::test]
async fn use_config_swaps_rules_and_resets_cache() {
    let config = |rule: &str| {
        ValveConfig::from_value(json!({
            "record": { "*": { "read": rule } },
            "event": {},
            "rpc": {}
        }))
        .unwrap()
    };
    let valve = PermissionValve::new(
        config("user.id === 'alice'"),
        ValveOptions::default(),
        Arc::new(MemoryStore::new()),
    )
    .unwrap();
    let read = Message::record(Action::Read, "doc");

    assert!(valve.authorize("alice", &read, json!(null)).await.unwrap());
    assert!(valve.cache().has(Section::Record, "doc", RuleType::Read));

    valve.use_config(config("user.id === 'bob'")).unwrap();
    assert!(valve.cache().is_empty());
    assert!(!valve.authorize("alice", &read, json!(null)).await.unwrap());
    assert!(valve.authorize("bob", &read, json!(null)).await.unwrap());
}

#[test]
fn options_from_json() {
    let options = ValveOptions::from_json_str(
        r#"{ "cacheEvacuationInterval": 1000, "maxRuleIterations": 5, "requireRootEntries": true }"#,
    )
    .unwrap();
    assert_eq!(options.max_rule_iterations, 5);
    assert!(options.require_root_entries);
    assert!(matches!(
        ValveOptions::from_json_str(r#"{ "maxIterations": 5 }"#),
        Err(ConfigError::Json(_))
    ));
}

#[test]
fn deeply_nested_rule_is_rejected() {
    let rule = format!("{}true{}", "(".repeat(3000), ")".repeat(3000));
    let err = ValveConfig::from_value(json!({
        "record": { "*": { "read": rule } },
        "event": {},
        "rpc": {}
    }))
    .unwrap_err();
    assert!(
        matches!(err, ConfigError::InvalidRule(RuleValidationError::Syntax(_))),
        "{err:?}"
    );
    assert!(err.to_string().contains("SyntaxError: Expression nested more than"));
}

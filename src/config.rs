use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::compile::compile_expr;
use crate::error::ConfigError;
use crate::path::PathTemplate;
use crate::validate::check;
use crate::{RuleSource, RuleType, Section};

/// Path every section needs when root entries are required.
pub const ROOT_PATH: &str = "*";

/// One path template with the rules declared under it, in declaration order.
#[derive(Debug, Clone)]
pub struct PathRules {
    template: Arc<PathTemplate>,
    rules: Vec<(RuleType, RuleSource)>,
}

impl PathRules {
    #[must_use]
    pub fn template(&self) -> &Arc<PathTemplate> {
        &self.template
    }

    #[must_use]
    pub fn rule(&self, rule_type: RuleType) -> Option<&RuleSource> {
        self.rules
            .iter()
            .find(|(t, _)| *t == rule_type)
            .map(|(_, rule)| rule)
    }

    pub fn rules(&self) -> impl Iterator<Item = (RuleType, &RuleSource)> {
        self.rules.iter().map(|(t, rule)| (*t, rule))
    }
}

/// The validated rule configuration tree.
#[derive(Debug, Clone, Default)]
pub struct ValveConfig {
    record: Vec<PathRules>,
    event: Vec<PathRules>,
    rpc: Vec<PathRules>,
}

impl ValveConfig {
    /// Validate and load a configuration tree.
    ///
    /// Every path is parsed and every expression rule is validated and
    /// trial-compiled against its path's variables, so a config that loads
    /// can't produce validation errors at request time.
    ///
    /// # Errors
    ///
    /// The first problem found, as a [`ConfigError`] naming the offending
    /// section and path.
    pub fn from_value(config: serde_json::Value) -> Result<Self, ConfigError> {
        let serde_json::Value::Object(mut sections) = config else {
            return Err(ConfigError::NotAnObject {
                found: json_type_name(&config),
            });
        };

        for section in Section::ALL {
            if !sections.contains_key(section.as_str()) {
                return Err(ConfigError::MissingSection { section });
            }
        }
        if let Some(unexpected) = sections
            .keys()
            .find(|key| Section::from_name(key).is_none())
        {
            return Err(ConfigError::UnexpectedSection {
                section: unexpected.clone(),
            });
        }

        let mut load = |section: Section| {
            let value = sections
                .remove(section.as_str())
                .unwrap_or(serde_json::Value::Null);
            load_section(section, value)
        };
        Ok(Self {
            record: load(Section::Record)?,
            event: load(Section::Event)?,
            rpc: load(Section::Rpc)?,
        })
    }

    /// # Errors
    ///
    /// [`ConfigError::Json`] for malformed JSON, otherwise as [`from_value`](Self::from_value).
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Self::from_value(serde_json::from_str(json)?)
    }

    /// Read a JSON config file.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Io`] when the file can't be read, otherwise as
    /// [`from_json_str`](Self::from_json_str).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let input = std::fs::read_to_string(path)?;
        Self::from_json_str(&input)
    }

    #[must_use]
    pub fn section(&self, section: Section) -> &[PathRules] {
        match section {
            Section::Record => &self.record,
            Section::Event => &self.event,
            Section::Rpc => &self.rpc,
        }
    }

    /// The first declared path in `section` that matches `name` and has a
    /// rule for `rule_type`.
    #[must_use]
    pub fn find_rule(
        &self,
        section: Section,
        name: &str,
        rule_type: RuleType,
    ) -> Option<(&PathRules, &RuleSource)> {
        self.section(section).iter().find_map(|path| {
            let rule = path.rule(rule_type)?;
            path.template.is_match(name).then_some((path, rule))
        })
    }

    /// Require every section to be non-empty and to declare [`ROOT_PATH`].
    ///
    /// # Errors
    ///
    /// [`ConfigError::EmptySection`] or [`ConfigError::MissingRootEntry`].
    pub fn require_root_entries(&self) -> Result<(), ConfigError> {
        for section in Section::ALL {
            let paths = self.section(section);
            if paths.is_empty() {
                return Err(ConfigError::EmptySection { section });
            }
            if !paths.iter().any(|p| p.template.raw() == ROOT_PATH) {
                return Err(ConfigError::MissingRootEntry { section });
            }
        }
        Ok(())
    }
}

fn load_section(section: Section, value: serde_json::Value) -> Result<Vec<PathRules>, ConfigError> {
    let serde_json::Value::Object(paths) = value else {
        return Err(ConfigError::SectionNotAnObject {
            section,
            found: json_type_name(&value),
        });
    };

    paths
        .into_iter()
        .map(|(path, rules)| load_path(section, path, rules))
        .collect()
}

fn load_path(
    section: Section,
    path: String,
    rules: serde_json::Value,
) -> Result<PathRules, ConfigError> {
    let template = PathTemplate::parse(&path).map_err(|source| ConfigError::InvalidPath {
        path: path.clone(),
        section,
        source,
    })?;

    let serde_json::Value::Object(rules) = rules else {
        return Err(ConfigError::NotARuleMap { path, section });
    };

    let mut loaded = Vec::with_capacity(rules.len());
    for (key, rule) in &rules {
        let rule_type = RuleType::from_name(key)
            .filter(|t| section.supports(*t))
            .ok_or_else(|| ConfigError::UnknownRuleType {
                rule_type: key.clone(),
                section,
            })?;
        let rule = RuleSource::try_from(rule)?;
        if let RuleSource::Expression(source) = &rule {
            let expr = check(source, section, rule_type)?;
            compile_expr(source, &expr, template.variables()).map_err(|error| {
                ConfigError::Compile {
                    path: path.clone(),
                    section,
                    rule_type,
                    source: error,
                }
            })?;
        }
        loaded.push((rule_type, rule));
    }

    Ok(PathRules {
        template: Arc::new(template),
        rules: loaded,
    })
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// Tuning knobs for a [`PermissionValve`](crate::PermissionValve).
///
/// Deserializes from camelCase JSON with durations in milliseconds; every
/// key is optional.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct ValveOptions {
    /// Period of the rule cache sweep.
    #[serde(deserialize_with = "millis")]
    pub cache_evacuation_interval: Duration,
    /// Rule runs allowed per decision, counting the first.
    pub max_rule_iterations: u32,
    /// Decision for names no path rule covers.
    pub default_allow: bool,
    /// Wall-clock budget for a whole decision, fetches included.
    #[serde(deserialize_with = "optional_millis")]
    pub evaluation_timeout: Option<Duration>,
    /// Reject configs where a section is empty or has no `"*"` path.
    pub require_root_entries: bool,
}

impl Default for ValveOptions {
    fn default() -> Self {
        Self {
            cache_evacuation_interval: Duration::from_secs(60),
            max_rule_iterations: 3,
            default_allow: true,
            evaluation_timeout: None,
            require_root_entries: false,
        }
    }
}

impl ValveOptions {
    /// # Errors
    ///
    /// [`ConfigError::Json`] for malformed or mistyped keys, otherwise as
    /// [`validate`](Self::validate).
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let options: Self = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    /// # Errors
    ///
    /// [`ConfigError::MaxRuleIterations`] when fewer than one iteration is
    /// allowed, [`ConfigError::CacheEvacuationInterval`] for a zero interval.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_rule_iterations < 1 {
            return Err(ConfigError::MaxRuleIterations);
        }
        if self.cache_evacuation_interval.is_zero() {
            return Err(ConfigError::CacheEvacuationInterval);
        }
        Ok(())
    }
}

fn millis<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    u64::deserialize(deserializer).map(Duration::from_millis)
}

fn optional_millis<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Duration>, D::Error> {
    Option::<u64>::deserialize(deserializer).map(|ms| ms.map(Duration::from_millis))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::path::PathError;
    use crate::RuleValidationError;

    fn load(config: serde_json::Value) -> Result<ValveConfig, ConfigError> {
        ValveConfig::from_value(config)
    }

    #[test]
    fn loads_minimal_config() {
        let config = load(json!({
            "record": { "users/$id": { "write": "user.id === $id", "read": true } },
            "event": {},
            "rpc": {}
        }))
        .unwrap();
        let paths = config.section(Section::Record);
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].template().variables(), ["$id"]);
        assert_eq!(paths[0].rule(RuleType::Read), Some(&RuleSource::Bool(true)));
        assert!(config.section(Section::Event).is_empty());
    }

    #[test]
    fn rejects_non_objects() {
        let err = load(json!("bla")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "config should be an object literal, but was of type string"
        );
        assert!(matches!(
            load(json!([])),
            Err(ConfigError::NotAnObject { found: "array" })
        ));
    }

    #[test]
    fn requires_every_section() {
        let err = load(json!({ "record": {}, "event": {} })).unwrap_err();
        assert_eq!(err.to_string(), "missing configuration section \"rpc\"");
    }

    #[test]
    fn rejects_unexpected_sections() {
        let err = load(json!({ "record": {}, "event": {}, "rpc": {}, "bogus": {} })).unwrap_err();
        assert_eq!(err.to_string(), "unexpected configuration section \"bogus\"");
    }

    #[test]
    fn section_must_be_object() {
        assert!(matches!(
            load(json!({ "record": [], "event": {}, "rpc": {} })),
            Err(ConfigError::SectionNotAnObject {
                section: Section::Record,
                found: "array"
            })
        ));
    }

    #[test]
    fn reports_invalid_paths() {
        let err = load(json!({
            "record": { "/bla": { "read": true } },
            "event": {},
            "rpc": {}
        }))
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "path can't start with / for path /bla in section record"
        );
        assert!(matches!(
            err,
            ConfigError::InvalidPath {
                source: PathError::LeadingSlash,
                ..
            }
        ));
    }

    #[test]
    fn rule_types_follow_section_schema() {
        let err = load(json!({
            "record": {},
            "event": { "chat": { "write": true } },
            "rpc": {}
        }))
        .unwrap_err();
        assert_eq!(err.to_string(), "unknown rule type write in section event");
    }

    #[test]
    fn rules_are_validated() {
        let err = load(json!({
            "record": {},
            "event": { "*": { "publish": "oldData.price < 500" } },
            "rpc": {}
        }))
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidRule(RuleValidationError::OldDataNotSupported { .. })
        ));

        let err = load(json!({
            "record": { "*": { "read": 3 } },
            "event": {},
            "rpc": {}
        }))
        .unwrap_err();
        assert_eq!(err.to_string(), "rule must be a string");
    }

    #[test]
    fn rules_are_compiled_against_path_variables() {
        let err = load(json!({
            "record": { "users/$id": { "write": "user.id === $userId" } },
            "event": {},
            "rpc": {}
        }))
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Compile {
                rule_type: RuleType::Write,
                section: Section::Record,
                ..
            }
        ));
    }

    #[test]
    fn rule_map_must_be_object() {
        assert!(matches!(
            load(json!({ "record": { "*": true }, "event": {}, "rpc": {} })),
            Err(ConfigError::NotARuleMap { .. })
        ));
    }

    #[test]
    fn first_declared_match_wins() {
        let config = load(json!({
            "record": {
                "users/admin": { "read": "user.id === 'root'" },
                "users/*": { "read": true, "write": false },
                "*": { "write": true }
            },
            "event": {},
            "rpc": {}
        }))
        .unwrap();

        let (path, _) = config
            .find_rule(Section::Record, "users/admin", RuleType::Read)
            .unwrap();
        assert_eq!(path.template().raw(), "users/admin");

        let (path, rule) = config
            .find_rule(Section::Record, "users/admin", RuleType::Write)
            .unwrap();
        assert_eq!(path.template().raw(), "users/*");
        assert_eq!(rule, &RuleSource::Bool(false));

        let (path, _) = config
            .find_rule(Section::Record, "other", RuleType::Write)
            .unwrap();
        assert_eq!(path.template().raw(), "*");

        assert!(config
            .find_rule(Section::Record, "other", RuleType::Delete)
            .is_none());
    }

    #[test]
    fn root_entries() {
        let config = load(json!({
            "record": { "*": { "read": true } },
            "event": {},
            "rpc": { "*": { "request": true } }
        }))
        .unwrap();
        assert!(matches!(
            config.require_root_entries(),
            Err(ConfigError::EmptySection {
                section: Section::Event
            })
        ));

        let config = load(json!({
            "record": { "*": { "read": true } },
            "event": { "chat/*": { "publish": true } },
            "rpc": { "*": { "request": true } }
        }))
        .unwrap();
        assert_eq!(
            config.require_root_entries().unwrap_err().to_string(),
            "missing root entry \"*\" for section event"
        );
    }

    #[test]
    fn options_defaults() {
        let options = ValveOptions::from_json_str("{}").unwrap();
        assert_eq!(options, ValveOptions::default());
        assert_eq!(options.cache_evacuation_interval, Duration::from_millis(60_000));
        assert_eq!(options.max_rule_iterations, 3);
        assert!(options.default_allow);
    }

    #[test]
    fn options_in_milliseconds() {
        let options = ValveOptions::from_json_str(
            r#"{ "cacheEvacuationInterval": 500, "evaluationTimeout": 20, "defaultAllow": false }"#,
        )
        .unwrap();
        assert_eq!(options.cache_evacuation_interval, Duration::from_millis(500));
        assert_eq!(options.evaluation_timeout, Some(Duration::from_millis(20)));
        assert!(!options.default_allow);
    }

    #[test]
    fn invalid_options() {
        let err = ValveOptions::from_json_str(r#"{ "maxRuleIterations": 0 }"#).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Maximum rule iteration has to be at least one"
        );
        assert!(matches!(
            ValveOptions::from_json_str(r#"{ "cacheEvacuationInterval": 0 }"#),
            Err(ConfigError::CacheEvacuationInterval)
        ));
        assert!(matches!(
            ValveOptions::from_json_str(r#"{ "maxRuleIterations": "three" }"#),
            Err(ConfigError::Json(_))
        ));
    }
}

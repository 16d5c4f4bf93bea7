use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Action, Message, Topic, ValveError};

/// Top-level sections of the rule configuration tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Section {
    Record,
    Event,
    Rpc,
}

impl Section {
    pub const ALL: [Section; 3] = [Section::Record, Section::Event, Section::Rpc];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Section::Record => "record",
            Section::Event => "event",
            Section::Rpc => "rpc",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == name)
    }

    /// Rule types a path in this section may declare.
    #[must_use]
    pub fn rule_types(self) -> &'static [RuleType] {
        match self {
            Section::Record => &[
                RuleType::Create,
                RuleType::Read,
                RuleType::Write,
                RuleType::Delete,
                RuleType::Listen,
                RuleType::Notify,
            ],
            Section::Event => &[RuleType::Publish, RuleType::Subscribe, RuleType::Listen],
            Section::Rpc => &[RuleType::Provide, RuleType::Request],
        }
    }

    #[must_use]
    pub fn supports(self, rule_type: RuleType) -> bool {
        self.rule_types().contains(&rule_type)
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// High-level permission a group of similar actions maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleType {
    Create,
    Read,
    Write,
    Delete,
    Listen,
    Notify,
    Publish,
    Subscribe,
    Provide,
    Request,
}

struct Visibility {
    data: bool,
    old_data: bool,
}

impl RuleType {
    pub const ALL: [RuleType; 10] = [
        RuleType::Create,
        RuleType::Read,
        RuleType::Write,
        RuleType::Delete,
        RuleType::Listen,
        RuleType::Notify,
        RuleType::Publish,
        RuleType::Subscribe,
        RuleType::Provide,
        RuleType::Request,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RuleType::Create => "create",
            RuleType::Read => "read",
            RuleType::Write => "write",
            RuleType::Delete => "delete",
            RuleType::Listen => "listen",
            RuleType::Notify => "notify",
            RuleType::Publish => "publish",
            RuleType::Subscribe => "subscribe",
            RuleType::Provide => "provide",
            RuleType::Request => "request",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }

    fn visibility(self) -> Visibility {
        let (data, old_data) = match self {
            RuleType::Create | RuleType::Listen | RuleType::Notify | RuleType::Provide => {
                (false, false)
            }
            RuleType::Read | RuleType::Delete => (false, true),
            RuleType::Write => (true, true),
            RuleType::Publish | RuleType::Subscribe | RuleType::Request => (true, false),
        };
        Visibility { data, old_data }
    }

    /// Whether rules of this type may reference `data`.
    #[must_use]
    pub fn supports_data(self) -> bool {
        self.visibility().data
    }

    /// Whether rules of this type may reference `oldData`.
    #[must_use]
    pub fn supports_old_data(self) -> bool {
        self.visibility().old_data
    }
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which rule decides a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleSpecification {
    pub section: Section,
    pub rule_type: RuleType,
    pub action: Action,
}

/// Map a message to the rule that gates it.
///
/// `Ok(None)` means the action is never permission-checked (unsubscribing,
/// answering an RPC, presence queries) and is allowed.
///
/// # Errors
///
/// [`ValveError::UnmappedAction`] for actions that don't belong to the
/// message's topic.
pub fn rule_specification(message: &Message) -> Result<Option<RuleSpecification>, ValveError> {
    use Action as A;

    let mapped = match (message.topic, message.action) {
        (Topic::Record, A::Subscribe | A::SubscribeAndHead | A::SubscribeAndRead | A::Read | A::Head) => {
            Some((Section::Record, RuleType::Read))
        }
        (Topic::Record, A::Listen) => Some((Section::Record, RuleType::Listen)),
        (Topic::Record, A::Create) => Some((Section::Record, RuleType::Create)),
        (Topic::Record, A::Update | A::Patch) => Some((Section::Record, RuleType::Write)),
        (Topic::Record, A::Notify) => Some((Section::Record, RuleType::Notify)),
        (Topic::Record, A::Delete) => Some((Section::Record, RuleType::Delete)),
        (Topic::Record, A::Unsubscribe | A::Unlisten) => None,

        (Topic::Event, A::Listen) => Some((Section::Event, RuleType::Listen)),
        (Topic::Event, A::Subscribe) => Some((Section::Event, RuleType::Subscribe)),
        (Topic::Event, A::Emit) => Some((Section::Event, RuleType::Publish)),
        (Topic::Event, A::Unsubscribe | A::Unlisten) => None,

        (Topic::Rpc, A::Provide) => Some((Section::Rpc, RuleType::Provide)),
        (Topic::Rpc, A::Request) => Some((Section::Rpc, RuleType::Request)),
        (Topic::Rpc, A::Unprovide | A::Response) => None,

        (Topic::Presence, A::Subscribe | A::Unsubscribe | A::SubscribeAll | A::Query | A::QueryAll) => None,

        (topic, action) => return Err(ValveError::UnmappedAction { topic, action }),
    };

    Ok(mapped.map(|(section, rule_type)| RuleSpecification {
        section,
        rule_type,
        action: message.action,
    }))
}

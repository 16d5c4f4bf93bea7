use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Topic {
    Record,
    Event,
    Rpc,
    Presence,
}

impl Topic {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Topic::Record => "RECORD",
            Topic::Event => "EVENT",
            Topic::Rpc => "RPC",
            Topic::Presence => "PRESENCE",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message actions across all topics. Which ones are valid depends on the
/// topic; see [`rule_specification`](crate::rule_specification).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Subscribe,
    #[serde(rename = "SUBSCRIBEANDHEAD")]
    SubscribeAndHead,
    #[serde(rename = "SUBSCRIBEANDREAD")]
    SubscribeAndRead,
    Unsubscribe,
    Read,
    Head,
    Create,
    Update,
    Patch,
    Notify,
    Delete,
    Listen,
    Unlisten,
    Emit,
    Provide,
    Unprovide,
    Request,
    Response,
    SubscribeAll,
    Query,
    QueryAll,
}

impl Action {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Subscribe => "SUBSCRIBE",
            Action::SubscribeAndHead => "SUBSCRIBEANDHEAD",
            Action::SubscribeAndRead => "SUBSCRIBEANDREAD",
            Action::Unsubscribe => "UNSUBSCRIBE",
            Action::Read => "READ",
            Action::Head => "HEAD",
            Action::Create => "CREATE",
            Action::Update => "UPDATE",
            Action::Patch => "PATCH",
            Action::Notify => "NOTIFY",
            Action::Delete => "DELETE",
            Action::Listen => "LISTEN",
            Action::Unlisten => "UNLISTEN",
            Action::Emit => "EMIT",
            Action::Provide => "PROVIDE",
            Action::Unprovide => "UNPROVIDE",
            Action::Request => "REQUEST",
            Action::Response => "RESPONSE",
            Action::SubscribeAll => "SUBSCRIBE_ALL",
            Action::Query => "QUERY",
            Action::QueryAll => "QUERY_ALL",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The parts of an incoming client message the valve looks at.
///
/// `data` is the raw JSON payload as it came off the wire; `path` is the
/// JSON path a record patch applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub topic: Topic,
    pub action: Action,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl Message {
    #[must_use]
    pub fn new(topic: Topic, action: Action, name: impl Into<String>) -> Self {
        Self {
            topic,
            action,
            name: name.into(),
            data: None,
            path: None,
        }
    }

    #[must_use]
    pub fn record(action: Action, name: impl Into<String>) -> Self {
        Self::new(Topic::Record, action, name)
    }

    #[must_use]
    pub fn event(action: Action, name: impl Into<String>) -> Self {
        Self::new(Topic::Event, action, name)
    }

    #[must_use]
    pub fn rpc(action: Action, name: impl Into<String>) -> Self {
        Self::new(Topic::Rpc, action, name)
    }

    /// Attach a raw JSON payload.
    #[must_use]
    pub fn with_data(mut self, json: impl Into<String>) -> Self {
        self.data = Some(json.into());
        self
    }

    /// Serialize `value` as the payload.
    #[must_use]
    pub fn with_json(self, value: &serde_json::Value) -> Self {
        self.with_data(value.to_string())
    }

    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Parse the payload. `None` when the message carries none.
    pub fn parse_data(&self) -> Option<Result<serde_json::Value, serde_json::Error>> {
        self.data.as_deref().map(serde_json::from_str)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn action_wire_names() {
        assert_eq!(Action::SubscribeAndHead.as_str(), "SUBSCRIBEANDHEAD");
        assert_eq!(Action::QueryAll.as_str(), "QUERY_ALL");
        assert_eq!(
            serde_json::to_value(Action::SubscribeAndRead).unwrap(),
            json!("SUBSCRIBEANDREAD")
        );
        assert_eq!(
            serde_json::from_value::<Action>(json!("SUBSCRIBE_ALL")).unwrap(),
            Action::SubscribeAll
        );
    }

    #[test]
    fn message_from_json() {
        let msg: Message = serde_json::from_value(json!({
            "topic": "RECORD",
            "action": "PATCH",
            "name": "user/egon",
            "data": "\"Egon\"",
            "path": "firstname"
        }))
        .unwrap();
        assert_eq!(
            msg,
            Message::record(Action::Patch, "user/egon")
                .with_data("\"Egon\"")
                .with_path("firstname")
        );
    }

    #[test]
    fn parse_payload() {
        let msg = Message::event(Action::Emit, "chat").with_json(&json!({"text": "hi"}));
        assert_eq!(msg.parse_data().unwrap().unwrap(), json!({"text": "hi"}));

        let broken = Message::event(Action::Emit, "chat").with_data("{not json");
        assert!(broken.parse_data().unwrap().is_err());

        assert!(Message::event(Action::Emit, "chat").parse_data().is_none());
    }
}

//! A2A message/task shapes (spec §6, §9 "dynamic object shapes" note: model
//! as tagged variants, not a dynamic bag).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Part {
    Text { text: String },
    Data { data: serde_json::Map<String, serde_json::Value> },
}

impl Part {
    pub fn is_data_part(&self) -> bool {
        matches!(self, Part::Data { .. })
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Part::Text { text } => Some(text),
            Part::Data { .. } => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Agent,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    #[serde(default = "message_kind")]
    pub kind: String,
    pub role: Role,
    pub message_id: String,
    pub parts: Vec<Part>,
    /// Vendor/extension fields the receiver doesn't understand yet; never
    /// dropped, always round-tripped.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extensions: HashMap<String, serde_json::Value>,
}

fn message_kind() -> String {
    "message".to_string()
}

impl Message {
    pub fn text(role: Role, message_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            kind: message_kind(),
            role,
            message_id: message_id.into(),
            parts: vec![Part::Text { text: text.into() }],
            extensions: HashMap::new(),
        }
    }

    pub fn text_content(&self) -> String {
        self.parts
            .iter()
            .filter_map(Part::as_text)
            .collect::<Vec<_>>()
            .join("")
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskState {
    Submitted,
    Accepted,
    Rejected,
    Working,
    InputRequired,
    Completed,
    Failed,
    Canceled,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskStatus {
    pub state: TaskState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Artifact {
    pub artifact_id: String,
    pub parts: Vec<Part>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<Artifact>,
}

impl Task {
    pub fn completed(id: impl Into<String>, reply: Message, artifacts: Vec<Artifact>) -> Self {
        Self {
            id: id.into(),
            status: TaskStatus {
                state: TaskState::Completed,
                message: Some(reply),
            },
            artifacts,
        }
    }

    pub fn failed(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: TaskStatus {
                state: TaskState::Failed,
                message: Some(Message::text(Role::Agent, "error", reason.into())),
            },
            artifacts: Vec::new(),
        }
    }

    pub fn rejected(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: TaskStatus {
                state: TaskState::Rejected,
                message: Some(Message::text(Role::Agent, "error", reason.into())),
            },
            artifacts: Vec::new(),
        }
    }
}

/// `message/send` RPC params: the only method body flock's own components
/// construct (A2A also defines `tasks/*`, passed through untouched).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MessageSendParams {
    pub message: Message,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_roundtrips_through_json() {
        let msg = Message::text(Role::User, "m1", "hi");
        let text = serde_json::to_string(&msg).unwrap();
        let parsed: Message = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.text_content(), "hi");
    }

    #[test]
    fn data_part_is_distinguished_from_text_part() {
        let mut map = serde_json::Map::new();
        map.insert("x".into(), serde_json::json!(1));
        let part = Part::Data { data: map };
        assert!(part.is_data_part());
        assert!(part.as_text().is_none());
    }

    #[test]
    fn task_state_uses_kebab_case_on_the_wire() {
        let status = TaskStatus {
            state: TaskState::InputRequired,
            message: None,
        };
        let text = serde_json::to_string(&status).unwrap();
        assert!(text.contains("\"input-required\""));
    }
}

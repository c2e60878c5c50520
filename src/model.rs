use std::collections::HashSet;

use crate::error::{LifelineError, LifelineResult};

/// A named participant/lifeline in the diagram. Identity is the `id`.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Actor {
    pub id: String,
    pub name: String,
}

/// Wire style of a message. Optional in the data model; the renderer may
/// ignore it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Sync,
    Async,
    Reply,
}

/// A directed, labeled, ordered interaction between two actors.
///
/// `source_id`/`target_id` are expected to reference existing actors, but
/// referential integrity is deliberately NOT enforced here: the diagram is
/// produced by an external collaborator, and the rendering layer tolerates
/// dangling references by defaulting to lifeline position 0. A message with
/// `source_id == target_id` is a valid self-message.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(rename = "sourceId")]
    pub source_id: String,
    #[serde(rename = "targetId")]
    pub target_id: String,
    pub label: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<MessageKind>,
    pub order: i64,
}

impl Message {
    pub fn is_self_message(&self) -> bool {
        self.source_id == self.target_id
    }
}

/// Root aggregate: the actor set plus the ordered message sequence.
///
/// A diagram is replaced wholesale (on generation, manual save, or clear) and
/// never partially mutated by this crate.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Diagram {
    pub actors: Vec<Actor>,
    pub messages: Vec<Message>,
}

impl Diagram {
    /// Check the invariants the core owns: actor ids and message ids must be
    /// unique for the lifetime of the diagram.
    pub fn validate(&self) -> LifelineResult<()> {
        let mut seen = HashSet::new();
        for actor in &self.actors {
            if actor.id.trim().is_empty() {
                return Err(LifelineError::validation("actor id must be non-empty"));
            }
            if !seen.insert(actor.id.as_str()) {
                return Err(LifelineError::validation(format!(
                    "duplicate actor id '{}'",
                    actor.id
                )));
            }
        }

        let mut seen = HashSet::new();
        for msg in &self.messages {
            if msg.id.trim().is_empty() {
                return Err(LifelineError::validation("message id must be non-empty"));
            }
            if !seen.insert(msg.id.as_str()) {
                return Err(LifelineError::validation(format!(
                    "duplicate message id '{}'",
                    msg.id
                )));
            }
        }

        Ok(())
    }

    /// Messages in playback order: stably sorted by `order`, ties broken by
    /// input position. Every consumer (layout, playback, export) iterates
    /// this sequence rather than `messages` directly.
    pub fn playback_order(&self) -> Vec<&Message> {
        let mut ordered: Vec<&Message> = self.messages.iter().collect();
        ordered.sort_by_key(|m| m.order);
        ordered
    }

    /// Number of playback steps (one per message).
    pub fn step_count(&self) -> usize {
        self.messages.len()
    }

    /// The built-in login-flow diagram used by the CLI when no input is
    /// given, and by tests.
    pub fn sample() -> Self {
        fn actor(id: &str, name: &str) -> Actor {
            Actor {
                id: id.to_string(),
                name: name.to_string(),
            }
        }
        fn message(id: &str, source: &str, target: &str, label: &str, order: i64) -> Message {
            Message {
                id: id.to_string(),
                source_id: source.to_string(),
                target_id: target.to_string(),
                label: label.to_string(),
                kind: None,
                order,
            }
        }

        Self {
            actors: vec![
                actor("user", "User"),
                actor("client", "Client"),
                actor("server", "Server"),
                actor("db", "Database"),
            ],
            messages: vec![
                message("m1", "user", "client", "Click Login", 0),
                message("m2", "client", "server", "POST /auth/login", 1),
                message("m3", "server", "db", "Query User", 2),
                message("m4", "db", "server", "Return User Data", 3),
                message("m5", "server", "client", "200 OK (Token)", 4),
                message("m6", "client", "user", "Show Homepage", 5),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_roundtrip_uses_camel_case_references() {
        let diagram = Diagram::sample();
        let s = serde_json::to_string_pretty(&diagram).unwrap();
        assert!(s.contains("\"sourceId\""));
        assert!(s.contains("\"targetId\""));

        let de: Diagram = serde_json::from_str(&s).unwrap();
        assert_eq!(de, diagram);
    }

    #[test]
    fn kind_field_is_optional_and_lowercase() {
        let json = r#"{
            "actors": [{"id": "a", "name": "A"}],
            "messages": [
                {"id": "m1", "sourceId": "a", "targetId": "a", "label": "tick", "order": 0},
                {"id": "m2", "sourceId": "a", "targetId": "a", "label": "tock", "type": "async", "order": 1}
            ]
        }"#;
        let de: Diagram = serde_json::from_str(json).unwrap();
        assert_eq!(de.messages[0].kind, None);
        assert_eq!(de.messages[1].kind, Some(MessageKind::Async));
    }

    #[test]
    fn validate_rejects_duplicate_actor_id() {
        let mut diagram = Diagram::sample();
        diagram.actors.push(Actor {
            id: "user".to_string(),
            name: "Shadow".to_string(),
        });
        assert!(diagram.validate().is_err());
    }

    #[test]
    fn validate_rejects_duplicate_message_id() {
        let mut diagram = Diagram::sample();
        let mut dup = diagram.messages[0].clone();
        dup.order = 99;
        diagram.messages.push(dup);
        assert!(diagram.validate().is_err());
    }

    #[test]
    fn validate_accepts_dangling_references() {
        let diagram = Diagram {
            actors: vec![],
            messages: vec![Message {
                id: "m1".to_string(),
                source_id: "ghost".to_string(),
                target_id: "ghost".to_string(),
                label: "boo".to_string(),
                kind: None,
                order: 0,
            }],
        };
        assert!(diagram.validate().is_ok());
    }

    #[test]
    fn playback_order_is_stable_on_ties() {
        let mut diagram = Diagram::sample();
        for m in &mut diagram.messages {
            m.order = 7;
        }
        let ordered: Vec<&str> = diagram
            .playback_order()
            .iter()
            .map(|m| m.id.as_str())
            .collect();
        assert_eq!(ordered, vec!["m1", "m2", "m3", "m4", "m5", "m6"]);
    }

    #[test]
    fn playback_order_sorts_by_order_field() {
        let mut diagram = Diagram::sample();
        diagram.messages.reverse();
        let ordered: Vec<&str> = diagram
            .playback_order()
            .iter()
            .map(|m| m.label.as_str())
            .collect();
        assert_eq!(ordered[0], "Click Login");
        assert_eq!(ordered[5], "Show Homepage");
    }
}

//! Event normalizer for conversation exports
//!
//! An export is a list of conversation records. Each record carries its
//! messages in one of two shapes:
//! - graph: `mapping` of node-id → node, each node optionally holding a `message`
//! - flat: `messages` list in source order
//!
//! The graph shape wins when both are present. Node order inside `mapping` is
//! whatever the JSON map yields and must not be relied on.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::error::RecapError;
use crate::types::{ConversationId, MessageEvent, Role};

/// Id used when a record carries neither `id` nor `conversation_id`.
pub const UNKNOWN_CONVERSATION: &str = "(unknown)";

/// Extract the conversation records from a parsed `conversations.json`.
///
/// Accepts a bare array or an object wrapping one under `conversations`.
/// Every record must be a JSON object; anything else aborts the run before
/// any state is touched.
pub fn load_conversations(data: Value) -> Result<Vec<Value>, RecapError> {
    let records = match data {
        Value::Array(items) => items,
        Value::Object(mut obj) => match obj.remove("conversations") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(RecapError::MalformedExport(
                    "expected a list of conversations or a `conversations` array".to_string(),
                ))
            }
        },
        _ => {
            return Err(RecapError::MalformedExport(
                "export root is neither a list nor an object".to_string(),
            ))
        }
    };

    if let Some(pos) = records.iter().position(|r| !r.is_object()) {
        return Err(RecapError::MalformedExport(format!(
            "conversation record #{} is not an object",
            pos
        )));
    }
    Ok(records)
}

/// Stable id of a conversation record.
pub fn conversation_id(record: &Value) -> ConversationId {
    record
        .get("id")
        .and_then(Value::as_str)
        .or_else(|| record.get("conversation_id").and_then(Value::as_str))
        .unwrap_or(UNKNOWN_CONVERSATION)
        .to_string()
}

/// Iterate the messages of one conversation record in source order.
pub fn conversation_events(record: &Value) -> ConversationEvents<'_> {
    let conversation_id = conversation_id(record);
    let title = record
        .get("title")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let source = match record.get("mapping").and_then(Value::as_object) {
        Some(mapping) if !mapping.is_empty() => Source::Graph(mapping.iter()),
        _ => match record.get("messages").and_then(Value::as_array) {
            Some(messages) => Source::Flat(messages.iter()),
            None => Source::Empty,
        },
    };

    ConversationEvents {
        conversation_id,
        title,
        source,
    }
}

enum Source<'a> {
    Graph(serde_json::map::Iter<'a>),
    Flat(std::slice::Iter<'a, Value>),
    Empty,
}

/// Lazy, single-pass iterator over one conversation's [`MessageEvent`]s.
pub struct ConversationEvents<'a> {
    conversation_id: ConversationId,
    title: String,
    source: Source<'a>,
}

impl Iterator for ConversationEvents<'_> {
    type Item = MessageEvent;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let message = match &mut self.source {
                Source::Graph(nodes) => {
                    let (_, node) = nodes.next()?;
                    node.get("message")
                }
                Source::Flat(messages) => Some(messages.next()?),
                Source::Empty => return None,
            };

            let Some(message) = message.and_then(Value::as_object) else {
                continue;
            };
            if let Some(event) = self.to_event(message) {
                return Some(event);
            }
        }
    }
}

impl ConversationEvents<'_> {
    fn to_event(&self, message: &Map<String, Value>) -> Option<MessageEvent> {
        let role = message
            .get("author")
            .and_then(|a| a.get("role"))
            .and_then(Value::as_str)
            .filter(|r| !r.is_empty())?;
        let text = message_text(message.get("content")?)?;
        let timestamp = message.get("create_time").and_then(parse_timestamp);
        let message_id = match message.get("id").and_then(Value::as_str) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => synthesize_message_id(role, &text, timestamp),
        };

        Some(MessageEvent {
            conversation_id: self.conversation_id.clone(),
            role: Role::from_author(role),
            text,
            timestamp,
            message_id,
            conversation_title: self.title.clone(),
        })
    }
}

/// Flatten message content to text; `None` when nothing textual remains.
fn message_text(content: &Value) -> Option<String> {
    let text = match content {
        Value::String(s) => s.clone(),
        Value::Object(obj) => {
            let parts = obj.get("parts")?.as_array()?;
            parts
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join("\n")
        }
        _ => return None,
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// `create_time` is usually epoch seconds; some exports use RFC 3339 strings.
pub fn parse_timestamp(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => chrono::DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.timestamp() as f64 + f64::from(dt.timestamp_subsec_micros()) / 1e6),
        _ => None,
    }
}

/// Deterministic id for messages the export left unnamed.
pub fn synthesize_message_id(role: &str, text: &str, timestamp: Option<f64>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(role.as_bytes());
    hasher.update([0u8]);
    hasher.update(text.as_bytes());
    hasher.update([0u8]);
    match timestamp {
        Some(ts) => hasher.update(ts.to_bits().to_be_bytes()),
        None => hasher.update(b"none"),
    }
    let digest = hex::encode(hasher.finalize());
    format!("synth-{}", &digest[..16])
}

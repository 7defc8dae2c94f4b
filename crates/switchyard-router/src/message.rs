//! Message declarations, payload matchers and the per-channel registry.

use crate::handler::Handler;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// Who originates a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Sent by the client, handled by the server.
    Client,
    /// Sent by the server to the client.
    Server,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::Client => write!(f, "client"),
            MessageKind::Server => write!(f, "server"),
        }
    }
}

/// Message schema: catalog metadata plus the JSON Schema of the payload.
///
/// Only `payload` is handed to the validator. The `$id` identifies the
/// message in the generated catalog.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageSchema {
    /// External identifier used by the catalog builder.
    #[serde(rename = "$id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Machine-friendly name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Human-friendly title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Short summary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Longer description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema of the payload.
    #[serde(default)]
    pub payload: Value,
}

impl MessageSchema {
    /// Create a schema for the given payload JSON Schema.
    pub fn new(payload: Value) -> Self {
        Self {
            payload,
            ..Self::default()
        }
    }

    /// Set the external identifier.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the summary.
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    /// The constant a payload property is declared to hold
    /// (`payload.properties.<field>.const`).
    pub fn discriminant(&self, field: &str) -> Option<&Value> {
        self.payload.get("properties")?.get(field)?.get("const")
    }
}

/// Selects which declaration a payload belongs to.
#[derive(Clone)]
pub enum Matcher {
    /// Every listed field must be present in the payload with a strictly
    /// equal scalar value. Numbers compare by value (`1` equals `1.0`),
    /// strings and booleans never coerce, and object or array values never
    /// match.
    ///
    /// **A matcher with zero fields matches every payload.** Register it
    /// last if it is meant as a catch-all, since the first match wins.
    Fields(Map<String, Value>),
    /// The payload field must equal the constant the declaration's schema
    /// declares for that same field. Never matches without a schema.
    Field(String),
    /// Arbitrary predicate over the payload.
    Predicate(Arc<dyn Fn(&Value) -> bool + Send + Sync>),
}

impl Matcher {
    /// Matcher on a single field value. Chain with [`Matcher::and`].
    pub fn field_eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut fields = Map::new();
        fields.insert(field.into(), value.into());
        Matcher::Fields(fields)
    }

    /// Add a field condition to a field matcher.
    ///
    /// On other matcher forms the condition is ignored.
    pub fn and(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        match self {
            Matcher::Fields(mut fields) => {
                fields.insert(field.into(), value.into());
                Matcher::Fields(fields)
            }
            other => other,
        }
    }

    /// Matcher with no fields, matching every payload.
    pub fn any() -> Self {
        Matcher::Fields(Map::new())
    }

    /// Matcher comparing a field against the schema's declared constant.
    pub fn field(name: impl Into<String>) -> Self {
        Matcher::Field(name.into())
    }

    /// Matcher backed by a predicate.
    pub fn predicate<F>(predicate: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        Matcher::Predicate(Arc::new(predicate))
    }

    /// Evaluate the matcher against a payload.
    pub fn matches(&self, payload: &Value, schema: Option<&MessageSchema>) -> bool {
        match self {
            Matcher::Fields(fields) => fields
                .iter()
                .all(|(key, expected)| payload.get(key).is_some_and(|value| scalar_eq(value, expected))),
            Matcher::Field(name) => {
                match (payload.get(name), schema.and_then(|s| s.discriminant(name))) {
                    (Some(value), Some(expected)) => scalar_eq(value, expected),
                    _ => false,
                }
            }
            Matcher::Predicate(predicate) => predicate(payload),
        }
    }
}

fn scalar_eq(value: &Value, expected: &Value) -> bool {
    match (value, expected) {
        (Value::Object(_) | Value::Array(_), _) | (_, Value::Object(_) | Value::Array(_)) => false,
        (Value::Number(a), Value::Number(b)) => {
            if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
                a == b
            } else if let (Some(a), Some(b)) = (a.as_u64(), b.as_u64()) {
                a == b
            } else {
                a.as_f64() == b.as_f64()
            }
        }
        _ => value == expected,
    }
}

impl From<Map<String, Value>> for Matcher {
    fn from(fields: Map<String, Value>) -> Self {
        Matcher::Fields(fields)
    }
}

impl fmt::Debug for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Matcher::Fields(fields) => f.debug_tuple("Fields").field(fields).finish(),
            Matcher::Field(name) => f.debug_tuple("Field").field(name).finish(),
            Matcher::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// A registered message declaration.
#[derive(Debug, Clone)]
pub struct Message {
    /// Message origin.
    pub kind: MessageKind,
    /// Payload matcher.
    pub matcher: Matcher,
    /// Optional schema.
    pub schema: Option<MessageSchema>,
    /// Handler, only meaningful for client messages.
    pub handler: Option<Handler>,
}

impl Message {
    /// Declare a client message.
    pub fn client(matcher: Matcher, schema: Option<MessageSchema>, handler: Option<Handler>) -> Self {
        Self {
            kind: MessageKind::Client,
            matcher,
            schema,
            handler,
        }
    }

    /// Declare a server message.
    pub fn server(matcher: Matcher, schema: Option<MessageSchema>) -> Self {
        Self {
            kind: MessageKind::Server,
            matcher,
            schema,
            handler: None,
        }
    }

    /// Whether this declaration is of `kind` and matches `payload`.
    pub fn matches(&self, kind: MessageKind, payload: &Value) -> bool {
        self.kind == kind && self.matcher.matches(payload, self.schema.as_ref())
    }
}

/// Ordered list of message declarations.
///
/// Lookups try declarations in registration order and return the first
/// match. Overlapping matchers are not detected.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    messages: Vec<Arc<Message>>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a declaration.
    pub fn push(&mut self, message: Message) {
        self.messages.push(Arc::new(message));
    }

    /// Append declarations shared with another registry.
    pub fn extend_from(&mut self, other: &Registry) {
        self.messages.extend(other.messages.iter().cloned());
    }

    /// Append a client message declaration.
    pub fn register_client(
        &mut self,
        matcher: Matcher,
        schema: Option<MessageSchema>,
        handler: Option<Handler>,
    ) {
        self.push(Message::client(matcher, schema, handler));
    }

    /// Append a server message declaration.
    pub fn register_server(&mut self, matcher: Matcher, schema: Option<MessageSchema>) {
        self.push(Message::server(matcher, schema));
    }

    /// First declaration of `kind` matching `payload`.
    pub fn find(&self, kind: MessageKind, payload: &Value) -> Option<Arc<Message>> {
        self.messages
            .iter()
            .find(|message| message.matches(kind, payload))
            .cloned()
    }

    /// Iterate declarations in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Message>> {
        self.messages.iter()
    }

    /// Number of declarations.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether no declaration is registered.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

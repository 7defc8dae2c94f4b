//! Chat message schemas and typed payloads.
//!
//! Each declared message has a JSON Schema (published in the catalog) and a
//! typed payload struct. [`ChatValidator`] picks the struct from the
//! schema's `type` constant, deserializes the payload strictly and runs the
//! field rules.

use crate::validation::{describe_errors, validate_chat_id, MAX_TEXT_LENGTH};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use switchyard_router::{MessageSchema, Validator};
use validator::Validate;

pub const ERROR: &str = "error";
pub const CHAT_READ: &str = "chat:read";
pub const CHAT_TYPING: &str = "chat:typing";
pub const CHAT_ADD: &str = "chat:add";
pub const CHAT_DELETE: &str = "chat:delete";
pub const CHAT_CLEAN: &str = "chat:clean";
pub const MESSAGE_ADD: &str = "message:add";
pub const USER_MESSAGE: &str = "user:message";
pub const CHAT_MESSAGE: &str = "chat:message";
pub const USER_CONNECTED: &str = "user:connected";
pub const USER_DISCONNECTED: &str = "user:disconnected";

/// `error`: backend error report.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ErrorMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[validate(length(min = 1))]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
}

impl ErrorMessage {
    pub fn new(message: impl Into<String>, code: Option<u16>) -> Self {
        Self {
            kind: ERROR.to_string(),
            message: message.into(),
            code,
        }
    }
}

/// `chat:read`: the user read every message in a chat.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ChatRead {
    #[serde(rename = "type")]
    pub kind: String,
    #[validate(custom(function = "validate_chat_id"))]
    pub chat_id: String,
}

/// `chat:typing`: the user started or stopped typing.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ChatTyping {
    #[serde(rename = "type")]
    pub kind: String,
    #[validate(custom(function = "validate_chat_id"))]
    pub chat_id: String,
    pub typing: bool,
}

/// Chat summary.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Chat {
    #[validate(custom(function = "validate_chat_id"))]
    pub chat_id: String,
    #[validate(length(min = 1, max = 128))]
    pub name: String,
}

/// `chat:add`: a chat was created.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ChatAdd {
    #[serde(rename = "type")]
    pub kind: String,
    #[validate(nested)]
    pub chat: Chat,
}

/// `chat:delete` and `chat:clean`: an operation on one chat.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ChatRef {
    #[serde(rename = "type")]
    pub kind: String,
    #[validate(custom(function = "validate_chat_id"))]
    pub chat_id: String,
}

/// Message stored in a chat.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ChatMessage {
    #[validate(length(min = 1))]
    pub message_id: String,
    #[validate(length(max = MAX_TEXT_LENGTH))]
    pub text: String,
}

/// `message:add`: a message was posted to a chat.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MessageAdd {
    #[serde(rename = "type")]
    pub kind: String,
    #[validate(custom(function = "validate_chat_id"))]
    pub chat_id: String,
    #[validate(nested)]
    pub message: ChatMessage,
}

/// `user:message`: text posted to the room.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct UserMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[validate(length(min = 1, max = MAX_TEXT_LENGTH))]
    pub text: String,
}

/// `chat:message`: text relayed to the other room members.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RoomMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[validate(length(min = 1))]
    pub user_id: String,
    #[validate(length(max = MAX_TEXT_LENGTH))]
    pub text: String,
}

/// `user:connected` and `user:disconnected`: presence update.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Presence {
    #[serde(rename = "type")]
    pub kind: String,
    #[validate(length(min = 1))]
    pub user_id: String,
    #[validate(length(min = 1))]
    pub name: String,
}

fn check<T: DeserializeOwned + Validate>(payload: &Value) -> Result<(), String> {
    let value: T = serde_json::from_value(payload.clone()).map_err(|e| e.to_string())?;
    value.validate().map_err(|e| describe_errors(&e))
}

/// Validates chat payloads with the typed structs above.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChatValidator;

impl Validator for ChatValidator {
    fn validate(&self, schema: &Value, payload: &Value) -> Result<(), String> {
        let kind = schema
            .pointer("/properties/type/const")
            .and_then(Value::as_str)
            .unwrap_or_default();

        if payload.get("type").and_then(Value::as_str) != Some(kind) {
            return Err(format!("type must be '{kind}'"));
        }

        match kind {
            ERROR => check::<ErrorMessage>(payload),
            CHAT_READ => check::<ChatRead>(payload),
            CHAT_TYPING => check::<ChatTyping>(payload),
            CHAT_ADD => check::<ChatAdd>(payload),
            CHAT_DELETE | CHAT_CLEAN => check::<ChatRef>(payload),
            MESSAGE_ADD => check::<MessageAdd>(payload),
            USER_MESSAGE => check::<UserMessage>(payload),
            CHAT_MESSAGE => check::<RoomMessage>(payload),
            USER_CONNECTED | USER_DISCONNECTED => check::<Presence>(payload),
            other => Err(format!("no validation rules for '{other}'")),
        }
    }
}

fn type_property(kind: &str) -> Value {
    json!({ "type": "string", "const": kind, "description": "Message type" })
}

fn schema(id: &str, kind: &str, description: &str, properties: Value, required: &[&str]) -> MessageSchema {
    let mut props = json!({ "type": type_property(kind) });
    if let (Some(target), Value::Object(extra)) = (props.as_object_mut(), properties) {
        target.extend(extra);
    }
    MessageSchema::new(json!({
        "$id": id,
        "type": "object",
        "properties": props,
        "required": required,
    }))
    .with_id(kind)
    .with_description(description)
}

fn chat_schema() -> Value {
    json!({
        "$id": "Chat",
        "type": "object",
        "properties": {
            "chatId": { "type": "string" },
            "name": { "type": "string" }
        }
    })
}

fn chat_message_schema() -> Value {
    json!({
        "$id": "ChatMessage",
        "type": "object",
        "properties": {
            "messageId": { "type": "string" },
            "text": { "type": "string" }
        }
    })
}

pub fn error_schema() -> MessageSchema {
    schema(
        "Error",
        ERROR,
        "Backend error message",
        json!({ "message": { "type": "string" }, "code": { "type": "number" } }),
        &["type", "message"],
    )
}

pub fn chat_read_schema() -> MessageSchema {
    schema(
        "ChatReadMessage",
        CHAT_READ,
        "User read all messages in chat",
        json!({ "chatId": { "type": "string" } }),
        &["type", "chatId"],
    )
}

pub fn chat_typing_schema() -> MessageSchema {
    schema(
        "ChatTypingMessage",
        CHAT_TYPING,
        "User start/stop typing in chat",
        json!({ "chatId": { "type": "string" }, "typing": { "type": "boolean" } }),
        &["type", "chatId", "typing"],
    )
}

pub fn chat_add_schema() -> MessageSchema {
    schema(
        "UserChatAdd",
        CHAT_ADD,
        "New chat added",
        json!({ "chat": chat_schema() }),
        &["type", "chat"],
    )
}

pub fn chat_delete_schema() -> MessageSchema {
    schema(
        "UserChatDelete",
        CHAT_DELETE,
        "Chat deleted",
        json!({ "chatId": { "type": "string" } }),
        &["type", "chatId"],
    )
}

pub fn chat_clean_schema() -> MessageSchema {
    schema(
        "UserChatCleanHistory",
        CHAT_CLEAN,
        "Chat history cleaned",
        json!({ "chatId": { "type": "string" } }),
        &["type", "chatId"],
    )
}

pub fn message_add_schema() -> MessageSchema {
    schema(
        "ChatMessageAdd",
        MESSAGE_ADD,
        "Chat message added",
        json!({ "chatId": { "type": "string" }, "message": chat_message_schema() }),
        &["type", "chatId", "message"],
    )
}

pub fn user_message_schema() -> MessageSchema {
    schema(
        USER_MESSAGE,
        USER_MESSAGE,
        "New user message",
        json!({ "text": { "type": "string", "description": "Message text" } }),
        &["type", "text"],
    )
}

pub fn chat_message_event_schema() -> MessageSchema {
    schema(
        CHAT_MESSAGE,
        CHAT_MESSAGE,
        "New message in chat",
        json!({
            "userId": { "type": "string", "description": "User Id" },
            "text": { "type": "string", "description": "Message text" }
        }),
        &["type", "userId", "text"],
    )
}

pub fn user_connected_schema() -> MessageSchema {
    presence_schema(USER_CONNECTED)
}

pub fn user_disconnected_schema() -> MessageSchema {
    presence_schema(USER_DISCONNECTED)
}

fn presence_schema(kind: &str) -> MessageSchema {
    schema(
        kind,
        kind,
        "User online status update",
        json!({
            "userId": { "type": "string", "description": "User id" },
            "name": { "type": "string", "description": "User name" }
        }),
        &["type", "userId", "name"],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_shape() {
        let schema = chat_typing_schema();
        assert_eq!(schema.id.as_deref(), Some(CHAT_TYPING));
        assert_eq!(schema.discriminant("type"), Some(&json!(CHAT_TYPING)));
        assert_eq!(schema.payload["$id"], "ChatTypingMessage");
        assert_eq!(schema.payload["properties"]["typing"]["type"], "boolean");
        assert_eq!(schema.payload["required"], json!(["type", "chatId", "typing"]));
    }

    #[test]
    fn test_validator_accepts_valid_payloads() {
        let validator = ChatValidator;
        assert!(validator
            .validate(
                &chat_read_schema().payload,
                &json!({ "type": "chat:read", "chatId": "general" })
            )
            .is_ok());
        assert!(validator
            .validate(
                &message_add_schema().payload,
                &json!({
                    "type": "message:add",
                    "chatId": "general",
                    "message": { "messageId": "m1", "text": "hello" }
                })
            )
            .is_ok());
        assert!(validator
            .validate(
                &error_schema().payload,
                &serde_json::to_value(ErrorMessage::new("Wrong token!", Some(401))).unwrap()
            )
            .is_ok());
    }

    #[test]
    fn test_validator_rejects_missing_field() {
        let err = ChatValidator
            .validate(
                &chat_typing_schema().payload,
                &json!({ "type": "chat:typing", "chatId": "general" }),
            )
            .unwrap_err();
        assert!(err.contains("typing"), "{err}");
    }

    #[test]
    fn test_validator_rejects_unknown_field() {
        let err = ChatValidator
            .validate(
                &chat_read_schema().payload,
                &json!({ "type": "chat:read", "chatId": "general", "extra": 1 }),
            )
            .unwrap_err();
        assert!(err.contains("extra"), "{err}");
    }

    #[test]
    fn test_validator_reports_field_rules() {
        let err = ChatValidator
            .validate(
                &chat_add_schema().payload,
                &json!({ "type": "chat:add", "chat": { "chatId": "bad id", "name": "" } }),
            )
            .unwrap_err();
        assert!(err.contains("must start with a letter or number"), "{err}");
        assert!(err.contains("chat.name: "), "{err}");
    }

    #[test]
    fn test_validator_checks_type_constant() {
        let err = ChatValidator
            .validate(
                &chat_read_schema().payload,
                &json!({ "type": "chat:typing", "chatId": "general" }),
            )
            .unwrap_err();
        assert_eq!(err, "type must be 'chat:read'");
    }

    #[test]
    fn test_validator_rejects_unknown_schema() {
        let err = ChatValidator
            .validate(
                &json!({ "properties": { "type": { "const": "custom" } } }),
                &json!({ "type": "custom" }),
            )
            .unwrap_err();
        assert_eq!(err, "no validation rules for 'custom'");
    }
}

//! Demo chat API.
//!
//! - root (`*`): token check, payload validation, `error` reports
//! - `/`: lobby with chat list notifications
//! - `/chat`: a room relaying user messages and presence
//!
//! Clients authenticate with `?token=<user>:<secret>`. A missing or
//! malformed token gets an `error` message with code 401 and the connection
//! is closed with 4003.

pub mod messages;

use self::messages::*;
use crate::validation::parse_token;
use serde_json::{json, Value};
use std::sync::{Arc, Weak};
use switchyard_router::{Channel, Client, Matcher, Router, RouterError, CLOSE_UNAUTHORIZED};
use tracing::{debug, info};
use uuid::Uuid;

/// Path of the lobby channel.
pub const LOBBY_PATH: &str = "/";
/// Path of the room channel.
pub const ROOM_PATH: &str = "/chat";

/// Build the chat router.
pub fn chat_router() -> Result<Router, RouterError> {
    let router = Router::new();
    router.register(configure_root)?;
    router.register(lobby)?;
    router.register(room)?;
    Ok(router)
}

/// Root setup shared by every channel. Must run before channels are
/// mounted so they inherit it.
fn configure_root(router: &Router) -> Result<(), RouterError> {
    let root = router.root();
    root.set_validator(ChatValidator);
    root.middleware(authenticate);
    root.server_message(Matcher::field_eq("type", ERROR), Some(error_schema()));

    root.on_error(|event| {
        debug!(client_id = %event.client.id, error = %event.message, "Reporting error to client");
        spawn_send(
            Arc::clone(&event.client),
            error_payload(&event.message, None),
        );
    });
    Ok(())
}

fn lobby(router: &Router) -> Result<(), RouterError> {
    let lobby = router.route(LOBBY_PATH)?;

    lobby.client_message(
        Matcher::field_eq("type", CHAT_READ),
        Some(chat_read_schema()),
        |client, data| async move {
            let read: ChatRead = serde_json::from_value(data)?;
            debug!(client_id = %client.id, chat_id = %read.chat_id, "Chat read");
            client.set_state("lastRead", Value::String(read.chat_id));
            Ok(())
        },
    );

    lobby.client_message(
        Matcher::field_eq("type", CHAT_TYPING),
        Some(chat_typing_schema()),
        |client, data| async move {
            let typing: ChatTyping = serde_json::from_value(data)?;
            debug!(client_id = %client.id, chat_id = %typing.chat_id, typing = typing.typing, "Typing status");
            Ok(())
        },
    );

    lobby.server_message(Matcher::field_eq("type", CHAT_ADD), Some(chat_add_schema()));
    lobby.server_message(Matcher::field_eq("type", CHAT_DELETE), Some(chat_delete_schema()));
    lobby.server_message(Matcher::field_eq("type", CHAT_CLEAN), Some(chat_clean_schema()));
    lobby.server_message(Matcher::field_eq("type", MESSAGE_ADD), Some(message_add_schema()));
    Ok(())
}

fn room(router: &Router) -> Result<(), RouterError> {
    let room = router.route(ROOM_PATH)?;
    let members = Arc::downgrade(&room);

    room.client_message(
        Matcher::field_eq("type", USER_MESSAGE),
        Some(user_message_schema()),
        move |client, data| {
            let members = members.clone();
            async move {
                let message: UserMessage = serde_json::from_value(data)?;
                let payload = json!({
                    "type": CHAT_MESSAGE,
                    "userId": state_str(&client, "userId"),
                    "text": message.text,
                });
                for other in others(&members, &client) {
                    if let Err(e) = other.send(payload.clone()).await {
                        debug!(client_id = %other.id, error = %e, "Relay failed");
                    }
                }
                Ok(())
            }
        },
    );

    room.server_message(Matcher::field_eq("type", CHAT_MESSAGE), Some(chat_message_event_schema()));
    room.server_message(Matcher::field_eq("type", USER_CONNECTED), Some(user_connected_schema()));
    room.server_message(
        Matcher::field_eq("type", USER_DISCONNECTED),
        Some(user_disconnected_schema()),
    );

    let members = Arc::downgrade(&room);
    room.on_connect(move |client| {
        for other in others(&members, client) {
            spawn_send(Arc::clone(&other), presence(USER_CONNECTED, client));
            spawn_send(Arc::clone(client), presence(USER_CONNECTED, &other));
        }
    });

    let members = Arc::downgrade(&room);
    room.on_disconnect(move |client, _code, _reason| {
        for other in others(&members, client) {
            spawn_send(other, presence(USER_DISCONNECTED, client));
        }
    });
    Ok(())
}

/// Token check run for every connection.
async fn authenticate(client: Arc<Client>) -> Result<(), RouterError> {
    let token = client.query_param("token").unwrap_or_default();
    match parse_token(&token) {
        Ok(user) => {
            let user_id = Uuid::new_v4().simple().to_string();
            info!(client_id = %client.id, user_id = %user_id, name = %user, "Client authenticated");
            client.set_state("userId", Value::String(user_id));
            client.set_state("name", Value::String(user.to_string()));
        }
        Err(e) => {
            let message = e.message.map(|m| m.to_string()).unwrap_or_default();
            if let Err(e) = client.send(error_payload(&message, Some(401))).await {
                debug!(client_id = %client.id, error = %e, "Could not report rejected token");
            }
            client.terminate(CLOSE_UNAUTHORIZED, "");
        }
    }
    Ok(())
}

fn error_payload(message: &str, code: Option<u16>) -> Value {
    serde_json::to_value(ErrorMessage::new(message, code))
        .unwrap_or_else(|_| json!({ "type": ERROR, "message": message }))
}

fn presence(kind: &str, client: &Arc<Client>) -> Value {
    json!({
        "type": kind,
        "userId": state_str(client, "userId"),
        "name": state_str(client, "name"),
    })
}

fn state_str(client: &Client, key: &str) -> String {
    client
        .get_state(key)
        .and_then(|v| v.as_str().map(String::from))
        .unwrap_or_default()
}

/// Members of a channel other than `client`.
fn others(channel: &Weak<Channel>, client: &Arc<Client>) -> Vec<Arc<Client>> {
    channel
        .upgrade()
        .map(|channel| {
            channel
                .clients()
                .into_iter()
                .filter(|c| c.id != client.id)
                .collect()
        })
        .unwrap_or_default()
}

/// Send from a synchronous listener.
fn spawn_send(client: Arc<Client>, payload: Value) {
    tokio::spawn(async move {
        if let Err(e) = client.send(payload).await {
            debug!(client_id = %client.id, error = %e, "Delivery failed");
        }
    });
}

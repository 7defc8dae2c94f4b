//! # Switchyard Router
//!
//! Declarative message routing for WebSocket servers.
//!
//! Connections are routed by path to channels. Each channel declares the
//! messages it accepts from clients and the messages it may send back,
//! optionally with a JSON Schema per message, and runs every frame through a
//! staged hook pipeline.
//!
//! ## Features
//!
//! - **Router**: path resolution with `{param}` segments and a wildcard fallback
//! - **Channels**: middleware, message declarations, hooks and codecs per path
//! - **Matchers**: select a declaration by field values, a schema constant or a predicate
//! - **Outbound validation**: server messages are checked before they reach the socket
//! - **Mock transport**: drive the full lifecycle in-process
//!
//! ## Example
//!
//! ```rust
//! use serde_json::{json, Value};
//! use std::sync::Arc;
//! use switchyard_router::{Client, Matcher, MockTransport, Router};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let router = Arc::new(Router::new());
//! let rooms = router.route("/rooms/{id}").unwrap();
//!
//! rooms.client_message(
//!     Matcher::field_eq("type", "ping"),
//!     None,
//!     |client: Arc<Client>, _payload: Value| async move {
//!         let room = client.path_param("id").unwrap_or_default();
//!         client.send(json!({"type": "pong", "room": room})).await
//!     },
//! );
//!
//! let transport = MockTransport::new(router.clone());
//! let mut connection = transport.connect("/rooms/42").await;
//! connection.send_json(&json!({"type": "ping"})).await;
//!
//! assert_eq!(
//!     connection.recv_json().await,
//!     Some(json!({"type": "pong", "room": "42"}))
//! );
//! # }
//! ```
//!
//! ## Message Lifecycle
//!
//! ```text
//! inbound:  frame ─▶ onMessage ─▶ preParse ─▶ parse ─▶ match ─▶ preValidation
//!                    ─▶ validate ─▶ preHandler ─▶ handler
//!
//! outbound: payload ─▶ preValidation ─▶ match server message ─▶ validate
//!                    ─▶ preSerialization ─▶ serialize ─▶ preSend ─▶ socket
//! ```
//!
//! Per-message failures (unparseable frame, unknown message, missing
//! handler, invalid payload, failing handler) are reported to the channel's
//! `error` listeners and never close the connection.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │                 Router                    │
//! │  ┌──────────────┐   ┌──────────────────┐ │
//! │  │ root ("*")   │◀──│ mounted channels │ │
//! │  │  defaults    │   │  /chat           │ │
//! │  │  listeners   │   │  /rooms/{id}     │ │
//! │  └──────────────┘   └──────────────────┘ │
//! │          ▲ connect / message / close      │
//! └──────────┼───────────────────────────────┘
//!            │
//!     Transport (axum, mock) ──▶ Socket
//! ```

pub mod channel;
pub mod client;
pub mod codec;
pub mod error;
pub mod handler;
pub mod hooks;
pub mod message;
pub mod mock;
pub mod path;
pub mod router;
pub mod transport;
pub mod validator;

// Re-export main types
pub use channel::{
    Channel, ChannelDescription, ChannelOptions, ChannelStats, ErrorEvent, MessageDescription,
    HANDLER_NOT_IMPLEMENTED, MESSAGE_NOT_FOUND, UNEXPECTED_PAYLOAD, UNHANDLED_ERROR,
};
pub use client::{Client, ClientId, ClientMetadata, ClientStatus, HeaderValue, Headers};
pub use codec::{JsonCodec, Parser, RawCodec, Serializer};
pub use error::RouterError;
pub use handler::{Handler, Middleware};
pub use hooks::{FrameStage, Hook, HookPipeline, ValueStage};
pub use message::{Matcher, Message, MessageKind, MessageSchema, Registry};
pub use mock::{MockConnection, MockSocket, MockTransport};
pub use path::{parse_query, PathPattern, WILDCARD};
pub use router::{Router, MIDDLEWARE_ERROR};
pub use transport::{Frame, Socket, CLOSE_MIDDLEWARE_ERROR, CLOSE_NO_CHANNEL, CLOSE_UNAUTHORIZED};
pub use validator::Validator;

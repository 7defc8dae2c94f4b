//! Client connection state.

use crate::channel::Channel;
use crate::error::RouterError;
use crate::path::split_target;
use crate::transport::{Frame, Socket};
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

/// Unique identifier for a connected client.
pub type ClientId = String;

/// Connection status. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ClientStatus {
    /// Transport accepted the socket, handshake in progress.
    Connecting = 0,
    /// Socket is open.
    Connected = 1,
    /// Close requested.
    Disconnecting = 2,
    /// Socket closed.
    Disconnected = 3,
}

impl ClientStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ClientStatus::Connecting,
            1 => ClientStatus::Connected,
            2 => ClientStatus::Disconnecting,
            _ => ClientStatus::Disconnected,
        }
    }

    /// Whether the connection is closing or closed.
    pub fn is_closing(self) -> bool {
        self >= ClientStatus::Disconnecting
    }
}

/// A request header value, single or repeated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HeaderValue {
    /// Header sent once.
    Single(String),
    /// Header sent several times.
    Multi(Vec<String>),
}

impl HeaderValue {
    /// First value of the header.
    pub fn first(&self) -> Option<&str> {
        match self {
            HeaderValue::Single(value) => Some(value),
            HeaderValue::Multi(values) => values.first().map(String::as_str),
        }
    }
}

/// Request headers keyed by lowercase name.
pub type Headers = HashMap<String, HeaderValue>;

/// A connected WebSocket client.
pub struct Client {
    /// Unique client identifier.
    pub id: ClientId,
    /// Request path, without the query string.
    path: String,
    /// Raw query string, without the leading `?`.
    query: String,
    /// Request headers.
    headers: Headers,
    /// Current [`ClientStatus`].
    status: AtomicU8,
    /// Transport handle.
    socket: Arc<dyn Socket>,
    /// Application state.
    state: RwLock<Map<String, Value>>,
    /// Parameters captured from the channel path pattern.
    path_params: RwLock<HashMap<String, String>>,
    /// Parsed query string.
    query_params: RwLock<HashMap<String, String>>,
    /// Channel whose outbound pipeline `send` goes through.
    outbound: OnceCell<Weak<Channel>>,
    /// Channel the client joined.
    channel: OnceCell<Weak<Channel>>,
    /// Connection metadata.
    pub metadata: ClientMetadata,
}

impl Client {
    /// Create a client for a socket connected at `target` (path and query).
    pub fn new(socket: Arc<dyn Socket>, target: &str) -> Self {
        let (path, query) = split_target(target);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            path,
            query,
            headers: Headers::new(),
            status: AtomicU8::new(ClientStatus::Connecting as u8),
            socket,
            state: RwLock::new(Map::new()),
            path_params: RwLock::new(HashMap::new()),
            query_params: RwLock::new(HashMap::new()),
            outbound: OnceCell::new(),
            channel: OnceCell::new(),
            metadata: ClientMetadata::now(),
        }
    }

    /// Attach request headers. Names are lowercased.
    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers
            .into_iter()
            .map(|(name, value)| (name.to_lowercase(), value))
            .collect();
        self
    }

    /// Attach connection metadata.
    pub fn with_metadata(mut self, metadata: ClientMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Request path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Raw query string.
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Request headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// First value of a header.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).and_then(HeaderValue::first)
    }

    /// Current status.
    pub fn status(&self) -> ClientStatus {
        ClientStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    /// Move the status forward. Returns `false` if the client was already
    /// at or past `next`; the status never regresses.
    pub fn advance_status(&self, next: ClientStatus) -> bool {
        self.status.fetch_max(next as u8, Ordering::AcqRel) < next as u8
    }

    /// Path parameters captured at connect time.
    pub fn path_params(&self) -> HashMap<String, String> {
        self.path_params.read().clone()
    }

    /// A single path parameter.
    pub fn path_param(&self, name: &str) -> Option<String> {
        self.path_params.read().get(name).cloned()
    }

    /// Query parameters parsed at connect time.
    pub fn query_params(&self) -> HashMap<String, String> {
        self.query_params.read().clone()
    }

    /// A single query parameter.
    pub fn query_param(&self, name: &str) -> Option<String> {
        self.query_params.read().get(name).cloned()
    }

    /// Read a state entry.
    pub fn get_state(&self, key: &str) -> Option<Value> {
        self.state.read().get(key).cloned()
    }

    /// Write a state entry, returning the previous value.
    pub fn set_state(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.state.write().insert(key.into(), value)
    }

    /// Run a closure with mutable access to the whole state.
    pub fn with_state<R>(&self, f: impl FnOnce(&mut Map<String, Value>) -> R) -> R {
        f(&mut self.state.write())
    }

    /// The channel this client joined, once connected.
    pub fn channel(&self) -> Option<Arc<Channel>> {
        self.channel.get().and_then(Weak::upgrade)
    }

    /// Send a payload through the channel's outbound pipeline
    /// (validation, hooks, serialization) to the transport.
    pub async fn send(self: &Arc<Self>, payload: Value) -> Result<(), RouterError> {
        let channel = self
            .outbound
            .get()
            .and_then(Weak::upgrade)
            .ok_or(RouterError::ChannelNotBound)?;
        channel.deliver(self, payload).await
    }

    /// Like [`Client::send`], also reporting the outcome to a callback.
    ///
    /// The callback receives `None` once the transport accepted the frame,
    /// or the error; the same outcome is returned.
    pub async fn send_with<F>(self: &Arc<Self>, payload: Value, callback: F) -> Result<(), RouterError>
    where
        F: FnOnce(Option<&RouterError>) + Send,
    {
        let result = self.send(payload).await;
        callback(result.as_ref().err());
        result
    }

    /// Write a frame straight to the transport, bypassing the pipeline.
    pub async fn send_raw(&self, frame: Frame) -> Result<(), RouterError> {
        self.socket.send(frame).await
    }

    /// Close the connection.
    pub fn terminate(&self, code: u16, reason: &str) {
        self.advance_status(ClientStatus::Disconnecting);
        debug!(client_id = %self.id, code, reason, "Terminating client");
        self.socket.terminate(code, reason);
    }

    pub(crate) fn set_path_params(&self, params: HashMap<String, String>) {
        *self.path_params.write() = params;
    }

    pub(crate) fn set_query_params(&self, params: HashMap<String, String>) {
        *self.query_params.write() = params;
    }

    pub(crate) fn install_outbound(&self, channel: Weak<Channel>) {
        let _ = self.outbound.set(channel);
    }

    pub(crate) fn bind_channel(&self, channel: Weak<Channel>) {
        let _ = self.channel.set(channel);
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("query", &self.query)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

/// Metadata about a client connection.
#[derive(Debug, Clone, Default)]
pub struct ClientMetadata {
    /// When the client connected (Unix timestamp).
    pub connected_at: u64,
    /// Client IP address.
    pub ip_address: Option<String>,
    /// User agent string.
    pub user_agent: Option<String>,
}

impl ClientMetadata {
    /// Create metadata with current timestamp.
    pub fn now() -> Self {
        Self {
            connected_at: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
            ip_address: None,
            user_agent: None,
        }
    }
}

//! Channels: message registry, hooks and the connection lifecycle.

use crate::client::{Client, ClientId};
use crate::codec::{JsonCodec, Parser, Serializer};
use crate::error::RouterError;
use crate::handler::{Handler, Middleware};
use crate::hooks::{FrameStage, Hook, HookPipeline, ValueStage};
use crate::message::{Matcher, Message, MessageKind, MessageSchema, Registry};
use crate::path::{parse_query, PathPattern};
use crate::transport::Frame;
use crate::validator::Validator;
use futures::FutureExt;
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

/// Reported when a payload cannot be parsed.
pub const UNEXPECTED_PAYLOAD: &str = "Unexpected message payload";
/// Reported when no client message declaration matches.
pub const MESSAGE_NOT_FOUND: &str = "Message not found";
/// Reported when the matching declaration has no handler.
pub const HANDLER_NOT_IMPLEMENTED: &str = "Handler not implemented";
/// Reported when a hook or handler fails.
pub const UNHANDLED_ERROR: &str = "Unhandled error";

/// Options used to build a [`Channel`].
#[derive(Clone, Default)]
pub struct ChannelOptions {
    /// Channel path pattern. Defaults to `/`.
    pub path: Option<String>,
    /// Declarations registered up front.
    pub messages: Vec<Message>,
    /// Frame parser. Defaults to JSON.
    pub parser: Option<Arc<dyn Parser>>,
    /// Payload serializer. Defaults to JSON.
    pub serializer: Option<Arc<dyn Serializer>>,
    /// Payload validator. Without one, schemas are not checked.
    pub validator: Option<Arc<dyn Validator>>,
}

impl ChannelOptions {
    /// Empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the path pattern.
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Add a declaration.
    pub fn message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    /// Set the parser.
    pub fn parser(mut self, parser: impl Parser + 'static) -> Self {
        self.parser = Some(Arc::new(parser));
        self
    }

    /// Set the serializer.
    pub fn serializer(mut self, serializer: impl Serializer + 'static) -> Self {
        self.serializer = Some(Arc::new(serializer));
        self
    }

    /// Set parser and serializer from one codec.
    pub fn codec<C>(mut self, codec: C) -> Self
    where
        C: Parser + Serializer + 'static,
    {
        let codec = Arc::new(codec);
        self.parser = Some(codec.clone());
        self.serializer = Some(codec);
        self
    }

    /// Set the validator.
    pub fn validator(mut self, validator: impl Validator + 'static) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }
}

impl fmt::Debug for ChannelOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelOptions")
            .field("path", &self.path)
            .field("messages", &self.messages.len())
            .field("parser", &self.parser.is_some())
            .field("serializer", &self.serializer.is_some())
            .field("validator", &self.validator.is_some())
            .finish()
    }
}

/// A per-message failure reported to `error` listeners.
#[derive(Debug, Clone)]
pub struct ErrorEvent {
    /// Client the failure relates to.
    pub client: Arc<Client>,
    /// What went wrong.
    pub message: String,
    /// Offending data, if any.
    pub data: Option<Value>,
}

type ConnectListener = Arc<dyn Fn(&Arc<Client>) + Send + Sync>;
type DisconnectListener = Arc<dyn Fn(&Arc<Client>, Option<u16>, Option<&str>) + Send + Sync>;
type ErrorListener = Arc<dyn Fn(&ErrorEvent) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    connect: Vec<ConnectListener>,
    disconnect: Vec<DisconnectListener>,
    error: Vec<ErrorListener>,
}

#[derive(Clone, Default)]
struct Settings {
    messages: Registry,
    middlewares: Vec<Middleware>,
    hooks: HookPipeline,
    parser: Option<Arc<dyn Parser>>,
    serializer: Option<Arc<dyn Serializer>>,
    validator: Option<Arc<dyn Validator>>,
}

impl Settings {
    fn parser(&self) -> Arc<dyn Parser> {
        self.parser.clone().unwrap_or_else(|| Arc::new(JsonCodec))
    }

    fn serializer(&self) -> Arc<dyn Serializer> {
        self.serializer.clone().unwrap_or_else(|| Arc::new(JsonCodec))
    }
}

/// Channel statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChannelStats {
    /// Current number of connections.
    pub current_connections: usize,
    /// Total connections since start.
    pub total_connections: u64,
    /// Total inbound messages since start.
    pub total_messages: u64,
    /// Total error events since start.
    pub total_errors: u64,
}

/// Catalog data for one declaration.
#[derive(Debug, Clone, Serialize)]
pub struct MessageDescription {
    /// Message origin.
    pub kind: MessageKind,
    /// Declared schema.
    pub schema: Option<MessageSchema>,
}

/// Catalog data for one channel.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelDescription {
    /// Path pattern.
    pub path: String,
    /// Path parameter names.
    pub parameters: Vec<String>,
    /// Declarations in registration order.
    pub messages: Vec<MessageDescription>,
}

/// A path-scoped set of message declarations, middleware and hooks.
///
/// Channels are shared as `Arc<Channel>`; registration methods take `&self`
/// and may be called at any time, affecting connections and messages that
/// start afterwards.
pub struct Channel {
    path: PathPattern,
    settings: RwLock<Settings>,
    clients: RwLock<HashMap<ClientId, Arc<Client>>>,
    listeners: RwLock<Listeners>,
    parent: OnceCell<Weak<Channel>>,
    stats: RwLock<ChannelStats>,
}

impl Channel {
    /// Create a channel at `path`.
    pub fn new(path: impl Into<String>) -> Self {
        Self::with_options(ChannelOptions::new().path(path))
    }

    /// Create a channel from options.
    pub fn with_options(options: ChannelOptions) -> Self {
        let mut messages = Registry::new();
        for message in options.messages {
            messages.push(message);
        }

        Self {
            path: PathPattern::parse(options.path.unwrap_or_else(|| "/".to_string())),
            settings: RwLock::new(Settings {
                messages,
                middlewares: Vec::new(),
                hooks: HookPipeline::new(),
                parser: options.parser,
                serializer: options.serializer,
                validator: options.validator,
            }),
            clients: RwLock::new(HashMap::new()),
            listeners: RwLock::new(Listeners::default()),
            parent: OnceCell::new(),
            stats: RwLock::new(ChannelStats::default()),
        }
    }

    /// Path pattern as written.
    pub fn path(&self) -> &str {
        self.path.as_str()
    }

    /// Parsed path pattern.
    pub fn pattern(&self) -> &PathPattern {
        &self.path
    }

    /// Whether this is the wildcard channel.
    pub fn is_wildcard(&self) -> bool {
        self.path.is_wildcard()
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    /// Append a connection middleware.
    pub fn middleware<F, Fut>(&self, middleware: F)
    where
        F: Fn(Arc<Client>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), RouterError>> + Send + 'static,
    {
        self.settings
            .write()
            .middlewares
            .push(Middleware::new(middleware));
    }

    /// Append a hook to a frame stage.
    pub fn add_frame_hook<F, Fut>(&self, stage: FrameStage, hook: F)
    where
        F: Fn(Arc<Client>, Frame) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Frame, RouterError>> + Send + 'static,
    {
        self.settings
            .write()
            .hooks
            .add_frame_hook(stage, Hook::new(hook));
    }

    /// Append a hook to a value stage.
    pub fn add_value_hook<F, Fut>(&self, stage: ValueStage, hook: F)
    where
        F: Fn(Arc<Client>, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, RouterError>> + Send + 'static,
    {
        self.settings
            .write()
            .hooks
            .add_value_hook(stage, Hook::new(hook));
    }

    /// Declare a client message with a handler.
    pub fn client_message<F, Fut>(&self, matcher: Matcher, schema: Option<MessageSchema>, handler: F)
    where
        F: Fn(Arc<Client>, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), RouterError>> + Send + 'static,
    {
        self.settings
            .write()
            .messages
            .register_client(matcher, schema, Some(Handler::new(handler)));
    }

    /// Declare a client message without a handler.
    ///
    /// Matching messages are reported as "Handler not implemented"; the
    /// declaration still appears in the catalog.
    pub fn declare_client_message(&self, matcher: Matcher, schema: Option<MessageSchema>) {
        self.settings
            .write()
            .messages
            .register_client(matcher, schema, None);
    }

    /// Declare a server message.
    pub fn server_message(&self, matcher: Matcher, schema: Option<MessageSchema>) {
        self.settings
            .write()
            .messages
            .register_server(matcher, schema);
    }

    /// Append a prebuilt declaration.
    pub fn register_message(&self, message: Message) {
        self.settings.write().messages.push(message);
    }

    /// Replace the parser.
    pub fn set_parser(&self, parser: impl Parser + 'static) {
        self.settings.write().parser = Some(Arc::new(parser));
    }

    /// Replace the serializer.
    pub fn set_serializer(&self, serializer: impl Serializer + 'static) {
        self.settings.write().serializer = Some(Arc::new(serializer));
    }

    /// Replace the validator.
    pub fn set_validator(&self, validator: impl Validator + 'static) {
        self.settings.write().validator = Some(Arc::new(validator));
    }

    /// Whether a validator is configured.
    pub fn has_validator(&self) -> bool {
        self.settings.read().validator.is_some()
    }

    /// Number of middlewares in the chain.
    pub fn middleware_count(&self) -> usize {
        self.settings.read().middlewares.len()
    }

    // ------------------------------------------------------------------
    // Listeners
    // ------------------------------------------------------------------

    /// Listen for clients joining the channel.
    pub fn on_connect<F>(&self, listener: F)
    where
        F: Fn(&Arc<Client>) + Send + Sync + 'static,
    {
        self.listeners.write().connect.push(Arc::new(listener));
    }

    /// Listen for clients leaving the channel.
    pub fn on_disconnect<F>(&self, listener: F)
    where
        F: Fn(&Arc<Client>, Option<u16>, Option<&str>) + Send + Sync + 'static,
    {
        self.listeners.write().disconnect.push(Arc::new(listener));
    }

    /// Listen for per-message failures.
    pub fn on_error<F>(&self, listener: F)
    where
        F: Fn(&ErrorEvent) + Send + Sync + 'static,
    {
        self.listeners.write().error.push(Arc::new(listener));
    }

    // ------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------

    /// Whether a concrete path matches this channel's pattern.
    pub fn matches_path(&self, path: &str) -> bool {
        self.path.matches(path)
    }

    /// First client declaration matching `payload`.
    pub fn find_client_message(&self, payload: &Value) -> Option<Arc<Message>> {
        self.settings.read().messages.find(MessageKind::Client, payload)
    }

    /// First server declaration matching `payload`.
    pub fn find_server_message(&self, payload: &Value) -> Option<Arc<Message>> {
        self.settings.read().messages.find(MessageKind::Server, payload)
    }

    /// All declarations in registration order.
    pub fn messages(&self) -> Vec<Arc<Message>> {
        self.settings.read().messages.iter().cloned().collect()
    }

    /// Catalog data for this channel.
    pub fn describe(&self) -> ChannelDescription {
        ChannelDescription {
            path: self.path().to_string(),
            parameters: self
                .path
                .param_names()
                .into_iter()
                .map(str::to_string)
                .collect(),
            messages: self
                .settings
                .read()
                .messages
                .iter()
                .map(|message| MessageDescription {
                    kind: message.kind,
                    schema: message.schema.clone(),
                })
                .collect(),
        }
    }

    // ------------------------------------------------------------------
    // Clients
    // ------------------------------------------------------------------

    /// Connected clients.
    pub fn clients(&self) -> Vec<Arc<Client>> {
        self.clients.read().values().cloned().collect()
    }

    /// A connected client by ID.
    pub fn get_client(&self, client_id: &str) -> Option<Arc<Client>> {
        self.clients.read().get(client_id).cloned()
    }

    /// Number of connected clients.
    pub fn client_count(&self) -> usize {
        self.clients.read().len()
    }

    /// Channel statistics.
    pub fn stats(&self) -> ChannelStats {
        let mut stats = self.stats.read().clone();
        stats.current_connections = self.client_count();
        stats
    }

    /// Send a payload to every connected client through their outbound
    /// pipelines. Returns how many deliveries succeeded.
    pub async fn broadcast(&self, payload: &Value) -> usize {
        let mut delivered = 0;
        for client in self.clients() {
            match client.send(payload.clone()).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    debug!(client_id = %client.id, error = %e, "Broadcast delivery failed")
                }
            }
        }
        debug!(channel = %self.path, recipients = delivered, "Payload broadcast");
        delivered
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Run the connect sequence for a client routed to this channel.
    ///
    /// Returns `Ok(true)` once the client joined, `Ok(false)` if a middleware
    /// closed the connection, and the middleware's error otherwise. In the
    /// last two cases the client never enters the client set.
    pub async fn connect(self: &Arc<Self>, client: &Arc<Client>) -> Result<bool, RouterError> {
        if self.path.has_params() {
            client.set_path_params(self.path.extract_params(client.path()));
        }
        if !client.query().is_empty() {
            client.set_query_params(parse_query(client.query()));
        }
        client.install_outbound(Arc::downgrade(self));

        let middlewares = self.settings.read().middlewares.clone();
        for middleware in middlewares {
            let result = middleware.call(Arc::clone(client)).await;
            if client.status().is_closing() {
                if let Err(e) = &result {
                    debug!(client_id = %client.id, error = %e, "Middleware failed after closing the connection");
                }
                info!(client_id = %client.id, channel = %self.path, "Connection closed by middleware");
                return Ok(false);
            }
            result?;
        }

        self.clients
            .write()
            .insert(client.id.clone(), Arc::clone(client));
        client.bind_channel(Arc::downgrade(self));
        self.stats.write().total_connections += 1;

        info!(client_id = %client.id, channel = %self.path, "Client connected");

        let listeners = self.listeners.read().connect.clone();
        for listener in listeners {
            listener(client);
        }
        Ok(true)
    }

    /// Process one inbound frame.
    ///
    /// Every failure is reported as an error event; none of them closes the
    /// connection.
    pub async fn handle_message(&self, client: &Arc<Client>, frame: Frame) {
        self.stats.write().total_messages += 1;

        let mut last = frame.to_value();
        let outcome = AssertUnwindSafe(self.dispatch(client, frame, &mut last))
            .catch_unwind()
            .await;

        let failure = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(e)) => e.to_string(),
            Err(_) => "handler panicked".to_string(),
        };
        warn!(client_id = %client.id, channel = %self.path, error = %failure, "Message processing failed");
        self.report_error(client, UNHANDLED_ERROR, Some(last));
    }

    async fn dispatch(
        &self,
        client: &Arc<Client>,
        frame: Frame,
        last: &mut Value,
    ) -> Result<(), RouterError> {
        let (hooks, parser, validator) = {
            let settings = self.settings.read();
            (settings.hooks.clone(), settings.parser(), settings.validator.clone())
        };

        let frame = hooks.run_frames(FrameStage::OnMessage, client, frame).await?;
        let frame = hooks.run_frames(FrameStage::PreParse, client, frame).await?;
        *last = frame.to_value();

        let mut payload = match parser.parse(&frame) {
            Ok(payload) => payload,
            Err(e) => {
                debug!(client_id = %client.id, error = %e, "Failed to parse message");
                self.report_error(client, UNEXPECTED_PAYLOAD, Some(frame.to_value()));
                return Ok(());
            }
        };
        *last = payload.clone();

        let Some(message) = self.find_client_message(&payload) else {
            self.report_error(client, MESSAGE_NOT_FOUND, Some(payload));
            return Ok(());
        };

        let Some(handler) = message.handler.clone() else {
            self.report_error(client, HANDLER_NOT_IMPLEMENTED, Some(payload));
            return Ok(());
        };

        if let (Some(schema), Some(validator)) = (message.schema.as_ref(), validator) {
            payload = hooks
                .run_values(ValueStage::PreValidation, client, payload)
                .await?;
            *last = payload.clone();

            if let Err(reason) = validator.validate(&schema.payload, &payload) {
                self.report_error(client, reason, Some(payload));
                return Ok(());
            }
        }

        payload = hooks
            .run_values(ValueStage::PreHandler, client, payload)
            .await?;
        *last = payload.clone();

        debug!(client_id = %client.id, channel = %self.path, "Dispatching message to handler");
        handler.call(Arc::clone(client), payload).await
    }

    /// Outbound pipeline behind [`Client::send`].
    pub(crate) async fn deliver(&self, client: &Arc<Client>, payload: Value) -> Result<(), RouterError> {
        let (hooks, serializer, validator) = {
            let settings = self.settings.read();
            (settings.hooks.clone(), settings.serializer(), settings.validator.clone())
        };

        let mut payload = payload;
        if let Some(validator) = validator {
            payload = hooks
                .run_values(ValueStage::PreValidation, client, payload)
                .await?;

            let message = self
                .find_server_message(&payload)
                .ok_or(RouterError::SchemaNotFound)?;

            if let Some(schema) = &message.schema {
                validator
                    .validate(&schema.payload, &payload)
                    .map_err(RouterError::InvalidPayload)?;
            }
        }

        let payload = hooks
            .run_values(ValueStage::PreSerialization, client, payload)
            .await?;
        let frame = serializer.serialize(&payload)?;
        let frame = hooks.run_frames(FrameStage::PreSend, client, frame).await?;

        client.send_raw(frame).await
    }

    /// Remove a client. Removing an absent client is a no-op.
    pub fn disconnect(&self, client: &Arc<Client>, code: Option<u16>, reason: Option<&str>) {
        if self.clients.write().remove(&client.id).is_none() {
            return;
        }
        info!(client_id = %client.id, channel = %self.path, code = ?code, "Client disconnected");
        self.emit_disconnect(client, code, reason);
    }

    /// Report a per-message failure to error listeners, then to the parent
    /// router's listeners.
    pub fn report_error(&self, client: &Arc<Client>, message: impl Into<String>, data: Option<Value>) {
        let event = ErrorEvent {
            client: Arc::clone(client),
            message: message.into(),
            data,
        };
        debug!(client_id = %client.id, channel = %self.path, error = %event.message, "Channel error");
        self.emit_error(&event);
    }

    fn emit_error(&self, event: &ErrorEvent) {
        self.stats.write().total_errors += 1;
        let listeners = self.listeners.read().error.clone();
        for listener in listeners {
            listener(event);
        }
        if let Some(parent) = self.parent() {
            parent.emit_error(event);
        }
    }

    fn emit_disconnect(&self, client: &Arc<Client>, code: Option<u16>, reason: Option<&str>) {
        let listeners = self.listeners.read().disconnect.clone();
        for listener in listeners {
            listener(client, code, reason);
        }
        if let Some(parent) = self.parent() {
            parent.emit_disconnect(client, code, reason);
        }
    }

    fn parent(&self) -> Option<Arc<Channel>> {
        self.parent.get().and_then(Weak::upgrade)
    }

    /// Take defaults from the router's root channel.
    ///
    /// Codecs and validator are inherited only where this channel has none.
    /// A wildcard root also contributes its middleware (run first) and its
    /// current declarations (tried last).
    pub(crate) fn inherit(&self, root: &Arc<Channel>) {
        {
            let parent = root.settings.read();
            let mut settings = self.settings.write();

            if settings.parser.is_none() {
                settings.parser = parent.parser.clone();
            }
            if settings.serializer.is_none() {
                settings.serializer = parent.serializer.clone();
            }
            if settings.validator.is_none() {
                settings.validator = parent.validator.clone();
            }

            if root.is_wildcard() {
                let mut middlewares = parent.middlewares.clone();
                middlewares.append(&mut settings.middlewares);
                settings.middlewares = middlewares;
                settings.messages.extend_from(&parent.messages);
            }
        }
        let _ = self.parent.set(Arc::downgrade(root));
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("path", &self.path.as_str())
            .field("clients", &self.client_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientStatus;
    use crate::mock::MockSocket;
    use parking_lot::Mutex;
    use serde_json::json;
    use tokio::sync::mpsc;

    fn connected_client(target: &str) -> (Arc<Client>, mpsc::UnboundedReceiver<Frame>) {
        let (socket, rx) = MockSocket::new();
        let client = Arc::new(Client::new(socket, target));
        client.advance_status(ClientStatus::Connected);
        (client, rx)
    }

    fn collect_errors(channel: &Channel) -> Arc<Mutex<Vec<(String, Option<Value>)>>> {
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = errors.clone();
        channel.on_error(move |event| {
            sink.lock().push((event.message.clone(), event.data.clone()));
        });
        errors
    }

    fn require_fields(schema: &Value, payload: &Value) -> Result<(), String> {
        let required = schema["required"].as_array().cloned().unwrap_or_default();
        for field in required.iter().filter_map(Value::as_str) {
            if payload.get(field).is_none() {
                return Err(format!("must have required property '{field}'"));
            }
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_connect_adds_client() {
        let channel = Arc::new(Channel::new("/chat"));
        let joined = Arc::new(Mutex::new(0));
        let counter = joined.clone();
        channel.on_connect(move |_client| *counter.lock() += 1);

        let (client, _rx) = connected_client("/chat");
        assert!(channel.connect(&client).await.unwrap());

        assert_eq!(channel.client_count(), 1);
        assert_eq!(*joined.lock(), 1);
        assert_eq!(client.channel().unwrap().path(), "/chat");
        assert_eq!(channel.stats().total_connections, 1);
    }

    #[tokio::test]
    async fn test_connect_parses_params() {
        let channel = Arc::new(Channel::new("/rooms/{id}/test"));
        let (client, _rx) = connected_client("/rooms/123/test?sort=1&foo=bar");
        channel.connect(&client).await.unwrap();

        assert_eq!(client.path_param("id").as_deref(), Some("123"));
        assert_eq!(client.path_params().len(), 1);
        assert_eq!(client.query_param("sort").as_deref(), Some("1"));
        assert_eq!(client.query_param("foo").as_deref(), Some("bar"));
    }

    #[tokio::test]
    async fn test_middleware_runs_in_order() {
        let channel = Arc::new(Channel::new("/"));
        let order = Arc::new(Mutex::new(Vec::new()));
        for name in ["first", "second"] {
            let order = order.clone();
            channel.middleware(move |_client| {
                let order = order.clone();
                async move {
                    order.lock().push(name);
                    Ok(())
                }
            });
        }

        let (client, _rx) = connected_client("/");
        channel.connect(&client).await.unwrap();
        assert_eq!(*order.lock(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_middleware_termination_stops_chain() {
        let channel = Arc::new(Channel::new("/"));
        let reached = Arc::new(Mutex::new(false));
        channel.middleware(|client: Arc<Client>| async move {
            if client.query() == "test" {
                client.terminate(4003, "Unauthorized");
            }
            Ok(())
        });
        let flag = reached.clone();
        channel.middleware(move |_client| {
            let flag = flag.clone();
            async move {
                *flag.lock() = true;
                Ok(())
            }
        });

        let (client, _rx) = connected_client("/?test");
        assert!(!channel.connect(&client).await.unwrap());
        assert!(!*reached.lock());
        assert_eq!(channel.client_count(), 0);
        assert!(client.channel().is_none());
    }

    #[tokio::test]
    async fn test_middleware_error_after_termination_stops_chain() {
        let channel = Arc::new(Channel::new("/"));
        channel.middleware(|client: Arc<Client>| async move {
            client.terminate(4003, "Unauthorized");
            Err(RouterError::application("rejected"))
        });

        let (client, _rx) = connected_client("/");
        assert!(!channel.connect(&client).await.unwrap());
        assert_eq!(channel.client_count(), 0);
        assert!(client.channel().is_none());
    }

    #[tokio::test]
    async fn test_middleware_error_propagates() {
        let channel = Arc::new(Channel::new("/"));
        channel.middleware(|_client| async move { Err(RouterError::application("no token")) });

        let (client, _rx) = connected_client("/");
        let err = channel.connect(&client).await.unwrap_err();
        assert_eq!(err.to_string(), "no token");
        assert_eq!(channel.client_count(), 0);
    }

    #[tokio::test]
    async fn test_message_dispatch() {
        let channel = Arc::new(Channel::new("/"));
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        channel.client_message(Matcher::field_eq("type", "test"), None, move |_client, payload| {
            let sink = sink.clone();
            async move {
                sink.lock().push(payload);
                Ok(())
            }
        });

        let (client, _rx) = connected_client("/");
        channel.connect(&client).await.unwrap();
        channel
            .handle_message(&client, Frame::text(r#"{"type":"test","test":"test"}"#))
            .await;

        assert_eq!(*received.lock(), vec![json!({"type": "test", "test": "test"})]);
        assert_eq!(channel.stats().total_messages, 1);
    }

    #[tokio::test]
    async fn test_unparseable_message() {
        let channel = Arc::new(Channel::new("/"));
        let errors = collect_errors(&channel);
        let (client, _rx) = connected_client("/");
        channel.connect(&client).await.unwrap();

        channel.handle_message(&client, Frame::text("{oops")).await;

        let errors = errors.lock();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, UNEXPECTED_PAYLOAD);
        assert_eq!(errors[0].1, Some(json!("{oops")));
    }

    #[tokio::test]
    async fn test_message_not_found() {
        let channel = Arc::new(Channel::new("/"));
        channel.client_message(Matcher::field_eq("type", "known"), None, |_c, _p| async { Ok(()) });
        let errors = collect_errors(&channel);
        let (client, _rx) = connected_client("/");
        channel.connect(&client).await.unwrap();

        channel
            .handle_message(&client, Frame::text(r#"{"type":"user:waiting","duration":60}"#))
            .await;

        let errors = errors.lock();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, MESSAGE_NOT_FOUND);
        assert_eq!(errors[0].1, Some(json!({"type": "user:waiting", "duration": 60})));
    }

    #[tokio::test]
    async fn test_handler_not_implemented() {
        let channel = Arc::new(Channel::new("/"));
        channel.declare_client_message(Matcher::field_eq("type", "user:typing"), None);
        let errors = collect_errors(&channel);
        let (client, _rx) = connected_client("/");
        channel.connect(&client).await.unwrap();

        channel
            .handle_message(&client, Frame::text(r#"{"type":"user:typing","typing":true}"#))
            .await;

        let errors = errors.lock();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, HANDLER_NOT_IMPLEMENTED);
    }

    #[tokio::test]
    async fn test_validation_failure_skips_handler() {
        let channel = Arc::new(Channel::with_options(
            ChannelOptions::new().path("/").validator(require_fields),
        ));
        let called = Arc::new(Mutex::new(false));
        let flag = called.clone();
        channel.client_message(
            Matcher::field_eq("type", "chat:message"),
            Some(MessageSchema::new(json!({"required": ["type", "text"]}))),
            move |_client, _payload| {
                let flag = flag.clone();
                async move {
                    *flag.lock() = true;
                    Ok(())
                }
            },
        );
        let errors = collect_errors(&channel);
        let (client, _rx) = connected_client("/");
        channel.connect(&client).await.unwrap();

        channel
            .handle_message(&client, Frame::text(r#"{"type":"chat:message","text1":"123"}"#))
            .await;

        assert!(!*called.lock());
        let errors = errors.lock();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, "must have required property 'text'");
        assert_eq!(errors[0].1, Some(json!({"type": "chat:message", "text1": "123"})));
    }

    #[tokio::test]
    async fn test_handler_error_is_reported() {
        let channel = Arc::new(Channel::new("/"));
        channel.client_message(Matcher::any(), None, |_client, _payload| async move {
            Err(RouterError::application("boom"))
        });
        let errors = collect_errors(&channel);
        let (client, _rx) = connected_client("/");
        channel.connect(&client).await.unwrap();

        channel.handle_message(&client, Frame::text(r#"{"a":1}"#)).await;

        let errors = errors.lock();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, UNHANDLED_ERROR);
        assert_eq!(errors[0].1, Some(json!({"a": 1})));
        assert_eq!(channel.client_count(), 1);
    }

    #[tokio::test]
    async fn test_handler_panic_is_reported() {
        let channel = Arc::new(Channel::new("/"));
        channel.client_message(Matcher::any(), None, |_client, payload: Value| async move {
            if payload["explode"] == true {
                panic!("handler exploded");
            }
            Ok(())
        });
        let errors = collect_errors(&channel);
        let (client, _rx) = connected_client("/");
        channel.connect(&client).await.unwrap();

        channel
            .handle_message(&client, Frame::text(r#"{"explode":true}"#))
            .await;
        channel
            .handle_message(&client, Frame::text(r#"{"explode":false}"#))
            .await;

        let errors = errors.lock();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, UNHANDLED_ERROR);
    }

    #[tokio::test]
    async fn test_hook_order_inbound() {
        let channel = Arc::new(Channel::with_options(
            ChannelOptions::new().path("/").validator(require_fields),
        ));
        let trace = Arc::new(Mutex::new(Vec::new()));

        let t = trace.clone();
        channel.add_frame_hook(FrameStage::OnMessage, move |_c, frame| {
            t.lock().push("onMessage");
            async move { Ok(frame) }
        });
        let t = trace.clone();
        channel.add_frame_hook(FrameStage::PreParse, move |_c, frame| {
            t.lock().push("preParse");
            async move { Ok(frame) }
        });
        let t = trace.clone();
        channel.add_value_hook(ValueStage::PreValidation, move |_c, payload| {
            t.lock().push("preValidation");
            async move { Ok(payload) }
        });
        let t = trace.clone();
        channel.add_value_hook(ValueStage::PreHandler, move |_c, mut payload: Value| {
            t.lock().push("preHandler");
            payload["enriched"] = json!(true);
            async move { Ok(payload) }
        });

        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();
        let t = trace.clone();
        channel.client_message(
            Matcher::field_eq("type", "x"),
            Some(MessageSchema::new(json!({"required": ["type"]}))),
            move |_client, payload| {
                t.lock().push("handler");
                *sink.lock() = Some(payload);
                async { Ok(()) }
            },
        );

        let (client, _rx) = connected_client("/");
        channel.connect(&client).await.unwrap();
        channel.handle_message(&client, Frame::text(r#"{"type":"x"}"#)).await;

        assert_eq!(
            *trace.lock(),
            vec!["onMessage", "preParse", "preValidation", "preHandler", "handler"]
        );
        assert_eq!(*seen.lock(), Some(json!({"type": "x", "enriched": true})));
    }

    #[tokio::test]
    async fn test_pre_parse_hook_can_rewrite_frame() {
        let channel = Arc::new(Channel::new("/"));
        channel.add_frame_hook(FrameStage::PreParse, |_c, frame| async move {
            match frame {
                Frame::Text(text) => Ok(Frame::Text(text.trim_start_matches("v1:").to_string())),
                other => Ok(other),
            }
        });
        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();
        channel.client_message(Matcher::any(), None, move |_client, payload| {
            *sink.lock() = Some(payload);
            async { Ok(()) }
        });

        let (client, _rx) = connected_client("/");
        channel.connect(&client).await.unwrap();
        channel.handle_message(&client, Frame::text(r#"v1:{"a":1}"#)).await;

        assert_eq!(*seen.lock(), Some(json!({"a": 1})));
    }

    #[tokio::test]
    async fn test_send_without_validator_serializes_json() {
        let channel = Arc::new(Channel::new("/"));
        let (client, mut rx) = connected_client("/");
        channel.connect(&client).await.unwrap();

        client.send(json!({"type": "anything"})).await.unwrap();
        assert_eq!(rx.try_recv().unwrap(), Frame::text(r#"{"type":"anything"}"#));
    }

    #[tokio::test]
    async fn test_send_schema_not_found() {
        let channel = Arc::new(Channel::with_options(
            ChannelOptions::new().path("/").validator(require_fields),
        ));
        channel.server_message(Matcher::field_eq("type", "chat:clean"), None);
        let (client, mut rx) = connected_client("/");
        channel.connect(&client).await.unwrap();

        let mut callback_error = None;
        let result = client
            .send_with(json!({"type": "chat:delete", "chatId": "123"}), |err| {
                callback_error = err.map(ToString::to_string)
            })
            .await;

        assert!(matches!(result, Err(RouterError::SchemaNotFound)));
        assert_eq!(
            callback_error.as_deref(),
            Some("Cannot send message: Message schema not found")
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_send_lookup_uses_server_declarations() {
        let channel = Arc::new(Channel::with_options(
            ChannelOptions::new().path("/").validator(require_fields),
        ));
        channel.client_message(Matcher::field_eq("type", "ping"), None, |_c, _p| async { Ok(()) });
        let (client, mut rx) = connected_client("/");
        channel.connect(&client).await.unwrap();

        let result = client.send(json!({"type": "ping"})).await;
        assert!(matches!(result, Err(RouterError::SchemaNotFound)));
        assert!(rx.try_recv().is_err());

        channel.server_message(Matcher::field_eq("type", "ping"), None);
        client.send(json!({"type": "ping"})).await.unwrap();
        assert_eq!(rx.try_recv().unwrap(), Frame::text(r#"{"type":"ping"}"#));
    }

    #[tokio::test]
    async fn test_send_invalid_payload_is_not_sent() {
        let channel = Arc::new(Channel::with_options(
            ChannelOptions::new().path("/").validator(require_fields),
        ));
        channel.server_message(
            Matcher::field_eq("type", "chat:clean"),
            Some(MessageSchema::new(json!({"required": ["type", "chatId"]}))),
        );
        let (client, mut rx) = connected_client("/");
        channel.connect(&client).await.unwrap();

        let err = client.send(json!({"type": "chat:clean"})).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot send message: payload validation error: must have required property 'chatId'"
        );
        assert!(rx.try_recv().is_err());

        client
            .send(json!({"type": "chat:clean", "chatId": "123"}))
            .await
            .unwrap();
        assert_eq!(
            rx.try_recv().unwrap(),
            Frame::text(r#"{"chatId":"123","type":"chat:clean"}"#)
        );
    }

    #[tokio::test]
    async fn test_outbound_hooks() {
        let channel = Arc::new(Channel::new("/"));
        channel.add_value_hook(ValueStage::PreSerialization, |_c, mut payload: Value| async move {
            payload["seq"] = json!(1);
            Ok(payload)
        });
        channel.add_frame_hook(FrameStage::PreSend, |_c, frame| async move {
            match frame {
                Frame::Text(text) => Ok(Frame::Text(format!("v1:{text}"))),
                other => Ok(other),
            }
        });
        let (client, mut rx) = connected_client("/");
        channel.connect(&client).await.unwrap();

        client.send(json!({"type": "x"})).await.unwrap();
        assert_eq!(rx.try_recv().unwrap(), Frame::text(r#"v1:{"seq":1,"type":"x"}"#));
    }

    #[tokio::test]
    async fn test_transport_failure_reaches_caller() {
        let channel = Arc::new(Channel::new("/"));
        let (socket, _rx) = MockSocket::new();
        let client = Arc::new(Client::new(socket.clone(), "/"));
        channel.connect(&client).await.unwrap();

        socket.fail_sends(true);
        let err = client.send(json!({"type": "x"})).await.unwrap_err();
        assert!(matches!(err, RouterError::SendFailed(_)));
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let channel = Arc::new(Channel::new("/"));
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        channel.on_disconnect(move |_client, code, reason| {
            sink.lock().push((code, reason.map(str::to_string)));
        });
        let (client, _rx) = connected_client("/");
        channel.connect(&client).await.unwrap();

        channel.disconnect(&client, Some(1000), Some("bye"));
        channel.disconnect(&client, Some(1000), Some("bye"));

        assert_eq!(channel.client_count(), 0);
        assert_eq!(*events.lock(), vec![(Some(1000), Some("bye".to_string()))]);
    }

    #[tokio::test]
    async fn test_broadcast() {
        let channel = Arc::new(Channel::new("/"));
        let (first, mut rx1) = connected_client("/");
        let (second, mut rx2) = connected_client("/");
        channel.connect(&first).await.unwrap();
        channel.connect(&second).await.unwrap();

        let delivered = channel.broadcast(&json!({"type": "announce"})).await;
        assert_eq!(delivered, 2);
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }

    #[test]
    fn test_describe() {
        let channel = Channel::new("/rooms/{id}");
        channel.server_message(
            Matcher::field_eq("type", "joined"),
            Some(MessageSchema::new(json!({"type": "object"})).with_id("Joined")),
        );
        channel.declare_client_message(Matcher::field_eq("type", "join"), None);

        let description = channel.describe();
        assert_eq!(description.path, "/rooms/{id}");
        assert_eq!(description.parameters, vec!["id".to_string()]);
        assert_eq!(description.messages.len(), 2);
        assert_eq!(description.messages[0].kind, MessageKind::Server);
        assert!(description.messages[1].schema.is_none());
    }
}

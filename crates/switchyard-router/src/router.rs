//! Top-level dispatcher: resolves connections to channels and forwards
//! transport events.

use crate::channel::{Channel, ChannelDescription, ChannelOptions};
use crate::client::{Client, ClientStatus};
use crate::error::RouterError;
use crate::path::WILDCARD;
use crate::transport::{Frame, CLOSE_MIDDLEWARE_ERROR, CLOSE_NO_CHANNEL};
use parking_lot::RwLock;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Reported when a connect-time middleware fails.
pub const MIDDLEWARE_ERROR: &str = "Middleware error";

type TransportErrorListener = Arc<dyn Fn(&str) + Send + Sync>;

/// Routes connections to channels by path.
///
/// The router owns a root channel (the wildcard `*` unless configured
/// otherwise) and the channels mounted under it. Root-level registration
/// goes through [`Router::root`]; routed channels inherit from it when
/// mounted.
pub struct Router {
    root: Arc<Channel>,
    channels: RwLock<Vec<Arc<Channel>>>,
    transport_errors: RwLock<Vec<TransportErrorListener>>,
}

impl Router {
    /// Create a router whose root is the wildcard channel.
    pub fn new() -> Self {
        Self::with_options(ChannelOptions::new())
    }

    /// Create a router from root channel options. The root path defaults
    /// to `*`.
    pub fn with_options(mut options: ChannelOptions) -> Self {
        if options.path.is_none() {
            options.path = Some(WILDCARD.to_string());
        }
        Self {
            root: Arc::new(Channel::with_options(options)),
            channels: RwLock::new(Vec::new()),
            transport_errors: RwLock::new(Vec::new()),
        }
    }

    /// The root channel.
    pub fn root(&self) -> &Arc<Channel> {
        &self.root
    }

    /// Create and mount a channel at `path`.
    pub fn route(&self, path: impl Into<String>) -> Result<Arc<Channel>, RouterError> {
        self.mount(Channel::new(path))
    }

    /// Create and mount a channel from options.
    pub fn route_with(&self, options: ChannelOptions) -> Result<Arc<Channel>, RouterError> {
        self.mount(Channel::with_options(options))
    }

    /// Mount a prebuilt channel.
    ///
    /// Fails if the path is the root's path or already mounted. On success
    /// the channel inherits codecs, validator and, under a wildcard root,
    /// middleware and declarations.
    pub fn mount(&self, channel: Channel) -> Result<Arc<Channel>, RouterError> {
        let path = channel.path().to_string();
        let mut channels = self.channels.write();

        if path == self.root.path() || channels.iter().any(|c| c.path() == path) {
            return Err(RouterError::DuplicatePath(path));
        }

        let channel = Arc::new(channel);
        channel.inherit(&self.root);
        channels.push(Arc::clone(&channel));

        info!(channel = %path, "Channel mounted");
        Ok(channel)
    }

    /// A mounted channel by its exact path pattern.
    pub fn channel(&self, path: &str) -> Option<Arc<Channel>> {
        self.channels
            .read()
            .iter()
            .find(|channel| channel.path() == path)
            .cloned()
    }

    /// Mounted channels in registration order.
    pub fn channels(&self) -> Vec<Arc<Channel>> {
        self.channels.read().clone()
    }

    /// Run a configuration function against the router.
    pub fn register<F>(&self, plugin: F) -> Result<(), RouterError>
    where
        F: FnOnce(&Router) -> Result<(), RouterError>,
    {
        plugin(self)
    }

    /// Resolve a request target to a channel.
    ///
    /// Mounted channels are tried in registration order. Without a match,
    /// the root is used if it is the wildcard or its path equals the request
    /// path, then a mounted `*` channel.
    pub fn find_channel(&self, target: &str) -> Option<Arc<Channel>> {
        let path = target.split_once('?').map(|(p, _)| p).unwrap_or(target);
        let path = if path.is_empty() { "/" } else { path };

        let channels = self.channels.read();
        if let Some(channel) = channels.iter().find(|c| c.matches_path(path)) {
            return Some(Arc::clone(channel));
        }

        if self.root.is_wildcard() || self.root.path() == path {
            return Some(Arc::clone(&self.root));
        }

        channels.iter().find(|c| c.is_wildcard()).cloned()
    }

    /// Handle a new transport connection.
    ///
    /// Unroutable clients are closed with 4000. A failing middleware is
    /// reported as an error event and the client is closed with 1011.
    /// Returns the channel the client joined.
    pub async fn handle_connect(&self, client: &Arc<Client>) -> Option<Arc<Channel>> {
        let Some(channel) = self.find_channel(client.path()) else {
            warn!(client_id = %client.id, path = %client.path(), "No channel for path");
            client.terminate(CLOSE_NO_CHANNEL, "");
            return None;
        };

        match channel.connect(client).await {
            Ok(true) => Some(channel),
            Ok(false) => None,
            Err(e) => {
                warn!(client_id = %client.id, channel = %channel.path(), error = %e, "Middleware failed");
                channel.report_error(client, MIDDLEWARE_ERROR, Some(Value::String(e.to_string())));
                client.terminate(CLOSE_MIDDLEWARE_ERROR, MIDDLEWARE_ERROR);
                None
            }
        }
    }

    /// Forward an inbound frame to the client's channel. Frames from clients
    /// that never joined a channel are dropped.
    pub async fn handle_message(&self, client: &Arc<Client>, frame: Frame) {
        match client.channel() {
            Some(channel) => channel.handle_message(client, frame).await,
            None => warn!(client_id = %client.id, "Dropping message from unbound client"),
        }
    }

    /// Handle the transport reporting a closed socket.
    pub fn handle_disconnect(&self, client: &Arc<Client>, code: Option<u16>, reason: Option<&str>) {
        client.advance_status(ClientStatus::Disconnecting);
        if let Some(channel) = client.channel() {
            channel.disconnect(client, code, reason);
        }
        client.advance_status(ClientStatus::Disconnected);
    }

    /// Listen for transport-level errors not tied to a message.
    pub fn on_transport_error<F>(&self, listener: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.transport_errors.write().push(Arc::new(listener));
    }

    /// Report a transport-level error.
    pub fn handle_transport_error(&self, message: &str) {
        error!(error = %message, "Transport error");
        let listeners = self.transport_errors.read().clone();
        for listener in listeners {
            listener(message);
        }
    }

    /// Catalog data for every channel, root first.
    pub fn describe(&self) -> Vec<ChannelDescription> {
        std::iter::once(self.root.describe())
            .chain(self.channels().iter().map(|channel| channel.describe()))
            .collect()
    }

    /// Connected clients across all channels.
    pub fn connection_count(&self) -> usize {
        self.root.client_count()
            + self
                .channels
                .read()
                .iter()
                .map(|channel| channel.client_count())
                .sum::<usize>()
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("root", &self.root.path())
            .field("channels", &self.channels.read().len())
            .finish()
    }
}

//! In-process transport for tests and embedding.
//!
//! [`MockTransport`] plays the role of a WebSocket server: each
//! [`MockTransport::connect`] creates a client backed by a [`MockSocket`] and
//! runs the router's connect sequence. The returned [`MockConnection`] is the
//! remote peer's view of that socket.

use crate::client::{Client, ClientStatus, Headers};
use crate::error::RouterError;
use crate::router::Router;
use crate::transport::{Frame, Socket};
use async_trait::async_trait;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc;

/// How long [`MockConnection::recv`] waits for a frame.
pub const DEFAULT_RECV_TIMEOUT: Duration = Duration::from_secs(1);

type TerminateFn = Box<dyn Fn(u16, &str) + Send + Sync>;

/// Socket that delivers outbound frames to an in-memory queue.
pub struct MockSocket {
    tx: Mutex<Option<mpsc::UnboundedSender<Frame>>>,
    close: Mutex<Option<(u16, String)>>,
    failing: AtomicBool,
    on_terminate: OnceCell<TerminateFn>,
}

impl MockSocket {
    /// Create a socket and the receiver for frames sent to it.
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Frame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let socket = Arc::new(Self {
            tx: Mutex::new(Some(tx)),
            close: Mutex::new(None),
            failing: AtomicBool::new(false),
            on_terminate: OnceCell::new(),
        });
        (socket, rx)
    }

    /// Close code and reason the server terminated with, if any.
    pub fn close_frame(&self) -> Option<(u16, String)> {
        self.close.lock().clone()
    }

    /// Make every following send fail.
    pub fn fail_sends(&self, failing: bool) {
        self.failing.store(failing, Ordering::Release);
    }

    fn set_on_terminate(&self, callback: TerminateFn) {
        let _ = self.on_terminate.set(callback);
    }
}

#[async_trait]
impl Socket for MockSocket {
    async fn send(&self, frame: Frame) -> Result<(), RouterError> {
        if self.failing.load(Ordering::Acquire) {
            return Err(RouterError::SendFailed("mock socket rejected the write".to_string()));
        }
        match self.tx.lock().as_ref() {
            Some(tx) => tx.send(frame).map_err(|_| RouterError::ConnectionClosed),
            None => Err(RouterError::ConnectionClosed),
        }
    }

    fn terminate(&self, code: u16, reason: &str) {
        {
            let mut close = self.close.lock();
            if close.is_some() {
                return;
            }
            *close = Some((code, reason.to_string()));
        }
        self.tx.lock().take();
        if let Some(callback) = self.on_terminate.get() {
            callback(code, reason);
        }
    }
}

/// In-memory transport bound to a router.
#[derive(Debug, Clone)]
pub struct MockTransport {
    router: Arc<Router>,
}

impl MockTransport {
    /// Create a transport feeding `router`.
    pub fn new(router: Arc<Router>) -> Self {
        Self { router }
    }

    /// The router behind this transport.
    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    /// Connect a client at `target` (path and optional query).
    pub async fn connect(&self, target: &str) -> MockConnection {
        self.connect_with_headers(target, Headers::new()).await
    }

    /// Connect a client with request headers.
    pub async fn connect_with_headers(&self, target: &str, headers: Headers) -> MockConnection {
        let (socket, rx) = MockSocket::new();
        let client = Arc::new(Client::new(socket.clone(), target).with_headers(headers));

        let router = Arc::downgrade(&self.router);
        let peer: Weak<Client> = Arc::downgrade(&client);
        socket.set_on_terminate(Box::new(move |code, reason| {
            if let (Some(router), Some(client)) = (router.upgrade(), peer.upgrade()) {
                router.handle_disconnect(&client, Some(code), Some(reason));
            }
        }));

        client.advance_status(ClientStatus::Connected);
        self.router.handle_connect(&client).await;

        MockConnection {
            router: Arc::clone(&self.router),
            client,
            socket,
            rx,
        }
    }
}

/// The remote peer's end of a mock connection.
pub struct MockConnection {
    router: Arc<Router>,
    client: Arc<Client>,
    socket: Arc<MockSocket>,
    rx: mpsc::UnboundedReceiver<Frame>,
}

impl MockConnection {
    /// The server-side client.
    pub fn client(&self) -> &Arc<Client> {
        &self.client
    }

    /// Send a frame to the server and wait until it has been processed.
    pub async fn send(&self, frame: impl Into<Frame>) {
        self.router.handle_message(&self.client, frame.into()).await;
    }

    /// Send a JSON payload as a text frame.
    pub async fn send_json(&self, payload: &Value) {
        self.send(Frame::Text(payload.to_string())).await;
    }

    /// A frame already sent by the server, without waiting.
    pub fn try_recv(&mut self) -> Option<Frame> {
        self.rx.try_recv().ok()
    }

    /// Wait for the next frame from the server.
    ///
    /// Returns `None` on timeout or once the server closed the connection
    /// and every pending frame was read.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.recv_timeout(DEFAULT_RECV_TIMEOUT).await
    }

    /// Like [`MockConnection::recv`] with an explicit timeout.
    pub async fn recv_timeout(&mut self, timeout: Duration) -> Option<Frame> {
        tokio::time::timeout(timeout, self.rx.recv())
            .await
            .ok()
            .flatten()
    }

    /// Wait for the next frame and parse it as JSON.
    pub async fn recv_json(&mut self) -> Option<Value> {
        match self.recv().await? {
            Frame::Text(text) => serde_json::from_str(&text).ok(),
            Frame::Binary(data) => serde_json::from_slice(&data).ok(),
        }
    }

    /// Close code the server terminated the connection with.
    pub fn close_code(&self) -> Option<u16> {
        self.socket.close_frame().map(|(code, _)| code)
    }

    /// Close reason the server terminated the connection with.
    pub fn close_reason(&self) -> Option<String> {
        self.socket.close_frame().map(|(_, reason)| reason)
    }

    /// Close the connection from the peer's side.
    pub fn close(&self, code: u16, reason: &str) {
        self.router.handle_disconnect(&self.client, Some(code), Some(reason));
    }
}

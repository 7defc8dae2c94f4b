//! The seam between the router and the socket transport.
//!
//! The router never accepts connections itself. A transport (axum, the
//! in-memory [`MockTransport`](crate::mock::MockTransport), ...) creates a
//! [`Client`](crate::Client) around a [`Socket`] and feeds connect, message
//! and disconnect events into the [`Router`](crate::Router).

use crate::error::RouterError;
use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;

/// Close code used when no channel matches the connection path.
pub const CLOSE_NO_CHANNEL: u16 = 4000;

/// Close code conventionally used by middleware to reject a connection.
pub const CLOSE_UNAUTHORIZED: u16 = 4003;

/// Close code used when a middleware fails with an error.
pub const CLOSE_MIDDLEWARE_ERROR: u16 = 1011;

/// A raw frame as delivered by, or handed to, the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// UTF-8 text frame.
    Text(String),
    /// Binary frame.
    Binary(Bytes),
}

impl Frame {
    /// Create a text frame.
    pub fn text(text: impl Into<String>) -> Self {
        Frame::Text(text.into())
    }

    /// Create a binary frame.
    pub fn binary(data: impl Into<Bytes>) -> Self {
        Frame::Binary(data.into())
    }

    /// Whether this is a binary frame.
    pub fn is_binary(&self) -> bool {
        matches!(self, Frame::Binary(_))
    }

    /// Frame length in bytes.
    pub fn len(&self) -> usize {
        match self {
            Frame::Text(text) => text.len(),
            Frame::Binary(data) => data.len(),
        }
    }

    /// Whether the frame carries no data.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Render the frame as JSON for error reports.
    ///
    /// Text becomes a string, binary data an array of byte values.
    pub fn to_value(&self) -> Value {
        match self {
            Frame::Text(text) => Value::String(text.clone()),
            Frame::Binary(data) => Value::Array(data.iter().map(|b| Value::from(*b)).collect()),
        }
    }
}

impl From<String> for Frame {
    fn from(text: String) -> Self {
        Frame::Text(text)
    }
}

impl From<&str> for Frame {
    fn from(text: &str) -> Self {
        Frame::Text(text.to_string())
    }
}

impl From<Vec<u8>> for Frame {
    fn from(data: Vec<u8>) -> Self {
        Frame::Binary(Bytes::from(data))
    }
}

/// Transport-level handle of one connection.
#[async_trait]
pub trait Socket: Send + Sync {
    /// Write a frame to the connection.
    async fn send(&self, frame: Frame) -> Result<(), RouterError>;

    /// Close the connection with the given code and reason.
    fn terminate(&self, code: u16, reason: &str);
}

//! Error types for the router.

use thiserror::Error;

/// Errors that can occur while routing, dispatching or sending messages.
#[derive(Debug, Error)]
pub enum RouterError {
    /// A channel with the same path is already registered.
    #[error("path '{0}' is already registered")]
    DuplicatePath(String),

    /// No server message declaration matches an outbound payload.
    #[error("Cannot send message: Message schema not found")]
    SchemaNotFound,

    /// Outbound payload was rejected by the validator.
    #[error("Cannot send message: payload validation error: {0}")]
    InvalidPayload(String),

    /// The client has no channel to send through.
    #[error("Cannot send message: channel not defined")]
    ChannelNotBound,

    /// A frame could not be decoded or a value could not be encoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// The transport rejected a write.
    #[error("failed to send message: {0}")]
    SendFailed(String),

    /// Connection closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// Error raised by application code (middleware, hooks, handlers).
    #[error("{0}")]
    Application(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RouterError {
    /// Build an application error from anything printable.
    pub fn application(message: impl std::fmt::Display) -> Self {
        Self::Application(message.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_error_messages() {
        assert_eq!(
            RouterError::SchemaNotFound.to_string(),
            "Cannot send message: Message schema not found"
        );
        assert_eq!(
            RouterError::InvalidPayload("must have required property 'text'".into()).to_string(),
            "Cannot send message: payload validation error: must have required property 'text'"
        );
    }

    #[test]
    fn test_application_error() {
        let err = RouterError::application("Unauthorized");
        assert_eq!(err.to_string(), "Unauthorized");
    }
}

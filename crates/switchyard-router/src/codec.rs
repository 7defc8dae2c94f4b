//! Frame parsers and payload serializers.
//!
//! Channels default to [`JsonCodec`] in both directions. [`RawCodec`] is the
//! identity codec used when decoding is disabled for a channel.

use crate::error::RouterError;
use crate::transport::Frame;
use bytes::Bytes;
use serde_json::Value;

/// Turns an inbound frame into a payload.
pub trait Parser: Send + Sync {
    /// Parse a frame.
    fn parse(&self, frame: &Frame) -> Result<Value, RouterError>;
}

/// Turns an outbound payload into a frame.
pub trait Serializer: Send + Sync {
    /// Serialize a payload.
    fn serialize(&self, payload: &Value) -> Result<Frame, RouterError>;
}

impl<F> Parser for F
where
    F: Fn(&Frame) -> Result<Value, RouterError> + Send + Sync,
{
    fn parse(&self, frame: &Frame) -> Result<Value, RouterError> {
        self(frame)
    }
}

impl<F> Serializer for F
where
    F: Fn(&Value) -> Result<Frame, RouterError> + Send + Sync,
{
    fn serialize(&self, payload: &Value) -> Result<Frame, RouterError> {
        self(payload)
    }
}

/// JSON codec: text or binary frames in, text frames out.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Parser for JsonCodec {
    fn parse(&self, frame: &Frame) -> Result<Value, RouterError> {
        let value = match frame {
            Frame::Text(text) => serde_json::from_str(text)?,
            Frame::Binary(data) => serde_json::from_slice(data)?,
        };
        Ok(value)
    }
}

impl Serializer for JsonCodec {
    fn serialize(&self, payload: &Value) -> Result<Frame, RouterError> {
        Ok(Frame::Text(serde_json::to_string(payload)?))
    }
}

/// Identity codec.
///
/// Text frames parse to JSON strings and binary frames to arrays of byte
/// values. Serialization is the reverse: strings become text frames and
/// arrays of bytes become binary frames; anything else is rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawCodec;

impl Parser for RawCodec {
    fn parse(&self, frame: &Frame) -> Result<Value, RouterError> {
        Ok(frame.to_value())
    }
}

impl Serializer for RawCodec {
    fn serialize(&self, payload: &Value) -> Result<Frame, RouterError> {
        match payload {
            Value::String(text) => Ok(Frame::Text(text.clone())),
            Value::Array(items) => items
                .iter()
                .map(|item| {
                    item.as_u64()
                        .and_then(|b| u8::try_from(b).ok())
                        .ok_or_else(|| RouterError::Codec("array item is not a byte".to_string()))
                })
                .collect::<Result<Vec<u8>, _>>()
                .map(|data| Frame::Binary(Bytes::from(data))),
            other => Err(RouterError::Codec(format!(
                "raw codec cannot send {}",
                value_type(other)
            ))),
        }
    }
}

fn value_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

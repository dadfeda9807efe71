//! Wire codec: JSON messages in text (or binary-as-text) frames.
//!
//! Decoding never touches session state. A frame that fails to parse yields
//! [`LiveError::Parse`] and the caller drops it.

use std::borrow::Cow;

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::base::{LiveError, LiveResult};
use super::messages::{ClientMessage, ServerMessage};

/// A single frame as carried by the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

impl Frame {
    /// The frame payload as text. Binary frames are read as UTF-8, replacing
    /// invalid sequences.
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            Frame::Text(text) => Cow::Borrowed(text.as_str()),
            Frame::Binary(bytes) => String::from_utf8_lossy(bytes),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Frame::Text(text) => text.len(),
            Frame::Binary(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Serialize any message into a text frame.
pub fn encode<T: Serialize>(message: &T) -> LiveResult<Frame> {
    serde_json::to_string(message)
        .map(Frame::Text)
        .map_err(|e| LiveError::Serialization(e.to_string()))
}

/// Parse a frame into any message type.
pub fn decode<T: DeserializeOwned>(frame: &Frame) -> LiveResult<T> {
    serde_json::from_str(&frame.as_text()).map_err(|e| LiveError::Parse(e.to_string()))
}

/// Encode an outbound client message.
pub fn encode_client(message: &ClientMessage) -> LiveResult<Frame> {
    encode(message)
}

/// Decode an inbound server message.
pub fn decode_server(frame: &Frame) -> LiveResult<ServerMessage> {
    decode(frame)
}

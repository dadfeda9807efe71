//! Outbound senders layered on a session.

use std::sync::Arc;

use super::base::LiveResult;
use super::messages::{ClientMessage, FunctionResponse};
use super::session::LiveSession;

/// Frames microphone audio and turn boundaries.
///
/// Every chunk handed in becomes exactly one transmission; nothing is batched.
#[derive(Debug, Clone)]
pub struct AudioEgressChannel {
    session: Arc<LiveSession>,
}

impl AudioEgressChannel {
    pub fn new(session: Arc<LiveSession>) -> Self {
        Self { session }
    }

    /// Send one base64 PCM chunk.
    pub async fn send_audio_chunk(&self, chunk: &str) -> LiveResult<()> {
        self.session.send(&ClientMessage::audio_chunk(chunk)).await
    }

    /// Send raw little-endian PCM bytes as one chunk.
    pub async fn send_pcm(&self, pcm: &[u8]) -> LiveResult<()> {
        self.session.send(&ClientMessage::audio_pcm(pcm)).await
    }

    /// Mark the end of the user's speaking turn.
    pub async fn send_end_message(&self) -> LiveResult<()> {
        self.session.send(&ClientMessage::turn_boundary(true)).await
    }

    /// Empty turn that keeps the user's turn open.
    pub async fn send_continue_signal(&self) -> LiveResult<()> {
        self.session.send(&ClientMessage::turn_boundary(false)).await
    }
}

/// Returns tool results to the model. Tool execution happens elsewhere.
#[derive(Debug, Clone)]
pub struct ToolResponseChannel {
    session: Arc<LiveSession>,
}

impl ToolResponseChannel {
    pub fn new(session: Arc<LiveSession>) -> Self {
        Self { session }
    }

    /// Send all results, in order, as a single message.
    pub async fn send_tool_response(&self, results: Vec<FunctionResponse>) -> LiveResult<()> {
        self.session.send(&ClientMessage::tool_response(results)).await
    }
}

//! Base types for Gemini Live sessions.
//!
//! This module defines the error taxonomy, the connection state machine, the
//! typed event union delivered to callers and the handler trait that receives it.
//!
//! # Event Delivery
//!
//! A session has at most one active [`LiveEventHandler`]. Events driven by
//! inbound traffic are delivered one at a time from the session's driver task,
//! in the order the peer produced them. A failed send reports its
//! [`LiveEvent::Error`] from the sending task instead, so it may interleave
//! with inbound events.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use super::messages::ToolCall;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during a live session.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LiveError {
    /// An inbound frame could not be parsed; the frame was dropped
    #[error("Parsing failure: {0}")]
    Parse(String),

    /// The underlying channel reported a fault
    #[error("Transport error: {0}")]
    Transport(String),

    /// The channel did not open within the readiness budget
    #[error("Connection timed out after {}ms", .0.as_millis())]
    ConnectionTimeout(Duration),

    /// A send was attempted while the session was not open
    #[error("WebSocket is not ready (state: {0}). Please try again.")]
    NotReady(ConnectionState),

    /// The session closed before the awaited condition was reached
    #[error("Session closed")]
    Closed,

    /// An outbound message could not be serialized
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Audio collaborator failure
    #[error("Audio error: {0}")]
    Audio(String),
}

impl LiveError {
    /// Category tag used when reporting the error to users.
    pub fn category(&self) -> &'static str {
        match self {
            LiveError::Parse(_) => "parse",
            LiveError::Transport(_) => "transport",
            LiveError::ConnectionTimeout(_) => "timeout",
            LiveError::NotReady(_) => "not_ready",
            LiveError::Closed => "closed",
            LiveError::Serialization(_) => "serialization",
            LiveError::InvalidConfiguration(_) => "configuration",
            LiveError::Audio(_) => "audio",
        }
    }
}

/// Result type for live session operations.
pub type LiveResult<T> = Result<T, LiveError>;

// =============================================================================
// Connection State
// =============================================================================

/// Connection state of a live session.
///
/// The only legal path is `Connecting -> Open -> {Closing} -> {Closed | Error}`.
/// A session never re-enters `Connecting` or `Open`; reconnecting always means
/// building a new session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connecting,
    Open,
    Closing,
    Closed,
    Error,
}

impl ConnectionState {
    /// Whether `next` is a legal successor of this state.
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Connecting, Open)
                | (Connecting, Closing)
                | (Connecting, Closed)
                | (Connecting, Error)
                | (Open, Closing)
                | (Open, Closed)
                | (Open, Error)
                | (Closing, Closed)
                | (Closing, Error)
                | (Error, Closed)
        )
    }

    /// No further traffic is possible in a terminal state.
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::Closed | ConnectionState::Error)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
            ConnectionState::Error => "error",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Event Types
// =============================================================================

/// WebSocket close code for a normal closure.
pub const CLOSE_NORMAL: u16 = 1000;

/// WebSocket close code used when the connection dropped without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Termination notice forwarded verbatim from the channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseEvent {
    pub code: u16,
    pub reason: String,
}

impl CloseEvent {
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    pub fn normal() -> Self {
        Self::new(CLOSE_NORMAL, "")
    }

    pub fn abnormal(reason: impl Into<String>) -> Self {
        Self::new(CLOSE_ABNORMAL, reason)
    }

    pub fn is_normal(&self) -> bool {
        self.code == CLOSE_NORMAL
    }
}

/// Normalized transcript of one completed turn.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnPair {
    /// What the user said
    pub question: String,
    /// What the model answered
    pub answer: String,
}

/// Everything a session reports to its caller.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveEvent {
    /// The peer acknowledged the setup handshake
    SetupComplete,
    /// The peer requested tool invocations
    ToolCall(ToolCall),
    /// The user barged in while the model was speaking
    Interrupted,
    /// Raw input transcript delta
    InputTranscription(String),
    /// Raw output transcript delta
    OutputTranscription(String),
    /// Base64 PCM audio produced by the model
    AudioData(String),
    /// The peer finished its turn
    TurnComplete,
    /// Aggregated transcript for the turn that just completed
    TurnPair(TurnPair),
    /// Any fault, tagged by [`LiveError::category`]
    Error(LiveError),
    /// The channel terminated
    Close(CloseEvent),
}

impl LiveEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            LiveEvent::SetupComplete => "setup_complete",
            LiveEvent::ToolCall(_) => "tool_call",
            LiveEvent::Interrupted => "interrupted",
            LiveEvent::InputTranscription(_) => "input_transcription",
            LiveEvent::OutputTranscription(_) => "output_transcription",
            LiveEvent::AudioData(_) => "audio_data",
            LiveEvent::TurnComplete => "turn_complete",
            LiveEvent::TurnPair(_) => "turn_pair",
            LiveEvent::Error(_) => "error",
            LiveEvent::Close(_) => "close",
        }
    }
}

// =============================================================================
// Event Handler
// =============================================================================

/// Receiver of session events, one method per event category.
///
/// Every method has a no-op default so implementors only override what they
/// care about. The session only ever calls [`LiveEventHandler::handle`], whose
/// default routes to the per-category methods; wrappers may override `handle`
/// to observe every event.
#[async_trait]
pub trait LiveEventHandler: Send + Sync {
    async fn on_setup_complete(&self) {}

    async fn on_tool_call(&self, _call: ToolCall) {}

    async fn on_interrupted(&self) {}

    async fn on_input_transcription(&self, _text: String) {}

    async fn on_output_transcription(&self, _text: String) {}

    async fn on_audio_data(&self, _data: String) {}

    async fn on_turn_complete(&self) {}

    async fn on_turn_pair(&self, _pair: TurnPair) {}

    async fn on_error(&self, _error: LiveError) {}

    async fn on_close(&self, _event: CloseEvent) {}

    async fn handle(&self, event: LiveEvent) {
        match event {
            LiveEvent::SetupComplete => self.on_setup_complete().await,
            LiveEvent::ToolCall(call) => self.on_tool_call(call).await,
            LiveEvent::Interrupted => self.on_interrupted().await,
            LiveEvent::InputTranscription(text) => self.on_input_transcription(text).await,
            LiveEvent::OutputTranscription(text) => self.on_output_transcription(text).await,
            LiveEvent::AudioData(data) => self.on_audio_data(data).await,
            LiveEvent::TurnComplete => self.on_turn_complete().await,
            LiveEvent::TurnPair(pair) => self.on_turn_pair(pair).await,
            LiveEvent::Error(error) => self.on_error(error).await,
            LiveEvent::Close(close) => self.on_close(close).await,
        }
    }
}

/// Handler that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHandler;

#[async_trait]
impl LiveEventHandler for NullHandler {}

/// Forwards every event into a channel, for callers that prefer pulling events.
#[async_trait]
impl LiveEventHandler for mpsc::UnboundedSender<LiveEvent> {
    async fn handle(&self, event: LiveEvent) {
        if self.send(event).is_err() {
            tracing::debug!("Event receiver dropped");
        }
    }
}

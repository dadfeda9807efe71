//! Gemini Live session protocol.
//!
//! This module manages a persistent, bidirectional voice conversation with the
//! Gemini Live API over a single WebSocket.
//!
//! # Features
//!
//! - Setup handshake, sent automatically on open or deferred until requested
//! - Real-time audio streaming, one frame per captured chunk
//! - Barge-in detection with playback stop
//! - Per-turn transcript pairing (question / answer)
//! - Tool call delivery and tool response transport
//! - Reconnection before a new recording turn
//!
//! # Audio Format
//!
//! Input is PCM 16-bit mono at 16kHz, output PCM 16-bit mono at 24kHz, both
//! base64 encoded on the wire.
//!
//! # Example
//!
//! ```rust,ignore
//! use waav_live::core::live::{
//!     AudioEgressChannel, LiveEvent, LiveSession, SessionOptions, WebSocketConnector,
//! };
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let connector = WebSocketConnector::new(endpoint_url);
//!     let (events_tx, mut events) = tokio::sync::mpsc::unbounded_channel();
//!
//!     let session =
//!         LiveSession::connect(&connector, SessionOptions::default(), Arc::new(events_tx)).unwrap();
//!     session.ensure_open(Duration::from_secs(5)).await.unwrap();
//!     session.wait_for_setup_complete().await.unwrap();
//!
//!     let egress = AudioEgressChannel::new(session.clone());
//!     egress.send_audio_chunk(&base64_pcm).await.unwrap();
//!     egress.send_end_message().await.unwrap();
//!
//!     while let Some(event) = events.recv().await {
//!         if let LiveEvent::TurnPair(pair) = event {
//!             println!("Q: {}\nA: {}", pair.question, pair.answer);
//!         }
//!     }
//! }
//! ```

mod audio;
mod base;
pub mod codec;
pub mod config;
mod dispatch;
mod egress;
pub mod messages;
mod session;
mod supervisor;
mod transcript;
mod transport;

pub use audio::{
    AudioCapture, AudioChunkCallback, AudioPlayback, PlaybackBridge, WavFileCapture,
    WavFilePlayback, decode_pcm16, encode_pcm16,
};
pub use base::{
    CLOSE_ABNORMAL, CLOSE_NORMAL, CloseEvent, ConnectionState, LiveError, LiveEvent,
    LiveEventHandler, LiveResult, NullHandler, TurnPair,
};
pub use codec::Frame;
pub use config::{DEFAULT_CONNECT_TIMEOUT, GeminiVoice, default_setup};
pub use dispatch::{InboundEnvelope, ProtocolDispatcher};
pub use egress::{AudioEgressChannel, ToolResponseChannel};
pub use messages::{
    ClientMessage, FunctionCall, FunctionResponse, Modality, ServerContent, ServerMessage,
    SetupCommand, ToolCall,
};
pub use session::{LiveSession, SessionOptions, SessionStatus};
pub use supervisor::ReconnectSupervisor;
pub use transcript::{TranscriptAggregator, normalize};
pub use transport::{
    Channel, ChannelEvent, ChannelSink, Connector, LoopbackConnector, LoopbackPeer, ReadyState,
    WebSocketConnector, loopback_channel,
};

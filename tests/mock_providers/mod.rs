//! Mock provider servers for integration tests
//!
//! - WebSocket (Gemini Live)

// Not every test binary uses every helper.
#![allow(dead_code)]

pub mod websocket_mock;

pub use websocket_mock::{GeminiLiveMock, MockBehavior, spawn_gemini_live_mock};

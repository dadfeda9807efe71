//! Gemini Live API protocol constants and defaults.
//!
//! This module contains:
//! - Endpoint construction
//! - Voice selection
//! - Audio format constants
//! - The default setup handshake

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::messages::{Modality, SetupCommand};

/// Default Gemini Live API host.
pub const GEMINI_LIVE_HOST: &str = "generativelanguage.googleapis.com";

/// Default API version segment of the BidiGenerateContent service path.
pub const GEMINI_LIVE_API_VERSION: &str = "v1alpha";

/// Default model resource name.
pub const DEFAULT_MODEL: &str = "models/gemini-2.0-flash-live-001";

/// Default prebuilt voice.
pub const DEFAULT_VOICE: &str = "Puck";

/// Default speech language.
pub const DEFAULT_LANGUAGE_CODE: &str = "en-IN";

/// Default system instruction.
pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are an interviewer. Always reply only in English, even if the user's input is in another language. If the user is not speaking English, politely ask them to continue in English only, and do NOT reply in any other language.";

/// MIME type of every outbound audio chunk.
pub const AUDIO_PCM_MIME_TYPE: &str = "audio/pcm";

/// Sample rate the API expects for input audio (16-bit mono PCM).
pub const INPUT_SAMPLE_RATE: u32 = 16000;

/// Sample rate of audio produced by the API (16-bit mono PCM).
pub const OUTPUT_SAMPLE_RATE: u32 = 24000;

/// Default readiness wait budget.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Build the BidiGenerateContent WebSocket endpoint for a host and API version.
pub fn live_endpoint(host: &str, api_version: &str) -> String {
    format!(
        "wss://{host}/ws/google.ai.generativelanguage.{api_version}.GenerativeService.BidiGenerateContent"
    )
}

// =============================================================================
// Voices
// =============================================================================

/// Prebuilt voices offered by the Live API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GeminiVoice {
    #[default]
    Puck,
    Charon,
    Kore,
    Fenrir,
    Aoede,
}

impl GeminiVoice {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Puck => "Puck",
            Self::Charon => "Charon",
            Self::Kore => "Kore",
            Self::Fenrir => "Fenrir",
            Self::Aoede => "Aoede",
        }
    }

    /// Case-insensitive lookup. Returns `None` for voices this crate does not know.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::all()
            .iter()
            .copied()
            .find(|v| v.as_str().eq_ignore_ascii_case(name.trim()))
    }

    pub fn all() -> &'static [GeminiVoice] {
        &[
            Self::Puck,
            Self::Charon,
            Self::Kore,
            Self::Fenrir,
            Self::Aoede,
        ]
    }
}

impl std::fmt::Display for GeminiVoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Default Setup
// =============================================================================

/// The setup command sent when auto-setup is enabled and none was configured.
pub fn default_setup() -> SetupCommand {
    SetupCommand::new(DEFAULT_MODEL)
        .with_system_instruction(DEFAULT_SYSTEM_INSTRUCTION)
        .with_modalities(vec![Modality::Audio])
        .with_voice(DEFAULT_VOICE)
        .with_language(DEFAULT_LANGUAGE_CODE)
        .with_input_transcription(true)
        .with_output_transcription(true)
}

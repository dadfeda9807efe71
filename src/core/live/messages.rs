//! Gemini Live API WebSocket message types.
//!
//! Every message is a JSON object with exactly one top-level key naming its kind.
//!
//! # Protocol Overview
//!
//! Client messages (sent to server):
//! - setup - Session setup handshake, sent once per connection
//! - realtimeInput - Streaming audio chunks
//! - clientContent - Conversation turns; an empty user turn marks a turn boundary
//! - toolResponse - Results for a previous toolCall
//!
//! Server messages (received from server):
//! - setupComplete - Setup handshake acknowledged
//! - toolCall - Function invocations requested by the model
//! - toolCallCancellation - Previously requested invocations were cancelled
//! - serverContent - Model output, transcripts, interruption and turn flags
//! - goAway - The server will disconnect soon
//! - usageMetadata - Token accounting

use base64::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::config::AUDIO_PCM_MIME_TYPE;

// =============================================================================
// Shared Content Types
// =============================================================================

/// Inline binary payload, base64 encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    /// Inbound audio parts may omit this.
    #[serde(default)]
    pub mime_type: String,
    pub data: String,
}

impl Blob {
    /// PCM audio chunk that is already base64 encoded.
    pub fn pcm(data: impl Into<String>) -> Self {
        Self {
            mime_type: AUDIO_PCM_MIME_TYPE.to_string(),
            data: data.into(),
        }
    }
}

/// One part of a content turn.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<Blob>,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            inline_data: None,
        }
    }
}

/// A conversation turn.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    /// A user turn with no parts, used purely as a turn boundary marker.
    pub fn empty_user_turn() -> Self {
        Self {
            role: Some("user".to_string()),
            parts: Vec::new(),
        }
    }

    /// A role-less content holding a single text part.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            role: None,
            parts: vec![Part::text(text)],
        }
    }

    /// Concatenated text of every text part.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect::<Vec<_>>()
            .join("")
    }
}

// =============================================================================
// Setup
// =============================================================================

/// Output modality requested from the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Modality {
    #[serde(alias = "audio")]
    Audio,
    #[serde(alias = "text")]
    Text,
}

impl Modality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::Audio => "AUDIO",
            Modality::Text => "TEXT",
        }
    }

    /// Case-insensitive parse.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "audio" => Some(Modality::Audio),
            "text" => Some(Modality::Text),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_config: Option<VoiceConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_code: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(default)]
    pub response_modalities: Vec<Modality>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speech_config: Option<SpeechConfig>,
}

/// Transcription options. Presence of the (empty) object enables the feature.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptionOptions {}

/// The setup handshake payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupCommand {
    /// Model resource name, e.g. `models/gemini-2.0-flash-live-001`
    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,

    /// Opaque tool declarations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_audio_transcription: Option<TranscriptionOptions>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_audio_transcription: Option<TranscriptionOptions>,
}

impl SetupCommand {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system_instruction: None,
            generation_config: None,
            tools: None,
            input_audio_transcription: None,
            output_audio_transcription: None,
        }
    }

    pub fn with_system_instruction(mut self, text: impl Into<String>) -> Self {
        self.system_instruction = Some(Content::from_text(text));
        self
    }

    pub fn with_modalities(mut self, modalities: Vec<Modality>) -> Self {
        self.generation_config_mut().response_modalities = modalities;
        self
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.speech_config_mut().voice_config = Some(VoiceConfig {
            prebuilt_voice_config: PrebuiltVoiceConfig {
                voice_name: voice.into(),
            },
        });
        self
    }

    pub fn with_language(mut self, language_code: impl Into<String>) -> Self {
        self.speech_config_mut().language_code = Some(language_code.into());
        self
    }

    pub fn with_input_transcription(mut self, enabled: bool) -> Self {
        self.input_audio_transcription = enabled.then(TranscriptionOptions::default);
        self
    }

    pub fn with_output_transcription(mut self, enabled: bool) -> Self {
        self.output_audio_transcription = enabled.then(TranscriptionOptions::default);
        self
    }

    pub fn with_tools(mut self, tools: Vec<Value>) -> Self {
        self.tools = (!tools.is_empty()).then_some(tools);
        self
    }

    pub fn system_instruction_text(&self) -> Option<String> {
        self.system_instruction.as_ref().map(Content::text)
    }

    pub fn voice_name(&self) -> Option<&str> {
        self.generation_config
            .as_ref()?
            .speech_config
            .as_ref()?
            .voice_config
            .as_ref()
            .map(|v| v.prebuilt_voice_config.voice_name.as_str())
    }

    pub fn language_code(&self) -> Option<&str> {
        self.generation_config
            .as_ref()?
            .speech_config
            .as_ref()?
            .language_code
            .as_deref()
    }

    fn generation_config_mut(&mut self) -> &mut GenerationConfig {
        self.generation_config.get_or_insert_with(GenerationConfig::default)
    }

    fn speech_config_mut(&mut self) -> &mut SpeechConfig {
        self.generation_config_mut()
            .speech_config
            .get_or_insert_with(SpeechConfig::default)
    }
}

// =============================================================================
// Client Messages (sent to server)
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    pub media_chunks: Vec<Blob>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientContent {
    pub turns: Vec<Content>,
    pub turn_complete: bool,
}

/// Result of one tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionResponse {
    pub id: String,
    pub name: String,
    pub response: Value,
}

impl FunctionResponse {
    pub fn new(id: impl Into<String>, name: impl Into<String>, response: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            response,
        }
    }

    /// Build the response for a received call, copying its id and name.
    pub fn for_call(call: &FunctionCall, response: Value) -> Self {
        Self::new(call.id.clone(), call.name.clone(), response)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResponse {
    pub function_responses: Vec<FunctionResponse>,
}

/// Messages sent to the Live API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    Setup(SetupCommand),
    RealtimeInput(RealtimeInput),
    ClientContent(ClientContent),
    ToolResponse(ToolResponse),
}

impl ClientMessage {
    /// Wrap one base64 PCM chunk as realtime input.
    pub fn audio_chunk(data: impl Into<String>) -> Self {
        ClientMessage::RealtimeInput(RealtimeInput {
            media_chunks: vec![Blob::pcm(data)],
        })
    }

    /// Wrap raw little-endian PCM bytes as realtime input.
    pub fn audio_pcm(data: &[u8]) -> Self {
        Self::audio_chunk(BASE64_STANDARD.encode(data))
    }

    /// Empty user turn; `turn_complete` marks whether the user finished speaking.
    pub fn turn_boundary(turn_complete: bool) -> Self {
        ClientMessage::ClientContent(ClientContent {
            turns: vec![Content::empty_user_turn()],
            turn_complete,
        })
    }

    pub fn tool_response(function_responses: Vec<FunctionResponse>) -> Self {
        ClientMessage::ToolResponse(ToolResponse { function_responses })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Setup(_) => "setup",
            ClientMessage::RealtimeInput(_) => "realtimeInput",
            ClientMessage::ClientContent(_) => "clientContent",
            ClientMessage::ToolResponse(_) => "toolResponse",
        }
    }
}

// =============================================================================
// Server Messages (received from server)
// =============================================================================

/// Setup acknowledgement. The payload is opaque and kept as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SetupComplete {
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub args: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    #[serde(default)]
    pub function_calls: Vec<FunctionCall>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallCancellation {
    #[serde(default)]
    pub ids: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoAway {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_left: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcription {
    #[serde(default)]
    pub text: String,
}

/// Model output and turn signalling.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interrupted: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_transcription: Option<Transcription>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_transcription: Option<Transcription>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_turn: Option<Content>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turn_complete: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_complete: Option<bool>,
}

impl ServerContent {
    pub fn is_interrupted(&self) -> bool {
        self.interrupted.unwrap_or(false)
    }

    pub fn is_turn_complete(&self) -> bool {
        self.turn_complete.unwrap_or(false)
    }

    /// Base64 payloads of every inline-data part of the model turn.
    pub fn inline_audio(&self) -> impl Iterator<Item = &str> {
        self.model_turn
            .iter()
            .flat_map(|turn| turn.parts.iter())
            .filter_map(|part| part.inline_data.as_ref())
            .map(|blob| blob.data.as_str())
    }
}

/// Any message received from the Live API. Exactly one field is normally set;
/// a message with none set has an unknown shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setup_complete: Option<SetupComplete>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCall>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_cancellation: Option<ToolCallCancellation>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_content: Option<ServerContent>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub go_away: Option<GoAway>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_metadata: Option<Value>,
}

impl ServerMessage {
    pub fn setup_complete() -> Self {
        Self {
            setup_complete: Some(SetupComplete::default()),
            ..Default::default()
        }
    }

    pub fn tool_call(function_calls: Vec<FunctionCall>) -> Self {
        Self {
            tool_call: Some(ToolCall { function_calls }),
            ..Default::default()
        }
    }

    pub fn server_content(content: ServerContent) -> Self {
        Self {
            server_content: Some(content),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_audio_chunk_shape() {
        let msg = ClientMessage::audio_chunk("AAEC");
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({"realtimeInput": {"mediaChunks": [{"mimeType": "audio/pcm", "data": "AAEC"}]}})
        );
    }

    #[test]
    fn test_audio_pcm_encodes_base64() {
        let data = vec![0u8, 1, 2, 3];
        match ClientMessage::audio_pcm(&data) {
            ClientMessage::RealtimeInput(input) => {
                let decoded = BASE64_STANDARD.decode(&input.media_chunks[0].data).unwrap();
                assert_eq!(decoded, data);
            }
            other => panic!("Wrong message type: {}", other.kind()),
        }
    }

    #[test]
    fn test_turn_boundary_shape() {
        let value = serde_json::to_value(ClientMessage::turn_boundary(true)).unwrap();
        assert_eq!(
            value,
            json!({"clientContent": {"turns": [{"role": "user", "parts": []}], "turnComplete": true}})
        );

        let value = serde_json::to_value(ClientMessage::turn_boundary(false)).unwrap();
        assert_eq!(value["clientContent"]["turnComplete"], json!(false));
    }

    #[test]
    fn test_tool_response_shape() {
        let msg = ClientMessage::tool_response(vec![FunctionResponse::new(
            "call-1",
            "lookup",
            json!({"result": 42}),
        )]);
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({"toolResponse": {"functionResponses": [
                {"id": "call-1", "name": "lookup", "response": {"result": 42}}
            ]}})
        );
    }

    #[test]
    fn test_setup_command_serialization() {
        let setup = SetupCommand::new("models/test")
            .with_system_instruction("Be brief.")
            .with_modalities(vec![Modality::Audio])
            .with_voice("Kore")
            .with_language("en-US")
            .with_input_transcription(true)
            .with_output_transcription(false);

        let value = serde_json::to_value(ClientMessage::Setup(setup.clone())).unwrap();
        let body = &value["setup"];
        assert_eq!(body["model"], json!("models/test"));
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], json!("Be brief."));
        assert_eq!(body["generationConfig"]["responseModalities"], json!(["AUDIO"]));
        assert_eq!(
            body["generationConfig"]["speechConfig"]["voiceConfig"]["prebuiltVoiceConfig"]["voiceName"],
            json!("Kore")
        );
        assert_eq!(body["generationConfig"]["speechConfig"]["languageCode"], json!("en-US"));
        assert_eq!(body["inputAudioTranscription"], json!({}));
        assert!(body.get("outputAudioTranscription").is_none());
        assert!(body.get("tools").is_none());

        assert_eq!(setup.voice_name(), Some("Kore"));
        assert_eq!(setup.language_code(), Some("en-US"));
        assert_eq!(setup.system_instruction_text().as_deref(), Some("Be brief."));
    }

    #[test]
    fn test_modality_accepts_lowercase() {
        let modalities: Vec<Modality> = serde_json::from_str(r#"["audio", "TEXT"]"#).unwrap();
        assert_eq!(modalities, vec![Modality::Audio, Modality::Text]);
        assert_eq!(Modality::parse(" Audio "), Some(Modality::Audio));
        assert_eq!(Modality::parse("video"), None);
    }

    #[test]
    fn test_server_content_parsing() {
        let json = r#"{
            "serverContent": {
                "outputTranscription": {"text": "Hello "},
                "modelTurn": {"parts": [
                    {"inlineData": {"mimeType": "audio/pcm;rate=24000", "data": "AAAA"}},
                    {"text": "thinking"},
                    {"inlineData": {"mimeType": "audio/pcm;rate=24000", "data": "BBBB"}}
                ]}
            }
        }"#;
        let msg: ServerMessage = serde_json::from_str(json).unwrap();
        let content = msg.server_content.unwrap();
        assert!(!content.is_interrupted());
        assert!(!content.is_turn_complete());
        assert_eq!(content.output_transcription.as_ref().unwrap().text, "Hello ");
        assert_eq!(content.inline_audio().collect::<Vec<_>>(), vec!["AAAA", "BBBB"]);
    }

    #[test]
    fn test_tool_call_parsing() {
        let json = r#"{"toolCall": {"functionCalls": [{"id": "abc", "name": "get_time", "args": {"tz": "UTC"}}]}}"#;
        let msg: ServerMessage = serde_json::from_str(json).unwrap();
        let call = &msg.tool_call.unwrap().function_calls[0];
        assert_eq!(call.id, "abc");
        assert_eq!(call.name, "get_time");
        assert_eq!(call.args, json!({"tz": "UTC"}));

        let response = FunctionResponse::for_call(call, json!({"time": "noon"}));
        assert_eq!(response.id, "abc");
        assert_eq!(response.name, "get_time");
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let msg: ServerMessage =
            serde_json::from_str(r#"{"somethingNew": {"value": 1}}"#).unwrap();
        assert_eq!(msg, ServerMessage::default());
    }

    #[test]
    fn test_setup_complete_keeps_payload() {
        let msg: ServerMessage =
            serde_json::from_str(r#"{"setupComplete": {"sessionId": "s-1"}}"#).unwrap();
        let ack = msg.setup_complete.unwrap();
        assert_eq!(ack.extra.get("sessionId"), Some(&json!("s-1")));
    }

    #[test]
    fn test_inline_data_without_mime_type() {
        let json = r#"{"serverContent":{"modelTurn":{"parts":[{"inlineData":{"data":"AAAA"}}]},"turnComplete":true}}"#;
        let msg: ServerMessage = serde_json::from_str(json).unwrap();
        let content = msg.server_content.unwrap();
        assert_eq!(content.inline_audio().collect::<Vec<_>>(), vec!["AAAA"]);
        assert!(content.is_turn_complete());
    }

    #[test]
    fn test_partial_function_call_is_kept() {
        let json = r#"{"toolCall":{"functionCalls":[{"id":"c1","args":{}}]}}"#;
        let msg: ServerMessage = serde_json::from_str(json).unwrap();
        let call = &msg.tool_call.unwrap().function_calls[0];
        assert_eq!(call.id, "c1");
        assert!(call.name.is_empty());
    }
}

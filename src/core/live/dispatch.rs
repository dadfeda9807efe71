//! Classification of decoded server messages into session events.
//!
//! Priority is mutually exclusive: `setupComplete`, then `toolCall`, then
//! `serverContent`. Anything else is ignored so new server message kinds do not
//! break older clients.

use tracing::{debug, warn};

use super::base::LiveEvent;
use super::messages::{ServerContent, ServerMessage, SetupComplete, ToolCall};
use super::transcript::TranscriptAggregator;

/// A server message reduced to the single kind that will be acted upon.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEnvelope {
    SetupComplete(SetupComplete),
    ToolCall(ToolCall),
    ServerContent(ServerContent),
    Unrecognized(ServerMessage),
}

impl InboundEnvelope {
    pub fn classify(mut message: ServerMessage) -> Self {
        if let Some(ack) = message.setup_complete.take() {
            InboundEnvelope::SetupComplete(ack)
        } else if let Some(call) = message.tool_call.take() {
            InboundEnvelope::ToolCall(call)
        } else if let Some(content) = message.server_content.take() {
            InboundEnvelope::ServerContent(content)
        } else {
            InboundEnvelope::Unrecognized(message)
        }
    }
}

/// Turns inbound messages into events, maintaining the transcript buffers.
///
/// One dispatcher belongs to exactly one session. Frames must be dispatched one
/// at a time in arrival order.
#[derive(Debug, Default)]
pub struct ProtocolDispatcher {
    transcript: TranscriptAggregator,
}

impl ProtocolDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transcript(&self) -> &TranscriptAggregator {
        &self.transcript
    }

    /// Process one message and return the events it produces, in order.
    pub fn dispatch(&mut self, message: ServerMessage) -> Vec<LiveEvent> {
        match InboundEnvelope::classify(message) {
            InboundEnvelope::SetupComplete(_) => vec![LiveEvent::SetupComplete],
            InboundEnvelope::ToolCall(call) => vec![LiveEvent::ToolCall(call)],
            InboundEnvelope::ServerContent(content) => self.dispatch_content(content),
            InboundEnvelope::Unrecognized(other) => {
                if let Some(go_away) = &other.go_away {
                    warn!(time_left = ?go_away.time_left, "Server announced disconnect");
                } else if let Some(cancelled) = &other.tool_call_cancellation {
                    debug!(ids = ?cancelled.ids, "Tool calls cancelled by server");
                } else {
                    debug!("Ignoring unrecognized server message");
                }
                Vec::new()
            }
        }
    }

    fn dispatch_content(&mut self, content: ServerContent) -> Vec<LiveEvent> {
        // An interrupted frame carries nothing else worth acting on.
        if content.is_interrupted() {
            return vec![LiveEvent::Interrupted];
        }

        let mut events = Vec::new();

        if let Some(input) = &content.input_transcription {
            self.transcript.push_input(&input.text);
            if !input.text.is_empty() {
                events.push(LiveEvent::InputTranscription(input.text.clone()));
            }
        }

        if let Some(output) = &content.output_transcription {
            self.transcript.push_output(&output.text);
            if !output.text.is_empty() {
                events.push(LiveEvent::OutputTranscription(output.text.clone()));
            }
        }

        for data in content.inline_audio() {
            events.push(LiveEvent::AudioData(data.to_string()));
        }

        if content.is_turn_complete() {
            events.push(LiveEvent::TurnComplete);
            if let Some(pair) = self.transcript.on_turn_boundary() {
                events.push(LiveEvent::TurnPair(pair));
            }
        }

        events
    }
}

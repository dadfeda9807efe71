//! WebSocket mock server for the Gemini Live API
//!
//! Accepts one setup message per connection, acknowledges it, and answers
//! every completed user turn with transcripts, a chunk of audio and a turn
//! completion, the way the live service streams a spoken reply.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{Sink, SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

/// Scripted replies for a completed user turn.
#[derive(Clone, Debug)]
pub struct MockBehavior {
    pub question: String,
    pub answer: String,
    /// Base64 PCM sent as one model audio part
    pub audio: String,
    /// Ask for a tool before answering
    pub tool_call: Option<Value>,
    /// Send replies as binary frames
    pub binary_frames: bool,
}

impl Default for MockBehavior {
    fn default() -> Self {
        Self {
            question: "What is the capital of France?".to_string(),
            answer: "The capital of France is Paris.".to_string(),
            audio: "AAABAAIAAwA=".to_string(),
            tool_call: None,
            binary_frames: false,
        }
    }
}

/// Shared state observed by tests.
#[derive(Default)]
pub struct GeminiLiveMock {
    pub behavior: MockBehavior,
    /// Request URIs of accepted connections
    pub uris: Mutex<Vec<String>>,
    /// Every client message received, in order
    pub received: Mutex<Vec<Value>>,
}

impl GeminiLiveMock {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            ..Default::default()
        }
    }

    pub fn received_of(&self, kind: &str) -> Vec<Value> {
        self.received
            .lock()
            .iter()
            .filter_map(|message| message.get(kind).cloned())
            .collect()
    }
}

async fn send_json<S>(write: &mut S, value: Value, binary: bool) -> Result<(), S::Error>
where
    S: Sink<Message> + Unpin,
{
    let text = value.to_string();
    let message = if binary {
        Message::Binary(text.into_bytes().into())
    } else {
        Message::Text(text.into())
    };
    write.send(message).await
}

async fn handle_connection(
    stream: TcpStream,
    state: Arc<GeminiLiveMock>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let uris = state.clone();
    let record_uri = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        uris.uris.lock().push(req.uri().to_string());
        Ok(resp)
    };
    let ws_stream = accept_hdr_async(stream, record_uri).await?;
    let (mut write, mut read) = ws_stream.split();
    let behavior = state.behavior.clone();
    let binary = behavior.binary_frames;

    while let Some(msg) = read.next().await {
        let text = match msg? {
            Message::Text(text) => text.as_str().to_string(),
            Message::Binary(data) => String::from_utf8_lossy(&data).into_owned(),
            Message::Ping(data) => {
                write.send(Message::Pong(data)).await?;
                continue;
            }
            Message::Close(_) => break,
            _ => continue,
        };

        let value: Value = match serde_json::from_str(&text) {
            Ok(value) => value,
            Err(_) => continue,
        };
        state.received.lock().push(value.clone());

        if value.get("setup").is_some() {
            send_json(&mut write, json!({ "setupComplete": {} }), binary).await?;
            continue;
        }

        let turn_complete = value
            .pointer("/clientContent/turnComplete")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if !turn_complete {
            continue;
        }

        if let Some(call) = &behavior.tool_call {
            send_json(
                &mut write,
                json!({ "toolCall": { "functionCalls": [call] } }),
                binary,
            )
            .await?;
        }

        send_json(
            &mut write,
            json!({ "serverContent": { "inputTranscription": { "text": behavior.question } } }),
            binary,
        )
        .await?;
        send_json(
            &mut write,
            json!({
                "serverContent": {
                    "outputTranscription": { "text": behavior.answer },
                    "modelTurn": {
                        "role": "model",
                        "parts": [{ "inlineData": { "mimeType": "audio/pcm;rate=24000", "data": behavior.audio } }]
                    }
                }
            }),
            binary,
        )
        .await?;
        send_json(
            &mut write,
            json!({ "serverContent": { "generationComplete": true, "turnComplete": true } }),
            binary,
        )
        .await?;
    }

    Ok(())
}

/// Start the mock on an ephemeral port and return its address.
pub async fn spawn_gemini_live_mock(
    state: Arc<GeminiLiveMock>,
) -> std::io::Result<(SocketAddr, tokio::task::JoinHandle<()>)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        loop {
            let (stream, _) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    eprintln!("Gemini Live mock accept error: {}", e);
                    break;
                }
            };
            let state = state.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, state).await {
                    eprintln!("Gemini Live mock connection error: {}", e);
                }
            });
        }
    });

    Ok((addr, handle))
}

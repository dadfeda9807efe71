//! Integration tests over a real WebSocket against a local mock server
//!
//! These tests verify:
//! - Endpoint construction and API key forwarding
//! - Setup handshake and turn exchange end to end
//! - Tool call round trips
//! - Recording from a WAV file and writing model audio to a WAV file
//!
//! Note: Tests against the real service are marked with #[ignore]
//! and require the GEMINI_API_KEY environment variable.

mod mock_providers;

use std::sync::Arc;
use std::time::Duration;

use mock_providers::{GeminiLiveMock, MockBehavior, spawn_gemini_live_mock};
use serde_json::json;
use tokio::sync::mpsc;
use waav_live::LiveConfig;
use waav_live::core::live::{
    AudioEgressChannel, ConnectionState, FunctionResponse, LiveEvent, LiveSession,
    ReconnectSupervisor, ToolResponseChannel, TurnPair, WavFileCapture, WavFilePlayback,
    encode_pcm16,
};

const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

fn config_for(addr: std::net::SocketAddr) -> LiveConfig {
    LiveConfig {
        api_key: Some("test-api-key".to_string()),
        endpoint: Some(format!("ws://{}/ws/live", addr)),
        allow_insecure: true,
        ..Default::default()
    }
}

async fn wait_for<F>(rx: &mut mpsc::UnboundedReceiver<LiveEvent>, mut matches: F) -> LiveEvent
where
    F: FnMut(&LiveEvent) -> bool,
{
    tokio::time::timeout(EVENT_TIMEOUT, async {
        loop {
            let event = rx.recv().await.expect("event channel closed");
            if matches(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

#[tokio::test]
async fn test_session_turn_over_websocket() {
    let mock = Arc::new(GeminiLiveMock::default());
    let (addr, server) = spawn_gemini_live_mock(mock.clone()).await.unwrap();
    let config = config_for(addr);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let session = LiveSession::connect(
        &config.connector().unwrap(),
        config.session_options(),
        Arc::new(tx),
    )
    .unwrap();

    session.ensure_open(config.connect_timeout()).await.unwrap();
    session.wait_for_setup_complete().await.unwrap();

    let uris = mock.uris.lock().clone();
    assert_eq!(uris.len(), 1);
    assert!(uris[0].starts_with("/ws/live?"));
    assert!(uris[0].contains("key=test-api-key"));

    let setups = mock.received_of("setup");
    assert_eq!(setups.len(), 1);
    assert_eq!(setups[0]["model"], json!(config.model));

    let egress = AudioEgressChannel::new(session.clone());
    egress.send_pcm(&[0u8; 640]).await.unwrap();
    egress.send_end_message().await.unwrap();

    let audio = wait_for(&mut rx, |e| matches!(e, LiveEvent::AudioData(_))).await;
    assert_eq!(audio, LiveEvent::AudioData("AAABAAIAAwA=".to_string()));

    let pair = wait_for(&mut rx, |e| matches!(e, LiveEvent::TurnPair(_))).await;
    assert_eq!(
        pair,
        LiveEvent::TurnPair(TurnPair {
            question: "What is the capital of France?".to_string(),
            answer: "The capital of France is Paris.".to_string(),
        })
    );

    assert_eq!(mock.received_of("realtimeInput").len(), 1);
    assert_eq!(
        mock.received_of("clientContent")[0]["turnComplete"],
        json!(true)
    );

    session.close();
    wait_for(&mut rx, |e| matches!(e, LiveEvent::Close(_))).await;
    assert_eq!(session.state(), ConnectionState::Closed);
    server.abort();
}

#[tokio::test]
async fn test_binary_replies_over_websocket() {
    let mock = Arc::new(GeminiLiveMock::new(MockBehavior {
        binary_frames: true,
        ..Default::default()
    }));
    let (addr, server) = spawn_gemini_live_mock(mock.clone()).await.unwrap();
    let config = config_for(addr);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let session = LiveSession::connect(
        &config.connector().unwrap(),
        config.session_options(),
        Arc::new(tx),
    )
    .unwrap();
    session.ensure_open(config.connect_timeout()).await.unwrap();
    session.wait_for_setup_complete().await.unwrap();

    AudioEgressChannel::new(session.clone())
        .send_end_message()
        .await
        .unwrap();
    wait_for(&mut rx, |e| matches!(e, LiveEvent::TurnPair(_))).await;

    session.dispose();
    server.abort();
}

#[tokio::test]
async fn test_tool_call_over_websocket() {
    let mock = Arc::new(GeminiLiveMock::new(MockBehavior {
        tool_call: Some(json!({ "id": "fc-7", "name": "lookup_order", "args": { "order": 42 } })),
        ..Default::default()
    }));
    let (addr, server) = spawn_gemini_live_mock(mock.clone()).await.unwrap();
    let config = config_for(addr);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let session = LiveSession::connect(
        &config.connector().unwrap(),
        config.session_options(),
        Arc::new(tx),
    )
    .unwrap();
    session.ensure_open(config.connect_timeout()).await.unwrap();
    session.wait_for_setup_complete().await.unwrap();

    AudioEgressChannel::new(session.clone())
        .send_end_message()
        .await
        .unwrap();

    let call = match wait_for(&mut rx, |e| matches!(e, LiveEvent::ToolCall(_))).await {
        LiveEvent::ToolCall(tool_call) => tool_call.function_calls[0].clone(),
        other => panic!("expected tool call, got {:?}", other),
    };
    assert_eq!(call.id, "fc-7");

    ToolResponseChannel::new(session.clone())
        .send_tool_response(vec![FunctionResponse::for_call(
            &call,
            json!({ "status": "shipped" }),
        )])
        .await
        .unwrap();
    wait_for(&mut rx, |e| matches!(e, LiveEvent::TurnComplete)).await;

    let responses = tokio::time::timeout(EVENT_TIMEOUT, async {
        loop {
            let responses = mock.received_of("toolResponse");
            if !responses.is_empty() {
                return responses;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("tool response never reached the server");
    assert_eq!(responses.len(), 1);
    assert_eq!(
        responses[0]["functionResponses"][0],
        json!({ "id": "fc-7", "name": "lookup_order", "response": { "status": "shipped" } })
    );

    session.close();
    wait_for(&mut rx, |e| matches!(e, LiveEvent::Close(_))).await;
    server.abort();
}

#[tokio::test]
async fn test_connect_refused_reports_error_then_close() {
    // Reserve a port, then free it so nothing listens there.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = config_for(addr);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let session = LiveSession::connect(
        &config.connector().unwrap(),
        config.session_options(),
        Arc::new(tx),
    )
    .unwrap();

    assert!(session.ensure_open(EVENT_TIMEOUT).await.is_err());
    assert!(matches!(
        wait_for(&mut rx, |_| true).await,
        LiveEvent::Error(_)
    ));
    assert!(matches!(
        wait_for(&mut rx, |_| true).await,
        LiveEvent::Close(_)
    ));
    assert_eq!(session.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_recording_from_wav_file_to_wav_playback() {
    let mock = Arc::new(GeminiLiveMock::new(MockBehavior {
        audio: encode_pcm16(&[100, -100, 200, -200]),
        ..Default::default()
    }));
    let (addr, server) = spawn_gemini_live_mock(mock.clone()).await.unwrap();
    let config = config_for(addr);

    let dir = tempfile::tempdir().unwrap();
    let input_path = dir.path().join("question.wav");
    let output_path = dir.path().join("answer.wav");

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 16000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&input_path, spec).unwrap();
    for i in 0..4800 {
        writer.write_sample((i % 64) as i16).unwrap();
    }
    writer.finalize().unwrap();

    let playback = Arc::new(WavFilePlayback::create(&output_path).unwrap());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let supervisor = ReconnectSupervisor::new(
        Arc::new(config.connector().unwrap()),
        config.session_options(),
        Arc::new(tx),
    )
    .with_playback(playback.clone());

    let capture = Arc::new(WavFileCapture::new(&input_path).paced(false));
    supervisor.start_recording(capture.clone()).await.unwrap();
    tokio::time::timeout(EVENT_TIMEOUT, capture.wait_finished())
        .await
        .unwrap();
    supervisor.stop_recording().await.unwrap();

    wait_for(&mut rx, |e| matches!(e, LiveEvent::TurnPair(_))).await;
    supervisor.shutdown().await.unwrap();
    playback.finish().unwrap();

    // 4800 samples at 100ms (1600 samples) per chunk.
    assert_eq!(mock.received_of("realtimeInput").len(), 3);
    assert_eq!(playback.samples_written(), 4);
    assert_eq!(playback.completed_turns(), 1);

    let reader = hound::WavReader::open(&output_path).unwrap();
    assert_eq!(reader.spec().sample_rate, 24000);
    let samples: Vec<i16> = reader.into_samples::<i16>().map(|s| s.unwrap()).collect();
    assert_eq!(samples, vec![100, -100, 200, -200]);
    server.abort();
}

#[tokio::test]
#[ignore]
async fn test_live_service_handshake() {
    let config = LiveConfig::from_env().expect("GEMINI_API_KEY must be set");
    assert!(config.api_key.is_some(), "GEMINI_API_KEY must be set");

    let (tx, _rx) = mpsc::unbounded_channel();
    let session = LiveSession::connect(
        &config.connector().unwrap(),
        config.session_options(),
        Arc::new(tx),
    )
    .unwrap();
    session.ensure_open(config.connect_timeout()).await.unwrap();
    tokio::time::timeout(Duration::from_secs(10), session.wait_for_setup_complete())
        .await
        .unwrap()
        .unwrap();
    session.close();
}

//! Channel transport primitive.
//!
//! A [`Channel`] is a full-duplex message pipe: a synchronously queryable
//! [`ChannelSink`] for outbound frames plus an ordered stream of
//! [`ChannelEvent`]s (open, message, error, close). A [`Connector`] produces
//! channels; connecting returns immediately in [`ReadyState::Connecting`] and the
//! `Open` event follows once the handshake succeeds.
//!
//! Two connectors are provided:
//! - [`WebSocketConnector`] - tokio-tungstenite over TLS
//! - [`LoopbackConnector`] - in-process channel whose far end is a [`LoopbackPeer`]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tracing::{debug, error, info, warn};

use super::base::{CloseEvent, LiveError, LiveResult};
use super::codec::{self, Frame};
use super::messages::{ClientMessage, ServerMessage};
use crate::utils::redact_api_key;

/// Default budget for the WebSocket opening handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Close code reported when the peer closed without a status code.
const CLOSE_NO_STATUS: u16 = 1005;

/// Readiness of the underlying channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Connecting,
    Open,
    Closing,
    Closed,
}

/// Events produced by a channel, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Open,
    Message(Frame),
    Error(String),
    Close(CloseEvent),
}

/// Outbound half of a channel.
pub trait ChannelSink: Send + Sync {
    fn ready_state(&self) -> ReadyState;

    /// Queue a frame for transmission. Fire-and-forget: there is no send-side
    /// backpressure.
    fn transmit(&self, frame: Frame) -> LiveResult<()>;

    /// Start closing the channel. A `Close` event follows.
    fn close(&self);
}

/// A connected (or connecting) channel.
pub struct Channel {
    pub sink: Arc<dyn ChannelSink>,
    pub events: mpsc::UnboundedReceiver<ChannelEvent>,
}

/// Factory for channels.
pub trait Connector: Send + Sync {
    /// Create a new channel. Must be called from within a tokio runtime.
    fn connect(&self) -> LiveResult<Channel>;
}

// =============================================================================
// WebSocket
// =============================================================================

enum Outbound {
    Frame(Frame),
    Close,
}

struct WebSocketSink {
    ready: Arc<RwLock<ReadyState>>,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl ChannelSink for WebSocketSink {
    fn ready_state(&self) -> ReadyState {
        *self.ready.read()
    }

    fn transmit(&self, frame: Frame) -> LiveResult<()> {
        if self.ready_state() != ReadyState::Open {
            return Err(LiveError::Transport("channel is not open".to_string()));
        }
        self.outbound
            .send(Outbound::Frame(frame))
            .map_err(|_| LiveError::Transport("channel task has stopped".to_string()))
    }

    fn close(&self) {
        let mut ready = self.ready.write();
        if matches!(*ready, ReadyState::Connecting | ReadyState::Open) {
            *ready = ReadyState::Closing;
            let _ = self.outbound.send(Outbound::Close);
        }
    }
}

/// Connects to a WebSocket endpoint using tokio-tungstenite.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: String,
    headers: Vec<(String, String)>,
    handshake_timeout: Duration,
}

impl WebSocketConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }

    /// Add a header to the upgrade request.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn build_request(&self) -> LiveResult<http::Request<()>> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| LiveError::InvalidConfiguration(e.to_string()))?;

        for (name, value) in &self.headers {
            let name = http::header::HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| LiveError::InvalidConfiguration(e.to_string()))?;
            let value = http::header::HeaderValue::from_str(value)
                .map_err(|e| LiveError::InvalidConfiguration(e.to_string()))?;
            request.headers_mut().insert(name, value);
        }

        Ok(request)
    }
}

impl Connector for WebSocketConnector {
    fn connect(&self) -> LiveResult<Channel> {
        let request = self.build_request()?;
        info!(url = %redact_api_key(&self.url), "Connecting to Live API");

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let ready = Arc::new(RwLock::new(ReadyState::Connecting));

        tokio::spawn(run_socket(
            request,
            self.handshake_timeout,
            ready.clone(),
            outbound_rx,
            event_tx,
        ));

        Ok(Channel {
            sink: Arc::new(WebSocketSink {
                ready,
                outbound: outbound_tx,
            }),
            events: event_rx,
        })
    }
}

fn fail_before_open(
    ready: &RwLock<ReadyState>,
    events: &mpsc::UnboundedSender<ChannelEvent>,
    detail: String,
) {
    error!("WebSocket connection failed: {}", detail);
    *ready.write() = ReadyState::Closed;
    let _ = events.send(ChannelEvent::Error(detail.clone()));
    let _ = events.send(ChannelEvent::Close(CloseEvent::abnormal(detail)));
}

async fn run_socket(
    request: http::Request<()>,
    handshake_timeout: Duration,
    ready: Arc<RwLock<ReadyState>>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    events: mpsc::UnboundedSender<ChannelEvent>,
) {
    let connected =
        tokio::time::timeout(handshake_timeout, tokio_tungstenite::connect_async(request)).await;

    let ws_stream = match connected {
        Ok(Ok((stream, _response))) => stream,
        Ok(Err(e)) => {
            fail_before_open(&ready, &events, e.to_string());
            return;
        }
        Err(_) => {
            fail_before_open(
                &ready,
                &events,
                format!("handshake timed out after {}ms", handshake_timeout.as_millis()),
            );
            return;
        }
    };

    let cancelled = {
        let mut state = ready.write();
        if *state == ReadyState::Closing {
            true
        } else {
            *state = ReadyState::Open;
            false
        }
    };
    if cancelled {
        // Closed by the caller while the handshake was in flight.
        let (mut ws_sink, _) = ws_stream.split();
        let _ = ws_sink.send(Message::Close(None)).await;
        *ready.write() = ReadyState::Closed;
        let _ = events.send(ChannelEvent::Close(CloseEvent::normal()));
        return;
    }
    info!("WebSocket connected");
    let _ = events.send(ChannelEvent::Open);

    let (mut ws_sink, mut ws_stream) = ws_stream.split();

    let close = loop {
        tokio::select! {
            outgoing = outbound.recv() => match outgoing {
                Some(Outbound::Frame(frame)) => {
                    let message = match frame {
                        Frame::Text(text) => Message::Text(text.into()),
                        Frame::Binary(data) => Message::Binary(data.into()),
                    };
                    if let Err(e) = ws_sink.send(message).await {
                        error!("Failed to send WebSocket message: {}", e);
                        let _ = events.send(ChannelEvent::Error(e.to_string()));
                        break CloseEvent::abnormal(e.to_string());
                    }
                }
                Some(Outbound::Close) | None => {
                    *ready.write() = ReadyState::Closing;
                    if let Err(e) = ws_sink.send(Message::Close(None)).await {
                        debug!("Failed to send close frame: {}", e);
                    }
                    break CloseEvent::normal();
                }
            },

            incoming = ws_stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let frame = Frame::Text(text.as_str().to_string());
                    let _ = events.send(ChannelEvent::Message(frame));
                }
                Some(Ok(Message::Binary(data))) => {
                    let _ = events.send(ChannelEvent::Message(Frame::Binary(data.to_vec())));
                }
                Some(Ok(Message::Ping(data))) => {
                    if let Err(e) = ws_sink.send(Message::Pong(data)).await {
                        warn!("Failed to send pong: {}", e);
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    info!("WebSocket closed by server");
                    break match frame {
                        Some(frame) => {
                            CloseEvent::new(u16::from(frame.code), frame.reason.as_str())
                        }
                        None => CloseEvent::new(CLOSE_NO_STATUS, ""),
                    };
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    error!("WebSocket error: {}", e);
                    let _ = events.send(ChannelEvent::Error(e.to_string()));
                    break CloseEvent::abnormal(e.to_string());
                }
                None => break CloseEvent::abnormal("connection dropped"),
            },
        }
    };

    *ready.write() = ReadyState::Closed;
    let _ = events.send(ChannelEvent::Close(close));
}

// =============================================================================
// Loopback
// =============================================================================

struct LoopbackSink {
    ready: Arc<RwLock<ReadyState>>,
    sent: mpsc::UnboundedSender<Frame>,
    events: mpsc::UnboundedSender<ChannelEvent>,
    close_requested: Arc<AtomicBool>,
}

impl ChannelSink for LoopbackSink {
    fn ready_state(&self) -> ReadyState {
        *self.ready.read()
    }

    fn transmit(&self, frame: Frame) -> LiveResult<()> {
        if self.ready_state() != ReadyState::Open {
            return Err(LiveError::Transport("channel is not open".to_string()));
        }
        let _ = self.sent.send(frame);
        Ok(())
    }

    fn close(&self) {
        self.close_requested.store(true, Ordering::SeqCst);
        let mut ready = self.ready.write();
        if *ready != ReadyState::Closed {
            *ready = ReadyState::Closed;
            let _ = self.events.send(ChannelEvent::Close(CloseEvent::normal()));
        }
    }
}

/// The far end of a loopback channel: scripts inbound events and observes
/// transmitted frames.
pub struct LoopbackPeer {
    ready: Arc<RwLock<ReadyState>>,
    events: mpsc::UnboundedSender<ChannelEvent>,
    sent: mpsc::UnboundedReceiver<Frame>,
    close_requested: Arc<AtomicBool>,
}

impl LoopbackPeer {
    pub fn open(&self) {
        *self.ready.write() = ReadyState::Open;
        let _ = self.events.send(ChannelEvent::Open);
    }

    pub fn send_message(&self, message: &ServerMessage) -> LiveResult<()> {
        let frame = codec::encode(message)?;
        let _ = self.events.send(ChannelEvent::Message(frame));
        Ok(())
    }

    pub fn send_text(&self, text: impl Into<String>) {
        let _ = self
            .events
            .send(ChannelEvent::Message(Frame::Text(text.into())));
    }

    pub fn send_binary(&self, data: impl Into<Vec<u8>>) {
        let _ = self
            .events
            .send(ChannelEvent::Message(Frame::Binary(data.into())));
    }

    /// Report a transport fault. Readiness is left unchanged.
    pub fn fail(&self, detail: impl Into<String>) {
        let _ = self.events.send(ChannelEvent::Error(detail.into()));
    }

    pub fn close(&self, close: CloseEvent) {
        *self.ready.write() = ReadyState::Closed;
        let _ = self.events.send(ChannelEvent::Close(close));
    }

    pub fn ready_state(&self) -> ReadyState {
        *self.ready.read()
    }

    pub fn close_requested(&self) -> bool {
        self.close_requested.load(Ordering::SeqCst)
    }

    /// Next frame transmitted by the local side.
    pub async fn next_frame(&mut self) -> Option<Frame> {
        self.sent.recv().await
    }

    /// Next transmitted frame, decoded.
    pub async fn next_message(&mut self) -> Option<LiveResult<ClientMessage>> {
        self.sent.recv().await.map(|frame| codec::decode(&frame))
    }

    /// A frame that has already been transmitted, without waiting.
    pub fn try_next_frame(&mut self) -> Option<Frame> {
        self.sent.try_recv().ok()
    }
}

/// Create an in-process channel and its peer.
pub fn loopback_channel() -> (Channel, LoopbackPeer) {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (sent_tx, sent_rx) = mpsc::unbounded_channel();
    let ready = Arc::new(RwLock::new(ReadyState::Connecting));
    let close_requested = Arc::new(AtomicBool::new(false));

    let sink = LoopbackSink {
        ready: ready.clone(),
        sent: sent_tx,
        events: event_tx.clone(),
        close_requested: close_requested.clone(),
    };
    let peer = LoopbackPeer {
        ready,
        events: event_tx,
        sent: sent_rx,
        close_requested,
    };

    (
        Channel {
            sink: Arc::new(sink),
            events: event_rx,
        },
        peer,
    )
}

/// Connector producing loopback channels; each new peer is handed out on the
/// receiver returned by [`LoopbackConnector::new`].
#[derive(Clone)]
pub struct LoopbackConnector {
    peers: mpsc::UnboundedSender<LoopbackPeer>,
}

impl LoopbackConnector {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<LoopbackPeer>) {
        let (peers, rx) = mpsc::unbounded_channel();
        (Self { peers }, rx)
    }
}

impl Connector for LoopbackConnector {
    fn connect(&self) -> LiveResult<Channel> {
        let (channel, peer) = loopback_channel();
        self.peers
            .send(peer)
            .map_err(|_| LiveError::Transport("loopback listener dropped".to_string()))?;
        Ok(channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_loopback_transmit_requires_open() {
        let (channel, mut peer) = loopback_channel();
        let frame = Frame::Text("{}".to_string());

        assert!(channel.sink.transmit(frame.clone()).is_err());
        assert!(peer.try_next_frame().is_none());

        peer.open();
        assert_eq!(channel.sink.ready_state(), ReadyState::Open);
        channel.sink.transmit(frame.clone()).unwrap();
        assert_eq!(peer.next_frame().await, Some(frame));
    }

    #[tokio::test]
    async fn test_loopback_events_in_order() {
        let (mut channel, peer) = loopback_channel();
        peer.open();
        peer.send_text("a");
        peer.send_binary(b"b".to_vec());
        peer.close(CloseEvent::normal());

        assert_eq!(channel.events.recv().await, Some(ChannelEvent::Open));
        assert_eq!(
            channel.events.recv().await,
            Some(ChannelEvent::Message(Frame::Text("a".to_string())))
        );
        assert_eq!(
            channel.events.recv().await,
            Some(ChannelEvent::Message(Frame::Binary(b"b".to_vec())))
        );
        assert_eq!(
            channel.events.recv().await,
            Some(ChannelEvent::Close(CloseEvent::normal()))
        );
    }

    #[tokio::test]
    async fn test_loopback_local_close() {
        let (mut channel, peer) = loopback_channel();
        peer.open();
        let _ = channel.events.recv().await;

        channel.sink.close();
        assert!(peer.close_requested());
        assert_eq!(channel.sink.ready_state(), ReadyState::Closed);
        assert_eq!(
            channel.events.recv().await,
            Some(ChannelEvent::Close(CloseEvent::normal()))
        );
    }

    #[tokio::test]
    async fn test_loopback_connector_hands_out_peers() {
        let (connector, mut peers) = LoopbackConnector::new();
        let _first = connector.connect().unwrap();
        let _second = connector.connect().unwrap();
        assert!(peers.recv().await.is_some());
        assert!(peers.recv().await.is_some());
    }

    #[test]
    fn test_websocket_request_headers() {
        let connector = WebSocketConnector::new("wss://example.com/ws?key=secret")
            .with_header("x-goog-api-client", "waav-live");
        let request = connector.build_request().unwrap();
        assert_eq!(request.uri().host(), Some("example.com"));
        assert_eq!(
            request.headers().get("x-goog-api-client").unwrap(),
            "waav-live"
        );
    }

    #[test]
    fn test_websocket_request_rejects_bad_url() {
        let connector = WebSocketConnector::new("not a url");
        assert!(matches!(
            connector.build_request(),
            Err(LiveError::InvalidConfiguration(_))
        ));
    }

    #[tokio::test]
    async fn test_websocket_connect_failure_reports_error_then_close() {
        // Nothing listens on port 9 of the loopback interface.
        let connector = WebSocketConnector::new("ws://127.0.0.1:9/ws")
            .with_handshake_timeout(Duration::from_secs(2));
        let mut channel = connector.connect().unwrap();
        assert_eq!(channel.sink.ready_state(), ReadyState::Connecting);

        match channel.events.recv().await {
            Some(ChannelEvent::Error(_)) => {}
            other => panic!("expected error event, got {:?}", other),
        }
        match channel.events.recv().await {
            Some(ChannelEvent::Close(close)) => assert!(!close.is_normal()),
            other => panic!("expected close event, got {:?}", other),
        }
        assert_eq!(channel.sink.ready_state(), ReadyState::Closed);
    }
}

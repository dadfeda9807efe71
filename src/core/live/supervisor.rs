//! Caller-side reconnection and recording policy.
//!
//! The session layer never retries. The supervisor decides when a new session
//! is needed: before each recording turn, if the current session is not open,
//! it connects a fresh one, re-registers the caller's handler on it, disposes
//! the old one and waits for the setup handshake to finish.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arc_swap::ArcSwapOption;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::audio::{AudioCapture, AudioChunkCallback, AudioPlayback, PlaybackBridge};
use super::base::{LiveError, LiveEventHandler, LiveResult};
use super::egress::AudioEgressChannel;
use super::session::{LiveSession, SessionOptions};
use super::transport::Connector;

pub struct ReconnectSupervisor {
    connector: Arc<dyn Connector>,
    options: SessionOptions,
    handler: RwLock<Arc<dyn LiveEventHandler>>,
    playback: Option<Arc<dyn AudioPlayback>>,
    session: Arc<ArcSwapOption<LiveSession>>,
    reconnect_lock: tokio::sync::Mutex<()>,
    recording: AtomicBool,
    chunks: Arc<Mutex<Option<mpsc::UnboundedSender<String>>>>,
    capture: Mutex<Option<Arc<dyn AudioCapture>>>,
    forwarder: Mutex<Option<JoinHandle<()>>>,
}

impl ReconnectSupervisor {
    pub fn new(
        connector: Arc<dyn Connector>,
        options: SessionOptions,
        handler: Arc<dyn LiveEventHandler>,
    ) -> Self {
        Self {
            connector,
            options,
            handler: RwLock::new(handler),
            playback: None,
            session: Arc::new(ArcSwapOption::empty()),
            reconnect_lock: tokio::sync::Mutex::new(()),
            recording: AtomicBool::new(false),
            chunks: Arc::new(Mutex::new(None)),
            capture: Mutex::new(None),
            forwarder: Mutex::new(None),
        }
    }

    /// Route model audio to `playback`. Playback is stopped whenever a new
    /// recording starts.
    pub fn with_playback(mut self, playback: Arc<dyn AudioPlayback>) -> Self {
        self.playback = Some(playback);
        self
    }

    /// The session in use right now, if any.
    pub fn current(&self) -> Option<Arc<LiveSession>> {
        self.session.load_full()
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }

    /// Replace the caller's handler on the current session and every later one.
    pub fn set_handler(&self, handler: Arc<dyn LiveEventHandler>) {
        *self.handler.write() = handler;
        if let Some(session) = self.current() {
            session.set_handler(self.session_handler());
        }
    }

    fn session_handler(&self) -> Arc<dyn LiveEventHandler> {
        let handler = self.handler.read().clone();
        match &self.playback {
            Some(playback) => Arc::new(PlaybackBridge::new(playback.clone(), handler)),
            None => handler,
        }
    }

    /// Connect a new session and make it current, disposing the previous one.
    ///
    /// Without auto-setup, a configured setup command is requested right away
    /// and goes out when the channel opens. Returns without waiting for the
    /// channel to open.
    pub fn connect(&self) -> LiveResult<Arc<LiveSession>> {
        let session = LiveSession::connect(
            self.connector.as_ref(),
            self.options.clone(),
            self.session_handler(),
        )?;
        info!(session_id = %session.id(), "Starting new session");

        if let Some(setup) = self.options.setup.clone().filter(|_| !self.options.auto_setup) {
            session.request_setup(setup)?;
        }

        if let Some(previous) = self.session.swap(Some(session.clone())) {
            debug!(session_id = %previous.id(), "Disposing superseded session");
            previous.dispose();
        }
        Ok(session)
    }

    /// Return an open session, connecting a new one if needed.
    ///
    /// A new session is only returned once its setup handshake completed. The
    /// wait has no time bound; it fails only if the new session terminates.
    pub async fn ensure_session(&self) -> LiveResult<Arc<LiveSession>> {
        let _guard = self.reconnect_lock.lock().await;

        if let Some(session) = self.current() {
            if session.is_open() {
                return Ok(session);
            }
        }

        let session = self.connect()?;
        session.wait_for_setup_complete().await?;
        Ok(session)
    }

    /// Begin a recording turn.
    ///
    /// Playback stops first. Every chunk from `capture` is sent through whichever
    /// session is current when the chunk is sent.
    pub async fn start_recording(&self, capture: Arc<dyn AudioCapture>) -> LiveResult<()> {
        if let Some(playback) = &self.playback {
            playback.stop();
        }

        self.ensure_session().await?;

        if self.recording.swap(true, Ordering::SeqCst) {
            warn!("Recording already in progress, restarting capture");
            self.stop_capture().await?;
            self.recording.store(true, Ordering::SeqCst);
        }

        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        *self.chunks.lock() = Some(tx);

        let chunks = self.chunks.clone();
        let on_data: AudioChunkCallback = Arc::new(move |chunk| {
            if let Some(tx) = chunks.lock().as_ref() {
                let _ = tx.send(chunk);
            }
        });

        let sessions = self.session.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(chunk) = rx.recv().await {
                let Some(session) = sessions.load_full() else {
                    continue;
                };
                if let Err(e) = AudioEgressChannel::new(session)
                    .send_audio_chunk(&chunk)
                    .await
                {
                    debug!("Audio chunk dropped: {}", e);
                }
            }
        });
        *self.forwarder.lock() = Some(forwarder);

        if let Err(e) = capture.start(on_data).await {
            self.recording.store(false, Ordering::SeqCst);
            self.chunks.lock().take();
            if let Some(forwarder) = self.forwarder.lock().take() {
                forwarder.abort();
            }
            return Err(e);
        }
        *self.capture.lock() = Some(capture);

        info!("Recording started");
        Ok(())
    }

    /// End the recording turn and send the end-of-turn marker on the session
    /// that is current now.
    ///
    /// Chunks captured before this call are sent ahead of the marker; chunks
    /// delivered afterwards are dropped.
    pub async fn stop_recording(&self) -> LiveResult<()> {
        self.recording.store(false, Ordering::SeqCst);
        self.stop_capture().await?;
        info!("Recording stopped");

        let session = self.current().ok_or(LiveError::Closed)?;
        AudioEgressChannel::new(session).send_end_message().await
    }

    /// Stop the capture source and wait for queued chunks to be sent.
    async fn stop_capture(&self) -> LiveResult<()> {
        // Dropping the sender lets the forwarder drain and exit.
        self.chunks.lock().take();

        let capture = self.capture.lock().take();
        let stopped = match capture {
            Some(capture) => capture.stop().await,
            None => Ok(()),
        };

        let forwarder = self.forwarder.lock().take();
        if let Some(forwarder) = forwarder {
            if let Err(e) = forwarder.await {
                if !e.is_cancelled() {
                    warn!("Audio forwarder failed: {}", e);
                }
            }
        }
        stopped
    }

    /// Stop any recording and close the current session.
    pub async fn shutdown(&self) -> LiveResult<()> {
        self.recording.store(false, Ordering::SeqCst);
        self.stop_capture().await?;
        if let Some(session) = self.session.swap(None) {
            session.close();
        }
        Ok(())
    }
}

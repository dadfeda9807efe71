//! A single Live API session bound to one channel.
//!
//! # Lifecycle
//!
//! ```text
//! Connecting --open--> Open --close/error--> Closed | Error
//! ```
//!
//! A session is never reopened. Reconnecting means building a new session on a
//! new channel (see [`ReconnectSupervisor`](super::supervisor::ReconnectSupervisor)).
//!
//! # Setup policy
//!
//! On the transition to `Open`:
//! - with auto-setup, the configured (or default) setup command is sent and any
//!   pending request is discarded;
//! - otherwise the pending request, if any, is sent;
//! - otherwise nothing is sent until [`LiveSession::request_setup`] is called.
//!
//! # Event processing
//!
//! A driver task consumes channel events one at a time. Each inbound frame is
//! decoded, dispatched and its events delivered to the handler before the next
//! frame is read, so transcript accumulation never interleaves.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use super::base::{ConnectionState, LiveError, LiveEvent, LiveEventHandler, LiveResult};
use super::codec::{self, Frame};
use super::config::default_setup;
use super::dispatch::ProtocolDispatcher;
use super::messages::{ClientMessage, SetupCommand};
use super::transport::{Channel, ChannelEvent, ChannelSink, Connector};

/// Per-session behavior.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Send setup as soon as the channel opens.
    /// Default: true
    pub auto_setup: bool,

    /// Setup command used by auto-setup. `None` means the built-in default.
    /// Deferred sessions ignore it; the supervisor requests it instead.
    pub setup: Option<SetupCommand>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            auto_setup: true,
            setup: None,
        }
    }
}

impl SessionOptions {
    /// Options that wait for an explicit setup request.
    pub fn deferred() -> Self {
        Self {
            auto_setup: false,
            setup: None,
        }
    }

    pub fn with_setup(mut self, setup: SetupCommand) -> Self {
        self.setup = Some(setup);
        self
    }
}

/// Observable session status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStatus {
    pub state: ConnectionState,
    pub setup_complete: bool,
}

struct SessionCore {
    pending_setup: Option<SetupCommand>,
    dispatcher: ProtocolDispatcher,
}

/// A Live API session.
pub struct LiveSession {
    id: Uuid,
    sink: Arc<dyn ChannelSink>,
    options: SessionOptions,
    core: Mutex<SessionCore>,
    status: watch::Sender<SessionStatus>,
    handler: RwLock<Arc<dyn LiveEventHandler>>,
    disposed: AtomicBool,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl LiveSession {
    /// Bind a session to a freshly created channel and start processing its events.
    pub fn open(
        channel: Channel,
        options: SessionOptions,
        handler: Arc<dyn LiveEventHandler>,
    ) -> Arc<Self> {
        let Channel { sink, events } = channel;
        let (status, _) = watch::channel(SessionStatus {
            state: ConnectionState::Connecting,
            setup_complete: false,
        });

        let session = Arc::new(Self {
            id: Uuid::new_v4(),
            sink,
            options,
            core: Mutex::new(SessionCore {
                pending_setup: None,
                dispatcher: ProtocolDispatcher::new(),
            }),
            status,
            handler: RwLock::new(handler),
            disposed: AtomicBool::new(false),
            driver: Mutex::new(None),
        });

        let span = info_span!("live_session", session_id = %session.id);
        let driver = tokio::spawn(Self::drive(Arc::downgrade(&session), events).instrument(span));
        *session.driver.lock() = Some(driver);

        debug!(session_id = %session.id, "Session created");
        session
    }

    /// Create a channel with `connector` and open a session on it.
    pub fn connect(
        connector: &dyn Connector,
        options: SessionOptions,
        handler: Arc<dyn LiveEventHandler>,
    ) -> LiveResult<Arc<Self>> {
        Ok(Self::open(connector.connect()?, options, handler))
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> ConnectionState {
        self.status.borrow().state
    }

    pub fn status(&self) -> SessionStatus {
        *self.status.borrow()
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    pub fn is_setup_complete(&self) -> bool {
        self.status.borrow().setup_complete
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Replace the event handler. Only one handler is active at a time.
    pub fn set_handler(&self, handler: Arc<dyn LiveEventHandler>) {
        *self.handler.write() = handler;
    }

    /// The command waiting to be sent on the next `Open` transition.
    pub fn pending_setup(&self) -> Option<SetupCommand> {
        self.core.lock().pending_setup.clone()
    }

    /// Current `(input, output)` transcript buffers.
    pub fn transcript_buffers(&self) -> (String, String) {
        let core = self.core.lock();
        let transcript = core.dispatcher.transcript();
        (transcript.input().to_string(), transcript.output().to_string())
    }

    /// Number of callers currently waiting on a state change.
    pub fn open_waiters(&self) -> usize {
        self.status.receiver_count()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    // =========================================================================
    // Outbound
    // =========================================================================

    /// Send a setup command now if open, otherwise hold it for the next open.
    ///
    /// Only one command is held; a later request replaces an earlier one.
    pub fn request_setup(&self, setup: SetupCommand) -> LiveResult<()> {
        let mut core = self.core.lock();
        match self.state() {
            ConnectionState::Open => self.transmit(&ClientMessage::Setup(setup)),
            ConnectionState::Connecting => {
                if core.pending_setup.replace(setup).is_some() {
                    debug!(session_id = %self.id, "Replaced pending setup request");
                }
                Ok(())
            }
            state => Err(LiveError::NotReady(state)),
        }
    }

    /// Send a message. Fails with [`LiveError::NotReady`] unless open; the
    /// failure is also reported to the handler from the calling task and
    /// nothing is queued.
    pub async fn send(&self, message: &ClientMessage) -> LiveResult<()> {
        let result = self.transmit(message);
        if let Err(err) = &result {
            warn!(session_id = %self.id, kind = message.kind(), "Send failed: {}", err);
            self.emit(LiveEvent::Error(err.clone())).await;
        }
        result
    }

    fn transmit(&self, message: &ClientMessage) -> LiveResult<()> {
        let state = self.state();
        if state != ConnectionState::Open || self.is_disposed() {
            return Err(LiveError::NotReady(state));
        }
        let frame = codec::encode_client(message)?;
        debug!(session_id = %self.id, kind = message.kind(), bytes = frame.len(), "Sending");
        self.sink.transmit(frame)
    }

    // =========================================================================
    // Waiting
    // =========================================================================

    /// Wait until the channel is open.
    ///
    /// Resolves immediately when already open. Otherwise fails with
    /// [`LiveError::ConnectionTimeout`] once `timeout` elapses, or as soon as the
    /// channel errors or closes. The state subscription is released on every path.
    pub async fn ensure_open(&self, timeout: Duration) -> LiveResult<()> {
        match self.state() {
            ConnectionState::Open => return Ok(()),
            ConnectionState::Connecting => {}
            state => return Err(LiveError::NotReady(state)),
        }

        let mut rx = self.status.subscribe();
        let wait = async move {
            loop {
                let state = rx.borrow_and_update().state;
                match state {
                    ConnectionState::Open => return Ok(()),
                    ConnectionState::Error => {
                        return Err(LiveError::Transport(
                            "channel failed before opening".to_string(),
                        ));
                    }
                    ConnectionState::Closing | ConnectionState::Closed => {
                        return Err(LiveError::Closed);
                    }
                    ConnectionState::Connecting => {}
                }
                if rx.changed().await.is_err() {
                    return Err(LiveError::Closed);
                }
            }
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(result) => result,
            Err(_) => {
                warn!(session_id = %self.id, "Timed out waiting for channel to open");
                Err(LiveError::ConnectionTimeout(timeout))
            }
        }
    }

    /// Wait until the peer acknowledges setup. No time bound is applied; the
    /// wait fails only if the session terminates first.
    pub async fn wait_for_setup_complete(&self) -> LiveResult<()> {
        let mut rx = self.status.subscribe();
        loop {
            let status = *rx.borrow_and_update();
            if status.setup_complete {
                return Ok(());
            }
            if status.state.is_terminal() || status.state == ConnectionState::Closing {
                return Err(LiveError::Closed);
            }
            if rx.changed().await.is_err() {
                return Err(LiveError::Closed);
            }
        }
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Ask the channel to close. The `Close` event is still delivered.
    pub fn close(&self) {
        if self.transition(ConnectionState::Closing) {
            info!(session_id = %self.id, "Closing session");
            self.sink.close();
        }
    }

    /// Detach this session: stop processing channel events, stop delivering
    /// events to the handler, and close the channel.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(session_id = %self.id, "Disposing session");
        if let Some(driver) = self.driver.lock().take() {
            driver.abort();
        }
        if !self.state().is_terminal() {
            self.sink.close();
            self.status.send_if_modified(|status| {
                let changed = status.state.can_transition_to(ConnectionState::Closed);
                if changed {
                    status.state = ConnectionState::Closed;
                }
                changed
            });
        }
    }

    // =========================================================================
    // Inbound
    // =========================================================================

    async fn drive(session: Weak<Self>, mut events: mpsc::UnboundedReceiver<ChannelEvent>) {
        while let Some(event) = events.recv().await {
            let Some(session) = session.upgrade() else {
                break;
            };
            if session.is_disposed() {
                break;
            }
            let terminal = matches!(event, ChannelEvent::Close(_));

            match event {
                ChannelEvent::Open => session.handle_open(),
                ChannelEvent::Message(frame) => session.handle_frame(frame).await,
                ChannelEvent::Error(detail) => {
                    warn!("Channel error: {}", detail);
                    session.transition(ConnectionState::Error);
                    session
                        .emit(LiveEvent::Error(LiveError::Transport(detail)))
                        .await;
                }
                ChannelEvent::Close(close) => {
                    info!(code = close.code, reason = %close.reason, "Channel closed");
                    session.transition(ConnectionState::Closed);
                    session.emit(LiveEvent::Close(close)).await;
                }
            }

            if terminal {
                break;
            }
        }
    }

    fn handle_open(&self) {
        let mut core = self.core.lock();
        if !self.transition(ConnectionState::Open) {
            return;
        }
        info!("Channel open");

        let setup = if self.options.auto_setup {
            if core.pending_setup.take().is_some() {
                debug!("Auto-setup enabled, discarding pending setup request");
            }
            Some(self.options.setup.clone().unwrap_or_else(default_setup))
        } else {
            core.pending_setup.take()
        };

        // Keep the lock until the setup is handed to the channel.
        match setup {
            Some(setup) => {
                info!(model = %setup.model, "Sending setup");
                if let Err(e) = self.transmit(&ClientMessage::Setup(setup)) {
                    warn!("Failed to send setup: {}", e);
                }
            }
            None => debug!("Waiting for explicit setup request"),
        }
        drop(core);
    }

    async fn handle_frame(&self, frame: Frame) {
        let message = match codec::decode_server(&frame) {
            Ok(message) => message,
            Err(err) => {
                warn!("Dropping inbound frame: {}", err);
                self.emit(LiveEvent::Error(err)).await;
                return;
            }
        };

        let events = self.core.lock().dispatcher.dispatch(message);

        for event in events {
            if event == LiveEvent::SetupComplete {
                info!("Setup complete");
                self.status.send_if_modified(|status| {
                    let changed = !status.setup_complete;
                    status.setup_complete = true;
                    changed
                });
            }
            self.emit(event).await;
        }
    }

    /// Apply a state change if legal. Returns whether the state changed.
    fn transition(&self, next: ConnectionState) -> bool {
        self.status.send_if_modified(|status| {
            if status.state.can_transition_to(next) {
                debug!(from = %status.state, to = %next, "State transition");
                status.state = next;
                true
            } else {
                false
            }
        })
    }

    async fn emit(&self, event: LiveEvent) {
        if self.is_disposed() {
            return;
        }
        let handler = self.handler.read().clone();
        handler.handle(event).await;
    }
}

impl Drop for LiveSession {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.get_mut().take() {
            driver.abort();
        }
        if !self.state().is_terminal() {
            self.sink.close();
        }
    }
}

impl std::fmt::Debug for LiveSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveSession")
            .field("id", &self.id)
            .field("status", &self.status())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

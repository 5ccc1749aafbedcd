//! Connection engine.
//!
//! Owns the session and serializes every state transition. Background
//! tasks (poll loop, heartbeat, pong replies) never change state
//! themselves; they report through an [`EngineSignal`] channel drained
//! by a per-session supervisor task, which calls back into the engine.
//!
//! # Session Layout
//!
//! ```text
//! Engine
//!   └── Session (one per successful handshake)
//!         ├── session scope ──► heartbeat watchdog, supervisor, pong tasks
//!         │     └── generation scope ──► poll loop (one per transport)
//!         ├── delivery queue (poll loop ──► PacketStream)
//!         └── active transport (polling, then websocket after upgrade)
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::protocol::{HandshakeInfo, Packet, PacketType};
use crate::transport::{
    HttpClient, PollingTransport, ReqwestHttpClient, SocketTransport, Transport, TransportName,
};

use super::builder::EngineBuilder;
use super::heartbeat::HeartbeatMonitor;
use super::options::ClientOptions;
use super::poll_loop::{self, Drain, EngineSignal, Flow, PollContext};
use super::state::ConnectionState;
use super::stream::PacketStream;

// ============================================================================
// Constants
// ============================================================================

/// Upper bound on sending Close while tearing down.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on waiting for the server to flush the pending poll
/// during a manual upgrade.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Upgrade target offered by the server.
const WEBSOCKET_UPGRADE: &str = "websocket";

// ============================================================================
// Session
// ============================================================================

/// A running poll loop and its scope.
struct Generation {
    id: u64,
    scope: CancellationToken,
    drain: Arc<Drain>,
    task: JoinHandle<()>,
}

/// State of one handshake.
struct Session {
    id: u64,
    handshake: HandshakeInfo,
    transport: Arc<dyn Transport>,
    scope: CancellationToken,
    generation: Option<Generation>,
    heartbeat: HeartbeatMonitor,
    inbound: mpsc::UnboundedSender<Result<Packet>>,
    signals: mpsc::UnboundedSender<EngineSignal>,
    consumer_attached: Arc<AtomicBool>,
}

impl Session {
    fn poll_context(
        &self,
        generation: u64,
        scope: CancellationToken,
        drain: Arc<Drain>,
        options: &ClientOptions,
    ) -> PollContext {
        let polling_interval = match self.transport.name() {
            TransportName::Polling => options.polling_interval,
            TransportName::WebSocket => None,
        };

        PollContext {
            generation,
            transport: Arc::clone(&self.transport),
            scope,
            drain,
            inbound: self.inbound.clone(),
            signals: self.signals.clone(),
            heartbeat: self.heartbeat.clone(),
            polling_interval,
            buffering: options.buffering,
            consumer_attached: Arc::clone(&self.consumer_attached),
        }
    }

    fn generation_id(&self) -> Option<u64> {
        self.generation.as_ref().map(|g| g.id)
    }
}

// ============================================================================
// EngineInner
// ============================================================================

struct EngineInner<H> {
    options: ClientOptions,
    base: Url,
    http: H,
    state: Mutex<ConnectionState>,
    /// Serializes connect, upgrade, and teardown.
    lifecycle: tokio::sync::Mutex<()>,
    session: Mutex<Option<Session>>,
    /// Consumer end of the current delivery queue until taken.
    receiver: Mutex<Option<mpsc::UnboundedReceiver<Result<Packet>>>>,
    last_error: Mutex<Option<String>>,
    next_session: AtomicU64,
    next_generation: AtomicU64,
}

impl<H> Drop for EngineInner<H> {
    fn drop(&mut self) {
        if let Some(session) = self.session.get_mut().as_ref() {
            session.scope.cancel();
        }
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Engine.IO client.
///
/// Cheap to clone; all clones drive the same session.
///
/// # Example
///
/// ```no_run
/// use engineio_client::Engine;
///
/// # async fn example() -> engineio_client::Result<()> {
/// let engine = Engine::builder().uri("http://localhost:3000").build()?;
/// engine.connect().await?;
///
/// let mut stream = engine.receive_stream()?;
/// engine.send_text("hello").await?;
///
/// while let Some(packet) = stream.next_packet().await {
///     println!("{:?}", packet?.as_text());
/// }
/// # Ok(())
/// # }
/// ```
pub struct Engine<H: HttpClient = ReqwestHttpClient> {
    inner: Arc<EngineInner<H>>,
}

impl<H: HttpClient> Clone for Engine<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<H: HttpClient> std::fmt::Debug for Engine<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("uri", &self.inner.options.uri)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Engine - Constructors
// ============================================================================

impl Engine<ReqwestHttpClient> {
    /// Creates a configuration builder.
    #[inline]
    #[must_use]
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }
}

impl<H: HttpClient> Engine<H> {
    /// Creates an idle engine.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the options are invalid.
    pub(crate) fn new(options: ClientOptions, http: H) -> Result<Self> {
        options.validate().map_err(Error::config)?;
        let base = options.base_url().map_err(Error::config)?;

        Ok(Self {
            inner: Arc::new(EngineInner {
                options,
                base,
                http,
                state: Mutex::new(ConnectionState::Idle),
                lifecycle: tokio::sync::Mutex::new(()),
                session: Mutex::new(None),
                receiver: Mutex::new(None),
                last_error: Mutex::new(None),
                next_session: AtomicU64::new(1),
                next_generation: AtomicU64::new(1),
            }),
        })
    }
}

// ============================================================================
// Engine - Accessors
// ============================================================================

impl<H: HttpClient> Engine<H> {
    /// Returns the configuration.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &ClientOptions {
        &self.inner.options
    }

    /// Returns the current state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.lock()
    }

    /// Returns `true` while packets can be sent.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Returns the session parameters of the current session.
    #[must_use]
    pub fn handshake(&self) -> Option<HandshakeInfo> {
        self.inner
            .session
            .lock()
            .as_ref()
            .map(|s| s.handshake.clone())
    }

    /// Returns the transport currently carrying traffic.
    #[must_use]
    pub fn transport_name(&self) -> Option<TransportName> {
        self.inner
            .session
            .lock()
            .as_ref()
            .map(|s| s.transport.name())
    }

    /// Returns the most recent failure, including background failures
    /// such as unsent pongs.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.inner.last_error.lock().clone()
    }

    fn set_state(&self, next: ConnectionState) {
        let previous = std::mem::replace(&mut *self.inner.state.lock(), next);
        if previous != next {
            debug!(from = %previous, to = %next, "State changed");
        }
    }

    fn record_error(&self, error: &Error) {
        *self.inner.last_error.lock() = Some(error.to_string());
    }

    fn active_transport(&self) -> Result<Arc<dyn Transport>> {
        self.inner
            .session
            .lock()
            .as_ref()
            .map(|s| Arc::clone(&s.transport))
            .ok_or(Error::NotConnected)
    }
}

// ============================================================================
// Engine - Public API
// ============================================================================

impl<H: HttpClient> Engine<H> {
    /// Performs the handshake, upgrades if configured, and starts receiving.
    ///
    /// Failed handshakes are retried up to `max_retries` times; attempt N
    /// is followed by a wait of `N × reconnect_delay`. Only
    /// [recoverable](Error::is_recoverable) failures are retried; a
    /// malformed handshake ends the attempt at once.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] if already connected
    /// - the first unrecoverable handshake error, or the last one once
    ///   retries are exhausted (state `Closed`)
    pub async fn connect(&self) -> Result<()> {
        let _lifecycle = self.inner.lifecycle.lock().await;

        let state = self.state();
        if !state.can_connect() {
            return Err(Error::invalid_state(format!("cannot connect while {state}")));
        }

        let attempts = self.inner.options.connect_attempts();
        let mut last_error = None;

        for attempt in 1..=attempts {
            self.set_state(ConnectionState::Handshaking);

            let polling = Arc::new(PollingTransport::new(
                self.inner.http.clone(),
                self.inner.base.clone(),
                &self.inner.options.path,
            ));

            match polling.connect().await {
                Ok(()) => return self.establish(polling).await,
                Err(e) => {
                    warn!(attempt, attempts, error = %e, "Handshake failed");
                    let recoverable = e.is_recoverable();
                    last_error = Some(e);

                    if !recoverable {
                        debug!("Handshake error is not recoverable, not retrying");
                        break;
                    }
                    if attempt < attempts {
                        let delay = self.inner.options.backoff(attempt);
                        debug!(?delay, "Retrying handshake");
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        self.set_state(ConnectionState::Closed);
        let error = last_error.unwrap_or_else(|| Error::invalid_state("no handshake attempted"));
        error!(attempts, error = %error, "Giving up on handshake");
        self.record_error(&error);
        Err(error)
    }

    /// Sends a Message packet.
    ///
    /// With `is_binary == false` the payload must be UTF-8 text, on every
    /// transport.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] outside `Connected`/`Upgrading`
    /// - [`Error::InvalidPacket`] for a text payload that is not UTF-8
    /// - [`Error::PayloadTooLarge`] if the encoded packet exceeds `maxPayload`
    /// - transport errors
    pub async fn send(&self, payload: impl Into<Vec<u8>>, is_binary: bool) -> Result<()> {
        let payload = payload.into();
        let packet = if is_binary {
            Packet::binary(payload)
        } else {
            if std::str::from_utf8(&payload).is_err() {
                return Err(Error::invalid_packet("text payload is not UTF-8"));
            }
            Packet::plain(PacketType::Message, payload)
        };
        self.send_packet(packet).await
    }

    /// Sends a text Message.
    ///
    /// # Errors
    ///
    /// See [`Engine::send`].
    pub async fn send_text(&self, text: impl Into<String>) -> Result<()> {
        self.send_packet(Packet::text(text)).await
    }

    /// Sends a binary Message.
    ///
    /// # Errors
    ///
    /// See [`Engine::send`].
    pub async fn send_binary(&self, data: impl Into<Vec<u8>>) -> Result<()> {
        self.send_packet(Packet::binary(data)).await
    }

    async fn send_packet(&self, packet: Packet) -> Result<()> {
        if !self.state().is_connected() {
            return Err(Error::NotConnected);
        }

        let transport = self.active_transport()?;
        transport.send(packet).await
    }

    /// Takes the stream of received Message packets.
    ///
    /// Each session has one stream; it ends when the session closes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if no session was started or the
    /// stream of the current session was already taken.
    pub fn receive_stream(&self) -> Result<PacketStream> {
        let receiver = self.inner.receiver.lock().take().ok_or_else(|| {
            Error::invalid_state("receive stream already taken or never connected")
        })?;

        if let Some(session) = self.inner.session.lock().as_ref() {
            session.consumer_attached.store(true, Ordering::Release);
        }

        Ok(PacketStream::new(receiver))
    }

    /// Probes and switches to the WebSocket transport.
    ///
    /// The pending long-poll is left to complete; polling stops after it.
    /// On failure the polling transport stays active.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] if not connected
    /// - [`Error::InvalidState`] if the server does not offer websocket
    /// - probe and socket errors
    pub async fn upgrade(&self) -> Result<()> {
        let _lifecycle = self.inner.lifecycle.lock().await;

        match self.state() {
            ConnectionState::Connected(TransportName::Polling) => {}
            ConnectionState::Connected(TransportName::WebSocket) => return Ok(()),
            _ => return Err(Error::NotConnected),
        }

        let result = self.upgrade_locked().await;
        self.start_generation()?;
        result
    }

    /// Stops receiving, sends Close, and releases the transport.
    ///
    /// Idempotent.
    ///
    /// # Errors
    ///
    /// Currently always succeeds; Close delivery is best effort.
    pub async fn disconnect(&self) -> Result<()> {
        let _lifecycle = self.inner.lifecycle.lock().await;

        if self.inner.session.lock().is_none() {
            trace!("Disconnect without session");
            return Ok(());
        }

        self.close_session(None, true).await;
        Ok(())
    }
}

// ============================================================================
// Engine - Lifecycle
// ============================================================================

impl<H: HttpClient> Engine<H> {
    /// Installs a new session after a successful handshake.
    async fn establish(&self, polling: Arc<PollingTransport<H>>) -> Result<()> {
        let handshake = polling.handshake().ok_or(Error::NotConnected)?;
        let session_id = self.inner.next_session.fetch_add(1, Ordering::Relaxed);

        let scope = CancellationToken::new();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();

        let heartbeat =
            HeartbeatMonitor::new(handshake.heartbeat_window(), signal_tx.clone(), scope.clone());
        heartbeat.start();
        debug!(window = ?heartbeat.window(), "Heartbeat armed");

        let transport: Arc<dyn Transport> = polling.clone();
        let session = Session {
            id: session_id,
            handshake: handshake.clone(),
            transport,
            scope: scope.clone(),
            generation: None,
            heartbeat,
            inbound: inbound_tx,
            signals: signal_tx,
            consumer_attached: Arc::new(AtomicBool::new(false)),
        };

        let early = polling.take_pending();
        let flow = session
            .poll_context(0, scope.child_token(), Arc::default(), &self.inner.options)
            .dispatch(early);

        *self.inner.receiver.lock() = Some(inbound_rx);
        *self.inner.session.lock() = Some(session);
        self.set_state(ConnectionState::Connected(TransportName::Polling));
        info!(sid = %handshake.session_id, "Connected");

        tokio::spawn(supervise(
            Arc::downgrade(&self.inner),
            session_id,
            signal_rx,
            scope,
        ));

        if flow == Flow::Stop {
            self.close_session(None, false).await;
            return Err(Error::ConnectionClosed);
        }

        if self.inner.options.auto_upgrade && handshake.supports_upgrade(WEBSOCKET_UPGRADE) {
            if let Err(e) = self.upgrade_locked().await {
                warn!(error = %e, "Upgrade failed, staying on polling");
                self.record_error(&e);
            }
        }

        self.start_generation()
    }

    /// Spawns a poll loop on the active transport unless one is running.
    fn start_generation(&self) -> Result<()> {
        let mut guard = self.inner.session.lock();
        let session = guard.as_mut().ok_or(Error::NotConnected)?;
        if session.generation.is_some() {
            return Ok(());
        }

        let id = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let scope = session.scope.child_token();
        let drain = Arc::new(Drain::default());
        let context =
            session.poll_context(id, scope.clone(), Arc::clone(&drain), &self.inner.options);
        let task = tokio::spawn(poll_loop::run(context));

        session.generation = Some(Generation {
            id,
            scope,
            drain,
            task,
        });
        Ok(())
    }

    /// Asks the running poll loop to stop after its pending receive.
    fn request_drain(&self) {
        if let Some(generation) = self
            .inner
            .session
            .lock()
            .as_ref()
            .and_then(|s| s.generation.as_ref())
        {
            generation.drain.request();
        }
    }

    /// Withdraws a drain request. A loop that already stopped is reaped so
    /// the next [`Engine::start_generation`] replaces it.
    async fn resume_generation(&self) {
        let stopped = self.inner.session.lock().as_mut().and_then(|s| {
            let resumed = s.generation.as_ref().is_none_or(|g| g.drain.withdraw());
            if resumed {
                None
            } else {
                s.generation.take()
            }
        });

        if let Some(generation) = stopped
            && let Err(e) = generation.task.await
        {
            warn!(generation = generation.id, error = %e, "Poll loop panicked");
        }
    }

    /// Waits for a draining poll loop to exit.
    ///
    /// The batch it was waiting for is dispatched in full. A server that
    /// does not flush the pending poll within [`DRAIN_TIMEOUT`] gets the
    /// request abandoned.
    async fn finish_generation(&self) {
        let generation = self
            .inner
            .session
            .lock()
            .as_mut()
            .and_then(|s| s.generation.take());

        let Some(mut generation) = generation else {
            return;
        };

        generation.drain.request();
        let joined = match tokio::time::timeout(DRAIN_TIMEOUT, &mut generation.task).await {
            Ok(joined) => joined,
            Err(_) => {
                warn!(generation = generation.id, "Pending poll not flushed, abandoning it");
                generation.scope.cancel();
                generation.task.await
            }
        };

        if let Err(e) = joined {
            warn!(generation = generation.id, error = %e, "Poll loop panicked");
        }
    }

    /// Probe and cutover. Caller holds the lifecycle lock and restarts the
    /// poll loop afterwards.
    async fn upgrade_locked(&self) -> Result<()> {
        let (handshake, current) = {
            let guard = self.inner.session.lock();
            let session = guard.as_ref().ok_or(Error::NotConnected)?;
            (session.handshake.clone(), session.transport.name())
        };

        if current == TransportName::WebSocket {
            return Ok(());
        }
        if !handshake.supports_upgrade(WEBSOCKET_UPGRADE) {
            return Err(Error::invalid_state("server does not offer websocket"));
        }

        self.set_state(ConnectionState::Upgrading);
        self.request_drain();

        let socket = match self.open_socket(&handshake).await {
            Ok(socket) => socket,
            Err(e) => {
                self.resume_generation().await;
                self.set_state(ConnectionState::Connected(TransportName::Polling));
                return Err(e);
            }
        };

        self.finish_generation().await;

        let uri = socket.uri().to_string();
        if let Some(session) = self.inner.session.lock().as_mut() {
            session.transport = Arc::new(socket);
        }
        self.set_state(ConnectionState::Connected(TransportName::WebSocket));
        info!(sid = %handshake.session_id, %uri, "Upgraded to websocket");
        Ok(())
    }

    async fn open_socket(&self, handshake: &HandshakeInfo) -> Result<SocketTransport> {
        let mut socket =
            SocketTransport::new(&self.inner.base, &self.inner.options.path, handshake)?;
        if let Some(timeout) = self.inner.options.request_timeout {
            socket = socket.with_open_timeout(timeout);
        }
        socket.connect().await?;
        Ok(socket)
    }

    /// Tears the current session down. Caller holds the lifecycle lock.
    ///
    /// `failure` is delivered to the consumer as a final `Err` item.
    async fn close_session(&self, failure: Option<Error>, notify_server: bool) {
        let session = self.inner.session.lock().take();
        let Some(mut session) = session else {
            self.set_state(ConnectionState::Closed);
            return;
        };

        self.set_state(ConnectionState::Closing);
        session.scope.cancel();

        if let Some(generation) = session.generation.take()
            && let Err(e) = generation.task.await
        {
            warn!(generation = generation.id, error = %e, "Poll loop panicked");
        }

        if let Some(error) = failure {
            self.record_error(&error);
            let _ = session.inbound.send(Err(error));
        }

        if notify_server {
            match tokio::time::timeout(CLOSE_TIMEOUT, session.transport.disconnect()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "Failed to close transport"),
                Err(_) => warn!("Timed out closing transport"),
            }
        }

        let sid = session.handshake.session_id.clone();
        drop(session);

        self.set_state(ConnectionState::Closed);
        info!(%sid, "Session closed");
    }

    /// Handles one supervisor signal for session `session_id`.
    async fn handle_signal(&self, session_id: u64, signal: EngineSignal) {
        match signal {
            EngineSignal::PongFailed { error } => {
                warn!(%error, "Background pong failed");
                *self.inner.last_error.lock() = Some(error);
            }

            EngineSignal::HeartbeatTimeout { timeout_ms } => {
                let failure = Error::heartbeat_timeout(timeout_ms);
                self.teardown(session_id, None, Some(failure), None, true)
                    .await;
            }

            EngineSignal::ServerClosed { generation } => {
                self.teardown(session_id, Some(generation), None, None, false)
                    .await;
            }

            EngineSignal::TransportFailed { generation, error } => {
                self.teardown(session_id, Some(generation), None, Some(error), false)
                    .await;
            }
        }
    }

    /// Closes session `session_id` unless it was already replaced or the
    /// signalling generation is stale.
    ///
    /// `failure` is pushed to the consumer; `reason` is only recorded.
    async fn teardown(
        &self,
        session_id: u64,
        generation: Option<u64>,
        failure: Option<Error>,
        reason: Option<String>,
        notify_server: bool,
    ) {
        let _lifecycle = self.inner.lifecycle.lock().await;

        let current = {
            let guard = self.inner.session.lock();
            guard.as_ref().map(|s| (s.id, s.generation_id()))
        };

        match current {
            Some((id, active)) if id == session_id => {
                if generation.is_some() && generation != active {
                    trace!(?generation, ?active, "Ignoring signal from stale generation");
                    return;
                }
            }
            _ => return,
        }

        if let Some(reason) = reason {
            *self.inner.last_error.lock() = Some(reason);
        }
        self.close_session(failure, notify_server).await;
    }
}

// ============================================================================
// Supervisor
// ============================================================================

/// Drains background signals for one session.
async fn supervise<H: HttpClient>(
    inner: Weak<EngineInner<H>>,
    session_id: u64,
    mut signals: mpsc::UnboundedReceiver<EngineSignal>,
    scope: CancellationToken,
) {
    loop {
        let signal = tokio::select! {
            biased;

            () = scope.cancelled() => break,

            signal = signals.recv() => match signal {
                Some(signal) => signal,
                None => break,
            },
        };

        let Some(inner) = inner.upgrade() else {
            break;
        };

        trace!(session_id, ?signal, "Engine signal");
        Engine { inner }.handle_signal(session_id, signal).await;
    }

    trace!(session_id, "Supervisor exited");
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use futures_util::{SinkExt, StreamExt};
    use tokio_tungstenite::tungstenite::Message;

    use crate::testing::{
        MockHttpClient, handshake_body, probe_server, spawn_silent_server, spawn_ws_server,
    };

    fn engine(
        http: &MockHttpClient,
        base: &str,
        configure: fn(EngineBuilder) -> EngineBuilder,
    ) -> Engine<MockHttpClient> {
        configure(
            Engine::builder()
                .uri(base)
                .reconnect_delay(Duration::from_millis(5)),
        )
        .build_with_client(http.clone())
        .expect("build")
    }

    fn polling_only(builder: EngineBuilder) -> EngineBuilder {
        builder.auto_upgrade(false)
    }

    fn defaults(builder: EngineBuilder) -> EngineBuilder {
        builder
    }

    async fn wait_for_state(engine: &Engine<MockHttpClient>, expected: ConnectionState) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while engine.state() != expected {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("state not reached");
    }

    async fn wait_until(check: impl Fn() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !check() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached");
    }

    #[tokio::test]
    async fn test_connect_and_receive() {
        let http = MockHttpClient::new();
        http.push_get(handshake_body("abc", &[], 25_000, 20_000, 1_000_000));
        http.push_get(b"4Hello\x1e2\x1e4World".to_vec());

        let engine = engine(&http, "http://localhost:3000", polling_only);
        engine.connect().await.expect("connect");

        assert_eq!(
            engine.state(),
            ConnectionState::Connected(TransportName::Polling)
        );
        assert_eq!(engine.transport_name(), Some(TransportName::Polling));
        assert_eq!(engine.handshake().expect("handshake").session_id, "abc");

        let mut stream = engine.receive_stream().expect("stream");
        let first = stream.next_packet().await.expect("item").expect("packet");
        let second = stream.next_packet().await.expect("item").expect("packet");
        assert_eq!(first.as_text(), Some("Hello"));
        assert_eq!(second.as_text(), Some("World"));

        wait_until(|| http.posted(b"3")).await;
        assert!(http.get_urls()[1].ends_with("&sid=abc"));
    }

    #[tokio::test]
    async fn test_handshake_trailing_packets_delivered() {
        let http = MockHttpClient::new();
        let mut body = handshake_body("abc", &[], 25_000, 20_000, 1_000_000);
        body.extend_from_slice(b"\x1e4early");
        http.push_get(body);

        let engine = engine(&http, "http://localhost:3000", polling_only);
        engine.connect().await.expect("connect");

        let mut stream = engine.receive_stream().expect("stream");
        let packet = stream.next_packet().await.expect("item").expect("packet");
        assert_eq!(packet.as_text(), Some("early"));
    }

    #[tokio::test]
    async fn test_send_before_connect() {
        let http = MockHttpClient::new();
        let engine = engine(&http, "http://localhost:3000", defaults);

        let result = engine.send_text("hi").await;
        assert!(matches!(result, Err(Error::NotConnected)));
        assert_eq!(http.post_calls(), 0);
    }

    #[tokio::test]
    async fn test_send_text_and_binary() {
        let http = MockHttpClient::new();
        http.push_get(handshake_body("abc", &[], 25_000, 20_000, 1_000_000));

        let engine = engine(&http, "http://localhost:3000", polling_only);
        engine.connect().await.expect("connect");

        engine.send("hi", false).await.expect("text");
        engine.send(vec![1u8, 2, 3], true).await.expect("binary");

        assert!(http.posted(b"4hi"));
        assert!(http.posted(b"bAQID"));
    }

    #[tokio::test]
    async fn test_oversized_send_makes_no_request() {
        let http = MockHttpClient::new();
        http.push_get(handshake_body("abc", &[], 25_000, 20_000, 10));

        let engine = engine(&http, "http://localhost:3000", polling_only);
        engine.connect().await.expect("connect");

        let result = engine.send_text("x".repeat(100)).await;
        assert!(matches!(result, Err(Error::PayloadTooLarge { .. })));
        assert_eq!(http.post_calls(), 0);
    }

    #[tokio::test]
    async fn test_retry_then_succeed() {
        let http = MockHttpClient::new();
        http.push_get_error("refused");
        http.push_get_error("refused");
        http.push_get(handshake_body("abc", &[], 25_000, 20_000, 1_000_000));

        let engine = engine(&http, "http://localhost:3000", polling_only);
        engine.connect().await.expect("connect");

        assert!(engine.is_connected());
        assert!(http.get_calls() >= 3);
    }

    #[tokio::test]
    async fn test_retries_exhausted() {
        let http = MockHttpClient::new();
        for _ in 0..3 {
            http.push_get_error("refused");
        }

        let engine = engine(&http, "http://localhost:3000", polling_only);
        let result = engine.connect().await;

        assert!(matches!(result, Err(Error::TransportIo { .. })));
        assert_eq!(engine.state(), ConnectionState::Closed);
        assert_eq!(http.get_calls(), 3);
        assert!(engine.last_error().is_some());
    }

    #[tokio::test]
    async fn test_single_attempt_without_auto_reconnect() {
        let http = MockHttpClient::new();
        http.push_get_error("refused");
        http.push_get(handshake_body("abc", &[], 25_000, 20_000, 1_000_000));

        let engine = engine(&http, "http://localhost:3000", |b| {
            b.auto_upgrade(false).auto_reconnect(false)
        });

        assert!(engine.connect().await.is_err());
        assert_eq!(http.get_calls(), 1);
        assert_eq!(engine.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_connect_twice_rejected() {
        let http = MockHttpClient::new();
        http.push_get(handshake_body("abc", &[], 25_000, 20_000, 1_000_000));

        let engine = engine(&http, "http://localhost:3000", polling_only);
        engine.connect().await.expect("connect");

        let result = engine.connect().await;
        assert!(matches!(result, Err(Error::InvalidState { .. })));
    }

    #[tokio::test]
    async fn test_stream_taken_once() {
        let http = MockHttpClient::new();
        http.push_get(handshake_body("abc", &[], 25_000, 20_000, 1_000_000));

        let engine = engine(&http, "http://localhost:3000", polling_only);
        assert!(matches!(
            engine.receive_stream(),
            Err(Error::InvalidState { .. })
        ));

        engine.connect().await.expect("connect");
        assert!(engine.receive_stream().is_ok());
        assert!(matches!(
            engine.receive_stream(),
            Err(Error::InvalidState { .. })
        ));
    }

    #[tokio::test]
    async fn test_heartbeat_timeout_closes() {
        let http = MockHttpClient::new();
        http.push_get(handshake_body("abc", &[], 50, 50, 1_000_000));

        let engine = engine(&http, "http://localhost:3000", polling_only);
        engine.connect().await.expect("connect");
        let mut stream = engine.receive_stream().expect("stream");

        wait_for_state(&engine, ConnectionState::Closed).await;

        assert!(matches!(
            stream.next_packet().await,
            Some(Err(Error::HeartbeatTimeout { timeout_ms: 100 }))
        ));
        assert!(stream.next_packet().await.is_none());
        assert!(http.posted(b"1"));
    }

    #[tokio::test]
    async fn test_server_close_ends_session() {
        let http = MockHttpClient::new();
        http.push_get(handshake_body("abc", &[], 25_000, 20_000, 1_000_000));
        http.push_get(b"4bye\x1e1".to_vec());

        let engine = engine(&http, "http://localhost:3000", polling_only);
        engine.connect().await.expect("connect");
        let mut stream = engine.receive_stream().expect("stream");

        let packet = stream.next_packet().await.expect("item").expect("packet");
        assert_eq!(packet.as_text(), Some("bye"));
        assert!(stream.next_packet().await.is_none());

        wait_for_state(&engine, ConnectionState::Closed).await;
        assert!(!http.posted(b"1"));
    }

    #[tokio::test]
    async fn test_transport_error_ends_stream() {
        let http = MockHttpClient::new();
        http.push_get(handshake_body("abc", &[], 25_000, 20_000, 1_000_000));
        http.push_get_error("connection reset");

        let engine = engine(&http, "http://localhost:3000", polling_only);
        engine.connect().await.expect("connect");
        let mut stream = engine.receive_stream().expect("stream");

        assert!(matches!(
            stream.next_packet().await,
            Some(Err(Error::TransportIo { .. }))
        ));
        assert!(stream.next_packet().await.is_none());

        wait_for_state(&engine, ConnectionState::Closed).await;
        assert!(engine.last_error().is_some());
    }

    #[tokio::test]
    async fn test_disconnect_and_reconnect() {
        let http = MockHttpClient::new();
        http.push_get(handshake_body("one", &[], 25_000, 20_000, 1_000_000));

        let engine = engine(&http, "http://localhost:3000", polling_only);
        engine.connect().await.expect("connect");
        let mut stream = engine.receive_stream().expect("stream");

        engine.disconnect().await.expect("disconnect");
        assert_eq!(engine.state(), ConnectionState::Closed);
        assert!(http.posted(b"1"));
        assert!(stream.next_packet().await.is_none());
        assert!(matches!(
            engine.send_text("late").await,
            Err(Error::NotConnected)
        ));

        engine.disconnect().await.expect("idempotent");

        http.push_get(handshake_body("two", &[], 25_000, 20_000, 1_000_000));
        engine.connect().await.expect("reconnect");
        assert_eq!(engine.handshake().expect("handshake").session_id, "two");
        assert!(engine.receive_stream().is_ok());
    }

    #[tokio::test]
    async fn test_upgrade_probe_failure_keeps_polling() {
        let (base, server) = probe_server("4nope").await;
        let http = MockHttpClient::new();
        http.push_get(handshake_body("abc", &["websocket"], 25_000, 20_000, 1_000_000));

        let engine = engine(&http, base.as_str(), defaults);
        engine.connect().await.expect("connect");

        assert_eq!(
            engine.state(),
            ConnectionState::Connected(TransportName::Polling)
        );
        engine.send_text("still here").await.expect("send");
        assert!(http.posted(b"4still here"));

        let received = server.await.expect("server");
        assert_eq!(received, vec!["2probe".to_string()]);
    }

    #[tokio::test]
    async fn test_upgrade_to_websocket() {
        let (base, server) = spawn_ws_server(|mut ws| async move {
            let mut received = Vec::new();

            if let Some(Ok(Message::Text(text))) = ws.next().await {
                received.push(text.as_str().to_string());
            }
            ws.send(Message::Text("3probe".into())).await.expect("pong");

            if let Some(Ok(Message::Text(text))) = ws.next().await {
                received.push(text.as_str().to_string());
            }
            ws.send(Message::Text("4hi".into())).await.expect("message");

            while let Some(Ok(message)) = ws.next().await {
                match message {
                    Message::Text(text) => received.push(text.as_str().to_string()),
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            received
        })
        .await;

        let http = MockHttpClient::new();
        http.push_get(handshake_body("abc", &["websocket"], 25_000, 20_000, 1_000_000));

        let engine = engine(&http, base.as_str(), defaults);
        engine.connect().await.expect("connect");
        assert_eq!(
            engine.state(),
            ConnectionState::Connected(TransportName::WebSocket)
        );

        let mut stream = engine.receive_stream().expect("stream");
        let packet = stream.next_packet().await.expect("item").expect("packet");
        assert_eq!(packet.as_text(), Some("hi"));

        engine.send_text("yo").await.expect("send");
        engine.disconnect().await.expect("disconnect");

        let received = server.await.expect("server");
        assert_eq!(received, vec!["2probe", "5", "4yo", "1"]);
        assert_eq!(http.post_calls(), 0);
    }

    #[tokio::test]
    async fn test_manual_upgrade_lets_pending_poll_finish() {
        let (base, server) = probe_server("3probe").await;
        let http = MockHttpClient::new();
        http.push_get(handshake_body("abc", &["websocket"], 25_000, 20_000, 1_000_000));
        let gate = http.push_gated_get(b"4late".to_vec());

        let engine = engine(&http, base.as_str(), polling_only);
        engine.connect().await.expect("connect");
        assert_eq!(engine.transport_name(), Some(TransportName::Polling));
        let mut stream = engine.receive_stream().expect("stream");
        wait_until(|| http.get_calls() == 2).await;

        let upgrading = tokio::spawn({
            let engine = engine.clone();
            async move { engine.upgrade().await }
        });
        wait_for_state(&engine, ConnectionState::Upgrading).await;

        gate.notify_one();
        upgrading.await.expect("task").expect("upgrade");
        assert_eq!(engine.transport_name(), Some(TransportName::WebSocket));

        let packet = stream.next_packet().await.expect("item").expect("packet");
        assert_eq!(packet.as_text(), Some("late"));
        assert_eq!(http.completed_gets(), 2);
        assert_eq!(http.get_calls(), 2);

        engine.disconnect().await.expect("disconnect");
        let received = server.await.expect("server");
        assert_eq!(received, vec!["2probe", "5", "1"]);
    }

    #[tokio::test]
    async fn test_manual_upgrade_failure_resumes_polling() {
        let (base, server) = probe_server("4nope").await;
        let http = MockHttpClient::new();
        http.push_get(handshake_body("abc", &["websocket"], 25_000, 20_000, 1_000_000));
        let gate = http.push_gated_get(b"4after".to_vec());

        let engine = engine(&http, base.as_str(), polling_only);
        engine.connect().await.expect("connect");
        let mut stream = engine.receive_stream().expect("stream");
        wait_until(|| http.get_calls() == 2).await;

        let result = engine.upgrade().await;
        assert!(matches!(result, Err(Error::InvalidPacket { .. })));
        assert_eq!(
            engine.state(),
            ConnectionState::Connected(TransportName::Polling)
        );

        gate.notify_one();
        let packet = stream.next_packet().await.expect("item").expect("packet");
        assert_eq!(packet.as_text(), Some("after"));
        wait_until(|| http.get_calls() == 3).await;
        assert_eq!(http.completed_gets(), 2);

        let received = server.await.expect("server");
        assert_eq!(received, vec!["2probe".to_string()]);
    }

    #[tokio::test]
    async fn test_stalled_socket_open_keeps_polling() {
        let (base, _server) = spawn_silent_server().await;
        let http = MockHttpClient::new();
        http.push_get(handshake_body("abc", &["websocket"], 25_000, 20_000, 1_000_000));

        let engine = engine(&http, base.as_str(), |b| {
            b.request_timeout(Duration::from_millis(200))
        });
        tokio::time::timeout(Duration::from_secs(5), engine.connect())
            .await
            .expect("connect must not hang")
            .expect("connect");

        assert_eq!(
            engine.state(),
            ConnectionState::Connected(TransportName::Polling)
        );
        assert!(
            engine
                .last_error()
                .is_some_and(|e| e.contains("websocket handshake"))
        );

        engine.send_text("still here").await.expect("send");
        assert!(http.posted(b"4still here"));
    }

    #[tokio::test]
    async fn test_text_send_rejects_non_utf8() {
        let http = MockHttpClient::new();
        http.push_get(handshake_body("abc", &[], 25_000, 20_000, 1_000_000));

        let engine = engine(&http, "http://localhost:3000", polling_only);
        engine.connect().await.expect("connect");

        let result = engine.send(vec![0xFFu8, 0xFE], false).await;
        assert!(matches!(result, Err(Error::InvalidPacket { .. })));
        assert_eq!(http.post_calls(), 0);

        engine.send(vec![0xFFu8, 0xFE], true).await.expect("binary");
        assert_eq!(http.post_calls(), 1);
    }

    #[tokio::test]
    async fn test_malformed_handshake_not_retried() {
        let http = MockHttpClient::new();
        http.push_get(b"4Hello".to_vec());
        http.push_get(handshake_body("abc", &[], 25_000, 20_000, 1_000_000));

        let engine = engine(&http, "http://localhost:3000", polling_only);
        let result = engine.connect().await;

        assert!(matches!(result, Err(Error::InvalidPacket { .. })));
        assert_eq!(http.get_calls(), 1);
        assert_eq!(engine.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_upgrade_not_offered() {
        let http = MockHttpClient::new();
        http.push_get(handshake_body("abc", &[], 25_000, 20_000, 1_000_000));

        let engine = engine(&http, "http://localhost:3000", polling_only);
        assert!(matches!(engine.upgrade().await, Err(Error::NotConnected)));

        engine.connect().await.expect("connect");
        assert!(matches!(
            engine.upgrade().await,
            Err(Error::InvalidState { .. })
        ));
        assert_eq!(
            engine.state(),
            ConnectionState::Connected(TransportName::Polling)
        );
    }
}

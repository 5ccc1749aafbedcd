//! WebSocket transport.
//!
//! One frame carries one packet. Text frames use the plain-text encoding;
//! binary packets travel as native binary frames without a marker.
//!
//! The transport becomes usable only after the upgrade probe succeeds
//! (see [`super::upgrade`]).

// ============================================================================
// Imports
// ============================================================================

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::protocol::{HandshakeInfo, Packet, PacketFormat, PacketType, codec};

use super::{Transport, TransportName, request_path, upgrade};

// ============================================================================
// Constants
// ============================================================================

/// Default bound on the WebSocket opening handshake.
pub const OPEN_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// Types
// ============================================================================

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWriter = SplitSink<WsStream, Message>;
type WsReader = SplitStream<WsStream>;

// ============================================================================
// SocketTransport
// ============================================================================

/// WebSocket transport for an existing session.
pub struct SocketTransport {
    /// Target `ws://` or `wss://` URI including `sid`.
    uri: Url,
    /// Session the socket joins.
    session_id: String,
    /// Negotiated maximum packet size.
    max_payload: u64,
    /// Bound on the opening handshake.
    open_timeout: Duration,
    /// Write half, one outstanding frame at a time.
    writer: tokio::sync::Mutex<Option<WsWriter>>,
    /// Read half, one outstanding read at a time.
    reader: tokio::sync::Mutex<Option<WsReader>>,
    /// Set when the socket was closed by either side.
    closed: AtomicBool,
}

impl std::fmt::Debug for SocketTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketTransport")
            .field("uri", &self.uri.as_str())
            .field("session_id", &self.session_id)
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl SocketTransport {
    /// Creates an unconnected socket transport for a handshaken session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `base` is not an `http`/`https` address.
    pub fn new(base: &Url, path_prefix: &str, handshake: &HandshakeInfo) -> Result<Self> {
        let uri = socket_uri(base, path_prefix, &handshake.session_id)?;

        Ok(Self {
            uri,
            session_id: handshake.session_id.clone(),
            max_payload: handshake.max_payload_bytes,
            open_timeout: OPEN_TIMEOUT,
            writer: tokio::sync::Mutex::new(None),
            reader: tokio::sync::Mutex::new(None),
            closed: AtomicBool::new(false),
        })
    }

    /// Sets the bound on the opening handshake.
    #[must_use]
    pub fn with_open_timeout(mut self, open_timeout: Duration) -> Self {
        self.open_timeout = open_timeout;
        self
    }

    /// Returns the socket URI.
    #[inline]
    #[must_use]
    pub fn uri(&self) -> &Url {
        &self.uri
    }

    /// Returns `true` once the socket was closed.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    async fn close_socket(&self) {
        self.closed.store(true, Ordering::Release);
        if let Some(mut writer) = self.writer.lock().await.take()
            && let Err(e) = writer.close().await
        {
            debug!(error = %e, "WebSocket close failed");
        }
    }
}

#[async_trait]
impl Transport for SocketTransport {
    fn name(&self) -> TransportName {
        TransportName::WebSocket
    }

    async fn connect(&self) -> Result<()> {
        debug!(uri = %self.uri, timeout = ?self.open_timeout, "Opening WebSocket");
        let opened = timeout(
            self.open_timeout,
            tokio_tungstenite::connect_async(self.uri.as_str()),
        )
        .await;

        let (stream, _response) = match opened {
            Ok(result) => result?,
            Err(_) => {
                self.closed.store(true, Ordering::Release);
                return Err(Error::transport_io(format!(
                    "websocket handshake not completed within {}ms",
                    self.open_timeout.as_millis()
                )));
            }
        };
        let (writer, reader) = stream.split();

        *self.writer.lock().await = Some(writer);
        *self.reader.lock().await = Some(reader);
        self.closed.store(false, Ordering::Release);

        if let Err(e) = upgrade::probe(self).await {
            self.close_socket().await;
            return Err(e);
        }

        debug!(sid = %self.session_id, "WebSocket upgrade completed");
        Ok(())
    }

    async fn receive_batch(&self) -> Result<Vec<Packet>> {
        let mut guard = self.reader.lock().await;
        let reader = guard.as_mut().ok_or(Error::ConnectionClosed)?;

        loop {
            match reader.next().await {
                Some(Ok(Message::Text(text))) => {
                    let packet = codec::decode_one(text.as_bytes())?;
                    trace!(packet_type = %packet.packet_type(), "Received text frame");
                    return Ok(vec![packet]);
                }

                Some(Ok(Message::Binary(data))) => {
                    trace!(len = data.len(), "Received binary frame");
                    return Ok(vec![Packet::binary(data.to_vec())]);
                }

                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "WebSocket closed by remote");
                    self.closed.store(true, Ordering::Release);
                    return Ok(vec![Packet::control(PacketType::Close)]);
                }

                Some(Err(e)) => {
                    self.closed.store(true, Ordering::Release);
                    return Err(e.into());
                }

                None => {
                    self.closed.store(true, Ordering::Release);
                    return Err(Error::ConnectionClosed);
                }

                // Protocol-level Ping/Pong frames are answered by tungstenite
                _ => {}
            }
        }
    }

    async fn send(&self, packet: Packet) -> Result<()> {
        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }

        let message = match packet.format() {
            PacketFormat::PlainText => {
                let encoded = codec::encode(&packet);
                if encoded.len() as u64 > self.max_payload {
                    return Err(Error::payload_too_large(encoded.len(), self.max_payload));
                }
                let text = String::from_utf8(encoded)
                    .map_err(|_| Error::invalid_packet("text packet body is not UTF-8"))?;
                Message::Text(text.into())
            }
            PacketFormat::Binary => {
                if packet.len() as u64 > self.max_payload {
                    return Err(Error::payload_too_large(packet.len(), self.max_payload));
                }
                Message::Binary(packet.body().to_vec().into())
            }
        };

        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(Error::ConnectionClosed)?;
        writer.send(message).await?;

        trace!(packet_type = %packet.packet_type(), "Frame sent");
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        if self.is_closed() {
            return Ok(());
        }

        if let Err(e) = self.send(Packet::control(PacketType::Close)).await {
            warn!(error = %e, "Failed to send close packet");
        }
        self.close_socket().await;

        debug!(sid = %self.session_id, "WebSocket transport closed");
        Ok(())
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Derives the socket URI from the HTTP base address.
///
/// `http` becomes `ws` and `https` becomes `wss`.
///
/// # Errors
///
/// Returns [`Error::Config`] for any other scheme.
pub fn socket_uri(base: &Url, path_prefix: &str, session_id: &str) -> Result<Url> {
    let scheme = match base.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(Error::config(format!("unsupported scheme: {other}"))),
    };

    let mut uri = base.clone();
    uri.set_scheme(scheme)
        .map_err(|()| Error::config(format!("cannot use {scheme} for {base}")))?;

    let path = request_path(path_prefix, TransportName::WebSocket, Some(session_id));
    Ok(uri.join(&path)?)
}

// ============================================================================
// Tests
// ============================================================================

//! HTTP long-polling transport.
//!
//! Every receive is a `GET` that the server holds open until it has
//! packets to deliver; every send is a `POST` of one encoded packet.
//!
//! # Request Flow
//!
//! 1. `GET {path}` without `sid` returns the Open packet (handshake)
//! 2. `sid` is appended to the path
//! 3. `GET {path}&sid=..` returns batches joined by `0x1E`
//! 4. `POST {path}&sid=..` sends a packet

// ============================================================================
// Imports
// ============================================================================

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::Deserialize;
use tracing::{debug, trace, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::protocol::{HandshakeInfo, Packet, PacketFormat, PacketType, codec};

use super::http::{CONTENT_TYPE_BINARY, CONTENT_TYPE_TEXT, HttpClient, HttpResponse};
use super::{Transport, TransportName, append_session_id, request_path};

// ============================================================================
// BadRequestBody
// ============================================================================

/// Structured error body returned with a non-success status.
#[derive(Debug, Deserialize)]
struct BadRequestBody {
    code: i64,
    message: String,
}

// ============================================================================
// PollingTransport
// ============================================================================

/// HTTP long-polling transport.
///
/// `GET` and `POST` are guarded separately so a pending long-poll does
/// not hold up outgoing packets.
pub struct PollingTransport<H> {
    /// HTTP client.
    http: H,
    /// Server base address.
    base: Url,
    /// Request path and query, `sid` appended after the handshake.
    path: RwLock<String>,
    /// Session parameters once the handshake completed.
    handshake: RwLock<Option<HandshakeInfo>>,
    /// Packets that arrived in the handshake response after the Open packet.
    pending: Mutex<Vec<Packet>>,
    /// Serializes `GET` requests.
    receive_guard: tokio::sync::Mutex<()>,
    /// Serializes `POST` requests.
    send_guard: tokio::sync::Mutex<()>,
    /// Set once `disconnect` ran.
    closed: AtomicBool,
}

impl<H> std::fmt::Debug for PollingTransport<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollingTransport")
            .field("base", &self.base.as_str())
            .field("path", &*self.path.read())
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl<H: HttpClient> PollingTransport<H> {
    /// Creates an unconnected polling transport.
    #[must_use]
    pub fn new(http: H, base: Url, path_prefix: &str) -> Self {
        Self {
            http,
            base,
            path: RwLock::new(request_path(path_prefix, TransportName::Polling, None)),
            handshake: RwLock::new(None),
            pending: Mutex::new(Vec::new()),
            receive_guard: tokio::sync::Mutex::new(()),
            send_guard: tokio::sync::Mutex::new(()),
            closed: AtomicBool::new(false),
        }
    }

    /// Returns the current request path and query.
    #[must_use]
    pub fn path(&self) -> String {
        self.path.read().clone()
    }

    /// Returns the session parameters, if the handshake completed.
    #[must_use]
    pub fn handshake(&self) -> Option<HandshakeInfo> {
        self.handshake.read().clone()
    }

    /// Returns `true` once the handshake completed.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.handshake.read().is_some()
    }

    /// Takes the packets that followed the Open packet in the handshake
    /// response.
    pub fn take_pending(&self) -> Vec<Packet> {
        std::mem::take(&mut *self.pending.lock())
    }

    fn request_url(&self) -> Result<Url> {
        Ok(self.base.join(&self.path.read())?)
    }

    fn max_payload(&self) -> Result<u64> {
        self.handshake
            .read()
            .as_ref()
            .map(|h| h.max_payload_bytes)
            .ok_or(Error::NotConnected)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::ConnectionClosed);
        }
        Ok(())
    }

    async fn get(&self) -> Result<Vec<u8>> {
        let url = self.request_url()?;
        let _guard = self.receive_guard.lock().await;
        trace!(%url, "GET");
        let response = self.http.get(url).await?;
        check_status(response)
    }
}

#[async_trait]
impl<H: HttpClient> Transport for PollingTransport<H> {
    fn name(&self) -> TransportName {
        TransportName::Polling
    }

    async fn connect(&self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }
        self.ensure_open()?;

        let body = self.get().await?;
        let mut packets = codec::decode_batch(&body)?.into_iter();
        let open = packets
            .next()
            .ok_or_else(|| Error::invalid_packet("empty handshake response"))?;
        let handshake = HandshakeInfo::from_packet(&open)?;

        append_session_id(&mut self.path.write(), &handshake.session_id);
        self.pending.lock().extend(packets);

        debug!(
            sid = %handshake.session_id,
            ping_interval = handshake.ping_interval_ms,
            ping_timeout = handshake.ping_timeout_ms,
            max_payload = handshake.max_payload_bytes,
            upgrades = ?handshake.supported_upgrades,
            "Handshake completed"
        );

        *self.handshake.write() = Some(handshake);
        Ok(())
    }

    async fn receive_batch(&self) -> Result<Vec<Packet>> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        self.ensure_open()?;

        let pending = self.take_pending();
        if !pending.is_empty() {
            return Ok(pending);
        }

        let body = self.get().await?;
        let packets = codec::decode_batch(&body)?;
        trace!(count = packets.len(), "Received batch");
        Ok(packets)
    }

    async fn send(&self, packet: Packet) -> Result<()> {
        let max = self.max_payload()?;
        self.ensure_open()?;

        let encoded = codec::encode(&packet);
        if encoded.len() as u64 > max {
            return Err(Error::payload_too_large(encoded.len(), max));
        }

        let content_type = match packet.format() {
            PacketFormat::PlainText => CONTENT_TYPE_TEXT,
            PacketFormat::Binary => CONTENT_TYPE_BINARY,
        };

        let url = self.request_url()?;
        let _guard = self.send_guard.lock().await;
        let response = self.http.post(url, content_type, encoded).await?;
        check_status(response)?;

        trace!(packet_type = %packet.packet_type(), len = packet.len(), "Packet sent");
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) || !self.is_connected() {
            self.closed.store(true, Ordering::Release);
            return Ok(());
        }

        if let Err(e) = self.send(Packet::control(PacketType::Close)).await {
            warn!(error = %e, "Failed to send close packet");
        }

        self.closed.store(true, Ordering::Release);
        debug!("Polling transport closed");
        Ok(())
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Maps a non-success response to an error.
fn check_status(response: HttpResponse) -> Result<Vec<u8>> {
    if response.is_success() {
        return Ok(response.body);
    }

    match serde_json::from_slice::<BadRequestBody>(&response.body) {
        Ok(body) => Err(Error::bad_request(body.code, body.message)),
        Err(_) => Err(Error::http_status(response.status)),
    }
}

// ============================================================================
// Tests
// ============================================================================

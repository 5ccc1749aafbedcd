//! Transport upgrade probe.
//!
//! Run on a freshly opened candidate transport before any traffic is
//! routed through it:
//!
//! 1. Client sends `2probe` (Ping with `probe` body)
//! 2. Server answers `3probe` (Pong)
//! 3. Client sends `5` (Upgrade)
//!
//! A failure at any step leaves the previous transport in charge.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::protocol::{PROBE, Packet, PacketType};

use super::Transport;

// ============================================================================
// Constants
// ============================================================================

/// Maximum wait for the pong probe.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// Probe
// ============================================================================

/// Runs the ping/pong/upgrade exchange on `transport`.
///
/// # Errors
///
/// - [`Error::InvalidPacket`] if the reply is not a Pong
/// - [`Error::TransportIo`] if no reply arrives within [`PROBE_TIMEOUT`]
/// - any send or receive error of the transport
pub async fn probe<T: Transport + ?Sized>(transport: &T) -> Result<()> {
    debug!(transport = %transport.name(), "Sending ping probe");
    transport.send(Packet::ping_probe()).await?;

    let batch = timeout(PROBE_TIMEOUT, transport.receive_batch())
        .await
        .map_err(|_| {
            Error::transport_io(format!(
                "no probe reply within {}ms",
                PROBE_TIMEOUT.as_millis()
            ))
        })??;

    let reply = batch
        .first()
        .ok_or_else(|| Error::invalid_packet("empty probe reply"))?;

    if reply.packet_type() != PacketType::Pong {
        return Err(Error::invalid_packet(format!(
            "expected pong probe, got {}",
            reply.packet_type()
        )));
    }

    if reply.body() != PROBE {
        warn!(body = ?reply.as_text(), "Pong probe without probe body");
    }

    transport.send(Packet::control(PacketType::Upgrade)).await?;
    debug!(transport = %transport.name(), "Upgrade packet sent");
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

//! Handshake payload carried by the Open packet.
//!
//! # Format
//!
//! ```json
//! {
//!   "sid": "lv_VI97HAXpY6yYWAAAC",
//!   "upgrades": ["websocket"],
//!   "pingInterval": 25000,
//!   "pingTimeout": 20000,
//!   "maxPayload": 1000000
//! }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::packet::{Packet, PacketType};

// ============================================================================
// HandshakeInfo
// ============================================================================

/// Session parameters negotiated by the handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeInfo {
    /// Server-assigned session id.
    #[serde(rename = "sid")]
    pub session_id: String,

    /// Transports the session may upgrade to.
    #[serde(rename = "upgrades", default)]
    pub supported_upgrades: Vec<String>,

    /// Server ping period in milliseconds.
    #[serde(rename = "pingInterval")]
    pub ping_interval_ms: u64,

    /// Grace period for a ping in milliseconds.
    #[serde(rename = "pingTimeout")]
    pub ping_timeout_ms: u64,

    /// Maximum encoded packet size in bytes.
    #[serde(rename = "maxPayload")]
    pub max_payload_bytes: u64,
}

impl HandshakeInfo {
    /// Parses the handshake from the first packet of a fresh transport.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPacket`] if the packet is not `Open` or its
    /// body is not a valid handshake object.
    pub fn from_packet(packet: &Packet) -> Result<Self> {
        if packet.packet_type() != PacketType::Open || packet.is_binary() {
            return Err(Error::invalid_packet(format!(
                "expected open packet, got {}",
                packet.packet_type()
            )));
        }

        serde_json::from_slice(packet.body())
            .map_err(|e| Error::invalid_packet(format!("invalid handshake body: {e}")))
    }

    /// Returns `true` if the server offers the named transport.
    #[inline]
    #[must_use]
    pub fn supports_upgrade(&self, transport: &str) -> bool {
        self.supported_upgrades.iter().any(|u| u == transport)
    }

    /// Server ping period.
    #[inline]
    #[must_use]
    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    /// Server ping grace period.
    #[inline]
    #[must_use]
    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }

    /// Window within which a ping must arrive: `pingInterval + pingTimeout`.
    #[inline]
    #[must_use]
    pub fn heartbeat_window(&self) -> Duration {
        self.ping_interval() + self.ping_timeout()
    }
}

// ============================================================================
// Tests
// ============================================================================

//! Connection state machine.
//!
//! ```text
//! Idle ──connect──► Handshaking ──ok──► Connected(polling) ──upgrade ok──► Connected(websocket)
//!                        ▲  │                  │      ▲                         │
//!                        └──┘ retry            │      └── upgrade failed ──┐    │
//!                                              ▼                           │    ▼
//!                                          Upgrading ──────────────────────┘  Closing ──► Closed
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use crate::transport::TransportName;

// ============================================================================
// ConnectionState
// ============================================================================

/// Lifecycle state of an [`crate::Engine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Not yet connected.
    #[default]
    Idle,
    /// Handshake in progress.
    Handshaking,
    /// Session established on the given transport.
    Connected(TransportName),
    /// Probing a candidate transport; traffic still uses polling.
    Upgrading,
    /// Tearing down.
    Closing,
    /// Session ended.
    Closed,
}

impl ConnectionState {
    /// Returns `true` while packets can be sent.
    #[inline]
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected(_) | Self::Upgrading)
    }

    /// Returns `true` if `connect` may be called.
    #[inline]
    #[must_use]
    pub const fn can_connect(self) -> bool {
        matches!(self, Self::Idle | Self::Closed)
    }

    /// Returns the active transport, if connected.
    #[inline]
    #[must_use]
    pub const fn transport(self) -> Option<TransportName> {
        match self {
            Self::Connected(name) => Some(name),
            Self::Upgrading => Some(TransportName::Polling),
            _ => None,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Handshaking => f.write_str("handshaking"),
            Self::Connected(name) => write!(f, "connected({name})"),
            Self::Upgrading => f.write_str("upgrading"),
            Self::Closing => f.write_str("closing"),
            Self::Closed => f.write_str("closed"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

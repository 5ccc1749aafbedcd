//! Engine.IO transports.
//!
//! Both transports implement [`Transport`] and are selected by the engine;
//! they share no base implementation.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐    GET  /engine.io?EIO=4&transport=polling&sid=..   ┌──────────┐
//! │ PollingTransport│◄───────────────────────────────────────────────────►│          │
//! │                 │    POST /engine.io?EIO=4&transport=polling&sid=..   │  Server  │
//! └─────────────────┘                                                     │          │
//! ┌─────────────────┐    ws:// /engine.io?EIO=4&transport=websocket&sid=..│          │
//! │ SocketTransport │◄───────────────────────────────────────────────────►│          │
//! └─────────────────┘                                                     └──────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `http` | HTTP client abstraction used by long-polling |
//! | `polling` | HTTP long-polling transport |
//! | `upgrade` | Probe protocol run on a candidate transport |
//! | `websocket` | WebSocket transport |

// ============================================================================
// Submodules
// ============================================================================

/// HTTP client abstraction.
pub mod http;

/// HTTP long-polling transport.
pub mod polling;

/// Transport upgrade probe.
pub mod upgrade;

/// WebSocket transport.
pub mod websocket;

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use async_trait::async_trait;

use crate::error::Result;
use crate::protocol::{PROTOCOL_VERSION, Packet};

// ============================================================================
// Re-exports
// ============================================================================

pub use http::{HttpClient, HttpResponse, ReqwestHttpClient};
pub use polling::PollingTransport;
pub use websocket::SocketTransport;

// ============================================================================
// Constants
// ============================================================================

/// Default request path prefix.
pub const DEFAULT_PATH: &str = "/engine.io";

// ============================================================================
// TransportName
// ============================================================================

/// Identifies a transport variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportName {
    /// HTTP long-polling.
    Polling,
    /// WebSocket.
    WebSocket,
}

impl TransportName {
    /// Returns the `transport` query parameter value.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Polling => "polling",
            Self::WebSocket => "websocket",
        }
    }
}

impl fmt::Display for TransportName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Transport
// ============================================================================

/// Capability set shared by all transports.
///
/// Implementations guard each direction independently: one outstanding
/// send and one outstanding receive at a time, which may overlap.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Returns the transport variant.
    fn name(&self) -> TransportName;

    /// Opens the transport and runs its opening protocol.
    async fn connect(&self) -> Result<()>;

    /// Receives the next batch of packets, in wire order.
    async fn receive_batch(&self) -> Result<Vec<Packet>>;

    /// Sends a single packet.
    async fn send(&self, packet: Packet) -> Result<()>;

    /// Closes the transport and releases its resources.
    async fn disconnect(&self) -> Result<()>;
}

// ============================================================================
// Request Paths
// ============================================================================

/// Builds the request path and query for a transport.
///
/// Format: `{prefix}?EIO=4&transport={name}[&sid={sid}]`
#[must_use]
pub fn request_path(prefix: &str, transport: TransportName, session_id: Option<&str>) -> String {
    let prefix = prefix.trim_end_matches('/');
    let mut path = if prefix.starts_with('/') {
        format!("{prefix}?EIO={PROTOCOL_VERSION}&transport={transport}")
    } else {
        format!("/{prefix}?EIO={PROTOCOL_VERSION}&transport={transport}")
    };

    if let Some(sid) = session_id {
        append_session_id(&mut path, sid);
    }

    path
}

/// Appends the `sid` query parameter.
pub(crate) fn append_session_id(path: &mut String, session_id: &str) {
    path.push_str("&sid=");
    path.push_str(&urlencoding::encode(session_id));
}

// ============================================================================
// Tests
// ============================================================================

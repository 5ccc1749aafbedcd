//! Error types for the Engine.IO client.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use engineio_client::{Engine, Result};
//!
//! async fn example(engine: &Engine) -> Result<()> {
//!     engine.send_text("hello").await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Wire data | [`Error::InvalidPacket`] |
//! | Connection | [`Error::ConnectionClosed`], [`Error::NotConnected`] |
//! | Transport I/O | [`Error::TransportIo`], [`Error::BadRequest`], [`Error::HttpStatus`], [`Error::HeartbeatTimeout`] |
//! | Local precondition | [`Error::PayloadTooLarge`], [`Error::InvalidState`], [`Error::Config`] |
//! | External | [`Error::Json`], [`Error::WebSocket`], [`Error::Http`], [`Error::Url`] |

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Wire Errors
    // ========================================================================
    /// Malformed or unparseable wire data.
    ///
    /// Returned for an unknown leading byte, an unparseable handshake body,
    /// or a packet of the wrong type where a specific one was required.
    #[error("Invalid packet: {message}")]
    InvalidPacket {
        /// Description of what was wrong with the packet.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Operation attempted on a closed or aborted transport.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Operation requires an established session.
    #[error("Not connected")]
    NotConnected,

    // ========================================================================
    // Transport I/O Errors
    // ========================================================================
    /// Underlying network failure.
    #[error("Transport error: {message}")]
    TransportIo {
        /// Description of the failure.
        message: String,
    },

    /// Server rejected a request with a structured error body.
    ///
    /// Body format: `{"code": 1, "message": "Session ID unknown"}`.
    #[error("Bad request ({code}): {message}")]
    BadRequest {
        /// Engine.IO error code.
        code: i64,
        /// Server supplied message.
        message: String,
    },

    /// Server answered with a non-success status and no structured body.
    #[error("Unexpected HTTP status {status}")]
    HttpStatus {
        /// HTTP status code.
        status: u16,
    },

    /// No ping observed within `pingInterval + pingTimeout`.
    #[error("Heartbeat timeout after {timeout_ms}ms")]
    HeartbeatTimeout {
        /// Milliseconds waited without a ping.
        timeout_ms: u64,
    },

    // ========================================================================
    // Local Precondition Errors
    // ========================================================================
    /// Encoded packet exceeds the negotiated `maxPayload`.
    #[error("Payload too large: {size} bytes exceeds maximum of {max}")]
    PayloadTooLarge {
        /// Encoded packet length.
        size: usize,
        /// Negotiated maximum.
        max: u64,
    },

    /// Operation is not valid in the current engine state.
    #[error("Invalid state: {message}")]
    InvalidState {
        /// Description of the violated precondition.
        message: String,
    },

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// HTTP client error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// URL parse error.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates an invalid packet error.
    #[inline]
    pub fn invalid_packet(message: impl Into<String>) -> Self {
        Self::InvalidPacket {
            message: message.into(),
        }
    }

    /// Creates a transport I/O error.
    #[inline]
    pub fn transport_io(message: impl Into<String>) -> Self {
        Self::TransportIo {
            message: message.into(),
        }
    }

    /// Creates a bad request error.
    #[inline]
    pub fn bad_request(code: i64, message: impl Into<String>) -> Self {
        Self::BadRequest {
            code,
            message: message.into(),
        }
    }

    /// Creates an HTTP status error.
    #[inline]
    pub fn http_status(status: u16) -> Self {
        Self::HttpStatus { status }
    }

    /// Creates a heartbeat timeout error.
    #[inline]
    pub fn heartbeat_timeout(timeout_ms: u64) -> Self {
        Self::HeartbeatTimeout { timeout_ms }
    }

    /// Creates a payload too large error.
    #[inline]
    pub fn payload_too_large(size: usize, max: u64) -> Self {
        Self::PayloadTooLarge { size, max }
    }

    /// Creates an invalid state error.
    #[inline]
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this error came from malformed wire data.
    #[inline]
    #[must_use]
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, Self::InvalidPacket { .. })
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::ConnectionClosed
                | Self::NotConnected
                | Self::TransportIo { .. }
                | Self::HeartbeatTimeout { .. }
                | Self::WebSocket(_)
                | Self::Http(_)
        )
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors are network-level failures that may succeed
    /// on a fresh handshake. `Engine::connect` retries only these.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::TransportIo { .. }
                | Self::BadRequest { .. }
                | Self::HttpStatus { .. }
                | Self::HeartbeatTimeout { .. }
                | Self::WebSocket(_)
                | Self::Http(_)
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

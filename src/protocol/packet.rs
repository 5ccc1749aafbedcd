//! Packet value types.
//!
//! A [`Packet`] is the unit of the Engine.IO wire protocol: a type byte
//! followed by an opaque body. Binary packets carry no type of their own
//! and are always messages.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

// ============================================================================
// Constants
// ============================================================================

/// Leading byte marking a Base64 binary packet on a text-only channel.
pub const BINARY_MARKER: u8 = b'b';

/// Body of the ping/pong packets exchanged during the upgrade probe.
pub const PROBE: &[u8] = b"probe";

// ============================================================================
// PacketType
// ============================================================================

/// Engine.IO packet type, encoded as a single ASCII digit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    /// Sent by the server when a new transport is opened.
    Open,
    /// Request to close the transport.
    Close,
    /// Heartbeat request.
    Ping,
    /// Heartbeat response.
    Pong,
    /// Application payload.
    Message,
    /// Confirms a transport upgrade.
    Upgrade,
    /// Used to complete a pending poll during upgrade.
    Noop,
}

impl PacketType {
    /// All packet types in wire order.
    pub const ALL: [PacketType; 7] = [
        Self::Open,
        Self::Close,
        Self::Ping,
        Self::Pong,
        Self::Message,
        Self::Upgrade,
        Self::Noop,
    ];

    /// Returns the wire byte for this type (`'0'`..=`'6'`).
    #[inline]
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        match self {
            Self::Open => b'0',
            Self::Close => b'1',
            Self::Ping => b'2',
            Self::Pong => b'3',
            Self::Message => b'4',
            Self::Upgrade => b'5',
            Self::Noop => b'6',
        }
    }

    /// Parses a wire byte, returning `None` outside `'0'..='6'`.
    #[inline]
    #[must_use]
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'0' => Some(Self::Open),
            b'1' => Some(Self::Close),
            b'2' => Some(Self::Ping),
            b'3' => Some(Self::Pong),
            b'4' => Some(Self::Message),
            b'5' => Some(Self::Upgrade),
            b'6' => Some(Self::Noop),
            _ => None,
        }
    }

    /// Returns the lowercase protocol name.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Close => "close",
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::Message => "message",
            Self::Upgrade => "upgrade",
            Self::Noop => "noop",
        }
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// PacketFormat
// ============================================================================

/// Encoding of a packet body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PacketFormat {
    /// UTF-8 text body.
    #[default]
    PlainText,
    /// Raw bytes body.
    Binary,
}

// ============================================================================
// Packet
// ============================================================================

/// An immutable Engine.IO packet.
///
/// The body excludes the leading type or marker byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    format: PacketFormat,
    packet_type: PacketType,
    body: Vec<u8>,
}

impl Packet {
    /// Creates a packet.
    ///
    /// Binary packets are always messages regardless of `packet_type`.
    #[must_use]
    pub fn new(format: PacketFormat, packet_type: PacketType, body: impl Into<Vec<u8>>) -> Self {
        let packet_type = match format {
            PacketFormat::Binary => PacketType::Message,
            PacketFormat::PlainText => packet_type,
        };

        Self {
            format,
            packet_type,
            body: body.into(),
        }
    }

    /// Creates a plain-text packet of the given type.
    #[inline]
    #[must_use]
    pub fn plain(packet_type: PacketType, body: impl Into<Vec<u8>>) -> Self {
        Self::new(PacketFormat::PlainText, packet_type, body)
    }

    /// Creates a plain-text message packet.
    #[inline]
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::plain(PacketType::Message, text.into().into_bytes())
    }

    /// Creates a binary message packet.
    #[inline]
    #[must_use]
    pub fn binary(body: impl Into<Vec<u8>>) -> Self {
        Self::new(PacketFormat::Binary, PacketType::Message, body)
    }

    /// Creates an empty control packet (`Close`, `Pong`, `Upgrade`, ...).
    #[inline]
    #[must_use]
    pub fn control(packet_type: PacketType) -> Self {
        Self::plain(packet_type, Vec::new())
    }

    /// Ping carrying the upgrade probe body.
    #[inline]
    #[must_use]
    pub fn ping_probe() -> Self {
        Self::plain(PacketType::Ping, PROBE)
    }

    /// Returns the body format.
    #[inline]
    #[must_use]
    pub fn format(&self) -> PacketFormat {
        self.format
    }

    /// Returns the packet type.
    #[inline]
    #[must_use]
    pub fn packet_type(&self) -> PacketType {
        self.packet_type
    }

    /// Returns the body bytes.
    #[inline]
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Consumes the packet and returns the body.
    #[inline]
    #[must_use]
    pub fn into_body(self) -> Vec<u8> {
        self.body
    }

    /// Returns the body as UTF-8 text, if it is valid.
    #[inline]
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    /// Returns `true` for binary packets.
    #[inline]
    #[must_use]
    pub fn is_binary(&self) -> bool {
        self.format == PacketFormat::Binary
    }

    /// Wire length: body plus the type byte.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.body.len() + 1
    }

    /// Returns `true` if the body is empty.
    ///
    /// Describes the body only: a control packet such as `Ping` is empty
    /// while its [`len`](Self::len) is still 1.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================

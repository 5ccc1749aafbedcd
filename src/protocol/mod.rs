//! Engine.IO wire protocol.
//!
//! This module defines the packet model, the wire codec and the handshake
//! payload for protocol version 4.
//!
//! # Packet Types
//!
//! | Type | Byte | Direction | Purpose |
//! |------|------|-----------|---------|
//! | `Open` | `0` | Server → Client | Handshake with session parameters |
//! | `Close` | `1` | Both | Close the transport |
//! | `Ping` | `2` | Server → Client (probe: Client → Server) | Heartbeat |
//! | `Pong` | `3` | Client → Server (probe: Server → Client) | Heartbeat reply |
//! | `Message` | `4` | Both | Application data |
//! | `Upgrade` | `5` | Client → Server | Confirm transport switch |
//! | `Noop` | `6` | Server → Client | Flush a pending poll |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `codec` | Encode, decode and batch splitting |
//! | `handshake` | Open packet payload |
//! | `packet` | Packet value types |

// ============================================================================
// Submodules
// ============================================================================

/// Wire encoding and decoding.
pub mod codec;

/// Handshake payload.
pub mod handshake;

/// Packet value types.
pub mod packet;

// ============================================================================
// Constants
// ============================================================================

/// Protocol revision sent as the `EIO` query parameter.
pub const PROTOCOL_VERSION: u8 = 4;

// ============================================================================
// Re-exports
// ============================================================================

pub use codec::{RECORD_SEPARATOR, decode_batch, decode_one, encode, split_batch};
pub use handshake::HandshakeInfo;
pub use packet::{BINARY_MARKER, PROBE, Packet, PacketFormat, PacketType};

//! Wire codec for Engine.IO packets.
//!
//! Encoding and decoding are pure functions. A long-polling response may
//! carry several packets joined by a record separator (`0x1E`), so callers
//! always decode a batch.
//!
//! # Wire Format
//!
//! | Packet | Bytes |
//! |--------|-------|
//! | Plain text | `<type digit><body>` |
//! | Binary (text channel) | `b<base64 body>` |
//! | Batch | `<packet>\x1e<packet>\x1e<packet>` |

// ============================================================================
// Imports
// ============================================================================

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use crate::error::{Error, Result};

use super::packet::{BINARY_MARKER, Packet, PacketFormat, PacketType};

// ============================================================================
// Constants
// ============================================================================

/// Separator between packets in a long-polling payload.
pub const RECORD_SEPARATOR: u8 = 0x1E;

// ============================================================================
// Encoding
// ============================================================================

/// Encodes a packet for a text-only channel.
///
/// Plain-text packets are written as the type byte followed by the body.
/// Binary packets are written as `b` followed by the Base64 body.
#[must_use]
pub fn encode(packet: &Packet) -> Vec<u8> {
    match packet.format() {
        PacketFormat::PlainText => {
            let mut out = Vec::with_capacity(packet.len());
            out.push(packet.packet_type().as_byte());
            out.extend_from_slice(packet.body());
            out
        }
        PacketFormat::Binary => {
            let encoded = STANDARD.encode(packet.body());
            let mut out = Vec::with_capacity(encoded.len() + 1);
            out.push(BINARY_MARKER);
            out.extend_from_slice(encoded.as_bytes());
            out
        }
    }
}

// ============================================================================
// Decoding
// ============================================================================

/// Decodes a single packet.
///
/// # Errors
///
/// Returns [`Error::InvalidPacket`] for empty input, a leading byte outside
/// the type range, or a binary packet with an invalid Base64 body.
pub fn decode_one(bytes: &[u8]) -> Result<Packet> {
    let Some((&lead, rest)) = bytes.split_first() else {
        return Err(Error::invalid_packet("empty packet"));
    };

    if lead == BINARY_MARKER {
        let body = STANDARD
            .decode(rest)
            .map_err(|e| Error::invalid_packet(format!("invalid base64 body: {e}")))?;
        return Ok(Packet::binary(body));
    }

    let packet_type = PacketType::from_byte(lead)
        .ok_or_else(|| Error::invalid_packet(format!("unknown leading byte 0x{lead:02x}")))?;

    Ok(Packet::plain(packet_type, rest))
}

/// Splits a long-polling payload into its packet segments.
///
/// A trailing segment without a terminating separator is included; a
/// payload without separators yields exactly one segment.
#[must_use]
pub fn split_batch(bytes: &[u8]) -> Vec<&[u8]> {
    let mut segments = Vec::new();
    let mut start = 0;

    for (index, &byte) in bytes.iter().enumerate() {
        if byte == RECORD_SEPARATOR {
            segments.push(&bytes[start..index]);
            start = index + 1;
        }
    }

    if start < bytes.len() {
        segments.push(&bytes[start..]);
    }

    segments
}

/// Splits and decodes a long-polling payload, preserving packet order.
///
/// # Errors
///
/// Returns the first segment's decode error.
pub fn decode_batch(bytes: &[u8]) -> Result<Vec<Packet>> {
    split_batch(bytes).into_iter().map(decode_one).collect()
}

// ============================================================================
// Tests
// ============================================================================

//! Engine.IO v4 client.
//!
//! This library implements the client side of the Engine.IO transport
//! protocol: it opens a session over HTTP long-polling, upgrades to a
//! WebSocket when the server offers one, keeps the link alive by
//! answering server pings, and exposes received messages as a stream.
//!
//! # Architecture
//!
//! The client is layered bottom-up:
//!
//! - **Protocol**: packet model, wire codec, handshake parameters
//! - **Transport**: polling and WebSocket implementations of one
//!   [`Transport`] contract, plus the upgrade probe
//! - **Engine**: state machine, poll loop, heartbeat, delivery queue
//!
//! Key design principles:
//!
//! - Each transport allows one outstanding send and one outstanding
//!   receive; the two may overlap
//! - Background tasks only signal the engine; the engine alone changes state
//! - Each transport generation runs under its own cancellation scope
//! - Pong replies are spawned and their failures recorded
//!
//! # Quick Start
//!
//! ```no_run
//! use engineio_client::{Engine, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let engine = Engine::builder()
//!         .uri("http://localhost:3000")
//!         .build()?;
//!
//!     engine.connect().await?;
//!     let mut stream = engine.receive_stream()?;
//!
//!     engine.send_text("hello").await?;
//!
//!     if let Some(packet) = stream.next_packet().await {
//!         println!("Received: {:?}", packet?.as_text());
//!     }
//!
//!     engine.disconnect().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`engine`] | [`Engine`], builder, options, state, receive stream |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`protocol`] | [`Packet`], codec, [`HandshakeInfo`] |
//! | [`transport`] | [`Transport`] trait, polling and WebSocket transports |

// ============================================================================
// Modules
// ============================================================================

/// Connection engine.
///
/// Use [`Engine::builder()`] to create a configured engine.
pub mod engine;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Engine.IO packet model and wire format.
pub mod protocol;

/// Transports and the upgrade probe.
pub mod transport;

#[cfg(test)]
mod testing;

// ============================================================================
// Re-exports
// ============================================================================

// Engine types
pub use engine::{ClientOptions, ConnectionState, Engine, EngineBuilder, PacketStream};

// Error types
pub use error::{Error, Result};

// Protocol types
pub use protocol::{HandshakeInfo, Packet, PacketFormat, PacketType};

// Transport types
pub use transport::{
    HttpClient, HttpResponse, PollingTransport, ReqwestHttpClient, SocketTransport, Transport,
    TransportName,
};

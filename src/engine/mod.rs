//! Connection engine module.
//!
//! Ties the transports, handshake, upgrade probe, and heartbeat together
//! behind a single [`Engine`] handle.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Engine`] | Session owner and public client API |
//! | [`EngineBuilder`] | Fluent configuration builder |
//! | [`ClientOptions`] | Connection options |
//! | [`ConnectionState`] | Lifecycle state machine |
//! | [`PacketStream`] | Received Message packets |
//!
//! # Example
//!
//! ```no_run
//! use engineio_client::{Engine, Result};
//!
//! # async fn example() -> Result<()> {
//! let engine = Engine::builder()
//!     .uri("http://localhost:3000")
//!     .build()?;
//!
//! engine.connect().await?;
//! engine.send_text("hello").await?;
//! engine.disconnect().await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Fluent builder pattern for engine configuration.
pub mod builder;

/// Core engine implementation.
pub mod core;

/// Server ping watchdog and pong replies.
mod heartbeat;

/// Client options.
pub mod options;

/// Background receive loop.
mod poll_loop;

/// Connection state machine.
pub mod state;

/// Consumer end of the delivery queue.
pub mod stream;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::EngineBuilder;
pub use self::core::Engine;
pub use options::ClientOptions;
pub use state::ConnectionState;
pub use stream::PacketStream;

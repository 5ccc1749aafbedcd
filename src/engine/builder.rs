//! Builder pattern for engine configuration.
//!
//! Provides a fluent API for configuring and creating [`Engine`] instances.
//!
//! # Example
//!
//! ```no_run
//! use engineio_client::Engine;
//!
//! # fn example() -> engineio_client::Result<()> {
//! let engine = Engine::builder()
//!     .uri("http://localhost:3000")
//!     .auto_upgrade(true)
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::error::{Error, Result};
use crate::transport::{HttpClient, ReqwestHttpClient};

use super::core::Engine;
use super::options::ClientOptions;

// ============================================================================
// EngineBuilder
// ============================================================================

/// Builder for configuring an [`Engine`] instance.
///
/// Use [`Engine::builder()`] to create a new builder.
#[derive(Debug, Default, Clone)]
pub struct EngineBuilder {
    /// Accumulated options.
    options: ClientOptions,
}

// ============================================================================
// EngineBuilder Implementation
// ============================================================================

impl EngineBuilder {
    /// Creates a new builder with default options.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the server base address (`http://` or `https://`).
    #[inline]
    #[must_use]
    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.options.uri = uri.into();
        self
    }

    /// Sets the request path prefix (default `/engine.io`).
    #[inline]
    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.options.path = path.into();
        self
    }

    /// Enables or disables the WebSocket upgrade.
    #[inline]
    #[must_use]
    pub fn auto_upgrade(mut self, enabled: bool) -> Self {
        self.options.auto_upgrade = enabled;
        self
    }

    /// Enables or disables buffering before the stream is taken.
    #[inline]
    #[must_use]
    pub fn buffering(mut self, enabled: bool) -> Self {
        self.options.buffering = enabled;
        self
    }

    /// Enables or disables handshake retries.
    #[inline]
    #[must_use]
    pub fn auto_reconnect(mut self, enabled: bool) -> Self {
        self.options.auto_reconnect = enabled;
        self
    }

    /// Sets the maximum handshake attempts.
    #[inline]
    #[must_use]
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.options.max_retries = retries;
        self
    }

    /// Sets the backoff unit between handshake attempts.
    #[inline]
    #[must_use]
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.options.reconnect_delay = delay;
        self
    }

    /// Sets a pause between long-poll requests.
    #[inline]
    #[must_use]
    pub fn polling_interval(mut self, interval: Duration) -> Self {
        self.options.polling_interval = Some(interval);
        self
    }

    /// Sets a per-request timeout for the default HTTP client and the
    /// WebSocket opening handshake.
    #[inline]
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.options.request_timeout = Some(timeout);
        self
    }

    /// Replaces all options.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }

    /// Builds an engine backed by [`ReqwestHttpClient`].
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the options are invalid
    /// - [`Error::Http`] if the HTTP client cannot be created
    pub fn build(self) -> Result<Engine> {
        self.options.validate().map_err(Error::config)?;

        let http = match self.options.request_timeout {
            Some(timeout) => ReqwestHttpClient::with_timeout(timeout)?,
            None => ReqwestHttpClient::new(),
        };

        Engine::new(self.options, http)
    }

    /// Builds an engine over a custom [`HttpClient`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the options are invalid.
    pub fn build_with_client<H: HttpClient>(self, http: H) -> Result<Engine<H>> {
        Engine::new(self.options, http)
    }
}

// ============================================================================
// Tests
// ============================================================================

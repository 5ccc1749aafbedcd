//! Client configuration.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use engineio_client::ClientOptions;
//!
//! let options = ClientOptions::new("http://localhost:3000")
//!     .with_path("/engine.io")
//!     .with_auto_upgrade(false)
//!     .with_max_retries(5)
//!     .with_polling_interval(Duration::from_millis(100));
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use url::Url;

use crate::transport::DEFAULT_PATH;

// ============================================================================
// Constants
// ============================================================================

/// Default number of handshake attempts.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default backoff unit between handshake attempts.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(1);

// ============================================================================
// ClientOptions
// ============================================================================

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    /// Base `http://` or `https://` address of the server.
    pub uri: String,

    /// Request path prefix.
    pub path: String,

    /// Probe and switch to WebSocket when the server offers it.
    pub auto_upgrade: bool,

    /// Queue messages that arrive before the receive stream is taken.
    pub buffering: bool,

    /// Retry failed handshakes.
    pub auto_reconnect: bool,

    /// Maximum handshake attempts.
    pub max_retries: u32,

    /// Backoff unit: attempt N waits `N × reconnect_delay`.
    pub reconnect_delay: Duration,

    /// Pause between long-poll requests.
    pub polling_interval: Option<Duration>,

    /// Per-request timeout of the default HTTP client; also bounds the
    /// WebSocket opening handshake (10 s when unset).
    pub request_timeout: Option<Duration>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            uri: String::new(),
            path: DEFAULT_PATH.to_string(),
            auto_upgrade: true,
            buffering: true,
            auto_reconnect: true,
            max_retries: DEFAULT_MAX_RETRIES,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            polling_interval: None,
            request_timeout: None,
        }
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl ClientOptions {
    /// Creates options for the given server address.
    #[inline]
    #[must_use]
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            ..Default::default()
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl ClientOptions {
    /// Sets the request path prefix.
    #[inline]
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Enables or disables the WebSocket upgrade.
    #[inline]
    #[must_use]
    pub fn with_auto_upgrade(mut self, enabled: bool) -> Self {
        self.auto_upgrade = enabled;
        self
    }

    /// Enables or disables buffering before the stream is taken.
    #[inline]
    #[must_use]
    pub fn with_buffering(mut self, enabled: bool) -> Self {
        self.buffering = enabled;
        self
    }

    /// Enables or disables handshake retries.
    #[inline]
    #[must_use]
    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    /// Sets the maximum handshake attempts.
    #[inline]
    #[must_use]
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Sets the backoff unit between handshake attempts.
    #[inline]
    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Sets a pause between long-poll requests.
    #[inline]
    #[must_use]
    pub fn with_polling_interval(mut self, interval: Duration) -> Self {
        self.polling_interval = Some(interval);
        self
    }

    /// Sets a per-request timeout for the default HTTP client and the
    /// WebSocket opening handshake.
    #[inline]
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }
}

// ============================================================================
// Conversion Methods
// ============================================================================

impl ClientOptions {
    /// Number of handshake attempts `connect` makes.
    #[inline]
    #[must_use]
    pub fn connect_attempts(&self) -> u32 {
        if self.auto_reconnect {
            self.max_retries.max(1)
        } else {
            1
        }
    }

    /// Backoff before the attempt following failed attempt `attempt`.
    #[inline]
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.reconnect_delay * attempt
    }

    /// Parses the base address.
    ///
    /// # Errors
    ///
    /// Returns error message if the address is invalid.
    pub fn base_url(&self) -> Result<Url, String> {
        let url = Url::parse(&self.uri).map_err(|e| format!("invalid uri {:?}: {e}", self.uri))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(format!("unsupported scheme {other:?}, expected http or https")),
        }
    }

    /// Validates the options configuration.
    ///
    /// # Errors
    ///
    /// Returns error message if validation fails.
    pub fn validate(&self) -> Result<(), String> {
        self.base_url()?;

        if self.path.trim_matches('/').is_empty() {
            return Err("Path prefix must not be empty".to_string());
        }

        if self.max_retries == 0 {
            return Err("max_retries must be at least 1".to_string());
        }

        if self.polling_interval == Some(Duration::ZERO) {
            return Err("Polling interval must be greater than zero".to_string());
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

//! Protocol keep-alive.
//!
//! The server emits Ping packets every `pingInterval`; the client answers
//! each one with a Pong on the same transport. A watchdog armed for
//! `pingInterval + pingTimeout` fires [`EngineSignal::HeartbeatTimeout`]
//! when no Ping is observed within that window.
//!
//! Pong replies run as spawned tasks so a slow send never stalls the poll
//! loop; a failed reply is reported as [`EngineSignal::PongFailed`].

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::protocol::{Packet, PacketType};
use crate::transport::Transport;

use super::poll_loop::EngineSignal;

// ============================================================================
// HeartbeatMonitor
// ============================================================================

/// Watchdog over server pings.
///
/// Cheap to clone; all clones share one deadline.
#[derive(Clone)]
pub(crate) struct HeartbeatMonitor {
    inner: Arc<HeartbeatInner>,
}

struct HeartbeatInner {
    window: Duration,
    deadline: Mutex<Instant>,
    signals: mpsc::UnboundedSender<EngineSignal>,
    scope: CancellationToken,
}

impl std::fmt::Debug for HeartbeatMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeartbeatMonitor")
            .field("window", &self.inner.window)
            .finish_non_exhaustive()
    }
}

impl HeartbeatMonitor {
    /// Creates a monitor; the deadline is armed from now.
    pub(crate) fn new(
        window: Duration,
        signals: mpsc::UnboundedSender<EngineSignal>,
        scope: CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(HeartbeatInner {
                window,
                deadline: Mutex::new(Instant::now() + window),
                signals,
                scope,
            }),
        }
    }

    /// Window between pings before the link is declared dead.
    #[inline]
    #[must_use]
    pub(crate) fn window(&self) -> Duration {
        self.inner.window
    }

    /// Current deadline.
    #[inline]
    #[must_use]
    pub(crate) fn deadline(&self) -> Instant {
        *self.inner.deadline.lock()
    }

    /// Pushes the deadline one window past now.
    pub(crate) fn reset(&self) {
        *self.inner.deadline.lock() = Instant::now() + self.inner.window;
    }

    /// Spawns the watchdog task. It exits on cancellation or after firing.
    pub(crate) fn start(&self) -> tokio::task::JoinHandle<()> {
        let monitor = self.clone();
        tokio::spawn(async move { monitor.watch().await })
    }

    async fn watch(self) {
        loop {
            let armed = self.deadline();

            tokio::select! {
                biased;

                () = self.inner.scope.cancelled() => {
                    trace!("Heartbeat watchdog cancelled");
                    return;
                }

                () = sleep_until(armed) => {
                    if self.deadline() > armed {
                        continue;
                    }

                    let timeout_ms =
                        u64::try_from(self.inner.window.as_millis()).unwrap_or(u64::MAX);
                    warn!(timeout_ms, "Heartbeat timed out");
                    let _ = self
                        .inner
                        .signals
                        .send(EngineSignal::HeartbeatTimeout { timeout_ms });
                    return;
                }
            }
        }
    }

    /// Records a server ping and replies with Pong in the background.
    pub(crate) fn on_ping(&self, transport: Arc<dyn Transport>, ping: &Packet) {
        self.reset();
        trace!(deadline_in = ?self.inner.window, "Ping observed");

        let pong = Packet::plain(PacketType::Pong, ping.body().to_vec());
        let signals = self.inner.signals.clone();
        let scope = self.inner.scope.clone();

        tokio::spawn(async move {
            tokio::select! {
                biased;

                () = scope.cancelled() => {}

                result = transport.send(pong) => match result {
                    Ok(()) => debug!(transport = %transport.name(), "Pong sent"),
                    Err(e) => {
                        warn!(error = %e, "Failed to send pong");
                        let _ = signals.send(EngineSignal::PongFailed { error: e.to_string() });
                    }
                },
            }
        });
    }
}

// ============================================================================
// Tests
// ============================================================================

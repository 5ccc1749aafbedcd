//! Background receive loop.
//!
//! One loop runs per transport generation. It repeatedly reads a batch
//! from the active transport and dispatches every packet in batch order:
//!
//! | Packet | Action |
//! |--------|--------|
//! | Ping | heartbeat reset + background Pong |
//! | Close | [`EngineSignal::ServerClosed`], loop ends |
//! | Message | delivery queue |
//! | Noop | ignored |
//! | Open / Pong / Upgrade | logged and dropped |
//!
//! A transport error is pushed to the delivery queue, reported as
//! [`EngineSignal::TransportFailed`], and ends the loop.
//!
//! Two ways to stop a loop:
//!
//! | Mechanism | Effect |
//! |-----------|--------|
//! | generation scope cancelled | in-flight receive is abandoned |
//! | [`Drain`] requested | in-flight receive completes, loop exits before the next one |
//!
//! Either way, a batch that was already received is dispatched in full.
//!
//! The loop never touches the connection state. It only signals the
//! engine, which performs every transition.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use crate::error::Result;
use crate::protocol::{Packet, PacketType};
use crate::transport::Transport;

use super::heartbeat::HeartbeatMonitor;

// ============================================================================
// EngineSignal
// ============================================================================

/// Notification from a background task to the engine supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum EngineSignal {
    /// The server sent Close on generation `generation`.
    ServerClosed { generation: u64 },
    /// Receiving failed on generation `generation`.
    TransportFailed { generation: u64, error: String },
    /// No Ping within the heartbeat window.
    HeartbeatTimeout { timeout_ms: u64 },
    /// A background Pong could not be sent.
    PongFailed { error: String },
}

// ============================================================================
// Flow
// ============================================================================

/// Whether the loop keeps reading after a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Stop,
}

// ============================================================================
// Drain
// ============================================================================

const RUNNING: u8 = 0;
const DRAINING: u8 = 1;
const DRAINED: u8 = 2;

/// Request to stop a poll loop between batches.
///
/// Used when the pending long-poll must be allowed to finish, since
/// servers treat an aborted poll request as a transport error.
#[derive(Debug, Default)]
pub(crate) struct Drain(AtomicU8);

impl Drain {
    /// Asks the loop to exit after the batch it is waiting for.
    pub(crate) fn request(&self) {
        let _ = self
            .0
            .compare_exchange(RUNNING, DRAINING, Ordering::AcqRel, Ordering::Acquire);
    }

    /// Withdraws a pending request.
    ///
    /// Returns `false` if the loop already stopped on it.
    pub(crate) fn withdraw(&self) -> bool {
        match self
            .0
            .compare_exchange(DRAINING, RUNNING, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => true,
            Err(current) => current == RUNNING,
        }
    }

    /// Consumes a pending request. Called by the loop between batches.
    fn take(&self) -> bool {
        self.0
            .compare_exchange(DRAINING, DRAINED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

// ============================================================================
// PollContext
// ============================================================================

/// Everything one poll loop generation needs.
pub(crate) struct PollContext {
    /// Generation counter, echoed in signals.
    pub generation: u64,
    /// Transport this generation reads from.
    pub transport: Arc<dyn Transport>,
    /// Generation scope; cancelled on teardown.
    pub scope: CancellationToken,
    /// Between-batch stop request; used on manual upgrade.
    pub drain: Arc<Drain>,
    /// Producer end of the delivery queue.
    pub inbound: mpsc::UnboundedSender<Result<Packet>>,
    /// Supervisor channel.
    pub signals: mpsc::UnboundedSender<EngineSignal>,
    /// Heartbeat for this session.
    pub heartbeat: HeartbeatMonitor,
    /// Pause between batches (polling only).
    pub polling_interval: Option<Duration>,
    /// Queue Messages before a consumer took the stream.
    pub buffering: bool,
    /// Set once the receive stream was taken.
    pub consumer_attached: Arc<AtomicBool>,
}

impl PollContext {
    /// Dispatches one batch in order.
    pub(crate) fn dispatch(&self, packets: Vec<Packet>) -> Flow {
        for packet in packets {
            match packet.packet_type() {
                PacketType::Ping => {
                    self.heartbeat.on_ping(Arc::clone(&self.transport), &packet);
                }

                PacketType::Close => {
                    debug!(generation = self.generation, "Server closed the session");
                    let _ = self.signals.send(EngineSignal::ServerClosed {
                        generation: self.generation,
                    });
                    return Flow::Stop;
                }

                PacketType::Message => self.deliver(packet),

                PacketType::Noop => trace!("Noop received"),

                other @ (PacketType::Open | PacketType::Pong | PacketType::Upgrade) => {
                    warn!(packet_type = %other, "Dropping unexpected packet mid-session");
                }
            }
        }

        Flow::Continue
    }

    fn deliver(&self, packet: Packet) {
        if !self.buffering && !self.consumer_attached.load(Ordering::Acquire) {
            debug!(len = packet.len(), "No consumer attached, message discarded");
            return;
        }

        trace!(len = packet.len(), binary = packet.is_binary(), "Message queued");
        if self.inbound.send(Ok(packet)).is_err() {
            trace!("Delivery queue closed, message dropped");
        }
    }
}

// ============================================================================
// Loop
// ============================================================================

/// Runs until cancelled, closed by the server, or failed.
pub(crate) async fn run(ctx: PollContext) {
    let transport_name = ctx.transport.name();
    debug!(generation = ctx.generation, transport = %transport_name, "Poll loop started");

    loop {
        if ctx.drain.take() {
            debug!(generation = ctx.generation, "Poll loop drained");
            break;
        }

        let received = tokio::select! {
            biased;

            () = ctx.scope.cancelled() => break,

            result = ctx.transport.receive_batch() => result,
        };

        match received {
            Ok(packets) => {
                trace!(count = packets.len(), "Dispatching batch");
                if ctx.dispatch(packets) == Flow::Stop {
                    break;
                }
            }
            Err(e) => {
                error!(
                    generation = ctx.generation,
                    transport = %transport_name,
                    error = %e,
                    "Receive failed"
                );
                let message = e.to_string();
                let _ = ctx.inbound.send(Err(e));
                let _ = ctx.signals.send(EngineSignal::TransportFailed {
                    generation: ctx.generation,
                    error: message,
                });
                break;
            }
        }

        if let Some(interval) = ctx.polling_interval {
            tokio::select! {
                biased;

                () = ctx.scope.cancelled() => break,

                () = tokio::time::sleep(interval) => {}
            }
        }
    }

    debug!(generation = ctx.generation, transport = %transport_name, "Poll loop terminated");
}

// ============================================================================
// Tests
// ============================================================================

//! Consumer end of the delivery queue.

// ============================================================================
// Imports
// ============================================================================

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::Stream;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::protocol::Packet;

// ============================================================================
// PacketStream
// ============================================================================

/// Stream of received Message packets.
///
/// Ends when the session closes. A transport failure is delivered as a
/// final `Err` item before the end.
#[derive(Debug)]
pub struct PacketStream {
    rx: mpsc::UnboundedReceiver<Result<Packet>>,
}

impl PacketStream {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<Result<Packet>>) -> Self {
        Self { rx }
    }

    /// Waits for the next packet.
    ///
    /// Returns `None` once the session closed and the queue is drained.
    pub async fn next_packet(&mut self) -> Option<Result<Packet>> {
        self.rx.recv().await
    }

    /// Returns a queued packet without waiting.
    pub fn try_next_packet(&mut self) -> Option<Result<Packet>> {
        self.rx.try_recv().ok()
    }
}

impl Stream for PacketStream {
    type Item = Result<Packet>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

// ============================================================================
// Tests
// ============================================================================

//! Connects to an Engine.IO server, sends a few messages, and prints
//! everything received until the session closes or Ctrl-C is pressed.
//!
//! Usage:
//!
//! ```text
//! RUST_LOG=engineio_client=debug cargo run --example ping_pong -- http://localhost:3000
//! ```

use std::time::Duration;

use engineio_client::{Engine, Result};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let uri = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "http://localhost:3000".to_string());

    let engine = Engine::builder()
        .uri(&uri)
        .request_timeout(Duration::from_secs(60))
        .build()?;

    engine.connect().await?;
    info!(
        state = %engine.state(),
        sid = ?engine.handshake().map(|h| h.session_id),
        "Connected"
    );

    let mut stream = engine.receive_stream()?;

    for i in 0..3 {
        engine.send_text(format!("ping {i}")).await?;
    }
    engine.send_binary(vec![0xDE, 0xAD, 0xBE, 0xEF]).await?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }

            item = stream.next_packet() => match item {
                Some(Ok(packet)) => match packet.as_text() {
                    Some(text) => info!(%text, "Message"),
                    None => info!(len = packet.body().len(), "Binary message"),
                },
                Some(Err(e)) => {
                    warn!(error = %e, "Session failed");
                    break;
                }
                None => {
                    info!("Session closed by server");
                    break;
                }
            },
        }
    }

    engine.disconnect().await?;
    if let Some(error) = engine.last_error() {
        warn!(%error, "Last recorded error");
    }

    Ok(())
}

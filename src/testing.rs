//! Test doubles shared by unit tests.
//!
//! - [`MockHttpClient`]: scripted `GET` responses, recorded `POST`s
//! - [`MockTransport`]: scripted batches, recorded sends
//! - [`spawn_ws_server`]: one-shot local WebSocket server
//! - [`spawn_silent_server`]: accepts TCP and never answers

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU16, AtomicUsize, Ordering};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use crate::error::{Error, Result};
use crate::protocol::{HandshakeInfo, Packet};
use crate::transport::{HttpClient, HttpResponse, Transport, TransportName};

// ============================================================================
// Handshake Helpers
// ============================================================================

/// Builds an encoded Open packet.
pub(crate) fn handshake_body(
    sid: &str,
    upgrades: &[&str],
    ping_interval: u64,
    ping_timeout: u64,
    max_payload: u64,
) -> Vec<u8> {
    let json = serde_json::json!({
        "sid": sid,
        "upgrades": upgrades,
        "pingInterval": ping_interval,
        "pingTimeout": ping_timeout,
        "maxPayload": max_payload,
    });
    format!("0{json}").into_bytes()
}

/// Handshake with generous heartbeat settings.
pub(crate) fn handshake_info(sid: &str) -> HandshakeInfo {
    HandshakeInfo {
        session_id: sid.to_string(),
        supported_upgrades: vec!["websocket".to_string()],
        ping_interval_ms: 25_000,
        ping_timeout_ms: 20_000,
        max_payload_bytes: 1_000_000,
    }
}

// ============================================================================
// MockHttpClient
// ============================================================================

/// A recorded `POST` request.
#[derive(Debug, Clone)]
pub(crate) struct RecordedPost {
    pub url: String,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

/// A scripted `GET` reply, optionally held until its gate opens.
struct ScriptedGet {
    gate: Option<Arc<Notify>>,
    response: Result<HttpResponse>,
}

#[derive(Default)]
struct MockHttpInner {
    gets: Mutex<VecDeque<ScriptedGet>>,
    get_urls: Mutex<Vec<String>>,
    posts: Mutex<Vec<RecordedPost>>,
    get_calls: AtomicUsize,
    completed_gets: AtomicUsize,
    post_calls: AtomicUsize,
    post_status: AtomicU16,
}

/// Scripted HTTP client.
///
/// `GET`s pop the next scripted response; once the script is exhausted
/// they stay pending like an idle long-poll.
#[derive(Clone, Default)]
pub(crate) struct MockHttpClient {
    inner: Arc<MockHttpInner>,
}

impl MockHttpClient {
    pub(crate) fn new() -> Self {
        let client = Self::default();
        client.inner.post_status.store(200, Ordering::SeqCst);
        client
    }

    pub(crate) fn push_get(&self, body: Vec<u8>) {
        self.push_get_response(HttpResponse::ok(body));
    }

    pub(crate) fn push_get_response(&self, response: HttpResponse) {
        self.inner.gets.lock().push_back(ScriptedGet {
            gate: None,
            response: Ok(response),
        });
    }

    pub(crate) fn push_get_error(&self, message: &str) {
        self.inner.gets.lock().push_back(ScriptedGet {
            gate: None,
            response: Err(Error::transport_io(message)),
        });
    }

    /// Scripts a `GET` that answers `body` only after the returned gate
    /// is notified, like a long-poll the server holds open.
    pub(crate) fn push_gated_get(&self, body: Vec<u8>) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.inner.gets.lock().push_back(ScriptedGet {
            gate: Some(Arc::clone(&gate)),
            response: Ok(HttpResponse::ok(body)),
        });
        gate
    }

    pub(crate) fn set_post_status(&self, status: u16) {
        self.inner.post_status.store(status, Ordering::SeqCst);
    }

    pub(crate) fn get_calls(&self) -> usize {
        self.inner.get_calls.load(Ordering::SeqCst)
    }

    /// `GET`s that returned a response. A request dropped while waiting
    /// is not counted.
    pub(crate) fn completed_gets(&self) -> usize {
        self.inner.completed_gets.load(Ordering::SeqCst)
    }

    pub(crate) fn post_calls(&self) -> usize {
        self.inner.post_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn get_urls(&self) -> Vec<String> {
        self.inner.get_urls.lock().clone()
    }

    pub(crate) fn posts(&self) -> Vec<RecordedPost> {
        self.inner.posts.lock().clone()
    }

    /// Returns `true` once a `POST` with exactly `body` was recorded.
    pub(crate) fn posted(&self, body: &[u8]) -> bool {
        self.inner.posts.lock().iter().any(|p| p.body == body)
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn get(&self, url: Url) -> Result<HttpResponse> {
        self.inner.get_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.get_urls.lock().push(url.to_string());

        let next = self.inner.gets.lock().pop_front();
        let Some(scripted) = next else {
            return std::future::pending().await;
        };

        if let Some(gate) = scripted.gate {
            gate.notified().await;
        }
        self.inner.completed_gets.fetch_add(1, Ordering::SeqCst);
        scripted.response
    }

    async fn post(
        &self,
        url: Url,
        content_type: &'static str,
        body: Vec<u8>,
    ) -> Result<HttpResponse> {
        self.inner.post_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.posts.lock().push(RecordedPost {
            url: url.to_string(),
            content_type,
            body,
        });

        Ok(HttpResponse {
            status: self.inner.post_status.load(Ordering::SeqCst),
            body: Vec::new(),
        })
    }
}

// ============================================================================
// MockTransport
// ============================================================================

/// Scripted transport.
///
/// Receives pop the next scripted batch and wait for another one once
/// the script is exhausted.
#[derive(Default)]
pub(crate) struct MockTransport {
    incoming: Mutex<VecDeque<Result<Vec<Packet>>>>,
    arrived: Notify,
    sent: Mutex<Vec<Packet>>,
    fail_sends: std::sync::atomic::AtomicBool,
}

impl MockTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push_batch(&self, batch: Vec<Packet>) {
        self.incoming.lock().push_back(Ok(batch));
        self.arrived.notify_one();
    }

    pub(crate) fn push_error(&self, error: Error) {
        self.incoming.lock().push_back(Err(error));
        self.arrived.notify_one();
    }

    pub(crate) fn fail_sends(&self) {
        self.fail_sends.store(true, Ordering::SeqCst);
    }

    pub(crate) fn sent(&self) -> Vec<Packet> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn name(&self) -> TransportName {
        TransportName::Polling
    }

    async fn connect(&self) -> Result<()> {
        Ok(())
    }

    async fn receive_batch(&self) -> Result<Vec<Packet>> {
        loop {
            let next = self.incoming.lock().pop_front();
            if let Some(batch) = next {
                return batch;
            }
            self.arrived.notified().await;
        }
    }

    async fn send(&self, packet: Packet) -> Result<()> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(Error::transport_io("send failed"));
        }
        self.sent.lock().push(packet);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        Ok(())
    }
}

// ============================================================================
// Local WebSocket Server
// ============================================================================

/// Accepts one WebSocket client on `127.0.0.1:0` and runs `handler` on it.
///
/// Returns the `http://` base address and the handler's task.
pub(crate) async fn spawn_ws_server<F, Fut>(handler: F) -> (Url, JoinHandle<Fut::Output>)
where
    F: FnOnce(WebSocketStream<TcpStream>) -> Fut + Send + 'static,
    Fut: Future + Send + 'static,
    Fut::Output: Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("local addr").port();

    let task = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let ws = tokio_tungstenite::accept_async(stream)
            .await
            .expect("websocket accept");
        handler(ws).await
    });

    let base = Url::parse(&format!("http://127.0.0.1:{port}")).expect("url");
    (base, task)
}

/// Server that answers the first frame with `reply` and then records
/// every text frame until the socket closes.
pub(crate) async fn probe_server(reply: &'static str) -> (Url, JoinHandle<Vec<String>>) {
    spawn_ws_server(move |mut ws| async move {
        let mut received = Vec::new();

        if let Some(Ok(Message::Text(text))) = ws.next().await {
            received.push(text.as_str().to_string());
        }
        let _ = ws.send(Message::Text(reply.to_string().into())).await;

        while let Some(Ok(message)) = ws.next().await {
            match message {
                Message::Text(text) => received.push(text.as_str().to_string()),
                Message::Close(_) => break,
                _ => {}
            }
        }

        received
    })
    .await
}

/// Accepts one TCP connection on `127.0.0.1:0` and holds it open without
/// ever answering.
pub(crate) async fn spawn_silent_server() -> (Url, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("local addr").port();

    let task = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        std::future::pending::<()>().await;
        drop(stream);
    });

    let base = Url::parse(&format!("http://127.0.0.1:{port}")).expect("url");
    (base, task)
}

//! Exposes an in-process stub of the ingestion endpoint for use in integration tests.
//!
//! ```
//! use metricgen_test::server::StubServer;
//!
//! #[tokio::main]
//! async fn main() {
//!    let server = StubServer::new(202).await;
//!    let url = server.url("/metric");
//!    // point a generator at the URL...
//!    assert_eq!(server.hits(), 0);
//! }
//! ```

use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;

/// A sample as received by the stub server.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ReceivedSample {
    /// The reported device.
    pub device_id: String,
    /// The reported value.
    pub value: f64,
}

#[derive(Debug)]
struct Shared {
    status: StatusCode,
    delay: Duration,
    hits: AtomicU64,
    received: Mutex<Vec<ReceivedSample>>,
}

/// An in-process stub of the ingestion endpoint.
///
/// Every `POST /metric` is answered with a fixed status code, optionally after a delay. The server
/// counts all requests and keeps the decoded samples. It listens on a random available port on
/// localhost and stops when dropped.
#[derive(Debug)]
pub struct StubServer {
    handle: tokio::task::JoinHandle<()>,
    socket: SocketAddr,
    shared: Arc<Shared>,
}

impl StubServer {
    /// Starts a server answering every sample with `status`.
    pub async fn new(status: u16) -> Self {
        Self::with_delay(status, Duration::ZERO).await
    }

    /// Starts a server answering every sample with `status` after waiting for `delay`.
    pub async fn with_delay(status: u16, delay: Duration) -> Self {
        let addr = SocketAddr::from(([127, 0, 0, 1], 0));
        let listener = TcpListener::bind(addr).unwrap();
        listener.set_nonblocking(true).unwrap();
        let socket = listener.local_addr().unwrap();

        let shared = Arc::new(Shared {
            status: StatusCode::from_u16(status).unwrap(),
            delay,
            hits: AtomicU64::new(0),
            received: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/metric", post(ingest))
            .with_state(Arc::clone(&shared));

        let handle = tokio::spawn(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            handle,
            socket,
            shared,
        }
    }

    /// Returns a full URL pointing to the given path.
    ///
    /// This URL uses `127.0.0.1` as hostname.
    pub fn url(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        format!("http://127.0.0.1:{}/{}", self.socket.port(), path)
    }

    /// Number of requests that reached the endpoint so far.
    pub fn hits(&self) -> u64 {
        self.shared.hits.load(Ordering::SeqCst)
    }

    /// All samples decoded so far, in order of arrival.
    pub fn received(&self) -> Vec<ReceivedSample> {
        self.shared.received.lock().unwrap().clone()
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn ingest(
    State(shared): State<Arc<Shared>>,
    Json(sample): Json<ReceivedSample>,
) -> StatusCode {
    shared.hits.fetch_add(1, Ordering::SeqCst);
    shared.received.lock().unwrap().push(sample);

    if !shared.delay.is_zero() {
        tokio::time::sleep(shared.delay).await;
    }

    shared.status
}

/// Returns a URL on localhost that refuses connections.
pub fn refused_url() -> String {
    let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{port}/metric")
}

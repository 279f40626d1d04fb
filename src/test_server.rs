//! Local HTTP fixture for download tests

use axum::{
    Router,
    body::{Body, Bytes},
    extract::{Request, State},
    http::{StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
};
use futures_util::stream;
use std::{
    io,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
    time::Duration,
};

pub const FIXED_LEN: usize = 256 * 1024;
pub const CHUNKED_LEN: usize = 100_000;

pub const SLOW_CHUNK: usize = 32 * 1024;
pub const SLOW_CHUNKS: usize = 16;
pub const SLOW_LEN: usize = SLOW_CHUNK * SLOW_CHUNKS;
pub const SLOW_DELAY: Duration = Duration::from_millis(25);

/// Bytes sent by `/drop` before the connection dies
pub const DROP_AFTER: usize = 2 * 1024 * 1024;
const DROP_ANNOUNCED: usize = 2 * DROP_AFTER;

/// Deterministic filler whose period doesn't line up with any chunk size.
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

pub struct TestServer {
    addr: SocketAddr,
    hits: Arc<AtomicUsize>,
}

impl TestServer {
    /// Serves on an ephemeral port from a background thread for the rest of the test run.
    pub fn start() -> Self {
        let listener =
            std::net::TcpListener::bind("127.0.0.1:0").expect("Failed to bind test listener");
        listener
            .set_nonblocking(true)
            .expect("Failed to set listener non-blocking");
        let addr = listener.local_addr().expect("Listener has no address");

        let hits = Arc::new(AtomicUsize::new(0));
        let app = router(hits.clone());

        thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("Failed to build test runtime");
            runtime.block_on(async move {
                let listener = tokio::net::TcpListener::from_std(listener)
                    .expect("Failed to adopt test listener");
                axum::serve(listener, app).await.expect("Test server failed");
            });
        });

        Self { addr, hits }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Requests received so far
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

fn router(hits: Arc<AtomicUsize>) -> Router {
    Router::new()
        .route("/fixed", get(fixed))
        .route("/chunked", get(chunked))
        .route("/slow", get(slow))
        .route("/drop", get(drop_midway))
        .route("/missing", get(|| async { StatusCode::NOT_FOUND }))
        .layer(middleware::from_fn_with_state(hits, count_hits))
}

async fn count_hits(State(hits): State<Arc<AtomicUsize>>, request: Request, next: Next) -> Response {
    hits.fetch_add(1, Ordering::SeqCst);
    next.run(request).await
}

async fn fixed() -> Vec<u8> {
    payload(FIXED_LEN)
}

/// Streamed body, so no Content-Length is sent
async fn chunked() -> Body {
    let chunks: Vec<io::Result<Bytes>> = payload(CHUNKED_LEN)
        .chunks(8 * 1024)
        .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
        .collect();
    Body::from_stream(stream::iter(chunks))
}

async fn slow() -> impl IntoResponse {
    let body = stream::unfold(0usize, |sent| async move {
        if sent == SLOW_CHUNKS {
            return None;
        }
        tokio::time::sleep(SLOW_DELAY).await;
        Some((Ok::<_, io::Error>(Bytes::from(vec![0x5a; SLOW_CHUNK])), sent + 1))
    });

    (
        [(header::CONTENT_LENGTH, SLOW_LEN.to_string())],
        Body::from_stream(body),
    )
}

/// Announces twice what it sends, then fails the body.
async fn drop_midway() -> impl IntoResponse {
    const CHUNK: usize = 64 * 1024;
    let body = stream::unfold(0usize, |sent| async move {
        let item: io::Result<Bytes> = match sent {
            usize::MAX => return None,
            sent if sent >= DROP_AFTER => Err(io::Error::other("connection dropped")),
            _ => Ok(Bytes::from(vec![0xa5; CHUNK])),
        };
        let next = if item.is_ok() { sent + CHUNK } else { usize::MAX };
        Some((item, next))
    });

    (
        [(header::CONTENT_LENGTH, DROP_ANNOUNCED.to_string())],
        Body::from_stream(body),
    )
}

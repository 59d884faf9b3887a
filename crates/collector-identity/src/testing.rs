//! In-process mock of the control-plane API used by the unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::config::{HEARTBEAT_URL, REGISTER_URL};

/// How the mock answers.
#[derive(Debug, Clone)]
pub struct MockBehavior {
    pub register_status: StatusCode,
    pub register_body: Value,
    pub heartbeat_status: StatusCode,
    /// Delay before the heartbeat handler answers.
    pub heartbeat_delay: Duration,
}

impl Default for MockBehavior {
    fn default() -> Self {
        Self {
            register_status: StatusCode::OK,
            register_body: json!({
                "collectorId": "c1",
                "collectorCredentialId": "id1",
                "collectorCredentialKey": "key1",
            }),
            heartbeat_status: StatusCode::NO_CONTENT,
            heartbeat_delay: Duration::ZERO,
        }
    }
}

/// What the mock observed.
#[derive(Debug, Default)]
pub struct MockState {
    pub register_calls: AtomicUsize,
    pub heartbeat_calls: AtomicUsize,
    pub last_register_auth: Mutex<Option<String>>,
    pub last_register_body: Mutex<Option<Value>>,
    pub last_heartbeat_auth: Mutex<Option<String>>,
}

impl MockState {
    pub fn register_calls(&self) -> usize {
        self.register_calls.load(Ordering::SeqCst)
    }

    pub fn heartbeat_calls(&self) -> usize {
        self.heartbeat_calls.load(Ordering::SeqCst)
    }

    pub fn last_register_auth(&self) -> Option<String> {
        self.last_register_auth.lock().unwrap().clone()
    }

    pub fn last_register_body(&self) -> Option<Value> {
        self.last_register_body.lock().unwrap().clone()
    }

    pub fn last_heartbeat_auth(&self) -> Option<String> {
        self.last_heartbeat_auth.lock().unwrap().clone()
    }
}

struct AppState {
    behavior: MockBehavior,
    observed: Arc<MockState>,
}

pub struct MockApi {
    pub base_url: String,
    pub state: Arc<MockState>,
}

impl MockApi {
    pub async fn spawn(behavior: MockBehavior) -> Self {
        let observed = Arc::new(MockState::default());
        let app_state = Arc::new(AppState {
            behavior,
            observed: Arc::clone(&observed),
        });

        let app = Router::new()
            .route(REGISTER_URL, post(register))
            .route(HEARTBEAT_URL, post(heartbeat))
            .with_state(app_state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{addr}"),
            state: observed,
        }
    }
}

fn authorization(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}

async fn register(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    state.observed.register_calls.fetch_add(1, Ordering::SeqCst);
    *state.observed.last_register_auth.lock().unwrap() = authorization(&headers);
    *state.observed.last_register_body.lock().unwrap() = serde_json::from_slice(&body).ok();

    (
        state.behavior.register_status,
        Json(state.behavior.register_body.clone()),
    )
        .into_response()
}

async fn heartbeat(State(state): State<Arc<AppState>>, headers: HeaderMap) -> StatusCode {
    state.observed.heartbeat_calls.fetch_add(1, Ordering::SeqCst);
    *state.observed.last_heartbeat_auth.lock().unwrap() = authorization(&headers);

    if !state.behavior.heartbeat_delay.is_zero() {
        tokio::time::sleep(state.behavior.heartbeat_delay).await;
    }
    state.behavior.heartbeat_status
}

/// Poll `condition` until it holds, panicking after `timeout`.
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(timeout, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// One-shot server answering with `status_line` and a body shorter than its
/// `content-length`, then closing. Returns the base URL.
pub async fn spawn_truncated_response(status_line: &'static str) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        read_request(&mut socket).await;
        let response = format!("HTTP/1.1 {status_line}\r\ncontent-length: 64\r\n\r\n{{\"err");
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.unwrap();
    });
    format!("http://{addr}")
}

/// Consume a request head and its `content-length` body.
async fn read_request(socket: &mut TcpStream) {
    let mut received = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        let n = socket.read(&mut buf).await.unwrap();
        if n == 0 {
            return;
        }
        received.extend_from_slice(&buf[..n]);
        let Some(head_end) = received.windows(4).position(|w| w == b"\r\n\r\n") else {
            continue;
        };
        let head = String::from_utf8_lossy(&received[..head_end]).to_ascii_lowercase();
        let body_len = head
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        if received.len() >= head_end + 4 + body_len {
            return;
        }
    }
}

//! Mock control plane — a local stand-in for the collector registration
//! API, for running `collector-agent` without a real backend.
//!
//! * `POST /api/v1/collector/register` issues fresh credentials to any
//!   caller presenting Basic access credentials.
//! * `POST /api/v1/collector/heartbeat` answers `204` for known collector
//!   credentials and `401` otherwise.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Default)]
struct AppState {
    /// Collector credential id → (key, collector id).
    collectors: Mutex<HashMap<String, (String, String)>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterRequest {
    collector_name: String,
    #[serde(default)]
    hostname: String,
    #[serde(default)]
    clobber: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RegisterResponse {
    collector_id: String,
    collector_credential_id: String,
    collector_credential_key: String,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let port: u16 = std::env::var("MOCK_CONTROL_PLANE_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(4100);

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind listener");

    info!(address = %addr, "mock control plane listening");
    axum::serve(listener, app()).await.expect("server error");
}

fn app() -> Router {
    Router::new()
        .route("/api/v1/collector/register", post(register))
        .route("/api/v1/collector/heartbeat", post(heartbeat))
        .with_state(Arc::new(AppState::default()))
}

/// Decode `Authorization: Basic base64(user:secret)`.
fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Basic ")?;
    let decoded = String::from_utf8(STANDARD.decode(token).ok()?).ok()?;
    let (user, secret) = decoded.split_once(':')?;
    Some((user.to_string(), secret.to_string()))
}

fn unauthorized(message: &str) -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({ "error": message }))).into_response()
}

// --- Endpoints ---

async fn register(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<RegisterRequest>,
) -> Response {
    let Some((access_id, _)) = basic_credentials(&headers) else {
        warn!("register request without access credentials");
        return unauthorized("missing access credentials");
    };

    let response = RegisterResponse {
        collector_id: format!("c-{}", Uuid::new_v4().simple()),
        collector_credential_id: format!("cred-{}", Uuid::new_v4().simple()),
        collector_credential_key: Uuid::new_v4().simple().to_string(),
    };

    state.collectors.lock().unwrap().insert(
        response.collector_credential_id.clone(),
        (
            response.collector_credential_key.clone(),
            response.collector_id.clone(),
        ),
    );

    info!(
        access_id = %access_id,
        collector_name = %req.collector_name,
        hostname = %req.hostname,
        clobber = req.clobber,
        collector_id = %response.collector_id,
        "collector registered"
    );
    Json(response).into_response()
}

async fn heartbeat(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let Some((credential_id, credential_key)) = basic_credentials(&headers) else {
        return unauthorized("missing collector credentials");
    };

    let collectors = state.collectors.lock().unwrap();
    match collectors.get(&credential_id) {
        Some((key, collector_id)) if *key == credential_key => {
            info!(collector_id = %collector_id, "heartbeat");
            StatusCode::NO_CONTENT.into_response()
        }
        _ => unauthorized("unknown collector credentials"),
    }
}

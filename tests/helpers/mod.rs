#![allow(dead_code)] // Test helpers appear unused when compiled independently

use axum::{
    body::Bytes,
    extract::State,
    http::{header::LOCATION, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Router,
};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use target_matterbeam_http::{RetryConfig, SinkConfig};
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;

/// One request as seen by the mock API
#[derive(Clone, Debug)]
pub struct CapturedRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Value,
}

#[derive(Clone, Default)]
struct ApiState {
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
    /// Statuses to answer with, in order; 200 once exhausted
    script: Arc<Mutex<VecDeque<u16>>>,
}

pub struct MockApi {
    state: ApiState,
    shutdown_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
    pub url: String,
}

impl MockApi {
    pub async fn requests(&self) -> Vec<CapturedRequest> {
        self.state.requests.lock().await.clone()
    }

    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(());
        let _ = self.handle.await;
    }
}

/// Find an available TCP port
pub async fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// Best-effort check for whether binding to loopback is permitted in the current sandbox.
pub async fn can_bind_loopback() -> bool {
    match TcpListener::bind("127.0.0.1:0").await {
        Ok(listener) => {
            drop(listener);
            true
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => false,
        Err(_) => true, // treat other errors as non-fatal for skipping
    }
}

/// Spawn the mock API answering with `script` statuses in order.
pub async fn spawn_mock_api(script: Vec<u16>) -> MockApi {
    let state = ApiState {
        requests: Arc::new(Mutex::new(Vec::new())),
        script: Arc::new(Mutex::new(script.into())),
    };

    let app = Router::new().fallback(capture).with_state(state.clone());

    let port = free_port().await;
    let listener = TcpListener::bind(("127.0.0.1", port))
        .await
        .expect("failed to bind mock API listener");

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let handle = tokio::spawn(async move {
        let server = axum::serve(listener, app).with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        });
        if let Err(err) = server.await {
            eprintln!("mock API server error: {}", err);
        }
    });

    MockApi {
        state,
        shutdown_tx,
        handle,
        url: format!("http://127.0.0.1:{}", port),
    }
}

/// Config pointing at the mock API
pub fn config_for(api: &MockApi, batching: bool) -> SinkConfig {
    let mut config = SinkConfig::new(api.url.clone(), "test-token");
    config.api_batching = batching;
    config.request_timeout_secs = 5;
    config
}

/// Five attempts with no delay between them
pub fn fast_retry() -> RetryConfig {
    RetryConfig::with_policy(5, |_| Duration::ZERO)
}

async fn capture(
    State(state): State<ApiState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let body = serde_json::from_slice(&body).unwrap_or(Value::Null);
    state.requests.lock().await.push(CapturedRequest {
        method,
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        headers,
        body,
    });

    let code = state.script.lock().await.pop_front().unwrap_or(200);
    let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_redirection() {
        return (status, [(LOCATION, "/redirected")]).into_response();
    }
    (status, axum::Json(serde_json::json!({ "status": code }))).into_response()
}

use std::{
    future::Future,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::Result;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use shared::{
    error::ErrorBody,
    protocol::{DeployResponse, DeployStatus, DeployStatusResponse, Diagram, ServerEvent},
};
use tokio::{
    net::TcpListener,
    sync::{broadcast, Mutex},
};

#[derive(Debug, Clone)]
pub(crate) enum Failure {
    /// JSON `{ "error": ... }` body.
    Message(StatusCode, String),
    /// Plain-text body the client cannot decode.
    Opaque(StatusCode),
}

#[derive(Clone)]
pub(crate) struct MockDeployState {
    pub ws_connections: Arc<AtomicUsize>,
    pub pushes: broadcast::Sender<String>,
    /// Frames sent to every new socket right after the upgrade.
    pub script: Arc<Mutex<Vec<String>>>,
    pub close_after_script: Arc<AtomicBool>,
    pub fail_with: Arc<Mutex<Option<Failure>>>,
    pub status: Arc<Mutex<DeployStatusResponse>>,
    pub received: Arc<Mutex<Vec<(&'static str, Option<Diagram>)>>>,
}

impl MockDeployState {
    fn new() -> Self {
        let (pushes, _) = broadcast::channel(64);
        Self {
            ws_connections: Arc::new(AtomicUsize::new(0)),
            pushes,
            script: Arc::new(Mutex::new(Vec::new())),
            close_after_script: Arc::new(AtomicBool::new(false)),
            fail_with: Arc::new(Mutex::new(None)),
            status: Arc::new(Mutex::new(DeployStatusResponse {
                deploy_status: DeployStatus::Idle,
                node_statuses: Vec::new(),
            })),
            received: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn connections(&self) -> usize {
        self.ws_connections.load(Ordering::SeqCst)
    }

    pub fn push(&self, event: &ServerEvent) {
        let text = serde_json::to_string(event).expect("serialize event");
        let _ = self.pushes.send(text);
    }

    pub fn push_raw(&self, text: &str) {
        let _ = self.pushes.send(text.to_string());
    }

    pub async fn fail(&self, failure: Failure) {
        *self.fail_with.lock().await = Some(failure);
    }

    async fn record(&self, method: &'static str, diagram: Option<Diagram>) -> Option<Response> {
        self.received.lock().await.push((method, diagram));
        let failure = self.fail_with.lock().await.clone()?;
        Some(match failure {
            Failure::Message(code, message) => (code, Json(ErrorBody::new(message))).into_response(),
            Failure::Opaque(code) => (code, "upstream exploded").into_response(),
        })
    }
}

async fn post_deploy(
    State(state): State<MockDeployState>,
    Json(diagram): Json<Diagram>,
) -> Response {
    if let Some(failure) = state.record("POST", Some(diagram)).await {
        return failure;
    }
    state.status.lock().await.deploy_status = DeployStatus::Deploying;
    Json(DeployResponse {
        status: "deploying".into(),
    })
    .into_response()
}

async fn delete_deploy(State(state): State<MockDeployState>) -> Response {
    if let Some(failure) = state.record("DELETE", None).await {
        return failure;
    }
    let mut status = state.status.lock().await;
    status.deploy_status = DeployStatus::Idle;
    status.node_statuses.clear();
    Json(DeployResponse {
        status: "idle".into(),
    })
    .into_response()
}

async fn put_deploy(
    State(state): State<MockDeployState>,
    Json(diagram): Json<Diagram>,
) -> Response {
    if let Some(failure) = state.record("PUT", Some(diagram)).await {
        return failure;
    }
    Json(state.status.lock().await.clone()).into_response()
}

async fn get_status(State(state): State<MockDeployState>) -> Response {
    if let Some(failure) = state.record("GET", None).await {
        return failure;
    }
    Json(state.status.lock().await.clone()).into_response()
}

async fn ws_status(ws: WebSocketUpgrade, State(state): State<MockDeployState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| ws_connection(state, socket))
}

async fn ws_connection(state: MockDeployState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let mut pushes = state.pushes.subscribe();
    state.ws_connections.fetch_add(1, Ordering::SeqCst);

    let script = state.script.lock().await.clone();
    for text in script {
        if sender.send(Message::Text(text)).await.is_err() {
            return;
        }
    }
    if state.close_after_script.load(Ordering::SeqCst) {
        let _ = sender.send(Message::Close(None)).await;
        return;
    }

    let send_task = tokio::spawn(async move {
        while let Ok(text) = pushes.recv().await {
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(_msg)) = receiver.next().await {}

    send_task.abort();
}

pub(crate) async fn spawn_deploy_server() -> Result<(String, MockDeployState)> {
    spawn_deploy_server_at("127.0.0.1:0").await
}

/// Serves the mock on a fixed address, e.g. one a client is already retrying against.
pub(crate) async fn spawn_deploy_server_at(addr: &str) -> Result<(String, MockDeployState)> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind(addr).await?;
    let addr = listener.local_addr()?;
    let state = MockDeployState::new();
    let app = Router::new()
        .route(
            "/api/deploy",
            axum::routing::post(post_deploy)
                .put(put_deploy)
                .delete(delete_deploy),
        )
        .route("/api/deploy/status", get(get_status))
        .route("/ws/status", get(ws_status))
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((format!("http://{addr}"), state))
}

/// Address nothing listens on.
pub(crate) async fn unused_addr() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);
    addr.to_string()
}

/// Polls `check` until it holds or two seconds pass.
pub(crate) async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let poll = async {
        while !check().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(2), poll).await.is_ok()
}

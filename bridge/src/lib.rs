// Quarry Bridge: HTTP surface for the answer pipeline
//
// POST /invocations                          chat-completion request → response (or SSE chunk)
// POST /serving-endpoints/:name/invocations  same, addressed by endpoint name
// GET  /health                               liveness check

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive},
        IntoResponse, Response, Sse,
    },
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use quarry_core::{ChatCompletionChunk, Message, Pipeline, QuarryError};

#[derive(thiserror::Error, Debug)]
pub enum BridgeError {
    #[error(transparent)]
    Pipeline(#[from] QuarryError),
    #[error("failed to encode stream event: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    pub fn status(&self) -> StatusCode {
        match self {
            BridgeError::Pipeline(QuarryError::NoUserMessage) => StatusCode::BAD_REQUEST,
            BridgeError::Pipeline(e) if e.is_upstream() => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(target: "bridge", %status, error = %self, "Invocation failed");
        } else {
            warn!(target: "bridge", %status, error = %self, "Rejected invocation");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;

/// Body of an invocation: the conversation plus an optional streaming switch
#[derive(Debug, Clone, Deserialize)]
pub struct InvocationRequest {
    pub messages: Vec<Message>,
    #[serde(default)]
    pub stream: bool,
}

#[derive(Clone)]
pub struct BridgeState {
    pub pipeline: Arc<Pipeline>,
}

impl BridgeState {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self { pipeline }
    }
}

pub fn router(pipeline: Arc<Pipeline>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/invocations", post(invocations_handler))
        .route(
            "/serving-endpoints/:name/invocations",
            post(named_invocations_handler),
        )
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(BridgeState::new(pipeline))
}

pub async fn start_server(addr: SocketAddr, pipeline: Arc<Pipeline>) -> Result<()> {
    let topology = pipeline.topology();
    let app = router(pipeline);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(target: "bridge", %addr, %topology, "Quarry bridge listening");

    axum::serve(listener, app).await?;
    Ok(())
}

async fn health_handler() -> &'static str {
    "ok"
}

async fn invocations_handler(
    State(state): State<BridgeState>,
    Json(req): Json<InvocationRequest>,
) -> Result<Response> {
    invoke(&state, req).await
}

async fn named_invocations_handler(
    State(state): State<BridgeState>,
    Path(name): Path<String>,
    Json(req): Json<InvocationRequest>,
) -> Result<Response> {
    info!(target: "bridge", endpoint = %name, "Named invocation");
    invoke(&state, req).await
}

async fn invoke(state: &BridgeState, req: InvocationRequest) -> Result<Response> {
    info!(
        target: "bridge",
        messages = req.messages.len(),
        stream = req.stream,
        "Invocation received"
    );

    let response = state.pipeline.invoke(req.messages).await?;
    if !req.stream {
        return Ok(Json(response).into_response());
    }

    // One chunk carrying the complete answer
    let chunk = ChatCompletionChunk::from(response);
    let event = Event::default().data(serde_json::to_string(&chunk)?);
    let stream = tokio_stream::once(Ok::<_, Infallible>(event));
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()).into_response())
}

//! HTTP and WebSocket API.
//!
//! - `GET <catalog.path>` - AsyncAPI document for the hosted router
//! - `GET <catalog.docs_path>` - HTML documentation page
//! - `GET /api/stats` - Connection statistics per channel
//! - any other path - WebSocket upgrade, routed by the request target
//!
//! Each upgraded connection becomes a router [`Client`]. Inbound frames are
//! handed to the router one at a time, in arrival order; outbound frames and
//! close requests go through a per-connection queue drained by a writer task.

use async_trait::async_trait;
use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    http::{HeaderMap, StatusCode, Uri},
    response::{Html, IntoResponse, Response},
    routing::get,
    Json,
};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use switchyard_catalog::{html_doc, AsyncApiBuilder, CatalogParams};
use switchyard_router::{
    ChannelStats, Client, ClientMetadata, ClientStatus, Frame, HeaderValue, Headers, Router,
    RouterError, Socket,
};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::config::CatalogConfig;

/// Shared state of the HTTP application.
#[derive(Clone)]
pub struct AppState {
    /// Router serving WebSocket connections.
    pub router: Arc<Router>,
    /// Catalog document parameters.
    pub catalog: Arc<CatalogParams>,
    /// Path the catalog document is served at.
    pub catalog_path: String,
    /// Title of the documentation page.
    pub docs_title: String,
}

impl AppState {
    /// Create state for a router.
    pub fn new(router: Arc<Router>, catalog: CatalogParams, config: &CatalogConfig) -> Self {
        Self {
            router,
            catalog: Arc::new(catalog),
            catalog_path: config.path.clone(),
            docs_title: config.title.clone(),
        }
    }
}

/// Build the HTTP application.
pub fn app(state: AppState, config: &CatalogConfig) -> axum::Router {
    axum::Router::new()
        .route(&config.path, get(catalog_json))
        .route(&config.docs_path, get(docs_html))
        .route("/api/stats", get(get_stats))
        .fallback(ws_handler)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the application until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, app: axum::Router, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
}

async fn catalog_json(State(state): State<AppState>) -> Result<Json<Value>, (StatusCode, String)> {
    AsyncApiBuilder::from_router(&state.router, (*state.catalog).clone())
        .generate()
        .map(Json)
        .map_err(|e| {
            error!(error = %e, "Catalog generation failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })
}

async fn docs_html(State(state): State<AppState>) -> Result<Html<String>, (StatusCode, String)> {
    html_doc(&state.catalog_path, Some(&state.docs_title))
        .map(Html)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

/// Statistics of one channel.
#[derive(Debug, Serialize)]
struct ChannelStatsResponse {
    path: String,
    #[serde(flatten)]
    stats: ChannelStats,
}

/// Statistics response.
#[derive(Debug, Serialize)]
struct StatsResponse {
    connections: usize,
    channels: Vec<ChannelStatsResponse>,
}

async fn get_stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let channels = std::iter::once(Arc::clone(state.router.root()))
        .chain(state.router.channels())
        .map(|channel| ChannelStatsResponse {
            path: channel.path().to_string(),
            stats: channel.stats(),
        })
        .collect();

    Json(StatsResponse {
        connections: state.router.connection_count(),
        channels,
    })
}

/// WebSocket upgrade handler for every unmatched path.
async fn ws_handler(
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => {
            debug!(path = %uri.path(), error = %rejection, "Not a websocket request");
            return StatusCode::NOT_FOUND.into_response();
        }
    };

    let target = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());
    let headers = convert_headers(&headers);
    let metadata = ClientMetadata {
        ip_address: Some(addr.ip().to_string()),
        user_agent: headers.get("user-agent").and_then(HeaderValue::first).map(String::from),
        ..ClientMetadata::now()
    };

    ws.on_upgrade(move |socket| handle_socket(socket, state.router, target, headers, metadata))
}

/// Collect request headers under lowercase names; repeated headers keep
/// every value.
pub fn convert_headers(headers: &HeaderMap) -> Headers {
    let mut out = Headers::new();
    for name in headers.keys() {
        let values: Vec<String> = headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(String::from)
            .collect();
        let value = match values.len() {
            0 => continue,
            1 => HeaderValue::Single(values.into_iter().next().unwrap_or_default()),
            _ => HeaderValue::Multi(values),
        };
        out.insert(name.as_str().to_string(), value);
    }
    out
}

/// Writer-side request.
#[derive(Debug)]
enum Outgoing {
    Frame(Frame),
    Close(u16, String),
}

/// Router socket backed by an axum WebSocket writer task.
struct AxumSocket {
    tx: mpsc::UnboundedSender<Outgoing>,
}

#[async_trait]
impl Socket for AxumSocket {
    async fn send(&self, frame: Frame) -> Result<(), RouterError> {
        self.tx
            .send(Outgoing::Frame(frame))
            .map_err(|_| RouterError::ConnectionClosed)
    }

    fn terminate(&self, code: u16, reason: &str) {
        let _ = self.tx.send(Outgoing::Close(code, reason.to_string()));
    }
}

fn to_message(frame: Frame) -> Message {
    match frame {
        Frame::Text(text) => Message::Text(text.into()),
        Frame::Binary(data) => Message::Binary(data),
    }
}

/// Handle an upgraded WebSocket connection.
async fn handle_socket(
    socket: WebSocket,
    router: Arc<Router>,
    target: String,
    headers: Headers,
    metadata: ClientMetadata,
) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let client = Arc::new(
        Client::new(Arc::new(AxumSocket { tx }), &target)
            .with_headers(headers)
            .with_metadata(metadata),
    );
    let client_id = client.id.clone();
    info!(client_id = %client_id, target = %target, "WebSocket client connected");

    // Forward queued frames; a close request ends the task with its code.
    let writer_id = client_id.clone();
    let mut send_task = tokio::spawn(async move {
        while let Some(outgoing) = rx.recv().await {
            match outgoing {
                Outgoing::Frame(frame) => {
                    if ws_sender.send(to_message(frame)).await.is_err() {
                        break;
                    }
                }
                Outgoing::Close(code, reason) => {
                    let frame = CloseFrame {
                        code,
                        reason: reason.clone().into(),
                    };
                    let _ = ws_sender.send(Message::Close(Some(frame))).await;
                    debug!(client_id = %writer_id, code, "Close frame sent");
                    return Some((code, reason));
                }
            }
        }
        debug!(client_id = %writer_id, "Send task ended");
        None
    });

    client.advance_status(ClientStatus::Connected);
    let mut close: Option<(u16, String)> = None;

    if router.handle_connect(&client).await.is_some() {
        loop {
            tokio::select! {
                closed = &mut send_task => {
                    close = closed.ok().flatten();
                    break;
                }
                msg = ws_receiver.next() => {
                    let frame = match msg {
                        Some(Ok(Message::Text(text))) => Frame::text(text.as_str()),
                        Some(Ok(Message::Binary(data))) => Frame::binary(data),
                        Some(Ok(Message::Close(frame))) => {
                            debug!(client_id = %client_id, "WebSocket close received");
                            close = frame.map(|f| (f.code, f.reason.to_string()));
                            break;
                        }
                        Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                        Some(Err(e)) => {
                            warn!(client_id = %client_id, error = %e, "WebSocket error");
                            router.handle_transport_error(&e.to_string());
                            break;
                        }
                        None => break,
                    };
                    router.handle_message(&client, frame).await;
                }
            }
        }
    } else {
        // Rejected during connect: let the writer flush the close frame.
        close = (&mut send_task).await.ok().flatten();
    }

    send_task.abort();
    let (code, reason) = match &close {
        Some((code, reason)) => (Some(*code), Some(reason.as_str())),
        None => (None, None),
    };
    router.handle_disconnect(&client, code, reason);
    info!(client_id = %client_id, code = ?code, "WebSocket client disconnected");
}

//! Message Relay Service
//!
//! HTTP/WebSocket publish/subscribe relay carrying ElGamal parameters and
//! results between nodes.

use anyhow::Result;
use axum::{
    extract::{Path, Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use clap::Parser;
use msg_relay::{
    validate_topic, Envelope, FetchResponse, PublishRequest, PublishResponse, TopicInfo,
    TopicMessage, TopicStore,
};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn, Level};

/// Message relay service CLI arguments
#[derive(Parser, Debug)]
#[command(name = "msg-relay-svc")]
#[command(about = "Publish/subscribe relay for the ElGamal participant")]
struct Args {
    /// Listen address
    #[arg(short, long, env = "RELAY_LISTEN", default_value = "0.0.0.0:8080")]
    listen: String,

    /// Message TTL in seconds
    #[arg(long, default_value = "3600")]
    ttl: i64,

    /// Messages retained per topic
    #[arg(long, default_value = "10")]
    depth: usize,
}

/// Application state
struct AppState {
    store: TopicStore,
}

/// Query for fetching retained messages
#[derive(Debug, Deserialize)]
struct FetchQuery {
    #[serde(default)]
    after: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    info!(
        listen = %args.listen,
        ttl = args.ttl,
        depth = args.depth,
        "Starting message relay service"
    );

    let state = Arc::new(AppState {
        store: TopicStore::new(args.ttl, args.depth),
    });

    // Spawn cleanup task
    let cleanup_store = state.store.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
        loop {
            interval.tick().await;
            cleanup_store.cleanup();
        }
    });

    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&args.listen).await?;
    info!(address = %args.listen, "Listening");

    axum::serve(listener, app).await?;

    Ok(())
}

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/topics", get(list_topics))
        .route("/v1/topics/:topic", get(fetch_messages).post(publish_message))
        .route("/v1/topics/:topic/ws", get(websocket_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn error_response(status: StatusCode, message: String) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

/// Health check endpoint
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "msg-relay-svc",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// List topics with retained message counts
async fn list_topics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let topics: Vec<TopicInfo> = state
        .store
        .topics()
        .into_iter()
        .map(|(topic, messages)| TopicInfo { topic, messages })
        .collect();
    Json(topics)
}

/// Publish a message to a topic
async fn publish_message(
    State(state): State<Arc<AppState>>,
    Path(topic): Path<String>,
    Json(req): Json<PublishRequest>,
) -> Response {
    let payload = match req.decode() {
        Ok(p) => p,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
    };

    match state.store.publish(&topic, payload) {
        Ok(message) => {
            info!(topic = %topic, seq = message.seq, "Message published");
            Json(PublishResponse {
                seq: message.seq,
                id: message.id,
            })
            .into_response()
        }
        Err(e) => error_response(StatusCode::BAD_REQUEST, e.to_string()),
    }
}

/// Fetch retained messages after a sequence number
async fn fetch_messages(
    State(state): State<Arc<AppState>>,
    Path(topic): Path<String>,
    Query(query): Query<FetchQuery>,
) -> Response {
    match state.store.since(&topic, query.after) {
        Ok(messages) => Json(FetchResponse {
            messages: messages.iter().map(Envelope::from).collect(),
        })
        .into_response(),
        Err(e) => error_response(StatusCode::BAD_REQUEST, e.to_string()),
    }
}

/// WebSocket subscription to a topic
async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(topic): Path<String>,
) -> Response {
    if let Err(e) = validate_topic(&topic) {
        return error_response(StatusCode::BAD_REQUEST, e.to_string());
    }
    // subscribe before the handshake completes so no publish is missed
    let live = state.store.subscribe();
    ws.on_upgrade(move |socket| handle_websocket(socket, live, topic))
}

async fn handle_websocket(
    socket: axum::extract::ws::WebSocket,
    mut live: broadcast::Receiver<TopicMessage>,
    topic: String,
) {
    use axum::extract::ws::Message;
    use futures_util::{SinkExt, StreamExt};

    let (mut sender, mut receiver) = socket.split();

    info!(topic = %topic, "Subscriber connected");

    loop {
        tokio::select! {
            published = live.recv() => match published {
                Ok(message) if message.topic == topic => {
                    let text = match serde_json::to_string(&Envelope::from(&message)) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!(error = %e, "Failed to encode envelope");
                            continue;
                        }
                    };
                    if sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(topic = %topic, skipped, "Subscriber lagged");
                }
                Err(RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(error = %e, "WebSocket error");
                    break;
                }
            },
        }
    }

    info!(topic = %topic, "Subscriber disconnected");
}

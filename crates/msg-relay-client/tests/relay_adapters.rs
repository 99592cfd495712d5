//! Relay adapters exercised against a live in-process relay.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use elgamal_core::bus::{ParamFeed, ResultSink, StubEncryptService};
use elgamal_core::{DomainParameters, Participant, ParticipantConfig, ResultMessage, SecretSampler};
use msg_relay::{Envelope, PublishRequest, PublishResponse, TopicMessage, TopicStore};
use msg_relay_client::{RelayClient, TopicSink};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};

const PARAMS: DomainParameters = DomainParameters { p: 467, a: 2 };
const PARAMS_TOPIC: &str = "elgamal_params";
const RESULT_TOPIC: &str = "elgamal_result";

#[derive(Clone)]
struct Relay {
    store: TopicStore,
    shutdown: watch::Receiver<bool>,
}

/// Running relay; sending `true` on `shutdown` closes every subscription
struct TestRelay {
    url: String,
    store: TopicStore,
    shutdown: watch::Sender<bool>,
}

async fn start_relay() -> TestRelay {
    let store = TopicStore::default();
    let (shutdown, shutdown_rx) = watch::channel(false);
    let relay = Relay {
        store: store.clone(),
        shutdown: shutdown_rx,
    };

    let app = Router::new()
        .route("/v1/topics/:topic", post(publish))
        .route("/v1/topics/:topic/ws", get(subscribe))
        .with_state(relay);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestRelay {
        url: format!("http://{}", addr),
        store,
        shutdown,
    }
}

async fn publish(
    State(relay): State<Relay>,
    Path(topic): Path<String>,
    Json(req): Json<PublishRequest>,
) -> Json<PublishResponse> {
    let message = relay.store.publish(&topic, req.decode().unwrap()).unwrap();
    Json(PublishResponse {
        seq: message.seq,
        id: message.id,
    })
}

async fn subscribe(
    ws: WebSocketUpgrade,
    State(relay): State<Relay>,
    Path(topic): Path<String>,
) -> Response {
    let live = relay.store.subscribe();
    ws.on_upgrade(move |socket| forward(socket, topic, live, relay.shutdown))
}

async fn forward(
    mut socket: WebSocket,
    topic: String,
    mut live: broadcast::Receiver<TopicMessage>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                let _ = socket.send(Message::Close(None)).await;
                break;
            }
            published = live.recv() => match published {
                Ok(message) if message.topic == topic => {
                    let text = serde_json::to_string(&Envelope::from(&message)).unwrap();
                    if socket.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(_) => break,
            },
        }
    }
}

async fn recv_within<F: ParamFeed>(feed: &mut F) -> Option<DomainParameters> {
    tokio::time::timeout(Duration::from_secs(5), feed.recv())
        .await
        .expect("feed stalled")
        .unwrap()
}

#[tokio::test]
async fn test_subscription_skips_garbage_and_ends_on_close() {
    let relay = start_relay().await;
    let client = RelayClient::new(&relay.url);
    let mut feed = client
        .subscribe::<DomainParameters>(PARAMS_TOPIC)
        .await
        .unwrap();

    // valid JSON of the wrong shape, then bytes that are not JSON at all
    client
        .publish(PARAMS_TOPIC, &serde_json::json!({ "hello": "world" }))
        .await
        .unwrap();
    relay.store.publish(PARAMS_TOPIC, b"not json".to_vec()).unwrap();
    // other topics are not delivered
    client
        .publish(RESULT_TOPIC, &DomainParameters::new(11, 2))
        .await
        .unwrap();
    client.publish(PARAMS_TOPIC, &PARAMS).await.unwrap();

    assert_eq!(recv_within(&mut feed).await, Some(PARAMS));

    relay.shutdown.send(true).unwrap();
    assert_eq!(recv_within(&mut feed).await, None);
}

#[tokio::test]
async fn test_topic_sink_publishes_result_json() {
    let relay = start_relay().await;
    let sink = TopicSink::new(RelayClient::new(&relay.url), RESULT_TOPIC);

    sink.publish(&ResultMessage { data: -7 }).await.unwrap();
    sink.publish(&ResultMessage { data: 42 }).await.unwrap();

    let stored = relay.store.since(RESULT_TOPIC, 0).unwrap();
    let payloads: Vec<serde_json::Value> = stored
        .iter()
        .map(|m| serde_json::from_slice(&m.payload).unwrap())
        .collect();
    assert_eq!(
        payloads,
        vec![
            serde_json::json!({ "data": -7 }),
            serde_json::json!({ "data": 42 }),
        ]
    );
}

#[tokio::test]
async fn test_topic_sink_reports_unreachable_relay() {
    // port 9 (discard) is not expected to serve HTTP
    let sink = TopicSink::new(RelayClient::new("http://127.0.0.1:9"), RESULT_TOPIC);
    assert!(sink.publish(&ResultMessage { data: 1 }).await.is_err());
}

#[tokio::test]
async fn test_participant_round_over_relay() {
    let relay = start_relay().await;
    let client = RelayClient::new(&relay.url);
    let feed = client
        .subscribe::<DomainParameters>(PARAMS_TOPIC)
        .await
        .unwrap();
    let sink = TopicSink::new(client.clone(), RESULT_TOPIC);

    let stub = Arc::new(StubEncryptService::new(PARAMS, vec![123]));
    let config = ParticipantConfig::new(1).unwrap();
    let participant =
        Participant::with_sampler(config, stub.clone(), sink, SecretSampler::with_seed(3));
    let task = tokio::spawn(participant.run(feed));

    client.publish(PARAMS_TOPIC, &PARAMS).await.unwrap();

    let summary = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("participant stalled")
        .unwrap()
        .unwrap();
    assert!(summary.state.finished);
    assert_eq!(summary.results[0].x, 123);
    assert_eq!(stub.request_count(), 1);

    let stored = relay.store.since(RESULT_TOPIC, 0).unwrap();
    let message: ResultMessage = serde_json::from_slice(&stored[0].payload).unwrap();
    assert_eq!(message, ResultMessage { data: 123 });
}

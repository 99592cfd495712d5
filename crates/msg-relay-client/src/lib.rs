//! Message Relay Client
//!
//! Client side of the relay service plus the HTTP encryption-service client.
//! Implements the participant's boundary traits: [`TopicSubscription`] as the
//! parameter feed, [`TopicSink`] as the result sink and
//! [`HttpEncryptService`] as the encrypt request/response exchange.

use elgamal_core::bus::{async_trait, EncryptService, ParamFeed, ResultSink};
use elgamal_core::{
    DomainParameters, EncryptRequest, EncryptResponse, Error, Result, ResultMessage,
};
use futures_util::StreamExt;
use msg_relay::{Envelope, PublishRequest, PublishResponse};
use reqwest::Client;
use serde::{de::DeserializeOwned, Serialize};
use std::marker::PhantomData;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, instrument, warn};

/// Interval between readiness polls
const PROBE_INTERVAL: Duration = Duration::from_millis(100);

fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| Error::Serialization(e.to_string()))
}

fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| Error::Deserialization(e.to_string()))
}

/// Build the WebSocket subscription URL for a topic
pub fn subscription_url(base: &str, topic: &str) -> String {
    let base = base.trim_end_matches('/');
    let ws_base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        base.to_string()
    };
    format!("{}/v1/topics/{}/ws", ws_base, topic)
}

/// HTTP-based relay client
#[derive(Clone)]
pub struct RelayClient {
    /// HTTP client
    client: Client,
    /// Relay service URL
    url: String,
    /// Request timeout
    timeout: Duration,
}

impl RelayClient {
    /// Create a new relay client
    pub fn new(url: &str) -> Self {
        Self {
            client: Client::new(),
            url: url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Publish a JSON document to a topic, returning its sequence number
    #[instrument(skip(self, message))]
    pub async fn publish<T: Serialize>(&self, topic: &str, message: &T) -> Result<u64> {
        let req = PublishRequest::new(&serialize(message)?);

        let response = self
            .client
            .post(format!("{}/v1/topics/{}", self.url, topic))
            .json(&req)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| Error::Relay(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::Relay(format!(
                "POST failed with status: {}",
                response.status()
            )));
        }

        let published: PublishResponse = response
            .json()
            .await
            .map_err(|e| Error::Deserialization(e.to_string()))?;

        debug!(seq = published.seq, "Message published");
        Ok(published.seq)
    }

    /// Open a push subscription to a topic
    #[instrument(skip(self))]
    pub async fn subscribe<T: DeserializeOwned>(&self, topic: &str) -> Result<TopicSubscription<T>> {
        let url = subscription_url(&self.url, topic);
        let (stream, _) = tokio::time::timeout(self.timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| Error::Timeout(format!("subscription to {}", topic)))?
            .map_err(|e| Error::Relay(e.to_string()))?;

        debug!(url = %url, "Subscribed");
        Ok(TopicSubscription {
            topic: topic.to_string(),
            stream,
            _marker: PhantomData,
        })
    }
}

fn decode_envelope<T: DeserializeOwned>(envelope: &Envelope) -> Result<T> {
    let payload = envelope
        .decode_payload()
        .map_err(|e| Error::Deserialization(e.to_string()))?;
    deserialize(&payload)
}

/// Live stream of messages on one topic
pub struct TopicSubscription<T> {
    topic: String,
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> TopicSubscription<T> {
    /// Next decodable message; `None` once the socket closes.
    ///
    /// Frames that fail to decode are logged and skipped.
    pub async fn next_message(&mut self) -> Result<Option<T>> {
        while let Some(frame) = self.stream.next().await {
            let text = match frame.map_err(|e| Error::Relay(e.to_string()))? {
                Message::Text(text) => text,
                Message::Close(_) => return Ok(None),
                _ => continue,
            };

            match parse_frame(&text) {
                Ok(message) => return Ok(Some(message)),
                Err(e) => warn!(topic = %self.topic, error = %e, "Skipping undecodable message"),
            }
        }
        Ok(None)
    }
}

fn parse_frame<T: DeserializeOwned>(text: &str) -> Result<T> {
    let envelope: Envelope = deserialize(text.as_bytes())?;
    decode_envelope(&envelope)
}

#[async_trait]
impl ParamFeed for TopicSubscription<DomainParameters> {
    async fn recv(&mut self) -> Result<Option<DomainParameters>> {
        self.next_message().await
    }
}

/// Result sink publishing to a relay topic
pub struct TopicSink {
    relay: RelayClient,
    topic: String,
}

impl TopicSink {
    pub fn new(relay: RelayClient, topic: &str) -> Self {
        Self {
            relay,
            topic: topic.to_string(),
        }
    }
}

#[async_trait]
impl ResultSink for TopicSink {
    async fn publish(&self, message: &ResultMessage) -> Result<()> {
        self.relay.publish(&self.topic, message).await.map(|_| ())
    }
}

/// HTTP client for the remote encryption service
pub struct HttpEncryptService {
    client: Client,
    name: String,
    url: String,
    timeout: Duration,
}

impl HttpEncryptService {
    /// Create a client for the service `name` served at `url`
    pub fn new(name: &str, url: &str) -> Self {
        Self {
            client: Client::new(),
            name: name.to_string(),
            url: url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Set request timeout for encrypt calls
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn is_healthy(&self, timeout: Duration) -> bool {
        match self
            .client
            .get(format!("{}/health", self.url))
            .timeout(timeout)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(service = %self.name, error = %e, "Health probe failed");
                false
            }
        }
    }
}

#[async_trait]
impl EncryptService for HttpEncryptService {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self), fields(service = %self.name))]
    async fn wait_ready(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return false;
            }
            if self.is_healthy(deadline - now).await {
                return true;
            }

            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return false;
            }
            tokio::time::sleep(PROBE_INTERVAL.min(remaining)).await;
        }
    }

    #[instrument(skip(self), fields(service = %self.name))]
    async fn encrypt(&self, request: EncryptRequest) -> Result<EncryptResponse> {
        let response = self
            .client
            .post(format!("{}/v1/encrypt", self.url))
            .json(&request)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| Error::RequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::RequestFailed(format!(
                "{} returned status: {}",
                self.name,
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| Error::RequestFailed(format!("invalid response: {}", e)))
    }
}

//! Message Relay Library
//!
//! Topic-based publish/subscribe store backing the relay service. Each topic
//! keeps a bounded, sequence-numbered history with per-message expiry, and
//! every publish is fanned out to live subscribers.

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Relay error types
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Invalid topic name: {0}")]
    InvalidTopic(String),
    #[error("Invalid message format: {0}")]
    InvalidFormat(String),
}

pub type Result<T> = std::result::Result<T, RelayError>;

/// Default message TTL in seconds
pub const DEFAULT_TTL_SECONDS: i64 = 3600;

/// Default number of messages retained per topic
pub const DEFAULT_DEPTH: usize = 10;

const SUBSCRIBER_CAPACITY: usize = 256;

/// Check a topic name against `[A-Za-z0-9_./-]+`
pub fn validate_topic(topic: &str) -> Result<()> {
    let valid = !topic.is_empty()
        && topic
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '/' | '-'));
    if valid {
        Ok(())
    } else {
        Err(RelayError::InvalidTopic(topic.to_string()))
    }
}

/// Message retained on a topic
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicMessage {
    /// Topic name
    pub topic: String,
    /// Per-topic sequence number, starting at 1
    pub seq: u64,
    /// Unique message ID
    pub id: Uuid,
    /// Message payload
    pub payload: Vec<u8>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Expiration timestamp
    pub expires_at: DateTime<Utc>,
}

#[derive(Default)]
struct TopicLog {
    next_seq: u64,
    messages: VecDeque<TopicMessage>,
}

/// Topic message store
#[derive(Clone)]
pub struct TopicStore {
    /// Retained history per topic
    topics: Arc<DashMap<String, TopicLog>>,
    /// Live fan-out of every publish
    live: broadcast::Sender<TopicMessage>,
    /// Default TTL in seconds
    ttl_seconds: i64,
    /// Messages retained per topic
    depth: usize,
}

impl TopicStore {
    /// Create a new topic store
    pub fn new(ttl_seconds: i64, depth: usize) -> Self {
        let (live, _) = broadcast::channel(SUBSCRIBER_CAPACITY);
        Self {
            topics: Arc::new(DashMap::new()),
            live,
            ttl_seconds,
            depth: depth.max(1),
        }
    }

    /// Publish a payload, returning the stored message
    pub fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<TopicMessage> {
        validate_topic(topic)?;

        let now = Utc::now();
        let message = {
            let mut log = self.topics.entry(topic.to_string()).or_default();
            log.next_seq += 1;

            let message = TopicMessage {
                topic: topic.to_string(),
                seq: log.next_seq,
                id: Uuid::new_v4(),
                payload,
                created_at: now,
                expires_at: now + chrono::Duration::seconds(self.ttl_seconds),
            };

            log.messages.push_back(message.clone());
            while log.messages.len() > self.depth {
                log.messages.pop_front();
            }
            message
        };

        // no subscribers is fine
        let _ = self.live.send(message.clone());
        Ok(message)
    }

    /// Retained messages with `seq > after`, oldest first
    pub fn since(&self, topic: &str, after: u64) -> Result<Vec<TopicMessage>> {
        validate_topic(topic)?;

        Ok(self
            .topics
            .get(topic)
            .map(|log| {
                log.messages
                    .iter()
                    .filter(|m| m.seq > after)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Topic names with their retained message counts
    pub fn topics(&self) -> Vec<(String, usize)> {
        let mut topics: Vec<_> = self
            .topics
            .iter()
            .map(|entry| (entry.key().clone(), entry.messages.len()))
            .collect();
        topics.sort();
        topics
    }

    /// Subscribe to every future publish on any topic
    pub fn subscribe(&self) -> broadcast::Receiver<TopicMessage> {
        self.live.subscribe()
    }

    /// Remove expired messages
    pub fn cleanup(&self) {
        let now = Utc::now();
        for mut log in self.topics.iter_mut() {
            log.messages.retain(|m| m.expires_at > now);
        }
    }
}

impl Default for TopicStore {
    fn default() -> Self {
        Self::new(DEFAULT_TTL_SECONDS, DEFAULT_DEPTH)
    }
}

/// Request to publish a message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishRequest {
    /// Base64 encoded payload
    pub payload: String,
}

impl PublishRequest {
    pub fn new(payload: &[u8]) -> Self {
        Self {
            payload: STANDARD.encode(payload),
        }
    }

    pub fn decode(&self) -> Result<Vec<u8>> {
        STANDARD
            .decode(&self.payload)
            .map_err(|e| RelayError::InvalidFormat(format!("Invalid base64: {}", e)))
    }
}

/// Response to a publish
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishResponse {
    pub seq: u64,
    pub id: Uuid,
}

/// Message as sent over HTTP and WebSocket
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub topic: String,
    pub seq: u64,
    pub id: Uuid,
    /// Base64 encoded payload
    pub payload: String,
    pub created_at: DateTime<Utc>,
}

impl Envelope {
    pub fn decode_payload(&self) -> Result<Vec<u8>> {
        STANDARD
            .decode(&self.payload)
            .map_err(|e| RelayError::InvalidFormat(format!("Invalid base64: {}", e)))
    }
}

impl From<&TopicMessage> for Envelope {
    fn from(message: &TopicMessage) -> Self {
        Self {
            topic: message.topic.clone(),
            seq: message.seq,
            id: message.id,
            payload: STANDARD.encode(&message.payload),
            created_at: message.created_at,
        }
    }
}

/// Response to a topic fetch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchResponse {
    pub messages: Vec<Envelope>,
}

/// Topic listing entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicInfo {
    pub topic: String,
    pub messages: usize,
}

//! Boundary traits between the participant and its messaging substrate

use crate::types::{DomainParameters, EncryptRequest, EncryptResponse, ResultMessage};
use crate::Result;
use std::time::Duration;

pub use ::async_trait::async_trait;

/// Push-delivered stream of domain parameters
#[async_trait]
pub trait ParamFeed: Send {
    /// Wait for the next notification; `None` once the feed is closed
    async fn recv(&mut self) -> Result<Option<DomainParameters>>;
}

/// Output channel for decrypted results
#[async_trait]
pub trait ResultSink: Send + Sync {
    /// Publish one round's result
    async fn publish(&self, message: &ResultMessage) -> Result<()>;
}

/// Request/response contract with the remote encryption service
#[async_trait]
pub trait EncryptService: Send + Sync {
    /// Service name used in diagnostics
    fn name(&self) -> &str;

    /// Wait up to `timeout` for the service to become reachable
    async fn wait_ready(&self, timeout: Duration) -> bool;

    /// Exchange a public key for a ciphertext pair
    async fn encrypt(&self, request: EncryptRequest) -> Result<EncryptResponse>;
}

/// In-memory adapters for testing
pub mod memory;

pub use memory::{param_channel, result_channel, MemoryParamFeed, MemoryResultSink, StubEncryptService};

//! In-memory adapters for local runs and tests

use super::{async_trait, EncryptService, ParamFeed, ResultSink};
use crate::elgamal;
use crate::types::{DomainParameters, EncryptRequest, EncryptResponse, ResultMessage};
use crate::{Error, Result};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify, Semaphore};

/// Parameter feed backed by a tokio channel
pub struct MemoryParamFeed {
    rx: mpsc::Receiver<DomainParameters>,
}

/// Create a parameter channel; dropping every sender closes the feed
pub fn param_channel(capacity: usize) -> (mpsc::Sender<DomainParameters>, MemoryParamFeed) {
    let (tx, rx) = mpsc::channel(capacity);
    (tx, MemoryParamFeed { rx })
}

#[async_trait]
impl ParamFeed for MemoryParamFeed {
    async fn recv(&mut self) -> Result<Option<DomainParameters>> {
        Ok(self.rx.recv().await)
    }
}

/// Result sink that forwards every message to a channel
#[derive(Clone)]
pub struct MemoryResultSink {
    tx: mpsc::UnboundedSender<ResultMessage>,
}

/// Create a result sink and the receiver observing it
pub fn result_channel() -> (MemoryResultSink, mpsc::UnboundedReceiver<ResultMessage>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (MemoryResultSink { tx }, rx)
}

#[async_trait]
impl ResultSink for MemoryResultSink {
    async fn publish(&self, message: &ResultMessage) -> Result<()> {
        self.tx
            .send(*message)
            .map_err(|_| Error::Relay("result receiver dropped".into()))
    }
}

/// Encryption service stand-in that really encrypts chosen plaintexts.
///
/// Request `i` (0-based) is answered with `plaintexts[i % len]` encrypted under
/// ephemeral `k + i`, so a correct participant recovers the plaintexts in
/// order.
pub struct StubEncryptService {
    name: String,
    params: DomainParameters,
    k: u64,
    plaintexts: Vec<u64>,
    available: AtomicBool,
    failures: AtomicUsize,
    received: DashMap<usize, EncryptRequest>,
    requested: Notify,
    gate: Option<Arc<Semaphore>>,
}

impl StubEncryptService {
    /// Create a stub answering with `plaintexts` in rotation
    pub fn new(params: DomainParameters, plaintexts: Vec<u64>) -> Self {
        Self {
            name: "elgamal_service".to_string(),
            params,
            k: 3,
            plaintexts,
            available: AtomicBool::new(true),
            failures: AtomicUsize::new(0),
            received: DashMap::new(),
            requested: Notify::new(),
            gate: None,
        }
    }

    /// Set the counterparty's base ephemeral exponent
    pub fn with_ephemeral(mut self, k: u64) -> Self {
        self.k = k;
        self
    }

    /// Hold every response until [`release`](Self::release) grants it
    pub fn holding(mut self) -> Self {
        self.gate = Some(Arc::new(Semaphore::new(0)));
        self
    }

    /// Let `count` held responses through
    pub fn release(&self, count: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(count);
        }
    }

    /// Toggle the readiness probe result
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Make the next `count` requests fail
    pub fn fail_next(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }

    /// Number of requests received so far
    pub fn request_count(&self) -> usize {
        self.received.len()
    }

    /// The `index`-th request received
    pub fn request(&self, index: usize) -> Option<EncryptRequest> {
        self.received.get(&index).map(|entry| *entry.value())
    }

    /// Wait until at least `count` requests have arrived
    pub async fn wait_for_requests(&self, count: usize) {
        loop {
            let notified = self.requested.notified();
            if self.request_count() >= count {
                return;
            }
            notified.await;
        }
    }

    fn plaintext(&self, index: usize) -> u64 {
        if self.plaintexts.is_empty() {
            return index as u64 + 1;
        }
        self.plaintexts[index % self.plaintexts.len()]
    }
}

#[async_trait]
impl EncryptService for StubEncryptService {
    fn name(&self) -> &str {
        &self.name
    }

    async fn wait_ready(&self, timeout: Duration) -> bool {
        if self.available.load(Ordering::SeqCst) {
            return true;
        }
        tokio::time::sleep(timeout).await;
        self.available.load(Ordering::SeqCst)
    }

    async fn encrypt(&self, request: EncryptRequest) -> Result<EncryptResponse> {
        let index = self.received.len();
        self.received.insert(index, request);
        self.requested.notify_waiters();

        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(Error::RequestFailed(format!(
                "{} rejected request {}",
                self.name, index
            )));
        }

        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|e| Error::RequestFailed(e.to_string()))?
                .forget();
        }

        let DomainParameters { p, a } = self.params;
        Ok(elgamal::encrypt(
            a,
            request.public_key,
            p,
            self.k + index as u64,
            self.plaintext(index),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_param_channel() {
        let (tx, mut feed) = param_channel(4);
        tx.send(DomainParameters::new(467, 2)).await.unwrap();
        drop(tx);

        assert_eq!(feed.recv().await.unwrap(), Some(DomainParameters::new(467, 2)));
        assert_eq!(feed.recv().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_result_channel() {
        let (sink, mut rx) = result_channel();
        sink.publish(&ResultMessage { data: -7 }).await.unwrap();
        assert_eq!(rx.recv().await, Some(ResultMessage { data: -7 }));

        drop(rx);
        assert!(sink.publish(&ResultMessage { data: 1 }).await.is_err());
    }

    #[tokio::test]
    async fn test_stub_failures_and_availability() {
        let stub = StubEncryptService::new(DomainParameters::new(467, 2), vec![9]);
        stub.fail_next(1);

        let request = EncryptRequest { public_key: 4 };
        assert!(matches!(
            stub.encrypt(request).await,
            Err(Error::RequestFailed(_))
        ));
        assert!(stub.encrypt(request).await.is_ok());
        assert_eq!(stub.request_count(), 2);
        assert_eq!(stub.request(1), Some(request));

        stub.set_available(false);
        assert!(!stub.wait_ready(Duration::from_millis(5)).await);
        stub.set_available(true);
        assert!(stub.wait_ready(Duration::from_millis(5)).await);
    }

    #[tokio::test]
    async fn test_stub_holds_until_released() {
        let stub = Arc::new(StubEncryptService::new(DomainParameters::new(467, 2), vec![9]).holding());

        let worker = {
            let stub = stub.clone();
            tokio::spawn(async move { stub.encrypt(EncryptRequest { public_key: 4 }).await })
        };

        stub.wait_for_requests(1).await;
        assert!(!worker.is_finished());

        stub.release(1);
        let response = worker.await.unwrap().unwrap();
        assert_ne!(response.y1, 0);
    }
}

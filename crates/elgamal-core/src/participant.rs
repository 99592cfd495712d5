//! Async participant actor
//!
//! A single task owns the [`RoundMachine`] and serializes every transition.
//! The encrypt call runs on a spawned task; its `JoinHandle` is the pending
//! continuation, selected against the parameter feed so notifications keep
//! being drained (and ignored) while a round is in flight.

use crate::bus::{EncryptService, ParamFeed, ResultSink};
use crate::config::ParticipantConfig;
use crate::protocol::{Ignored, RoundMachine};
use crate::rng::SecretSampler;
use crate::types::{DecryptedResult, DomainParameters, EncryptResponse, RoundState};
use crate::{Error, Result};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

type Continuation = JoinHandle<Result<EncryptResponse>>;

/// Summary returned when the participant stops
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Results in round order
    pub results: Vec<DecryptedResult>,
    /// Final counter and flags
    pub state: RoundState,
}

/// ElGamal participant bound to an encryption service and a result sink
pub struct Participant<S, K> {
    machine: RoundMachine,
    service: Arc<S>,
    sink: K,
    config: ParticipantConfig,
    results: Vec<DecryptedResult>,
}

impl<S, K> Participant<S, K>
where
    S: EncryptService + 'static,
    K: ResultSink,
{
    /// Create a participant with an entropy-seeded sampler
    pub fn new(config: ParticipantConfig, service: Arc<S>, sink: K) -> Self {
        Self::with_sampler(config, service, sink, SecretSampler::from_entropy())
    }

    /// Create a participant with an explicit sampler
    pub fn with_sampler(
        config: ParticipantConfig,
        service: Arc<S>,
        sink: K,
        sampler: SecretSampler,
    ) -> Self {
        Self {
            machine: RoundMachine::new(config.rounds, sampler),
            service,
            sink,
            config,
            results: Vec::new(),
        }
    }

    /// Current counter and flags
    pub fn state(&self) -> RoundState {
        self.machine.state()
    }

    /// Consume the feed until it closes, or until completion when
    /// `exit_on_complete` is set. Feed errors are logged and do not stop the
    /// participant.
    pub async fn run<F: ParamFeed>(mut self, mut feed: F) -> Result<RunSummary> {
        info!(
            service = self.service.name(),
            rounds = self.config.rounds,
            "ElGamal participant started"
        );

        let mut pending: Option<Continuation> = None;

        loop {
            if self.machine.is_complete() && self.config.exit_on_complete {
                break;
            }

            tokio::select! {
                biased;

                joined = async {
                    match pending.as_mut() {
                        Some(handle) => handle.await,
                        None => std::future::pending().await,
                    }
                } => {
                    pending = None;
                    let outcome = joined.unwrap_or_else(|e| Err(Error::RequestFailed(e.to_string())));
                    self.handle_response(outcome).await;
                }

                params = feed.recv() => match params {
                    Ok(Some(params)) => {
                        if let Some(handle) = self.handle_params(params).await {
                            pending = Some(handle);
                        }
                    }
                    Ok(None) => {
                        debug!("Parameter feed closed");
                        break;
                    }
                    Err(e) => error!(error = %e, "Failed to receive parameters"),
                },
            }
        }

        if let Some(handle) = pending {
            warn!("Stopping with a request still in flight");
            handle.abort();
        }

        Ok(RunSummary {
            results: self.results,
            state: self.machine.state(),
        })
    }

    /// Parameter notification entry point. Returns the continuation when a
    /// request was dispatched.
    async fn handle_params(&mut self, params: DomainParameters) -> Option<Continuation> {
        let prepared = match self.machine.prepare(&params) {
            Ok(Ok(prepared)) => prepared,
            Ok(Err(Ignored::InFlight | Ignored::Complete)) => return None,
            Err(e) => {
                error!(p = params.p, a = params.a, error = %e, "Rejected parameters");
                return None;
            }
        };

        if !self.service.wait_ready(self.config.probe_timeout).await {
            let e = Error::ServiceUnavailable(self.service.name().to_string());
            warn!(round = prepared.round, error = %e, "Service not available yet");
            return None;
        }

        let request = match self.machine.dispatch(prepared) {
            Ok(request) => request,
            Err(e) => {
                error!(error = %e, "Failed to dispatch request");
                return None;
            }
        };

        let service = self.service.clone();
        Some(tokio::spawn(async move { service.encrypt(request).await }))
    }

    /// Response entry point
    async fn handle_response(&mut self, outcome: Result<EncryptResponse>) {
        let output = match self.machine.on_response(outcome) {
            Ok(output) => output,
            Err(e) => {
                error!(round = self.machine.round_index() + 1, error = %e, "Service call failed");
                return;
            }
        };

        let message = output.result.to_message();
        match self.sink.publish(&message).await {
            Ok(()) => info!(
                round = output.result.round,
                x = output.result.x,
                data = message.data,
                "Result published"
            ),
            Err(e) => error!(round = output.result.round, error = %e, "Failed to publish result"),
        }
        self.results.push(output.result);

        if output.completed {
            info!(rounds = self.machine.budget(), "Task complete: all rounds finished");
        }
    }
}

//! Round protocol state machine
//!
//! The machine is synchronous and owns no I/O. A parameter notification is
//! handled in two steps so the caller can probe the encryption service in
//! between: [`RoundMachine::prepare`] validates and samples, then
//! [`RoundMachine::dispatch`] commits the round to `AwaitingResponse` and
//! yields the request to send. [`RoundMachine::on_response`] consumes the
//! pending round context exactly once.

use crate::elgamal;
use crate::rng::SecretSampler;
use crate::types::{
    DecryptedResult, DomainParameters, EncryptRequest, EncryptResponse, EphemeralSecret,
    RoundState,
};
use crate::{Error, Result};
use tracing::{debug, info};

/// Context captured when a request is dispatched
#[derive(Debug)]
pub struct PendingRound {
    /// 1-based round number
    pub round: u32,
    pub p: u64,
    n: EphemeralSecret,
}

/// Protocol phase
#[derive(Debug)]
pub enum Phase {
    /// No round in flight, rounds remaining
    Idle,
    /// Request dispatched, response pending
    AwaitingResponse(PendingRound),
    /// Round budget exhausted
    Complete,
}

/// A validated round that has not been dispatched yet
///
/// Dropping it abandons the round without touching the machine.
#[derive(Debug)]
pub struct PreparedRound {
    pub round: u32,
    pub params: DomainParameters,
    /// Public value `a^n mod p`
    pub public_key: u64,
    n: EphemeralSecret,
}

/// Why a parameter notification did not start a round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ignored {
    /// A request is already in flight
    InFlight,
    /// All rounds are done
    Complete,
}

/// Outcome of a successful response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundOutput {
    pub result: DecryptedResult,
    /// The round budget is now exhausted
    pub completed: bool,
}

/// State machine for the ElGamal participant
pub struct RoundMachine {
    phase: Phase,
    round_index: u32,
    budget: u32,
    sampler: SecretSampler,
}

impl RoundMachine {
    /// Create a machine for `budget` rounds
    pub fn new(budget: u32, sampler: SecretSampler) -> Self {
        let phase = if budget == 0 {
            Phase::Complete
        } else {
            Phase::Idle
        };
        Self {
            phase,
            round_index: 0,
            budget,
            sampler,
        }
    }

    /// Current phase
    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    /// Completed rounds
    pub fn round_index(&self) -> u32 {
        self.round_index
    }

    /// Configured round budget
    pub fn budget(&self) -> u32 {
        self.budget
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.phase, Phase::Complete)
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(self.phase, Phase::AwaitingResponse(_))
    }

    /// Snapshot of counter and flags
    pub fn state(&self) -> RoundState {
        RoundState {
            round_index: self.round_index,
            in_flight: self.is_in_flight(),
            finished: self.is_complete(),
        }
    }

    /// Handle a parameter notification up to (not including) dispatch.
    ///
    /// Returns `Ok(Err(Ignored))` while a round is in flight or after
    /// completion, and `Err(InvalidParameters)` for `p < 3`. No state changes
    /// in any case; only the sampler advances.
    pub fn prepare(
        &mut self,
        params: &DomainParameters,
    ) -> Result<std::result::Result<PreparedRound, Ignored>> {
        match self.phase {
            Phase::Complete => {
                debug!(p = params.p, a = params.a, "All rounds complete, ignoring parameters");
                return Ok(Err(Ignored::Complete));
            }
            Phase::AwaitingResponse(ref pending) => {
                debug!(round = pending.round, "Request in flight, ignoring parameters");
                return Ok(Err(Ignored::InFlight));
            }
            Phase::Idle => {}
        }

        params.validate()?;

        let n = self.sampler.secret_exponent(params.p)?;
        let public_key = elgamal::public_value(params.a, &n, params.p);

        Ok(Ok(PreparedRound {
            round: self.round_index + 1,
            params: *params,
            public_key,
            n,
        }))
    }

    /// Commit a prepared round and return the request to send.
    pub fn dispatch(&mut self, prepared: PreparedRound) -> Result<EncryptRequest> {
        if !matches!(self.phase, Phase::Idle) {
            return Err(Error::Internal(
                "dispatch requires an idle round machine".into(),
            ));
        }
        if prepared.round != self.round_index + 1 {
            return Err(Error::Internal(format!(
                "prepared round {} is stale (next round is {})",
                prepared.round,
                self.round_index + 1
            )));
        }

        let PreparedRound {
            round,
            params,
            public_key,
            n,
        } = prepared;

        info!(
            round,
            p = params.p,
            a = params.a,
            b = public_key,
            "Dispatching encrypt request"
        );

        self.phase = Phase::AwaitingResponse(PendingRound {
            round,
            p: params.p,
            n,
        });

        Ok(EncryptRequest { public_key })
    }

    /// Handle the outcome of the in-flight request.
    ///
    /// On failure the pending secret is discarded and the machine returns to
    /// `Idle` with the round counter unchanged.
    pub fn on_response(&mut self, outcome: Result<EncryptResponse>) -> Result<RoundOutput> {
        let pending = match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::AwaitingResponse(pending) => pending,
            other => {
                self.phase = other;
                return Err(Error::UnexpectedResponse);
            }
        };

        let response = match outcome {
            Ok(response) => response,
            Err(Error::RequestFailed(reason)) => return Err(Error::RequestFailed(reason)),
            Err(e) => return Err(Error::RequestFailed(e.to_string())),
        };

        let x = elgamal::decrypt(pending.p, &pending.n, &response);
        self.round_index += 1;

        let completed = self.round_index >= self.budget;
        if completed {
            self.phase = Phase::Complete;
        }

        info!(
            round = pending.round,
            y1 = response.y1,
            y2 = response.y2,
            x,
            "Round decrypted"
        );

        Ok(RoundOutput {
            result: DecryptedResult {
                round: pending.round,
                x,
            },
            completed,
        })
    }
}

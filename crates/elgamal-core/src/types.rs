//! Core types for the ElGamal round protocol

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Public domain parameters published by the parameter source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainParameters {
    /// Prime modulus
    pub p: u64,
    /// Generator
    pub a: u64,
}

impl DomainParameters {
    /// Create a new parameter set (unvalidated)
    pub fn new(p: u64, a: u64) -> Self {
        Self { p, a }
    }

    /// Check that the modulus leaves a non-empty secret range `[1, p-2]`
    pub fn validate(&self) -> Result<()> {
        if self.p < 3 {
            return Err(Error::InvalidParameters { p: self.p });
        }
        Ok(())
    }
}

/// Per-round secret exponent `n`
///
/// Wiped on drop and never printed.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct EphemeralSecret(u64);

impl EphemeralSecret {
    /// Wrap a sampled exponent
    pub fn new(n: u64) -> Self {
        Self(n)
    }

    /// Raw exponent value
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Debug for EphemeralSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EphemeralSecret(..)")
    }
}

/// Request sent to the encryption service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptRequest {
    /// `a^n mod p`
    pub public_key: u64,
}

/// Ciphertext pair returned by the encryption service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptResponse {
    pub y1: u64,
    pub y2: u64,
}

/// Plaintext recovered in one round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecryptedResult {
    /// 1-based round number
    pub round: u32,
    /// Recovered plaintext
    pub x: u64,
}

impl DecryptedResult {
    /// The plaintext reinterpreted as two's-complement `i64`.
    ///
    /// Values above `i64::MAX` wrap; downstream consumers rely on this.
    pub fn as_signed(&self) -> i64 {
        self.x as i64
    }

    /// Wire message for the result topic
    pub fn to_message(&self) -> ResultMessage {
        ResultMessage {
            data: self.as_signed(),
        }
    }
}

/// Result published on the output topic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultMessage {
    pub data: i64,
}

/// Snapshot of the round counter and flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RoundState {
    /// Completed rounds
    pub round_index: u32,
    /// A request has been dispatched and not yet handled
    pub in_flight: bool,
    /// Round budget exhausted
    pub finished: bool,
}

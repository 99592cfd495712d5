//! # ElGamal Core
//!
//! Protocol core for a participant in a two-party ElGamal exchange.
//!
//! Each round the participant:
//! - receives public domain parameters `(p, a)`
//! - samples a secret `n` in `[1, p-2]` and sends `b = a^n mod p` to the
//!   encryption service
//! - receives `(y1, y2)` and recovers `x = y2 * y1^(p-1-n) mod p`
//!
//! At most one request is in flight at a time; failed or unavailable rounds
//! are retried on the next parameter notification until the round budget is
//! exhausted.
//!
//! ## Example
//!
//! ```rust,ignore
//! use elgamal_core::{bus, Participant, ParticipantConfig};
//!
//! let participant = Participant::new(ParticipantConfig::default(), service, sink);
//! let summary = participant.run(feed).await?;
//! ```

pub mod arith;
pub mod bus;
pub mod config;
pub mod elgamal;
pub mod error;
pub mod participant;
pub mod protocol;
pub mod rng;
pub mod types;

pub use config::ParticipantConfig;
pub use error::{Error, Result};
pub use participant::{Participant, RunSummary};
pub use protocol::RoundMachine;
pub use rng::SecretSampler;
pub use types::{
    DecryptedResult, DomainParameters, EncryptRequest, EncryptResponse, EphemeralSecret,
    ResultMessage, RoundState,
};

/// Default round budget
pub const DEFAULT_ROUNDS: u32 = 5;

/// Default bounded wait for the encryption service
pub const DEFAULT_PROBE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(1);

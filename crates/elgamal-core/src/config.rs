//! Participant configuration

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings for one participant run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantConfig {
    /// Round budget
    pub rounds: u32,

    /// Bounded wait for the encryption service before each request
    pub probe_timeout: Duration,

    /// Stop once the budget is exhausted instead of lingering on the feed
    pub exit_on_complete: bool,
}

impl ParticipantConfig {
    /// Create a configuration for `rounds` rounds
    pub fn new(rounds: u32) -> Result<Self> {
        if rounds == 0 {
            return Err(Error::InvalidConfig(
                "Round budget must be at least 1".into(),
            ));
        }

        Ok(Self {
            rounds,
            ..Self::default()
        })
    }

    /// Set the readiness probe timeout
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Keep consuming (and ignoring) notifications after completion
    pub fn lingering(mut self) -> Self {
        self.exit_on_complete = false;
        self
    }
}

impl Default for ParticipantConfig {
    fn default() -> Self {
        Self {
            rounds: crate::DEFAULT_ROUNDS,
            probe_timeout: crate::DEFAULT_PROBE_TIMEOUT,
            exit_on_complete: true,
        }
    }
}

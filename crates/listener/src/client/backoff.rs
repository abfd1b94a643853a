//! Reconnect schedule.
//!
//! Every consecutive failure doubles the wait, starting from twice the base
//! delay and capped at the maximum. Once the attempt budget is spent the
//! schedule gives up until it is reset by a successful connection.
//!
//! The policy also bounds how long an open stream may stay silent. The
//! server sends a heartbeat every 30 seconds, so the default allows one
//! missed beat before the connection is treated as dead.

use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_attempts: u32,
    /// Longest silence tolerated on an open stream.
    pub idle_timeout_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            max_attempts: 5,
            idle_timeout_ms: 60_000,
        }
    }
}

impl ReconnectPolicy {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms.max(1))
    }

    /// Wait before reconnect number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1_u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let millis = self
            .base_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms);
        Duration::from_millis(millis)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconnect {
    After(Duration),
    GiveUp,
}

#[derive(Debug, Clone)]
pub struct Backoff {
    policy: ReconnectPolicy,
    attempts: u32,
}

impl Backoff {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
        }
    }

    /// Consecutive failures since the last reset.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn on_failure(&mut self) -> Reconnect {
        if self.attempts >= self.policy.max_attempts {
            return Reconnect::GiveUp;
        }
        self.attempts += 1;
        Reconnect::After(self.policy.delay_for(self.attempts))
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}

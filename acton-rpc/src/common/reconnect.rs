/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */

//! Reconnect policy with exponential backoff.
//!
//! A dropped connection is re-opened with the same configuration. Attempts
//! are counted in a sliding time window; once the window holds
//! `max_attempts` attempts the supervisor gives up and the client or server
//! is closed for good.
//!
//! # Example
//!
//! ```rust,ignore
//! let config = RpcConfig::new("rpc", "localhost").with_reconnect(ReconnectConfig {
//!     enabled: true,
//!     max_attempts: 3,
//!     window_secs: 30,
//!     initial_backoff_ms: 100,
//!     max_backoff_ms: 5000,
//!     backoff_multiplier: 2.0,
//! });
//! ```

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Reconnect policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Re-open the connection when it drops.
    ///
    /// When disabled, a dropped connection closes the client or server.
    pub enabled: bool,

    /// Maximum reconnect attempts within the window. `0` means unlimited.
    pub max_attempts: u32,

    /// Sliding window, in seconds, over which attempts are counted.
    pub window_secs: u64,

    /// Delay before the first attempt after a drop.
    pub initial_backoff_ms: u64,

    /// Upper bound for the delay.
    pub max_backoff_ms: u64,

    /// Growth factor applied per consecutive failed attempt.
    pub backoff_multiplier: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 10,
            window_secs: 60,
            initial_backoff_ms: 100,
            max_backoff_ms: 30_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl ReconnectConfig {
    /// A policy that never reconnects.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Get the window duration.
    #[must_use]
    pub const fn window_duration(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    /// Get the maximum backoff duration.
    #[must_use]
    pub const fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

/// Counts reconnect attempts and computes the backoff before each one.
#[derive(Debug)]
pub struct ReconnectLimiter {
    config: ReconnectConfig,
    attempts: Vec<Instant>,
    consecutive: usize,
}

impl ReconnectLimiter {
    /// Create a limiter for `config`.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempts: Vec::new(),
            consecutive: 0,
        }
    }

    /// Whether another attempt is allowed.
    ///
    /// # Errors
    ///
    /// Returns [`ReconnectLimitExceeded`] when reconnection is disabled or the
    /// window already holds `max_attempts` attempts.
    pub fn can_reconnect(&mut self) -> Result<(), ReconnectLimitExceeded> {
        if !self.config.enabled {
            return Err(self.exceeded());
        }
        if self.config.max_attempts == 0 {
            return Ok(());
        }
        self.prune_expired();
        if self.attempts.len() >= self.config.max_attempts as usize {
            Err(self.exceeded())
        } else {
            Ok(())
        }
    }

    /// Records an attempt and returns how long to wait before making it.
    pub fn record_attempt(&mut self) -> Duration {
        self.attempts.push(Instant::now());
        let backoff = self.peek_backoff();
        self.consecutive += 1;
        backoff
    }

    /// Resets the backoff after a successful reconnect. The window is kept.
    pub const fn reset_consecutive(&mut self) {
        self.consecutive = 0;
    }

    /// The backoff the next attempt would get.
    #[must_use]
    pub fn peek_backoff(&self) -> Duration {
        #[allow(clippy::cast_precision_loss)]
        let backoff_ms = self.config.initial_backoff_ms as f64
            * self
                .config
                .backoff_multiplier
                .powi(i32::try_from(self.consecutive).unwrap_or(i32::MAX));
        #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation, clippy::cast_precision_loss)]
        let capped_ms = backoff_ms.min(self.config.max_backoff_ms as f64).max(0.0) as u64;
        Duration::from_millis(capped_ms)
    }

    /// Attempts currently inside the window.
    #[must_use]
    pub fn attempts_in_window(&self) -> usize {
        self.attempts.len()
    }

    fn prune_expired(&mut self) {
        let now = Instant::now();
        let window = self.config.window_duration();
        self.attempts.retain(|&at| now.duration_since(at) < window);
    }

    fn exceeded(&self) -> ReconnectLimitExceeded {
        ReconnectLimitExceeded {
            attempts: self.attempts.len(),
            max_attempts: if self.config.enabled { self.config.max_attempts } else { 0 },
            window_secs: self.config.window_secs,
        }
    }
}

/// Returned when no further reconnect attempt is allowed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectLimitExceeded {
    /// Attempts in the current window.
    pub attempts: usize,
    /// Allowed attempts; `0` when reconnection is disabled.
    pub max_attempts: u32,
    /// Window size in seconds.
    pub window_secs: u64,
}

impl std::fmt::Display for ReconnectLimitExceeded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.max_attempts == 0 {
            write!(f, "reconnection is disabled")
        } else {
            write!(
                f,
                "reconnect limit exceeded: {} attempts (max {}) in {} seconds",
                self.attempts, self.max_attempts, self.window_secs
            )
        }
    }
}

impl std::error::Error for ReconnectLimitExceeded {}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum DisconnectReason {
    /// `close()` was called or every handle was dropped.
    Requested,
    /// The broker connection dropped.
    Lost(String),
    /// The connection or its topology could not be set up.
    OpenFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_policy_never_reconnects() {
        let mut limiter = ReconnectLimiter::new(ReconnectConfig::disabled());
        let exceeded = limiter.can_reconnect().unwrap_err();
        assert_eq!(exceeded.to_string(), "reconnection is disabled");
    }

    #[test]
    fn zero_max_attempts_is_unlimited() {
        let mut limiter = ReconnectLimiter::new(ReconnectConfig {
            max_attempts: 0,
            ..ReconnectConfig::default()
        });
        for _ in 0..100 {
            limiter.record_attempt();
        }
        assert!(limiter.can_reconnect().is_ok());
    }
}

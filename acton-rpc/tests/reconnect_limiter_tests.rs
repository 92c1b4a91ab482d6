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

//! Integration tests for the reconnect limiter with exponential backoff.

use std::time::Duration;

use acton_rpc::{ReconnectConfig, ReconnectLimiter};

fn config(max_attempts: u32, max_backoff_ms: u64) -> ReconnectConfig {
    ReconnectConfig {
        enabled: true,
        max_attempts,
        window_secs: 60,
        initial_backoff_ms: 100,
        max_backoff_ms,
        backoff_multiplier: 2.0,
    }
}

/// Tests that the default reconnect config has sensible values.
#[test]
fn test_default_reconnect_config() {
    let config = ReconnectConfig::default();
    assert!(config.enabled);
    assert_eq!(config.max_attempts, 10);
    assert_eq!(config.window_secs, 60);
    assert_eq!(config.initial_backoff_ms, 100);
    assert_eq!(config.max_backoff_ms, 30_000);
    assert!((config.backoff_multiplier - 2.0).abs() < f64::EPSILON);
    assert_eq!(config.window_duration(), Duration::from_secs(60));
    assert_eq!(config.max_backoff(), Duration::from_secs(30));
}

/// Tests that the limiter allows attempts up to the limit and no more.
#[test]
fn test_limiter_allows_attempts_within_limit() {
    let mut limiter = ReconnectLimiter::new(config(3, 1_000));

    for _ in 0..3 {
        assert!(limiter.can_reconnect().is_ok());
        let _ = limiter.record_attempt();
    }

    let exceeded = limiter.can_reconnect().unwrap_err();
    assert_eq!(exceeded.attempts, 3);
    assert_eq!(exceeded.max_attempts, 3);
    assert_eq!(
        exceeded.to_string(),
        "reconnect limit exceeded: 3 attempts (max 3) in 60 seconds"
    );
}

/// Tests that backoff grows exponentially.
#[test]
fn test_backoff_grows_exponentially() {
    let mut limiter = ReconnectLimiter::new(config(10, 10_000));

    assert_eq!(limiter.record_attempt(), Duration::from_millis(100));
    assert_eq!(limiter.record_attempt(), Duration::from_millis(200));
    assert_eq!(limiter.record_attempt(), Duration::from_millis(400));
    assert_eq!(limiter.peek_backoff(), Duration::from_millis(800));
}

/// Tests that backoff never exceeds the configured maximum.
#[test]
fn test_backoff_is_capped() {
    let mut limiter = ReconnectLimiter::new(config(0, 500));

    let backoffs: Vec<Duration> = (0..8).map(|_| limiter.record_attempt()).collect();

    assert_eq!(backoffs[3], Duration::from_millis(500));
    assert!(backoffs.iter().all(|backoff| *backoff <= Duration::from_millis(500)));
}

/// Tests that a successful reconnect resets the backoff but not the window.
#[test]
fn test_reset_restarts_backoff_keeps_window() {
    let mut limiter = ReconnectLimiter::new(config(5, 10_000));
    limiter.record_attempt();
    limiter.record_attempt();

    limiter.reset_consecutive();

    assert_eq!(limiter.peek_backoff(), Duration::from_millis(100));
    assert_eq!(limiter.attempts_in_window(), 2);
}

/// Tests that attempts age out of the window.
#[test]
fn test_attempts_expire_from_window() {
    let mut limiter = ReconnectLimiter::new(ReconnectConfig {
        window_secs: 0,
        ..config(1, 1_000)
    });
    limiter.record_attempt();
    assert!(limiter.can_reconnect().is_ok());
}

/// Tests that a disabled policy never allows an attempt.
#[test]
fn test_disabled_reconnect_config() {
    let config = ReconnectConfig::disabled();
    assert!(!config.enabled);

    let mut limiter = ReconnectLimiter::new(config);
    assert!(limiter.can_reconnect().is_err());
}

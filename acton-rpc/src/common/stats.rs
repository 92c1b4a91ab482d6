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

use std::sync::atomic::{AtomicUsize, Ordering};

/// Counters kept by an [`RpcClient`](crate::RpcClient).
#[derive(Debug, Default)]
pub struct ClientStats {
    /// Requests published to the broker.
    pub requests_sent: AtomicUsize,
    /// Responses delivered to a waiting caller.
    pub responses_matched: AtomicUsize,
    /// Responses whose caller had already given up.
    pub late_responses: AtomicUsize,
    /// Responses with an unknown correlation id.
    pub orphan_responses: AtomicUsize,
    /// Requests whose publish failed.
    pub publish_failures: AtomicUsize,
    /// Pending requests removed by the expiry sweep.
    pub evicted: AtomicUsize,
    /// Requests currently pending.
    pub pending: AtomicUsize,
    /// Connection sessions that completed topology setup.
    pub sessions: AtomicUsize,
}

impl ClientStats {
    /// Get the number of requests published.
    #[must_use]
    pub fn requests_sent(&self) -> usize {
        self.requests_sent.load(Ordering::Relaxed)
    }

    /// Get the number of responses matched to a waiting caller.
    #[must_use]
    pub fn responses_matched(&self) -> usize {
        self.responses_matched.load(Ordering::Relaxed)
    }

    /// Get the number of responses that arrived after their caller gave up.
    #[must_use]
    pub fn late_responses(&self) -> usize {
        self.late_responses.load(Ordering::Relaxed)
    }

    /// Get the number of orphan responses dropped.
    #[must_use]
    pub fn orphan_responses(&self) -> usize {
        self.orphan_responses.load(Ordering::Relaxed)
    }

    /// Get the number of failed publishes.
    #[must_use]
    pub fn publish_failures(&self) -> usize {
        self.publish_failures.load(Ordering::Relaxed)
    }

    /// Get the number of evicted requests.
    #[must_use]
    pub fn evicted(&self) -> usize {
        self.evicted.load(Ordering::Relaxed)
    }

    /// Get the number of pending requests.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Relaxed)
    }

    /// Get the number of completed sessions, reconnects included.
    #[must_use]
    pub fn sessions(&self) -> usize {
        self.sessions.load(Ordering::Relaxed)
    }
}

/// Counters kept by an [`RpcServer`](crate::RpcServer).
#[derive(Debug, Default)]
pub struct ServerStats {
    /// Requests delivered to a method.
    pub deliveries_received: AtomicUsize,
    /// Responses published.
    pub responses_published: AtomicUsize,
    /// Deliveries acknowledged.
    pub acks: AtomicUsize,
    /// Method invocations that returned an error or panicked.
    pub handler_failures: AtomicUsize,
    /// Methods whose queue could not be declared, bound or consumed.
    pub method_setup_failures: AtomicUsize,
    /// Connection sessions that completed topology setup.
    pub sessions: AtomicUsize,
}

impl ServerStats {
    /// Get the number of deliveries received.
    #[must_use]
    pub fn deliveries_received(&self) -> usize {
        self.deliveries_received.load(Ordering::Relaxed)
    }

    /// Get the number of responses published.
    #[must_use]
    pub fn responses_published(&self) -> usize {
        self.responses_published.load(Ordering::Relaxed)
    }

    /// Get the number of acknowledged deliveries.
    #[must_use]
    pub fn acks(&self) -> usize {
        self.acks.load(Ordering::Relaxed)
    }

    /// Get the number of failed method invocations.
    #[must_use]
    pub fn handler_failures(&self) -> usize {
        self.handler_failures.load(Ordering::Relaxed)
    }

    /// Get the number of methods that failed setup.
    #[must_use]
    pub fn method_setup_failures(&self) -> usize {
        self.method_setup_failures.load(Ordering::Relaxed)
    }

    /// Get the number of completed sessions, reconnects included.
    #[must_use]
    pub fn sessions(&self) -> usize {
        self.sessions.load(Ordering::Relaxed)
    }
}

pub(crate) fn bump(counter: &AtomicUsize) {
    counter.fetch_add(1, Ordering::Relaxed);
}

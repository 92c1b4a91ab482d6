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

//! Broker transports.
//!
//! *   [`AmqpConnector`] (feature `amqp`): RabbitMQ and other AMQP 0-9-1 brokers, through `lapin`.
//! *   [`MemoryBroker`]: an in-process broker with fault injection, used by tests and demos.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

#[cfg(feature = "amqp")]
pub use amqp::AmqpConnector;
pub use memory::{BrokerEvent, MemoryBroker};

#[cfg(feature = "amqp")]
mod amqp;
mod memory;

/// Records why a connection went away and wakes whoever waits for it.
#[derive(Debug, Clone, Default)]
pub(crate) struct ConnectionMonitor {
    token: CancellationToken,
    reason: Arc<Mutex<Option<String>>>,
}

impl ConnectionMonitor {
    /// Marks the connection lost. Only the first reason is kept.
    pub(crate) fn mark_lost(&self, reason: impl Into<String>) {
        {
            let mut slot = self.reason.lock();
            if slot.is_none() {
                *slot = Some(reason.into());
            }
        }
        self.token.cancel();
    }

    pub(crate) fn is_lost(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the connection is marked lost.
    pub(crate) async fn lost(&self) -> String {
        self.token.cancelled().await;
        self.reason.lock().clone().unwrap_or_else(|| "connection lost".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_reason_wins() {
        let monitor = ConnectionMonitor::default();
        monitor.mark_lost("heartbeat missed");
        monitor.mark_lost("socket closed");
        assert!(monitor.is_lost());
        assert_eq!(monitor.lost().await, "heartbeat missed");
    }
}

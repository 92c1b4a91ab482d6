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

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::channel::mpsc;
use futures::StreamExt;
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::common::config::BrokerConfig;
use crate::message::{Delivery, OutboundMessage, RpcError};
use crate::traits::{AckMode, BrokerChannel, BrokerConnection, BrokerConnector, DeliveryStream, QueueOptions};
use crate::transport::ConnectionMonitor;

/// One entry of the [`MemoryBroker`] operation journal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerEvent {
    /// A client opened a connection.
    ConnectionOpened {
        /// Broker-assigned connection number.
        connection: u64,
    },
    /// A connection was dropped by the broker.
    ConnectionLost {
        /// Broker-assigned connection number.
        connection: u64,
        /// Reason handed to [`MemoryBroker::drop_connections`].
        reason: String,
    },
    /// A client closed its connection.
    ConnectionClosed {
        /// Broker-assigned connection number.
        connection: u64,
    },
    /// A message was accepted for routing.
    Published {
        /// Target exchange; empty for the default exchange.
        exchange: String,
        /// Routing key of the publish.
        routing_key: String,
        /// The message's `correlation_id` property.
        correlation_id: Option<String>,
    },
    /// A manually acknowledged delivery was acked.
    Acked {
        /// Tag of the acked delivery.
        delivery_tag: u64,
        /// The delivered message's `correlation_id` property.
        correlation_id: Option<String>,
    },
}

/// An in-process broker with AMQP-like routing and acknowledgement.
///
/// Cloning yields another handle to the same broker. Connections made through
/// [`BrokerConnector::connect`] share its exchanges and queues, so a client
/// and a server started against clones of one `MemoryBroker` talk to each
/// other.
///
/// Semantics:
/// *   Direct exchanges; the default exchange `""` routes to the queue named by
///     the routing key. Unroutable messages are dropped.
/// *   Queue names requested as `""` are generated as `amq.gen-N`.
/// *   Deliveries are spread over a queue's consumers round-robin.
/// *   When a connection goes away its exclusive queues are deleted, its
///     consumers' streams end, auto-delete queues left without consumers are
///     deleted, and its unacknowledged deliveries are requeued as redelivered.
///
/// Faults can be injected with [`drop_connections`](Self::drop_connections),
/// [`refuse_connections`](Self::refuse_connections),
/// [`fail_publishes_to`](Self::fail_publishes_to),
/// [`delay_publishes_to`](Self::delay_publishes_to),
/// [`fail_declares_of`](Self::fail_declares_of) and [`inject`](Self::inject).
#[derive(Debug, Clone, Default)]
pub struct MemoryBroker {
    state: Arc<Mutex<BrokerState>>,
}

#[derive(Debug, Default)]
struct BrokerState {
    next_connection: u64,
    next_queue: u64,
    next_tag: u64,
    connections: HashMap<u64, ConnectionMonitor>,
    exchanges: HashSet<String>,
    queues: HashMap<String, QueueState>,
    unacked: HashMap<u64, Unacked>,
    refusal: Option<String>,
    failing_publishes: HashSet<String>,
    delayed_publishes: HashMap<String, Duration>,
    failing_declares: HashSet<String>,
    journal: Vec<BrokerEvent>,
}

#[derive(Debug)]
struct QueueState {
    owner: Option<u64>,
    auto_delete: bool,
    bindings: HashSet<(String, String)>,
    ready: VecDeque<StoredMessage>,
    consumers: Vec<Consumer>,
    next_consumer: usize,
}

#[derive(Debug, Clone)]
struct StoredMessage {
    routing_key: String,
    redelivered: bool,
    message: OutboundMessage,
}

#[derive(Debug)]
struct Consumer {
    connection: u64,
    ack_mode: AckMode,
    sender: mpsc::UnboundedSender<Result<Delivery, RpcError>>,
}

#[derive(Debug)]
struct Unacked {
    connection: u64,
    queue: String,
    stored: StoredMessage,
}

impl MemoryBroker {
    /// Creates an empty broker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops every open connection, as a broker restart or network failure would.
    pub fn drop_connections(&self, reason: &str) {
        let mut state = self.state.lock();
        let ids: Vec<u64> = state.connections.keys().copied().collect();
        warn!(count = ids.len(), reason, "Dropping memory broker connections");
        for id in ids {
            state.detach(id, Some(reason));
        }
    }

    /// Makes every later connection attempt fail with `reason`.
    pub fn refuse_connections(&self, reason: &str) {
        self.state.lock().refusal = Some(reason.to_string());
    }

    /// Accepts connections again after [`refuse_connections`](Self::refuse_connections).
    pub fn accept_connections(&self) {
        self.state.lock().refusal = None;
    }

    /// Makes every publish with `routing_key` fail.
    pub fn fail_publishes_to(&self, routing_key: &str) {
        self.state.lock().failing_publishes.insert(routing_key.to_string());
    }

    /// Clears all publish failures.
    pub fn clear_publish_failures(&self) {
        self.state.lock().failing_publishes.clear();
    }

    /// Makes every publish with `routing_key` stall for `delay` before it is routed.
    pub fn delay_publishes_to(&self, routing_key: &str, delay: Duration) {
        self.state.lock().delayed_publishes.insert(routing_key.to_string(), delay);
    }

    /// Makes every declaration of `queue` fail.
    pub fn fail_declares_of(&self, queue: &str) {
        self.state.lock().failing_declares.insert(queue.to_string());
    }

    /// Places `message` directly on `queue`, bypassing exchanges.
    ///
    /// Returns `false` if the queue does not exist.
    pub fn inject(&self, queue: &str, message: OutboundMessage) -> bool {
        let mut state = self.state.lock();
        let Some(target) = state.queues.get_mut(queue) else {
            return false;
        };
        target.ready.push_back(StoredMessage {
            routing_key: queue.to_string(),
            redelivered: false,
            message,
        });
        state.pump(queue);
        true
    }

    /// Everything that has happened on the broker so far, oldest first.
    #[must_use]
    pub fn journal(&self) -> Vec<BrokerEvent> {
        self.state.lock().journal.clone()
    }

    /// Whether `queue` currently exists.
    #[must_use]
    pub fn has_queue(&self, queue: &str) -> bool {
        self.state.lock().queues.contains_key(queue)
    }

    /// Number of messages waiting on `queue` for a consumer.
    #[must_use]
    pub fn queue_depth(&self, queue: &str) -> usize {
        self.state.lock().queues.get(queue).map_or(0, |q| q.ready.len())
    }

    /// Number of consumers attached to `queue`.
    #[must_use]
    pub fn consumer_count(&self, queue: &str) -> usize {
        self.state.lock().queues.get(queue).map_or(0, |q| q.consumers.len())
    }

    /// Number of open connections.
    #[must_use]
    pub fn active_connections(&self) -> usize {
        self.state.lock().connections.len()
    }
}

impl BrokerState {
    fn ensure_open(&self, connection: u64) -> Result<(), RpcError> {
        if self.connections.contains_key(&connection) {
            Ok(())
        } else {
            Err(RpcError::Connection("connection is closed".to_string()))
        }
    }

    /// Removes a connection and everything it owned. `lost` marks an unrequested drop.
    fn detach(&mut self, connection: u64, lost: Option<&str>) {
        let Some(monitor) = self.connections.remove(&connection) else {
            return;
        };

        for queue in self.queues.values_mut() {
            queue.consumers.retain(|consumer| consumer.connection != connection);
        }

        let tags: Vec<u64> = self
            .unacked
            .iter()
            .filter(|(_, unacked)| unacked.connection == connection)
            .map(|(tag, _)| *tag)
            .collect();
        let mut requeued = HashSet::new();
        // Newest first, so after the push_front calls the oldest is at the head.
        let mut returned: Vec<(u64, Unacked)> = tags
            .into_iter()
            .filter_map(|tag| self.unacked.remove(&tag).map(|unacked| (tag, unacked)))
            .collect();
        returned.sort_by_key(|(tag, _)| std::cmp::Reverse(*tag));
        for (_, mut unacked) in returned {
            if let Some(queue) = self.queues.get_mut(&unacked.queue) {
                unacked.stored.redelivered = true;
                queue.ready.push_front(unacked.stored);
                requeued.insert(unacked.queue);
            }
        }

        self.queues.retain(|name, queue| {
            let keep = queue.owner != Some(connection) && !(queue.auto_delete && queue.consumers.is_empty());
            if !keep {
                debug!(queue = %name, "Deleting queue of closed connection");
            }
            keep
        });

        match lost {
            Some(reason) => {
                self.journal.push(BrokerEvent::ConnectionLost {
                    connection,
                    reason: reason.to_string(),
                });
                monitor.mark_lost(reason);
            }
            None => self.journal.push(BrokerEvent::ConnectionClosed { connection }),
        }

        for queue in requeued {
            self.pump(&queue);
        }
    }

    /// Hands ready messages of `queue` to its consumers.
    fn pump(&mut self, queue_name: &str) {
        let Some(queue) = self.queues.get_mut(queue_name) else {
            return;
        };
        while !queue.ready.is_empty() && !queue.consumers.is_empty() {
            let index = queue.next_consumer % queue.consumers.len();
            let Some(stored) = queue.ready.pop_front() else {
                break;
            };
            self.next_tag += 1;
            let delivery_tag = self.next_tag;
            let consumer = &queue.consumers[index];
            let delivery = Delivery {
                delivery_tag,
                queue: queue_name.to_string(),
                routing_key: stored.routing_key.clone(),
                redelivered: stored.redelivered,
                correlation_id: stored.message.correlation_id.clone(),
                reply_to: stored.message.reply_to.clone(),
                body: stored.message.body.clone(),
            };
            if consumer.sender.unbounded_send(Ok(delivery)).is_err() {
                trace!(queue = queue_name, "Removing consumer whose stream was dropped");
                queue.consumers.remove(index);
                queue.ready.push_front(stored);
                continue;
            }
            if consumer.ack_mode == AckMode::Manual {
                self.unacked.insert(
                    delivery_tag,
                    Unacked {
                        connection: consumer.connection,
                        queue: queue_name.to_string(),
                        stored,
                    },
                );
            }
            queue.next_consumer = index + 1;
        }
    }
}

#[async_trait]
impl BrokerConnector for MemoryBroker {
    async fn connect(&self, _config: &BrokerConfig) -> Result<Box<dyn BrokerConnection>, RpcError> {
        let mut state = self.state.lock();
        if let Some(reason) = &state.refusal {
            return Err(RpcError::Connection(reason.clone()));
        }
        state.next_connection += 1;
        let id = state.next_connection;
        let monitor = ConnectionMonitor::default();
        state.connections.insert(id, monitor.clone());
        state.journal.push(BrokerEvent::ConnectionOpened { connection: id });
        debug!(connection = id, "Memory broker accepted connection");
        Ok(Box::new(MemoryConnection {
            id,
            state: Arc::clone(&self.state),
            monitor,
        }))
    }
}

struct MemoryConnection {
    id: u64,
    state: Arc<Mutex<BrokerState>>,
    monitor: ConnectionMonitor,
}

#[async_trait]
impl BrokerConnection for MemoryConnection {
    async fn open_channel(&self) -> Result<Box<dyn BrokerChannel>, RpcError> {
        self.state.lock().ensure_open(self.id)?;
        Ok(Box::new(MemoryChannel {
            connection: self.id,
            state: Arc::clone(&self.state),
        }))
    }

    async fn closed(&self) -> String {
        self.monitor.lost().await
    }

    async fn close(&self) -> Result<(), RpcError> {
        self.state.lock().detach(self.id, None);
        Ok(())
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.state.lock().detach(self.id, None);
    }
}

struct MemoryChannel {
    connection: u64,
    state: Arc<Mutex<BrokerState>>,
}

#[async_trait]
impl BrokerChannel for MemoryChannel {
    async fn declare_exchange(&self, exchange: &str) -> Result<(), RpcError> {
        let mut state = self.state.lock();
        state.ensure_open(self.connection)?;
        state.exchanges.insert(exchange.to_string());
        Ok(())
    }

    async fn declare_queue(&self, queue: &str, options: QueueOptions) -> Result<String, RpcError> {
        let mut state = self.state.lock();
        state.ensure_open(self.connection)?;
        if state.failing_declares.contains(queue) {
            return Err(RpcError::Topology(format!("declare of queue '{queue}' refused")));
        }
        let name = if queue.is_empty() {
            state.next_queue += 1;
            format!("amq.gen-{}", state.next_queue)
        } else {
            queue.to_string()
        };
        if let Some(existing) = state.queues.get(&name) {
            return match existing.owner {
                Some(owner) if owner != self.connection => {
                    Err(RpcError::Topology(format!("queue '{name}' is locked by another connection")))
                }
                _ => Ok(name),
            };
        }
        state.queues.insert(
            name.clone(),
            QueueState {
                owner: options.exclusive.then_some(self.connection),
                auto_delete: options.auto_delete,
                bindings: HashSet::new(),
                ready: VecDeque::new(),
                consumers: Vec::new(),
                next_consumer: 0,
            },
        );
        trace!(queue = %name, ?options, "Declared queue");
        Ok(name)
    }

    async fn bind_queue(&self, queue: &str, exchange: &str, routing_key: &str) -> Result<(), RpcError> {
        let mut state = self.state.lock();
        state.ensure_open(self.connection)?;
        if !state.exchanges.contains(exchange) {
            return Err(RpcError::Topology(format!("no exchange '{exchange}'")));
        }
        let Some(target) = state.queues.get_mut(queue) else {
            return Err(RpcError::Topology(format!("no queue '{queue}'")));
        };
        target.bindings.insert((exchange.to_string(), routing_key.to_string()));
        Ok(())
    }

    async fn consume(&self, queue: &str, ack_mode: AckMode) -> Result<DeliveryStream, RpcError> {
        let mut state = self.state.lock();
        state.ensure_open(self.connection)?;
        let Some(target) = state.queues.get_mut(queue) else {
            return Err(RpcError::Topology(format!("no queue '{queue}'")));
        };
        if matches!(target.owner, Some(owner) if owner != self.connection) {
            return Err(RpcError::Topology(format!("queue '{queue}' is locked by another connection")));
        }
        let (sender, receiver) = mpsc::unbounded();
        target.consumers.push(Consumer {
            connection: self.connection,
            ack_mode,
            sender,
        });
        state.pump(queue);
        Ok(receiver.boxed())
    }

    async fn publish(&self, exchange: &str, routing_key: &str, message: OutboundMessage) -> Result<(), RpcError> {
        let delay = self.state.lock().delayed_publishes.get(routing_key).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.lock();
        state.ensure_open(self.connection)?;
        if state.failing_publishes.contains(routing_key) {
            return Err(RpcError::Publish(format!("publish to '{routing_key}' refused")));
        }
        if !exchange.is_empty() && !state.exchanges.contains(exchange) {
            return Err(RpcError::Publish(format!("no exchange '{exchange}'")));
        }

        let binding = (exchange.to_string(), routing_key.to_string());
        let targets: Vec<String> = state
            .queues
            .iter()
            .filter(|(name, queue)| {
                if exchange.is_empty() {
                    name.as_str() == routing_key
                } else {
                    queue.bindings.contains(&binding)
                }
            })
            .map(|(name, _)| name.clone())
            .collect();

        state.journal.push(BrokerEvent::Published {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            correlation_id: message.correlation_id.clone(),
        });
        if targets.is_empty() {
            trace!(exchange, routing_key, "Dropping unroutable message");
        }
        for name in targets {
            if let Some(queue) = state.queues.get_mut(&name) {
                queue.ready.push_back(StoredMessage {
                    routing_key: routing_key.to_string(),
                    redelivered: false,
                    message: message.clone(),
                });
            }
            state.pump(&name);
        }
        Ok(())
    }

    async fn ack(&self, delivery_tag: u64) -> Result<(), RpcError> {
        let mut state = self.state.lock();
        state.ensure_open(self.connection)?;
        match state.unacked.get(&delivery_tag) {
            Some(unacked) if unacked.connection == self.connection => {}
            _ => return Err(RpcError::Connection(format!("unknown delivery tag {delivery_tag}"))),
        }
        if let Some(unacked) = state.unacked.remove(&delivery_tag) {
            state.journal.push(BrokerEvent::Acked {
                delivery_tag,
                correlation_id: unacked.stored.message.correlation_id,
            });
        }
        Ok(())
    }
}

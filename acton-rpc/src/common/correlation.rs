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

//! The client's correlation table and the session role that owns it.
//!
//! The table lives inside the client's supervisor task. Callers on other
//! tasks or threads never touch it; they send a [`ClientCommand`] through
//! the client's command channel and wait on the oneshot receiver they kept.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use crate::common::reconnect::DisconnectReason;
use crate::common::stats::{bump, ClientStats};
use crate::common::supervisor::{Session, SessionRole};
use crate::common::topology::{self, ReplyQueue};
use crate::message::{CorrelationId, Delivery, RequestEnvelope, RpcError};
use crate::traits::BrokerChannel;

/// Write-once completion slot of a pending request.
pub(crate) type ResponseSlot = oneshot::Sender<Result<Vec<u8>, RpcError>>;

/// A request on its way to the correlation table.
#[derive(Debug)]
pub(crate) struct PendingRequest {
    pub(crate) routing_key: String,
    pub(crate) payload: Vec<u8>,
    pub(crate) deadline: Instant,
    pub(crate) slot: ResponseSlot,
}

/// Messages accepted by the client task.
#[derive(Debug)]
pub(crate) enum ClientCommand {
    Submit(PendingRequest),
}

#[derive(Debug)]
struct PendingEntry {
    routing_key: String,
    deadline: Instant,
    slot: ResponseSlot,
}

/// In-flight requests keyed by correlation id.
#[derive(Debug)]
pub(crate) struct CorrelationTable {
    pending: HashMap<CorrelationId, PendingEntry>,
    max_pending: usize,
    stats: Arc<ClientStats>,
}

impl CorrelationTable {
    pub(crate) fn new(max_pending: usize, stats: Arc<ClientStats>) -> Self {
        Self {
            pending: HashMap::new(),
            max_pending,
            stats,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }

    fn fresh_id(&self) -> CorrelationId {
        loop {
            let id = CorrelationId::generate();
            if !self.pending.contains_key(&id) {
                return id;
            }
        }
    }

    fn update_pending(&self) {
        self.stats.pending.store(self.pending.len(), Ordering::Relaxed);
    }

    /// Records `request` under a fresh correlation id and publishes it.
    ///
    /// A failed publish removes the entry again and completes its slot with
    /// [`RpcError::Publish`]. Other entries are unaffected.
    pub(crate) async fn submit(
        &mut self,
        channel: &dyn BrokerChannel,
        exchange: &str,
        reply_to: &str,
        request: PendingRequest,
    ) {
        let PendingRequest {
            routing_key,
            payload,
            deadline,
            slot,
        } = request;

        if slot.is_closed() || deadline <= Instant::now() {
            trace!(routing_key = %routing_key, "Caller gave up before the request was published");
            return;
        }
        if self.pending.len() >= self.max_pending {
            warn!(routing_key = %routing_key, max_pending = self.max_pending, "Rejecting request, too many pending");
            let _ = slot.send(Err(RpcError::Backpressure(self.max_pending)));
            return;
        }

        let correlation_id = self.fresh_id();
        let envelope = RequestEnvelope::new(correlation_id.clone(), reply_to.to_string(), payload);
        self.pending.insert(
            correlation_id.clone(),
            PendingEntry {
                routing_key: routing_key.clone(),
                deadline,
                slot,
            },
        );
        self.update_pending();

        match channel.publish(exchange, &routing_key, envelope.into()).await {
            Ok(()) => {
                bump(&self.stats.requests_sent);
                trace!(%correlation_id, routing_key = %routing_key, "Request published");
            }
            Err(e) => {
                error!(%correlation_id, routing_key = %routing_key, error = %e, "Failed to publish request");
                bump(&self.stats.publish_failures);
                let error = match e {
                    RpcError::Publish(_) => e,
                    other => RpcError::Publish(other.to_string()),
                };
                if let Some(entry) = self.pending.remove(&correlation_id) {
                    let _ = entry.slot.send(Err(error));
                }
                self.update_pending();
            }
        }
    }

    /// Completes the pending request matching `delivery`, or drops it as an orphan.
    pub(crate) fn on_delivery(&mut self, delivery: Delivery) {
        let entry = delivery
            .correlation_id
            .as_deref()
            .and_then(|id| self.pending.remove(id));

        let Some(entry) = entry else {
            warn!(
                correlation_id = ?delivery.correlation_id,
                queue = %delivery.queue,
                "Dropping response with unknown correlation id"
            );
            bump(&self.stats.orphan_responses);
            return;
        };
        self.update_pending();

        if entry.slot.send(Ok(delivery.body)).is_ok() {
            bump(&self.stats.responses_matched);
            trace!(correlation_id = ?delivery.correlation_id, routing_key = %entry.routing_key, "Response matched");
        } else {
            debug!(
                correlation_id = ?delivery.correlation_id,
                routing_key = %entry.routing_key,
                "Response arrived after its caller gave up"
            );
            bump(&self.stats.late_responses);
        }
    }

    /// Removes entries whose deadline passed or whose caller went away.
    pub(crate) fn evict_expired(&mut self, now: Instant) -> usize {
        let before = self.pending.len();
        self.pending.retain(|correlation_id, entry| {
            let keep = entry.deadline > now && !entry.slot.is_closed();
            if !keep {
                trace!(%correlation_id, routing_key = %entry.routing_key, "Evicting expired request");
            }
            keep
        });
        let evicted = before - self.pending.len();
        if evicted > 0 {
            self.stats.evicted.fetch_add(evicted, Ordering::Relaxed);
            self.update_pending();
        }
        evicted
    }

    /// Completes every pending request with `error`.
    pub(crate) fn fail_all(&mut self, error: &RpcError) {
        for (_, entry) in self.pending.drain() {
            let _ = entry.slot.send(Err(error.clone()));
        }
        self.update_pending();
    }
}

/// The client side of a session: one reply queue, one correlation table.
pub(crate) struct ClientRole {
    table: CorrelationTable,
    commands: mpsc::Receiver<ClientCommand>,
    reply_queue: Arc<RwLock<Option<String>>>,
    stats: Arc<ClientStats>,
    exchange: String,
    sweep_interval: Duration,
}

impl ClientRole {
    pub(crate) fn new(
        commands: mpsc::Receiver<ClientCommand>,
        reply_queue: Arc<RwLock<Option<String>>>,
        stats: Arc<ClientStats>,
        exchange: String,
        max_pending: usize,
        sweep_interval: Duration,
    ) -> Self {
        Self {
            table: CorrelationTable::new(max_pending, Arc::clone(&stats)),
            commands,
            reply_queue,
            stats,
            exchange,
            sweep_interval,
        }
    }
}

#[async_trait]
impl SessionRole for ClientRole {
    const NAME: &'static str = "client";

    type Topology = ReplyQueue;

    async fn declare(&mut self, session: &Session) -> Result<ReplyQueue, RpcError> {
        topology::declare_reply_queue(session.channel.as_ref(), &self.exchange).await
    }

    fn session_started(&mut self, _session: &Session) {
        bump(&self.stats.sessions);
    }

    async fn serve(&mut self, session: &Session, topology: ReplyQueue, shutdown: &CancellationToken) -> DisconnectReason {
        let ReplyQueue { name, mut deliveries } = topology;
        *self.reply_queue.write() = Some(name.clone());

        let mut sweep = tokio::time::interval(self.sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let reason = loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break DisconnectReason::Requested,
                reason = session.connection.closed() => break DisconnectReason::Lost(reason),
                delivery = deliveries.next() => match delivery {
                    Some(Ok(delivery)) => self.table.on_delivery(delivery),
                    Some(Err(e)) => break DisconnectReason::Lost(e.to_string()),
                    None => break DisconnectReason::Lost("reply consumer ended".to_string()),
                },
                command = self.commands.recv() => match command {
                    Some(ClientCommand::Submit(request)) => {
                        self.table.submit(session.channel.as_ref(), &self.exchange, &name, request).await;
                    }
                    None => break DisconnectReason::Requested,
                },
                _ = sweep.tick() => {
                    self.table.evict_expired(Instant::now());
                }
            }
        };

        *self.reply_queue.write() = None;
        debug!(pending = self.table.len(), ?reason, "Client session ended");
        reason
    }

    async fn finish(&mut self) {
        self.commands.close();
        while let Ok(ClientCommand::Submit(request)) = self.commands.try_recv() {
            let _ = request.slot.send(Err(RpcError::Closed));
        }
        self.table.fail_all(&RpcError::Closed);
    }
}

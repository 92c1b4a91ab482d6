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

//! The server's dispatch table and the session role that drives it.
//!
//! Every method queue is consumed by the server's supervisor task. Each
//! delivery invokes its method synchronously with a fresh [`Responder`]. The
//! responder routes its settlement back into the same task, which publishes
//! the response to the caller's reply queue and only then acknowledges the
//! delivery.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::stream::SelectAll;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use crate::common::reconnect::DisconnectReason;
use crate::common::stats::{bump, ServerStats};
use crate::common::supervisor::{Session, SessionRole};
use crate::common::topology;
use crate::message::{Delivery, DeliveryContext, Responder, ResponseEnvelope, RpcError, Settlement};
use crate::traits::{DeliveryStream, RpcMethod};

/// Registered methods keyed by queue name.
pub(crate) type MethodTable = Arc<DashMap<String, Arc<dyn RpcMethod>>>;

/// The server side of a session.
pub(crate) struct ServerRole {
    methods: MethodTable,
    /// Queue names in registration order.
    queues: Vec<String>,
    settlements_tx: mpsc::UnboundedSender<Settlement>,
    settlements: mpsc::UnboundedReceiver<Settlement>,
    stats: Arc<ServerStats>,
    exchange: String,
    durable: bool,
}

impl ServerRole {
    pub(crate) fn new(
        methods: MethodTable,
        queues: Vec<String>,
        stats: Arc<ServerStats>,
        exchange: String,
        durable: bool,
    ) -> Self {
        let (settlements_tx, settlements) = mpsc::unbounded_channel();
        Self {
            methods,
            queues,
            settlements_tx,
            settlements,
            stats,
            exchange,
            durable,
        }
    }

    /// Invokes the method for `delivery`, containing errors and panics.
    fn dispatch(&self, session: &Session, delivery: Delivery) {
        bump(&self.stats.deliveries_received);
        let context = DeliveryContext::from_delivery(&delivery, session.id);
        let responder = Responder::new(context.clone(), self.settlements_tx.clone());

        let method = self.methods.get(&delivery.queue).map(|entry| Arc::clone(entry.value()));
        let Some(method) = method else {
            warn!(queue = %delivery.queue, "No method registered for queue");
            return;
        };

        trace!(
            queue = %delivery.queue,
            delivery_tag = delivery.delivery_tag,
            correlation_id = ?delivery.correlation_id,
            "Dispatching request"
        );
        let outcome = catch_unwind(AssertUnwindSafe(|| method.method(&context, &delivery.body, responder)));
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(queue = %delivery.queue, error = %e, "Method failed");
                bump(&self.stats.handler_failures);
            }
            Err(panic) => {
                error!(queue = %delivery.queue, panic = %panic_message(panic.as_ref()), "Method panicked");
                bump(&self.stats.handler_failures);
            }
        }
    }

    /// Publishes a response if there is one, then acknowledges.
    async fn settle(&self, session: &Session, settlement: Settlement) {
        let context = match settlement {
            Settlement::Respond { context, body } => {
                if context.session != session.id {
                    debug!(delivery_tag = context.delivery_tag(), "Discarding response from a previous connection");
                    return;
                }
                self.publish_response(session, &context, body).await;
                context
            }
            Settlement::Abandon { context } => {
                if context.session != session.id {
                    return;
                }
                debug!(
                    queue = %context.queue(),
                    delivery_tag = context.delivery_tag(),
                    "Method settled without a response"
                );
                context
            }
        };

        match session.channel.ack(context.delivery_tag()).await {
            Ok(()) => {
                bump(&self.stats.acks);
                trace!(delivery_tag = context.delivery_tag(), "Delivery acknowledged");
            }
            Err(e) => error!(delivery_tag = context.delivery_tag(), error = %e, "Failed to acknowledge delivery"),
        }
    }

    async fn publish_response(&self, session: &Session, context: &DeliveryContext, body: Vec<u8>) {
        let (Some(reply_to), Some(correlation_id)) = (context.reply_to(), context.correlation_id()) else {
            warn!(
                queue = %context.queue(),
                delivery_tag = context.delivery_tag(),
                "Request has no reply_to or correlation_id, dropping response"
            );
            return;
        };

        let envelope = ResponseEnvelope::new(correlation_id.clone(), body);
        match session.channel.publish("", reply_to, envelope.into()).await {
            Ok(()) => {
                bump(&self.stats.responses_published);
                trace!(%correlation_id, reply_to, "Response published");
            }
            Err(e) => error!(%correlation_id, reply_to, error = %e, "Failed to publish response"),
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[async_trait]
impl SessionRole for ServerRole {
    const NAME: &'static str = "server";

    type Topology = SelectAll<DeliveryStream>;

    async fn declare(&mut self, session: &Session) -> Result<SelectAll<DeliveryStream>, RpcError> {
        Ok(topology::declare_method_queues(
            session.channel.as_ref(),
            &self.exchange,
            &self.queues,
            self.durable,
            &self.stats,
        )
        .await)
    }

    fn session_started(&mut self, session: &Session) {
        bump(&self.stats.sessions);
        // Settlements still queued from an earlier connection carry stale tags.
        while let Ok(stale) = self.settlements.try_recv() {
            trace!(?stale, session = session.id, "Dropping settlement from a previous connection");
        }
    }

    async fn serve(
        &mut self,
        session: &Session,
        mut deliveries: SelectAll<DeliveryStream>,
        shutdown: &CancellationToken,
    ) -> DisconnectReason {
        let reason = loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break DisconnectReason::Requested,
                reason = session.connection.closed() => break DisconnectReason::Lost(reason),
                Some(settlement) = self.settlements.recv() => self.settle(session, settlement).await,
                delivery = deliveries.next(), if !deliveries.is_empty() => match delivery {
                    Some(Ok(delivery)) => self.dispatch(session, delivery),
                    Some(Err(e)) => break DisconnectReason::Lost(e.to_string()),
                    None => break DisconnectReason::Lost("method consumers ended".to_string()),
                },
            }
        };
        debug!(?reason, "Server session ended");
        reason
    }

    async fn finish(&mut self) {
        self.settlements.close();
    }
}

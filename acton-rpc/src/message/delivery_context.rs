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

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{trace, warn};

use crate::message::{CorrelationId, Delivery, RpcError};

/// Everything a server method knows about the delivery it is handling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryContext {
    /// Connection session the delivery arrived on. Tags are only valid within it.
    pub(crate) session: u64,
    delivery_tag: u64,
    queue: String,
    routing_key: String,
    redelivered: bool,
    correlation_id: Option<CorrelationId>,
    reply_to: Option<String>,
}

impl DeliveryContext {
    pub(crate) fn from_delivery(delivery: &Delivery, session: u64) -> Self {
        Self {
            session,
            delivery_tag: delivery.delivery_tag,
            queue: delivery.queue.clone(),
            routing_key: delivery.routing_key.clone(),
            redelivered: delivery.redelivered,
            correlation_id: delivery.correlation_id.clone().map(CorrelationId::from),
            reply_to: delivery.reply_to.clone(),
        }
    }

    /// Channel-scoped tag of the delivery.
    #[must_use]
    pub const fn delivery_tag(&self) -> u64 {
        self.delivery_tag
    }

    /// Queue the request was consumed from.
    #[must_use]
    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Routing key the request was published with.
    #[must_use]
    pub fn routing_key(&self) -> &str {
        &self.routing_key
    }

    /// Whether the broker delivered this request before.
    #[must_use]
    pub const fn redelivered(&self) -> bool {
        self.redelivered
    }

    /// Correlation id of the request, if the caller sent one.
    #[must_use]
    pub const fn correlation_id(&self) -> Option<&CorrelationId> {
        self.correlation_id.as_ref()
    }

    /// Reply queue of the request, if the caller sent one.
    #[must_use]
    pub fn reply_to(&self) -> Option<&str> {
        self.reply_to.as_deref()
    }
}

/// How a delivery was settled by its method.
#[derive(Debug)]
pub(crate) enum Settlement {
    /// Publish `body` to the caller, then acknowledge.
    Respond {
        context: DeliveryContext,
        body: Vec<u8>,
    },
    /// Acknowledge without publishing anything.
    Abandon { context: DeliveryContext },
}

/// The response callback handed to every method invocation.
///
/// A `Responder` settles exactly one delivery. Calling [`respond`](Self::respond)
/// publishes the response and then acknowledges the request; dropping the
/// responder without responding acknowledges the request and publishes nothing.
///
/// The responder is `Send`, so a method that has slow work to do can move it
/// into a spawned task and respond later instead of blocking the server's
/// event loop.
#[derive(Debug)]
pub struct Responder {
    context: DeliveryContext,
    settlements: Option<UnboundedSender<Settlement>>,
}

impl Responder {
    pub(crate) const fn new(context: DeliveryContext, settlements: UnboundedSender<Settlement>) -> Self {
        Self {
            context,
            settlements: Some(settlements),
        }
    }

    /// The delivery this responder settles.
    #[must_use]
    pub const fn context(&self) -> &DeliveryContext {
        &self.context
    }

    /// Publishes `body` as the response to this delivery.
    pub fn respond(mut self, body: impl Into<Vec<u8>>) {
        if let Some(settlements) = self.settlements.take() {
            trace!(delivery_tag = self.context.delivery_tag, "Queueing response");
            let settlement = Settlement::Respond {
                context: self.context.clone(),
                body: body.into(),
            };
            if settlements.send(settlement).is_err() {
                warn!(
                    delivery_tag = self.context.delivery_tag,
                    "Server stopped before the response could be published"
                );
            }
        }
    }

    /// Serializes `value` as JSON and publishes it as the response.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::Serialization`] if `value` cannot be serialized. The
    /// delivery is then acknowledged without a response.
    pub fn respond_json<T: Serialize + ?Sized>(self, value: &T) -> Result<(), RpcError> {
        let body = serde_json::to_vec(value)?;
        self.respond(body);
        Ok(())
    }
}

impl Drop for Responder {
    fn drop(&mut self) {
        if let Some(settlements) = self.settlements.take() {
            let _ = settlements.send(Settlement::Abandon {
                context: self.context.clone(),
            });
        }
    }
}

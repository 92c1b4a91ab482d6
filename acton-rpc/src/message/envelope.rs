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

use derive_new::new;

use crate::message::CorrelationId;

/// A request as published by a client.
///
/// Carries the correlation id of the pending call and the client's private
/// reply queue. The body is opaque; its encoding belongs to the caller and the
/// method that handles it.
#[derive(new, Debug, Clone, PartialEq, Eq)]
pub struct RequestEnvelope {
    /// Fresh id for this call.
    pub correlation_id: CorrelationId,
    /// Queue the response must be published to.
    pub reply_to: String,
    /// Serialized request.
    pub body: Vec<u8>,
}

/// A response as published by a server.
#[derive(new, Debug, Clone, PartialEq, Eq)]
pub struct ResponseEnvelope {
    /// Copied verbatim from the request.
    pub correlation_id: CorrelationId,
    /// Serialized response.
    pub body: Vec<u8>,
}

/// A message handed to a transport for publishing.
///
/// `correlation_id` and `reply_to` map onto the broker's message properties
/// of the same names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutboundMessage {
    /// The `correlation_id` property.
    pub correlation_id: Option<String>,
    /// The `reply_to` property.
    pub reply_to: Option<String>,
    /// Message body.
    pub body: Vec<u8>,
}

impl OutboundMessage {
    /// Creates a message carrying only a body.
    #[must_use]
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            correlation_id: None,
            reply_to: None,
            body: body.into(),
        }
    }

    /// Sets the `correlation_id` property.
    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Sets the `reply_to` property.
    #[must_use]
    pub fn with_reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }
}

impl From<RequestEnvelope> for OutboundMessage {
    fn from(envelope: RequestEnvelope) -> Self {
        Self {
            correlation_id: Some(envelope.correlation_id.into()),
            reply_to: Some(envelope.reply_to),
            body: envelope.body,
        }
    }
}

impl From<ResponseEnvelope> for OutboundMessage {
    fn from(envelope: ResponseEnvelope) -> Self {
        Self {
            correlation_id: Some(envelope.correlation_id.into()),
            reply_to: None,
            body: envelope.body,
        }
    }
}

/// One message handed from the broker to a consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Channel-scoped tag used to acknowledge the delivery.
    pub delivery_tag: u64,
    /// Queue the delivery was consumed from.
    pub queue: String,
    /// Routing key the message was published with.
    pub routing_key: String,
    /// Whether the broker has delivered this message before.
    pub redelivered: bool,
    /// The `correlation_id` property, if present.
    pub correlation_id: Option<String>,
    /// The `reply_to` property, if present.
    pub reply_to: Option<String>,
    /// Message body.
    pub body: Vec<u8>,
}

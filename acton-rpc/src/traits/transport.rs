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

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::common::config::BrokerConfig;
use crate::message::{Delivery, OutboundMessage, RpcError};

/// The deliveries of one consumer. Ends when the consumer's connection is lost.
pub type DeliveryStream = BoxStream<'static, Result<Delivery, RpcError>>;

/// How deliveries of a consumer are acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckMode {
    /// The broker treats every delivery as acknowledged on send.
    Auto,
    /// Every delivery must be acknowledged with [`BrokerChannel::ack`].
    Manual,
}

/// Queue declaration flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueOptions {
    /// Survives a broker restart.
    pub durable: bool,
    /// Owned by the declaring connection and deleted when it closes.
    pub exclusive: bool,
    /// Deleted once its last consumer goes away.
    pub auto_delete: bool,
}

impl QueueOptions {
    /// A client's private reply queue.
    #[must_use]
    pub const fn reply_queue() -> Self {
        Self {
            durable: false,
            exclusive: true,
            auto_delete: true,
        }
    }

    /// A server method queue.
    #[must_use]
    pub const fn method_queue(durable: bool) -> Self {
        Self {
            durable,
            exclusive: false,
            auto_delete: false,
        }
    }
}

/// Opens connections to a broker.
///
/// A connector is shared by a client or server for its whole lifetime and
/// called again on every reconnect.
#[async_trait]
pub trait BrokerConnector: Send + Sync + 'static {
    /// Opens a new connection.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::Connection`] if the broker cannot be reached or
    /// refuses the connection.
    async fn connect(&self, config: &BrokerConfig) -> Result<Box<dyn BrokerConnection>, RpcError>;
}

/// One live broker connection.
#[async_trait]
pub trait BrokerConnection: Send + Sync {
    /// Opens a channel on this connection.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::Connection`] if the connection is no longer usable.
    async fn open_channel(&self) -> Result<Box<dyn BrokerChannel>, RpcError>;

    /// Resolves with a reason once the connection is lost.
    ///
    /// Never resolves for a connection closed with [`close`](Self::close).
    async fn closed(&self) -> String;

    /// Closes the connection.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::Connection`] if the close handshake fails.
    async fn close(&self) -> Result<(), RpcError>;
}

/// A channel: the unit on which topology, publishes and acks happen.
#[async_trait]
pub trait BrokerChannel: Send + Sync {
    /// Declares a direct exchange. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::Topology`] on failure.
    async fn declare_exchange(&self, exchange: &str) -> Result<(), RpcError>;

    /// Declares a queue and returns its name.
    ///
    /// An empty `queue` asks the broker to generate a name.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::Topology`] on failure.
    async fn declare_queue(&self, queue: &str, options: QueueOptions) -> Result<String, RpcError>;

    /// Binds `queue` to `exchange` under `routing_key`.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::Topology`] on failure.
    async fn bind_queue(&self, queue: &str, exchange: &str, routing_key: &str) -> Result<(), RpcError>;

    /// Starts a consumer on `queue`.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::Topology`] on failure.
    async fn consume(&self, queue: &str, ack_mode: AckMode) -> Result<DeliveryStream, RpcError>;

    /// Publishes `message`. An empty `exchange` routes directly to the queue named `routing_key`.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::Publish`] on failure.
    async fn publish(&self, exchange: &str, routing_key: &str, message: OutboundMessage) -> Result<(), RpcError>;

    /// Acknowledges one delivery received through [`AckMode::Manual`].
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::Connection`] if the channel is no longer usable.
    async fn ack(&self, delivery_tag: u64) -> Result<(), RpcError>;
}

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
use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, ExchangeDeclareOptions,
    QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::{FieldTable, ShortString};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use tracing::{debug, error, trace};

use crate::common::config::BrokerConfig;
use crate::message::{CorrelationId, Delivery, OutboundMessage, RpcError};
use crate::traits::{AckMode, BrokerChannel, BrokerConnection, BrokerConnector, DeliveryStream, QueueOptions};
use crate::transport::ConnectionMonitor;

const DEFAULT_USERNAME: &str = "guest";
const DEFAULT_PASSWORD: &str = "guest";

/// Connects to an AMQP 0-9-1 broker such as RabbitMQ.
#[derive(Debug, Clone, Copy, Default)]
pub struct AmqpConnector;

impl AmqpConnector {
    /// Creates a connector.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

/// Builds the `amqp://` URI for `config`. The vhost is percent-encoded.
///
/// Configured credentials are used only as a pair; otherwise `guest`/`guest`.
pub(crate) fn amqp_uri(config: &BrokerConfig) -> String {
    let (username, password) = match (config.username.as_deref(), config.password.as_deref()) {
        (Some(username), Some(password)) => (username, password),
        _ => (DEFAULT_USERNAME, DEFAULT_PASSWORD),
    };
    let vhost = config.vhost.replace('%', "%25").replace('/', "%2f");
    format!("amqp://{username}:{password}@{}:{}/{vhost}", config.host, config.port)
}

#[async_trait]
impl BrokerConnector for AmqpConnector {
    async fn connect(&self, config: &BrokerConfig) -> Result<Box<dyn BrokerConnection>, RpcError> {
        debug!(host = %config.host, port = config.port, vhost = %config.vhost, "Opening AMQP connection");
        let connection = Connection::connect(&amqp_uri(config), ConnectionProperties::default()).await?;
        let monitor = ConnectionMonitor::default();
        let on_error = monitor.clone();
        connection.on_error(move |err| {
            error!(error = %err, "AMQP connection error");
            on_error.mark_lost(err.to_string());
        });
        Ok(Box::new(AmqpConnection { connection, monitor }))
    }
}

struct AmqpConnection {
    connection: Connection,
    monitor: ConnectionMonitor,
}

#[async_trait]
impl BrokerConnection for AmqpConnection {
    async fn open_channel(&self) -> Result<Box<dyn BrokerChannel>, RpcError> {
        let channel = self.connection.create_channel().await?;
        Ok(Box::new(AmqpChannel { channel }))
    }

    async fn closed(&self) -> String {
        self.monitor.lost().await
    }

    async fn close(&self) -> Result<(), RpcError> {
        if self.monitor.is_lost() {
            return Ok(());
        }
        self.connection.close(200, "closed by client").await?;
        Ok(())
    }
}

struct AmqpChannel {
    channel: Channel,
}

#[async_trait]
impl BrokerChannel for AmqpChannel {
    async fn declare_exchange(&self, exchange: &str) -> Result<(), RpcError> {
        self.channel
            .exchange_declare(exchange, ExchangeKind::Direct, ExchangeDeclareOptions::default(), FieldTable::default())
            .await
            .map_err(|e| RpcError::Topology(format!("exchange '{exchange}': {e}")))
    }

    async fn declare_queue(&self, queue: &str, options: QueueOptions) -> Result<String, RpcError> {
        let declare = QueueDeclareOptions {
            durable: options.durable,
            exclusive: options.exclusive,
            auto_delete: options.auto_delete,
            ..QueueDeclareOptions::default()
        };
        let declared = self
            .channel
            .queue_declare(queue, declare, FieldTable::default())
            .await
            .map_err(|e| RpcError::Topology(format!("queue '{queue}': {e}")))?;
        Ok(declared.name().as_str().to_string())
    }

    async fn bind_queue(&self, queue: &str, exchange: &str, routing_key: &str) -> Result<(), RpcError> {
        self.channel
            .queue_bind(queue, exchange, routing_key, QueueBindOptions::default(), FieldTable::default())
            .await
            .map_err(|e| RpcError::Topology(format!("bind '{queue}' to '{exchange}': {e}")))
    }

    async fn consume(&self, queue: &str, ack_mode: AckMode) -> Result<DeliveryStream, RpcError> {
        let consumer_tag = format!("{queue}.{}", CorrelationId::generate());
        let options = BasicConsumeOptions {
            no_ack: ack_mode == AckMode::Auto,
            ..BasicConsumeOptions::default()
        };
        let consumer = self
            .channel
            .basic_consume(queue, &consumer_tag, options, FieldTable::default())
            .await
            .map_err(|e| RpcError::Topology(format!("consume '{queue}': {e}")))?;
        trace!(queue, consumer_tag = %consumer_tag, "Consumer started");

        let queue = queue.to_string();
        Ok(consumer
            .map(move |delivery| -> Result<Delivery, RpcError> {
                let delivery = delivery?;
                Ok(Delivery {
                    delivery_tag: delivery.delivery_tag,
                    queue: queue.clone(),
                    routing_key: delivery.routing_key.as_str().to_string(),
                    redelivered: delivery.redelivered,
                    correlation_id: delivery.properties.correlation_id().as_ref().map(|id| id.as_str().to_string()),
                    reply_to: delivery.properties.reply_to().as_ref().map(|queue| queue.as_str().to_string()),
                    body: delivery.data,
                })
            })
            .boxed())
    }

    async fn publish(&self, exchange: &str, routing_key: &str, message: OutboundMessage) -> Result<(), RpcError> {
        let mut properties = BasicProperties::default();
        if let Some(correlation_id) = message.correlation_id {
            properties = properties.with_correlation_id(ShortString::from(correlation_id));
        }
        if let Some(reply_to) = message.reply_to {
            properties = properties.with_reply_to(ShortString::from(reply_to));
        }
        self.channel
            .basic_publish(exchange, routing_key, BasicPublishOptions::default(), &message.body, properties)
            .await
            .map_err(|e| RpcError::Publish(e.to_string()))?;
        Ok(())
    }

    async fn ack(&self, delivery_tag: u64) -> Result<(), RpcError> {
        self.channel
            .basic_ack(delivery_tag, BasicAckOptions::default())
            .await
            .map_err(|e| RpcError::Connection(format!("ack {delivery_tag}: {e}")))
    }
}

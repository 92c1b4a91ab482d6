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

use futures::stream::SelectAll;
use tracing::{debug, error, trace};

use crate::common::stats::{bump, ServerStats};
use crate::message::RpcError;
use crate::traits::{AckMode, BrokerChannel, DeliveryStream, QueueOptions};

/// A client's private reply queue and its consumer.
pub(crate) struct ReplyQueue {
    pub(crate) name: String,
    pub(crate) deliveries: DeliveryStream,
}

pub(crate) async fn declare_exchange(channel: &dyn BrokerChannel, exchange: &str) -> Result<(), RpcError> {
    channel.declare_exchange(exchange).await?;
    trace!(exchange, "Exchange declared");
    Ok(())
}

/// Declares an exclusive, broker-named reply queue bound under its own name,
/// and consumes it with broker-side acknowledgement.
pub(crate) async fn declare_reply_queue(channel: &dyn BrokerChannel, exchange: &str) -> Result<ReplyQueue, RpcError> {
    let name = channel.declare_queue("", QueueOptions::reply_queue()).await?;
    channel.bind_queue(&name, exchange, &name).await?;
    let deliveries = channel.consume(&name, AckMode::Auto).await?;
    debug!(queue = %name, "Reply queue ready");
    Ok(ReplyQueue { name, deliveries })
}

async fn declare_method_queue(
    channel: &dyn BrokerChannel,
    exchange: &str,
    queue: &str,
    options: QueueOptions,
) -> Result<DeliveryStream, RpcError> {
    channel.declare_queue(queue, options).await?;
    channel.bind_queue(queue, exchange, queue).await?;
    channel.consume(queue, AckMode::Manual).await
}

/// Declares, binds and consumes one queue per method.
///
/// A method whose queue fails is logged and counted; the others are still set up.
pub(crate) async fn declare_method_queues(
    channel: &dyn BrokerChannel,
    exchange: &str,
    queues: &[String],
    durable: bool,
    stats: &ServerStats,
) -> SelectAll<DeliveryStream> {
    let mut deliveries = SelectAll::new();
    for queue in queues {
        match declare_method_queue(channel, exchange, queue, QueueOptions::method_queue(durable)).await {
            Ok(stream) => {
                debug!(queue = %queue, "Method queue ready");
                deliveries.push(stream);
            }
            Err(e) => {
                error!(queue = %queue, error = %e, "Failed to set up method queue");
                bump(&stats.method_setup_failures);
            }
        }
    }
    deliveries
}

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

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Acton RPC
//!
//! Request/response calls layered over a publish/subscribe message broker.
//!
//! A client publishes each request with a fresh correlation id and the name of
//! its private reply queue. A server consumes requests from one queue per
//! registered method, runs the method, publishes the response back to the
//! reply queue with the same correlation id, and only then acknowledges the
//! request. The client matches the response to the waiting caller.
//!
//! ## Key Concepts
//!
//! - **Supervisor**: one task per client or server owns the broker connection
//!   and channel. It declares topology, serves deliveries, and reconnects with
//!   exponential backoff when the connection drops.
//! - **Correlation table**: owned by the client task; callers on any thread
//!   reach it only through the client's command channel.
//! - **Dispatch**: the server task invokes each [`RpcMethod`](traits::RpcMethod)
//!   synchronously and settles every delivery exactly once through its
//!   [`Responder`](message::Responder).
//! - **Transports**: [`BrokerConnector`](traits::BrokerConnector) is the seam to
//!   the broker. `AmqpConnector` (feature `amqp`) talks to RabbitMQ through
//!   `lapin`; [`MemoryBroker`](transport::MemoryBroker) is an in-process
//!   broker for tests and demos.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use acton_rpc::prelude::*;
//!
//! #[rpc_main]
//! async fn main() -> Result<(), RpcError> {
//!     let broker = MemoryBroker::new();
//!     let config = RpcConfig::new("rpc", "localhost");
//!
//!     let server = RpcServer::builder(config.clone())
//!         .method_fn("hello_world", |_ctx, _payload, responder| {
//!             responder.respond_json(&serde_json::json!({ "msg": "Hello World" }))
//!         })
//!         .start(broker.clone());
//!     let client = RpcClient::start(config, broker);
//!
//!     server.wait_ready(std::time::Duration::from_secs(5)).await?;
//!     client.wait_ready(std::time::Duration::from_secs(5)).await?;
//!     let reply = client.call("hello_world", b"test".to_vec()).await?;
//!     println!("{}", String::from_utf8_lossy(&reply));
//!     Ok(())
//! }
//! ```

/// Client, server, supervision and configuration.
pub(crate) mod common;

/// Envelopes, delivery contexts, replies and errors.
pub mod message;

/// Method, request and transport contracts.
pub mod traits;

/// Broker transports.
pub mod transport;

/// A prelude module for conveniently importing the most commonly used items.
///
/// # Re-exports
///
/// ## Macros (from `acton-rpc-macro`)
/// *   `rpc_payload`: attribute macro for serializable request and response types.
/// *   `rpc_main`: attribute macro for an async `main`.
///
/// ## External Crates
/// *   [`async_trait::async_trait`](https://docs.rs/async-trait/latest/async_trait/attr.async_trait.html)
/// *   `serde` and `tokio`, used by the macro expansions.
pub mod prelude {
    pub use acton_rpc_macro::*;

    pub use async_trait::async_trait;
    pub use serde;
    pub use tokio;

    pub use crate::common::{
        ClientStats, ConnectionState, RpcClient, RpcConfig, RpcServer, RpcServerBuilder,
        ServerStats,
    };
    pub use crate::message::{
        CorrelationId, Delivery, DeliveryContext, OutboundMessage, Responder, RpcError, RpcReply,
    };
    pub use crate::traits::{
        AckMode, BrokerChannel, BrokerConnection, BrokerConnector, FnMethod, QueueOptions,
        RpcMethod, RpcRequest,
    };
    #[cfg(feature = "amqp")]
    pub use crate::transport::AmqpConnector;
    pub use crate::transport::{BrokerEvent, MemoryBroker};
}

pub use crate::common::config;
pub use crate::common::{
    ClientStats, ConnectionState, RpcClient, RpcConfig, RpcServer, RpcServerBuilder, ServerStats,
};
pub use crate::common::reconnect::{ReconnectConfig, ReconnectLimitExceeded, ReconnectLimiter};

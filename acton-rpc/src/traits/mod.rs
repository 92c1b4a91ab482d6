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

//! Contracts at the seams of the crate.
//!
//! *   [`RpcMethod`]: a named server method, invoked once per delivery.
//! *   [`RpcRequest`]: the blocking-style request façade built on [`RpcClient`](crate::RpcClient).
//! *   [`BrokerConnector`], [`BrokerConnection`], [`BrokerChannel`]: the transport seam
//!     implemented by the AMQP and in-memory brokers.

pub use rpc_method::{FnMethod, RpcMethod};
pub use rpc_request::RpcRequest;
pub use transport::{AckMode, BrokerChannel, BrokerConnection, BrokerConnector, DeliveryStream, QueueOptions};

/// Defines [`RpcMethod`] and the closure adapter [`FnMethod`].
mod rpc_method;
/// Defines [`RpcRequest`].
mod rpc_request;
/// Defines the broker transport traits.
mod transport;

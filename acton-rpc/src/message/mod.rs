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

//! The wire contract shared by clients and servers.
//!
//! *   [`RequestEnvelope`] and [`ResponseEnvelope`]: what goes out on the broker.
//! *   [`Delivery`]: what a consumer receives back.
//! *   [`DeliveryContext`] and [`Responder`]: what a server method sees, and how
//!     it answers.
//! *   [`RpcReply`]: the uniform `success`/`message` result at the request façade.
//! *   [`RpcError`]: every failure the crate reports.

pub use correlation_id::CorrelationId;
pub use delivery_context::{DeliveryContext, Responder};
pub use envelope::{Delivery, OutboundMessage, RequestEnvelope, ResponseEnvelope};
pub use rpc_error::RpcError;
pub use rpc_reply::RpcReply;

pub(crate) use delivery_context::Settlement;

/// Defines [`CorrelationId`].
mod correlation_id;
/// Defines [`DeliveryContext`] and [`Responder`].
mod delivery_context;
/// Defines the request, response and delivery envelopes.
mod envelope;
/// Defines [`RpcError`].
mod rpc_error;
/// Defines [`RpcReply`].
mod rpc_reply;

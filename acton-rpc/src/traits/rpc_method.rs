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

use std::fmt;

use crate::message::{DeliveryContext, Responder, RpcError};

/// A named server method.
///
/// The server declares one durable queue per method, named by
/// [`queue_name`](Self::queue_name) and bound to the exchange with that same
/// name as routing key. Every delivery on the queue invokes
/// [`method`](Self::method) once, on the server's event task.
///
/// A method settles its delivery through the [`Responder`]. It may respond
/// before returning, hand the responder to another task and respond later, or
/// drop it to acknowledge the request without a response. Returning `Err`
/// drops the responder, so the caller sees a timeout.
///
/// `method` must not block. Slow work belongs in a spawned task that owns the
/// responder.
pub trait RpcMethod: Send + Sync + 'static {
    /// Name of the method's queue, which is also its routing key.
    fn queue_name(&self) -> &str;

    /// Handles one request.
    ///
    /// # Errors
    ///
    /// Any error is logged by the server and the delivery is acknowledged with
    /// no response.
    fn method(&self, context: &DeliveryContext, payload: &[u8], responder: Responder) -> Result<(), RpcError>;
}

/// An [`RpcMethod`] backed by a closure.
///
/// ```rust,ignore
/// let echo = FnMethod::new("echo", |_ctx, payload, responder| {
///     responder.respond(payload.to_vec());
///     Ok(())
/// });
/// ```
pub struct FnMethod<F> {
    queue_name: String,
    handler: F,
}

impl<F> FnMethod<F>
where
    F: Fn(&DeliveryContext, &[u8], Responder) -> Result<(), RpcError> + Send + Sync + 'static,
{
    /// Wraps `handler` as the method served on `queue_name`.
    pub fn new(queue_name: impl Into<String>, handler: F) -> Self {
        Self {
            queue_name: queue_name.into(),
            handler,
        }
    }
}

impl<F> fmt::Debug for FnMethod<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnMethod").field("queue_name", &self.queue_name).finish_non_exhaustive()
    }
}

impl<F> RpcMethod for FnMethod<F>
where
    F: Fn(&DeliveryContext, &[u8], Responder) -> Result<(), RpcError> + Send + Sync + 'static,
{
    fn queue_name(&self) -> &str {
        &self.queue_name
    }

    fn method(&self, context: &DeliveryContext, payload: &[u8], responder: Responder) -> Result<(), RpcError> {
        (self.handler)(context, payload, responder)
    }
}

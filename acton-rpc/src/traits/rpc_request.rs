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

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::common::RpcClient;
use crate::message::{RpcError, RpcReply};

/// A request type that knows where it goes and how it is encoded.
///
/// Implementors supply the routing key and the payload. The provided
/// [`make_request`](Self::make_request) submits the request through a client
/// and waits for the outcome, which always comes back as an [`RpcReply`]:
/// a response becomes `success: true`, a failure or timeout becomes
/// `success: false` with the failure described in `message`.
///
/// ```rust,ignore
/// #[rpc_payload]
/// struct Greeting { text: String }
///
/// #[async_trait]
/// impl RpcRequest for Greeting {
///     fn routing_key(&self) -> &str { "hello_world" }
///     fn request_payload(&self) -> Result<Vec<u8>, RpcError> {
///         Ok(serde_json::to_vec(self)?)
///     }
/// }
///
/// let reply = Greeting { text: "hi".into() }.make_request(&client).await;
/// ```
#[async_trait]
pub trait RpcRequest: Send + Sync {
    /// Routing key of the target method.
    fn routing_key(&self) -> &str;

    /// Encoded request body.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be encoded; `make_request` then
    /// reports it without publishing anything.
    fn request_payload(&self) -> Result<Vec<u8>, RpcError>;

    /// Wait budget for this request. `None` uses the client's configured default.
    fn timeout(&self) -> Option<Duration> {
        None
    }

    /// Submits the request and waits for its outcome.
    async fn make_request(&self, client: &RpcClient) -> RpcReply {
        let payload = match self.request_payload() {
            Ok(payload) => payload,
            Err(err) => return RpcReply::failure(err),
        };
        let timeout = self.timeout().unwrap_or_else(|| client.config().request_timeout());
        let reply = RpcReply::from(client.call_with_timeout(self.routing_key(), payload, timeout).await);
        debug!(routing_key = self.routing_key(), success = reply.success, "Request settled");
        reply
    }

    /// Blocking form of [`make_request`](Self::make_request) for threads outside the runtime.
    ///
    /// # Panics
    ///
    /// Panics if called from within an asynchronous execution context.
    fn make_request_blocking(&self, client: &RpcClient) -> RpcReply {
        let payload = match self.request_payload() {
            Ok(payload) => payload,
            Err(err) => return RpcReply::failure(err),
        };
        let timeout = self.timeout().unwrap_or_else(|| client.config().request_timeout());
        RpcReply::from(client.call_blocking(self.routing_key(), payload, timeout))
    }
}

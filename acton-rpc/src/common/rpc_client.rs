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
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{instrument, trace};

use crate::common::config::RpcConfig;
use crate::common::connection_state::ConnectionState;
use crate::common::correlation::{ClientCommand, ClientRole, PendingRequest};
use crate::common::stats::ClientStats;
use crate::common::supervisor::{Supervisor, SupervisorHandle};
use crate::message::RpcError;
use crate::traits::BrokerConnector;

/// The calling side of RPC over a broker.
///
/// A client owns one broker connection, supervised by a background task that
/// declares a private reply queue and keeps the correlation table of
/// in-flight requests. Cloning a client is cheap; all clones share the
/// connection. The connection is closed by [`close`](Self::close) or once the
/// last clone is dropped.
///
/// Requests are made with [`call`](Self::call) and its variants, or through
/// [`RpcRequest::make_request`](crate::traits::RpcRequest::make_request).
///
/// # Example
///
/// ```rust,ignore
/// let client = RpcClient::start(RpcConfig::new("rpc", "localhost"), AmqpConnector::new());
/// client.wait_ready(Duration::from_secs(5)).await?;
/// let body = client.call("hello_world", b"test".to_vec()).await?;
/// ```
#[derive(Clone)]
pub struct RpcClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: RpcConfig,
    commands: mpsc::Sender<ClientCommand>,
    reply_queue: Arc<RwLock<Option<String>>>,
    stats: Arc<ClientStats>,
    handle: SupervisorHandle,
    runtime: Handle,
}

impl fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcClient")
            .field("exchange", &self.inner.config.exchange_name)
            .field("state", &self.state())
            .field("reply_queue", &self.reply_queue())
            .finish_non_exhaustive()
    }
}

impl RpcClient {
    /// Starts a client and begins connecting in the background.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    #[must_use]
    pub fn start(config: RpcConfig, connector: impl BrokerConnector) -> Self {
        let (commands, receiver) = mpsc::channel(config.limits.command_buffer.max(1));
        let reply_queue = Arc::new(RwLock::new(None));
        let stats = Arc::new(ClientStats::default());
        let role = ClientRole::new(
            receiver,
            Arc::clone(&reply_queue),
            Arc::clone(&stats),
            config.exchange_name.clone(),
            config.limits.max_pending,
            config.sweep_interval(),
        );
        let handle = Supervisor::spawn(role, config.clone(), Arc::new(connector));
        Self {
            inner: Arc::new(ClientInner {
                config,
                commands,
                reply_queue,
                stats,
                handle,
                runtime: Handle::current(),
            }),
        }
    }

    /// Starts a client connected to an AMQP broker.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    #[cfg(feature = "amqp")]
    #[must_use]
    pub fn start_amqp(config: RpcConfig) -> Self {
        Self::start(config, crate::transport::AmqpConnector::new())
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.handle.state()
    }

    /// Whether requests can be sent right now.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.inner.handle.is_ready()
    }

    /// Waits until the client is ready.
    ///
    /// # Errors
    ///
    /// [`RpcError::Closed`] if the client closes first, [`RpcError::Timeout`]
    /// if `timeout` elapses.
    pub async fn wait_ready(&self, timeout: Duration) -> Result<(), RpcError> {
        self.inner.handle.wait_ready(timeout).await
    }

    /// Name of the reply queue of the current connection.
    #[must_use]
    pub fn reply_queue(&self) -> Option<String> {
        self.inner.reply_queue.read().clone()
    }

    /// Client counters.
    #[must_use]
    pub fn stats(&self) -> &ClientStats {
        &self.inner.stats
    }

    /// The configuration this client was started with.
    #[must_use]
    pub fn config(&self) -> &RpcConfig {
        &self.inner.config
    }

    /// Hands a request to the client task and returns the receiver of its outcome.
    ///
    /// The receiver yields the response body, or the error that completed the
    /// request. It is dropped unanswered if the request expires before it is
    /// published or is evicted after `timeout`.
    ///
    /// # Errors
    ///
    /// [`RpcError::NotReady`] if the connection is not ready, [`RpcError::Closed`]
    /// if the client has stopped.
    pub async fn send_request(
        &self,
        routing_key: &str,
        payload: Vec<u8>,
        timeout: Duration,
    ) -> Result<oneshot::Receiver<Result<Vec<u8>, RpcError>>, RpcError> {
        if !self.is_ready() {
            return Err(RpcError::NotReady);
        }
        let (slot, receiver) = oneshot::channel();
        let request = PendingRequest {
            routing_key: routing_key.to_string(),
            payload,
            deadline: Instant::now() + timeout,
            slot,
        };
        self.inner.commands.send(ClientCommand::Submit(request)).await?;
        trace!(routing_key, "Request submitted");
        Ok(receiver)
    }

    /// Sends a request and waits for its response for the configured default timeout.
    ///
    /// # Errors
    ///
    /// See [`call_with_timeout`](Self::call_with_timeout).
    pub async fn call(&self, routing_key: &str, payload: Vec<u8>) -> Result<Vec<u8>, RpcError> {
        self.call_with_timeout(routing_key, payload, self.inner.config.request_timeout())
            .await
    }

    /// Sends a request and waits up to `timeout` for its response.
    ///
    /// # Errors
    ///
    /// *   [`RpcError::Timeout`] if no response arrives in time, including
    ///     when the request cannot even be submitted before `timeout`.
    /// *   [`RpcError::Publish`] if the request could not be published.
    /// *   [`RpcError::NotReady`], [`RpcError::Closed`] or
    ///     [`RpcError::Backpressure`] if it could not be submitted.
    #[instrument(skip(self, payload), fields(payload_len = payload.len()))]
    pub async fn call_with_timeout(
        &self,
        routing_key: &str,
        payload: Vec<u8>,
        timeout: Duration,
    ) -> Result<Vec<u8>, RpcError> {
        let deadline = Instant::now() + timeout;
        let receiver = tokio::time::timeout_at(deadline, self.send_request(routing_key, payload, timeout))
            .await
            .map_err(|_| RpcError::Timeout)??;
        match tokio::time::timeout_at(deadline, receiver).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) if Instant::now() < deadline && self.state() == ConnectionState::Closed => {
                Err(RpcError::Closed)
            }
            Ok(Err(_)) | Err(_) => Err(RpcError::Timeout),
        }
    }

    /// Sends `request` as JSON and decodes the JSON response.
    ///
    /// # Errors
    ///
    /// [`RpcError::Serialization`] if either side fails to (de)serialize, plus
    /// everything [`call`](Self::call) returns.
    pub async fn call_json<Req, Resp>(&self, routing_key: &str, request: &Req) -> Result<Resp, RpcError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let payload = serde_json::to_vec(request)?;
        let body = self.call(routing_key, payload).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Blocking form of [`call_with_timeout`](Self::call_with_timeout) for
    /// threads outside the runtime.
    ///
    /// # Errors
    ///
    /// See [`call_with_timeout`](Self::call_with_timeout).
    ///
    /// # Panics
    ///
    /// Panics if called from within an asynchronous execution context.
    pub fn call_blocking(&self, routing_key: &str, payload: Vec<u8>, timeout: Duration) -> Result<Vec<u8>, RpcError> {
        self.inner
            .runtime
            .block_on(self.call_with_timeout(routing_key, payload, timeout))
    }

    /// Closes the connection and stops reconnecting.
    ///
    /// Requests still pending fail with [`RpcError::Closed`].
    ///
    /// # Errors
    ///
    /// [`RpcError::Timeout`] if the connection task does not stop within
    /// `timeouts.close_timeout_ms`.
    pub async fn close(&self) -> Result<(), RpcError> {
        self.inner.handle.close().await
    }
}

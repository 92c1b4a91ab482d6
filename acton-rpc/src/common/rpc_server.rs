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

use dashmap::DashMap;
use tracing::{debug, warn};

use crate::common::config::RpcConfig;
use crate::common::connection_state::ConnectionState;
use crate::common::dispatch::{MethodTable, ServerRole};
use crate::common::stats::ServerStats;
use crate::common::supervisor::{Supervisor, SupervisorHandle};
use crate::message::{DeliveryContext, Responder, RpcError};
use crate::traits::{BrokerConnector, FnMethod, RpcMethod};

/// Collects the methods of a server before it starts.
///
/// Methods are fixed once [`start`](Self::start) consumes the builder.
pub struct RpcServerBuilder {
    config: RpcConfig,
    methods: Vec<Arc<dyn RpcMethod>>,
}

impl fmt::Debug for RpcServerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.methods.iter().map(|m| m.queue_name()).collect();
        f.debug_struct("RpcServerBuilder")
            .field("exchange", &self.config.exchange_name)
            .field("methods", &names)
            .finish()
    }
}

impl RpcServerBuilder {
    /// Registers `method` on the queue it names.
    #[must_use]
    pub fn method(mut self, method: impl RpcMethod) -> Self {
        self.methods.push(Arc::new(method));
        self
    }

    /// Registers a closure as the method served on `queue_name`.
    #[must_use]
    pub fn method_fn<F>(self, queue_name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&DeliveryContext, &[u8], Responder) -> Result<(), RpcError> + Send + Sync + 'static,
    {
        self.method(FnMethod::new(queue_name, handler))
    }

    /// Starts the server and begins connecting in the background.
    ///
    /// Registering two methods on one queue keeps the later one.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    #[must_use]
    pub fn start(self, connector: impl BrokerConnector) -> RpcServer {
        let methods: MethodTable = Arc::new(DashMap::new());
        let mut queues = Vec::with_capacity(self.methods.len());
        for method in self.methods {
            let name = method.queue_name().to_string();
            if methods.insert(name.clone(), method).is_some() {
                warn!(queue = %name, "Method registered twice, keeping the later one");
            } else {
                queues.push(name);
            }
        }
        debug!(methods = ?queues, "Starting server");

        let stats = Arc::new(ServerStats::default());
        let role = ServerRole::new(
            Arc::clone(&methods),
            queues,
            Arc::clone(&stats),
            self.config.exchange_name.clone(),
            self.config.topology.durable_method_queues,
        );
        let handle = Supervisor::spawn(role, self.config.clone(), Arc::new(connector));
        RpcServer {
            config: self.config,
            methods,
            stats,
            handle,
        }
    }

    /// Starts the server against an AMQP broker.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    #[cfg(feature = "amqp")]
    #[must_use]
    pub fn start_amqp(self) -> RpcServer {
        self.start(crate::transport::AmqpConnector::new())
    }
}

/// The serving side of RPC over a broker.
///
/// A server owns one broker connection, supervised by a background task. For
/// every registered method it declares a queue named by the method, binds it
/// to the exchange under the same name, and consumes it with manual
/// acknowledgement. Dropping the server closes the connection.
///
/// # Example
///
/// ```rust,ignore
/// let server = RpcServer::builder(RpcConfig::new("rpc", "localhost"))
///     .method_fn("hello_world", |_ctx, _payload, responder| {
///         responder.respond_json(&serde_json::json!({ "msg": "Hello World" }))
///     })
///     .start_amqp();
/// ```
pub struct RpcServer {
    config: RpcConfig,
    methods: MethodTable,
    stats: Arc<ServerStats>,
    handle: SupervisorHandle,
}

impl fmt::Debug for RpcServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcServer")
            .field("exchange", &self.config.exchange_name)
            .field("state", &self.state())
            .field("methods", &self.method_names())
            .finish_non_exhaustive()
    }
}

impl RpcServer {
    /// Begins building a server for `config`.
    #[must_use]
    pub fn builder(config: RpcConfig) -> RpcServerBuilder {
        RpcServerBuilder {
            config,
            methods: Vec::new(),
        }
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.handle.state()
    }

    /// Whether all method queues have been set up on the current connection.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.handle.is_ready()
    }

    /// Waits until the server is ready.
    ///
    /// # Errors
    ///
    /// [`RpcError::Closed`] if the server closes first, [`RpcError::Timeout`]
    /// if `timeout` elapses.
    pub async fn wait_ready(&self, timeout: Duration) -> Result<(), RpcError> {
        self.handle.wait_ready(timeout).await
    }

    /// Server counters.
    #[must_use]
    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }

    /// The configuration this server was started with.
    #[must_use]
    pub const fn config(&self) -> &RpcConfig {
        &self.config
    }

    /// Queue names of the registered methods, sorted.
    #[must_use]
    pub fn method_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.methods.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    /// Closes the connection and stops reconnecting.
    ///
    /// # Errors
    ///
    /// [`RpcError::Timeout`] if the connection task does not stop within
    /// `timeouts.close_timeout_ms`.
    pub async fn close(&self) -> Result<(), RpcError> {
        self.handle.close().await
    }
}

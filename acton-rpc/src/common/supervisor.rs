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

//! The connection supervisor shared by clients and servers.
//!
//! One task per client or server owns the broker connection and its channel.
//! It opens the connection, declares the exchange, lets its [`SessionRole`]
//! declare the rest of the topology, marks itself ready, and then hands the
//! session to the role until the connection drops or shutdown is requested.
//!
//! A failure to open the *first* connection is terminal. A connection that
//! drops after having been open is re-opened with the same configuration,
//! subject to the [`ReconnectLimiter`]; reconnect attempts that fail to open
//! are retried under the same budget.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::common::config::RpcConfig;
use crate::common::connection_state::{self, ConnectionState};
use crate::common::reconnect::{DisconnectReason, ReconnectLimiter};
use crate::common::topology;
use crate::message::RpcError;
use crate::traits::{BrokerChannel, BrokerConnection, BrokerConnector};

/// One open connection and its channel.
pub(crate) struct Session {
    /// Increases with every successfully opened connection.
    pub(crate) id: u64,
    pub(crate) connection: Box<dyn BrokerConnection>,
    pub(crate) channel: Box<dyn BrokerChannel>,
}

/// What a client or server does with a session.
#[async_trait]
pub(crate) trait SessionRole: Send + 'static {
    /// Role name used in logs.
    const NAME: &'static str;

    /// Whatever `declare` sets up and `serve` consumes.
    type Topology: Send;

    /// Declares the role's queues and starts its consumers.
    async fn declare(&mut self, session: &Session) -> Result<Self::Topology, RpcError>;

    /// Called once the session is ready.
    fn session_started(&mut self, session: &Session);

    /// Runs until the connection drops or `shutdown` fires.
    async fn serve(&mut self, session: &Session, topology: Self::Topology, shutdown: &CancellationToken) -> DisconnectReason;

    /// Called once the supervisor stops for good.
    async fn finish(&mut self);
}

/// Owns the connection lifecycle for one role.
pub(crate) struct Supervisor<R: SessionRole> {
    role: R,
    config: RpcConfig,
    connector: Arc<dyn BrokerConnector>,
    state: watch::Sender<ConnectionState>,
    shutdown: CancellationToken,
    limiter: ReconnectLimiter,
}

impl<R: SessionRole> Supervisor<R> {
    /// Spawns the supervisor task for `role`.
    pub(crate) fn spawn(role: R, config: RpcConfig, connector: Arc<dyn BrokerConnector>) -> SupervisorHandle {
        let (state, state_rx) = watch::channel(ConnectionState::Connecting);
        let shutdown = CancellationToken::new();
        let close_timeout = config.close_timeout();
        let supervisor = Self {
            role,
            limiter: ReconnectLimiter::new(config.reconnect.clone()),
            config,
            connector,
            state,
            shutdown: shutdown.clone(),
        };
        let task = tokio::spawn(supervisor.run());
        SupervisorHandle {
            state: state_rx,
            shutdown,
            task: Mutex::new(Some(task)),
            close_timeout,
        }
    }

    #[instrument(skip(self), fields(role = R::NAME, exchange = %self.config.exchange_name))]
    async fn run(mut self) {
        let mut session_id = 0;
        let mut reconnecting = false;

        loop {
            session_id += 1;
            match self.run_session(session_id).await {
                DisconnectReason::Requested => {
                    info!("Connection closed on request");
                    break;
                }
                DisconnectReason::OpenFailed(reason) if !reconnecting => {
                    error!(%reason, "Failed to open connection");
                    break;
                }
                DisconnectReason::Lost(reason) | DisconnectReason::OpenFailed(reason) => {
                    if reconnecting {
                        warn!(%reason, "Reconnect attempt failed");
                    } else {
                        warn!(%reason, "Connection lost");
                    }
                    if let Err(exceeded) = self.limiter.can_reconnect() {
                        error!(%exceeded, "Not reconnecting");
                        break;
                    }
                    self.state.send_replace(ConnectionState::Reconnecting);
                    reconnecting = true;
                    let backoff = self.limiter.record_attempt();
                    debug!(?backoff, attempts = self.limiter.attempts_in_window(), "Reconnecting");
                    tokio::select! {
                        () = self.shutdown.cancelled() => break,
                        () = tokio::time::sleep(backoff) => {}
                    }
                }
            }
        }

        self.state.send_replace(ConnectionState::Closed);
        self.role.finish().await;
        debug!("Supervisor stopped");
    }

    async fn run_session(&mut self, id: u64) -> DisconnectReason {
        let connection = tokio::select! {
            biased;
            () = self.shutdown.cancelled() => return DisconnectReason::Requested,
            result = self.connector.connect(&self.config.broker) => match result {
                Ok(connection) => connection,
                Err(e) => return DisconnectReason::OpenFailed(e.to_string()),
            },
        };

        let channel = tokio::select! {
            biased;
            () = self.shutdown.cancelled() => {
                close_connection(connection.as_ref()).await;
                return DisconnectReason::Requested;
            }
            result = open_channel(connection.as_ref(), &self.config.exchange_name) => match result {
                Ok(channel) => channel,
                Err(e) => {
                    close_connection(connection.as_ref()).await;
                    return DisconnectReason::OpenFailed(e.to_string());
                }
            },
        };
        let session = Session { id, connection, channel };

        let topology = tokio::select! {
            biased;
            () = self.shutdown.cancelled() => {
                close_connection(session.connection.as_ref()).await;
                return DisconnectReason::Requested;
            }
            result = self.role.declare(&session) => match result {
                Ok(topology) => topology,
                Err(e) => {
                    close_connection(session.connection.as_ref()).await;
                    return DisconnectReason::OpenFailed(e.to_string());
                }
            },
        };

        self.limiter.reset_consecutive();
        self.role.session_started(&session);
        self.state.send_replace(ConnectionState::Ready);
        info!(session = id, "Connection ready");

        let reason = self.role.serve(&session, topology, &self.shutdown).await;
        if reason == DisconnectReason::Requested {
            close_connection(session.connection.as_ref()).await;
        }
        reason
    }
}

async fn open_channel(connection: &dyn BrokerConnection, exchange: &str) -> Result<Box<dyn BrokerChannel>, RpcError> {
    let channel = connection.open_channel().await?;
    topology::declare_exchange(channel.as_ref(), exchange).await?;
    Ok(channel)
}

async fn close_connection(connection: &dyn BrokerConnection) {
    if let Err(e) = connection.close().await {
        warn!(error = %e, "Error while closing connection");
    }
}

/// The caller-side handle of a supervisor task.
#[derive(Debug)]
pub(crate) struct SupervisorHandle {
    state: watch::Receiver<ConnectionState>,
    shutdown: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
    close_timeout: Duration,
}

impl SupervisorHandle {
    pub(crate) fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub(crate) fn is_ready(&self) -> bool {
        self.state() == ConnectionState::Ready
    }

    pub(crate) async fn wait_ready(&self, timeout: Duration) -> Result<(), RpcError> {
        connection_state::wait_ready(self.state.clone(), timeout).await
    }

    /// Stops reconnecting, closes the connection and waits for the task to end.
    pub(crate) async fn close(&self) -> Result<(), RpcError> {
        self.shutdown.cancel();
        let task = self.task.lock().take();
        let Some(task) = task else {
            return Ok(());
        };
        match tokio::time::timeout(self.close_timeout, task).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(RpcError::Connection(format!("connection task failed: {e}"))),
            Err(_) => {
                warn!(timeout = ?self.close_timeout, "Connection task did not stop in time");
                Err(RpcError::Timeout)
            }
        }
    }
}

impl Drop for SupervisorHandle {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

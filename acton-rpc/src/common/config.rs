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

//! Client and server configuration.
//!
//! [`RpcConfig`] is loaded from `$XDG_CONFIG_HOME/acton/rpc.toml` by
//! [`RpcConfig::load`], or built in code with [`RpcConfig::new`] and the
//! `with_*` setters. Every section is optional in the file:
//!
//! ```toml
//! exchange_name = "rpc"
//!
//! [broker]
//! host = "rabbitmq.internal"
//! username = "svc"
//! password = "secret"
//!
//! [reconnect]
//! max_attempts = 3
//!
//! [timeouts]
//! request_timeout_ms = 2500
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::common::reconnect::ReconnectConfig;
use crate::message::RpcError;

/// Configuration shared by [`RpcClient`](crate::RpcClient) and [`RpcServer`](crate::RpcServer).
///
/// A client and the servers it talks to must agree on `exchange_name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    /// Direct exchange requests are published to.
    pub exchange_name: String,
    /// Where the broker is and how to log in.
    pub broker: BrokerConfig,
    /// What happens when the connection drops.
    pub reconnect: ReconnectConfig,
    /// Request and shutdown timeouts.
    pub timeouts: TimeoutConfig,
    /// Capacity limits.
    pub limits: LimitsConfig,
    /// Queue declaration flags.
    pub topology: TopologyConfig,
}

/// Broker address and credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Broker host name.
    pub host: String,
    /// Broker port.
    pub port: u16,
    /// Virtual host.
    pub vhost: String,
    /// Login user; the transport default when absent.
    pub username: Option<String>,
    /// Login password; the transport default when absent.
    pub password: Option<String>,
}

/// Timeout configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Wait budget of a request that does not set its own.
    pub request_timeout_ms: u64,
    /// How often the client evicts expired pending requests.
    pub sweep_interval_ms: u64,
    /// How long `close()` waits for the connection task to finish.
    pub close_timeout_ms: u64,
}

/// Capacity limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Capacity of the client's submission channel.
    pub command_buffer: usize,
    /// Maximum requests pending in the client at once.
    pub max_pending: usize,
}

/// Queue declaration flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologyConfig {
    /// Declare server method queues as durable.
    pub durable_method_queues: bool,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            exchange_name: "rpc".to_string(),
            broker: BrokerConfig::default(),
            reconnect: ReconnectConfig::default(),
            timeouts: TimeoutConfig::default(),
            limits: LimitsConfig::default(),
            topology: TopologyConfig::default(),
        }
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5672,
            vhost: "/".to_string(),
            username: None,
            password: None,
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 1000,
            sweep_interval_ms: 250,
            close_timeout_ms: 5000,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            command_buffer: 255,
            max_pending: 10_000,
        }
    }
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            durable_method_queues: true,
        }
    }
}

impl RpcConfig {
    /// Configuration for `exchange_name` on the broker at `host`, defaults elsewhere.
    #[must_use]
    pub fn new(exchange_name: impl Into<String>, host: impl Into<String>) -> Self {
        let mut config = Self {
            exchange_name: exchange_name.into(),
            ..Self::default()
        };
        config.broker.host = host.into();
        config
    }

    /// Sets the login credentials.
    #[must_use]
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.broker.username = Some(username.into());
        self.broker.password = Some(password.into());
        self
    }

    /// Sets the broker port.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.broker.port = port;
        self
    }

    /// Sets the virtual host.
    #[must_use]
    pub fn with_vhost(mut self, vhost: impl Into<String>) -> Self {
        self.broker.vhost = vhost.into();
        self
    }

    /// Enables or disables reconnection after a dropped connection.
    #[must_use]
    pub fn with_reconnect_on_drop(mut self, enabled: bool) -> Self {
        self.reconnect.enabled = enabled;
        self
    }

    /// Replaces the reconnect policy.
    #[must_use]
    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Sets the default request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.request_timeout_ms = duration_ms(timeout);
        self
    }

    /// Sets how often expired pending requests are evicted.
    #[must_use]
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.timeouts.sweep_interval_ms = duration_ms(interval);
        self
    }

    /// Sets the maximum number of pending requests.
    #[must_use]
    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.limits.max_pending = max_pending;
        self
    }

    /// Sets whether method queues are durable.
    #[must_use]
    pub fn with_durable_method_queues(mut self, durable: bool) -> Self {
        self.topology.durable_method_queues = durable;
        self
    }

    /// Default request timeout as a [`Duration`].
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.request_timeout_ms)
    }

    /// Eviction sweep interval as a [`Duration`]. Never zero.
    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.timeouts.sweep_interval_ms.max(1))
    }

    /// Close timeout as a [`Duration`].
    #[must_use]
    pub const fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.close_timeout_ms)
    }

    /// Load configuration from XDG-compliant locations.
    ///
    /// Looks for `acton/rpc.toml` under the XDG config directories
    /// (`$XDG_CONFIG_HOME`, then `~/.config`). A missing file yields the
    /// defaults; an unreadable or malformed file is logged and also yields the
    /// defaults.
    #[must_use]
    pub fn load() -> Self {
        let xdg_dirs = match xdg::BaseDirectories::with_prefix("acton") {
            Ok(dirs) => dirs,
            Err(e) => {
                error!("Failed to initialize XDG directories: {}", e);
                return Self::default();
            }
        };

        match xdg_dirs.find_config_file("rpc.toml") {
            Some(path) => {
                info!("Loading RPC configuration from: {}", path.display());
                Self::load_from(&path).unwrap_or_else(|e| {
                    error!("{}; using defaults", e);
                    Self::default()
                })
            }
            None => {
                info!("No RPC configuration file found, using defaults");
                Self::default()
            }
        }
    }

    /// Load configuration from the TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::Config`] if the file cannot be read or parsed.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, RpcError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| RpcError::Config(format!("failed to read {}: {e}", path.display())))?;
        toml::from_str(&contents).map_err(|e| RpcError::Config(format!("failed to parse {}: {e}", path.display())))
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

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

/// Errors reported by RPC clients, servers and transports.
///
/// Failures that happen inside a client or server task never escape it as a
/// panic. They are either written to the affected request's completion slot
/// or logged, so callers only ever see them as values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RpcError {
    /// Opening, using or closing the broker connection failed.
    ///
    /// Recovered by reconnection when it is enabled, terminal otherwise.
    Connection(String),

    /// Declaring the exchange or a queue, binding, or starting a consumer failed.
    Topology(String),

    /// Publishing a message failed.
    ///
    /// Written to the completion slot of the request whose publish failed.
    /// Other in-flight requests are unaffected.
    Publish(String),

    /// No response or error arrived before the request's deadline.
    Timeout,

    /// A server method returned an error or panicked.
    ///
    /// The delivery is acknowledged and no response is published, so the
    /// remote caller observes a [`RpcError::Timeout`].
    Handler(String),

    /// A request was issued while the connection was not ready.
    NotReady,

    /// The client or server has been closed.
    Closed,

    /// The correlation table already holds the configured maximum of pending requests.
    Backpressure(usize),

    /// Encoding or decoding a JSON payload failed.
    Serialization(String),

    /// A configuration file could not be read or parsed.
    Config(String),
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection(e) => write!(f, "Connection error: {e}"),
            Self::Topology(e) => write!(f, "Topology error: {e}"),
            Self::Publish(e) => write!(f, "Publish error: {e}"),
            Self::Timeout => write!(f, "Timeout"),
            Self::Handler(e) => write!(f, "Handler failure: {e}"),
            Self::NotReady => write!(f, "Cannot send request, connection not ready"),
            Self::Closed => write!(f, "Closed"),
            Self::Backpressure(max) => write!(f, "Too many pending requests (max {max})"),
            Self::Serialization(e) => write!(f, "Serialization error: {e}"),
            Self::Config(e) => write!(f, "Configuration error: {e}"),
        }
    }
}

impl std::error::Error for RpcError {}

impl From<serde_json::Error> for RpcError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for RpcError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        Self::Closed
    }
}

#[cfg(feature = "amqp")]
impl From<lapin::Error> for RpcError {
    fn from(err: lapin::Error) -> Self {
        Self::Connection(err.to_string())
    }
}

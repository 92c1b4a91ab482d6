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

pub use connection_state::ConnectionState;
pub use config::RpcConfig;
pub use rpc_client::RpcClient;
pub use rpc_server::{RpcServer, RpcServerBuilder};
pub use stats::{ClientStats, ServerStats};

/// Client and server configuration, loaded from TOML.
pub mod config;
/// Connection lifecycle states.
mod connection_state;
/// The client's correlation table.
mod correlation;
/// The server's dispatch table.
mod dispatch;
/// Reconnect policy and backoff.
pub(crate) mod reconnect;
/// The calling side.
mod rpc_client;
/// The serving side.
mod rpc_server;
/// Client and server counters.
mod stats;
/// Connection supervision shared by both sides.
mod supervisor;
/// Exchange and queue declaration.
mod topology;

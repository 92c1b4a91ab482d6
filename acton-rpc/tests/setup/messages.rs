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
#![allow(unused)]

use acton_rpc::prelude::*;

/// The body returned by `hello_world`.
#[rpc_payload]
#[derive(PartialEq, Eq)]
pub struct Greeting {
    pub msg: String,
}

/// Asks `deferred` to answer with `value` after `delay_ms`.
#[rpc_payload]
pub struct DelayedEcho {
    pub delay_ms: u64,
    pub value: u64,
}

/// A typed request for `hello_world`.
#[rpc_payload]
pub struct HelloRequest {
    pub text: String,
}

#[async_trait]
impl RpcRequest for HelloRequest {
    fn routing_key(&self) -> &str {
        "hello_world"
    }

    fn request_payload(&self) -> Result<Vec<u8>, RpcError> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// A typed request for a routing key nothing serves.
#[rpc_payload]
pub struct Unanswered {
    pub timeout_ms: u64,
}

#[async_trait]
impl RpcRequest for Unanswered {
    fn routing_key(&self) -> &str {
        "nobody_home"
    }

    fn request_payload(&self) -> Result<Vec<u8>, RpcError> {
        Ok(b"anyone?".to_vec())
    }

    fn timeout(&self) -> Option<std::time::Duration> {
        Some(std::time::Duration::from_millis(self.timeout_ms))
    }
}

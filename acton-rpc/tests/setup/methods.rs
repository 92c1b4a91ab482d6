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

use std::time::Duration;

use acton_rpc::prelude::*;

use super::messages::{DelayedEcho, Greeting};

/// Responds with the request body unchanged.
#[derive(Debug, Default, Clone)]
pub struct Echo;

impl RpcMethod for Echo {
    fn queue_name(&self) -> &str {
        "echo"
    }

    fn method(&self, _context: &DeliveryContext, payload: &[u8], responder: Responder) -> Result<(), RpcError> {
        responder.respond(payload.to_vec());
        Ok(())
    }
}

/// Responds with the JSON request wrapped as `{"msg": <request>}`.
#[derive(Debug, Default, Clone)]
pub struct Wrap;

impl RpcMethod for Wrap {
    fn queue_name(&self) -> &str {
        "wrap"
    }

    fn method(&self, _context: &DeliveryContext, payload: &[u8], responder: Responder) -> Result<(), RpcError> {
        let request: serde_json::Value = serde_json::from_slice(payload)?;
        responder.respond_json(&serde_json::json!({ "msg": request }))
    }
}

/// Responds with `{"msg": "Hello World"}`.
#[derive(Debug, Default, Clone)]
pub struct HelloWorld;

impl RpcMethod for HelloWorld {
    fn queue_name(&self) -> &str {
        "hello_world"
    }

    fn method(&self, _context: &DeliveryContext, _payload: &[u8], responder: Responder) -> Result<(), RpcError> {
        responder.respond_json(&Greeting {
            msg: "Hello World".to_string(),
        })
    }
}

/// Responds from a spawned task after the delay named in the request.
#[derive(Debug, Default, Clone)]
pub struct Deferred;

impl RpcMethod for Deferred {
    fn queue_name(&self) -> &str {
        "deferred"
    }

    fn method(&self, _context: &DeliveryContext, payload: &[u8], responder: Responder) -> Result<(), RpcError> {
        let request: DelayedEcho = serde_json::from_slice(payload)?;
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(request.delay_ms)).await;
            let _ = responder.respond_json(&request.value);
        });
        Ok(())
    }
}

/// Always fails.
#[derive(Debug, Default, Clone)]
pub struct Failing;

impl RpcMethod for Failing {
    fn queue_name(&self) -> &str {
        "fail"
    }

    fn method(&self, _context: &DeliveryContext, _payload: &[u8], _responder: Responder) -> Result<(), RpcError> {
        Err(RpcError::Handler("refused".to_string()))
    }
}

/// Acknowledges without responding.
#[derive(Debug, Default, Clone)]
pub struct Silent;

impl RpcMethod for Silent {
    fn queue_name(&self) -> &str {
        "silent"
    }

    fn method(&self, _context: &DeliveryContext, _payload: &[u8], responder: Responder) -> Result<(), RpcError> {
        drop(responder);
        Ok(())
    }
}

/// Panics on every request.
#[derive(Debug, Default, Clone)]
pub struct Panicking;

impl RpcMethod for Panicking {
    fn queue_name(&self) -> &str {
        "panic"
    }

    fn method(&self, _context: &DeliveryContext, _payload: &[u8], _responder: Responder) -> Result<(), RpcError> {
        panic!("method exploded");
    }
}

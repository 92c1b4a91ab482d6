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

//! Tests for methods that panic.

use std::time::Duration;

use acton_rpc::prelude::*;
use acton_rpc_test::prelude::*;

use crate::setup::methods::{Echo, Panicking};
use crate::setup::{eventually, initialize_tracing, test_config, READY_TIMEOUT};

mod setup;

async fn start(broker: &MemoryBroker) -> anyhow::Result<(RpcServer, RpcClient)> {
    let server = RpcServer::builder(test_config())
        .method(Echo)
        .method(Panicking)
        .start(broker.clone());
    let client = RpcClient::start(test_config(), broker.clone());
    server.wait_ready(READY_TIMEOUT).await?;
    client.wait_ready(READY_TIMEOUT).await?;
    Ok((server, client))
}

/// A panicking method is contained: its request is acked and the caller times out.
#[acton_rpc_test]
async fn test_panic_is_contained() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = MemoryBroker::new();
    let (server, client) = start(&broker).await?;

    let result = client
        .call_with_timeout("panic", b"boom".to_vec(), Duration::from_millis(100))
        .await;

    assert_eq!(result, Err(RpcError::Timeout));
    assert!(eventually(Duration::from_secs(1), || server.stats().acks() == 1).await);
    assert_eq!(server.stats().handler_failures(), 1);
    assert_eq!(server.state(), ConnectionState::Ready);
    Ok(())
}

/// The server keeps serving after a method panics.
#[acton_rpc_test]
async fn test_server_serves_after_panic() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = MemoryBroker::new();
    let (server, client) = start(&broker).await?;

    for _ in 0..3 {
        let result = client
            .call_with_timeout("panic", Vec::new(), Duration::from_millis(50))
            .await;
        assert_eq!(result, Err(RpcError::Timeout));
    }

    assert_eq!(client.call("echo", b"alive".to_vec()).await?, b"alive");
    assert_eq!(server.stats().handler_failures(), 3);
    assert_eq!(server.stats().sessions(), 1);
    assert_eq!(broker.queue_depth("panic"), 0);
    Ok(())
}

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

//! Tests for the bounded wait of a request.

use std::time::{Duration, Instant};

use acton_rpc::prelude::*;
use acton_rpc_test::prelude::*;

use crate::setup::messages::Unanswered;
use crate::setup::{initialize_tracing, on_os_thread, start_pair, test_config};

mod setup;

/// Upper slack allowed on top of a timeout for scheduling.
const SLACK: Duration = Duration::from_millis(400);

/// A request nobody answers fails with a timeout no earlier than its budget.
#[acton_rpc_test]
async fn test_unanswered_request_times_out() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = MemoryBroker::new();
    let (_server, client) = start_pair(&broker, test_config()).await?;

    let budget = Duration::from_millis(100);
    let started = Instant::now();
    let result = client.call_with_timeout("nobody_home", b"?".to_vec(), budget).await;
    let elapsed = started.elapsed();

    assert_eq!(result, Err(RpcError::Timeout));
    assert!(elapsed >= budget, "returned after {elapsed:?}");
    assert!(elapsed < budget + SLACK, "returned after {elapsed:?}");
    Ok(())
}

/// Without a per-request timeout the configured default applies.
#[acton_rpc_test]
async fn test_default_timeout_from_config() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = MemoryBroker::new();
    let budget = Duration::from_millis(150);
    let (_server, client) = start_pair(&broker, test_config().with_request_timeout(budget)).await?;

    let started = Instant::now();
    let result = client.call("nobody_home", b"?".to_vec()).await;
    let elapsed = started.elapsed();

    assert_eq!(result, Err(RpcError::Timeout));
    assert!(elapsed >= budget, "returned after {elapsed:?}");
    assert!(elapsed < budget + SLACK, "returned after {elapsed:?}");
    Ok(())
}

/// A method that answers too slowly looks the same as no answer.
#[acton_rpc_test]
async fn test_slow_method_times_out() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = MemoryBroker::new();
    let (_server, client) = start_pair(&broker, test_config()).await?;

    let payload = serde_json::to_vec(&crate::setup::messages::DelayedEcho { delay_ms: 300, value: 1 })?;
    let result = client
        .call_with_timeout("deferred", payload, Duration::from_millis(60))
        .await;

    assert_eq!(result, Err(RpcError::Timeout));
    Ok(())
}

/// `make_request` reports a timeout as a failed reply instead of an error.
#[acton_rpc_test]
async fn test_make_request_reports_timeout() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = MemoryBroker::new();
    let (_server, client) = start_pair(&broker, test_config()).await?;

    let reply = Unanswered { timeout_ms: 80 }.make_request(&client).await;

    assert!(!reply.success);
    assert!(reply.is_timeout());
    assert_eq!(reply.message.as_deref(), Some("Timeout"));
    assert_eq!(
        serde_json::to_value(&reply)?,
        serde_json::json!({ "success": false, "msg": "Timeout" })
    );
    Ok(())
}

/// The blocking façade honors the same bound.
#[acton_rpc_test]
async fn test_blocking_call_times_out() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = MemoryBroker::new();
    let (_server, client) = start_pair(&broker, test_config()).await?;

    let budget = Duration::from_millis(80);
    let worker = client.clone();
    let (result, elapsed) = on_os_thread(move || {
        let started = Instant::now();
        let result = worker.call_blocking("nobody_home", b"?".to_vec(), budget);
        (result, started.elapsed())
    })
    .await;

    assert_eq!(result, Err(RpcError::Timeout));
    assert!(elapsed >= budget, "returned after {elapsed:?}");
    assert!(elapsed < budget + SLACK, "returned after {elapsed:?}");

    let worker = client.clone();
    let reply = on_os_thread(move || Unanswered { timeout_ms: 50 }.make_request_blocking(&worker)).await;
    assert!(reply.is_timeout());
    Ok(())
}

/// Requests stuck behind a stalled publish still time out within their budget.
#[acton_rpc_test]
async fn test_timeout_covers_submission() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = MemoryBroker::new();
    broker.delay_publishes_to("stalled", Duration::from_secs(2));
    let mut config = test_config();
    config.limits.command_buffer = 1;
    let (_server, client) = start_pair(&broker, config).await?;

    let budget = Duration::from_millis(100);
    let calls = (0..3).map(|_| {
        let client = client.clone();
        tokio::spawn(async move {
            let started = Instant::now();
            let result = client.call_with_timeout("stalled", b"?".to_vec(), budget).await;
            (result, started.elapsed())
        })
    });
    for call in calls.collect::<Vec<_>>() {
        let (result, elapsed) = call.await?;
        assert_eq!(result, Err(RpcError::Timeout));
        assert!(elapsed < budget + SLACK, "returned after {elapsed:?}");
    }
    Ok(())
}

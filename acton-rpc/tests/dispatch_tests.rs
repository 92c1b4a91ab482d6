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

//! Tests for how a server settles the deliveries it consumes.

use std::time::Duration;

use acton_rpc::prelude::*;
use acton_rpc_test::prelude::*;

use crate::setup::{eventually, initialize_tracing, start_pair, test_config, EXCHANGE, READY_TIMEOUT};

mod setup;

fn position(journal: &[BrokerEvent], wanted: impl Fn(&BrokerEvent) -> bool) -> Option<usize> {
    journal.iter().position(wanted)
}

/// Every request's response is published before the request is acknowledged.
#[acton_rpc_test]
async fn test_response_published_before_ack() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = MemoryBroker::new();
    let (server, client) = start_pair(&broker, test_config()).await?;
    let reply_queue = client.reply_queue().expect("ready client has a reply queue");

    for i in 0..10_u8 {
        assert_eq!(client.call("echo", vec![i]).await?, vec![i]);
    }
    assert!(eventually(Duration::from_secs(1), || server.stats().acks() == 10).await);

    let journal = broker.journal();
    let requests: Vec<String> = journal
        .iter()
        .filter_map(|event| match event {
            BrokerEvent::Published {
                exchange,
                routing_key,
                correlation_id: Some(id),
            } if exchange == EXCHANGE && routing_key == "echo" => Some(id.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(requests.len(), 10);

    for id in &requests {
        let published = position(&journal, |event| {
            matches!(event, BrokerEvent::Published { exchange, routing_key, correlation_id: Some(c) }
                if exchange.is_empty() && *routing_key == reply_queue && c == id)
        })
        .expect("response was published");
        let acked = position(&journal, |event| {
            matches!(event, BrokerEvent::Acked { correlation_id: Some(c), .. } if c == id)
        })
        .expect("request was acknowledged");
        assert!(published < acked, "request {id} acked before its response was published");
    }
    Ok(())
}

/// A deferred response still precedes the acknowledgement.
#[acton_rpc_test]
async fn test_deferred_response_precedes_ack() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = MemoryBroker::new();
    let (server, client) = start_pair(&broker, test_config()).await?;

    let payload = serde_json::to_vec(&crate::setup::messages::DelayedEcho { delay_ms: 80, value: 5 })?;
    let pending = client
        .send_request("deferred", payload, Duration::from_secs(1))
        .await?;
    assert!(eventually(Duration::from_secs(1), || server.stats().deliveries_received() == 1).await);
    assert_eq!(server.stats().acks(), 0, "not acknowledged while the response is outstanding");
    assert_eq!(broker.queue_depth("deferred"), 0);

    assert_eq!(pending.await??, b"5");
    assert!(eventually(Duration::from_secs(1), || server.stats().acks() == 1).await);
    Ok(())
}

/// A method that drops its responder has its request acknowledged with no response.
#[acton_rpc_test]
async fn test_silent_method_is_acked_without_response() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = MemoryBroker::new();
    let (server, client) = start_pair(&broker, test_config()).await?;

    let result = client
        .call_with_timeout("silent", b"hush".to_vec(), Duration::from_millis(100))
        .await;

    assert_eq!(result, Err(RpcError::Timeout));
    assert!(eventually(Duration::from_secs(1), || server.stats().acks() == 1).await);
    assert_eq!(server.stats().responses_published(), 0);
    assert_eq!(server.stats().handler_failures(), 0);
    Ok(())
}

/// A method error is logged, the request acknowledged and the caller times out.
#[acton_rpc_test]
async fn test_failing_method_is_acked() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = MemoryBroker::new();
    let (server, client) = start_pair(&broker, test_config()).await?;

    let result = client
        .call_with_timeout("fail", b"please".to_vec(), Duration::from_millis(100))
        .await;

    assert_eq!(result, Err(RpcError::Timeout));
    assert!(eventually(Duration::from_secs(1), || server.stats().acks() == 1).await);
    assert_eq!(server.stats().handler_failures(), 1);
    assert_eq!(server.stats().responses_published(), 0);

    assert_eq!(client.call("echo", b"next".to_vec()).await?, b"next");
    Ok(())
}

/// A request without reply_to is acknowledged and its response dropped.
#[acton_rpc_test]
async fn test_request_without_reply_to_is_acked() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = MemoryBroker::new();
    let (server, _client) = start_pair(&broker, test_config()).await?;

    assert!(broker.inject("echo", OutboundMessage::new(b"fire and forget".to_vec()).with_correlation_id("req_1")));
    assert!(broker.inject("echo", OutboundMessage::new(b"no id".to_vec()).with_reply_to("amq.gen-none")));

    assert!(eventually(Duration::from_secs(1), || server.stats().acks() == 2).await);
    assert_eq!(server.stats().deliveries_received(), 2);
    assert_eq!(server.stats().responses_published(), 0);
    assert_eq!(broker.queue_depth("echo"), 0);
    Ok(())
}

/// A method whose queue cannot be declared is skipped; the others still serve.
#[acton_rpc_test]
async fn test_failed_method_setup_does_not_block_others() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = MemoryBroker::new();
    broker.fail_declares_of("broken");

    let server = RpcServer::builder(test_config())
        .method(crate::setup::methods::Echo)
        .method_fn("broken", |_context, _payload, responder| {
            responder.respond(b"unreachable".to_vec());
            Ok(())
        })
        .start(broker.clone());
    let client = RpcClient::start(test_config(), broker.clone());
    server.wait_ready(READY_TIMEOUT).await?;
    client.wait_ready(READY_TIMEOUT).await?;

    assert_eq!(server.stats().method_setup_failures(), 1);
    assert!(!broker.has_queue("broken"));
    assert_eq!(client.call("echo", b"works".to_vec()).await?, b"works");
    assert_eq!(
        client
            .call_with_timeout("broken", b"?".to_vec(), Duration::from_millis(50))
            .await,
        Err(RpcError::Timeout)
    );
    Ok(())
}

/// Registering two methods on one queue keeps the later registration.
#[acton_rpc_test]
async fn test_duplicate_method_keeps_later() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = MemoryBroker::new();

    let server = RpcServer::builder(test_config())
        .method_fn("twice", |_context, _payload, responder| {
            responder.respond(b"first".to_vec());
            Ok(())
        })
        .method_fn("twice", |_context, _payload, responder| {
            responder.respond(b"second".to_vec());
            Ok(())
        })
        .start(broker.clone());
    let client = RpcClient::start(test_config(), broker.clone());
    server.wait_ready(READY_TIMEOUT).await?;
    client.wait_ready(READY_TIMEOUT).await?;

    assert_eq!(server.method_names(), vec!["twice"]);
    assert_eq!(broker.consumer_count("twice"), 1);
    assert_eq!(client.call("twice", Vec::new()).await?, b"second");
    Ok(())
}

/// Methods see the delivery's properties.
#[acton_rpc_test]
async fn test_method_sees_delivery_context() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = MemoryBroker::new();

    let server = RpcServer::builder(test_config())
        .method_fn("inspect", |context, _payload, responder| {
            let seen = serde_json::json!({
                "queue": context.queue(),
                "routing_key": context.routing_key(),
                "redelivered": context.redelivered(),
                "has_correlation_id": context.correlation_id().is_some(),
                "reply_to": context.reply_to(),
            });
            responder.respond_json(&seen)
        })
        .start(broker.clone());
    let client = RpcClient::start(test_config(), broker.clone());
    server.wait_ready(READY_TIMEOUT).await?;
    client.wait_ready(READY_TIMEOUT).await?;

    let seen: serde_json::Value = client.call_json("inspect", &()).await?;

    assert_eq!(seen["queue"], "inspect");
    assert_eq!(seen["routing_key"], "inspect");
    assert_eq!(seen["redelivered"], false);
    assert_eq!(seen["has_correlation_id"], true);
    assert_eq!(seen["reply_to"].as_str(), client.reply_queue().as_deref());
    Ok(())
}

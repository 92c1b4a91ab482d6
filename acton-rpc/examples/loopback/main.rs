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

use std::time::Duration;

use acton_rpc::prelude::*;

#[rpc_payload]
struct Sum {
    terms: Vec<i64>,
}

// a method can answer later from its own task
struct SlowSum;

impl RpcMethod for SlowSum {
    fn queue_name(&self) -> &str {
        "slow_sum"
    }

    fn method(&self, _context: &DeliveryContext, payload: &[u8], responder: Responder) -> Result<(), RpcError> {
        let request: Sum = serde_json::from_slice(payload)?;
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let total: i64 = request.terms.iter().sum();
            let _ = responder.respond_json(&total);
        });
        Ok(())
    }
}

#[rpc_main]
async fn main() -> Result<(), RpcError> {
    // both sides share one in-process broker, no RabbitMQ needed
    let broker = MemoryBroker::new();
    let config = RpcConfig::new("loopback", "localhost");

    let server = RpcServer::builder(config.clone())
        .method_fn("echo", |_context, payload, responder| {
            responder.respond(payload.to_vec());
            Ok(())
        })
        .method(SlowSum)
        .start(broker.clone());
    let client = RpcClient::start(config, broker.clone());

    server.wait_ready(Duration::from_secs(1)).await?;
    client.wait_ready(Duration::from_secs(1)).await?;

    let echoed = client.call("echo", b"ping".to_vec()).await?;
    println!("echo: {}", String::from_utf8_lossy(&echoed));

    let total: i64 = client.call_json("slow_sum", &Sum { terms: vec![1, 2, 3, 4] }).await?;
    println!("slow_sum: {total}");

    broker.drop_connections("simulated broker restart");
    // both sides notice the drop on their own and open a second session
    while client.stats().sessions() < 2 || server.stats().sessions() < 2 {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    client.wait_ready(Duration::from_secs(5)).await?;
    server.wait_ready(Duration::from_secs(5)).await?;
    let echoed = client.call("echo", b"still here".to_vec()).await?;
    println!("after reconnect: {}", String::from_utf8_lossy(&echoed));

    let stats = client.stats();
    println!(
        "client: {} sent, {} matched, {} sessions",
        stats.requests_sent(),
        stats.responses_matched(),
        stats.sessions()
    );

    client.close().await?;
    server.close().await?;
    Ok(())
}

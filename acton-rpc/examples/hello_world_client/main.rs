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
use tracing_subscriber::EnvFilter;

#[rpc_payload]
struct HelloWorld {
    text: String,
}

// requests know their own routing key and encoding
#[async_trait]
impl RpcRequest for HelloWorld {
    fn routing_key(&self) -> &str {
        "hello_world"
    }

    fn request_payload(&self) -> Result<Vec<u8>, RpcError> {
        Ok(self.text.clone().into_bytes())
    }
}

// nobody serves this one, so it comes back as a timeout
#[rpc_payload]
struct Unserved;

#[async_trait]
impl RpcRequest for Unserved {
    fn routing_key(&self) -> &str {
        "not_served"
    }

    fn request_payload(&self) -> Result<Vec<u8>, RpcError> {
        Ok(Vec::new())
    }

    fn timeout(&self) -> Option<Duration> {
        Some(Duration::from_millis(250))
    }
}

#[rpc_main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let client = RpcClient::start_amqp(RpcConfig::load());
    client.wait_ready(Duration::from_secs(10)).await?;

    let reply = HelloWorld { text: "test".into() }.make_request(&client).await;
    match reply.json::<serde_json::Value>() {
        Ok(body) => println!("hello_world answered {body}"),
        Err(e) => println!("hello_world failed: {e}"),
    }

    // failures are values, never panics
    let reply = Unserved.make_request(&client).await;
    println!("not_served answered {}", serde_json::to_string(&reply)?);

    // the blocking form is for threads outside the runtime
    let worker = client.clone();
    let body = tokio::task::spawn_blocking(move || {
        worker.call_blocking("hello_world", b"from a thread".to_vec(), Duration::from_secs(1))
    })
    .await??;
    println!("blocking call answered {}", String::from_utf8_lossy(&body));

    client.close().await?;
    Ok(())
}

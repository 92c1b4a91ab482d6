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

// the body every hello_world call gets back
#[rpc_payload]
struct Greeting {
    msg: String,
}

#[rpc_main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // reads $XDG_CONFIG_HOME/acton/rpc.toml, or uses the defaults
    let config = RpcConfig::load();

    let server = RpcServer::builder(config)
        .method_fn("hello_world", |context, payload, responder| {
            tracing::info!(
                redelivered = context.redelivered(),
                request = %String::from_utf8_lossy(payload),
                "hello_world called"
            );
            responder.respond_json(&Greeting {
                msg: "Hello World".to_string(),
            })
        })
        .start_amqp();

    server.wait_ready(Duration::from_secs(10)).await?;
    println!("Serving {:?}, press Ctrl-C to stop", server.method_names());

    tokio::signal::ctrl_c().await?;
    server.close().await?;
    Ok(())
}

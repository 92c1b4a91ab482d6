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
#![allow(dead_code)]

use std::future::Future;
use std::sync::Once;
use std::time::Duration;

use acton_rpc::prelude::*;
use acton_rpc::ReconnectConfig;
use tracing::Level;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

pub mod messages;
pub mod methods;

/// Exchange used by every test.
pub const EXCHANGE: &str = "rpc_test";

/// How long a test waits for a client or server to become ready.
pub const READY_TIMEOUT: Duration = Duration::from_secs(2);

// Ensures tracing initialization happens only once across all tests.
static INIT: Once = Once::new();

/// Initializes the global tracing subscriber for tests.
///
/// Output goes to `logs/rpc_tests.txt` so that it does not interleave with
/// the test harness output.
pub fn initialize_tracing() {
    INIT.call_once(|| {
        std::fs::create_dir_all("logs").expect("could not create logs dir");

        let file_appender = RollingFileAppender::new(Rotation::NEVER, "logs", "rpc_tests.txt");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        // Leak the guard so the non-blocking writer is not dropped before process exit
        Box::leak(Box::new(guard));

        let filter = EnvFilter::new("info")
            .add_directive("acton_rpc::common::correlation=trace".parse().unwrap())
            .add_directive("acton_rpc::common::dispatch=trace".parse().unwrap())
            .add_directive("acton_rpc::common::supervisor=debug".parse().unwrap())
            .add_directive("acton_rpc::transport::memory=debug".parse().unwrap())
            .add_directive("round_trip_tests=trace".parse().unwrap())
            .add_directive("reconnect_tests=trace".parse().unwrap());

        let subscriber = FmtSubscriber::builder()
            .with_span_events(FmtSpan::NONE)
            .with_max_level(Level::TRACE)
            .compact()
            .with_line_number(true)
            .without_time()
            .with_target(true)
            .with_env_filter(filter)
            .with_writer(non_blocking)
            .finish();

        tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
    });
}

/// A configuration with short timeouts and fast reconnects.
pub fn test_config() -> RpcConfig {
    RpcConfig::new(EXCHANGE, "localhost")
        .with_request_timeout(Duration::from_millis(500))
        .with_sweep_interval(Duration::from_millis(20))
        .with_reconnect(ReconnectConfig {
            initial_backoff_ms: 10,
            max_backoff_ms: 50,
            ..ReconnectConfig::default()
        })
}

/// The server used by most tests, with every method from [`methods`] registered.
pub fn test_server(config: RpcConfig) -> RpcServerBuilder {
    RpcServer::builder(config)
        .method(methods::Echo)
        .method(methods::HelloWorld)
        .method(methods::Deferred)
        .method(methods::Failing)
        .method(methods::Silent)
        .method(methods::Wrap)
}

/// Starts the test server and a client on `broker` and waits until both are ready.
pub async fn start_pair(broker: &MemoryBroker, config: RpcConfig) -> anyhow::Result<(RpcServer, RpcClient)> {
    let server = test_server(config.clone()).start(broker.clone());
    let client = RpcClient::start(config, broker.clone());
    server.wait_ready(READY_TIMEOUT).await?;
    client.wait_ready(READY_TIMEOUT).await?;
    Ok((server, client))
}

/// Polls `condition` until it holds or `timeout` elapses. Returns the last result.
pub async fn eventually(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Runs `work` on a plain OS thread and awaits its result without blocking the runtime.
pub async fn on_os_thread<T, F>(work: F) -> T
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (tx, rx) = tokio::sync::oneshot::channel();
    std::thread::spawn(move || {
        let _ = tx.send(work());
    });
    rx.await.expect("worker thread ended without a result")
}

/// Awaits `future` but fails the test if it takes longer than `limit`.
pub async fn within<T>(limit: Duration, future: impl Future<Output = T>) -> T {
    tokio::time::timeout(limit, future)
        .await
        .expect("operation did not finish in time")
}

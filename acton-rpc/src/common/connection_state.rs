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

use std::fmt;
use std::time::Duration;

use tokio::sync::watch;

use crate::message::RpcError;

/// Lifecycle of a client's or server's broker connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// The first connection is being opened.
    Connecting,
    /// Connected, with all topology declared and consumers running.
    Ready,
    /// The connection dropped and is being re-opened.
    Reconnecting,
    /// Closed for good, either on request or because reconnecting gave up.
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connecting => "connecting",
            Self::Ready => "ready",
            Self::Reconnecting => "reconnecting",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Waits on `state` until it turns `Ready`.
///
/// Fails with [`RpcError::Closed`] if the connection closes first and with
/// [`RpcError::Timeout`] if `timeout` elapses.
pub(crate) async fn wait_ready(
    mut state: watch::Receiver<ConnectionState>,
    timeout: Duration,
) -> Result<(), RpcError> {
    let wait = async {
        loop {
            match *state.borrow_and_update() {
                ConnectionState::Ready => return Ok(()),
                ConnectionState::Closed => return Err(RpcError::Closed),
                ConnectionState::Connecting | ConnectionState::Reconnecting => {}
            }
            if state.changed().await.is_err() {
                return Err(RpcError::Closed);
            }
        }
    };
    tokio::time::timeout(timeout, wait).await.map_err(|_| RpcError::Timeout)?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wait_ready_sees_later_transition() {
        let (tx, rx) = watch::channel(ConnectionState::Connecting);
        let waiter = tokio::spawn(wait_ready(rx, Duration::from_secs(1)));
        tx.send_replace(ConnectionState::Ready);
        assert_eq!(waiter.await.unwrap(), Ok(()));
    }

    #[tokio::test]
    async fn wait_ready_fails_on_close() {
        let (tx, rx) = watch::channel(ConnectionState::Reconnecting);
        tx.send_replace(ConnectionState::Closed);
        assert_eq!(wait_ready(rx, Duration::from_secs(1)).await, Err(RpcError::Closed));
    }

    #[tokio::test]
    async fn wait_ready_times_out() {
        let (_tx, rx) = watch::channel(ConnectionState::Connecting);
        assert_eq!(wait_ready(rx, Duration::from_millis(20)).await, Err(RpcError::Timeout));
    }
}

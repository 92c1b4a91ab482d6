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

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::message::RpcError;

/// The uniform result of [`RpcRequest::make_request`](crate::traits::RpcRequest::make_request).
///
/// Failures never surface as panics at the request façade. They come back as
/// `success: false` with a `message` naming the failure, for example
/// `"Timeout"`.
///
/// # Wire Format
///
/// ```json
/// { "success": false, "msg": "Timeout" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcReply {
    /// Whether a response arrived.
    pub success: bool,
    /// Failure description; `None` on success.
    #[serde(rename = "msg", default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Response body; `None` on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Vec<u8>>,
    /// The failure itself, for callers that want to match on it.
    #[serde(skip)]
    pub error: Option<RpcError>,
}

impl RpcReply {
    /// A successful reply carrying `body`.
    #[must_use]
    pub fn success(body: Vec<u8>) -> Self {
        Self {
            success: true,
            message: None,
            body: Some(body),
            error: None,
        }
    }

    /// A failed reply describing `error`.
    #[must_use]
    pub fn failure(error: RpcError) -> Self {
        Self {
            success: false,
            message: Some(error.to_string()),
            body: None,
            error: Some(error),
        }
    }

    /// Whether the request timed out.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self.error, Some(RpcError::Timeout))
    }

    /// Decodes the response body as JSON.
    ///
    /// # Errors
    ///
    /// Returns the reply's own error if it is a failure, or
    /// [`RpcError::Serialization`] if the body is not valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, RpcError> {
        match (&self.body, &self.error) {
            (Some(body), _) => Ok(serde_json::from_slice(body)?),
            (None, Some(error)) => Err(error.clone()),
            (None, None) => Err(RpcError::Serialization("reply has no body".to_string())),
        }
    }
}

impl From<Result<Vec<u8>, RpcError>> for RpcReply {
    fn from(result: Result<Vec<u8>, RpcError>) -> Self {
        match result {
            Ok(body) => Self::success(body),
            Err(error) => Self::failure(error),
        }
    }
}

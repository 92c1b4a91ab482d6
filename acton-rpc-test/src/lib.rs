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

//! Test support for Acton RPC.
//!
//! `#[acton_rpc_test]` turns an `async fn` into a `#[test]` that runs on a
//! multi-threaded Tokio runtime inside a tracing span named after the test.
//!
//! ```ignore
//! use acton_rpc_test::prelude::*;
//!
//! #[acton_rpc_test]
//! async fn round_trip() -> anyhow::Result<()> {
//!     Ok(())
//! }
//! ```

pub use acton_rpc_test_macro::acton_rpc_test;

#[doc(hidden)]
pub use tokio;
#[doc(hidden)]
pub use tracing;

/// Everything a test module needs.
pub mod prelude {
    pub use acton_rpc_test_macro::acton_rpc_test;
}

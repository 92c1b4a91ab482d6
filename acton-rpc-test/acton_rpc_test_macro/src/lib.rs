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

use proc_macro::TokenStream;

use quote::{format_ident, quote};
use syn::{parse_macro_input, ItemFn};

/// Runs an `async fn` test on a multi-threaded runtime inside a span named
/// after the test.
///
/// The runtime is given a second to wind down the client and server tasks a
/// test leaves behind.
#[proc_macro_attribute]
pub fn acton_rpc_test(attr: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as ItemFn);
    let ItemFn { attrs, vis, sig, block } = &input;

    if !attr.is_empty() {
        return syn::Error::new_spanned(&sig.ident, "acton_rpc_test takes no arguments")
            .to_compile_error()
            .into();
    }

    if sig.asyncness.is_none() {
        return syn::Error::new_spanned(sig.fn_token, "acton_rpc_test requires an async fn")
            .to_compile_error()
            .into();
    }
    if !sig.inputs.is_empty() {
        return syn::Error::new_spanned(&sig.inputs, "acton_rpc_test functions take no arguments")
            .to_compile_error()
            .into();
    }

    let name = &sig.ident;
    let output = &sig.output;
    let body_fn = format_ident!("__{}_body", name);

    let expanded = quote! {
        #[test]
        #(#attrs)*
        #vis fn #name() #output {
            async fn #body_fn() #output #block

            let runtime = ::acton_rpc_test::tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .expect("test runtime");
            let span = ::acton_rpc_test::tracing::info_span!("acton_rpc_test", name = stringify!(#name));
            let outcome = runtime.block_on(::acton_rpc_test::tracing::Instrument::instrument(#body_fn(), span));
            runtime.shutdown_timeout(::std::time::Duration::from_secs(1));
            outcome
        }
    };

    expanded.into()
}

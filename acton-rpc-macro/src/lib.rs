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
#![forbid(unsafe_code)]

//! Acton RPC Macro Library
//!
//! Procedural macros for the Acton RPC crate.
//!
//! # Payload Macro
//!
//! [`rpc_payload`] prepares a type to travel as a JSON request or response body:
//!
//! ```ignore
//! #[rpc_payload]
//! pub struct Greeting {
//!     pub msg: String,
//! }
//! ```
//!
//! # Main Entry Point
//!
//! [`rpc_main`] runs an async `main` on a multi-threaded Tokio runtime:
//!
//! ```ignore
//! use acton_rpc::prelude::*;
//!
//! #[rpc_main]
//! async fn main() {
//!     let client = RpcClient::start_amqp(RpcConfig::load());
//!     // ...
//! }
//! ```

use proc_macro::TokenStream;

use quote::quote;
use syn::{parse_macro_input, DeriveInput, ItemFn};

fn has_derive(input: &DeriveInput, trait_name: &str) -> bool {
    input.attrs.iter().any(|attr| {
        if attr.path().is_ident("derive") {
            let mut found = false;
            let _ = attr.parse_nested_meta(|meta| {
                if meta.path.segments.last().is_some_and(|segment| segment.ident == trait_name) {
                    found = true;
                }
                Ok(())
            });
            found
        } else {
            false
        }
    })
}

/// Derives what an RPC request or response body needs.
///
/// Expands to:
/// - `#[derive(Clone, Debug)]` (only traits not already present)
/// - `#[derive(Serialize, Deserialize)]` through the `serde` re-exported by
///   `acton_rpc::prelude`, so the caller does not need its own `serde` dependency
/// - A compile-time assertion that the type is `Send + Sync + 'static`
///
/// ```ignore
/// use acton_rpc::prelude::*;
///
/// #[rpc_payload]
/// pub struct Greeting {
///     pub msg: String,
/// }
///
/// let reply: Greeting = client.call_json("hello_world", &Greeting { msg: "test".into() }).await?;
/// ```
#[proc_macro_attribute]
pub fn rpc_payload(_attr: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as DeriveInput);

    let name = &input.ident;
    let generics = &input.generics;
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    let mut traits = Vec::new();
    if !has_derive(&input, "Clone") {
        traits.push(quote!(Clone));
    }
    if !has_derive(&input, "Debug") {
        traits.push(quote!(Debug));
    }
    let mut serde_traits = Vec::new();
    if !has_derive(&input, "Serialize") {
        serde_traits.push(quote!(::acton_rpc::prelude::serde::Serialize));
    }
    if !has_derive(&input, "Deserialize") {
        serde_traits.push(quote!(::acton_rpc::prelude::serde::Deserialize));
    }

    let derives = if traits.is_empty() {
        quote!()
    } else {
        quote!(#[derive(#(#traits),*)])
    };
    let serde_derives = if serde_traits.is_empty() {
        quote!()
    } else {
        quote! {
            #[derive(#(#serde_traits),*)]
            #[serde(crate = "::acton_rpc::prelude::serde")]
        }
    };

    let assert_ident = quote::format_ident!("_AssertRpcPayload_{}", name);

    let expanded = quote! {
        #derives
        #serde_derives
        #input

        #[doc(hidden)]
        #[allow(dead_code, non_camel_case_types, non_snake_case, clippy::needless_lifetimes)]
        const _: () = {
            fn #assert_ident #impl_generics () #where_clause {
                fn assert_bounds<T: Send + Sync + 'static>() {}
                assert_bounds::<#name #ty_generics>();
            }
        };
    };

    TokenStream::from(expanded)
}

/// Runs an async `main` to completion on a multi-threaded Tokio runtime.
///
/// The runtime comes from the `tokio` re-exported by `acton_rpc::prelude`, so
/// a binary needs no direct `tokio` dependency. A client or server started in
/// `main` keeps its background task on this runtime until `main` returns.
///
/// ```ignore
/// #[rpc_main]
/// async fn main() -> anyhow::Result<()> {
///     Ok(())
/// }
/// ```
#[proc_macro_attribute]
pub fn rpc_main(attr: TokenStream, item: TokenStream) -> TokenStream {
    let ItemFn { attrs, vis, sig, block } = parse_macro_input!(item as ItemFn);

    if !attr.is_empty() {
        return syn::Error::new_spanned(&sig.ident, "rpc_main takes no arguments")
            .to_compile_error()
            .into();
    }
    if sig.ident != "main" || sig.asyncness.is_none() {
        return syn::Error::new_spanned(&sig.ident, "rpc_main applies to `async fn main`")
            .to_compile_error()
            .into();
    }

    let output = &sig.output;
    let expanded = quote! {
        #(#attrs)*
        #vis fn main() #output {
            ::acton_rpc::prelude::tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .expect("Failed to build Acton RPC runtime")
                .block_on(async #block)
        }
    };

    TokenStream::from(expanded)
}

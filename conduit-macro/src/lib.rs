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

//! Conduit Macro Library
//!
//! Procedural macros for the Conduit messaging framework.
//!
//! # Payload Macro
//!
//! [`service_payload`] prepares a type to travel inside a request, response or
//! attribute update. Payloads are streamed field by field in declaration order,
//! so the macro derives `serde` support alongside `Clone`, `Debug` and `PartialEq`:
//!
//! ```ignore
//! #[service_payload]
//! pub struct HelloArgs {
//!     pub client: String,
//!     pub greeting: String,
//! }
//! ```
//!
//! # Component Macro
//!
//! [`component`] prepares the state type of a component hosted by a dispatcher
//! thread:
//!
//! ```ignore
//! #[component]
//! pub struct HelloServer {
//!     served: u32,
//! }
//! ```

use proc_macro::TokenStream;

use quote::quote;
use syn::{parse_macro_input, DeriveInput};

fn has_derive(input: &DeriveInput, trait_name: &str) -> bool {
    input.attrs.iter().any(|attr| {
        if attr.path().is_ident("derive") {
            let mut found = false;
            let _ = attr.parse_nested_meta(|meta| {
                if meta.path.is_ident(trait_name) {
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

/// Options parsed from `#[service_payload(...)]`.
#[derive(Default)]
struct PayloadConfig {
    /// Skip deriving `PartialEq` (the type provides its own or cannot support it).
    no_eq: bool,
}

impl PayloadConfig {
    fn parse(attr: &TokenStream) -> Self {
        let mut config = Self::default();
        let attr_string = attr.to_string();
        for part in attr_string.split(',') {
            if part.trim() == "no_eq" {
                config.no_eq = true;
            }
        }
        config
    }
}

/// Derives the traits a service payload needs.
///
/// Expands to `#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]`
/// (skipping any already present) and a compile-time assertion that the type is
/// `Send + Sync + 'static`, since payloads are decoded on whichever dispatcher
/// thread receives them.
///
/// `serde` must be resolvable at the use site.
///
/// # Options
///
/// * `no_eq`: do not derive `PartialEq`.
#[proc_macro_attribute]
pub fn service_payload(attr: TokenStream, item: TokenStream) -> TokenStream {
    let config = PayloadConfig::parse(&attr);
    let input = parse_macro_input!(item as DeriveInput);

    let name = &input.ident;
    let generics = &input.generics;
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    let derives = {
        let mut traits = Vec::new();
        if !has_derive(&input, "Clone") {
            traits.push(quote!(Clone));
        }
        if !has_derive(&input, "Debug") {
            traits.push(quote!(Debug));
        }
        if !config.no_eq && !has_derive(&input, "PartialEq") {
            traits.push(quote!(PartialEq));
        }
        if !has_derive(&input, "Serialize") {
            traits.push(quote!(serde::Serialize));
        }
        if !has_derive(&input, "Deserialize") {
            traits.push(quote!(serde::Deserialize));
        }
        if traits.is_empty() {
            quote!()
        } else {
            quote!(#[derive(#(#traits),*)])
        }
    };

    let assert_ident = quote::format_ident!("_AssertServicePayload_{}", name);

    let expanded = quote! {
        #derives
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

/// Derives the boilerplate for a component's state type.
///
/// Expands to `#[derive(Debug)]` (if missing) and a compile-time assertion that
/// the type is `Send + 'static`. Components are built on the spawning thread and
/// moved onto their dispatcher thread, where they stay for their whole life.
#[proc_macro_attribute]
pub fn component(_attr: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as DeriveInput);

    let name = &input.ident;
    let generics = &input.generics;
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    let derives = if has_derive(&input, "Debug") {
        quote!()
    } else {
        quote!(#[derive(Debug)])
    };

    let assert_ident = quote::format_ident!("_AssertComponent_{}", name);

    let expanded = quote! {
        #derives
        #input

        #[doc(hidden)]
        #[allow(dead_code, non_camel_case_types, non_snake_case, clippy::needless_lifetimes)]
        const _: () = {
            fn #assert_ident #impl_generics () #where_clause {
                fn assert_bounds<T: Send + 'static>() {}
                assert_bounds::<#name #ty_generics>();
            }
        };
    };

    TokenStream::from(expanded)
}

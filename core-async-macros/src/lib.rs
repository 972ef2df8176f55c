//! Attribute macros that run an `async fn` on the `core_async` runtime.
//!
//! `#[core_async::test]` drives the body on a current-thread runtime.
//! `#[core_async::test(multi_thread)]` uses a small multi-thread runtime so
//! spawned tasks keep running while the body awaits.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, Ident, ItemFn};

const MULTI_THREAD_WORKERS: usize = 2;

#[proc_macro_attribute]
pub fn test(attr: TokenStream, item: TokenStream) -> TokenStream {
    expand(attr, item, MacroKind::Test)
}

#[proc_macro_attribute]
pub fn main(attr: TokenStream, item: TokenStream) -> TokenStream {
    expand(attr, item, MacroKind::Main)
}

enum MacroKind {
    Test,
    Main,
}

enum Flavor {
    CurrentThread,
    MultiThread,
}

fn parse_flavor(attr: TokenStream) -> syn::Result<Flavor> {
    if attr.is_empty() {
        return Ok(Flavor::CurrentThread);
    }
    let tokens = TokenStream2::from(attr);
    let ident: Ident = syn::parse2(tokens.clone())
        .map_err(|_| syn::Error::new_spanned(&tokens, "expected `multi_thread`"))?;
    if ident == "multi_thread" {
        Ok(Flavor::MultiThread)
    } else {
        Err(syn::Error::new_spanned(
            ident,
            "unknown runtime flavor, expected `multi_thread`",
        ))
    }
}

fn expand(attr: TokenStream, item: TokenStream, kind: MacroKind) -> TokenStream {
    let flavor = match parse_flavor(attr) {
        Ok(flavor) => flavor,
        Err(err) => return err.to_compile_error().into(),
    };

    let input = parse_macro_input!(item as ItemFn);

    if input.sig.asyncness.is_none() {
        return syn::Error::new_spanned(
            input.sig.fn_token,
            "core_async attribute macros require `async fn`",
        )
        .to_compile_error()
        .into();
    }

    let mut sig = input.sig;
    sig.asyncness = None;
    let attrs = input.attrs;
    let vis = input.vis;
    let body = input.block;

    let run = match flavor {
        Flavor::CurrentThread => quote! {
            core_async::runtime::block_on(async move #body)
        },
        Flavor::MultiThread => quote! {
            core_async::runtime::block_on_multi_thread(#MULTI_THREAD_WORKERS, async move #body)
        },
    };

    let test_attr = match kind {
        MacroKind::Test => quote!(#[test]),
        MacroKind::Main => quote!(),
    };

    quote! {
        #(#attrs)*
        #test_attr
        #vis #sig {
            #run
        }
    }
    .into()
}

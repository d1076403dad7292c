//! Augment the development of primitives with procedural macros.

use proc_macro::TokenStream;
use proc_macro2::Span;
use quote::quote;
use syn::{parse_macro_input, AttributeArgs, Ident, ItemFn, Lit, Meta, NestedMeta};

const LEVELS: [&str; 5] = ["TRACE", "DEBUG", "INFO", "WARN", "ERROR"];

/// Run a test function with a tracing subscriber that writes to the test output.
///
/// The log level defaults to `DEBUG` and can be overridden with `level = "..."`.
/// `async` test functions are driven to completion on a fresh multi-threaded
/// `tokio` runtime (the calling crate must depend on `tokio`, `tracing`, and
/// `tracing-subscriber`).
///
/// # Example
///
/// ```rust,ignore
/// use rapidchain_macros::test_traced;
///
/// #[test_traced(level = "INFO")]
/// fn test_info_level() {
///     tracing::info!("visible");
///     tracing::debug!("filtered");
/// }
///
/// #[test_traced]
/// async fn test_async() {
///     tokio::task::yield_now().await;
/// }
/// ```
#[proc_macro_attribute]
pub fn test_traced(attr: TokenStream, item: TokenStream) -> TokenStream {
    let args = parse_macro_input!(attr as AttributeArgs);
    let input = parse_macro_input!(item as ItemFn);

    let mut level = String::from("DEBUG");
    for arg in args {
        match arg {
            NestedMeta::Meta(Meta::NameValue(nv)) if nv.path.is_ident("level") => match nv.lit {
                Lit::Str(lit) => {
                    let value = lit.value().to_uppercase();
                    if !LEVELS.contains(&value.as_str()) {
                        return syn::Error::new_spanned(lit, "invalid level")
                            .to_compile_error()
                            .into();
                    }
                    level = value;
                }
                other => {
                    return syn::Error::new_spanned(other, "level must be a string")
                        .to_compile_error()
                        .into();
                }
            },
            other => {
                return syn::Error::new_spanned(other, "expected `level = \"...\"`")
                    .to_compile_error()
                    .into();
            }
        }
    }
    let level = Ident::new(&level, Span::call_site());

    let attrs = &input.attrs;
    let vis = &input.vis;
    let block = &input.block;
    let mut sig = input.sig.clone();
    let is_async = sig.asyncness.take().is_some();

    let init = quote! {
        let _ = ::tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(::tracing::Level::#level)
            .try_init();
    };
    let body = if is_async {
        quote! {
            ::tokio::runtime::Builder::new_multi_thread()
                .worker_threads(4)
                .enable_all()
                .build()
                .expect("failed to build runtime")
                .block_on(async move #block)
        }
    } else {
        quote! { #block }
    };

    quote! {
        #[test]
        #(#attrs)*
        #vis #sig {
            #init
            #body
        }
    }
    .into()
}

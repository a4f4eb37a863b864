use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, FnArg, ItemFn, Pat};

/// Time a planner call when the `perf_stats` feature is enabled.
///
/// The function body is wrapped with a drop guard that logs the elapsed
/// time through Bevy's `info!` when it exceeds the threshold. Without
/// `perf_stats` the guard is compiled out entirely.
///
/// If the function takes a `now_ms` argument (the simulation clock used by
/// the navigation core), its value is included in the log line so slow
/// calls can be matched to a tick.
///
/// # Example
/// ```ignore
/// #[profile]
/// pub fn find_path(&mut self, world: &dyn SpatialIndex, start: Vec2, end: Vec2) -> Option<DetailedPath> {
///     // ...
/// }
///
/// #[profile(5)] // threshold in milliseconds
/// pub fn find_alternative_route(&mut self, /* ... */ now_ms: u64) { /* ... */ }
/// ```
#[proc_macro_attribute]
pub fn profile(attr: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as ItemFn);

    let threshold_ms: u128 = if attr.is_empty() {
        1
    } else {
        attr.to_string().trim().parse().unwrap_or(1)
    };

    let attrs = &input.attrs;
    let vis = &input.vis;
    let sig = &input.sig;
    let block = &input.block;
    let fn_name_str = sig.ident.to_string();

    let has_clock_param = sig.inputs.iter().any(|arg| match arg {
        FnArg::Typed(pat_type) => match &*pat_type.pat {
            Pat::Ident(pat_ident) => pat_ident.ident == "now_ms",
            _ => false,
        },
        FnArg::Receiver(_) => false,
    });

    let guard = if has_clock_param {
        quote! {
            struct ProfileGuard {
                name: &'static str,
                start: std::time::Instant,
                now_ms: u64,
            }
            impl Drop for ProfileGuard {
                fn drop(&mut self) {
                    let elapsed = self.start.elapsed();
                    if elapsed.as_millis() > #threshold_ms {
                        bevy::prelude::info!("[PERF] {} @{}ms: {:?}", self.name, self.now_ms, elapsed);
                    }
                }
            }
            ProfileGuard {
                name: #fn_name_str,
                start: std::time::Instant::now(),
                now_ms: now_ms as u64,
            }
        }
    } else {
        quote! {
            struct ProfileGuard {
                name: &'static str,
                start: std::time::Instant,
            }
            impl Drop for ProfileGuard {
                fn drop(&mut self) {
                    let elapsed = self.start.elapsed();
                    if elapsed.as_millis() > #threshold_ms {
                        bevy::prelude::info!("[PERF] {}: {:?}", self.name, elapsed);
                    }
                }
            }
            ProfileGuard {
                name: #fn_name_str,
                start: std::time::Instant::now(),
            }
        }
    };

    let output = quote! {
        #(#attrs)*
        #vis #sig {
            #[cfg(feature = "perf_stats")]
            let _profile_timer = {
                #guard
            };

            #block
        }
    };

    output.into()
}

pub mod nav;

// ============================================================================
// Profiling Macros
// ============================================================================

/// Conditionally log messages every 100 calls when the perf_stats feature is enabled.
///
/// The first argument is any counter expression convertible to `u64`
/// (for example the number of navigation requests served so far).
/// When the perf_stats feature is disabled this macro compiles to nothing,
/// and the arguments are not evaluated.
///
/// # Example
/// ```ignore
/// profile_log!(navigator.requests_served(), "Served {} requests", navigator.requests_served());
/// ```
#[macro_export]
#[cfg(feature = "perf_stats")]
macro_rules! profile_log {
    ($counter:expr, $($arg:tt)*) => {
        if ($counter as u64) % 100 == 0 {
            bevy::prelude::info!($($arg)*);
        }
    };
}

#[macro_export]
#[cfg(not(feature = "perf_stats"))]
macro_rules! profile_log {
    ($counter:expr, $($arg:tt)*) => {};
}

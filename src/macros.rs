//! Feed logging macros
//!
//! Snapshot traces are noisy on busy collections, so they are only compiled
//! into debug builds.

/// Feed trace logging - only active in debug builds
#[cfg(debug_assertions)]
#[macro_export]
macro_rules! feed_trace {
    ($($arg:tt)*) => { log::trace!($($arg)*) };
}

/// Feed trace logging - no-op in release builds
#[cfg(not(debug_assertions))]
#[macro_export]
macro_rules! feed_trace {
    ($($arg:tt)*) => {};
}
